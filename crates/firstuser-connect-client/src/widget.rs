// Hosted chat widget embedding.

/// A platform-issued, short-lived widget URL wrapped for embedding.
#[derive(Debug, Clone)]
pub struct HostedChatWidget {
    url: String,
}

impl HostedChatWidget {
    pub fn new(url: String) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sandboxed iframe markup for server-rendered pages. The URL is
    /// platform-signed and expires on its own; no credential appears here.
    pub fn iframe_html(&self) -> String {
        format!(
            r#"<iframe src="{}" sandbox="allow-scripts allow-same-origin allow-forms" style="border:0;width:100%;height:100%"></iframe>"#,
            escape_attr(&self.url)
        )
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iframe_is_sandboxed() {
        let widget = HostedChatWidget::new(
            "https://firstuser.app/widget/chat/pub_1?ext=ext_1&exp=1&sig=abc".into(),
        );
        let html = widget.iframe_html();
        assert!(html.contains("sandbox="));
        assert!(html.contains("&amp;exp=1"));
        assert!(!html.contains("\"https://firstuser.app/widget/chat/pub_1?ext=ext_1&exp"));
    }

    #[test]
    fn test_attr_escaping() {
        let widget = HostedChatWidget::new(r#"https://x/?a="b"<c>"#.into());
        let html = widget.iframe_html();
        assert!(!html.contains(r#"="b""#));
        assert!(html.contains("&quot;b&quot;"));
        assert!(html.contains("&lt;c&gt;"));
    }
}
