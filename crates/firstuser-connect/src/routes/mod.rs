// Framework-agnostic request handlers for the integration API.
//
// Each handler takes the shared context plus a typed request and returns a
// typed response or an `ApiError`. The HTTP crate maps these onto routes
// and response codes.

pub mod exchange;
pub mod heartbeat;
pub mod join;
pub mod plan;
pub mod waitlist;
pub mod widget;

use firstuser_connect_core::db::models::IntegrationApp;
use firstuser_connect_core::error::{ApiError, ConnectError};

use crate::context::ConnectContext;

/// Collapse internal errors into a 500; pass protocol errors through.
pub fn to_api_error(ctx: &ConnectContext, err: ConnectError) -> ApiError {
    match err {
        ConnectError::Api(api) => api,
        other => {
            ctx.logger.error(&format!("internal error: {other}"));
            ApiError::internal("Internal server error")
        }
    }
}

/// Check a partner-supplied `returnTo` URL against the app's allowed
/// origins. An empty allowlist means the app has not restricted origins.
pub fn is_allowed_return_to(app: &IntegrationApp, return_to: &str) -> bool {
    let Ok(parsed) = url::Url::parse(return_to) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    if app.allowed_origins.is_empty() {
        return true;
    }
    let origin = parsed.origin().ascii_serialization();
    app.allowed_origins.iter().any(|o| o.trim_end_matches('/') == origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_with_origins(origins: &[&str]) -> IntegrationApp {
        let mut app = IntegrationApp::new("space_1", "pub_1", "Acme", "whsec_1");
        app.allowed_origins = origins.iter().map(|o| o.to_string()).collect();
        app
    }

    #[test]
    fn test_empty_allowlist_accepts_http_urls() {
        let app = app_with_origins(&[]);
        assert!(is_allowed_return_to(&app, "https://partner.example/return"));
        assert!(!is_allowed_return_to(&app, "javascript:alert(1)"));
        assert!(!is_allowed_return_to(&app, "not a url"));
    }

    #[test]
    fn test_allowlist_matches_origin_only() {
        let app = app_with_origins(&["https://partner.example"]);
        assert!(is_allowed_return_to(&app, "https://partner.example/any/path?q=1"));
        assert!(!is_allowed_return_to(&app, "https://evil.example/return"));
        assert!(!is_allowed_return_to(&app, "http://partner.example/return"));
    }

    #[test]
    fn test_allowlist_trailing_slash_tolerated() {
        let app = app_with_origins(&["https://partner.example/"]);
        assert!(is_allowed_return_to(&app, "https://partner.example/return"));
    }
}
