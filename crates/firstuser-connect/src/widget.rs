// Hosted chat widget tokens.
//
// The widget URL is short-lived and HMAC-signed with the app's signing
// secret, so it can be handed to a browser without exposing the API key.

use chrono::{DateTime, Duration, Utc};

use firstuser_connect_core::db::models::IntegrationApp;
use firstuser_connect_core::error::Result;
use firstuser_connect_core::options::ConnectOptions;

use crate::crypto::{make_signature, verify_signature};

/// The string the widget signature covers.
fn signing_input(public_app_id: &str, external_user_id: &str, expires_unix: i64) -> String {
    format!("{public_app_id}.{external_user_id}.{expires_unix}")
}

/// Build a signed, short-lived widget URL for a linked external user.
pub fn build_widget_url(
    options: &ConnectOptions,
    app: &IntegrationApp,
    external_user_id: &str,
    now: DateTime<Utc>,
) -> Result<String> {
    let expires = (now + Duration::seconds(options.widget_token_ttl_secs)).timestamp();
    let sig = make_signature(
        signing_input(&app.public_app_id, external_user_id, expires).as_bytes(),
        &app.signing_secret,
    )?;

    let mut url = url::Url::parse(&options.base_url)
        .map_err(|e| firstuser_connect_core::error::ConnectError::Config(e.to_string()))?;
    url.set_path(&format!("/widget/chat/{}", app.public_app_id));
    url.query_pairs_mut()
        .append_pair("ext", external_user_id)
        .append_pair("exp", &expires.to_string())
        .append_pair("sig", &sig);
    Ok(url.to_string())
}

/// Validate a widget token's signature and expiry.
pub fn verify_widget_token(
    app: &IntegrationApp,
    external_user_id: &str,
    expires_unix: i64,
    signature: &str,
    now: DateTime<Utc>,
) -> bool {
    if now.timestamp() > expires_unix {
        return false;
    }
    verify_signature(
        signing_input(&app.public_app_id, external_user_id, expires_unix).as_bytes(),
        &app.signing_secret,
        signature,
    )
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> IntegrationApp {
        IntegrationApp::new("space_1", "pub_1", "Acme", "whsec_1")
    }

    #[test]
    fn test_url_shape_and_verification() {
        let options = ConnectOptions::new("https://firstuser.app");
        let now = Utc::now();
        let url_str = build_widget_url(&options, &app(), "ext_1", now).unwrap();

        let url = url::Url::parse(&url_str).unwrap();
        assert_eq!(url.path(), "/widget/chat/pub_1");

        let pairs: std::collections::HashMap<String, String> =
            url.query_pairs().into_owned().collect();
        assert_eq!(pairs["ext"], "ext_1");
        let exp: i64 = pairs["exp"].parse().unwrap();

        assert!(verify_widget_token(&app(), "ext_1", exp, &pairs["sig"], now));
    }

    #[test]
    fn test_expired_token_rejected() {
        let options = ConnectOptions::new("https://firstuser.app");
        let issued = Utc::now() - Duration::seconds(options.widget_token_ttl_secs + 60);
        let url_str = build_widget_url(&options, &app(), "ext_1", issued).unwrap();

        let url = url::Url::parse(&url_str).unwrap();
        let pairs: std::collections::HashMap<String, String> =
            url.query_pairs().into_owned().collect();
        let exp: i64 = pairs["exp"].parse().unwrap();

        assert!(!verify_widget_token(&app(), "ext_1", exp, &pairs["sig"], Utc::now()));
    }

    #[test]
    fn test_token_bound_to_external_user() {
        let options = ConnectOptions::new("https://firstuser.app");
        let now = Utc::now();
        let url_str = build_widget_url(&options, &app(), "ext_1", now).unwrap();
        let url = url::Url::parse(&url_str).unwrap();
        let pairs: std::collections::HashMap<String, String> =
            url.query_pairs().into_owned().collect();
        let exp: i64 = pairs["exp"].parse().unwrap();

        assert!(!verify_widget_token(&app(), "ext_2", exp, &pairs["sig"], now));
    }

    #[test]
    fn test_url_never_contains_signing_secret() {
        let options = ConnectOptions::new("https://firstuser.app");
        let url_str = build_widget_url(&options, &app(), "ext_1", Utc::now()).unwrap();
        assert!(!url_str.contains("whsec_1"));
    }
}
