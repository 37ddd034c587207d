//! MOEX passport authentication.
//!
//! The passport service answers a basic-auth GET with a `MicexPassportCert`
//! cookie. ISS accepts that cookie on later requests; anonymous access works
//! too, with delayed market data.

use bond_common::{Error, Result};
use reqwest::header::{HeaderMap, SET_COOKIE};
use tracing::{debug, info, warn};

/// Name of the passport cookie.
pub const PASSPORT_COOKIE: &str = "MicexPassportCert";

/// An obtained passport cookie.
#[derive(Clone, PartialEq, Eq)]
pub struct Passport {
    value: String,
}

impl Passport {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Value for a `Cookie` request header.
    pub fn cookie_header(&self) -> String {
        format!("{}={}", PASSPORT_COOKIE, self.value)
    }
}

impl std::fmt::Debug for Passport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Passport").field("value", &"<redacted>").finish()
    }
}

/// Authenticate against the passport service.
///
/// Returns `Ok(None)` when the service answered but did not issue the
/// cookie; the caller continues anonymously.
pub async fn authenticate(
    client: &reqwest::Client,
    auth_url: &str,
    user: &str,
    password: &str,
) -> Result<Option<Passport>> {
    debug!(url = %auth_url, user = %user, "Requesting passport");

    let response = client
        .get(auth_url)
        .basic_auth(user, Some(password))
        .send()
        .await
        .map_err(|e| Error::Network(format!("passport request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Network(format!("passport returned HTTP {}", status)));
    }

    match find_passport_cookie(response.headers()) {
        Some(value) => {
            info!(user = %user, "Passport obtained");
            Ok(Some(Passport::new(value)))
        }
        None => {
            warn!(user = %user, "Passport cookie not found, continuing anonymously");
            Ok(None)
        }
    }
}

/// Extract the passport cookie value from `Set-Cookie` headers.
fn find_passport_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, value)| name.trim() == PASSPORT_COOKIE && !value.trim().is_empty())
        .map(|(_, value)| value.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_find_passport_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("other=1; Path=/"));
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("MicexPassportCert=abc123; Domain=.moex.com; Path=/"),
        );
        assert_eq!(find_passport_cookie(&headers), Some("abc123".into()));
    }

    #[test]
    fn test_no_passport_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("MicexPassportCert=; Path=/"));
        assert_eq!(find_passport_cookie(&headers), None);
    }

    #[test]
    fn test_cookie_header_and_redaction() {
        let passport = Passport::new("abc");
        assert_eq!(passport.cookie_header(), "MicexPassportCert=abc");
        assert!(!format!("{:?}", passport).contains("abc"));
    }
}
