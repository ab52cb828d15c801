//! Signed connection URLs for the ISE WebSocket endpoint.
//!
//! The provider authenticates the upgrade request with an HMAC-SHA256
//! signature over `host`, `date` and the request line, passed as query
//! parameters because browsers cannot set headers on WebSocket upgrades.

use base64::prelude::*;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};
use url::Url;
use zeroize::Zeroize;

use super::config::IseConfig;
use super::types::{AssessmentError, AssessmentResult};

type HmacSha256 = Hmac<Sha256>;

/// Builds authenticated connection URLs from static credentials.
#[derive(Clone)]
pub struct Signer {
    endpoint: Url,
    host: String,
    api_key: String,
    api_secret: String,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("endpoint", &self.endpoint.as_str())
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl Drop for Signer {
    fn drop(&mut self) {
        self.wipe_credentials();
    }
}

impl Signer {
    /// Create a signer for the configured endpoint.
    ///
    /// The endpoint is parsed once here.
    pub fn new(config: &IseConfig) -> AssessmentResult<Self> {
        let endpoint = config.endpoint_url()?;
        let host = endpoint.host_str().unwrap_or_default().to_string();

        Ok(Self {
            endpoint,
            host,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    /// Signed URL using the current wall-clock time.
    pub fn build_authenticated_url(&self) -> AssessmentResult<Url> {
        self.build_authenticated_url_at(OffsetDateTime::now_utc())
    }

    /// Signed URL for a fixed instant.
    pub fn build_authenticated_url_at(&self, now: OffsetDateTime) -> AssessmentResult<Url> {
        let date = http_date(now)?;
        let authorization = self.authorization(&date);

        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("authorization", &authorization)
            .append_pair("date", &date)
            .append_pair("host", &self.host);
        Ok(url)
    }

    /// Canonical string covered by the signature.
    pub fn canonical_string(&self, date: &str) -> String {
        format!(
            "host: {}\ndate: {}\nGET {} HTTP/1.1",
            self.host,
            date,
            self.endpoint.path()
        )
    }

    /// Base64 HMAC-SHA256 of the canonical string.
    pub fn signature(&self, date: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(self.canonical_string(date).as_bytes());
        BASE64_STANDARD.encode(mac.finalize().into_bytes())
    }

    fn authorization(&self, date: &str) -> String {
        let origin = format!(
            r#"api_key="{}", algorithm="hmac-sha256", headers="host date request-line", signature="{}""#,
            self.api_key,
            self.signature(date)
        );
        BASE64_STANDARD.encode(origin)
    }

    fn wipe_credentials(&mut self) {
        self.api_key.zeroize();
        self.api_secret.zeroize();
    }
}

const HTTP_DATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// RFC 1123 date in GMT, e.g. `Mon, 19 Oct 2026 08:00:00 GMT`.
pub fn http_date(now: OffsetDateTime) -> AssessmentResult<String> {
    now.to_offset(time::UtcOffset::UTC)
        .format(HTTP_DATE)
        .map_err(|e| AssessmentError::ConfigurationError(format!("Failed to format date: {e}")))
}
