//! GOG products API client.
//!
//! Async HTTP client using `reqwest`. Every failure (transport, timeout,
//! non-success status, malformed body) is reported as
//! [`MetadataError::ApiUnavailable`].

use std::time::Duration;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::MetadataError;
use crate::product::ProductDetails;
use crate::source::{BoxFuture, Image, MetadataSource, sniff_image_type};

pub const DEFAULT_BASE_URL: &str = "https://api.gog.com";
pub const DEFAULT_LOCALE: &str = "en-US";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// GOG products API client.
#[derive(Debug, Clone)]
pub struct GogClient {
    http: reqwest::Client,
    base_url: String,
    locale: String,
}

impl GogClient {
    /// Creates a client with a per-request timeout.
    pub fn new(
        base_url: impl Into<String>,
        locale: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, MetadataError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gogrepo-web/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(unavailable)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            locale: locale.into(),
        })
    }

    /// Fetches `/products/{id}` with description and images expanded.
    pub async fn product(&self, product_id: &str) -> Result<ProductDetails, MetadataError> {
        let encoded = utf8_percent_encode(product_id.trim(), NON_ALPHANUMERIC).to_string();
        let url = format!("{}/products/{encoded}", self.base_url);
        let params = [
            ("expand", "description,images"),
            ("locale", self.locale.as_str()),
        ];
        let resp = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(unavailable)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(MetadataError::ApiUnavailable(format!(
                "products/{product_id} returned {}",
                status.as_u16()
            )));
        }
        let body = resp.bytes().await.map_err(unavailable)?;
        let data: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| MetadataError::ApiUnavailable(format!("malformed product JSON: {e}")))?;
        debug!(product_id, "product details fetched");
        Ok(ProductDetails::from_json(&data))
    }

    /// Downloads image data, keeping the server's content type when it is
    /// an image type.
    pub async fn download_image(&self, url: &str) -> Result<Image, MetadataError> {
        let resp = self.http.get(url).send().await.map_err(unavailable)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(MetadataError::ApiUnavailable(format!(
                "image download returned {}",
                status.as_u16()
            )));
        }
        let header_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| v.starts_with("image/"));
        let bytes = resp.bytes().await.map_err(unavailable)?.to_vec();
        if bytes.is_empty() {
            return Err(MetadataError::ApiUnavailable("empty image body".into()));
        }
        let content_type = header_type.unwrap_or_else(|| sniff_image_type(&bytes).to_string());
        Ok(Image {
            bytes,
            content_type,
        })
    }
}

impl MetadataSource for GogClient {
    fn fetch_product(
        &self,
        product_id: &str,
    ) -> BoxFuture<'_, Result<ProductDetails, MetadataError>> {
        let product_id = product_id.to_string();
        Box::pin(async move { self.product(&product_id).await })
    }

    fn fetch_image(&self, url: &str) -> BoxFuture<'_, Result<Image, MetadataError>> {
        let url = url.to_string();
        Box::pin(async move { self.download_image(&url).await })
    }
}

fn unavailable(e: reqwest::Error) -> MetadataError {
    MetadataError::ApiUnavailable(e.to_string())
}
