//! Abstraction over where remote metadata comes from.

use std::future::Future;
use std::pin::Pin;

use crate::error::MetadataError;
use crate::product::ProductDetails;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A downloaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Remote lookups the cache performs on a miss.
///
/// [`GogClient`](crate::GogClient) is the production implementation;
/// tests substitute their own to count and script fetches.
pub trait MetadataSource: Send + Sync {
    /// Fetches product details for a GOG product id.
    fn fetch_product(
        &self,
        product_id: &str,
    ) -> BoxFuture<'_, Result<ProductDetails, MetadataError>>;

    /// Downloads an image by absolute URL.
    fn fetch_image(&self, url: &str) -> BoxFuture<'_, Result<Image, MetadataError>>;
}

/// Best-effort content type for image bytes without a usable header.
pub fn sniff_image_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\x89PNG") {
        "image/png"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_common_formats() {
        assert_eq!(sniff_image_type(b"\x89PNG\r\n\x1a\n"), "image/png");
        assert_eq!(sniff_image_type(b"GIF89a"), "image/gif");
        assert_eq!(sniff_image_type(b"RIFF\0\0\0\0WEBPVP8 "), "image/webp");
        assert_eq!(sniff_image_type(b"\xff\xd8\xff"), "image/jpeg");
        assert_eq!(sniff_image_type(b""), "image/jpeg");
    }
}
