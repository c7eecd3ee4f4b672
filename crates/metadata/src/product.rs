//! GOG product payload interpretation.

use gogrepo_manifest::urls::{pick_str, url_keys};
use gogrepo_manifest::{abs_url, url_from_value};
use serde_json::Value;

/// Image fields in preference order.
const IMAGE_PREFERENCE: &[&str] = &[
    "vertical",
    "boxArtImage",
    "box_art_image",
    "logo",
    "background",
    "square",
    "tileImage",
    "tile_image",
    "cover",
    "image",
];

/// The parts of a products API response the cache uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductDetails {
    pub title: Option<String>,
    /// `description.full`, HTML.
    pub description: Option<String>,
    /// Absolute URL of the preferred cover image.
    pub cover_url: Option<String>,
}

impl ProductDetails {
    pub fn from_json(data: &Value) -> Self {
        let description = data
            .get("description")
            .and_then(|d| d.get("full"))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string);
        let cover = data
            .get("images")
            .and_then(pick_image)
            .or_else(|| data.get("image").and_then(url_from_value));
        Self {
            title: data.get("title").and_then(Value::as_str).map(str::to_string),
            description,
            cover_url: cover.and_then(|url| abs_url(&url)),
        }
    }
}

/// Picks the best image URL from an `images` value, which may be a dict
/// of named images or a list of URLs/dicts.
pub fn pick_image(images: &Value) -> Option<String> {
    match images {
        Value::Object(obj) => IMAGE_PREFERENCE
            .iter()
            .filter_map(|key| obj.get(*key))
            .find_map(url_from_value)
            .or_else(|| pick_str(obj, url_keys()))
            .or_else(|| obj.values().find_map(url_from_value)),
        Value::Array(items) => items.iter().find_map(url_from_value),
        _ => None,
    }
}
