//! gogrepo manifest access.
//!
//! gogrepo stores its library as a pretty-printed Python literal (a list of
//! dicts); older or converted setups may hold JSON instead. Both are read
//! into [`serde_json::Value`] and exposed as [`GameRecord`]s looked up by
//! title slug.

pub mod error;
pub mod literal;
pub mod manifest;
pub mod reader;
pub mod urls;

pub use error::ManifestError;
pub use literal::parse_python_literal;
pub use manifest::{GameRecord, GameSummary, Manifest};
pub use reader::ManifestReader;
pub use urls::{abs_url, url_from_value};

/// File name gogrepo writes its manifest to, inside the data directory.
pub const MANIFEST_FILE: &str = "gog-manifest.dat";
