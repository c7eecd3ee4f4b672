//! Metadata cache for game detail views.
//!
//! Resolves a game's description and cover image through an explicit
//! pipeline:
//!
//! 1. **Disk**: a previously stored entry whose checksum verifies
//! 2. **API**: the GOG products API, via the manifest's product id
//! 3. **Manifest**: description and cover references in the manifest itself
//!
//! Results are persisted with their provenance. Concurrent requests for
//! the same entry share a single resolution.

pub mod cache;
pub mod client;
pub mod error;
pub mod product;
pub mod source;
pub mod store;
pub mod types;

pub use cache::{MetadataCache, MetadataConfig};
pub use client::GogClient;
pub use error::MetadataError;
pub use product::ProductDetails;
pub use source::{Image, MetadataSource};
pub use store::CacheStore;
pub use types::{CacheEntry, GameInfo, MetadataKind, Payload, Source};
