//! Progress estimation for line-oriented tool output.
//!
//! gogrepo prints heterogeneous progress text on stdout and stderr. This
//! crate folds those lines into a single normalized estimate:
//!
//! - [`LineSplitter`] turns raw byte chunks into complete lines.
//! - [`LinePattern`] implementations recognize progress markers in a line.
//! - [`Estimator`] applies markers and tracks the running [`Progress`].
//!
//! Nothing here touches processes or I/O, so the whole pipeline can be
//! exercised from plain strings.

pub mod estimator;
pub mod patterns;
pub mod splitter;

pub use estimator::{Estimator, Progress};
pub use patterns::{
    ItemsPattern, LinePattern, Marker, NewItemPattern, PercentPattern, default_patterns,
};
pub use splitter::LineSplitter;
