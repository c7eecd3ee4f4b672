//! Running completion estimate for one job.

use serde::{Deserialize, Serialize};

use crate::patterns::{LinePattern, Marker, default_patterns};

/// Normalized completion estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "percent", rename_all = "camelCase")]
pub enum Progress {
    /// No recognizable marker seen yet, or no total known.
    #[default]
    Unknown,
    /// Completion in percent, 0–100.
    Known(f32),
}

impl Progress {
    /// Returns the percentage, if known.
    pub fn percent(&self) -> Option<f32> {
        match self {
            Progress::Unknown => None,
            Progress::Known(p) => Some(*p),
        }
    }
}

/// Folds output lines into a [`Progress`].
///
/// Within one phase (same item total) the estimate never decreases. A
/// counter reporting a different total starts a new phase.
pub struct Estimator {
    patterns: Vec<Box<dyn LinePattern>>,
    total: Option<u64>,
    /// Set when the total was inferred from a bare percentage.
    implicit_total: bool,
    completed: u64,
    fraction: f64,
    floor: f64,
    current: Progress,
}

impl Default for Estimator {
    fn default() -> Self {
        Self::new()
    }
}

impl Estimator {
    /// Creates an estimator using the built-in patterns.
    pub fn new() -> Self {
        Self::with_patterns(default_patterns())
    }

    /// Creates an estimator with a custom pattern set.
    pub fn with_patterns(patterns: Vec<Box<dyn LinePattern>>) -> Self {
        Self {
            patterns,
            total: None,
            implicit_total: false,
            completed: 0,
            fraction: 0.0,
            floor: 0.0,
            current: Progress::Unknown,
        }
    }

    /// Returns the current estimate.
    pub fn current(&self) -> Progress {
        self.current
    }

    /// Consumes one line and returns the updated estimate.
    ///
    /// Lines without markers leave the estimate unchanged.
    pub fn observe(&mut self, line: &str) -> Progress {
        let markers: Vec<Marker> = self.patterns.iter().filter_map(|p| p.scan(line)).collect();
        if markers.is_empty() {
            return self.current;
        }
        for marker in markers {
            self.apply(marker);
        }
        self.recompute();
        self.current
    }

    /// Finalizes the estimate when the job ends.
    ///
    /// A successful run that reported any progress is pinned to 100%;
    /// one that never reported progress stays `Unknown`.
    pub fn finish(&mut self, success: bool) -> Progress {
        if success && self.current != Progress::Unknown {
            self.current = Progress::Known(100.0);
        }
        self.current
    }

    fn apply(&mut self, marker: Marker) {
        match marker {
            // No total, no phase.
            Marker::Items { total: 0, .. } => {}
            Marker::Items { current, total } => {
                if self.total != Some(total) || self.implicit_total {
                    self.floor = 0.0;
                }
                self.total = Some(total);
                self.implicit_total = false;
                self.completed = current.saturating_sub(1).min(total);
                self.fraction = 0.0;
            }
            Marker::Percent(value) => {
                if self.total.is_none() {
                    self.total = Some(1);
                    self.implicit_total = true;
                    self.completed = 0;
                }
                self.fraction = self.fraction.max(value / 100.0);
            }
            Marker::NewItem => {
                if self.fraction > 0.0
                    && !self.implicit_total
                    && let Some(total) = self.total
                {
                    self.completed = (self.completed + 1).min(total);
                }
                self.fraction = 0.0;
            }
        }
    }

    fn recompute(&mut self) {
        let Some(total) = self.total else {
            return;
        };
        let raw = (self.completed as f64 + self.fraction.min(1.0)) / total as f64 * 100.0;
        let estimate = raw.clamp(0.0, 100.0).max(self.floor);
        self.floor = estimate;
        self.current = Progress::Known(estimate as f32);
    }
}
