//! Recognizers for progress markers in tool output.
//!
//! The exact wording gogrepo prints differs between versions, so the set
//! of recognizers is open: anything implementing [`LinePattern`] can be
//! handed to [`Estimator::with_patterns`](crate::Estimator::with_patterns).

use regex::Regex;

/// A progress signal extracted from one line of output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Marker {
    /// Working on item `current` (1-based) out of `total`.
    Items { current: u64, total: u64 },
    /// Completion of the current item, in percent (0–100).
    Percent(f64),
    /// A new file or phase has started.
    NewItem,
}

/// Scans a line for a progress marker.
///
/// Implementations must never panic on arbitrary input; a line they do
/// not understand simply yields `None`.
pub trait LinePattern: Send + Sync {
    fn scan(&self, line: &str) -> Option<Marker>;
}

const ITEMS_OF: &str = r"(?i)\b(\d+)\s+of\s+(\d+)\b";
const ITEMS_PAREN: &str = r"\(\s*(\d+)\s*/\s*(\d+)\s*\)";
const PERCENT: &str = r"\b(\d{1,3}(?:\.\d+)?)\s*%";
const NEW_ITEM: &str = r"(?i)^\s*(?:download(?:ing)?|fetching|updating|skipping|verifying)\b";

/// Matches "X of Y" and "(X / Y)" item counters.
pub struct ItemsPattern {
    regex: Regex,
}

impl ItemsPattern {
    /// Builds a counter pattern from a regex with two capture groups:
    /// the current item and the total.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }
}

impl LinePattern for ItemsPattern {
    fn scan(&self, line: &str) -> Option<Marker> {
        let caps = self.regex.captures(line)?;
        let current: u64 = caps.get(1)?.as_str().parse().ok()?;
        let total: u64 = caps.get(2)?.as_str().parse().ok()?;
        if total == 0 || current == 0 || current > total {
            return None;
        }
        Some(Marker::Items { current, total })
    }
}

/// Matches a percentage such as `42%` or `87.5 %`.
pub struct PercentPattern {
    regex: Regex,
}

impl PercentPattern {
    /// Builds a percentage pattern from a regex whose first capture group
    /// is the numeric value.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }
}

impl LinePattern for PercentPattern {
    fn scan(&self, line: &str) -> Option<Marker> {
        // Last match wins: gogrepo prints running totals after per-chunk figures.
        let caps = self.regex.captures_iter(line).last()?;
        let value: f64 = caps.get(1)?.as_str().parse().ok()?;
        if !(0.0..=100.0).contains(&value) {
            return None;
        }
        Some(Marker::Percent(value))
    }
}

/// Matches lines announcing a new file or phase.
pub struct NewItemPattern {
    regex: Regex,
}

impl NewItemPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }
}

impl LinePattern for NewItemPattern {
    fn scan(&self, line: &str) -> Option<Marker> {
        self.regex.is_match(line).then_some(Marker::NewItem)
    }
}

/// Returns the built-in recognizers, in the order they are applied.
///
/// New-item detection runs first so that a line like
/// `downloading 3 of 10` resets the current item before the counter
/// positions it.
pub fn default_patterns() -> Vec<Box<dyn LinePattern>> {
    // The built-in expressions are constants covered by tests below.
    let built_in = || -> Result<Vec<Box<dyn LinePattern>>, regex::Error> {
        Ok(vec![
            Box::new(NewItemPattern::new(NEW_ITEM)?),
            Box::new(ItemsPattern::new(ITEMS_OF)?),
            Box::new(ItemsPattern::new(ITEMS_PAREN)?),
            Box::new(PercentPattern::new(PERCENT)?),
        ])
    };
    match built_in() {
        Ok(patterns) => patterns,
        Err(e) => {
            tracing::error!(error = %e, "built-in progress pattern failed to compile");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(line: &str) -> Vec<Marker> {
        default_patterns()
            .iter()
            .filter_map(|p| p.scan(line))
            .collect()
    }

    #[test]
    fn items_of_form() {
        let p = ItemsPattern::new(ITEMS_OF).unwrap();
        assert_eq!(
            p.scan("downloading 3 of 10 files"),
            Some(Marker::Items {
                current: 3,
                total: 10
            })
        );
    }

    #[test]
    fn items_paren_form() {
        let p = ItemsPattern::new(ITEMS_PAREN).unwrap();
        assert_eq!(
            p.scan("(12 / 48) fetching game details for trine_2_complete_story..."),
            Some(Marker::Items {
                current: 12,
                total: 48
            })
        );
    }

    #[test]
    fn items_rejects_nonsense_counts() {
        let p = ItemsPattern::new(ITEMS_OF).unwrap();
        assert_eq!(p.scan("0 of 10"), None);
        assert_eq!(p.scan("11 of 10"), None);
        assert_eq!(p.scan("3 of 0"), None);
    }

    #[test]
    fn items_rejects_overflowing_numbers() {
        let p = ItemsPattern::new(ITEMS_OF).unwrap();
        assert_eq!(p.scan("1 of 99999999999999999999999"), None);
    }

    #[test]
    fn percent_takes_last_value() {
        let p = PercentPattern::new(PERCENT).unwrap();
        assert_eq!(
            p.scan("chunk 100% overall 42.5%"),
            Some(Marker::Percent(42.5))
        );
    }

    #[test]
    fn percent_out_of_range_ignored() {
        let p = PercentPattern::new(PERCENT).unwrap();
        assert_eq!(p.scan("bogus 250%"), None);
    }

    #[test]
    fn new_item_prefixes() {
        let p = NewItemPattern::new(NEW_ITEM).unwrap();
        assert_eq!(p.scan("download   setup_trine2.exe"), Some(Marker::NewItem));
        assert_eq!(p.scan("  Fetching game product data"), Some(Marker::NewItem));
        assert_eq!(p.scan("skipping known file"), Some(Marker::NewItem));
        assert_eq!(p.scan("the download finished"), None);
    }

    #[test]
    fn default_patterns_compile() {
        assert_eq!(default_patterns().len(), 4);
    }

    #[test]
    fn combined_line_yields_reset_then_counter() {
        let markers = scan_all("downloading 3 of 10");
        assert_eq!(
            markers,
            vec![
                Marker::NewItem,
                Marker::Items {
                    current: 3,
                    total: 10
                }
            ]
        );
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(scan_all("\u{fffd}\u{fffd} %% of ( / )").is_empty());
        assert!(scan_all("").is_empty());
    }
}
