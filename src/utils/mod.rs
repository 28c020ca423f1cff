//! Utilities module for logging, metrics, and helper functions
//!
//! This module provides:
//! - Structured logging with tracing
//! - Segmentation metrics (pixel accuracy, IoU, confusion matrix)
//! - Error handling types
//! - Number formatting for summaries

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{Result, TiramisuError};
pub use logging::init_logging;
pub use metrics::{ConfusionMatrix, SegmentationMetrics};

/// Format a number with thousands separator
pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(9427020), "9,427,020");
        assert_eq!(format_number(42), "42");
        assert_eq!(format_number(0), "0");
    }
}
