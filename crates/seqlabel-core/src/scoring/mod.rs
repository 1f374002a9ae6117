//! Positive-class precision, recall and F-score.

pub mod counts;

pub use counts::PositiveCounts;
