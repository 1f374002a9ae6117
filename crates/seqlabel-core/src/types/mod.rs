pub mod batch;
pub mod output;

pub use batch::{check_range, check_rectangular, flatten_time_major, Batch};
pub use output::{AttentionTrace, DecodeOutput};
