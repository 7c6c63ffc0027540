//! Response reassembly.
//!
//! - [`frame`]: per-frame choice extraction, tolerant of legacy field layouts
//! - [`accumulator`]: per-index buffering for non-streaming responses

pub mod accumulator;
pub mod frame;

pub use accumulator::{AggregatedCompletion, ChoiceAccumulator, ResponseAggregator, UsageTotals};
pub use frame::{ChoiceFrame, FrameError, UsageSnapshot};
