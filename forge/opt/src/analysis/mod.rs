//! Analyses used by the passes. None of them modify the design.
mod arbitration;
mod dataflow;
mod loop_flop;
mod process;

pub use arbitration::{Cycle, RoundRobin};
pub use dataflow::DataflowOrder;
pub use loop_flop::flop_needed;
pub use process::{Process, ProcessCache};
