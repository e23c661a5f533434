//! Passes over the design.
mod access_counter;
mod dead_logic;
mod gate_depth;
mod global_connector;
mod schedule;
mod timing_fence;

pub use access_counter::AccessCounter;
pub use dead_logic::DeadLogic;
pub use gate_depth::GateDepth;
pub use global_connector::GlobalConnector;
pub use schedule::Scheduler;
pub use timing_fence::TimingFence;
