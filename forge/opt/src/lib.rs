//! # Forge scheduling passes
//!
//! The passes in this crate turn a dataflow design, in which components only
//! record *logical* dependencies between their ports and the buses of their
//! siblings, into a physically connected design:
//!
//! 1. [access-counter](passes::AccessCounter) records which tasks touch each
//!    shared resource.
//! 2. [timing-fence](passes::TimingFence) orders everything around explicit
//!    timing barriers.
//! 3. [scheduler](passes::Scheduler) computes latencies and synthesizes the
//!    control logic that drives every GO and data port.
//! 4. [gate-depth](passes::GateDepth) reports the longest combinational path
//!    of each task.
//! 5. [global-connector](passes::GlobalConnector) routes resource accesses to
//!    their physical implementation, arbitrating where tasks share one.
//! 6. [dead-logic](passes::DeadLogic) removes everything that no longer
//!    contributes to an output.
//!
//! ```rust
//! use forge_ir::{Context, Design, Policy};
//! use forge_opt::pass_manager::PassManager;
//! use forge_utils::ForgeResult;
//! fn main() -> ForgeResult<()> {
//!     let pm = PassManager::default_passes()?;
//!     let mut ctx = Context::new(Design::new(), Policy::default());
//!     pm.execute_plan(&mut ctx, &["all".to_string()], &[])?;
//!     Ok(())
//! }
//! ```
pub mod analysis;
pub mod default_passes;
pub mod pass_manager;
pub mod passes;
pub mod traversal;
