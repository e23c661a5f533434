//! Helpers shared by every pass: construction from a [forge_ir::Context],
//! option parsing, and module traversal orders.
mod construct;
mod pass;
mod post_order;

pub use construct::{ConstructPass, Named, ParseVal, PassOpt};
pub use pass::Pass;
pub use post_order::{ModuleTraversal, Order};
