use super::{ConstructPass, Named};
use forge_ir::Context;
use forge_utils::ForgeResult;

/// A transformation of a whole [Context].
///
/// Passes in this crate work on the complete design rather than one
/// component at a time: scheduling, routing and pruning all need to see
/// across module boundaries.
pub trait Pass {
    /// Precondition for this pass to run on the design. If this returns
    /// `Some(msg)`, the pass is skipped and `msg` is logged.
    fn precondition(_ctx: &Context) -> Option<String>
    where
        Self: Sized,
    {
        None
    }

    fn run(&mut self, ctx: &mut Context) -> ForgeResult<()>;

    /// Run the pass unless its precondition fails.
    fn do_pass(&mut self, ctx: &mut Context) -> ForgeResult<()>
    where
        Self: Sized + Named,
    {
        if let Some(msg) = Self::precondition(ctx) {
            log::info!("Skipping `{}': {msg}", Self::name());
            return Ok(());
        }
        self.run(ctx)
    }

    /// Build the pass from the context and run it. Returns the pass so that
    /// callers can inspect what it recorded.
    fn do_pass_default(ctx: &mut Context) -> ForgeResult<Self>
    where
        Self: ConstructPass + Sized + Named,
    {
        let mut pass = Self::from(ctx)?;
        pass.do_pass(ctx)?;
        Ok(pass)
    }
}
