//! Defines the default passes available to [PassManager].
use crate::passes::{
    AccessCounter, DeadLogic, GateDepth, GlobalConnector, Scheduler, TimingFence,
};
use crate::traversal::Named;
use crate::{pass_manager::PassManager, register_alias};
use forge_utils::ForgeResult;

impl PassManager {
    pub fn default_passes() -> ForgeResult<Self> {
        // Construct the pass manager and register all passes.
        let mut pm = PassManager::default();

        // Analysis passes
        pm.register_pass::<AccessCounter>()?;
        pm.register_pass::<GateDepth>()?;

        // Scheduling passes
        pm.register_pass::<TimingFence>()?;
        pm.register_pass::<Scheduler>()?;

        // Lowering passes
        pm.register_pass::<GlobalConnector>()?;
        pm.register_pass::<DeadLogic>()?;

        // Register aliases
        register_alias!(pm, "schedule", [AccessCounter, TimingFence, Scheduler]);
        register_alias!(pm, "lower", [GlobalConnector, DeadLogic]);
        register_alias!(pm, "all", ["schedule", GateDepth, "lower"]);

        Ok(pm)
    }
}
