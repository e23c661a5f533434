use crate::Design;

/// Scheduling policy shared by every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Attempt latency-balanced scheduling.
    pub balance: bool,
    /// Always generate GO/DONE, even for fixed-latency modules.
    pub force_go_done: bool,
    /// Block-based scheduling, which infers feedback points and stalls.
    pub block_scheduling: bool,
    /// Block-based task I/O. When off, task ports are published as pins.
    pub block_io: bool,
    /// Publish task GO/DONE directly instead of attaching kickers.
    pub module_builder: bool,
    /// Byte order used when several narrow writes share a register.
    pub little_endian: bool,
    /// Use the simplified fixed-priority referee.
    pub simple_arbitration: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            balance: false,
            force_go_done: false,
            block_scheduling: true,
            block_io: false,
            module_builder: false,
            little_endian: false,
            simple_arbitration: false,
        }
    }
}

impl Policy {
    /// Settle conflicting options. Called once before scheduling.
    pub fn resolve(&mut self) {
        if self.balance && self.block_scheduling {
            log::warn!(
                "balanced scheduling is not possible while block scheduling \
                 infers feedback points; reverting to unbalanced scheduling"
            );
            self.balance = false;
        }
    }
}

/// Everything a pass may look at.
#[derive(Debug, Default)]
pub struct Context {
    pub design: Design,
    pub policy: Policy,
    /// Options passed to individual passes, as `pass:opt` or `pass:opt=val`.
    pub extra_opts: Vec<String>,
}

impl Context {
    pub fn new(design: Design, policy: Policy) -> Self {
        Context {
            design,
            policy,
            extra_opts: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_conflicts_with_block_scheduling() {
        let mut policy = Policy {
            balance: true,
            ..Policy::default()
        };
        policy.resolve();
        assert!(!policy.balance);

        let mut policy = Policy {
            balance: true,
            block_scheduling: false,
            ..Policy::default()
        };
        policy.resolve();
        assert!(policy.balance);
    }
}
