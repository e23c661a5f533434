//! Default timing characteristics of each component kind.
//!
//! A technology library may override both the gate depth and the exit
//! latency of any individual component after it is built.
use crate::{AccessKind, CompKind, ExitIdx, Latency, OpKind, RegKind, SchedAttrs};

/// Logic levels between any input and any output.
pub fn gate_depth(kind: &CompKind) -> u32 {
    match kind {
        CompKind::Op(op) => match op {
            OpKind::And | OpKind::Or | OpKind::Not | OpKind::Logic(_) => 1,
            OpKind::Mux => 2,
            OpKind::Constant(_) | OpKind::NoOp | OpKind::PassThrough => 0,
        },
        CompKind::Scoreboard | CompKind::Stallboard => 2,
        CompKind::Gateway { .. } => 2,
        _ => 0,
    }
}

/// Latency of the first exit of a freshly created component.
pub fn latency(kind: &CompKind, exit: ExitIdx) -> Latency {
    match kind {
        CompKind::Reg(_) | CompKind::TimingOp { .. } => Latency::ONE,
        CompKind::Access {
            kind: AccessKind::MemoryRead | AccessKind::MemoryWrite,
            ..
        } => Latency::open_at(1, exit),
        _ => Latency::ZERO,
    }
}

/// Scheduling attributes of a freshly created component.
pub fn attrs(kind: &CompKind) -> SchedAttrs {
    let none = SchedAttrs::default();
    let clocked = SchedAttrs {
        consumes_clock: true,
        consumes_reset: true,
        ..none
    };
    match kind {
        CompKind::Reg(reg) => SchedAttrs {
            consumes_reset: matches!(reg, RegKind::Control),
            consumes_clock: true,
            done_synchronous: true,
            ..none
        },
        CompKind::Access { kind, .. } => match kind {
            AccessKind::RegisterRead => none,
            AccessKind::RegisterWrite => SchedAttrs {
                consumes_go: true,
                ..none
            },
            AccessKind::MemoryRead | AccessKind::MemoryWrite => SchedAttrs {
                consumes_go: true,
                produces_done: true,
                done_synchronous: true,
                ..clocked
            },
        },
        CompKind::TimingOp { .. } => SchedAttrs {
            consumes_go: true,
            ..clocked
        },
        CompKind::Scoreboard | CompKind::Stallboard => SchedAttrs {
            consumes_go: true,
            produces_done: true,
            ..clocked
        },
        CompKind::Kicker(_) | CompKind::Referee { .. } => clocked,
        CompKind::RegisterPhysical { .. } | CompKind::MemoryPhysical { .. } => SchedAttrs {
            consumes_clock: true,
            ..none
        },
        CompKind::Decision { .. } => SchedAttrs {
            consumes_go: true,
            produces_done: true,
            ..none
        },
        _ => none,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_idx::IndexRef;

    #[test]
    fn memory_accesses_are_variable() {
        let exit = ExitIdx::new(3);
        let kind = CompKind::Access {
            resource: crate::ResourceIdx::new(0),
            kind: AccessKind::MemoryRead,
        };
        assert_eq!(latency(&kind, exit), Latency::open_at(1, exit));
        assert!(attrs(&kind).produces_done);
    }

    #[test]
    fn sequential_elements_have_no_depth() {
        assert_eq!(gate_depth(&CompKind::Reg(RegKind::Plain)), 0);
        assert_eq!(gate_depth(&CompKind::Latch), 0);
        assert_eq!(gate_depth(&CompKind::Op(OpKind::And)), 1);
    }
}
