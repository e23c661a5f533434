//! Shared resources, tasks and design-level pins.
use crate::{BusIdx, CompIdx, PortIdx, TaskIdx};
use forge_utils::{GetName, Id};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum ResourceKind {
    Register {
        width: u32,
    },
    /// One port of a logical memory.
    MemoryPort {
        width: u32,
        address_width: u32,
        /// Read data is valid in the same cycle as the request.
        combinational_read: bool,
    },
}

impl ResourceKind {
    pub fn width(&self) -> u32 {
        match self {
            ResourceKind::Register { width }
            | ResourceKind::MemoryPort { width, .. } => *width,
        }
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, ResourceKind::MemoryPort { .. })
    }
}

/// A register or memory port shared by the accesses of one or more tasks.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Resource {
    pub name: Id,
    pub kind: ResourceKind,
    /// More than one task touches this resource.
    pub arbitrated: bool,
    /// Every live access component referencing this resource.
    pub accesses: Vec<CompIdx>,
    /// Tasks touching this resource, filled in by the access counter.
    pub tasks: Vec<TaskIdx>,
    /// The physical implementation, once the global connector created it.
    pub physical: Option<CompIdx>,
    pub live: bool,
}

impl GetName for Resource {
    fn name(&self) -> Id {
        self.name
    }
}

/// A top-level entry point wrapping one call.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Task {
    pub name: Id,
    pub call: CompIdx,
    /// Started by a kicker rather than an external GO.
    pub autostart: bool,
    pub balanceable: bool,
    /// Set by the scheduler.
    pub balanced: bool,
    /// Set by the gate-depth pass.
    pub max_gate_depth: u32,
    pub clock_domain: Id,
    pub kicker: Option<CompIdx>,
}

impl GetName for Task {
    fn name(&self) -> Id {
        self.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum PinSignal {
    /// Drives a task input.
    Input(PortIdx),
    /// Observes a task output.
    Output(BusIdx),
}

/// An external connection of the design.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Pin {
    pub name: Id,
    pub task: TaskIdx,
    pub width: u32,
    pub signal: PinSignal,
}
