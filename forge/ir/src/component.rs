//! Nodes of the design graph.
use crate::{CompIdx, EntryIdx, ExitIdx, PortIdx, ResourceIdx};
use forge_utils::Id;
use smallvec::SmallVec;

/// Combinational primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum OpKind {
    And,
    Or,
    Not,
    /// Select/data port pairs; the result follows the asserted select.
    Mux,
    Constant(u64),
    /// Placeholder with one data bus per data port.
    NoOp,
    /// Wire with a single input. Used for stall and loop feedback signals.
    PassThrough,
    /// Any other combinational operator supplied by the front end.
    Logic(Id),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum RegKind {
    /// Loads every clock.
    Plain,
    /// Loads when its enable port is asserted.
    Enable,
    /// Resettable one-bit flop used to delay control signals.
    Control,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum AccessKind {
    RegisterRead,
    RegisterWrite,
    MemoryRead,
    MemoryWrite,
}

impl AccessKind {
    pub fn is_write(&self) -> bool {
        matches!(self, AccessKind::RegisterWrite | AccessKind::MemoryWrite)
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, AccessKind::MemoryRead | AccessKind::MemoryWrite)
    }
}

/// Autostart pulse generators attached to tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum KickerKind {
    /// Restarts a fully block scheduled task whenever it can accept data.
    Continuous,
    /// Restarts on every repeat pulse, optionally through a decoupling flop.
    Perpetual { feedback_flop: bool },
    /// One per clock domain, shared by every task repeated from it.
    Shared,
}

/// Where a memory referee clears a captured read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum ReadClear {
    /// Synchronous read ports: clear before the read data mux.
    BeforeMux,
    /// Combinational read ports: clear after the read data mux, so the read
    /// data never feeds back into its own request.
    AfterMux,
}

/// Every kind of node. Passes dispatch on this with a single `match`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum CompKind {
    /// Module entry boundary. Sources GO, clock, reset and the module's
    /// data ports.
    InBuf,
    /// Module exit boundary; one per module exit.
    OutBuf,
    /// Ordered sequence of children executing as parallel dataflow.
    Block { procedure_body: bool },
    Branch {
        decision: CompIdx,
        true_block: CompIdx,
        false_block: CompIdx,
    },
    Decision {
        test_block: CompIdx,
        not: CompIdx,
        true_and: CompIdx,
        false_and: CompIdx,
    },
    Loop {
        init: CompIdx,
        body: Option<CompIdx>,
        control_reg: Option<CompIdx>,
        data_regs: Vec<CompIdx>,
        iterations: Option<u32>,
    },
    LoopBody {
        decision: CompIdx,
        body: CompIdx,
        flop_needed: bool,
    },
    /// Invocation of a procedure. Ports and exits correspond positionally
    /// to those of the procedure body.
    Call { procedure: CompIdx },
    Op(OpKind),
    Reg(RegKind),
    Latch,
    /// Fires once every input has fired.
    Scoreboard,
    /// Scoreboard that additionally waits for each stall input.
    Stallboard,
    Access {
        resource: ResourceIdx,
        kind: AccessKind,
    },
    /// Explicit timing barrier. Only global ones make calls barriers.
    TimingOp { global: bool },
    /// Legacy pin access. Rejected by the passes.
    PinAccess,
    Kicker(KickerKind),
    /// Physical storage of a register resource.
    RegisterPhysical { resource: ResourceIdx },
    /// Physical interface of a memory port resource.
    MemoryPhysical { resource: ResourceIdx },
    /// Merges several accessors of a resource into one channel.
    Gateway {
        resource: ResourceIdx,
        /// Bit offset of each accessor's data within the resource word.
        lane_offsets: Vec<u32>,
    },
    /// Round-robin arbiter in front of a memory port.
    Referee {
        resource: ResourceIdx,
        slots: u32,
        simple: bool,
        read_clear: ReadClear,
    },
}

impl CompKind {
    pub fn is_module(&self) -> bool {
        matches!(
            self,
            CompKind::Block { .. }
                | CompKind::Branch { .. }
                | CompKind::Decision { .. }
                | CompKind::Loop { .. }
                | CompKind::LoopBody { .. }
        )
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self, CompKind::InBuf | CompKind::OutBuf)
    }

    /// Elements whose outputs only change on a clock edge.
    pub fn is_sequential(&self) -> bool {
        matches!(
            self,
            CompKind::Reg(_)
                | CompKind::Latch
                | CompKind::RegisterPhysical { .. }
                | CompKind::MemoryPhysical { .. }
                | CompKind::Referee { .. }
                | CompKind::Kicker(_)
        )
    }

    pub fn resource(&self) -> Option<ResourceIdx> {
        match self {
            CompKind::Access { resource, .. }
            | CompKind::RegisterPhysical { resource }
            | CompKind::MemoryPhysical { resource }
            | CompKind::Gateway { resource, .. }
            | CompKind::Referee { resource, .. } => Some(*resource),
            _ => None,
        }
    }

    /// Short prefix used when generating names.
    pub fn prefix(&self) -> &'static str {
        match self {
            CompKind::InBuf => "inbuf",
            CompKind::OutBuf => "outbuf",
            CompKind::Block { .. } => "block",
            CompKind::Branch { .. } => "branch",
            CompKind::Decision { .. } => "decision",
            CompKind::Loop { .. } => "loop",
            CompKind::LoopBody { .. } => "loop_body",
            CompKind::Call { .. } => "call",
            CompKind::Op(op) => match op {
                OpKind::And => "and",
                OpKind::Or => "or",
                OpKind::Not => "not",
                OpKind::Mux => "mux",
                OpKind::Constant(_) => "const",
                OpKind::NoOp => "noop",
                OpKind::PassThrough => "pass",
                OpKind::Logic(_) => "op",
            },
            CompKind::Reg(RegKind::Control) => "ctrl_reg",
            CompKind::Reg(RegKind::Enable) => "sync_enable",
            CompKind::Reg(RegKind::Plain) => "reg",
            CompKind::Latch => "latch",
            CompKind::Scoreboard => "scoreboard",
            CompKind::Stallboard => "stallboard",
            CompKind::Access { kind, .. } => match kind {
                AccessKind::RegisterRead => "reg_read",
                AccessKind::RegisterWrite => "reg_write",
                AccessKind::MemoryRead => "mem_read",
                AccessKind::MemoryWrite => "mem_write",
            },
            CompKind::TimingOp { .. } => "timing",
            CompKind::PinAccess => "pin",
            CompKind::Kicker(_) => "kicker",
            CompKind::RegisterPhysical { .. } => "register",
            CompKind::MemoryPhysical { .. } => "memory",
            CompKind::Gateway { .. } => "gateway",
            CompKind::Referee { .. } => "referee",
        }
    }
}

/// Scheduling attributes of a component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct SchedAttrs {
    pub consumes_go: bool,
    pub consumes_clock: bool,
    pub consumes_reset: bool,
    pub produces_done: bool,
    /// DONE is asserted from a flop rather than combinationally from GO.
    pub done_synchronous: bool,
}

/// The parts only modules have.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct ModuleInfo {
    pub inbuf: CompIdx,
    pub outbufs: SmallVec<[CompIdx; 1]>,
    /// Every contained component except the boundary nodes. For a block,
    /// the order is the program sequence.
    pub children: Vec<CompIdx>,
    /// Components whose exits are seeded before traversal to break cycles.
    pub feedback_points: Vec<CompIdx>,
}

impl ModuleInfo {
    pub fn add_feedback_point(&mut self, comp: CompIdx) {
        if !self.feedback_points.contains(&comp) {
            self.feedback_points.push(comp);
        }
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Component {
    pub name: Id,
    pub kind: CompKind,
    /// The enclosing module or call. `None` at design level.
    pub owner: Option<CompIdx>,
    pub go: PortIdx,
    pub clock: PortIdx,
    pub reset: PortIdx,
    /// Every non-control port, in creation order.
    pub ports: SmallVec<[PortIdx; 4]>,
    pub exits: SmallVec<[ExitIdx; 1]>,
    pub entries: SmallVec<[EntryIdx; 1]>,
    pub attrs: SchedAttrs,
    /// Intrinsic combinational depth from any input to any output.
    pub gate_depth: u32,
    pub non_removable: bool,
    pub module: Option<ModuleInfo>,
    /// Cleared when the component is removed from the design.
    pub live: bool,
}

impl Component {
    pub fn is_module(&self) -> bool {
        self.module.is_some()
    }
}
