//! The design graph shared by every scheduling pass.
mod builder;
mod component;
mod context;
mod design;
mod idx;
mod latency;
pub mod primitives;
mod resource;
mod structure;

pub use builder::{BranchParts, Builder, LoopParts, LoopVar, add_task, procedure};
pub use component::{
    AccessKind, CompKind, Component, KickerKind, ModuleInfo, OpKind, ReadClear, RegKind,
    SchedAttrs,
};
pub use context::{Context, Policy};
pub use design::Design;
pub use idx::{BusIdx, CompIdx, EntryIdx, ExitIdx, PortIdx, ResourceIdx, TaskIdx};
pub use latency::Latency;
pub use resource::{Pin, PinSignal, Resource, ResourceKind, Task};
pub use structure::{
    Bus, BusKind, DepKind, Dependency, Entry, Exit, ExitTag, ModulePort, Port, PortKind,
};

pub use forge_utils::{Error, ForgeResult, GetName, Id};
