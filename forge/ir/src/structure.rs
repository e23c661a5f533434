//! Ports, buses, exits, entries and dependencies: the edges of the design
//! graph.
use crate::{BusIdx, CompIdx, ExitIdx, Latency, PortIdx, ResourceIdx};
use forge_utils::Id;
use linked_hash_map::LinkedHashMap;
use smallvec::SmallVec;

/// The role a port plays on its component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum PortKind {
    Go,
    Clock,
    Reset,
    Data,
    /// Enable input of a register or latch.
    Enable,
    /// Select input of a mux, paired with the data port that follows it.
    Select,
    /// Stall input of a stallboard.
    Stall,
    /// Resource connection added by the global connector.
    Sideband,
}

impl PortKind {
    /// Ports that carry a value into the component.
    pub fn is_data(&self) -> bool {
        !matches!(self, PortKind::Go | PortKind::Clock | PortKind::Reset)
    }
}

/// An input of a component. Driven by at most one [Bus].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Port {
    pub owner: CompIdx,
    pub kind: PortKind,
    pub name: Id,
    pub width: u32,
    /// Physical driver, set by scheduling or the global connector.
    pub bus: Option<BusIdx>,
    /// For module ports, the InBuf bus that carries this port inward. For
    /// OutBuf ports, the module exit bus it drives outward.
    pub peer: Option<BusIdx>,
    /// Set on sideband ports that carry a connection to this resource.
    pub resource: Option<ResourceIdx>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum BusKind {
    Done,
    Data,
    Clock,
    Reset,
    Sideband,
}

/// An output of a component. May drive any number of ports.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Bus {
    pub exit: ExitIdx,
    pub kind: BusKind,
    pub name: Id,
    pub width: u32,
    /// For InBuf buses, the module port. For module exit buses, the OutBuf
    /// port that drives them.
    pub peer: Option<PortIdx>,
    /// Ports physically driven by this bus.
    pub ports: Vec<PortIdx>,
    /// Value known at compile time, if any.
    pub value: Option<u64>,
    /// Set on sideband buses that carry a connection to this resource.
    pub resource: Option<ResourceIdx>,
}

/// The kind of completion an exit represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum ExitTag {
    Done,
    Return,
    Break,
    Continue,
    /// Loop body completion that starts another iteration.
    Feedback,
    Sideband,
}

/// A completion point of a component.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Exit {
    pub owner: CompIdx,
    pub tag: ExitTag,
    /// Distinguishes exits sharing a tag, such as the two DONE exits of a
    /// decision.
    pub label: Option<Id>,
    pub done: BusIdx,
    /// Data and sideband buses, in creation order.
    pub buses: SmallVec<[BusIdx; 2]>,
    /// GO to DONE latency of the owner along this exit.
    pub latency: Latency,
    /// Set by the scheduler: latency of this exit relative to the GO of the
    /// enclosing module.
    pub resolved: Option<Latency>,
    /// The OutBuf sinking this exit, for module exits.
    pub peer: Option<CompIdx>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum DepKind {
    /// The port consumes the value on the bus.
    Data,
    /// The port must not assert before the bus's exit completes.
    Control,
    /// Ordering constraint added around timing barriers.
    Wait,
}

/// A logical edge from a consuming port to a producing bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Dependency {
    pub kind: DepKind,
    pub bus: BusIdx,
    pub delay_clocks: u32,
}

impl Dependency {
    pub fn data(bus: BusIdx) -> Self {
        Dependency {
            kind: DepKind::Data,
            bus,
            delay_clocks: 0,
        }
    }

    pub fn control(bus: BusIdx) -> Self {
        Dependency {
            kind: DepKind::Control,
            bus,
            delay_clocks: 0,
        }
    }

    pub fn wait(bus: BusIdx) -> Self {
        Dependency {
            kind: DepKind::Wait,
            bus,
            delay_clocks: 0,
        }
    }

    pub fn delayed(mut self, clocks: u32) -> Self {
        self.delay_clocks = clocks;
        self
    }
}

/// The dependencies of one activation context of a component.
#[derive(Debug, Clone)]
pub struct Entry {
    pub owner: CompIdx,
    /// The exit whose completion activates this context, if any.
    pub driving_exit: Option<ExitIdx>,
    pub deps: LinkedHashMap<PortIdx, SmallVec<[Dependency; 1]>>,
    /// Resolved by the scheduler: the bus that controls this context.
    pub control: Option<BusIdx>,
    /// Resolved by the scheduler: latency of `control` relative to the GO of
    /// the enclosing module.
    pub latency: Option<Latency>,
    /// Resolved by the scheduler: the bus feeding each data port in this
    /// context.
    pub scheduled: LinkedHashMap<PortIdx, BusIdx>,
}

impl Entry {
    pub fn new(owner: CompIdx, driving_exit: Option<ExitIdx>) -> Self {
        Entry {
            owner,
            driving_exit,
            deps: LinkedHashMap::new(),
            control: None,
            latency: None,
            scheduled: LinkedHashMap::new(),
        }
    }

    pub fn add_dependency(&mut self, port: PortIdx, dep: Dependency) {
        let deps = self.deps.entry(port).or_insert_with(SmallVec::new);
        if !deps.contains(&dep) {
            deps.push(dep);
        }
    }

    pub fn dependencies(&self, port: PortIdx) -> &[Dependency] {
        self.deps.get(&port).map(|d| d.as_slice()).unwrap_or(&[])
    }

    /// Every dependency in this entry, with the port it constrains.
    pub fn iter_deps(&self) -> impl Iterator<Item = (PortIdx, &Dependency)> {
        self.deps
            .iter()
            .flat_map(|(port, deps)| deps.iter().map(move |d| (*port, d)))
    }

    /// Remove every dependency on `bus`. Returns the number removed.
    pub fn remove_deps_on(&mut self, bus: BusIdx) -> usize {
        let mut removed = 0;
        for deps in self.deps.iter_mut().map(|(_, deps)| deps) {
            let before = deps.len();
            deps.retain(|d| d.bus != bus);
            removed += before - deps.len();
        }
        removed
    }

    /// Retarget every dependency on `from` to `to`.
    pub fn replace_bus(&mut self, from: BusIdx, to: BusIdx) {
        for deps in self.deps.iter_mut().map(|(_, deps)| deps) {
            for dep in deps.iter_mut() {
                if dep.bus == from {
                    dep.bus = to;
                }
            }
        }
    }
}

/// Handle pair returned when a data port is added to a module.
#[derive(Debug, Clone, Copy)]
pub struct ModulePort {
    pub port: PortIdx,
    /// The InBuf bus that carries the port inside the module.
    pub inner: BusIdx,
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_idx::IndexRef;

    #[test]
    fn dependencies_follow_their_bus() {
        let (a, b, c) = (BusIdx::new(0), BusIdx::new(1), BusIdx::new(2));
        let (p, q) = (PortIdx::new(0), PortIdx::new(1));
        let mut entry = Entry::new(CompIdx::new(0), None);
        entry.add_dependency(p, Dependency::data(a));
        entry.add_dependency(p, Dependency::wait(b));
        entry.add_dependency(q, Dependency::control(a));
        entry.add_dependency(q, Dependency::control(a));
        assert_eq!(entry.iter_deps().count(), 3);

        entry.replace_bus(a, c);
        assert_eq!(entry.dependencies(p)[0].bus, c);
        assert_eq!(entry.dependencies(q)[0].bus, c);

        assert_eq!(entry.remove_deps_on(c), 2);
        assert_eq!(entry.dependencies(p), &[Dependency::wait(b)]);
        assert!(entry.dependencies(q).is_empty());
    }
}
