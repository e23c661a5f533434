//! The design arena: every node of the graph, addressed by typed indices.
use crate::{
    Bus, BusIdx, BusKind, CompIdx, CompKind, Component, DepKind, Dependency, Entry, EntryIdx,
    Exit, ExitIdx, ExitTag, ModuleInfo, OpKind, Pin, Port, PortIdx, PortKind, Resource,
    ResourceIdx, ResourceKind, Task, TaskIdx, primitives,
};
use forge_idx::IndexedMap;
use forge_utils::{Error, ForgeResult, Id, NameGenerator};
use itertools::Itertools;
use smallvec::SmallVec;
use std::collections::HashSet;

/// Bound on the number of boundary crossings followed when evaluating a
/// constant.
const CONST_FUEL: u32 = 64;

/// A complete design. Passes take `&mut Design` exclusively and mutate it
/// in place.
#[derive(Debug, Default)]
pub struct Design {
    pub comps: IndexedMap<CompIdx, Component>,
    pub ports: IndexedMap<PortIdx, Port>,
    pub buses: IndexedMap<BusIdx, Bus>,
    pub exits: IndexedMap<ExitIdx, Exit>,
    pub entries: IndexedMap<EntryIdx, Entry>,
    pub resources: IndexedMap<ResourceIdx, Resource>,
    pub tasks: IndexedMap<TaskIdx, Task>,
    /// Components at design level: task calls and the resource hardware
    /// synthesized by the global connector.
    pub globals: Vec<CompIdx>,
    pub pins: Vec<Pin>,
    /// Largest combinational depth over every task.
    pub max_gate_depth: u32,
    /// Largest intrinsic depth of a single component.
    pub unbreakable_gate_depth: u32,
    /// Set once the access counter has filled in resource task sets.
    pub accesses_counted: bool,
    namegen: NameGenerator,
}

impl Design {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a component inside `owner`.
    ///
    /// Every component gets GO, clock and reset ports and, except for
    /// OutBufs, one DONE exit. Modules additionally get their InBuf and the
    /// OutBuf of that exit.
    pub fn add_component(&mut self, kind: CompKind, owner: Option<CompIdx>) -> CompIdx {
        let idx = self.comps.peek_next_idx();
        let name = self.namegen.gen_name(kind.prefix());
        let go = self.control_port(idx, PortKind::Go, "go");
        let clock = self.control_port(idx, PortKind::Clock, "clk");
        let reset = self.control_port(idx, PortKind::Reset, "reset");

        let is_module = kind.is_module();
        let comp = Component {
            name,
            attrs: primitives::attrs(&kind),
            gate_depth: primitives::gate_depth(&kind),
            non_removable: false,
            owner,
            go,
            clock,
            reset,
            ports: SmallVec::new(),
            exits: SmallVec::new(),
            entries: SmallVec::new(),
            module: None,
            live: true,
            kind,
        };
        let pushed = self.comps.push(comp);
        debug_assert!(pushed == idx);

        if let Some(owner) = owner {
            let is_inbuf = matches!(self.comps[idx].kind, CompKind::InBuf);
            let is_outbuf = matches!(self.comps[idx].kind, CompKind::OutBuf);
            if let Some(module) = self.comps[owner].module.as_mut() {
                if is_outbuf {
                    module.outbufs.push(idx);
                } else if !is_inbuf {
                    module.children.push(idx);
                }
            }
        }

        if is_module {
            let inbuf = self.add_component(CompKind::InBuf, Some(idx));
            let inbuf_exit = self.comps[inbuf].exits[0];
            let go_bus = self.exits[inbuf_exit].done;
            let clock_bus = self.add_bus(inbuf_exit, BusKind::Clock, "clk", 1);
            let reset_bus = self.add_bus(inbuf_exit, BusKind::Reset, "reset", 1);
            for (port, bus) in [(go, go_bus), (clock, clock_bus), (reset, reset_bus)] {
                self.ports[port].peer = Some(bus);
                self.buses[bus].peer = Some(port);
            }
            self.comps[idx].module = Some(ModuleInfo {
                inbuf,
                outbufs: SmallVec::new(),
                children: Vec::new(),
                feedback_points: Vec::new(),
            });
        }

        if !matches!(self.comps[idx].kind, CompKind::OutBuf) {
            self.add_exit(idx, ExitTag::Done, None);
        }
        idx
    }

    fn control_port(&mut self, owner: CompIdx, kind: PortKind, name: &str) -> PortIdx {
        self.ports.push(Port {
            owner,
            kind,
            name: Id::from(name),
            width: 1,
            bus: None,
            peer: None,
            resource: None,
        })
    }

    /// Add an exit to `comp`. For modules this also creates the OutBuf that
    /// sinks the exit.
    pub fn add_exit(&mut self, comp: CompIdx, tag: ExitTag, label: Option<Id>) -> ExitIdx {
        let exit = self.exits.peek_next_idx();
        let done_name = match self.comps[comp].kind {
            CompKind::InBuf => "go",
            _ => "done",
        };
        let done = self.buses.push(Bus {
            exit,
            kind: BusKind::Done,
            name: Id::from(done_name),
            width: 1,
            peer: None,
            ports: Vec::new(),
            value: None,
            resource: None,
        });
        let latency = primitives::latency(&self.comps[comp].kind, exit);
        self.exits.push(Exit {
            owner: comp,
            tag,
            label,
            done,
            buses: SmallVec::new(),
            latency,
            resolved: None,
            peer: None,
        });
        self.comps[comp].exits.push(exit);

        if self.comps[comp].is_module() {
            let outbuf = self.add_component(CompKind::OutBuf, Some(comp));
            let outbuf_go = self.comps[outbuf].go;
            self.exits[exit].peer = Some(outbuf);
            self.buses[done].peer = Some(outbuf_go);
            self.ports[outbuf_go].peer = Some(done);
        }
        exit
    }

    /// Add an input port. A module port also gets the InBuf bus that carries
    /// it inside.
    pub fn add_port<S: Into<Id>>(
        &mut self,
        comp: CompIdx,
        kind: PortKind,
        name: S,
        width: u32,
    ) -> PortIdx {
        let name = name.into();
        let port = self.ports.push(Port {
            owner: comp,
            kind,
            name,
            width,
            bus: None,
            peer: None,
            resource: None,
        });
        self.comps[comp].ports.push(port);

        if let Some(inbuf) = self.comps[comp].module.as_ref().map(|m| m.inbuf) {
            let bus_kind = match kind {
                PortKind::Sideband => BusKind::Sideband,
                _ => BusKind::Data,
            };
            let inbuf_exit = self.comps[inbuf].exits[0];
            let bus = self.add_bus(inbuf_exit, bus_kind, name, width);
            self.ports[port].peer = Some(bus);
            self.buses[bus].peer = Some(port);
        }
        port
    }

    /// Add an output bus to `exit`. A module exit bus also gets the OutBuf
    /// port that drives it.
    pub fn add_bus<S: Into<Id>>(
        &mut self,
        exit: ExitIdx,
        kind: BusKind,
        name: S,
        width: u32,
    ) -> BusIdx {
        let name = name.into();
        let bus = self.buses.push(Bus {
            exit,
            kind,
            name,
            width,
            peer: None,
            ports: Vec::new(),
            value: None,
            resource: None,
        });
        self.exits[exit].buses.push(bus);

        if let Some(outbuf) = self.exits[exit].peer {
            let port_kind = match kind {
                BusKind::Sideband => PortKind::Sideband,
                _ => PortKind::Data,
            };
            let port = self.add_port(outbuf, port_kind, name, width);
            self.ports[port].peer = Some(bus);
            self.buses[bus].peer = Some(port);
        }
        bus
    }

    /// A sideband port carrying a connection to `resource`. The InBuf bus of
    /// a module port is tagged too.
    pub fn add_sideband_port<S: Into<Id>>(
        &mut self,
        comp: CompIdx,
        name: S,
        width: u32,
        resource: ResourceIdx,
    ) -> PortIdx {
        let port = self.add_port(comp, PortKind::Sideband, name, width);
        self.ports[port].resource = Some(resource);
        if let Some(inner) = self.ports[port].peer {
            self.buses[inner].resource = Some(resource);
        }
        port
    }

    /// A sideband bus carrying a connection to `resource`. The OutBuf port
    /// of a module exit bus is tagged too.
    pub fn add_sideband_bus<S: Into<Id>>(
        &mut self,
        exit: ExitIdx,
        name: S,
        width: u32,
        resource: ResourceIdx,
    ) -> BusIdx {
        let bus = self.add_bus(exit, BusKind::Sideband, name, width);
        self.buses[bus].resource = Some(resource);
        if let Some(port) = self.buses[bus].peer {
            self.ports[port].resource = Some(resource);
        }
        bus
    }

    pub fn add_entry(&mut self, comp: CompIdx, driving_exit: Option<ExitIdx>) -> EntryIdx {
        let entry = self.entries.push(Entry::new(comp, driving_exit));
        self.comps[comp].entries.push(entry);
        entry
    }

    /// The first entry of `comp`, created on demand.
    pub fn primary_entry(&mut self, comp: CompIdx) -> EntryIdx {
        match self.comps[comp].entries.first() {
            Some(entry) => *entry,
            None => self.add_entry(comp, None),
        }
    }

    pub fn add_dep(&mut self, entry: EntryIdx, port: PortIdx, dep: Dependency) {
        self.entries[entry].add_dependency(port, dep);
    }

    pub fn add_resource<S: Into<Id>>(&mut self, name: S, kind: ResourceKind) -> ResourceIdx {
        self.resources.push(Resource {
            name: name.into(),
            kind,
            arbitrated: false,
            accesses: Vec::new(),
            tasks: Vec::new(),
            physical: None,
            live: true,
        })
    }

    pub fn add_task(&mut self, task: Task) -> TaskIdx {
        self.tasks.push(task)
    }

    /// Generate a fresh name with the given prefix.
    pub fn gen_name<S: Into<Id>>(&mut self, prefix: S) -> Id {
        self.namegen.gen_name(prefix)
    }

    // ------------------------------------------------------------------
    // Physical connections
    // ------------------------------------------------------------------

    /// Drive `port` from `bus`, replacing any previous driver.
    pub fn connect(&mut self, port: PortIdx, bus: BusIdx) {
        self.disconnect(port);
        self.ports[port].bus = Some(bus);
        self.buses[bus].ports.push(port);
    }

    pub fn disconnect(&mut self, port: PortIdx) {
        if let Some(bus) = self.ports[port].bus.take() {
            self.buses[bus].ports.retain(|p| *p != port);
        }
    }

    /// Move the physical consumers of `from` whose owner is not in `except`
    /// onto `to`.
    pub fn rewire_physical(&mut self, from: BusIdx, to: BusIdx, except: &[CompIdx]) {
        let moved = self.buses[from]
            .ports
            .iter()
            .copied()
            .filter(|p| !except.contains(&self.ports[*p].owner))
            .collect_vec();
        for port in moved {
            self.connect(port, to);
        }
    }

    /// Retarget every logical dependency on `from` to `to`.
    pub fn rewire_logical(&mut self, from: BusIdx, to: BusIdx) {
        for entry in self.entries.values_mut() {
            entry.replace_bus(from, to);
        }
    }

    pub fn rewire(&mut self, from: BusIdx, to: BusIdx) {
        self.rewire_physical(from, to, &[]);
        self.rewire_logical(from, to);
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn is_live(&self, comp: CompIdx) -> bool {
        self.comps[comp].live
    }

    pub fn module(&self, comp: CompIdx) -> ForgeResult<&ModuleInfo> {
        self.comps[comp].module.as_ref().ok_or_else(|| {
            Error::invariant("component is not a module").with_node(self.comps[comp].name)
        })
    }

    pub fn module_mut(&mut self, comp: CompIdx) -> ForgeResult<&mut ModuleInfo> {
        let name = self.comps[comp].name;
        self.comps[comp]
            .module
            .as_mut()
            .ok_or_else(|| Error::invariant("component is not a module").with_node(name))
    }

    /// Children of a module in sequence order. Empty for non-modules.
    pub fn children(&self, comp: CompIdx) -> &[CompIdx] {
        self.comps[comp]
            .module
            .as_ref()
            .map(|m| m.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn inbuf(&self, module: CompIdx) -> Option<CompIdx> {
        self.comps[module].module.as_ref().map(|m| m.inbuf)
    }

    pub fn outbufs(&self, module: CompIdx) -> &[CompIdx] {
        self.comps[module]
            .module
            .as_ref()
            .map(|m| m.outbufs.as_slice())
            .unwrap_or(&[])
    }

    /// The GO signal inside a module: the DONE bus of its InBuf.
    pub fn go_bus(&self, module: CompIdx) -> Option<BusIdx> {
        let inbuf = self.inbuf(module)?;
        self.done_bus(inbuf)
    }

    /// DONE bus of the first exit.
    pub fn done_bus(&self, comp: CompIdx) -> Option<BusIdx> {
        self.comps[comp].exits.first().map(|x| self.exits[*x].done)
    }

    /// First data bus of the first exit.
    pub fn result_bus(&self, comp: CompIdx) -> Option<BusIdx> {
        let exit = self.comps[comp].exits.first()?;
        self.exits[*exit]
            .buses
            .iter()
            .copied()
            .find(|b| self.buses[*b].kind == BusKind::Data)
    }

    pub fn bus_owner(&self, bus: BusIdx) -> CompIdx {
        self.exits[self.buses[bus].exit].owner
    }

    pub fn port_by_name<S: Into<Id>>(&self, comp: CompIdx, name: S) -> Option<PortIdx> {
        let name = name.into();
        self.comps[comp]
            .ports
            .iter()
            .copied()
            .find(|p| self.ports[*p].name == name)
    }

    /// Ports carrying values into the component.
    pub fn data_ports(&self, comp: CompIdx) -> impl Iterator<Item = PortIdx> + '_ {
        self.comps[comp]
            .ports
            .iter()
            .copied()
            .filter(|p| self.ports[*p].kind.is_data())
    }

    /// Every bus of every exit, DONE buses included.
    pub fn output_buses(&self, comp: CompIdx) -> impl Iterator<Item = BusIdx> + '_ {
        self.comps[comp].exits.iter().flat_map(|x| {
            let exit = &self.exits[*x];
            std::iter::once(exit.done).chain(exit.buses.iter().copied())
        })
    }

    /// Every port of the component, control ports included.
    pub fn all_ports(&self, comp: CompIdx) -> Vec<PortIdx> {
        let c = &self.comps[comp];
        [c.go, c.clock, c.reset]
            .into_iter()
            .chain(c.ports.iter().copied())
            .collect()
    }

    /// Physical consumers of `bus` that are still part of the design.
    pub fn consumers(&self, bus: BusIdx) -> impl Iterator<Item = PortIdx> + '_ {
        self.buses[bus]
            .ports
            .iter()
            .copied()
            .filter(|p| self.comps[self.ports[*p].owner].live)
    }

    /// Live entries with at least one dependency on `bus`.
    pub fn dependents(&self, bus: BusIdx) -> Vec<(EntryIdx, PortIdx)> {
        self.entries
            .iter()
            .filter(|(_, e)| self.comps[e.owner].live)
            .flat_map(|(idx, e)| {
                e.iter_deps()
                    .filter(|(_, d)| d.bus == bus)
                    .map(move |(port, _)| (idx, port))
                    .collect_vec()
            })
            .unique()
            .collect()
    }

    /// The bus feeding `port`: its physical driver, or failing that the one
    /// bus every data dependency of the port agrees on.
    pub fn source_of(&self, port: PortIdx) -> Option<BusIdx> {
        if let Some(bus) = self.ports[port].bus {
            return Some(bus);
        }
        let owner = self.ports[port].owner;
        self.comps[owner]
            .entries
            .iter()
            .flat_map(|e| self.entries[*e].dependencies(port))
            .filter(|d| d.kind == DepKind::Data)
            .map(|d| d.bus)
            .unique()
            .exactly_one()
            .ok()
    }

    /// Evaluate `bus` when its value is known at compile time. Follows
    /// constants, inverters, pass-throughs and module boundaries.
    pub fn const_value(&self, bus: BusIdx) -> Option<u64> {
        self.const_value_with(bus, CONST_FUEL)
    }

    fn const_value_with(&self, bus: BusIdx, fuel: u32) -> Option<u64> {
        let fuel = fuel.checked_sub(1)?;
        let b = &self.buses[bus];
        if let Some(value) = b.value {
            return Some(value);
        }
        if b.kind != BusKind::Data {
            return None;
        }
        if let Some(peer) = b.peer {
            return self.const_value_with(self.source_of(peer)?, fuel);
        }
        let owner = self.bus_owner(bus);
        let first_input = || self.data_ports(owner).next();
        match &self.comps[owner].kind {
            CompKind::Op(OpKind::Constant(v)) => Some(*v),
            CompKind::Op(OpKind::Not) => {
                let v = self.const_value_with(self.source_of(first_input()?)?, fuel)?;
                Some(u64::from(v == 0))
            }
            CompKind::Op(OpKind::PassThrough) => {
                self.const_value_with(self.source_of(first_input()?)?, fuel)
            }
            _ => None,
        }
    }

    /// Every component below `comp`, through module children and call
    /// bodies. Boundary nodes are not included.
    pub fn descendants(&self, comp: CompIdx) -> Vec<CompIdx> {
        let mut out = Vec::new();
        let mut stack = vec![comp];
        while let Some(c) = stack.pop() {
            match &self.comps[c].kind {
                CompKind::Call { procedure } => {
                    out.push(*procedure);
                    stack.push(*procedure);
                }
                _ => {
                    for child in self.children(c) {
                        out.push(*child);
                        stack.push(*child);
                    }
                }
            }
        }
        out
    }

    /// Whether `comp` is, or contains, a component satisfying `pred`.
    pub fn contains<F>(&self, comp: CompIdx, pred: F) -> bool
    where
        F: Fn(&Component) -> bool,
    {
        pred(&self.comps[comp])
            || self
                .descendants(comp)
                .into_iter()
                .any(|c| self.comps[c].live && pred(&self.comps[c]))
    }

    /// The module or call enclosing `comp`.
    pub fn owner(&self, comp: CompIdx) -> Option<CompIdx> {
        self.comps[comp].owner
    }

    pub fn live_globals(&self) -> impl Iterator<Item = CompIdx> + '_ {
        self.globals.iter().copied().filter(|c| self.comps[*c].live)
    }

    // ------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------

    /// Remove `comp` and everything it contains. Every physical connection
    /// and every logical dependency touching the removed nodes is dropped.
    pub fn remove_component(&mut self, comp: CompIdx) {
        if !self.comps[comp].live {
            return;
        }
        let mut doomed = vec![comp];
        doomed.extend(self.descendants(comp));
        let boundaries = doomed
            .iter()
            .filter_map(|c| self.comps[*c].module.as_ref())
            .flat_map(|m| std::iter::once(m.inbuf).chain(m.outbufs.iter().copied()))
            .collect_vec();
        doomed.extend(boundaries);

        let mut dead_buses = HashSet::new();
        for c in &doomed {
            for port in self.all_ports(*c) {
                self.disconnect(port);
            }
            for bus in self.output_buses(*c).collect_vec() {
                for port in std::mem::take(&mut self.buses[bus].ports) {
                    self.ports[port].bus = None;
                }
                dead_buses.insert(bus);
            }
        }
        for entry in self.entries.values_mut() {
            entry
                .deps
                .iter_mut()
                .for_each(|(_, deps)| deps.retain(|d| !dead_buses.contains(&d.bus)));
        }

        for c in doomed {
            if let Some(resource) = self.comps[c].kind.resource() {
                if matches!(self.comps[c].kind, CompKind::Access { .. }) {
                    self.resources[resource].accesses.retain(|a| *a != c);
                }
            }
            self.comps[c].live = false;
        }

        if let Some(owner) = self.comps[comp].owner {
            if let Some(module) = self.comps[owner].module.as_mut() {
                module.children.retain(|c| *c != comp);
                module.feedback_points.retain(|c| *c != comp);
            }
        }
        self.globals.retain(|c| *c != comp);
        log::trace!("removed `{}'", self.comps[comp].name);
    }

    /// Take `port` off its component, together with the InBuf bus that
    /// carries it inside a module.
    pub fn detach_port(&mut self, port: PortIdx) {
        self.disconnect(port);
        let owner = self.ports[port].owner;
        self.comps[owner].ports.retain(|p| *p != port);
        if let Some(inner) = self.ports[port].peer.take() {
            self.buses[inner].peer = None;
            self.detach_bus(inner);
        }
    }

    /// Take `bus` off its exit, together with the OutBuf port that drives
    /// it from inside a module.
    pub fn detach_bus(&mut self, bus: BusIdx) {
        for port in std::mem::take(&mut self.buses[bus].ports) {
            self.ports[port].bus = None;
        }
        let exit = self.buses[bus].exit;
        self.exits[exit].buses.retain(|b| *b != bus);
        if let Some(port) = self.buses[bus].peer.take() {
            self.ports[port].peer = None;
            self.detach_port(port);
        }
    }

    /// Detach every sideband port and bus that carries a connection to
    /// `resource`.
    pub fn detach_sideband(&mut self, resource: ResourceIdx) {
        let ports = self
            .ports
            .iter()
            .filter(|(_, p)| p.resource == Some(resource))
            .map(|(idx, _)| idx)
            .collect_vec();
        for port in ports {
            self.detach_port(port);
        }
        let buses = self
            .buses
            .iter()
            .filter(|(_, b)| b.resource == Some(resource))
            .map(|(idx, _)| idx)
            .collect_vec();
        for bus in buses {
            self.detach_bus(bus);
        }
    }

    /// Remove a resource together with the design-level hardware built for
    /// it.
    pub fn remove_resource(&mut self, resource: ResourceIdx) {
        let hardware = self
            .live_globals()
            .filter(|c| self.comps[*c].kind.resource() == Some(resource))
            .collect_vec();
        for comp in hardware {
            self.remove_component(comp);
        }
        let res = &mut self.resources[resource];
        res.physical = None;
        res.live = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Latency, RegKind};

    #[test]
    fn module_boundaries_are_wired() {
        let mut design = Design::new();
        let block = design.add_component(CompKind::Block { procedure_body: false }, None);
        let inbuf = design.inbuf(block).unwrap();
        let go = design.go_bus(block).unwrap();
        assert_eq!(design.bus_owner(go), inbuf);
        assert_eq!(design.buses[go].peer, Some(design.comps[block].go));
        assert_eq!(design.outbufs(block).len(), 1);

        let port = design.add_port(block, PortKind::Data, "a", 8);
        let inner = design.ports[port].peer.unwrap();
        assert_eq!(design.bus_owner(inner), inbuf);

        let exit = design.comps[block].exits[0];
        let out = design.add_bus(exit, BusKind::Data, "y", 8);
        let outbuf_port = design.buses[out].peer.unwrap();
        assert_eq!(design.ports[outbuf_port].owner, design.outbufs(block)[0]);
    }

    #[test]
    fn removal_detaches_everything() {
        let mut design = Design::new();
        let block = design.add_component(CompKind::Block { procedure_body: false }, None);
        let reg = design.add_component(CompKind::Reg(RegKind::Plain), Some(block));
        let not = design.add_component(CompKind::Op(OpKind::Not), Some(block));
        let reg_exit = design.comps[reg].exits[0];
        let q = design.add_bus(reg_exit, BusKind::Data, "q", 1);
        let input = design.add_port(not, PortKind::Data, "in0", 1);
        design.connect(input, q);
        let entry = design.primary_entry(not);
        design.add_dep(entry, input, Dependency::data(q));
        assert_eq!(design.dependents(q).len(), 1);
        assert_eq!(design.exits[reg_exit].latency, Latency::ONE);

        design.remove_component(reg);
        assert!(!design.is_live(reg));
        assert_eq!(design.ports[input].bus, None);
        assert!(design.dependents(q).is_empty());
        assert_eq!(design.children(block), &[not]);
    }

    #[test]
    fn constants_propagate_through_inverters() {
        let mut design = Design::new();
        let block = design.add_component(CompKind::Block { procedure_body: false }, None);
        let one = design.add_component(CompKind::Op(OpKind::Constant(1)), Some(block));
        let one_exit = design.comps[one].exits[0];
        let one_bus = design.add_bus(one_exit, BusKind::Data, "result", 1);
        let not = design.add_component(CompKind::Op(OpKind::Not), Some(block));
        let not_exit = design.comps[not].exits[0];
        let not_bus = design.add_bus(not_exit, BusKind::Data, "result", 1);
        let input = design.add_port(not, PortKind::Data, "in0", 1);
        let entry = design.primary_entry(not);
        design.add_dep(entry, input, Dependency::data(one_bus));
        assert_eq!(design.const_value(one_bus), Some(1));
        assert_eq!(design.const_value(not_bus), Some(0));
    }

    #[test]
    fn sideband_detaches_through_module_boundaries() {
        let mut design = Design::new();
        let mem = design.add_resource(
            "m",
            ResourceKind::MemoryPort {
                width: 8,
                address_width: 4,
                combinational_read: false,
            },
        );
        let block = design.add_component(CompKind::Block { procedure_body: false }, None);
        let user = design.add_component(CompKind::Op(OpKind::Not), Some(block));
        let exit = design.comps[block].exits[0];
        let addr = design.add_sideband_bus(exit, "addr", 4, mem);
        let outbuf_port = design.buses[addr].peer.unwrap();
        let rdata = design.add_sideband_port(block, "rdata", 8, mem);
        let inner = design.ports[rdata].peer.unwrap();
        let input = design.add_port(user, PortKind::Data, "in0", 8);
        design.connect(input, inner);
        assert_eq!(design.ports[outbuf_port].resource, Some(mem));
        assert_eq!(design.buses[inner].resource, Some(mem));

        design.detach_sideband(mem);
        assert!(!design.exits[exit].buses.contains(&addr));
        assert!(!design.comps[design.outbufs(block)[0]].ports.contains(&outbuf_port));
        assert!(!design.comps[block].ports.contains(&rdata));
        assert_eq!(design.ports[input].bus, None);
        assert_eq!(design.buses[inner].peer, None);
    }
}
