//! Stalls for memory processes.
//!
//! A process that starts at a component other than the module GO is
//! guarded by a stallboard in front of that component. A process that
//! starts at the module GO stalls the whole module instead: its inputs are
//! latched and its GO passes through a single stallboard.
use super::ModuleSchedule;
use crate::analysis::Process;
use forge_ir::{BusIdx, BusKind, CompIdx, CompKind, Design, Error, Latency, PortKind};
use forge_utils::ForgeResult;
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;
use std::collections::HashSet;

pub(super) struct StallState {
    processes: Vec<Process>,
    /// Stallboards guarding critical start points, with the processes they
    /// wait for.
    critical: Vec<(CompIdx, Vec<usize>)>,
    /// Processes starting at the module GO.
    module_sources: Vec<usize>,
}

impl StallState {
    pub fn new(processes: Vec<Process>) -> Self {
        StallState {
            processes,
            critical: Vec::new(),
            module_sources: Vec::new(),
        }
    }
}

impl ModuleSchedule {
    /// Insert a stallboard in front of `comp` when a process starts there.
    /// Returns the bus that now starts `comp`.
    pub(super) fn apply_stall(
        &mut self,
        design: &mut Design,
        comp: CompIdx,
        control: BusIdx,
    ) -> ForgeResult<BusIdx> {
        let starts = self
            .stall
            .processes
            .iter()
            .positions(|p| p.start() == comp)
            .collect_vec();
        if starts.is_empty() {
            return Ok(control);
        }
        if design.comps[comp].entries.len() > 1 {
            return Err(Error::invariant("stalling component has more than one entry")
                .with_node(design.comps[comp].name));
        }
        if control == self.tracker.go() {
            log::debug!(
                "`{}' starts a process at the GO of `{}'",
                design.comps[comp].name,
                design.comps[self.module].name
            );
            self.stall.module_sources.extend(starts);
            return Ok(control);
        }
        let (stallboard, out) = self.tracker.stallboard(design, control)?;
        design.module_mut(self.module)?.add_feedback_point(stallboard);
        log::debug!(
            "`{}' guards `{}'",
            design.comps[stallboard].name,
            design.comps[comp].name
        );
        self.stall.critical.push((stallboard, starts));
        Ok(out)
    }

    /// Connect the stall inputs gathered while scheduling the module.
    pub(super) fn close_module(&mut self, design: &mut Design) -> ForgeResult<()> {
        for (stallboard, procs) in std::mem::take(&mut self.stall.critical) {
            let ends = self.latest_ends(design, &procs)?;
            self.add_stalls(design, stallboard, &ends)?;
        }
        if self.stall.module_sources.is_empty() {
            return Ok(());
        }
        let procs = std::mem::take(&mut self.stall.module_sources);
        let ends = self.latest_ends(design, &procs)?;
        let go = self.tracker.go();

        // Hold every input for as long as the module is stalled.
        let mut keep = Vec::new();
        let inputs = design
            .data_ports(self.module)
            .filter(|p| design.ports[*p].kind == PortKind::Data)
            .collect_vec();
        for port in inputs {
            let Some(inner) = design.ports[port].peer else {
                continue;
            };
            let width = design.buses[inner].width;
            let latch = design.add_component(CompKind::Latch, Some(self.module));
            let q = design.add_bus(design.comps[latch].exits[0], BusKind::Data, "q", width);
            design.rewire_physical(inner, q, &[]);
            let d = design.add_port(latch, PortKind::Data, "d", width);
            let en = design.add_port(latch, PortKind::Enable, "en", 1);
            design.connect(d, inner);
            design.connect(en, go);
            keep.push(latch);
        }

        let (stallboard, out) = self.tracker.stallboard(design, go)?;
        keep.push(stallboard);
        self.add_stalls(design, stallboard, &ends)?;
        design.rewire_physical(go, out, &keep);
        design.module_mut(self.module)?.add_feedback_point(stallboard);
        log::debug!(
            "`{}' stalls on `{}' ({} inputs latched)",
            design.comps[self.module].name,
            design.comps[stallboard].name,
            keep.len() - 1
        );
        Ok(())
    }

    fn add_stalls(
        &mut self,
        design: &mut Design,
        stallboard: CompIdx,
        ends: &[BusIdx],
    ) -> ForgeResult<()> {
        for (i, end) in ends.iter().enumerate() {
            let pass = self.tracker.passthrough(design, *end)?;
            let port = design.add_port(stallboard, PortKind::Stall, format!("stall{i}"), 1);
            design.connect(port, pass);
        }
        Ok(())
    }

    /// Exit controls of the last accessor of each process, reduced to the
    /// latest ones.
    fn latest_ends(&self, design: &Design, procs: &[usize]) -> ForgeResult<Vec<BusIdx>> {
        let mut ends: LinkedHashMap<BusIdx, Latency> = LinkedHashMap::new();
        for i in procs {
            let end = self.stall.processes[*i].end();
            let exit = design.comps[end].exits[0];
            let control = self.tracker.exit_control(design, exit)?;
            ends.insert(control, self.tracker.control_latency(design, control)?);
        }
        Ok(Latency::get_latest(&ends, &HashSet::new())
            .keys()
            .copied()
            .collect())
    }
}
