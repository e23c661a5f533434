use super::ModuleSchedule;
use forge_ir::{BusIdx, CompIdx, CompKind, DepKind, Design, EntryIdx, Error, Latency, PortIdx};
use forge_utils::ForgeResult;
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;
use std::collections::HashSet;

impl ModuleSchedule {
    /// Schedule every entry of `comp`, drive its ports, and record its exit
    /// controls.
    pub(super) fn schedule_component(&mut self, design: &mut Design, comp: CompIdx) -> ForgeResult<()> {
        match design.comps[comp].kind {
            CompKind::PinAccess => Err(Error::unexpected_node(
                "scheduler",
                design.comps[comp].name,
                "deprecated pin access",
            )),
            CompKind::InBuf => Ok(()),
            CompKind::OutBuf => self.merge(design, comp).map(|_| ()),
            _ => {
                let control = self.merge(design, comp)?;
                self.tracker.update_exit_states(design, comp, control)
            }
        }
    }

    /// Resolve the entries of `comp` into one GO and one driver per port.
    /// Returns the control bus that starts the component.
    pub(super) fn merge(&mut self, design: &mut Design, comp: CompIdx) -> ForgeResult<BusIdx> {
        let entries = design.comps[comp].entries.to_vec();
        let go_port = design.comps[comp].go;
        let control = match entries.as_slice() {
            [] => {
                let go = self.tracker.go();
                design.connect(go_port, go);
                for port in design.data_ports(comp).collect_vec() {
                    let width = design.ports[port].width;
                    let zero = self.tracker.zero(design, width);
                    design.connect(port, zero);
                }
                go
            }
            [entry] => {
                let control = self.schedule_entry(design, comp, *entry)?;
                design.connect(go_port, control);
                for (port, bus) in design.entries[*entry].scheduled.clone() {
                    design.connect(port, bus);
                }
                control
            }
            _ => {
                let mut controls = Vec::with_capacity(entries.len());
                for entry in &entries {
                    controls.push(self.schedule_entry(design, comp, *entry)?);
                }
                let go = self.tracker.or(design, &controls)?;
                design.connect(go_port, go);
                let ports = entries
                    .iter()
                    .flat_map(|e| design.entries[*e].scheduled.keys().copied())
                    .unique()
                    .collect_vec();
                for port in ports {
                    let width = design.ports[port].width;
                    let mut pairs = Vec::with_capacity(entries.len());
                    for (entry, control) in entries.iter().zip(&controls) {
                        let data = match design.entries[*entry].scheduled.get(&port) {
                            Some(bus) => *bus,
                            None => self.tracker.zero(design, width),
                        };
                        pairs.push((*control, data));
                    }
                    let driver = if pairs.iter().map(|(_, d)| d).all_equal() {
                        pairs[0].1
                    } else {
                        self.tracker.mux(design, &pairs, width)?
                    };
                    design.connect(port, driver);
                }
                go
            }
        };
        self.tracker.set_entry_control(comp, control);
        Ok(control)
    }

    /// Find the control bus of one entry and the bus each of its ports
    /// should read.
    fn schedule_entry(
        &mut self,
        design: &mut Design,
        comp: CompIdx,
        entry: EntryIdx,
    ) -> ForgeResult<BusIdx> {
        let name = design.comps[comp].name;
        let go_port = design.comps[comp].go;
        let deps = design.entries[entry]
            .iter_deps()
            .map(|(port, dep)| (port, *dep))
            .collect_vec();
        if deps.is_empty() {
            return Err(Error::invariant("entry has no dependencies").with_node(name));
        }

        let mut candidates: LinkedHashMap<BusIdx, Latency> = LinkedHashMap::new();
        let mut placeholder = false;
        let mut data: LinkedHashMap<PortIdx, BusIdx> = LinkedHashMap::new();
        let mut controls: LinkedHashMap<PortIdx, Vec<BusIdx>> = LinkedHashMap::new();
        for (port, dep) in deps {
            let mut control = self
                .tracker
                .control_bus(design, dep.bus)
                .map_err(|e| e.with_node(name))?;
            if dep.delay_clocks > 0 {
                control = self.tracker.delay(design, control, dep.delay_clocks)?;
            }
            match dep.kind {
                DepKind::Data if port != go_port => {
                    data.entry(port).or_insert(dep.bus);
                }
                DepKind::Control | DepKind::Wait if port != go_port => {
                    controls.entry(port).or_insert_with(Vec::new).push(control);
                }
                _ => {}
            }
            if self.tracker.is_placeholder(control) {
                placeholder = true;
                continue;
            }
            let latency = self.tracker.control_latency(design, control)?;
            candidates.insert(control, latency);
        }

        let preferred = candidates.keys().copied().collect::<HashSet<_>>();
        let latest = Latency::get_latest(&candidates, &preferred);
        let mut keys = latest.keys().copied();
        let control = match (keys.next(), keys.next()) {
            (None, _) if placeholder => self.tracker.go(),
            (None, _) => {
                return Err(Error::invariant("entry has no driving bus").with_node(name));
            }
            (Some(only), None) => only,
            _ if self.balanced => {
                return Err(Error::invariant(
                    "balanced scheduling found unordered dependencies",
                )
                .with_node(name));
            }
            _ => {
                let inputs = latest.keys().copied().collect_vec();
                self.tracker.scoreboard(design, &inputs)?
            }
        };
        let control = self.apply_stall(design, comp, control)?;
        let latency = self.tracker.control_latency(design, control)?;

        let mut scheduled = LinkedHashMap::new();
        for (port, bus) in data {
            let synced = self.sync_data(design, bus, control, latency)?;
            scheduled.insert(port, synced);
        }
        for (port, buses) in controls {
            if scheduled.contains_key(&port) {
                continue;
            }
            let bus = self.tracker.and(design, &buses)?;
            scheduled.insert(port, bus);
        }

        let e = &mut design.entries[entry];
        e.control = Some(control);
        e.latency = Some(latency);
        e.scheduled = scheduled;
        Ok(control)
    }

    /// Make `data` valid while `go` is asserted. Data valid at the same
    /// latency passes straight through; earlier data is delayed when
    /// balancing, captured when it certainly precedes `go`, and latched
    /// otherwise.
    fn sync_data(
        &mut self,
        design: &mut Design,
        data: BusIdx,
        go: BusIdx,
        go_latency: Latency,
    ) -> ForgeResult<BusIdx> {
        if design.const_value(data).is_some() {
            return Ok(data);
        }
        let data_control = self.tracker.control_bus(design, data)?;
        if data_control == go {
            return Ok(data);
        }
        let data_latency = self.tracker.control_latency(design, data_control)?;
        if data_latency == go_latency {
            return Ok(data);
        }
        if self.balanced
            && go_latency.is_fixed()
            && data_latency.is_fixed()
            && go_latency.min_clocks() > data_latency.min_clocks()
        {
            let clocks = go_latency.min_clocks() - data_latency.min_clocks();
            return self.tracker.data_delay(design, data, clocks);
        }
        let strictly_before = data_latency
            .max_clocks()
            .is_some_and(|max| go_latency.min_clocks() > max);
        if go_latency.is_gt(&data_latency) && strictly_before {
            self.tracker.enable_reg(design, data, data_control)
        } else {
            self.tracker.latch(design, data, data_control)
        }
    }
}
