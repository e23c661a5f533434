//! Bookkeeping for one scheduled module: the control bus of every exit,
//! the latency of every control bus, and the control hardware synthesized
//! along the way.
use forge_ir::{
    BusIdx, BusKind, CompIdx, CompKind, Design, Error, ExitIdx, Latency, OpKind, PortKind,
    RegKind,
};
use forge_utils::ForgeResult;
use itertools::Itertools;
use std::collections::HashMap;

/// Synthesized hardware, keyed by its inputs so that equal requests share
/// one instance.
#[derive(Default)]
struct OpCache {
    ors: HashMap<Vec<BusIdx>, BusIdx>,
    ands: HashMap<Vec<BusIdx>, BusIdx>,
    scoreboards: HashMap<Vec<BusIdx>, BusIdx>,
    muxes: HashMap<Vec<(BusIdx, BusIdx)>, BusIdx>,
    control_regs: HashMap<BusIdx, BusIdx>,
    enable_regs: HashMap<(BusIdx, BusIdx), BusIdx>,
    latches: HashMap<(BusIdx, BusIdx), BusIdx>,
    delays: HashMap<(BusIdx, u32), BusIdx>,
    zeros: HashMap<u32, BusIdx>,
}

pub(super) struct LatencyTracker {
    module: CompIdx,
    /// The module GO, as seen from inside.
    go: BusIdx,
    /// Whether anything in the module uses its GO. When nothing does, the
    /// GO only stands in for a missing dependency.
    consumes_go: bool,
    exit_control: HashMap<ExitIdx, BusIdx>,
    entry_control: HashMap<CompIdx, BusIdx>,
    /// Latency of each control bus relative to the module GO.
    latencies: HashMap<BusIdx, Latency>,
    cache: OpCache,
}

impl LatencyTracker {
    /// Start tracking `module`, with its InBuf already resolved.
    pub fn new(design: &Design, module: CompIdx, consumes_go: bool) -> ForgeResult<Self> {
        let name = design.comps[module].name;
        let (Some(inbuf), Some(go)) = (design.inbuf(module), design.go_bus(module)) else {
            return Err(Error::invariant("module without an InBuf").with_node(name));
        };
        let mut tracker = LatencyTracker {
            module,
            go,
            consumes_go,
            exit_control: HashMap::new(),
            entry_control: HashMap::new(),
            latencies: HashMap::new(),
            cache: OpCache::default(),
        };
        let exit = design.comps[inbuf].exits[0];
        tracker.define(exit, go, Latency::ZERO);
        tracker.entry_control.insert(inbuf, go);
        Ok(tracker)
    }

    pub fn go(&self) -> BusIdx {
        self.go
    }

    /// Whether `control` is the GO of a module that never consumes it.
    pub fn is_placeholder(&self, control: BusIdx) -> bool {
        control == self.go && !self.consumes_go
    }

    /// Make `control` the control bus of `exit`, valid at `latency`.
    pub fn define(&mut self, exit: ExitIdx, control: BusIdx, latency: Latency) {
        self.exit_control.insert(exit, control);
        self.latencies.insert(control, latency);
    }

    /// Share an already defined control bus with `exit`.
    pub fn set_exit_control(&mut self, exit: ExitIdx, control: BusIdx) {
        self.exit_control.insert(exit, control);
    }

    pub fn set_latency(&mut self, control: BusIdx, latency: Latency) {
        self.latencies.insert(control, latency);
    }

    pub fn exit_control(&self, design: &Design, exit: ExitIdx) -> ForgeResult<BusIdx> {
        self.exit_control.get(&exit).copied().ok_or_else(|| {
            let owner = design.exits[exit].owner;
            Error::invariant("dependency on an exit that is not scheduled yet")
                .with_node(design.comps[owner].name)
        })
    }

    /// The control bus of the exit producing `bus`.
    pub fn control_bus(&self, design: &Design, bus: BusIdx) -> ForgeResult<BusIdx> {
        self.exit_control(design, design.buses[bus].exit)
    }

    pub fn control_latency(&self, design: &Design, control: BusIdx) -> ForgeResult<Latency> {
        self.latencies.get(&control).copied().ok_or_else(|| {
            Error::invariant(format!(
                "control bus `{}' has no latency",
                design.buses[control].name
            ))
            .with_node(design.comps[design.bus_owner(control)].name)
        })
    }

    pub fn entry_control(&self, comp: CompIdx) -> Option<BusIdx> {
        self.entry_control.get(&comp).copied()
    }

    pub fn set_entry_control(&mut self, comp: CompIdx, control: BusIdx) {
        self.entry_control.insert(comp, control);
    }

    /// Record the exits of `comp`, started by `entry`. The exit control is
    /// the DONE itself when it is synchronous, DONE qualified by the entry
    /// when it is not, and a chain of flops on the entry when the component
    /// produces no DONE at all.
    pub fn update_exit_states(
        &mut self,
        design: &mut Design,
        comp: CompIdx,
        entry: BusIdx,
    ) -> ForgeResult<()> {
        let attrs = design.comps[comp].attrs;
        let entry_latency = self.control_latency(design, entry)?;
        for exit in design.comps[comp].exits.to_vec() {
            let latency = design.exits[exit].latency;
            let cumulative = latency.add_to(&entry_latency);
            let done = design.exits[exit].done;
            let control = if attrs.produces_done {
                self.latencies.insert(done, cumulative);
                if attrs.done_synchronous {
                    done
                } else {
                    self.and(design, &[done, entry])?
                }
            } else {
                self.delay(design, entry, latency.min_clocks())?
            };
            self.define(exit, control, cumulative);
            design.exits[exit].resolved = Some(cumulative);
        }
        Ok(())
    }

    fn synth(&self, design: &mut Design, kind: CompKind) -> CompIdx {
        let comp = design.add_component(kind, Some(self.module));
        log::trace!(
            "synthesized `{}' in `{}'",
            design.comps[comp].name,
            design.comps[self.module].name
        );
        comp
    }

    fn input(design: &mut Design, comp: CompIdx, kind: PortKind, name: String, bus: BusIdx) {
        let width = design.buses[bus].width;
        let port = design.add_port(comp, kind, name, width);
        design.connect(port, bus);
    }

    fn inputs(design: &mut Design, comp: CompIdx, buses: &[BusIdx]) {
        for (i, bus) in buses.iter().enumerate() {
            Self::input(design, comp, PortKind::Data, format!("in{i}"), *bus);
        }
    }

    fn exit(design: &Design, comp: CompIdx) -> ExitIdx {
        design.comps[comp].exits[0]
    }

    fn key(inputs: &[BusIdx]) -> Vec<BusIdx> {
        inputs.iter().copied().sorted().dedup().collect()
    }

    fn latencies_of(&self, design: &Design, inputs: &[BusIdx]) -> ForgeResult<Vec<Latency>> {
        inputs
            .iter()
            .map(|b| self.control_latency(design, *b))
            .collect()
    }

    /// Asserted when any of the control buses `inputs` is.
    pub fn or(&mut self, design: &mut Design, inputs: &[BusIdx]) -> ForgeResult<BusIdx> {
        let key = Self::key(inputs);
        if let [single] = key.as_slice() {
            return Ok(*single);
        }
        if let Some(bus) = self.cache.ors.get(&key) {
            return Ok(*bus);
        }
        let latency = Latency::or_all(&self.latencies_of(design, &key)?)
            .ok_or_else(|| Error::invariant("OR of nothing"))?;
        let comp = self.synth(design, CompKind::Op(OpKind::Or));
        Self::inputs(design, comp, &key);
        let exit = Self::exit(design, comp);
        let done = design.exits[exit].done;
        self.define(exit, done, latency);
        self.cache.ors.insert(key, done);
        Ok(done)
    }

    /// Asserted while every one of `inputs` is.
    pub fn and(&mut self, design: &mut Design, inputs: &[BusIdx]) -> ForgeResult<BusIdx> {
        let key = Self::key(inputs);
        if let [single] = key.as_slice() {
            return Ok(*single);
        }
        if let Some(bus) = self.cache.ands.get(&key) {
            return Ok(*bus);
        }
        let latency = Latency::and_all(&self.latencies_of(design, &key)?)
            .ok_or_else(|| Error::invariant("AND of nothing"))?;
        let comp = self.synth(design, CompKind::Op(OpKind::And));
        Self::inputs(design, comp, &key);
        let exit = Self::exit(design, comp);
        let done = design.exits[exit].done;
        self.define(exit, done, latency);
        self.cache.ands.insert(key, done);
        Ok(done)
    }

    /// Fires once every one of `inputs` has fired, in any order.
    pub fn scoreboard(&mut self, design: &mut Design, inputs: &[BusIdx]) -> ForgeResult<BusIdx> {
        let key = Self::key(inputs);
        if let [single] = key.as_slice() {
            return Ok(*single);
        }
        if let Some(bus) = self.cache.scoreboards.get(&key) {
            return Ok(*bus);
        }
        let latency = Latency::and_all(&self.latencies_of(design, &key)?)
            .ok_or_else(|| Error::invariant("scoreboard of nothing"))?;
        let comp = self.synth(design, CompKind::Scoreboard);
        Self::inputs(design, comp, &key);
        let exit = Self::exit(design, comp);
        let done = design.exits[exit].done;
        self.define(exit, done, latency);
        self.cache.scoreboards.insert(key, done);
        Ok(done)
    }

    /// A stallboard passing `input` once its stall inputs allow it. Stall
    /// ports are added by the caller. Never shared.
    pub fn stallboard(
        &mut self,
        design: &mut Design,
        input: BusIdx,
    ) -> ForgeResult<(CompIdx, BusIdx)> {
        let latency = self.control_latency(design, input)?;
        let comp = self.synth(design, CompKind::Stallboard);
        Self::inputs(design, comp, &[input]);
        let exit = Self::exit(design, comp);
        let done = design.exits[exit].done;
        self.define(exit, done, latency.open(exit));
        Ok((comp, done))
    }

    /// A wire carrying the control bus `input`.
    pub fn passthrough(&mut self, design: &mut Design, input: BusIdx) -> ForgeResult<BusIdx> {
        let latency = self.control_latency(design, input)?;
        let comp = self.synth(design, CompKind::Op(OpKind::PassThrough));
        Self::inputs(design, comp, &[input]);
        let exit = Self::exit(design, comp);
        let width = design.buses[input].width;
        let out = design.add_bus(exit, BusKind::Data, "result", width);
        self.define(exit, out, latency);
        Ok(out)
    }

    /// `input` delayed by one clock.
    pub fn control_reg(&mut self, design: &mut Design, input: BusIdx) -> ForgeResult<BusIdx> {
        if let Some(bus) = self.cache.control_regs.get(&input) {
            return Ok(*bus);
        }
        let latency = Latency::ONE.add_to(&self.control_latency(design, input)?);
        let comp = self.synth(design, CompKind::Reg(RegKind::Control));
        Self::input(design, comp, PortKind::Data, "d".to_string(), input);
        let exit = Self::exit(design, comp);
        let done = design.exits[exit].done;
        self.define(exit, done, latency);
        self.cache.control_regs.insert(input, done);
        Ok(done)
    }

    /// `control` delayed by `clocks` flops.
    pub fn delay(&mut self, design: &mut Design, control: BusIdx, clocks: u32) -> ForgeResult<BusIdx> {
        (0..clocks).try_fold(control, |bus, _| self.control_reg(design, bus))
    }

    /// Holds `data` from the clock after `enable` fires.
    pub fn enable_reg(
        &mut self,
        design: &mut Design,
        data: BusIdx,
        enable: BusIdx,
    ) -> ForgeResult<BusIdx> {
        if let Some(bus) = self.cache.enable_regs.get(&(data, enable)) {
            return Ok(*bus);
        }
        let out = self.capture(design, CompKind::Reg(RegKind::Enable), data, enable);
        self.cache.enable_regs.insert((data, enable), out);
        Ok(out)
    }

    /// Passes `data` while `enable` is asserted and holds it afterwards.
    pub fn latch(&mut self, design: &mut Design, data: BusIdx, enable: BusIdx) -> ForgeResult<BusIdx> {
        if let Some(bus) = self.cache.latches.get(&(data, enable)) {
            return Ok(*bus);
        }
        let out = self.capture(design, CompKind::Latch, data, enable);
        self.cache.latches.insert((data, enable), out);
        Ok(out)
    }

    fn capture(&mut self, design: &mut Design, kind: CompKind, data: BusIdx, enable: BusIdx) -> BusIdx {
        let comp = self.synth(design, kind);
        Self::input(design, comp, PortKind::Data, "d".to_string(), data);
        Self::input(design, comp, PortKind::Enable, "en".to_string(), enable);
        let exit = Self::exit(design, comp);
        let width = design.buses[data].width;
        let out = design.add_bus(exit, BusKind::Data, "q", width);
        self.set_exit_control(exit, enable);
        out
    }

    /// `data` delayed by `clocks` plain registers.
    pub fn data_delay(&mut self, design: &mut Design, data: BusIdx, clocks: u32) -> ForgeResult<BusIdx> {
        if let Some(bus) = self.cache.delays.get(&(data, clocks)) {
            return Ok(*bus);
        }
        let control = self.control_bus(design, data)?;
        let mut bus = data;
        for stage in 1..=clocks {
            let comp = self.synth(design, CompKind::Reg(RegKind::Plain));
            Self::input(design, comp, PortKind::Data, "d".to_string(), bus);
            let exit = Self::exit(design, comp);
            let width = design.buses[bus].width;
            bus = design.add_bus(exit, BusKind::Data, "q", width);
            let delayed = self.delay(design, control, stage)?;
            self.set_exit_control(exit, delayed);
        }
        self.cache.delays.insert((data, clocks), bus);
        Ok(bus)
    }

    /// Two-input selection between data buses, one select per pair.
    pub fn mux(
        &mut self,
        design: &mut Design,
        pairs: &[(BusIdx, BusIdx)],
        width: u32,
    ) -> ForgeResult<BusIdx> {
        if let Some(bus) = self.cache.muxes.get(pairs) {
            return Ok(*bus);
        }
        let selects = pairs.iter().map(|(s, _)| *s).collect::<Vec<_>>();
        let control = self.or(design, &selects)?;
        let comp = self.synth(design, CompKind::Op(OpKind::Mux));
        for (i, (select, data)) in pairs.iter().enumerate() {
            Self::input(design, comp, PortKind::Select, format!("sel{i}"), *select);
            Self::input(design, comp, PortKind::Data, format!("data{i}"), *data);
        }
        let exit = Self::exit(design, comp);
        let out = design.add_bus(exit, BusKind::Data, "result", width);
        self.set_exit_control(exit, control);
        self.cache.muxes.insert(pairs.to_vec(), out);
        Ok(out)
    }

    /// A constant zero, valid from the module GO.
    pub fn zero(&mut self, design: &mut Design, width: u32) -> BusIdx {
        if let Some(bus) = self.cache.zeros.get(&width) {
            return *bus;
        }
        let comp = self.synth(design, CompKind::Op(OpKind::Constant(0)));
        let exit = Self::exit(design, comp);
        let out = design.add_bus(exit, BusKind::Data, "result", width);
        design.buses[out].value = Some(0);
        self.set_exit_control(exit, self.go);
        self.cache.zeros.insert(width, out);
        out
    }
}
