//! Construction helpers used by front ends and tests.
use crate::{
    AccessKind, BusIdx, BusKind, CompIdx, CompKind, Dependency, Design, ExitIdx, ExitTag, ModulePort,
    OpKind, PortIdx, PortKind, RegKind, ResourceIdx, Task, TaskIdx,
};
use forge_utils::{Error, ForgeResult, Id};

/// Builds components into one module.
///
/// Every component created through the builder gets a single entry with a
/// control dependency on the module GO, plus whatever data dependencies its
/// inputs imply.
pub struct Builder<'a> {
    pub design: &'a mut Design,
    module: CompIdx,
    go: BusIdx,
}

/// The parts of a branch construct.
#[derive(Debug, Clone, Copy)]
pub struct BranchParts {
    pub branch: CompIdx,
    pub decision: CompIdx,
    pub true_block: CompIdx,
    pub false_block: CompIdx,
}

/// The parts of a loop construct.
#[derive(Debug, Clone, Copy)]
pub struct LoopParts {
    pub lp: CompIdx,
    pub init: CompIdx,
    pub body: CompIdx,
    pub decision: CompIdx,
    pub test_block: CompIdx,
    pub body_block: CompIdx,
    pub control_reg: CompIdx,
}

/// A value carried from one iteration of a loop to the next.
#[derive(Debug, Clone, Copy)]
pub struct LoopVar {
    /// The current value, inside the body block.
    pub current: BusIdx,
    /// The final value, outside the loop.
    pub output: BusIdx,
    pub data_reg: CompIdx,
    width: u32,
    name: Id,
}

/// Create a task wrapping a call to a fresh procedure body. Returns the task
/// and the body to build into.
pub fn add_task<S: Into<Id>>(design: &mut Design, name: S, autostart: bool) -> (TaskIdx, CompIdx) {
    let name = name.into();
    let (call, body) = new_call(design, None);
    design.comps[call].non_removable = true;
    design.globals.push(call);
    let task = design.add_task(Task {
        name,
        call,
        autostart,
        balanceable: true,
        balanced: false,
        max_gate_depth: 0,
        clock_domain: Id::from("clk"),
        kicker: None,
    });
    (task, body)
}

fn new_call(design: &mut Design, owner: Option<CompIdx>) -> (CompIdx, CompIdx) {
    let body = design.add_component(CompKind::Block { procedure_body: true }, None);
    let call = design.add_component(CompKind::Call { procedure: body }, owner);
    design.comps[body].owner = Some(call);
    (call, body)
}

/// Place a component created without an owner inside `module`.
fn adopt(design: &mut Design, module: CompIdx, child: CompIdx) {
    design.comps[child].owner = Some(module);
    if let Some(info) = design.comps[module].module.as_mut() {
        info.children.push(child);
    }
}

impl<'a> Builder<'a> {
    pub fn new(design: &'a mut Design, module: CompIdx) -> ForgeResult<Self> {
        let go = design.go_bus(module).ok_or_else(|| {
            Error::invariant("builder needs a module").with_node(design.comps[module].name)
        })?;
        Ok(Builder { design, module, go })
    }

    /// A builder for another module, sharing this builder's design.
    pub fn within(&mut self, module: CompIdx) -> ForgeResult<Builder<'_>> {
        Builder::new(&mut *self.design, module)
    }

    pub fn module(&self) -> CompIdx {
        self.module
    }

    /// The module GO, as seen from inside.
    pub fn go(&self) -> BusIdx {
        self.go
    }

    /// Add a data input to the module. Returns the bus carrying it inside.
    pub fn input<S: Into<Id>>(&mut self, name: S, width: u32) -> ModulePort {
        let port = self.design.add_port(self.module, PortKind::Data, name, width);
        let inner = self.design.ports[port].peer.unwrap_or(self.go);
        ModulePort { port, inner }
    }

    /// Add a data output to the module's first exit, fed by `value`.
    /// Returns the outer bus.
    pub fn output<S: Into<Id>>(&mut self, name: S, value: BusIdx) -> BusIdx {
        let exit = self.design.comps[self.module].exits[0];
        self.exit_output(exit, name, value)
    }

    fn exit_output<S: Into<Id>>(
        &mut self,
        exit: ExitIdx,
        name: S,
        value: BusIdx,
    ) -> BusIdx {
        let width = self.design.buses[value].width;
        let bus = self.design.add_bus(exit, BusKind::Data, name, width);
        if let Some(port) = self.design.buses[bus].peer {
            let outbuf = self.design.ports[port].owner;
            self.data_dep(outbuf, port, value);
        }
        bus
    }

    /// Add a control dependency from `bus` to the GO of `comp`.
    pub fn go_after(&mut self, comp: CompIdx, bus: BusIdx) {
        let go = self.design.comps[comp].go;
        self.depend(comp, go, Dependency::control(bus));
    }

    /// Add a dependency to the primary entry of `comp`.
    pub fn depend(&mut self, comp: CompIdx, port: PortIdx, dep: Dependency) {
        let entry = self.design.primary_entry(comp);
        self.design.add_dep(entry, port, dep);
    }

    fn data_dep(&mut self, comp: CompIdx, port: PortIdx, bus: BusIdx) {
        self.depend(comp, port, Dependency::data(bus));
    }

    /// Create a child of kind `kind` started by the module GO.
    fn child(&mut self, kind: CompKind) -> CompIdx {
        let comp = self.design.add_component(kind, Some(self.module));
        let go = self.go;
        self.go_after(comp, go);
        comp
    }

    fn with_inputs(&mut self, comp: CompIdx, kind: PortKind, inputs: &[BusIdx]) {
        for (i, input) in inputs.iter().enumerate() {
            let width = self.design.buses[*input].width;
            let port = self.design.add_port(comp, kind, format!("in{i}"), width);
            self.data_dep(comp, port, *input);
        }
    }

    fn with_result(&mut self, comp: CompIdx, width: u32) -> BusIdx {
        let exit = self.design.comps[comp].exits[0];
        self.design.add_bus(exit, BusKind::Data, "result", width)
    }

    /// A combinational operator over `inputs`.
    pub fn op(&mut self, kind: OpKind, inputs: &[BusIdx], width: u32) -> CompIdx {
        let comp = self.child(CompKind::Op(kind));
        self.with_inputs(comp, PortKind::Data, inputs);
        match kind {
            OpKind::NoOp => {
                for (i, input) in inputs.iter().enumerate() {
                    let exit = self.design.comps[comp].exits[0];
                    let width = self.design.buses[*input].width;
                    self.design.add_bus(exit, BusKind::Data, format!("out{i}"), width);
                }
            }
            OpKind::Constant(value) => {
                let bus = self.with_result(comp, width);
                self.design.buses[bus].value = Some(value);
            }
            _ => {
                self.with_result(comp, width);
            }
        }
        comp
    }

    pub fn constant(&mut self, value: u64, width: u32) -> BusIdx {
        let comp = self.op(OpKind::Constant(value), &[], width);
        self.result(comp)
    }

    /// An opaque operator. Returns its result bus.
    pub fn logic<S: Into<Id>>(&mut self, name: S, inputs: &[BusIdx], width: u32) -> BusIdx {
        let comp = self.op(OpKind::Logic(name.into()), inputs, width);
        self.result(comp)
    }

    /// A plain register. Returns its output bus.
    pub fn reg(&mut self, data: BusIdx) -> BusIdx {
        let width = self.design.buses[data].width;
        let comp = self.child(CompKind::Reg(RegKind::Plain));
        let port = self.design.add_port(comp, PortKind::Data, "d", width);
        self.data_dep(comp, port, data);
        let exit = self.design.comps[comp].exits[0];
        self.design.add_bus(exit, BusKind::Data, "q", width)
    }

    fn access(&mut self, resource: ResourceIdx, kind: AccessKind, inputs: &[(&str, BusIdx)]) -> CompIdx {
        let comp = self.child(CompKind::Access { resource, kind });
        for (name, bus) in inputs {
            let width = self.design.buses[*bus].width;
            let port = self.design.add_port(comp, PortKind::Data, *name, width);
            self.data_dep(comp, port, *bus);
        }
        if matches!(kind, AccessKind::RegisterRead | AccessKind::MemoryRead) {
            let width = self.design.resources[resource].kind.width();
            self.with_result(comp, width);
        }
        self.design.resources[resource].accesses.push(comp);
        comp
    }

    pub fn reg_read(&mut self, resource: ResourceIdx) -> CompIdx {
        self.access(resource, AccessKind::RegisterRead, &[])
    }

    pub fn reg_write(&mut self, resource: ResourceIdx, data: BusIdx) -> CompIdx {
        self.access(resource, AccessKind::RegisterWrite, &[("data", data)])
    }

    pub fn mem_read(&mut self, resource: ResourceIdx, addr: BusIdx) -> CompIdx {
        self.access(resource, AccessKind::MemoryRead, &[("addr", addr)])
    }

    pub fn mem_write(&mut self, resource: ResourceIdx, addr: BusIdx, data: BusIdx) -> CompIdx {
        self.access(
            resource,
            AccessKind::MemoryWrite,
            &[("addr", addr), ("data", data)],
        )
    }

    pub fn timing_op(&mut self, global: bool) -> CompIdx {
        self.child(CompKind::TimingOp { global })
    }

    pub fn pin_access(&mut self) -> CompIdx {
        self.child(CompKind::PinAccess)
    }

    /// A nested block, started by the module GO.
    pub fn block(&mut self) -> CompIdx {
        self.child(CompKind::Block {
            procedure_body: false,
        })
    }

    /// A call to a fresh procedure body. Returns the call and the body.
    pub fn call(&mut self) -> (CompIdx, CompIdx) {
        let (call, body) = new_call(self.design, Some(self.module));
        let go = self.go;
        self.go_after(call, go);
        (call, body)
    }

    /// Add an argument to a call. Returns the bus carrying it inside the
    /// procedure body.
    pub fn call_input<S: Into<Id>>(&mut self, call: CompIdx, name: S, value: BusIdx) -> BusIdx {
        let name = name.into();
        let width = self.design.buses[value].width;
        let body = procedure(self.design, call);
        let port = self.design.add_port(call, PortKind::Data, name, width);
        self.data_dep(call, port, value);
        let inner = self.design.add_port(body, PortKind::Data, name, width);
        self.design.ports[inner].peer.unwrap_or(value)
    }

    /// Add a result to a call, fed by `value` inside the procedure body.
    /// Returns the call's bus.
    pub fn call_output<S: Into<Id>>(&mut self, call: CompIdx, name: S, value: BusIdx) -> BusIdx {
        let name = name.into();
        let width = self.design.buses[value].width;
        let body = procedure(self.design, call);
        let body_exit = self.design.comps[body].exits[0];
        self.exit_output(body_exit, name, value);
        let call_exit = self.design.comps[call].exits[0];
        self.design.add_bus(call_exit, BusKind::Data, name, width)
    }

    /// A two-way branch on `cond`.
    pub fn branch(&mut self, cond: BusIdx) -> BranchParts {
        let decision = self.decision();
        let true_block = self.design.add_component(
            CompKind::Block {
                procedure_body: false,
            },
            None,
        );
        let false_block = self.design.add_component(
            CompKind::Block {
                procedure_body: false,
            },
            None,
        );
        let branch = self.child(CompKind::Branch {
            decision,
            true_block,
            false_block,
        });
        for part in [decision, true_block, false_block] {
            adopt(self.design, branch, part);
        }

        let cond_port = self.design.add_port(branch, PortKind::Data, "cond", 1);
        self.data_dep(branch, cond_port, cond);
        let parts = BranchParts {
            branch,
            decision,
            true_block,
            false_block,
        };
        let mut inner = Builder {
            go: self.design.go_bus(branch).unwrap_or(self.go),
            module: branch,
            design: &mut *self.design,
        };
        let branch_go = inner.go;
        let branch_cond = inner.design.ports[cond_port].peer.unwrap_or(cond);
        inner.go_after(decision, branch_go);
        if let Some(decision_cond) = inner.design.port_by_name(decision, "cond") {
            inner.data_dep(decision, decision_cond, branch_cond);
        }

        let decision_exits = inner.design.comps[decision].exits.clone();
        let true_done = inner.design.exits[decision_exits[0]].done;
        let false_done = inner.design.exits[decision_exits[1]].done;
        inner.go_after(true_block, true_done);
        inner.go_after(false_block, false_done);

        let outbuf = inner.design.outbufs(branch)[0];
        let outbuf_go = inner.design.comps[outbuf].go;
        for block in [true_block, false_block] {
            let exit = inner.design.comps[block].exits[0];
            let done = inner.design.exits[exit].done;
            let entry = inner.design.add_entry(outbuf, Some(exit));
            inner.design.add_dep(entry, outbuf_go, Dependency::control(done));
        }
        parts
    }

    /// A decision testing the one-bit value on its `cond` port.
    fn decision(&mut self) -> CompIdx {
        let design = &mut *self.design;
        let test_block = design.add_component(
            CompKind::Block {
                procedure_body: false,
            },
            None,
        );
        let not = design.add_component(CompKind::Op(OpKind::Not), None);
        let true_and = design.add_component(CompKind::Op(OpKind::And), None);
        let false_and = design.add_component(CompKind::Op(OpKind::And), None);
        let decision = design.add_component(
            CompKind::Decision {
                test_block,
                not,
                true_and,
                false_and,
            },
            None,
        );
        for part in [test_block, not, true_and, false_and] {
            adopt(design, decision, part);
        }
        let true_exit = design.comps[decision].exits[0];
        design.exits[true_exit].label = Some(Id::from("true"));
        design.add_exit(decision, ExitTag::Done, Some(Id::from("false")));

        let cond_port = design.add_port(decision, PortKind::Data, "cond", 1);
        let mut inner = Builder {
            go: design.go_bus(decision).unwrap_or(self.go),
            module: decision,
            design,
        };
        let go = inner.go;
        let cond = inner.design.ports[cond_port].peer.unwrap_or(go);

        let test_port = inner.design.add_port(test_block, PortKind::Data, "cond", 1);
        inner.go_after(test_block, go);
        inner.data_dep(test_block, test_port, cond);
        let test_inner = inner.design.ports[test_port].peer.unwrap_or(cond);
        let test_exit = inner.design.comps[test_block].exits[0];
        let mut test = Builder {
            go: inner.design.go_bus(test_block).unwrap_or(go),
            module: test_block,
            design: &mut *inner.design,
        };
        let test_result = test.exit_output(test_exit, "cond", test_inner);
        let test_done = inner.design.exits[test_exit].done;

        inner.go_after(not, go);
        inner.with_inputs(not, PortKind::Data, &[test_result]);
        let not_result = inner.with_result(not, 1);
        for (op, input) in [(true_and, test_result), (false_and, not_result)] {
            inner.go_after(op, go);
            inner.with_inputs(op, PortKind::Data, &[input]);
            let ctrl = inner.design.add_port(op, PortKind::Enable, "ctrl", 1);
            inner.depend(op, ctrl, Dependency::control(test_done));
            inner.with_result(op, 1);
        }
        let outbufs = inner.design.outbufs(decision).to_vec();
        for (outbuf, op) in outbufs.into_iter().zip([true_and, false_and]) {
            let done = inner.design.done_bus(op).unwrap_or(go);
            inner.go_after(outbuf, done);
        }
        decision
    }

    /// A loop running `iterations` times when the count is known statically.
    pub fn do_loop(&mut self, iterations: Option<u32>) -> LoopParts {
        let design = &mut *self.design;
        let init = design.add_component(
            CompKind::Block {
                procedure_body: false,
            },
            None,
        );
        let body_block = design.add_component(
            CompKind::Block {
                procedure_body: false,
            },
            None,
        );
        let decision = self.decision();
        let design = &mut *self.design;
        let body = design.add_component(
            CompKind::LoopBody {
                decision,
                body: body_block,
                flop_needed: true,
            },
            None,
        );
        adopt(design, body, decision);
        adopt(design, body, body_block);
        design.add_exit(body, ExitTag::Feedback, None);

        let control_reg = design.add_component(CompKind::Reg(RegKind::Control), None);
        let lp = self.child(CompKind::Loop {
            init,
            body: Some(body),
            control_reg: Some(control_reg),
            data_regs: Vec::new(),
            iterations,
        });
        for part in [init, body, control_reg] {
            adopt(self.design, lp, part);
        }
        if let Some(module) = self.design.comps[lp].module.as_mut() {
            module.add_feedback_point(control_reg);
        }

        // Loop level wiring.
        let loop_go = self.design.go_bus(lp).unwrap_or(self.go);
        let mut lb = Builder {
            go: loop_go,
            module: lp,
            design: &mut *self.design,
        };
        lb.go_after(init, loop_go);
        lb.go_after(control_reg, loop_go);
        let body_exits = lb.design.comps[body].exits.clone();
        let init_exit = lb.design.comps[init].exits[0];
        let reg_exit = lb.design.comps[control_reg].exits[0];
        let body_go = lb.design.comps[body].go;
        for (exit, trigger) in [(init_exit, init), (reg_exit, control_reg)] {
            let done = lb.design.done_bus(trigger).unwrap_or(loop_go);
            let entry = lb.design.add_entry(body, Some(exit));
            lb.design.add_dep(entry, body_go, Dependency::control(done));
        }
        let feedback_done = lb.design.exits[body_exits[1]].done;
        let reg_d = lb.design.add_port(control_reg, PortKind::Data, "d", 1);
        lb.data_dep(control_reg, reg_d, feedback_done);
        let loop_outbuf = lb.design.outbufs(lp)[0];
        let body_done = lb.design.exits[body_exits[0]].done;
        lb.go_after(loop_outbuf, body_done);

        // Loop body wiring.
        let lb_go = lb.design.go_bus(body).unwrap_or(loop_go);
        let mut bb = Builder {
            go: lb_go,
            module: body,
            design: &mut *lb.design,
        };
        bb.go_after(decision, lb_go);
        let decision_exits = bb.design.comps[decision].exits.clone();
        let continue_done = bb.design.exits[decision_exits[0]].done;
        let exit_done = bb.design.exits[decision_exits[1]].done;
        bb.go_after(body_block, continue_done);
        let body_outbufs = bb.design.outbufs(body).to_vec();
        bb.go_after(body_outbufs[0], exit_done);
        let block_done = bb.design.done_bus(body_block).unwrap_or(lb_go);
        bb.go_after(body_outbufs[1], block_done);

        // The loop condition is opaque to the scheduler.
        let test_block = match bb.design.comps[decision].kind {
            CompKind::Decision { test_block, .. } => test_block,
            _ => decision,
        };
        let cond = bb.logic("loop_cond", &[], 1);
        if let Some(decision_cond) = bb.design.port_by_name(decision, "cond") {
            bb.data_dep(decision, decision_cond, cond);
        }

        LoopParts {
            lp,
            init,
            body,
            decision,
            test_block,
            body_block,
            control_reg,
        }
    }

    /// Add a loop-carried value starting at `init`. Its next value must be
    /// set with [Builder::loop_next].
    pub fn loop_var<S: Into<Id>>(&mut self, parts: &LoopParts, name: S, init: BusIdx) -> LoopVar {
        let name = name.into();
        let width = self.design.buses[init].width;

        // Into the loop, through the init block.
        let loop_port = self.design.add_port(parts.lp, PortKind::Data, name, width);
        self.data_dep(parts.lp, loop_port, init);
        let loop_inner = self.design.ports[loop_port].peer.unwrap_or(init);
        let mut lb = Builder {
            go: self.design.go_bus(parts.lp).unwrap_or(self.go),
            module: parts.lp,
            design: &mut *self.design,
        };
        let init_port = lb.design.add_port(parts.init, PortKind::Data, name, width);
        lb.data_dep(parts.init, init_port, loop_inner);
        let init_inner = lb.design.ports[init_port].peer.unwrap_or(loop_inner);
        let init_exit = lb.design.comps[parts.init].exits[0];
        let init_value = lb.exit_output(init_exit, name, init_inner);

        // The feedback register.
        let data_reg = lb.design.add_component(CompKind::Reg(RegKind::Enable), Some(parts.lp));
        let loop_go = lb.go;
        lb.go_after(data_reg, loop_go);
        lb.design.add_port(data_reg, PortKind::Data, "d", width);
        lb.design.add_port(data_reg, PortKind::Enable, "en", 1);
        let reg_exit = lb.design.comps[data_reg].exits[0];
        let reg_value = lb.design.add_bus(reg_exit, BusKind::Data, "q", width);
        if let CompKind::Loop { data_regs, .. } = &mut lb.design.comps[parts.lp].kind {
            data_regs.push(data_reg);
        }
        if let Some(module) = lb.design.comps[parts.lp].module.as_mut() {
            module.add_feedback_point(data_reg);
        }

        // Both entries of the loop body.
        let body_port = lb.design.add_port(parts.body, PortKind::Data, name, width);
        let body_entries = lb.design.comps[parts.body].entries.clone();
        for (entry, value) in body_entries.into_iter().zip([init_value, reg_value]) {
            lb.design.add_dep(entry, body_port, Dependency::data(value));
        }
        let body_inner = lb.design.ports[body_port].peer.unwrap_or(init_value);

        // Inside the body block.
        let mut bb = Builder {
            go: lb.design.go_bus(parts.body).unwrap_or(loop_go),
            module: parts.body,
            design: &mut *lb.design,
        };
        let block_port = bb.design.add_port(parts.body_block, PortKind::Data, name, width);
        bb.data_dep(parts.body_block, block_port, body_inner);
        let current = bb.design.ports[block_port].peer.unwrap_or(body_inner);

        // Out of the loop through the body's DONE exit.
        let done_exit = bb.design.comps[parts.body].exits[0];
        let body_output = bb.exit_output(done_exit, name, body_inner);
        let loop_exit = self.design.comps[parts.lp].exits[0];
        let mut lb = Builder {
            go: loop_go,
            module: parts.lp,
            design: &mut *self.design,
        };
        let output = lb.exit_output(loop_exit, name, body_output);

        LoopVar {
            current,
            output,
            data_reg,
            width,
            name,
        }
    }

    /// Feed `next`, computed inside the body block, back into `var`.
    pub fn loop_next(&mut self, parts: &LoopParts, var: &LoopVar, next: BusIdx) {
        let loop_go = self.design.go_bus(parts.lp).unwrap_or(self.go);
        let body_go = self.design.go_bus(parts.body).unwrap_or(loop_go);
        let block_exit = self.design.comps[parts.body_block].exits[0];
        let mut block = Builder {
            go: self.design.go_bus(parts.body_block).unwrap_or(body_go),
            module: parts.body_block,
            design: &mut *self.design,
        };
        let block_value = block.exit_output(block_exit, var.name, next);

        let feedback_exit = self.design.comps[parts.body].exits[1];
        let mut bb = Builder {
            go: body_go,
            module: parts.body,
            design: &mut *self.design,
        };
        let feedback = bb.exit_output(feedback_exit, var.name, block_value);
        debug_assert_eq!(bb.design.buses[feedback].width, var.width);

        if let Some(d) = self.design.port_by_name(var.data_reg, "d") {
            let entry = self.design.primary_entry(var.data_reg);
            self.design.add_dep(entry, d, Dependency::data(feedback));
        }
    }

    /// Result bus of an operator.
    pub fn result(&self, comp: CompIdx) -> BusIdx {
        self.design
            .result_bus(comp)
            .unwrap_or_else(|| self.done(comp))
    }

    /// DONE bus of the first exit.
    pub fn done(&self, comp: CompIdx) -> BusIdx {
        self.design.done_bus(comp).unwrap_or(self.go)
    }

    /// Give every block below this module a DONE that waits for all of its
    /// children. Blocks that already have one are left alone.
    pub fn seal(&mut self) {
        let mut blocks = vec![self.module];
        blocks.extend(self.design.descendants(self.module));
        for block in blocks {
            if !matches!(self.design.comps[block].kind, CompKind::Block { .. })
                || !self.design.is_live(block)
            {
                continue;
            }
            let Some(go) = self.design.go_bus(block) else {
                continue;
            };
            let dones = self
                .design
                .children(block)
                .iter()
                .filter_map(|c| self.design.done_bus(*c))
                .collect::<Vec<_>>();
            for outbuf in self.design.outbufs(block).to_vec() {
                let outbuf_go = self.design.comps[outbuf].go;
                let entry = self.design.primary_entry(outbuf);
                if !self.design.entries[entry].dependencies(outbuf_go).is_empty() {
                    continue;
                }
                self.design
                    .add_dep(entry, outbuf_go, Dependency::control(go));
                for done in &dones {
                    self.design
                        .add_dep(entry, outbuf_go, Dependency::control(*done));
                }
            }
        }
    }
}

/// The procedure body of a call.
pub fn procedure(design: &Design, call: CompIdx) -> CompIdx {
    match design.comps[call].kind {
        CompKind::Call { procedure } => procedure,
        _ => call,
    }
}
