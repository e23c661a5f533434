use crate::traversal::{ConstructPass, Named, ParseVal, Pass, PassOpt};
use forge_idx::SecondaryMap;
use forge_ir::{BusIdx, CompIdx, CompKind, Context, Design, PortIdx};
use forge_utils::{ForgeResult, GetName};
use std::collections::HashSet;

/// Computes the longest combinational path of every task.
///
/// Depths flow forward from the task's inputs. Sequential elements and the
/// feedback points of each module restart the count at zero; a component
/// whose inputs are not all known yet is retried after its siblings.
pub struct GateDepth {
    report: bool,
}

impl Named for GateDepth {
    fn name() -> &'static str {
        "gate-depth"
    }

    fn description() -> &'static str {
        "compute the combinational depth of every task"
    }

    fn opts() -> Vec<PassOpt> {
        vec![PassOpt::new(
            "report",
            "log the depth of each task",
            ParseVal::Bool(false),
            PassOpt::parse_bool,
        )]
    }
}

impl ConstructPass for GateDepth {
    fn from(ctx: &Context) -> ForgeResult<Self> {
        let opts = Self::get_opts(ctx);
        Ok(GateDepth {
            report: opts["report"].bool(),
        })
    }
}

impl Pass for GateDepth {
    fn run(&mut self, ctx: &mut Context) -> ForgeResult<()> {
        let design = &mut ctx.design;
        let tasks = design.tasks.keys().collect::<Vec<_>>();
        let mut design_max = 0;
        for task in tasks {
            let call = design.tasks[task].call;
            let mut walk = DepthWalk::new();
            walk.visit(design, call, true);
            design.tasks[task].max_gate_depth = walk.max;
            design_max = design_max.max(walk.max);
            if self.report {
                log::info!(
                    "task `{}': combinational depth {}",
                    design.tasks[task].name(),
                    walk.max
                );
            }
        }
        design.max_gate_depth = design_max;
        design.unbreakable_gate_depth = design
            .comps
            .values()
            .filter(|c| c.live)
            .map(|c| c.gate_depth)
            .max()
            .unwrap_or(0);
        Ok(())
    }
}

struct DepthWalk {
    /// Depth of each bus, once known.
    depth: SecondaryMap<BusIdx, Option<u32>>,
    /// Components whose outputs are fixed at zero.
    seeded: HashSet<CompIdx>,
    max: u32,
}

impl DepthWalk {
    fn new() -> Self {
        DepthWalk {
            depth: SecondaryMap::new_with_default(None),
            seeded: HashSet::new(),
            max: 0,
        }
    }

    fn set(&mut self, bus: BusIdx, depth: u32) {
        self.depth.insert(bus, Some(depth));
        self.max = self.max.max(depth);
    }

    /// Depth arriving at `port`. Undriven ports count as zero.
    fn input(&self, design: &Design, port: PortIdx) -> Option<u32> {
        match design.source_of(port) {
            Some(bus) => *self.depth.get(bus),
            None => Some(0),
        }
    }

    /// Depth of the inputs of `comp`, ignoring clock and reset. `None` when
    /// one of them is unknown and `force` is off.
    fn input_depth(&self, design: &Design, comp: CompIdx, force: bool) -> Option<u32> {
        let c = &design.comps[comp];
        std::iter::once(c.go)
            .chain(design.data_ports(comp))
            .map(|p| match self.input(design, p) {
                None if force => Some(0),
                d => d,
            })
            .try_fold(0, |acc, d| d.map(|d| acc.max(d)))
    }

    /// Try to compute the outputs of `comp`. Returns false when its inputs
    /// are not all known yet.
    fn visit(&mut self, design: &Design, comp: CompIdx, force: bool) -> bool {
        let Some(depth) = self.input_depth(design, comp, force) else {
            return false;
        };
        self.max = self.max.max(depth);
        let c = &design.comps[comp];
        match &c.kind {
            CompKind::Call { procedure } => {
                let body = *procedure;
                self.enter(design, comp, body, force);
                self.leave(design, body, comp);
            }
            _ if c.is_module() => {
                self.enter(design, comp, comp, force);
                self.leave(design, comp, comp);
            }
            _ if self.seeded.contains(&comp) || c.kind.is_sequential() => {
                for bus in design.output_buses(comp) {
                    self.depth.insert(bus, Some(0));
                }
            }
            _ => {
                let out = depth + c.gate_depth;
                for bus in design.output_buses(comp).collect::<Vec<_>>() {
                    self.set(bus, out);
                }
            }
        }
        true
    }

    /// Carry the inputs of `outer` into `module` and walk its children.
    fn enter(&mut self, design: &Design, outer: CompIdx, module: CompIdx, force: bool) {
        let outer_ports = std::iter::once(design.comps[outer].go)
            .chain(design.comps[outer].ports.iter().copied())
            .collect::<Vec<_>>();
        let inner_ports = std::iter::once(design.comps[module].go)
            .chain(design.comps[module].ports.iter().copied())
            .collect::<Vec<_>>();
        for (outer_port, inner_port) in outer_ports.into_iter().zip(inner_ports) {
            let Some(inner) = design.ports[inner_port].peer else {
                continue;
            };
            let depth = match self.input(design, outer_port) {
                None if force => Some(0),
                d => d,
            };
            self.depth.insert(inner, depth);
        }
        for clk in design.inbuf(module).into_iter().flat_map(|i| design.output_buses(i)) {
            if self.depth.get(clk).is_none() {
                self.depth.insert(clk, Some(0));
            }
        }

        let Ok(info) = design.module(module) else {
            return;
        };
        for point in &info.feedback_points {
            self.seeded.insert(*point);
            for bus in design.output_buses(*point) {
                self.depth.insert(bus, Some(0));
            }
        }

        let mut pending = info
            .children
            .iter()
            .copied()
            .filter(|c| design.is_live(*c))
            .collect::<Vec<_>>();
        loop {
            let before = pending.len();
            pending.retain(|c| !self.visit(design, *c, false));
            if pending.is_empty() || pending.len() == before {
                break;
            }
        }
        for comp in pending {
            log::trace!(
                "`{}' sits on a cycle without a feedback point",
                design.comps[comp].name
            );
            self.visit(design, comp, true);
        }
    }

    /// Carry the outputs of `module` out through the exits of `outer`.
    fn leave(&mut self, design: &Design, module: CompIdx, outer: CompIdx) {
        let inner_exits = design.comps[module].exits.clone();
        let outer_exits = design.comps[outer].exits.clone();
        for (inner, outer) in inner_exits.into_iter().zip(outer_exits) {
            let inner_exit = &design.exits[inner];
            let outer_exit = &design.exits[outer];
            let inner_buses = std::iter::once(inner_exit.done).chain(inner_exit.buses.iter().copied());
            let outer_buses = std::iter::once(outer_exit.done).chain(outer_exit.buses.iter().copied());
            for (inner_bus, outer_bus) in inner_buses.zip(outer_buses).collect::<Vec<_>>() {
                let depth = design.buses[inner_bus]
                    .peer
                    .and_then(|p| self.input(design, p))
                    .unwrap_or(0);
                self.set(outer_bus, depth);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_ir::{Builder, OpKind, Policy, add_task};

    #[test]
    fn registers_break_paths() -> ForgeResult<()> {
        let mut design = Design::new();
        let (task, body) = add_task(&mut design, "main", true);
        let mut b = Builder::new(&mut design, body)?;
        let a = b.input("a", 8);
        let x = b.logic("x", &[a.inner], 8);
        let y = b.logic("y", &[x], 8);
        let q = b.reg(y);
        let z = b.logic("z", &[q], 8);
        let m = b.op(OpKind::Mux, &[z, z], 8);
        let m = b.result(m);
        b.output("out", m);
        b.seal();

        let mut ctx = Context::new(design, Policy::default());
        GateDepth { report: true }.run(&mut ctx)?;
        // x, y before the register; z and the mux after it.
        assert_eq!(ctx.design.tasks[task].max_gate_depth, 3);
        assert_eq!(ctx.design.max_gate_depth, 3);
        assert_eq!(ctx.design.unbreakable_gate_depth, 2);
        Ok(())
    }

    #[test]
    fn feedback_points_are_seeded() -> ForgeResult<()> {
        let mut design = Design::new();
        let (task, body) = add_task(&mut design, "main", true);
        let mut b = Builder::new(&mut design, body)?;
        let parts = b.do_loop(None);
        let zero = b.constant(0, 8);
        let var = b.loop_var(&parts, "i", zero);
        let mut bb = b.within(parts.body_block)?;
        let next = bb.logic("inc", &[var.current], 8);
        b.loop_next(&parts, &var, next);
        b.seal();

        let mut ctx = Context::new(design, Policy::default());
        GateDepth { report: false }.run(&mut ctx)?;
        // Loop condition, then the decision's inverter and exit AND. The
        // increment feeds a seeded data register and adds nothing.
        assert_eq!(ctx.design.tasks[task].max_gate_depth, 3);
        Ok(())
    }
}
