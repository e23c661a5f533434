use crate::traversal::{Named, Pass};
use forge_ir::{BusIdx, CompIdx, CompKind, Context, Dependency, Design};
use forge_utils::ForgeResult;
use std::collections::HashMap;

/// What a scope contains.
#[derive(Debug, Default, Clone, Copy)]
struct Found {
    /// Any timing op, global or not.
    timing: bool,
    /// A global timing op.
    global: bool,
}

/// Orders every block around its timing barriers.
///
/// Inside a block, a barrier waits for every component since the previous
/// barrier and every later component waits for the barrier. A module that
/// contains a timing op is itself a barrier in its parent; a call is one
/// only when its procedure contains a global timing op.
#[derive(Default)]
pub struct TimingFence {
    /// One entry per open module scope.
    found: Vec<Found>,
    /// Procedures already fenced, with what they contain.
    procedures: HashMap<CompIdx, Found>,
}

impl Named for TimingFence {
    fn name() -> &'static str {
        "timing-fence"
    }

    fn description() -> &'static str {
        "order components around explicit timing barriers"
    }
}

impl Pass for TimingFence {
    fn run(&mut self, ctx: &mut Context) -> ForgeResult<()> {
        let calls = ctx.design.tasks.values().map(|t| t.call).collect::<Vec<_>>();
        for call in calls {
            self.visit(&mut ctx.design, call);
        }
        Ok(())
    }
}

impl TimingFence {
    /// Whether `comp` is a barrier in its parent.
    fn visit(&mut self, design: &mut Design, comp: CompIdx) -> bool {
        let found = match &design.comps[comp].kind {
            CompKind::TimingOp { global } => Found {
                timing: true,
                global: *global,
            },
            CompKind::Call { procedure } => {
                let procedure = *procedure;
                let inner = match self.procedures.get(&procedure) {
                    Some(inner) => *inner,
                    None => {
                        let inner = self.visit_module(design, procedure);
                        self.procedures.insert(procedure, inner);
                        inner
                    }
                };
                Found {
                    timing: inner.global,
                    global: inner.global,
                }
            }
            _ if design.comps[comp].is_module() => self.visit_module(design, comp),
            _ => Found::default(),
        };
        if let Some(top) = self.found.last_mut() {
            top.timing |= found.timing;
            top.global |= found.global;
        }
        found.timing
    }

    fn visit_module(&mut self, design: &mut Design, module: CompIdx) -> Found {
        self.found.push(Found::default());
        let children = design
            .children(module)
            .iter()
            .copied()
            .filter(|c| design.is_live(*c))
            .collect::<Vec<_>>();
        let barriers = children
            .iter()
            .map(|c| (*c, self.visit(design, *c)))
            .collect::<Vec<_>>();
        if matches!(design.comps[module].kind, CompKind::Block { .. }) {
            fence_block(design, module, &barriers);
        }
        self.found.pop().unwrap_or_default()
    }
}

/// Add the wait dependencies of one block's sequence.
fn fence_block(design: &mut Design, block: CompIdx, sequence: &[(CompIdx, bool)]) {
    let mut last_barrier: Option<CompIdx> = None;
    let mut since: Vec<CompIdx> = Vec::new();
    for (comp, is_barrier) in sequence {
        if *is_barrier {
            for prev in &since {
                wait_for(design, *comp, *prev);
            }
            since.clear();
            last_barrier = Some(*comp);
            log::trace!("`{}' is a timing barrier", design.comps[*comp].name);
        } else if let Some(barrier) = last_barrier {
            wait_for(design, *comp, barrier);
        }
        since.push(*comp);
    }
    if let Some(barrier) = last_barrier {
        for outbuf in design.outbufs(block).to_vec() {
            wait_for(design, outbuf, barrier);
        }
    }
}

/// Make every entry of `comp` wait for the DONE of `on`.
fn wait_for(design: &mut Design, comp: CompIdx, on: CompIdx) {
    let Some(done) = design.done_bus(on) else {
        return;
    };
    add_wait(design, comp, done);
}

fn add_wait(design: &mut Design, comp: CompIdx, done: BusIdx) {
    if design.comps[comp].entries.is_empty() {
        design.primary_entry(comp);
    }
    let go = design.comps[comp].go;
    for entry in design.comps[comp].entries.to_vec() {
        design.add_dep(entry, go, Dependency::wait(done));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_ir::{Builder, DepKind, Policy, add_task};

    fn waits_on(design: &Design, comp: CompIdx, on: CompIdx) -> bool {
        let done = design.done_bus(on).unwrap();
        design.comps[comp].entries.iter().any(|e| {
            design.entries[*e]
                .iter_deps()
                .any(|(_, d)| d.kind == DepKind::Wait && d.bus == done)
        })
    }

    #[test]
    fn local_timing_op_does_not_fence_calls() -> ForgeResult<()> {
        let mut design = Design::new();
        let (_, body) = add_task(&mut design, "main", true);
        let mut b = Builder::new(&mut design, body)?;
        let before = b.op(forge_ir::OpKind::Logic("a".into()), &[], 1);
        let (call, inner) = b.call();
        b.within(inner)?.timing_op(false);
        let after = b.op(forge_ir::OpKind::Logic("b".into()), &[], 1);
        let block = b.block();
        b.within(block)?.timing_op(false);
        let last = b.op(forge_ir::OpKind::Logic("c".into()), &[], 1);

        let mut ctx = Context::new(design, Policy::default());
        TimingFence::default().run(&mut ctx)?;
        let design = &ctx.design;
        assert!(!waits_on(design, after, call));
        assert!(!waits_on(design, call, before));
        // The nested block holds a timing op, so it is a barrier.
        assert!(waits_on(design, block, before));
        assert!(waits_on(design, block, call));
        assert!(waits_on(design, block, after));
        assert!(waits_on(design, last, block));
        Ok(())
    }

    #[test]
    fn shared_procedure_is_fenced_once() -> ForgeResult<()> {
        let mut design = Design::new();
        let (_, body) = add_task(&mut design, "main", true);
        let mut b = Builder::new(&mut design, body)?;
        let (first, inner) = b.call();
        let (op, barrier) = {
            let mut p = b.within(inner)?;
            let op = p.op(forge_ir::OpKind::Logic("a".into()), &[], 1);
            (op, p.timing_op(true))
        };
        let second = b.design.add_component(CompKind::Call { procedure: inner }, Some(body));

        let mut pass = TimingFence::default();
        let mut ctx = Context::new(design, Policy::default());
        pass.run(&mut ctx)?;
        let design = &ctx.design;
        assert_eq!(pass.procedures.len(), 1);
        // Both call sites see the global timing op.
        assert!(waits_on(design, second, first));
        let waits = design.comps[barrier]
            .entries
            .iter()
            .flat_map(|e| design.entries[*e].iter_deps())
            .filter(|(_, d)| d.kind == DepKind::Wait)
            .count();
        assert_eq!(waits, 1);
        assert!(waits_on(design, barrier, op));
        Ok(())
    }
}
