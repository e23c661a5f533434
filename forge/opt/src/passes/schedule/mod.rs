//! Latency-directed scheduling.
//!
//! Modules are scheduled bottom-up so that every child's exit latencies are
//! final before its parent is visited. Within a module, components are
//! visited in dataflow order; each entry is started by the latest of its
//! dependencies and data that arrives earlier is held until then.
mod entry;
mod loops;
mod stall;
mod tracker;

use crate::analysis::{DataflowOrder, Process, ProcessCache};
use crate::traversal::{ConstructPass, ModuleTraversal, Named, Order, ParseVal, Pass, PassOpt};
use forge_ir::{CompIdx, CompKind, Context, Design, Error, Latency, Policy, SchedAttrs};
use forge_utils::{ForgeResult, GetName};
use itertools::Itertools;
use stall::StallState;
use tracker::LatencyTracker;

/// Connects the GO and data ports of every component and computes the
/// latency of every module exit.
pub struct Scheduler {
    balance: bool,
    processes: ProcessCache,
}

impl Named for Scheduler {
    fn name() -> &'static str {
        "scheduler"
    }

    fn description() -> &'static str {
        "schedule every module by dependency latency"
    }

    fn opts() -> Vec<PassOpt> {
        vec![PassOpt::new(
            "balance",
            "delay early data with registers instead of holding it",
            ParseVal::Bool(false),
            PassOpt::parse_bool,
        )]
    }
}

impl ConstructPass for Scheduler {
    fn from(ctx: &Context) -> ForgeResult<Self> {
        let opts = Self::get_opts(ctx);
        Ok(Scheduler {
            balance: opts["balance"].bool(),
            processes: ProcessCache::default(),
        })
    }
}

impl Pass for Scheduler {
    fn run(&mut self, ctx: &mut Context) -> ForgeResult<()> {
        let design = &mut ctx.design;
        if !design.resources.is_empty() && !design.accesses_counted {
            return Err(Error::pass_assumption(
                Self::name(),
                "resource accesses must be counted before scheduling",
            ));
        }
        let mut policy = ctx.policy;
        policy.balance |= self.balance;
        policy.resolve();
        ctx.policy = policy;
        self.processes.clear();

        for task in design.tasks.keys().collect_vec() {
            let call = design.tasks[task].call;
            let balanced = policy.balance && design.tasks[task].balanceable;
            let order = ModuleTraversal::new(design, &[call], Order::Post)?;
            for comp in order {
                if !design.is_live(comp) {
                    continue;
                }
                if matches!(design.comps[comp].kind, CompKind::Call { .. }) {
                    schedule_call(design, comp)?;
                } else {
                    self.schedule_module(design, &policy, comp, balanced)?;
                }
            }
            design.tasks[task].balanced = balanced;
            log::debug!(
                "scheduled task `{}': {}",
                design.tasks[task].name(),
                design.exits[design.comps[call].exits[0]].latency
            );
        }
        Ok(())
    }
}

/// A call takes on the exit latencies and attributes of its procedure,
/// with open latencies keyed by the call's own exits.
fn schedule_call(design: &mut Design, call: CompIdx) -> ForgeResult<()> {
    let CompKind::Call { procedure } = design.comps[call].kind else {
        return Err(Error::invariant("not a call").with_node(design.comps[call].name));
    };
    let call_exits = design.comps[call].exits.to_vec();
    let body_exits = design.comps[procedure].exits.to_vec();
    if call_exits.len() != body_exits.len() {
        return Err(Error::invariant(format!(
            "call has {} exits but its procedure has {}",
            call_exits.len(),
            body_exits.len()
        ))
        .with_node(design.comps[call].name));
    }
    for (outer, inner) in call_exits.into_iter().zip(body_exits) {
        design.exits[outer].latency = rekey(design.exits[inner].latency, outer);
    }
    design.comps[call].attrs = design.comps[procedure].attrs;
    Ok(())
}

/// Open latencies leaving a module are keyed by the exit they leave through.
fn rekey(latency: Latency, exit: forge_ir::ExitIdx) -> Latency {
    if latency.is_open() {
        Latency::open_at(latency.min_clocks(), exit)
    } else {
        latency
    }
}

impl Scheduler {
    fn schedule_module(
        &mut self,
        design: &mut Design,
        policy: &Policy,
        module: CompIdx,
        balanced: bool,
    ) -> ForgeResult<()> {
        let kind = design.comps[module].kind.clone();
        let consumes_go = matches!(kind, CompKind::Decision { .. })
            || design
                .children(module)
                .iter()
                .any(|c| design.is_live(*c) && design.comps[*c].attrs.consumes_go);
        let processes = if policy.block_scheduling {
            self.processes.get(design, module).to_vec()
        } else {
            Vec::new()
        };
        let mut schedule = ModuleSchedule::new(design, module, consumes_go, balanced, processes)?;

        match kind {
            CompKind::Loop { .. } => schedule.schedule_loop(design, module)?,
            _ => {
                for child in DataflowOrder::children(design, module)? {
                    schedule.schedule_component(design, child)?;
                }
                for outbuf in design.outbufs(module).to_vec() {
                    schedule.schedule_component(design, outbuf)?;
                }
                if let CompKind::Decision {
                    true_and,
                    false_and,
                    ..
                } = kind
                {
                    // Each exit fires on its qualified test result.
                    for (outbuf, and) in design.outbufs(module).to_vec().into_iter().zip([true_and, false_and]) {
                        if let Some(result) = design.result_bus(and) {
                            let go = design.comps[outbuf].go;
                            design.connect(go, result);
                        }
                    }
                }
            }
        }
        schedule.close_module(design)?;

        for exit in design.comps[module].exits.to_vec() {
            let Some(outbuf) = design.exits[exit].peer else {
                continue;
            };
            let control = schedule.tracker.entry_control(outbuf).ok_or_else(|| {
                Error::invariant("exit was never scheduled").with_node(design.comps[module].name)
            })?;
            let latency = schedule.tracker.control_latency(design, control)?;
            design.exits[exit].latency = rekey(latency, exit);
        }
        if matches!(kind, CompKind::Loop { .. }) {
            loops::fix_loop_latency(design, module);
        }
        design.comps[module].attrs = module_attrs(design, policy, module);
        log::trace!(
            "`{}': {}",
            design.comps[module].name,
            design.comps[module]
                .exits
                .iter()
                .map(|x| design.exits[*x].latency.to_string())
                .join(", ")
        );
        Ok(())
    }
}

/// Attributes of a scheduled module, folded over its children.
fn module_attrs(design: &Design, policy: &Policy, module: CompIdx) -> SchedAttrs {
    let mut attrs = SchedAttrs::default();
    let mut variable_child = false;
    for child in design.children(module) {
        let c = &design.comps[*child];
        if !c.live {
            continue;
        }
        attrs.consumes_go |= c.attrs.consumes_go;
        attrs.consumes_clock |= c.attrs.consumes_clock;
        attrs.consumes_reset |= c.attrs.consumes_reset;
        attrs.produces_done |= c.attrs.produces_done;
        variable_child |= c.exits.iter().any(|x| !design.exits[*x].latency.is_fixed());
    }
    if matches!(design.comps[module].kind, CompKind::Decision { .. }) {
        attrs.consumes_go = true;
    }
    let latencies = design.comps[module]
        .exits
        .iter()
        .map(|x| design.exits[*x].latency)
        .collect_vec();
    attrs.produces_done |= variable_child
        || policy.force_go_done
        || latencies.len() > 1
        || latencies.iter().any(|l| !l.is_fixed())
        || latencies.iter().map(|l| l.max_clocks()).unique().count() > 1;
    attrs.done_synchronous =
        attrs.produces_done && latencies.iter().all(|l| l.min_clocks() >= 1);
    attrs
}

/// State for scheduling one module.
pub(super) struct ModuleSchedule {
    module: CompIdx,
    tracker: LatencyTracker,
    /// Delay early data with registers rather than holding it.
    balanced: bool,
    stall: StallState,
}

impl ModuleSchedule {
    fn new(
        design: &Design,
        module: CompIdx,
        consumes_go: bool,
        balanced: bool,
        processes: Vec<Process>,
    ) -> ForgeResult<Self> {
        Ok(ModuleSchedule {
            module,
            tracker: LatencyTracker::new(design, module, consumes_go)?,
            balanced,
            stall: StallState::new(processes),
        })
    }
}
