use super::global_connector;
use crate::traversal::{ConstructPass, Named, ParseVal, Pass, PassOpt};
use forge_ir::{
    BusIdx, BusKind, CompIdx, CompKind, Context, Dependency, Design, EntryIdx, Error, OpKind,
    Policy, PortIdx,
};
use forge_utils::{ForgeResult, GetName};
use itertools::Itertools;
use std::collections::BTreeSet;

/// Warn if dead logic removal loops more than this number of times
const LOOP_THRESHOLD: u64 = 5;

/// Removes components nothing depends on, until no more can be removed.
pub struct DeadLogic {
    max_iterations: u64,
}

impl Named for DeadLogic {
    fn name() -> &'static str {
        "dead-logic"
    }

    fn description() -> &'static str {
        "removes components whose results are never used"
    }

    fn opts() -> Vec<PassOpt> {
        vec![PassOpt::new(
            "max-iterations",
            "give up when the design has not settled after this many passes",
            ParseVal::Num(64),
            PassOpt::parse_num,
        )]
    }
}

impl ConstructPass for DeadLogic {
    fn from(ctx: &Context) -> ForgeResult<Self> {
        let opts = Self::get_opts(ctx);
        Ok(DeadLogic {
            max_iterations: opts["max-iterations"].pos_num().unwrap_or(64),
        })
    }
}

impl Pass for DeadLogic {
    fn run(&mut self, ctx: &mut Context) -> ForgeResult<()> {
        let mut count = 0;
        loop {
            let removed = prune(&mut ctx.design, &ctx.policy)?;
            if removed == 0 {
                break;
            }
            count += 1;
            if count == LOOP_THRESHOLD {
                log::warn!("{} looped {count} times; pruning may not terminate", Self::name());
            }
            if count >= self.max_iterations {
                return Err(Error::misc(format!(
                    "{} did not settle after {count} iterations",
                    Self::name()
                )));
            }
        }
        log::debug!("{} settled after {count} iterations", Self::name());
        Ok(())
    }
}

/// One sweep over the whole design. Returns the number of modifications.
pub fn prune(design: &mut Design, policy: &Policy) -> ForgeResult<usize> {
    let mut modified = 0;
    let mut disconnected = BTreeSet::new();
    for comp in design.comps.keys().collect_vec() {
        if !design.is_live(comp) {
            continue;
        }
        if let CompKind::Branch { .. } = design.comps[comp].kind {
            modified += collapse_branch(design, comp);
        }
        if protected(design, comp) {
            continue;
        }
        let kind = design.comps[comp].kind.clone();
        let remove = match &kind {
            CompKind::Op(OpKind::NoOp) => {
                for (input, output) in design
                    .data_ports(comp)
                    .zip(design.output_buses(comp).filter(|b| design.buses[*b].kind == BusKind::Data))
                    .collect_vec()
                {
                    if let Some(source) = design.source_of(input) {
                        design.rewire(output, source);
                    }
                }
                true
            }
            CompKind::Call { procedure } => {
                let empty = design.children(*procedure).is_empty();
                if empty {
                    bypass_call(design, comp, *procedure);
                }
                empty
            }
            k if k.is_module() => {
                let empty = design.children(comp).is_empty();
                if empty {
                    bypass_module(design, comp);
                }
                empty
            }
            _ => is_dead(design, comp),
        };
        if remove {
            if let CompKind::Access { resource, .. } = &kind {
                if design.resources[*resource].physical.is_some() {
                    disconnected.insert(*resource);
                }
            }
            wire_through(design, comp);
            log::debug!("removing `{}'", design.comps[comp].name);
            design.remove_component(comp);
            modified += 1;
        }
    }
    // Arbitration built for removed reads is rebuilt over the accesses left.
    for resource in disconnected {
        global_connector::reconnect(design, policy, resource)?;
    }
    modified += prune_resources(design);
    Ok(modified)
}

/// Structural parts of the design that are never removed.
fn protected(design: &Design, comp: CompIdx) -> bool {
    let c = &design.comps[comp];
    if c.non_removable || c.kind.is_boundary() {
        return true;
    }
    match &c.kind {
        CompKind::TimingOp { .. } | CompKind::Block { procedure_body: true } => return true,
        CompKind::Access { kind, .. } if kind.is_write() => return true,
        _ => {}
    }
    let Some(owner) = c.owner else {
        return false;
    };
    match &design.comps[owner].kind {
        CompKind::Branch {
            decision,
            true_block,
            false_block,
        } => [*decision, *true_block, *false_block].contains(&comp),
        CompKind::Decision { .. } | CompKind::LoopBody { .. } => true,
        CompKind::Loop {
            init,
            body,
            control_reg,
            data_regs,
            ..
        } => {
            *init == comp
                || *body == Some(comp)
                || *control_reg == Some(comp)
                || data_regs.contains(&comp)
        }
        _ => false,
    }
}

/// A component is dead when nothing reads its results, or when it has
/// inputs and none of them is driven. The sideband of a read only requests
/// the value, so a read is dead once its data is unused.
fn is_dead(design: &Design, comp: CompIdx) -> bool {
    let read = matches!(
        design.comps[comp].kind,
        CompKind::Access { kind, .. } if !kind.is_write()
    );
    let data = design
        .output_buses(comp)
        .filter(|b| match design.buses[*b].kind {
            BusKind::Data => true,
            BusKind::Sideband => !read,
            _ => false,
        })
        .collect_vec();
    let outputs = if data.is_empty() {
        design.output_buses(comp).collect_vec()
    } else {
        data
    };
    let used = outputs.iter().any(|b| {
        design
            .consumers(*b)
            .any(|p| design.ports[p].owner != comp)
            || design
                .dependents(*b)
                .iter()
                .any(|(e, _)| design.entries[*e].owner != comp)
    });
    if !used {
        return true;
    }
    let inputs = design.data_ports(comp).collect_vec();
    !inputs.is_empty()
        && inputs.iter().all(|p| {
            design.ports[*p].bus.is_none()
                && design.comps[comp]
                    .entries
                    .iter()
                    .all(|e| design.entries[*e].dependencies(*p).is_empty())
        })
}

/// Hand everything waiting on the DONE of `comp` to whatever starts it.
fn wire_through(design: &mut Design, comp: CompIdx) {
    let go = design.comps[comp].go;
    let physical = design.ports[go].bus;
    let sources = design.comps[comp]
        .entries
        .iter()
        .flat_map(|e| design.entries[*e].dependencies(go).iter().map(|d| d.bus))
        .unique()
        .collect_vec();
    for exit in design.comps[comp].exits.to_vec() {
        let done = design.exits[exit].done;
        if let Some(physical) = physical {
            design.rewire_physical(done, physical, &[comp]);
        }
        for entry in design.dependents(done).into_iter().map(|(e, _)| e).unique().collect_vec() {
            let waiting = design.entries[entry]
                .iter_deps()
                .filter(|(_, d)| d.bus == done)
                .map(|(port, d)| (port, *d))
                .collect_vec();
            design.entries[entry].remove_deps_on(done);
            for (port, dep) in waiting {
                for source in &sources {
                    design.entries[entry].add_dependency(
                        port,
                        Dependency {
                            bus: *source,
                            ..dep
                        },
                    );
                }
            }
        }
    }
}

/// Connect the outputs of an empty module straight to the values that
/// feed it.
fn bypass_module(design: &mut Design, module: CompIdx) {
    for bus in design.output_buses(module).collect_vec() {
        if design.buses[bus].kind == BusKind::Done {
            continue;
        }
        let source = design
            .buses[bus]
            .peer
            .and_then(|port| design.source_of(port))
            .and_then(|inner| design.buses[inner].peer)
            .and_then(|port| design.source_of(port));
        if let Some(source) = source {
            design.rewire(bus, source);
        }
    }
}

/// Like [bypass_module], through the positional mapping between a call and
/// its procedure.
fn bypass_call(design: &mut Design, call: CompIdx, procedure: CompIdx) {
    let call_buses = design.output_buses(call).collect_vec();
    let body_buses = design.output_buses(procedure).collect_vec();
    for (outer, inner) in call_buses.into_iter().zip(body_buses) {
        if design.buses[outer].kind == BusKind::Done {
            continue;
        }
        let source = design
            .buses[inner]
            .peer
            .and_then(|port| design.source_of(port))
            .and_then(|fed| design.buses[fed].peer)
            .and_then(|body_port| {
                let position = design.comps[procedure].ports.iter().position(|p| *p == body_port)?;
                design.comps[call].ports.get(position).copied()
            })
            .and_then(|call_port| design.source_of(call_port));
        if let Some(source) = source {
            design.rewire(outer, source);
        }
    }
}

/// Drop the untaken side of a branch whose condition is constant. The
/// untaken block is emptied and its path into the branch exit is removed.
/// Once scheduled, the exit is driven straight from the taken side, which
/// leaves the merging mux and GO OR without consumers.
fn collapse_branch(design: &mut Design, branch: CompIdx) -> usize {
    let CompKind::Branch {
        decision,
        true_block,
        false_block,
    } = design.comps[branch].kind
    else {
        return 0;
    };
    let CompKind::Decision { test_block, .. } = design.comps[decision].kind else {
        return 0;
    };
    let Some(value) = design
        .result_bus(test_block)
        .and_then(|bus| design.const_value(bus))
    else {
        return 0;
    };
    let untaken = if value != 0 { false_block } else { true_block };
    let untaken_exit = design.comps[untaken].exits[0];
    let outbufs = design
        .outbufs(branch)
        .iter()
        .copied()
        .filter(|o| design.comps[*o].entries.len() == 2)
        .collect_vec();
    if outbufs.is_empty() {
        return 0;
    }
    for child in design.children(untaken).to_vec() {
        design.remove_component(child);
    }
    for outbuf in outbufs {
        let (dropped, kept): (Vec<EntryIdx>, Vec<EntryIdx>) = design.comps[outbuf]
            .entries
            .iter()
            .copied()
            .partition(|e| design.entries[*e].driving_exit == Some(untaken_exit));
        for entry in &dropped {
            design.entries[*entry].deps.clear();
        }
        design.comps[outbuf].entries.retain(|e| !dropped.contains(e));
        if let [taken] = kept.as_slice() {
            if let Some(control) = design.entries[*taken].control {
                bypass_merge(design, branch, outbuf, control);
            }
        }
    }
    log::debug!(
        "`{}' always takes its {} side",
        design.comps[branch].name,
        if value != 0 { "true" } else { "false" }
    );
    1
}

/// Drive the ports of a scheduled branch OutBuf from the side started by
/// `control` instead of the merge hardware in `branch`.
fn bypass_merge(design: &mut Design, branch: CompIdx, outbuf: CompIdx, control: BusIdx) {
    let merged_by = |design: &Design, port: PortIdx, op: OpKind| {
        design.ports[port].bus.map(|bus| design.bus_owner(bus)).filter(|owner| {
            design.comps[*owner].kind == CompKind::Op(op) && design.comps[*owner].owner == Some(branch)
        })
    };
    let go = design.comps[outbuf].go;
    if merged_by(&*design, go, OpKind::Or).is_some() {
        design.connect(go, control);
    }
    for port in design.data_ports(outbuf).collect_vec() {
        let Some(mux) = merged_by(&*design, port, OpKind::Mux) else {
            continue;
        };
        let taken = design.comps[mux]
            .ports
            .iter()
            .copied()
            .tuples::<(PortIdx, PortIdx)>()
            .find(|(select, _)| design.ports[*select].bus == Some(control))
            .and_then(|(_, data)| design.ports[data].bus);
        if let Some(data) = taken {
            design.connect(port, data);
        }
    }
}

/// Remove resources no live access refers to.
fn prune_resources(design: &mut Design) -> usize {
    let unused = design
        .resources
        .iter()
        .filter(|(_, r)| r.live && r.accesses.iter().all(|a| !design.is_live(*a)))
        .map(|(idx, _)| idx)
        .collect_vec();
    for resource in &unused {
        log::debug!("pruning resource `{}'", design.resources[*resource].name());
        design.remove_resource(*resource);
    }
    unused.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_ir::{Builder, ResourceKind, add_task};

    #[test]
    fn unused_logic_is_removed() -> ForgeResult<()> {
        let mut design = Design::new();
        let (_, body) = add_task(&mut design, "main", false);
        let mut b = Builder::new(&mut design, body)?;
        let a = b.input("a", 8);
        let used = b.logic("inc", &[a.inner], 8);
        let unused = b.logic("dec", &[a.inner], 8);
        let chained = b.logic("neg", &[unused], 8);
        b.output("y", used);
        b.seal();

        let policy = Policy::default();
        assert!(prune(&mut design, &policy)? > 0);
        while prune(&mut design, &policy)? > 0 {}
        assert!(design.is_live(design.bus_owner(used)));
        assert!(!design.is_live(design.bus_owner(unused)));
        assert!(!design.is_live(design.bus_owner(chained)));
        Ok(())
    }

    #[test]
    fn noop_is_bypassed() -> ForgeResult<()> {
        let mut design = Design::new();
        let (_, body) = add_task(&mut design, "main", false);
        let mut b = Builder::new(&mut design, body)?;
        let a = b.input("a", 8);
        let noop = b.op(OpKind::NoOp, &[a.inner], 8);
        let out = b.result(noop);
        let inc = b.op(OpKind::Logic("inc".into()), &[out], 8);
        let y = b.result(inc);
        b.output("y", y);
        b.seal();

        prune(&mut design, &Policy::default())?;
        assert!(!design.is_live(noop));
        assert!(design.is_live(inc));
        let port = design.data_ports(inc).next().unwrap();
        assert_eq!(design.source_of(port), Some(a.inner));
        Ok(())
    }

    #[test]
    fn unused_resources_are_pruned() -> ForgeResult<()> {
        let mut design = Design::new();
        let r = design.add_resource("r", ResourceKind::Register { width: 8 });
        let (_, body) = add_task(&mut design, "main", false);
        let mut b = Builder::new(&mut design, body)?;
        b.reg_read(r);
        b.seal();
        let mut ctx = Context::new(design, Default::default());
        DeadLogic::do_pass_default(&mut ctx)?;
        assert!(!ctx.design.resources[r].live);
        Ok(())
    }

    #[test]
    fn iteration_limit() -> ForgeResult<()> {
        let mut design = Design::new();
        let (_, body) = add_task(&mut design, "main", false);
        let mut b = Builder::new(&mut design, body)?;
        let a = b.input("a", 8);
        let x = b.logic("f", &[a.inner], 8);
        b.logic("g", &[x], 8);
        b.seal();
        let mut ctx = Context::new(design, Default::default());
        ctx.extra_opts.push("dead-logic:max-iterations=1".to_string());
        assert!(DeadLogic::do_pass_default(&mut ctx).is_err());
        Ok(())
    }
}
