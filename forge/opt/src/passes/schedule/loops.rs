use super::ModuleSchedule;
use crate::analysis::flop_needed;
use forge_ir::{BusIdx, CompIdx, CompKind, DepKind, Dependency, Design, Error, ExitIdx, ExitTag, Latency};
use forge_utils::ForgeResult;
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;
use std::collections::HashSet;

impl ModuleSchedule {
    /// Schedule a loop: the init block, then the body with its feedback
    /// registers seeded, then the registers themselves.
    pub(super) fn schedule_loop(&mut self, design: &mut Design, lp: CompIdx) -> ForgeResult<()> {
        let CompKind::Loop {
            init,
            body,
            control_reg,
            data_regs,
            ..
        } = design.comps[lp].kind.clone()
        else {
            return Err(Error::invariant("not a loop").with_node(design.comps[lp].name));
        };
        let Some(body) = body else {
            return Err(Error::invariant("loop without a body").with_node(design.comps[lp].name));
        };
        couple_enables(design, &data_regs);
        self.schedule_component(design, init)?;

        if let Some(reg) = control_reg {
            let exit = design.comps[reg].exits[0];
            let done = design.exits[exit].done;
            self.tracker.define(exit, done, Latency::ZERO);
            for data_reg in &data_regs {
                let exit = design.comps[*data_reg].exits[0];
                self.tracker.set_exit_control(exit, done);
            }
            // The next iteration starts no earlier than the first one.
            let first = self.earliest_start(design, body, done)?;
            self.tracker.set_latency(done, first);
        }

        self.schedule_component(design, body)?;
        for reg in control_reg.iter().chain(&data_regs) {
            self.merge(design, *reg)?;
        }

        let feedback = design.comps[body]
            .exits
            .iter()
            .copied()
            .find(|x| design.exits[*x].tag == ExitTag::Feedback);
        if let (Some(reg), Some(feedback)) = (control_reg, feedback) {
            let needed = flop_needed(design, body, design.exits[feedback].latency);
            if !needed {
                self.elide_flop(design, lp, reg, &data_regs, feedback)?;
            }
            if let CompKind::LoopBody { flop_needed, .. } = &mut design.comps[body].kind {
                *flop_needed = needed;
            }
        }

        for outbuf in design.outbufs(lp).to_vec() {
            self.schedule_component(design, outbuf)?;
        }
        Ok(())
    }

    /// Latest dependency of the body entries that does not come from the
    /// feedback register.
    fn earliest_start(&self, design: &Design, body: CompIdx, feedback: BusIdx) -> ForgeResult<Latency> {
        let mut starts = LinkedHashMap::new();
        for entry in &design.comps[body].entries {
            for (_, dep) in design.entries[*entry].iter_deps() {
                let control = self.tracker.control_bus(design, dep.bus)?;
                if control == feedback || self.tracker.is_placeholder(control) {
                    continue;
                }
                starts.insert(control, self.tracker.control_latency(design, control)?);
            }
        }
        let latest = Latency::get_latest(&starts, &HashSet::new());
        Ok(Latency::and_all(latest.values()).unwrap_or(Latency::ZERO))
    }

    /// Replace the feedback flop with a wire and hand each loop-carried
    /// value straight from the body to the next iteration.
    fn elide_flop(
        &mut self,
        design: &mut Design,
        lp: CompIdx,
        reg: CompIdx,
        data_regs: &[CompIdx],
        feedback: ExitIdx,
    ) -> ForgeResult<()> {
        let control = self.tracker.exit_control(design, feedback)?;
        let pass = self.tracker.passthrough(design, control)?;
        if let Some(done) = design.done_bus(reg) {
            design.rewire(done, pass);
        }
        for data_reg in data_regs {
            let source = design
                .port_by_name(*data_reg, "d")
                .and_then(|d| design.ports[d].bus);
            if let (Some(q), Some(source)) = (design.result_bus(*data_reg), source) {
                design.rewire(q, source);
            }
            design.remove_component(*data_reg);
        }
        design.remove_component(reg);
        if let CompKind::Loop {
            control_reg,
            data_regs,
            ..
        } = &mut design.comps[lp].kind
        {
            *control_reg = None;
            data_regs.clear();
        }
        log::debug!("`{}': feedback flop removed", design.comps[lp].name);
        Ok(())
    }
}

/// A loop-carried register loads exactly when its value arrives.
fn couple_enables(design: &mut Design, data_regs: &[CompIdx]) {
    for reg in data_regs {
        let (Some(d), Some(en)) = (
            design.port_by_name(*reg, "d"),
            design.port_by_name(*reg, "en"),
        ) else {
            continue;
        };
        for entry in design.comps[*reg].entries.to_vec() {
            let sources = design.entries[entry]
                .dependencies(d)
                .iter()
                .filter(|dep| dep.kind == DepKind::Data)
                .map(|dep| dep.bus)
                .collect_vec();
            for bus in sources {
                design.add_dep(entry, en, Dependency::control(bus));
            }
        }
    }
}

/// Tighten the latency of a loop with a known iteration count; leave every
/// other loop open.
pub(super) fn fix_loop_latency(design: &mut Design, lp: CompIdx) {
    let CompKind::Loop {
        init,
        body: Some(body),
        control_reg,
        iterations,
        ..
    } = design.comps[lp].kind.clone()
    else {
        return;
    };
    let exit = design.comps[lp].exits[0];
    let current = design.exits[exit].latency;
    let body_exits = design.comps[body].exits.to_vec();
    let feedback = body_exits
        .iter()
        .find(|x| design.exits[**x].tag == ExitTag::Feedback)
        .map(|x| design.exits[*x].latency);
    let breaks = body_exits
        .iter()
        .filter(|x| !matches!(design.exits[**x].tag, ExitTag::Done | ExitTag::Feedback))
        .map(|x| design.exits[*x].latency)
        .collect_vec();
    let start = design.comps[init]
        .exits
        .first()
        .and_then(|x| design.exits[*x].resolved)
        .unwrap_or(Latency::ZERO);

    let tightened = match (iterations, feedback) {
        (Some(n), Some(feedback))
            if !feedback.is_open() && !start.is_open() && breaks.iter().all(|b| !b.is_open()) =>
        {
            let per_iteration = match control_reg {
                Some(_) => Latency::ONE.add_to(&feedback),
                None => feedback,
            };
            let mut latency = per_iteration.repeat(n);
            if let Some(early) = Latency::or_all(&breaks) {
                latency = latency.or(&early);
            }
            Some(latency.add_to(&start))
        }
        _ => None,
    };
    design.exits[exit].latency =
        tightened.unwrap_or_else(|| Latency::open_at(current.min_clocks(), exit));
}
