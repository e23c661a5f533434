//! What starts each task, and the pins a task exposes.
use forge_ir::{
    BusIdx, BusKind, CompIdx, CompKind, Design, Error, Id, KickerKind, OpKind, Pin, PinSignal,
    Policy, PortKind, RegKind, TaskIdx,
};
use forge_utils::{ForgeResult, GetName};
use std::collections::HashMap;

/// The shared kicker of each clock domain.
#[derive(Default)]
pub(super) struct SharedKickers {
    by_domain: HashMap<Id, CompIdx>,
}

fn global(design: &mut Design, kind: CompKind) -> CompIdx {
    let comp = design.add_component(kind, None);
    design.comps[comp].non_removable = true;
    design.globals.push(comp);
    comp
}

fn input(design: &mut Design, comp: CompIdx, name: &str, bus: BusIdx) {
    let width = design.buses[bus].width;
    let port = design.add_port(comp, PortKind::Data, name, width);
    design.connect(port, bus);
}

/// Drive the GO of a task's call.
pub(super) fn attach(
    design: &mut Design,
    policy: &Policy,
    task: TaskIdx,
    shared: &mut SharedKickers,
) -> ForgeResult<()> {
    let call = design.tasks[task].call;
    let go = design.comps[call].go;
    if !design.tasks[task].autostart {
        // A module builder exposes GO as a pin instead.
        if design.ports[go].bus.is_none() && !policy.module_builder {
            log::warn!(
                "task `{}' is not autostart and has no enabling signal; tying GO to 0",
                design.tasks[task].name()
            );
            let zero = global(design, CompKind::Op(OpKind::Constant(0)));
            let exit = design.comps[zero].exits[0];
            let bus = design.add_bus(exit, BusKind::Data, "result", 1);
            design.buses[bus].value = Some(0);
            design.connect(go, bus);
        }
        return Ok(());
    }

    let (kicker, driver) = if policy.block_scheduling && !policy.module_builder {
        let kicker = global(design, CompKind::Kicker(KickerKind::Continuous));
        (kicker, done(design, kicker)?)
    } else if policy.block_io {
        let feedback_flop = !design.tasks[task].balanced;
        let kicker = global(design, CompKind::Kicker(KickerKind::Perpetual { feedback_flop }));
        let kick = done(design, kicker)?;
        let repeat = repeat_signal(design, task, kick)?;
        input(design, kicker, "repeat", repeat);
        (kicker, kick)
    } else if policy.module_builder {
        return Ok(());
    } else {
        let domain = design.tasks[task].clock_domain;
        let kicker = match shared.by_domain.get(&domain) {
            Some(kicker) => *kicker,
            None => {
                let kicker = global(design, CompKind::Kicker(KickerKind::Shared));
                shared.by_domain.insert(domain, kicker);
                kicker
            }
        };
        let kick = done(design, kicker)?;
        let or = global(design, CompKind::Op(OpKind::Or));
        let or_out = done(design, or)?;
        input(design, or, "in0", kick);
        let repeat = repeat_signal(design, task, or_out)?;
        input(design, or, "in1", repeat);
        (kicker, or_out)
    };
    design.connect(go, driver);
    design.tasks[task].kicker = Some(kicker);
    log::debug!(
        "task `{}' started by `{}'",
        design.tasks[task].name(),
        design.comps[kicker].name
    );
    Ok(())
}

fn done(design: &Design, comp: CompIdx) -> ForgeResult<BusIdx> {
    design
        .done_bus(comp)
        .ok_or_else(|| Error::invariant("component without a DONE").with_node(design.comps[comp].name))
}

/// The pulse that restarts a task: its DONE when the call produces one,
/// otherwise its GO delayed by the task's fixed latency.
fn repeat_signal(design: &mut Design, task: TaskIdx, go: BusIdx) -> ForgeResult<BusIdx> {
    let call = design.tasks[task].call;
    if design.comps[call].attrs.produces_done {
        return done(design, call);
    }
    let latency = design.exits[design.comps[call].exits[0]].latency;
    if latency.is_open() {
        return Err(Error::unsupported(format!(
            "task `{}' has a variable latency {latency} but no DONE to repeat from",
            design.tasks[task].name()
        )));
    }
    let mut bus = go;
    for _ in 0..latency.min_clocks().max(1) {
        let reg = global(design, CompKind::Reg(RegKind::Control));
        input(design, reg, "d", bus);
        bus = done(design, reg)?;
    }
    Ok(bus)
}

/// Publish the I/O of a task as design-level pins.
pub(super) fn publish_pins(design: &mut Design, policy: &Policy, task: TaskIdx) {
    let call = design.tasks[task].call;
    let task_name = design.tasks[task].name();
    let mut signals = Vec::new();
    if !policy.block_io {
        signals.extend(
            design.comps[call]
                .ports
                .iter()
                .copied()
                .filter(|p| design.ports[*p].kind == PortKind::Data)
                .map(|p| (design.ports[p].name, design.ports[p].width, PinSignal::Input(p))),
        );
        signals.extend(
            design
                .output_buses(call)
                .filter(|b| design.buses[*b].kind == BusKind::Data)
                .map(|b| (design.buses[b].name, design.buses[b].width, PinSignal::Output(b))),
        );
    }
    if policy.module_builder {
        let go = design.comps[call].go;
        if design.tasks[task].kicker.is_none() {
            signals.push((Id::from("go"), 1, PinSignal::Input(go)));
        }
        if let Some(done) = design.done_bus(call) {
            signals.push((Id::from("done"), 1, PinSignal::Output(done)));
        }
    }
    for (name, width, signal) in signals {
        let name = design.gen_name(format!("{task_name}_{name}"));
        design.pins.push(Pin {
            name,
            task,
            width,
            signal,
        });
    }
}
