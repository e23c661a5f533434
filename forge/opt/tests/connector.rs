use forge_ir::{
    Builder, BusKind, CompKind, Context, Design, KickerKind, Latency, OpKind, PinSignal, Policy,
    PortKind, add_task,
};
use forge_opt::passes::GlobalConnector;
use forge_opt::traversal::Pass;
use forge_utils::{ErrorKind, ForgeResult};

fn connect(design: Design, policy: Policy) -> ForgeResult<Context> {
    let mut ctx = Context::new(design, policy);
    GlobalConnector::default().do_pass(&mut ctx)?;
    Ok(ctx)
}

#[test]
fn undriven_task_is_tied_off() -> ForgeResult<()> {
    let mut design = Design::new();
    let (task, body) = add_task(&mut design, "idle", false);
    Builder::new(&mut design, body)?.seal();

    let ctx = connect(design, Policy::default())?;
    let design = &ctx.design;
    let call = design.tasks[task].call;
    let go = design.ports[design.comps[call].go].bus.unwrap();
    assert_eq!(
        design.comps[design.bus_owner(go)].kind,
        CompKind::Op(OpKind::Constant(0))
    );
    assert_eq!(design.const_value(go), Some(0));
    assert_eq!(design.tasks[task].kicker, None);
    Ok(())
}

#[test]
fn variable_latency_without_done_cannot_repeat() -> ForgeResult<()> {
    let mut design = Design::new();
    let (task, body) = add_task(&mut design, "main", true);
    Builder::new(&mut design, body)?.seal();
    let call = design.tasks[task].call;
    let exit = design.comps[call].exits[0];
    design.exits[exit].latency = Latency::open_at(1, exit);
    design.comps[call].attrs.produces_done = false;

    let policy = Policy {
        block_scheduling: false,
        block_io: true,
        ..Policy::default()
    };
    let err = connect(design, policy).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Unsupported(_)));
    Ok(())
}

#[test]
fn tasks_in_one_domain_share_a_kicker() -> ForgeResult<()> {
    let mut design = Design::new();
    let mut calls = Vec::new();
    let mut tasks = Vec::new();
    for name in ["a", "b"] {
        let (task, body) = add_task(&mut design, name, true);
        Builder::new(&mut design, body)?.seal();
        let call = design.tasks[task].call;
        let exit = design.comps[call].exits[0];
        design.exits[exit].latency = Latency::fixed(2);
        calls.push(call);
        tasks.push(task);
    }
    let policy = Policy {
        block_scheduling: false,
        ..Policy::default()
    };
    let ctx = connect(design, policy)?;
    let design = &ctx.design;
    let kickers = tasks
        .iter()
        .map(|t| design.tasks[*t].kicker.unwrap())
        .collect::<Vec<_>>();
    assert_eq!(kickers[0], kickers[1]);
    assert_eq!(
        design.comps[kickers[0]].kind,
        CompKind::Kicker(KickerKind::Shared)
    );
    for call in calls {
        let go = design.ports[design.comps[call].go].bus.unwrap();
        assert_eq!(
            design.comps[design.bus_owner(go)].kind,
            CompKind::Op(OpKind::Or)
        );
    }
    Ok(())
}

#[test]
fn block_scheduled_tasks_kick_continuously() -> ForgeResult<()> {
    let mut design = Design::new();
    let (task, body) = add_task(&mut design, "main", true);
    Builder::new(&mut design, body)?.seal();
    let ctx = connect(design, Policy::default())?;
    let kicker = ctx.design.tasks[task].kicker.unwrap();
    assert_eq!(
        ctx.design.comps[kicker].kind,
        CompKind::Kicker(KickerKind::Continuous)
    );
    Ok(())
}

#[test]
fn task_io_becomes_pins() -> ForgeResult<()> {
    let mut design = Design::new();
    let (task, body) = add_task(&mut design, "main", false);
    let mut b = Builder::new(&mut design, body)?;
    let a = b.input("a", 8);
    b.output("y", a.inner);
    b.seal();
    // The task's call mirrors the body's I/O.
    let call = design.tasks[task].call;
    let port = design.add_port(call, PortKind::Data, "a", 8);
    let exit = design.comps[call].exits[0];
    let bus = design.add_bus(exit, BusKind::Data, "y", 8);

    let policy = Policy {
        module_builder: true,
        ..Policy::default()
    };
    let ctx = connect(design, policy)?;
    let pins = &ctx.design.pins;
    let names = pins.iter().map(|p| p.name.to_string()).collect::<Vec<_>>();
    assert_eq!(names, ["main_a", "main_y", "main_go", "main_done"]);
    assert!(matches!(pins[0].signal, PinSignal::Input(p) if p == port));
    assert!(matches!(pins[1].signal, PinSignal::Output(b) if b == bus));
    assert!(pins.iter().all(|p| p.task == task));
    Ok(())
}

#[test]
fn module_builder_with_block_io_keeps_a_perpetual_kicker() -> ForgeResult<()> {
    let mut design = Design::new();
    let (task, body) = add_task(&mut design, "main", true);
    Builder::new(&mut design, body)?.seal();
    let policy = Policy {
        module_builder: true,
        block_io: true,
        ..Policy::default()
    };
    let ctx = connect(design, policy)?;
    let design = &ctx.design;
    let kicker = design.tasks[task].kicker.unwrap();
    assert!(matches!(
        design.comps[kicker].kind,
        CompKind::Kicker(KickerKind::Perpetual { .. })
    ));
    let call = design.tasks[task].call;
    assert_eq!(design.ports[design.comps[call].go].bus, design.done_bus(kicker));
    // GO is driven by the kicker, so only DONE is published.
    let names = design.pins.iter().map(|p| p.name.to_string()).collect::<Vec<_>>();
    assert_eq!(names, ["main_done"]);
    Ok(())
}

#[test]
fn module_builder_alone_publishes_go() -> ForgeResult<()> {
    let mut design = Design::new();
    let (task, body) = add_task(&mut design, "main", true);
    Builder::new(&mut design, body)?.seal();
    let policy = Policy {
        module_builder: true,
        ..Policy::default()
    };
    let ctx = connect(design, policy)?;
    let design = &ctx.design;
    assert_eq!(design.tasks[task].kicker, None);
    let call = design.tasks[task].call;
    assert_eq!(design.ports[design.comps[call].go].bus, None);
    assert!(design.pins.iter().any(|p| p.name.to_string() == "main_go"));
    Ok(())
}
