use forge_ir::{
    Builder, BusIdx, CompKind, Context, DepKind, Design, ExitTag, Latency, LoopParts, OpKind,
    Policy, PortKind, ResourceKind, add_task,
};
use forge_opt::passes::{AccessCounter, Scheduler};
use forge_opt::traversal::Pass;
use forge_utils::ForgeResult;
use proptest::prelude::*;

fn schedule(design: Design, policy: Policy) -> ForgeResult<Context> {
    let mut ctx = Context::new(design, policy);
    AccessCounter::do_pass_default(&mut ctx)?;
    Scheduler::do_pass_default(&mut ctx)?;
    Ok(ctx)
}

/// A task that pushes its input through `depth` registers.
fn register_chain(depth: usize) -> ForgeResult<(Design, forge_ir::CompIdx)> {
    let mut design = Design::new();
    let (task, body) = add_task(&mut design, "main", false);
    let mut b = Builder::new(&mut design, body)?;
    let a = b.input("a", 8);
    let mut value = a.inner;
    for _ in 0..depth {
        value = b.reg(value);
    }
    b.output("y", value);
    b.seal();
    let call = design.tasks[task].call;
    Ok((design, call))
}

proptest! {
    #[test]
    fn every_register_adds_a_clock(depth in 0usize..6) {
        let (design, call) = register_chain(depth).unwrap();
        let ctx = schedule(design, Policy::default()).unwrap();
        let exit = ctx.design.comps[call].exits[0];
        prop_assert_eq!(ctx.design.exits[exit].latency, Latency::fixed(depth as u32));

        let (design, call) = register_chain(depth + 1).unwrap();
        let longer = schedule(design, Policy::default()).unwrap();
        let exit = longer.design.comps[call].exits[0];
        prop_assert!(longer.design.exits[exit].latency.is_gt(&Latency::fixed(depth as u32)));
    }
}

/// A task over two inputs built from `steps`: `(true, i, _)` registers
/// value `i`, `(false, i, j)` combines values `i` and `j`.
fn random_dataflow(steps: &[(bool, usize, usize)]) -> ForgeResult<(Design, forge_ir::CompIdx)> {
    let mut design = Design::new();
    let (_, body) = add_task(&mut design, "main", false);
    let mut b = Builder::new(&mut design, body)?;
    let mut values: Vec<BusIdx> = vec![b.input("a", 8).inner, b.input("b", 8).inner];
    for (delay, i, j) in steps {
        let x = values[i % values.len()];
        let next = if *delay {
            b.reg(x)
        } else {
            let y = values[j % values.len()];
            b.logic("f", &[x, y], 8)
        };
        values.push(next);
    }
    for (i, value) in values.iter().skip(2).enumerate() {
        b.output(format!("y{i}"), *value);
    }
    b.seal();
    Ok((design, body))
}

/// Every scheduled entry starts no earlier than the data it consumes, and
/// every exit finishes no earlier than its entry.
fn assert_monotone(design: &Design, module: forge_ir::CompIdx) {
    for child in design.children(module) {
        let comp = &design.comps[*child];
        for entry in &comp.entries {
            let entry = &design.entries[*entry];
            let Some(start) = entry.latency else {
                continue;
            };
            for (_, dep) in entry.iter_deps() {
                if dep.kind != DepKind::Data {
                    continue;
                }
                let producer = &design.exits[design.buses[dep.bus].exit];
                if let Some(ready) = producer.resolved {
                    assert!(
                        start.is_ge(&ready),
                        "`{}' starts at {start} before its data at {ready}",
                        comp.name
                    );
                }
            }
            for exit in &comp.exits {
                if let Some(done) = design.exits[*exit].resolved {
                    assert!(done.is_ge(&start), "`{}' finishes before it starts", comp.name);
                }
            }
        }
    }
}

proptest! {
    #[test]
    fn data_never_arrives_late(
        steps in prop::collection::vec((any::<bool>(), 0usize..8, 0usize..8), 1..10),
        balance in any::<bool>(),
    ) {
        let (design, body) = random_dataflow(&steps).unwrap();
        let policy = Policy { balance, ..Policy::default() };
        let ctx = schedule(design, policy).unwrap();
        assert_monotone(&ctx.design, body);
    }
}

fn counted_loop(iterations: Option<u32>) -> ForgeResult<(Design, LoopParts)> {
    let mut design = Design::new();
    let (_, body) = add_task(&mut design, "main", false);
    let mut b = Builder::new(&mut design, body)?;
    let parts = b.do_loop(iterations);
    {
        let mut inner = b.within(parts.body_block)?;
        let x = inner.constant(3, 8);
        inner.reg(x);
    }
    b.seal();
    Ok((design, parts))
}

/// The scheduled loop latency with the init block's finish and the
/// scheduled latency of one iteration.
fn loop_latencies(design: &Design, parts: &LoopParts) -> (Latency, u32, u32) {
    let exit = design.comps[parts.lp].exits[0];
    let start = design.exits[design.comps[parts.init].exits[0]]
        .resolved
        .unwrap_or(Latency::ZERO);
    assert!(start.is_fixed());
    let feedback = design.comps[parts.body]
        .exits
        .iter()
        .map(|x| &design.exits[*x])
        .find(|x| x.tag == ExitTag::Feedback)
        .map(|x| x.latency)
        .unwrap();
    assert!(feedback.is_fixed());
    let flop = match design.comps[parts.lp].kind {
        CompKind::Loop { control_reg, .. } => control_reg.is_some() as u32,
        _ => unreachable!(),
    };
    (
        design.exits[exit].latency,
        start.min_clocks(),
        feedback.min_clocks() + flop,
    )
}

#[test]
fn counted_loop_has_a_fixed_latency() -> ForgeResult<()> {
    let (design, parts) = counted_loop(Some(1))?;
    let ctx = schedule(design, Policy::default())?;
    let (once, start, per_iteration) = loop_latencies(&ctx.design, &parts);
    // The body register takes a clock every iteration.
    assert!(per_iteration >= 1);
    assert_eq!(once, Latency::fixed(start + per_iteration));

    let (design, parts) = counted_loop(Some(4))?;
    let ctx = schedule(design, Policy::default())?;
    let (four, start, per_iteration) = loop_latencies(&ctx.design, &parts);
    assert_eq!(four, Latency::fixed(start + 4 * per_iteration));
    assert_eq!(four.min_clocks(), four.max_clocks().unwrap());
    assert!(four.is_gt(&once));
    Ok(())
}

#[test]
fn loop_break_shortens_the_minimum() -> ForgeResult<()> {
    let (design, parts) = counted_loop(Some(4))?;
    let plain = schedule(design, Policy::default())?;
    let (plain, ..) = loop_latencies(&plain.design, &parts);

    let (mut design, parts) = counted_loop(Some(4))?;
    // Leave the body straight after the loop test.
    let exit = design.add_exit(parts.body, ExitTag::Break, None);
    let outbuf = design.exits[exit].peer.unwrap();
    let tested = design.exits[design.comps[parts.decision].exits[0]].done;
    Builder::new(&mut design, parts.body)?.go_after(outbuf, tested);

    let ctx = schedule(design, Policy::default())?;
    let (latency, start, per_iteration) = loop_latencies(&ctx.design, &parts);
    let early = ctx.design.exits[exit].latency;
    assert!(!early.is_open());
    assert!(early.min_clocks() < per_iteration);
    assert_eq!(
        latency,
        Latency::get(start + early.min_clocks(), start + 4 * per_iteration)
    );
    assert_eq!(latency.max_clocks(), plain.max_clocks());
    assert!(latency.min_clocks() < plain.min_clocks());
    Ok(())
}

#[test]
fn unbounded_loop_stays_open() -> ForgeResult<()> {
    let (design, parts) = counted_loop(None)?;
    let ctx = schedule(design, Policy::default())?;
    let exit = ctx.design.comps[parts.lp].exits[0];
    let latency = ctx.design.exits[exit].latency;
    assert!(latency.is_open());
    assert_eq!(latency.key(), Some(exit));
    Ok(())
}

#[test]
fn memory_process_stalls_the_block() -> ForgeResult<()> {
    let mut design = Design::new();
    let mem = design.add_resource(
        "mem",
        ResourceKind::MemoryPort {
            width: 8,
            address_width: 4,
            combinational_read: false,
        },
    );
    let (_, body) = add_task(&mut design, "main", false);
    let mut b = Builder::new(&mut design, body)?;
    let addr = b.input("addr", 4);
    let first = b.mem_read(mem, addr.inner);
    b.mem_read(mem, addr.inner);
    b.seal();

    let ctx = schedule(design, Policy::default())?;
    let design = &ctx.design;
    let live = |kind: &CompKind| {
        design
            .children(body)
            .iter()
            .filter(|c| design.comps[**c].kind == *kind)
            .copied()
            .collect::<Vec<_>>()
    };
    let stallboards = live(&CompKind::Stallboard);
    assert_eq!(stallboards.len(), 1);
    let stallboard = stallboards[0];
    assert!(design.module(body)?.feedback_points.contains(&stallboard));

    let stalls = design.comps[stallboard]
        .ports
        .iter()
        .filter(|p| design.ports[**p].kind == PortKind::Stall)
        .collect::<Vec<_>>();
    assert_eq!(stalls.len(), 1);
    let pass = design.bus_owner(design.ports[*stalls[0]].bus.unwrap());
    assert_eq!(design.comps[pass].kind, CompKind::Op(OpKind::PassThrough));

    // The address input is held while the block is stalled.
    assert_eq!(live(&CompKind::Latch).len(), 1);
    let first_go = design.ports[design.comps[first].go].bus.unwrap();
    assert_eq!(design.bus_owner(first_go), stallboard);
    Ok(())
}

#[test]
fn no_stalls_without_block_scheduling() -> ForgeResult<()> {
    let mut design = Design::new();
    let mem = design.add_resource(
        "mem",
        ResourceKind::MemoryPort {
            width: 8,
            address_width: 4,
            combinational_read: true,
        },
    );
    let (_, body) = add_task(&mut design, "main", false);
    let mut b = Builder::new(&mut design, body)?;
    let addr = b.input("addr", 4);
    b.mem_read(mem, addr.inner);
    b.mem_read(mem, addr.inner);
    b.seal();

    let policy = Policy {
        block_scheduling: false,
        ..Policy::default()
    };
    let ctx = schedule(design, policy)?;
    assert!(
        ctx.design
            .comps
            .values()
            .all(|c| c.kind != CompKind::Stallboard)
    );
    Ok(())
}
