use forge_ir::{
    Builder, BusKind, CompKind, Context, Dependency, Design, OpKind, Policy, ResourceKind,
    add_task,
};
use forge_opt::pass_manager::PassManager;
use forge_opt::passes::DeadLogic;
use forge_opt::traversal::Pass;
use forge_utils::ForgeResult;

fn live_count(design: &Design) -> usize {
    design.comps.values().filter(|c| c.live).count()
}

fn prune(design: Design) -> ForgeResult<Context> {
    let mut ctx = Context::new(design, Policy::default());
    DeadLogic::do_pass_default(&mut ctx)?;
    Ok(ctx)
}

#[test]
fn pruning_twice_changes_nothing() -> ForgeResult<()> {
    let mut design = Design::new();
    let r = design.add_resource("r", ResourceKind::Register { width: 8 });
    let (_, body) = add_task(&mut design, "main", false);
    let mut b = Builder::new(&mut design, body)?;
    let a = b.input("a", 8);
    let x = b.logic("f", &[a.inner], 8);
    let unused = b.logic("g", &[x], 8);
    b.logic("h", &[unused], 8);
    let kept = b.logic("k", &[x], 8);
    b.reg_write(r, kept);
    b.seal();

    let mut ctx = prune(design)?;
    let after_first = live_count(&ctx.design);
    DeadLogic::do_pass_default(&mut ctx)?;
    assert_eq!(live_count(&ctx.design), after_first);
    assert!(ctx.design.resources[r].live);
    Ok(())
}

#[test]
fn constant_branch_keeps_one_side() -> ForgeResult<()> {
    let mut design = Design::new();
    let (_, body) = add_task(&mut design, "main", false);
    let mut b = Builder::new(&mut design, body)?;
    let cond = b.constant(1, 1);
    let parts = b.branch(cond);
    let r = {
        let mut t = b.within(parts.true_block)?;
        t.op(OpKind::Logic("t".into()), &[], 1)
    };
    let f = {
        let mut f = b.within(parts.false_block)?;
        f.op(OpKind::Logic("f".into()), &[], 1)
    };
    b.seal();
    // Keep both sides alive until the branch is resolved.
    design.comps[r].non_removable = true;
    design.comps[f].non_removable = true;

    let ctx = prune(design)?;
    let design = &ctx.design;
    assert!(design.is_live(r));
    assert!(!design.is_live(f));
    assert!(design.is_live(parts.false_block));
    assert!(design.children(parts.false_block).is_empty());
    let outbuf = design.outbufs(parts.branch)[0];
    let entries = &design.comps[outbuf].entries;
    assert_eq!(entries.len(), 1);
    let true_exit = design.comps[parts.true_block].exits[0];
    assert_eq!(design.entries[entries[0]].driving_exit, Some(true_exit));
    Ok(())
}

fn compile(design: Design) -> ForgeResult<Context> {
    let pm = PassManager::default_passes()?;
    let mut ctx = Context::new(design, Policy::default());
    pm.execute_plan(&mut ctx, &["all".to_string()], &[])?;
    Ok(ctx)
}

#[test]
fn constant_branch_loses_its_merge_after_scheduling() -> ForgeResult<()> {
    let mut design = Design::new();
    let (_, body) = add_task(&mut design, "main", true);
    let mut b = Builder::new(&mut design, body)?;
    let cond = b.constant(1, 1);
    let parts = b.branch(cond);
    let taken = {
        let mut t = b.within(parts.true_block)?;
        let v = t.logic("t", &[], 8);
        t.output("v", v)
    };
    let untaken = {
        let mut f = b.within(parts.false_block)?;
        let v = f.logic("f", &[], 8);
        f.output("v", v)
    };
    // Merge both sides into one output of the branch.
    let exit = b.design.comps[parts.branch].exits[0];
    let merged = b.design.add_bus(exit, BusKind::Data, "y", 8);
    let port = b.design.buses[merged].peer.unwrap();
    let outbuf = b.design.outbufs(parts.branch)[0];
    for (entry, value) in b.design.comps[outbuf].entries.clone().into_iter().zip([taken, untaken]) {
        b.design.add_dep(entry, port, Dependency::data(value));
    }
    b.output("y", merged);
    b.seal();

    let ctx = compile(design)?;
    let design = &ctx.design;
    let entries = &design.comps[outbuf].entries;
    assert_eq!(entries.len(), 1);
    let control = design.entries[entries[0]].control;
    assert!(control.is_some());
    assert_eq!(design.ports[design.comps[outbuf].go].bus, control);

    let driver = design.ports[port].bus.unwrap();
    let merge_kinds = [CompKind::Op(OpKind::Mux), CompKind::Op(OpKind::Or)];
    assert!(!merge_kinds.contains(&design.comps[design.bus_owner(driver)].kind));
    assert!(
        design
            .children(parts.branch)
            .iter()
            .all(|c| !design.is_live(*c) || !merge_kinds.contains(&design.comps[*c].kind))
    );
    Ok(())
}

#[test]
fn unused_read_leaves_no_arbitration() -> ForgeResult<()> {
    let mut design = Design::new();
    let mem = design.add_resource(
        "mem",
        ResourceKind::MemoryPort {
            width: 8,
            address_width: 4,
            combinational_read: false,
        },
    );
    let (_, body) = add_task(&mut design, "main", true);
    let mut b = Builder::new(&mut design, body)?;
    let addr = b.input("addr", 4);
    let used = b.mem_read(mem, addr.inner);
    let value = b.result(used);
    b.output("y", value);
    let unused = b.mem_read(mem, addr.inner);
    b.seal();

    let ctx = compile(design)?;
    let design = &ctx.design;
    assert!(design.is_live(used));
    assert!(!design.is_live(unused));
    assert_eq!(design.resources[mem].accesses, vec![used]);
    assert!(design.resources[mem].physical.is_some());
    assert!(
        design
            .comps
            .values()
            .filter(|c| c.live && c.kind.resource() == Some(mem))
            .all(|c| !matches!(c.kind, CompKind::Gateway { .. }))
    );
    // Nothing is left wired to the removed read.
    assert!(
        design
            .ports
            .values()
            .filter(|p| design.is_live(p.owner))
            .filter_map(|p| p.bus)
            .all(|bus| design.bus_owner(bus) != unused)
    );
    Ok(())
}

#[test]
fn unknown_condition_keeps_both_sides() -> ForgeResult<()> {
    let mut design = Design::new();
    let (_, body) = add_task(&mut design, "main", false);
    let mut b = Builder::new(&mut design, body)?;
    let a = b.input("a", 1);
    let parts = b.branch(a.inner);
    b.seal();

    let ctx = prune(design)?;
    let outbuf = ctx.design.outbufs(parts.branch)[0];
    assert_eq!(ctx.design.comps[outbuf].entries.len(), 2);
    Ok(())
}

#[test]
fn non_removable_survives() -> ForgeResult<()> {
    let mut design = Design::new();
    let (task, body) = add_task(&mut design, "main", false);
    let mut b = Builder::new(&mut design, body)?;
    let a = b.input("a", 8);
    let pinned = b.op(OpKind::Logic("p".into()), &[a.inner], 8);
    let dropped = b.op(OpKind::Logic("d".into()), &[a.inner], 8);
    b.seal();
    design.comps[pinned].non_removable = true;

    let ctx = prune(design)?;
    let design = &ctx.design;
    assert!(design.is_live(pinned));
    assert!(!design.is_live(dropped));
    assert!(design.is_live(design.tasks[task].call));
    assert!(matches!(
        design.comps[body].kind,
        CompKind::Block {
            procedure_body: true
        }
    ));
    assert!(design.is_live(body));
    Ok(())
}

#[test]
fn empty_call_is_bypassed() -> ForgeResult<()> {
    let mut design = Design::new();
    let (_, body) = add_task(&mut design, "main", false);
    let mut b = Builder::new(&mut design, body)?;
    let a = b.input("a", 8);
    let (call, _) = b.call();
    let passed = b.call_input(call, "x", a.inner);
    let out = b.call_output(call, "x", passed);
    let user = b.op(OpKind::Logic("use".into()), &[out], 8);
    let y = b.result(user);
    b.output("y", y);
    b.seal();

    let ctx = prune(design)?;
    let design = &ctx.design;
    assert!(!design.is_live(call));
    let port = design.data_ports(user).next().unwrap();
    assert_eq!(design.source_of(port), Some(a.inner));
    Ok(())
}
