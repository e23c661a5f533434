use forge_ir::{Builder, Context, Design, Policy, ResourceKind, add_task};
use forge_opt::pass_manager::PassManager;
use forge_utils::ForgeResult;

fn example() -> ForgeResult<Design> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut design = Design::new();
    let acc = design.add_resource("acc", ResourceKind::Register { width: 8 });
    let (_, body) = add_task(&mut design, "main", true);
    let mut b = Builder::new(&mut design, body)?;
    let read = b.reg_read(acc);
    let value = b.result(read);
    let next = b.logic("inc", &[value], 8);
    let stored = b.reg(next);
    b.reg_write(acc, stored);
    b.logic("unused", &[value], 8);
    b.seal();
    Ok(design)
}

#[test]
fn all_runs_every_pass() -> ForgeResult<()> {
    let pm = PassManager::default_passes()?;
    let mut ctx = Context::new(example()?, Policy::default());
    pm.execute_plan(&mut ctx, &["all".to_string()], &[])?;
    let design = &ctx.design;
    assert!(design.accesses_counted);
    let acc = design.resources.keys().next().unwrap();
    assert!(design.resources[acc].physical.is_some());
    assert!(design.tasks.values().all(|t| t.kicker.is_some()));
    assert!(design.max_gate_depth > 0);
    Ok(())
}

#[test]
fn unknown_pass_is_rejected() -> ForgeResult<()> {
    let pm = PassManager::default_passes()?;
    let mut ctx = Context::new(example()?, Policy::default());
    let err = pm
        .execute_plan(&mut ctx, &["no-such-pass".to_string()], &[])
        .unwrap_err();
    assert!(err.to_string().contains("Unknown pass"));
    Ok(())
}

#[test]
fn excluded_passes_are_skipped() -> ForgeResult<()> {
    let pm = PassManager::default_passes()?;
    let mut ctx = Context::new(example()?, Policy::default());
    pm.execute_plan(
        &mut ctx,
        &["all".to_string()],
        &["dead-logic".to_string(), "gate-depth".to_string()],
    )?;
    assert_eq!(ctx.design.max_gate_depth, 0);
    Ok(())
}

#[test]
fn scheduler_needs_counted_accesses() -> ForgeResult<()> {
    let pm = PassManager::default_passes()?;
    let mut ctx = Context::new(example()?, Policy::default());
    assert!(
        pm.execute_plan(&mut ctx, &["scheduler".to_string()], &[])
            .is_err()
    );
    Ok(())
}

#[test]
fn help_lists_passes_and_options() -> ForgeResult<()> {
    let pm = PassManager::default_passes()?;
    let help = pm.complete_help();
    for name in [
        "access-counter",
        "timing-fence",
        "scheduler",
        "gate-depth",
        "global-connector",
        "dead-logic",
    ] {
        assert!(help.contains(name), "{name} missing from help");
    }
    let scheduler = pm.specific_help("scheduler").unwrap();
    assert!(scheduler.contains("balance"));
    let pruner = pm.specific_help("dead-logic").unwrap();
    assert!(pruner.contains("max-iterations"));
    assert!(pm.specific_help("nothing").is_none());
    Ok(())
}
