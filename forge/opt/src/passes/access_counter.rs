use crate::traversal::{Named, Pass};
use forge_ir::{CompKind, Context};
use forge_utils::{ForgeResult, GetName};

/// Records, for every resource, the tasks that access it. A resource is
/// arbitrated once more than one task touches it.
#[derive(Default)]
pub struct AccessCounter;

impl Named for AccessCounter {
    fn name() -> &'static str {
        "access-counter"
    }

    fn description() -> &'static str {
        "find the tasks touching each shared resource"
    }
}

impl Pass for AccessCounter {
    fn run(&mut self, ctx: &mut Context) -> ForgeResult<()> {
        let design = &mut ctx.design;
        for resource in design.resources.values_mut() {
            resource.tasks.clear();
            resource.arbitrated = false;
        }

        let tasks = design.tasks.iter().map(|(t, task)| (t, task.call)).collect::<Vec<_>>();
        for (task, call) in tasks {
            for comp in design.descendants(call) {
                if !design.is_live(comp) {
                    continue;
                }
                if let CompKind::Access { resource, .. } = design.comps[comp].kind {
                    let touched = &mut design.resources[resource].tasks;
                    if !touched.contains(&task) {
                        touched.push(task);
                    }
                }
            }
        }

        for resource in design.resources.values_mut() {
            resource.arbitrated = resource.tasks.len() > 1;
            if resource.arbitrated {
                log::debug!(
                    "`{}' is shared by {} tasks",
                    resource.name(),
                    resource.tasks.len()
                );
            }
        }
        design.accesses_counted = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_ir::{Builder, Design, Policy, ResourceKind, add_task};

    #[test]
    fn shared_resources_are_arbitrated() -> ForgeResult<()> {
        let mut design = Design::new();
        let shared = design.add_resource("shared", ResourceKind::Register { width: 8 });
        let private = design.add_resource("private", ResourceKind::Register { width: 8 });
        for name in ["a", "b"] {
            let (_, body) = add_task(&mut design, name, true);
            let mut b = Builder::new(&mut design, body)?;
            b.reg_read(shared);
            b.reg_read(shared);
        }
        let (_, body) = add_task(&mut design, "c", true);
        let mut b = Builder::new(&mut design, body)?;
        let inner = b.block();
        b.within(inner)?.reg_read(private);

        let mut ctx = Context::new(design, Policy::default());
        AccessCounter.run(&mut ctx)?;
        let design = &ctx.design;
        assert!(design.accesses_counted);
        assert_eq!(design.resources[shared].tasks.len(), 2);
        assert!(design.resources[shared].arbitrated);
        assert_eq!(design.resources[private].tasks.len(), 1);
        assert!(!design.resources[private].arbitrated);
        Ok(())
    }
}
