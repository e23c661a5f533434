//! Wires every resource access to the hardware that implements the
//! resource, and every task to whatever starts it.
//!
//! Accesses are gathered bottom-up in one frame per open module. Leaving a
//! module exports its connections as sideband ports and buses on the
//! module, merging register writes first; calls mirror what their procedure
//! exported. At design level, each resource gets its physical
//! implementation, with gateways and referees in front when it has more
//! than one accessor.
mod arbiter;
mod frame;
mod kicker;

use crate::traversal::{Named, Pass};
use forge_ir::{
    AccessKind, BusIdx, CompIdx, CompKind, Context, Design, Error, Policy, PortIdx, ResourceIdx,
    ResourceKind, TaskIdx,
};
use forge_utils::{ForgeResult, GetName};
use frame::Frame;
use linked_hash_map::LinkedHashMap;

/// The signals of a resource channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum Role {
    Enable,
    Address,
    WriteData,
    WriteEnable,
    ReadData,
    Done,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Enable => "en",
            Role::Address => "addr",
            Role::WriteData => "wdata",
            Role::WriteEnable => "we",
            Role::ReadData => "rdata",
            Role::Done => "done",
        }
    }
}

/// One access to a resource, as seen from the current scope.
#[derive(Debug, Clone)]
pub(super) struct Connection {
    pub resource: ResourceIdx,
    pub write: bool,
    /// Signals travelling toward the resource.
    pub outbound: Vec<(Role, BusIdx)>,
    /// Signals travelling back to the accessor.
    pub inbound: Vec<(Role, PortIdx)>,
}

impl Connection {
    pub fn width_of(&self, design: &Design, role: Role) -> Option<u32> {
        self.outbound
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, b)| design.buses[*b].width)
            .or_else(|| {
                self.inbound
                    .iter()
                    .find(|(r, _)| *r == role)
                    .map(|(_, p)| design.ports[*p].width)
            })
    }
}

#[derive(Default)]
pub struct GlobalConnector {
    frames: Vec<Frame>,
    little_endian: bool,
    /// Only wire accesses to this resource.
    only: Option<ResourceIdx>,
}

impl Named for GlobalConnector {
    fn name() -> &'static str {
        "global-connector"
    }

    fn description() -> &'static str {
        "connect resource accesses and tasks to design-level hardware"
    }
}

impl Pass for GlobalConnector {
    fn run(&mut self, ctx: &mut Context) -> ForgeResult<()> {
        let policy = ctx.policy;
        let design = &mut ctx.design;
        self.wire_resources(design, &policy)?;

        let mut shared = kicker::SharedKickers::default();
        for task in design.tasks.keys().collect::<Vec<_>>() {
            kicker::attach(design, &policy, task, &mut shared)?;
            kicker::publish_pins(design, &policy, task);
        }
        Ok(())
    }
}

/// Tear down everything built for `resource` and wire the accesses that are
/// left to fresh hardware.
pub fn reconnect(design: &mut Design, policy: &Policy, resource: ResourceIdx) -> ForgeResult<()> {
    design.detach_sideband(resource);
    let hardware = design
        .comps
        .iter()
        .filter(|(_, c)| {
            c.live
                && c.kind.resource() == Some(resource)
                && !matches!(c.kind, CompKind::Access { .. })
        })
        .map(|(idx, _)| idx)
        .collect::<Vec<_>>();
    for comp in hardware {
        design.remove_component(comp);
    }
    design.resources[resource].physical = None;
    log::debug!("reconnecting `{}'", design.resources[resource].name());
    GlobalConnector {
        only: Some(resource),
        ..Default::default()
    }
    .wire_resources(design, policy)
}

impl GlobalConnector {
    /// Wire every access to the hardware of its resource.
    fn wire_resources(&mut self, design: &mut Design, policy: &Policy) -> ForgeResult<()> {
        self.little_endian = policy.little_endian;
        let mut by_resource: LinkedHashMap<ResourceIdx, Vec<(TaskIdx, Connection)>> =
            LinkedHashMap::new();
        for task in design.tasks.keys().collect::<Vec<_>>() {
            let call = design.tasks[task].call;
            self.frames.push(Frame::default());
            self.visit(design, call)?;
            let top = self.frames.pop().unwrap_or_default();
            for connection in top.connections {
                by_resource
                    .entry(connection.resource)
                    .or_insert_with(Vec::new)
                    .push((task, connection));
            }
        }

        for (resource, connections) in by_resource {
            if design.resources[resource].kind.is_memory() {
                arbiter::connect_memory(design, policy, resource, connections)?;
            } else {
                arbiter::connect_register(design, policy, resource, connections)?;
            }
        }
        Ok(())
    }

    fn frame(&mut self) -> ForgeResult<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| Error::invariant("no open frame"))
    }

    /// Record every access below `comp` in the current frame.
    fn visit(&mut self, design: &mut Design, comp: CompIdx) -> ForgeResult<()> {
        if !design.is_live(comp) {
            return Ok(());
        }
        match design.comps[comp].kind.clone() {
            CompKind::PinAccess => Err(Error::unexpected_node(
                Self::name(),
                design.comps[comp].name,
                "deprecated pin access",
            )),
            CompKind::Access { resource, kind } if self.only.is_none_or(|r| r == resource) => {
                let connection = attach(design, comp, resource, kind);
                self.frame()?.connections.push(connection);
                Ok(())
            }
            CompKind::Call { procedure } => {
                self.frames.push(Frame::default());
                self.visit(design, procedure)?;
                let inner = self.frames.pop().unwrap_or_default();
                for connection in inner.connections {
                    let outer = frame::through_call(design, comp, connection);
                    self.frame()?.connections.push(outer);
                }
                Ok(())
            }
            kind if kind.is_module() => {
                self.frames.push(Frame::default());
                for child in design.children(comp).to_vec() {
                    self.visit(design, child)?;
                }
                let inner = self.frames.pop().unwrap_or_default();
                let exported = inner.export(design, comp, self.little_endian)?;
                self.frame()?.connections.extend(exported);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Give an access its sideband signals.
fn attach(design: &mut Design, comp: CompIdx, resource: ResourceIdx, kind: AccessKind) -> Connection {
    let res = design.resources[resource].kind;
    let exit = design.comps[comp].exits[0];
    let data_width = design
        .port_by_name(comp, "data")
        .map(|p| design.ports[p].width)
        .unwrap_or_else(|| res.width());
    let address_width = match res {
        ResourceKind::MemoryPort { address_width, .. } => address_width,
        ResourceKind::Register { .. } => 0,
    };
    let (outbound, inbound) = match kind {
        AccessKind::RegisterRead => (vec![], vec![(Role::ReadData, res.width())]),
        AccessKind::RegisterWrite => (
            vec![(Role::WriteEnable, 1), (Role::WriteData, data_width)],
            vec![],
        ),
        AccessKind::MemoryRead => (
            vec![(Role::Enable, 1), (Role::Address, address_width)],
            vec![(Role::ReadData, res.width()), (Role::Done, 1)],
        ),
        AccessKind::MemoryWrite => (
            vec![
                (Role::Enable, 1),
                (Role::Address, address_width),
                (Role::WriteData, data_width),
                (Role::WriteEnable, 1),
            ],
            vec![(Role::Done, 1)],
        ),
    };
    let outbound = outbound
        .into_iter()
        .map(|(role, width)| (role, design.add_sideband_bus(exit, role.name(), width, resource)))
        .collect();
    let inbound = inbound
        .into_iter()
        .map(|(role, width)| {
            let name = format!("{}_in", role.name());
            (role, design.add_sideband_port(comp, name, width, resource))
        })
        .collect();
    Connection {
        resource,
        write: kind.is_write(),
        outbound,
        inbound,
    }
}
