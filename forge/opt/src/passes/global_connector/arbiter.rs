use super::{Connection, Role};
use forge_ir::{
    BusIdx, BusKind, CompIdx, CompKind, Design, Error, Policy, PortKind, ReadClear, ResourceIdx,
    ResourceKind, TaskIdx,
};
use forge_utils::{ForgeResult, GetName};
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;

/// Hardware created here is only removed together with its resource.
fn synth(design: &mut Design, kind: CompKind, owner: Option<CompIdx>) -> CompIdx {
    let comp = design.add_component(kind, owner);
    design.comps[comp].non_removable = true;
    if owner.is_none() {
        design.globals.push(comp);
    }
    comp
}

/// Merge several channels into one through a gateway.
pub(super) fn gateway(
    design: &mut Design,
    owner: Option<CompIdx>,
    resource: ResourceIdx,
    channels: Vec<Connection>,
    little_endian: bool,
) -> Connection {
    let width = design.resources[resource].kind.width();
    let lane_offsets = channels
        .iter()
        .map(|c| {
            let lane = c
                .width_of(design, Role::WriteData)
                .or_else(|| c.width_of(design, Role::ReadData))
                .unwrap_or(width);
            if little_endian { 0 } else { width.saturating_sub(lane) }
        })
        .collect();
    let comp = synth(
        design,
        CompKind::Gateway {
            resource,
            lane_offsets,
        },
        owner,
    );
    log::debug!(
        "`{}': {} accessors of `{}'",
        design.comps[comp].name,
        channels.len(),
        design.resources[resource].name()
    );
    merge_into(design, comp, resource, channels)
}

/// Put a referee in front of a memory port shared by several channels.
fn referee(
    design: &mut Design,
    policy: &Policy,
    resource: ResourceIdx,
    channels: Vec<Connection>,
) -> Connection {
    let read_clear = match design.resources[resource].kind {
        ResourceKind::MemoryPort {
            combinational_read: true,
            ..
        } => ReadClear::AfterMux,
        _ => ReadClear::BeforeMux,
    };
    let kind = CompKind::Referee {
        resource,
        slots: channels.len() as u32,
        simple: policy.simple_arbitration,
        read_clear,
    };
    let comp = synth(design, kind, None);
    log::debug!(
        "`{}' arbitrates {} channels of `{}'",
        design.comps[comp].name,
        channels.len(),
        design.resources[resource].name()
    );
    merge_into(design, comp, resource, channels)
}

/// Connect each channel to its own slot of `comp` and return the single
/// channel `comp` presents toward the resource.
fn merge_into(
    design: &mut Design,
    comp: CompIdx,
    resource: ResourceIdx,
    channels: Vec<Connection>,
) -> Connection {
    let exit = design.comps[comp].exits[0];
    let width = design.resources[resource].kind.width();
    let mut outbound_roles: LinkedHashMap<Role, u32> = LinkedHashMap::new();
    let mut inbound_roles: LinkedHashMap<Role, u32> = LinkedHashMap::new();
    for (i, channel) in channels.iter().enumerate() {
        for (role, bus) in &channel.outbound {
            let w = design.buses[*bus].width;
            let port = design.add_port(comp, PortKind::Sideband, format!("{}{i}", role.name()), w);
            design.connect(port, *bus);
            let merged = outbound_roles.entry(*role).or_insert(0);
            *merged = (*merged).max(w);
        }
        for (role, port) in &channel.inbound {
            let w = design.ports[*port].width;
            let bus = design.add_bus(exit, BusKind::Sideband, format!("{}{i}", role.name()), w);
            design.connect(*port, bus);
            let merged = inbound_roles.entry(*role).or_insert(0);
            *merged = (*merged).max(w);
        }
    }
    let lane_width = |role: Role, w: u32| match role {
        Role::WriteData | Role::ReadData => width,
        _ => w,
    };
    let outbound = outbound_roles
        .into_iter()
        .map(|(role, w)| {
            let bus = design.add_bus(exit, BusKind::Sideband, role.name(), lane_width(role, w));
            (role, bus)
        })
        .collect();
    let inbound = inbound_roles
        .into_iter()
        .map(|(role, w)| {
            let port = design.add_port(comp, PortKind::Sideband, role.name(), lane_width(role, w));
            (role, port)
        })
        .collect();
    Connection {
        resource,
        write: channels.iter().any(|c| c.write),
        outbound,
        inbound,
    }
}

/// Output of a physical implementation playing `role`.
fn physical_bus(design: &Design, physical: CompIdx, role: Role) -> Option<BusIdx> {
    match role {
        Role::Done => design.done_bus(physical),
        _ => design
            .output_buses(physical)
            .find(|b| design.buses[*b].name == role.name()),
    }
}

fn wire_physical(design: &mut Design, physical: CompIdx, channel: &Connection) -> ForgeResult<()> {
    for (role, bus) in &channel.outbound {
        let port = design.port_by_name(physical, role.name()).ok_or_else(|| {
            Error::invariant(format!("no `{}' input", role.name()))
                .with_node(design.comps[physical].name)
        })?;
        design.connect(port, *bus);
    }
    for (role, port) in &channel.inbound {
        let bus = physical_bus(design, physical, *role).ok_or_else(|| {
            Error::invariant(format!("no `{}' output", role.name()))
                .with_node(design.comps[physical].name)
        })?;
        design.connect(*port, bus);
    }
    Ok(())
}

/// Build the physical register, funnelling several writers through a
/// gateway. Every reader sees the register output.
pub(super) fn connect_register(
    design: &mut Design,
    policy: &Policy,
    resource: ResourceIdx,
    connections: Vec<(TaskIdx, Connection)>,
) -> ForgeResult<()> {
    let width = design.resources[resource].kind.width();
    let physical = synth(design, CompKind::RegisterPhysical { resource }, None);
    design.add_port(physical, PortKind::Data, Role::WriteEnable.name(), 1);
    design.add_port(physical, PortKind::Data, Role::WriteData.name(), width);
    let exit = design.comps[physical].exits[0];
    design.add_bus(exit, BusKind::Data, Role::ReadData.name(), width);

    let (mut writes, reads): (Vec<_>, Vec<_>) = connections
        .into_iter()
        .map(|(_, c)| c)
        .partition(|c| c.write);
    match writes.len() {
        0 => {}
        1 => wire_physical(design, physical, &writes.remove(0))?,
        _ => {
            let merged = gateway(design, None, resource, writes, policy.little_endian);
            wire_physical(design, physical, &merged)?;
        }
    }
    for read in &reads {
        wire_physical(design, physical, read)?;
    }
    design.resources[resource].physical = Some(physical);
    Ok(())
}

/// Build the physical memory port: one channel per task, and a referee when
/// more than one channel remains.
pub(super) fn connect_memory(
    design: &mut Design,
    policy: &Policy,
    resource: ResourceIdx,
    connections: Vec<(TaskIdx, Connection)>,
) -> ForgeResult<()> {
    let ResourceKind::MemoryPort {
        width,
        address_width,
        ..
    } = design.resources[resource].kind
    else {
        return Err(Error::invariant(format!(
            "`{}' is not a memory port",
            design.resources[resource].name()
        )));
    };
    let per_task = connections.into_iter().into_group_map_by(|(task, _)| *task);
    let mut tasks = per_task.keys().copied().collect_vec();
    tasks.sort();
    let mut channels = Vec::with_capacity(tasks.len());
    for task in tasks {
        let mut group = per_task
            .get(&task)
            .map(|g| g.iter().map(|(_, c)| c.clone()).collect_vec())
            .unwrap_or_default();
        let channel = match group.len() {
            1 => group.remove(0),
            _ => gateway(design, None, resource, group, policy.little_endian),
        };
        channels.push(channel);
    }
    let channel = match channels.len() {
        0 => return Ok(()),
        1 => channels.remove(0),
        _ => referee(design, policy, resource, channels),
    };

    let physical = synth(design, CompKind::MemoryPhysical { resource }, None);
    for (role, w) in [
        (Role::Enable, 1),
        (Role::Address, address_width),
        (Role::WriteData, width),
        (Role::WriteEnable, 1),
    ] {
        design.add_port(physical, PortKind::Data, role.name(), w);
    }
    let exit = design.comps[physical].exits[0];
    design.add_bus(exit, BusKind::Data, Role::ReadData.name(), width);
    wire_physical(design, physical, &channel)?;
    design.resources[resource].physical = Some(physical);
    Ok(())
}
