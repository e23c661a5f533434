use super::{Connection, Role, arbiter};
use forge_ir::{CompIdx, Design, Error, ResourceIdx};
use forge_utils::{ForgeResult, GetName};
use linked_hash_map::LinkedHashMap;

/// Connections made inside one module.
#[derive(Default)]
pub(super) struct Frame {
    pub connections: Vec<Connection>,
}

impl Frame {
    /// Publish the frame's connections on `module` and return them as seen
    /// from the parent. Reads of a register share a single port and writes
    /// to a register are merged by a gateway; memory connections leave one
    /// by one so the referee can tell the accessors apart.
    pub fn export(
        self,
        design: &mut Design,
        module: CompIdx,
        little_endian: bool,
    ) -> ForgeResult<Vec<Connection>> {
        let mut groups: LinkedHashMap<(ResourceIdx, bool), Vec<Connection>> = LinkedHashMap::new();
        for connection in self.connections {
            groups
                .entry((connection.resource, connection.write))
                .or_insert_with(Vec::new)
                .push(connection);
        }

        let mut exported = Vec::new();
        for ((resource, write), mut group) in groups {
            if design.resources[resource].kind.is_memory() {
                for connection in group {
                    exported.push(export_one(design, module, connection)?);
                }
            } else if !write {
                exported.push(share_reads(design, module, resource, &group)?);
            } else {
                let merged = match group.len() {
                    1 => group.remove(0),
                    _ => arbiter::gateway(design, Some(module), resource, group, little_endian),
                };
                exported.push(export_one(design, module, merged)?);
            }
        }
        Ok(exported)
    }
}

fn port_name(design: &mut Design, resource: ResourceIdx, role: Role) -> forge_ir::Id {
    let prefix = format!("{}_{}", design.resources[resource].name(), role.name());
    design.gen_name(prefix)
}

/// Carry one connection across the boundary of `module`.
fn export_one(design: &mut Design, module: CompIdx, connection: Connection) -> ForgeResult<Connection> {
    let Some(exit) = design.comps[module].exits.first().copied() else {
        return Err(Error::invariant("module without an exit").with_node(design.comps[module].name));
    };
    let mut outbound = Vec::with_capacity(connection.outbound.len());
    for (role, bus) in connection.outbound {
        let name = port_name(design, connection.resource, role);
        let width = design.buses[bus].width;
        let outer = design.add_sideband_bus(exit, name, width, connection.resource);
        if let Some(port) = design.buses[outer].peer {
            design.connect(port, bus);
        }
        outbound.push((role, outer));
    }
    let mut inbound = Vec::with_capacity(connection.inbound.len());
    for (role, port) in connection.inbound {
        let name = port_name(design, connection.resource, role);
        let width = design.ports[port].width;
        let outer = design.add_sideband_port(module, name, width, connection.resource);
        if let Some(inner) = design.ports[outer].peer {
            design.connect(port, inner);
        }
        inbound.push((role, outer));
    }
    Ok(Connection {
        resource: connection.resource,
        write: connection.write,
        outbound,
        inbound,
    })
}

/// Feed every read of a register from one module port.
fn share_reads(
    design: &mut Design,
    module: CompIdx,
    resource: ResourceIdx,
    reads: &[Connection],
) -> ForgeResult<Connection> {
    let width = design.resources[resource].kind.width();
    let name = port_name(design, resource, Role::ReadData);
    let outer = design.add_sideband_port(module, name, width, resource);
    let inner = design.ports[outer].peer.ok_or_else(|| {
        Error::invariant("module port without an inner bus").with_node(design.comps[module].name)
    })?;
    for (_, port) in reads.iter().flat_map(|c| &c.inbound) {
        design.connect(*port, inner);
    }
    Ok(Connection {
        resource,
        write: false,
        outbound: Vec::new(),
        inbound: vec![(Role::ReadData, outer)],
    })
}

/// The same connection on the call site. Call ports and buses mirror those
/// of the procedure body by position.
pub(super) fn through_call(design: &mut Design, call: CompIdx, connection: Connection) -> Connection {
    let exit = design.comps[call].exits[0];
    let resource = connection.resource;
    let outbound = connection
        .outbound
        .into_iter()
        .map(|(role, bus)| {
            let (name, width) = (design.buses[bus].name, design.buses[bus].width);
            (role, design.add_sideband_bus(exit, name, width, resource))
        })
        .collect();
    let inbound = connection
        .inbound
        .into_iter()
        .map(|(role, port)| {
            let (name, width) = (design.ports[port].name, design.ports[port].width);
            (role, design.add_sideband_port(call, name, width, resource))
        })
        .collect();
    Connection {
        resource: connection.resource,
        write: connection.write,
        outbound,
        inbound,
    }
}
