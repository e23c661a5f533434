use forge_ir::{CompIdx, Design, Error};
use forge_utils::ForgeResult;
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

/// Order in which the children of a module can be scheduled: every producer
/// before its consumers.
///
/// Edges come from both the logical dependencies and the physical
/// connections between siblings. Edges leaving a feedback point are ignored,
/// since those are seeded before the module is traversed.
pub struct DataflowOrder;

impl DataflowOrder {
    pub fn children(design: &Design, module: CompIdx) -> ForgeResult<Vec<CompIdx>> {
        let children = design
            .children(module)
            .iter()
            .copied()
            .filter(|c| design.is_live(*c))
            .collect::<Vec<_>>();
        let feedback = design
            .module(module)?
            .feedback_points
            .iter()
            .copied()
            .collect::<HashSet<_>>();

        let mut graph: DiGraph<CompIdx, ()> = DiGraph::new();
        let nodes: HashMap<CompIdx, NodeIndex> = children
            .iter()
            .map(|c| (*c, graph.add_node(*c)))
            .collect();

        for child in &children {
            let comp = &design.comps[*child];
            let logical = comp
                .entries
                .iter()
                .flat_map(|e| design.entries[*e].iter_deps().map(|(_, d)| d.bus));
            let physical = design
                .all_ports(*child)
                .into_iter()
                .filter_map(|p| design.ports[p].bus);
            for bus in logical.chain(physical).collect::<Vec<_>>() {
                let producer = design.bus_owner(bus);
                if producer == *child || feedback.contains(&producer) {
                    continue;
                }
                if let Some(from) = nodes.get(&producer) {
                    graph.update_edge(*from, nodes[child], ());
                }
            }
        }

        let topo = algo::toposort(&graph, None).map_err(|cycle| {
            Error::invariant("combinational cycle between siblings")
                .with_node(design.comps[graph[cycle.node_id()]].name)
        })?;
        Ok(topo.into_iter().map(|n| graph[n]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_ir::{Builder, CompKind, Dependency, OpKind, add_task};

    #[test]
    fn producers_come_first() -> ForgeResult<()> {
        let mut design = Design::new();
        let (_, body) = add_task(&mut design, "main", true);
        let mut b = Builder::new(&mut design, body)?;
        let a = b.constant(1, 8);
        let x = b.logic("x", &[a], 8);
        let y = b.logic("y", &[x], 8);
        let children = b.design.children(body).to_vec();
        let order = DataflowOrder::children(&design, body)?;
        let pos = |c: CompIdx| order.iter().position(|x| *x == c).unwrap();
        assert!(pos(children[0]) < pos(design.bus_owner(x)));
        assert!(pos(design.bus_owner(x)) < pos(design.bus_owner(y)));
        Ok(())
    }

    #[test]
    fn cycles_are_rejected_unless_broken() -> ForgeResult<()> {
        let mut design = Design::new();
        let (_, body) = add_task(&mut design, "main", true);
        let mut b = Builder::new(&mut design, body)?;
        let seed = b.constant(0, 1);
        let p = b.op(OpKind::PassThrough, &[seed], 1);
        let p_out = b.result(p);
        let q = b.op(OpKind::Not, &[p_out], 1);
        let q_out = b.result(q);
        let p_in = b.design.port_by_name(p, "in0").unwrap();
        b.depend(p, p_in, Dependency::data(q_out));
        assert!(DataflowOrder::children(&design, body).is_err());

        design.module_mut(body)?.add_feedback_point(q);
        let order = DataflowOrder::children(&design, body)?;
        assert_eq!(order.len(), 3);
        assert!(matches!(design.comps[order[0]].kind, CompKind::Op(_)));
        Ok(())
    }
}
