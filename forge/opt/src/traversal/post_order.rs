use forge_ir::{CompIdx, CompKind, Design, Error};
use forge_utils::ForgeResult;
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// The order in which modules are traversed.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Discovery order: a parent before its children, siblings in sequence
    /// order.
    #[default]
    No,
    /// Every container before the modules it contains.
    Pre,
    /// Every module before its container.
    Post,
}

/// Traversal order over the modules and calls below a set of roots.
///
/// ## Post-order
/// If module `B` contains module `A`, or `B` is a call whose procedure body
/// is `A`, then `A` is guaranteed to be visited before `B`. This is done by
/// finding a topological order over a graph where `A` has a directed edge to
/// `B`.
///
/// ## Pre-order
/// Reverse of post-order.
pub struct ModuleTraversal {
    order: Vec<CompIdx>,
}

impl ModuleTraversal {
    pub fn new(design: &Design, roots: &[CompIdx], order: Order) -> ForgeResult<Self> {
        let mut graph: DiGraph<CompIdx, ()> = DiGraph::new();
        let mut nodes: HashMap<CompIdx, NodeIndex> = HashMap::new();
        let mut discovered = Vec::new();

        let mut stack = roots.iter().rev().map(|r| (*r, None)).collect::<Vec<_>>();
        while let Some((comp, parent)) = stack.pop() {
            if !design.is_live(comp) || nodes.contains_key(&comp) {
                continue;
            }
            let node = graph.add_node(comp);
            nodes.insert(comp, node);
            discovered.push(comp);
            if let Some(parent) = parent {
                graph.add_edge(node, parent, ());
            }
            let inner: Vec<CompIdx> = match &design.comps[comp].kind {
                CompKind::Call { procedure } => vec![*procedure],
                _ => design
                    .children(comp)
                    .iter()
                    .copied()
                    .filter(|c| {
                        let c = &design.comps[*c];
                        c.is_module() || matches!(c.kind, CompKind::Call { .. })
                    })
                    .collect(),
            };
            stack.extend(inner.into_iter().rev().map(|c| (c, Some(node))));
        }

        if order == Order::No {
            return Ok(Self { order: discovered });
        }

        let topo = algo::toposort(&graph, None).map_err(|cycle| {
            Error::invariant("module hierarchy is cyclic")
                .with_node(design.comps[graph[cycle.node_id()]].name)
        })?;
        let mut topo = topo.into_iter().map(|n| graph[n]).collect::<Vec<_>>();

        // Reverse the order if a pre-order traversal is requested
        if order == Order::Pre {
            topo.reverse();
        }
        Ok(Self { order: topo })
    }

    pub fn iter(&self) -> impl Iterator<Item = CompIdx> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl IntoIterator for ModuleTraversal {
    type Item = CompIdx;
    type IntoIter = std::vec::IntoIter<CompIdx>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.into_iter()
    }
}
