use forge_ir::{CompIdx, CompKind, Design, ResourceIdx};
use std::collections::HashMap;

/// A chain of accessors of one memory resource inside a block: from the
/// first accessor in sequence order to the last.
///
/// While a process is running, the block must not start again, otherwise a
/// later activation could reach the resource before an earlier one has
/// finished with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    pub resource: ResourceIdx,
    /// Direct children of the block touching the resource, in sequence
    /// order. Always at least two.
    pub accessors: Vec<CompIdx>,
}

impl Process {
    pub fn start(&self) -> CompIdx {
        self.accessors[0]
    }

    pub fn end(&self) -> CompIdx {
        self.accessors[self.accessors.len() - 1]
    }
}

/// Processes of each block, computed on first request.
#[derive(Debug, Default)]
pub struct ProcessCache {
    cache: HashMap<CompIdx, Vec<Process>>,
}

impl ProcessCache {
    pub fn get(&mut self, design: &Design, block: CompIdx) -> &[Process] {
        self.cache
            .entry(block)
            .or_insert_with(|| Self::compute(design, block))
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    fn compute(design: &Design, block: CompIdx) -> Vec<Process> {
        if !matches!(design.comps[block].kind, CompKind::Block { .. }) {
            return Vec::new();
        }
        design
            .resources
            .iter()
            .filter(|(_, r)| r.live && r.kind.is_memory())
            .filter_map(|(resource, _)| {
                let accessors = design
                    .children(block)
                    .iter()
                    .copied()
                    .filter(|c| design.is_live(*c))
                    .filter(|c| touches(design, *c, resource))
                    .collect::<Vec<_>>();
                (accessors.len() > 1).then_some(Process {
                    resource,
                    accessors,
                })
            })
            .collect()
    }
}

/// Whether `comp` is, or contains, an access to `resource`.
fn touches(design: &Design, comp: CompIdx, resource: ResourceIdx) -> bool {
    design.contains(comp, |c| {
        matches!(c.kind, CompKind::Access { resource: r, .. } if r == resource)
    })
}
