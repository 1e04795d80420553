//! Order generation
//!
//! Builds the file dependency graph with petgraph, collapses strongly
//! connected components into circular groups and linearizes the resulting
//! condensation so that dependencies always come before their dependants.
//! Ties are broken by file id, which is the breadth-first discovery order.

use std::{cmp::Reverse, collections::BinaryHeap};

use anyhow::Result;
use log::{debug, info};
use petgraph::{algo::tarjan_scc, graph::DiGraph, graph::NodeIndex};
use rustc_hash::FxHashMap as HashMap;

use crate::{error::BundleError, file_registry::FileRegistry, types::FileId};

/// One strongly connected component of the dependency graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// Members in id order
    pub members: Vec<FileId>,
    pub circular: bool,
}

/// Edge `file -> dependency` for every registered dependency
pub fn build_graph(registry: &FileRegistry) -> (DiGraph<FileId, ()>, HashMap<FileId, NodeIndex>) {
    let mut graph: DiGraph<FileId, ()> = DiGraph::with_capacity(registry.len(), registry.len());
    let mut nodes: HashMap<FileId, NodeIndex> = HashMap::default();
    for id in registry.ids() {
        nodes.insert(id, graph.add_node(id));
    }
    for file in registry.files() {
        for dependency in &file.dependencies {
            graph.add_edge(nodes[&file.id], nodes[dependency], ());
        }
    }
    (graph, nodes)
}

/// Components in emission order: every component comes after all components
/// it depends on
pub fn ordered_components(registry: &FileRegistry) -> Result<Vec<Component>> {
    let (graph, _) = build_graph(registry);

    let mut components: Vec<Component> = tarjan_scc(&graph)
        .into_iter()
        .map(|scc| {
            let mut members: Vec<FileId> = scc.iter().map(|&node| graph[node]).collect();
            members.sort();
            let self_loop = scc.len() == 1 && graph.contains_edge(scc[0], scc[0]);
            Component {
                circular: members.len() > 1 || self_loop,
                members,
            }
        })
        .collect();
    components.sort_by_key(|component| component.members[0]);

    let mut component_of: HashMap<FileId, usize> = HashMap::default();
    for (index, component) in components.iter().enumerate() {
        for &member in &component.members {
            component_of.insert(member, index);
        }
    }

    // Condensation: an edge from a component to each component it depends on
    let mut condensed: DiGraph<usize, ()> = DiGraph::new();
    let condensed_nodes: Vec<NodeIndex> = (0..components.len())
        .map(|index| condensed.add_node(index))
        .collect();
    for file in registry.files() {
        let from = component_of[&file.id];
        for dependency in &file.dependencies {
            let to = component_of[dependency];
            if from != to {
                condensed.update_edge(condensed_nodes[from], condensed_nodes[to], ());
            }
        }
    }

    // Kahn's algorithm over reversed edges, smallest member id first
    let mut pending: Vec<usize> = condensed_nodes
        .iter()
        .map(|&node| condensed.neighbors(node).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<(FileId, usize)>> = pending
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count == 0)
        .map(|(index, _)| Reverse((components[index].members[0], index)))
        .collect();

    let mut order: Vec<usize> = Vec::with_capacity(components.len());
    while let Some(Reverse((_, index))) = ready.pop() {
        order.push(index);
        for dependant in condensed.neighbors_directed(
            condensed_nodes[index],
            petgraph::Direction::Incoming,
        ) {
            let dependant = condensed[dependant];
            pending[dependant] -= 1;
            if pending[dependant] == 0 {
                ready.push(Reverse((components[dependant].members[0], dependant)));
            }
        }
    }

    if order.len() != components.len() {
        return Err(BundleError::invariant(format!(
            "condensed dependency graph is still cyclic: {} of {} components ordered",
            order.len(),
            components.len()
        ))
        .into());
    }

    let mut slots: Vec<Option<Component>> = components.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect())
}

/// Assign `order_index`, `circular` and `connected_component` to every file
pub fn generate_order(registry: &mut FileRegistry) -> Result<()> {
    let components = ordered_components(registry)?;

    let mut next = 0;
    let mut groups = 0;
    for component in components {
        if component.circular {
            groups += 1;
            debug!("Circular group: {:?}", component.members);
        }
        for &member in &component.members {
            let file = registry.get_mut(member);
            file.order_index = next;
            file.circular = component.circular;
            file.connected_component = if component.circular {
                component.members.clone()
            } else {
                Vec::new()
            };
            next += 1;
        }
    }

    info!("Generated order for {} files ({groups} circular groups)", registry.len());
    Ok(())
}

/// Files sorted by ascending order index
pub fn files_in_order(registry: &FileRegistry) -> Vec<FileId> {
    let mut ids: Vec<FileId> = registry.ids().collect();
    ids.sort_by_key(|&id| registry.get(id).order_index);
    ids
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::{
        binder::bind,
        extractor::SourceKind,
        file_registry::{LoadedFile, Resolved},
        nodes::{ExtractedNodes, ImportNode},
        types::TextRange,
    };

    /// Registry over `edges[i]` = dependencies of file `i`, named `f<i>.js`
    pub(crate) fn registry_from_edges(edges: &[&[usize]]) -> FileRegistry {
        let path = |index: usize| PathBuf::from(format!("/p/f{index}.js"));
        let loaded = edges
            .iter()
            .enumerate()
            .map(|(index, targets)| {
                let imports = targets
                    .iter()
                    .map(|&target| ImportNode {
                        specifier: format!("./f{target}"),
                        call: TextRange::empty(0),
                        expression: TextRange::empty(0),
                        dot_path: Vec::new(),
                        declaration: None,
                        references: Vec::new(),
                        conditional: false,
                        in_function: false,
                        in_loop: false,
                        top_level_index: Some(0),
                        safe: false,
                        target: None,
                        binding: None,
                    })
                    .collect();
                let file = LoadedFile {
                    path: path(index),
                    source: String::new(),
                    kind: SourceKind::Script,
                    nodes: ExtractedNodes {
                        imports,
                        ..ExtractedNodes::default()
                    },
                    resolutions: targets.iter().map(|&t| Resolved::File(path(t))).collect(),
                };
                (path(index), file)
            })
            .collect();
        let mut registry = FileRegistry::from_discovery(Path::new("/p/f0.js"), loaded)
            .expect("test graph is connected from f0");
        bind(&mut registry);
        registry
    }

    fn order_table(registry: &FileRegistry) -> String {
        files_in_order(registry)
            .into_iter()
            .map(|id| {
                let file = registry.get(id);
                format!(
                    "{} {}{}",
                    file.order_index,
                    file.path.display(),
                    if file.circular { " (circular)" } else { "" }
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_dependencies_come_first() -> Result<()> {
        // f0 -> f1, f2; f1 -> f3; f2 -> f3
        let mut registry = registry_from_edges(&[&[1, 2], &[3], &[3], &[]]);
        generate_order(&mut registry)?;

        for file in registry.files() {
            for dependency in &file.dependencies {
                assert!(registry.get(*dependency).order_index < file.order_index);
            }
        }
        insta::assert_snapshot!(order_table(&registry), @r"
        0 /p/f3.js
        1 /p/f1.js
        2 /p/f2.js
        3 /p/f0.js
        ");
        Ok(())
    }

    #[test]
    fn test_cycle_members_share_component() -> Result<()> {
        // f0 -> f1 <-> f2, f2 -> f3
        let mut registry = registry_from_edges(&[&[1], &[2], &[1, 3], &[]]);
        generate_order(&mut registry)?;

        let f1 = registry.get(FileId::new(1));
        let f2 = registry.get(FileId::new(2));
        assert!(f1.circular && f2.circular);
        assert_eq!(f1.connected_component, f2.connected_component);
        assert_eq!(f1.connected_component, vec![FileId::new(1), FileId::new(2)]);
        assert_eq!(f2.order_index, f1.order_index + 1);
        assert!(!registry.get(FileId::new(0)).circular);
        assert!(registry.get(FileId::new(3)).order_index < f1.order_index);
        Ok(())
    }

    #[test]
    fn test_self_import_is_circular() -> Result<()> {
        let mut registry = registry_from_edges(&[&[1], &[1]]);
        generate_order(&mut registry)?;
        let file = registry.get(FileId::new(1));
        assert!(file.circular);
        assert_eq!(file.connected_component, vec![FileId::new(1)]);
        Ok(())
    }
}
