//! Structure generation
//!
//! Decides which file's closure textually contains each file's definition.
//! A file is nested under the nearest common structural ancestor of the
//! dependants that are emitted after it. The start file is the root of the
//! resulting tree.

use anyhow::Result;
use indexmap::IndexSet;
use log::{debug, info};
use rustc_hash::FxHashSet as HashSet;

use crate::{dependency_graph::files_in_order, file_registry::FileRegistry, types::FileId};

/// `id` followed by its structural ancestors, nearest first
fn ancestor_chain(registry: &FileRegistry, id: FileId) -> Vec<FileId> {
    let mut chain = vec![id];
    let mut current = id;
    while let Some(parent) = registry.get(current).structure_parent {
        chain.push(parent);
        current = parent;
    }
    chain
}

fn common_ancestor(registry: &FileRegistry, dependants: &[FileId]) -> Option<FileId> {
    let (first, rest) = dependants.split_first()?;
    let others: Vec<HashSet<FileId>> = rest
        .iter()
        .map(|&id| ancestor_chain(registry, id).into_iter().collect())
        .collect();
    ancestor_chain(registry, *first)
        .into_iter()
        .find(|candidate| others.iter().all(|chain| chain.contains(candidate)))
}

/// Fill in every `structure_*` field. Requires the order to be generated.
pub fn generate_structure(registry: &mut FileRegistry) -> Result<()> {
    let root = registry.start();

    for id in files_in_order(registry).into_iter().rev() {
        if id == root {
            continue;
        }
        let file = registry.get(id);
        let later: Vec<FileId> = file
            .dependants
            .iter()
            .copied()
            .filter(|&dependant| registry.get(dependant).order_index > file.order_index)
            .collect();
        let parent = common_ancestor(registry, &later).unwrap_or(root);
        let level = registry.get(parent).structure_level + 1;

        debug!(
            "{} nests in {} at level {level}",
            registry.get(id).path.display(),
            registry.get(parent).path.display()
        );
        let file = registry.get_mut(id);
        file.structure_parent = Some(parent);
        file.structure_level = level;
        registry.get_mut(parent).structure_children.insert(0, id);
    }

    collect_subtrees(registry, root);
    info!("Generated structure for {} files", registry.len());
    Ok(())
}

/// Post-order pass computing `structure_all_children` and
/// `structure_dependencies`, children before parents
fn collect_subtrees(registry: &mut FileRegistry, root: FileId) {
    let mut stack: Vec<(FileId, bool)> = vec![(root, false)];
    while let Some((id, children_done)) = stack.pop() {
        if !children_done {
            stack.push((id, true));
            for &child in registry.get(id).structure_children.iter().rev() {
                stack.push((child, false));
            }
            continue;
        }

        let file = registry.get(id);
        let mut all_children: Vec<FileId> = file.structure_children.clone();
        let mut dependencies: IndexSet<FileId> = file.dependencies.clone();
        for &child in &file.structure_children {
            let child = registry.get(child);
            all_children.extend(child.structure_all_children.iter().copied());
            dependencies.extend(child.structure_dependencies.iter().copied());
        }
        let nested: HashSet<FileId> = all_children.iter().copied().collect();
        dependencies.retain(|dependency| *dependency != id && !nested.contains(dependency));

        let file = registry.get_mut(id);
        file.structure_all_children = all_children;
        file.structure_dependencies = dependencies;
    }
}
