//! Links imports to the exports of their target files
//!
//! Exports of one file that define the same name (or the whole module) form a
//! [`Binding`]. Every import resolving to a project file is attached to the
//! binding for its first accessed property, and the file-level
//! dependency/dependant edges are registered on the way.

use indexmap::IndexMap;
use log::debug;
use rustc_hash::FxHashMap as HashMap;

use crate::{
    file_registry::FileRegistry,
    types::{BindingId, FileId},
};

/// All export sites of one file defining one name, and the imports reading it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub id: BindingId,
    pub file: FileId,
    /// `None` is the module object itself
    pub name: Option<String>,
    /// Indices into the file's exports
    pub exports: Vec<usize>,
    /// `(importing file, import index)`
    pub imports: Vec<(FileId, usize)>,
    /// Every export of the binding is safe
    pub safe: bool,
}

pub fn bind(registry: &mut FileRegistry) {
    let mut bindings: Vec<Binding> = Vec::new();
    let mut by_name: Vec<HashMap<Option<String>, BindingId>> = Vec::with_capacity(registry.len());

    let ids: Vec<FileId> = registry.ids().collect();
    for &id in &ids {
        let file = registry.get_mut(id);
        let mut groups: IndexMap<Option<String>, Vec<usize>> = IndexMap::new();
        for (index, export) in file.exports.iter().enumerate() {
            groups
                .entry(export.exported_name().map(str::to_owned))
                .or_default()
                .push(index);
        }

        let mut names = HashMap::default();
        for (name, exports) in groups {
            let binding = BindingId::new(bindings.len() as u32);
            let safe = exports.iter().all(|&index| file.exports[index].safe);
            for &index in &exports {
                file.exports[index].binding = Some(binding);
            }
            names.insert(name.clone(), binding);
            bindings.push(Binding {
                id: binding,
                file: id,
                name,
                exports,
                imports: Vec::new(),
                safe,
            });
        }
        by_name.push(names);
    }

    for &id in &ids {
        let mut edges: Vec<FileId> = Vec::new();
        let file = registry.get_mut(id);
        for (index, import) in file.imports.iter_mut().enumerate() {
            let Some(target) = import.target_file() else {
                continue;
            };
            edges.push(target);

            let key = import.dot_path.first().cloned();
            let Some(&binding) = by_name[target.index()].get(&key) else {
                continue;
            };
            import.binding = Some(binding);
            for reference in &mut import.references {
                reference.binding = Some(binding);
            }
            bindings[binding.index()].imports.push((id, index));
        }

        for target in edges {
            registry.get_mut(id).dependencies.insert(target);
            registry.get_mut(target).dependants.insert(id);
        }
    }

    debug!(
        "Bound {} bindings across {} files",
        bindings.len(),
        registry.len()
    );
    registry.bindings = bindings;
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use anyhow::Result;
    use rustc_hash::FxHashMap as HashMap;

    use super::*;
    use crate::{
        extractor::{SourceKind, extract},
        file_registry::{LoadedFile, Resolved},
    };

    fn load(path: &str, source: &str, targets: &[&str]) -> Result<(PathBuf, LoadedFile)> {
        let path = PathBuf::from(path);
        let nodes = extract(&path, SourceKind::Script, source)?;
        let file = LoadedFile {
            path: path.clone(),
            source: source.to_owned(),
            kind: SourceKind::Script,
            nodes,
            resolutions: targets
                .iter()
                .map(|target| Resolved::File(PathBuf::from(target)))
                .collect(),
        };
        Ok((path, file))
    }

    #[test]
    fn test_imports_bind_to_named_exports() -> Result<()> {
        let loaded: HashMap<PathBuf, LoadedFile> = [
            load(
                "/p/a.js",
                "var b = require('./b');\nvar f = require('./b').f;\nb.g();\n",
                &["/p/b.js", "/p/b.js"],
            )?,
            load("/p/b.js", "exports.f = 1;\nexports.g = 2;\n", &[])?,
        ]
        .into_iter()
        .collect();
        let mut registry = FileRegistry::from_discovery(Path::new("/p/a.js"), loaded)?;
        bind(&mut registry);

        let a = registry.get(FileId::new(0));
        let b = registry.get(FileId::new(1));
        assert_eq!(a.dependencies.iter().copied().collect::<Vec<_>>(), vec![b.id]);
        assert_eq!(b.dependants.iter().copied().collect::<Vec<_>>(), vec![a.id]);

        // `require('./b')` reads the module object, which `b` never assigns whole
        assert_eq!(a.imports[0].binding, None);
        let f = a.imports[1].binding.expect("f is exported");
        let binding = &registry.bindings[f.index()];
        assert_eq!(binding.name.as_deref(), Some("f"));
        assert_eq!(binding.imports, vec![(a.id, 1)]);
        assert!(binding.safe);
        assert_eq!(registry.bindings.len(), 2);
        Ok(())
    }

    #[test]
    fn test_full_export_binding_reaches_references() -> Result<()> {
        let loaded: HashMap<PathBuf, LoadedFile> = [
            load("/p/a.js", "var b = require('./b');\nb();\n", &["/p/b.js"])?,
            load("/p/b.js", "module.exports = function() {};\n", &[])?,
        ]
        .into_iter()
        .collect();
        let mut registry = FileRegistry::from_discovery(Path::new("/p/a.js"), loaded)?;
        bind(&mut registry);

        let import = &registry.get(FileId::new(0)).imports[0];
        let binding = import.binding.expect("full export binding");
        assert!(registry.bindings[binding.index()].name.is_none());
        assert!(import.references.iter().all(|r| r.binding == Some(binding)));
        Ok(())
    }
}
