//! File registry for one bundling run
//!
//! The registry is an arena of [`SourceFile`] records indexed by [`FileId`].
//! Every cross-file relation (dependencies, dependants, structure) is an id
//! into this arena. Each derived field is written by exactly one pipeline
//! stage and only read afterwards.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
};

use anyhow::Result;
use indexmap::IndexSet;
use log::debug;
use rustc_hash::FxHashMap as HashMap;

use crate::{
    binder::Binding,
    error::BundleError,
    extractor::SourceKind,
    nodes::{ExportNode, ExtractedNodes, ImportNode, ImportTarget},
    rewriter::RewriteData,
    types::FileId,
};

/// Where one import of a loaded file points, before ids exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    File(PathBuf),
    Global(usize),
}

/// A file as produced by the asynchronous loader
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub source: String,
    pub kind: SourceKind,
    pub nodes: ExtractedNodes,
    /// One entry per import, in import order
    pub resolutions: Vec<Resolved>,
}

/// One physical input file and everything the pipeline derives from it
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub id: FileId,
    /// Absolute, normalized path
    pub path: PathBuf,
    pub source: String,
    pub kind: SourceKind,
    pub imports: Vec<ImportNode>,
    pub exports: Vec<ExportNode>,
    /// Generated declarations and children go here so directives stay first
    pub prologue_end: usize,

    // Binder
    pub dependencies: IndexSet<FileId>,
    pub dependants: IndexSet<FileId>,

    // Order generator
    pub order_index: usize,
    pub circular: bool,
    /// Members of this file's circular group, empty when not circular
    pub connected_component: Vec<FileId>,

    // Structure generator
    pub structure_parent: Option<FileId>,
    pub structure_children: Vec<FileId>,
    pub structure_all_children: Vec<FileId>,
    pub structure_dependencies: IndexSet<FileId>,
    /// Nesting depth: the parent's level plus one, 0 for the root. The parent
    /// is the common ancestor of the later dependants.
    pub structure_level: usize,

    // Rewriter
    pub rewrite: Option<RewriteData>,
}

impl SourceFile {
    fn new(id: FileId, loaded: LoadedFile) -> Self {
        Self {
            id,
            path: loaded.path,
            source: loaded.source,
            kind: loaded.kind,
            imports: loaded.nodes.imports,
            exports: loaded.nodes.exports,
            prologue_end: loaded.nodes.prologue_end,
            dependencies: IndexSet::new(),
            dependants: IndexSet::new(),
            order_index: 0,
            circular: false,
            connected_component: Vec::new(),
            structure_parent: None,
            structure_children: Vec::new(),
            structure_all_children: Vec::new(),
            structure_dependencies: IndexSet::new(),
            structure_level: 0,
            rewrite: None,
        }
    }
}

/// Arena of every file reachable from the start file
#[derive(Debug, Clone)]
pub struct FileRegistry {
    files: Vec<SourceFile>,
    path_to_id: HashMap<PathBuf, FileId>,
    /// Written by the binder
    pub bindings: Vec<Binding>,
}

impl FileRegistry {
    /// Build the arena from loaded files, numbering them breadth-first from
    /// `start` over imports in source order. Completion order of the loads
    /// therefore never leaks into ids or generated names.
    pub fn from_discovery(start: &Path, mut loaded: HashMap<PathBuf, LoadedFile>) -> Result<Self> {
        let mut path_to_id: HashMap<PathBuf, FileId> = HashMap::default();
        let mut queue: VecDeque<PathBuf> = VecDeque::new();
        let mut files: Vec<SourceFile> = Vec::with_capacity(loaded.len());

        path_to_id.insert(start.to_path_buf(), FileId::new(0));
        queue.push_back(start.to_path_buf());

        while let Some(path) = queue.pop_front() {
            let id = path_to_id[&path];
            let loaded_file = loaded.remove(&path).ok_or_else(|| {
                BundleError::invariant(format!("{} was discovered but never loaded", path.display()))
            })?;
            let resolutions = loaded_file.resolutions.clone();
            let mut file = SourceFile::new(id, loaded_file);

            if resolutions.len() != file.imports.len() {
                return Err(BundleError::invariant(format!(
                    "{} has {} imports but {} resolutions",
                    file.path.display(),
                    file.imports.len(),
                    resolutions.len()
                ))
                .into());
            }

            for (import, resolved) in file.imports.iter_mut().zip(resolutions) {
                import.target = Some(match resolved {
                    Resolved::Global(index) => ImportTarget::Global(index),
                    Resolved::File(target) => {
                        let next = FileId::new(path_to_id.len() as u32);
                        let target_id = *path_to_id.entry(target.clone()).or_insert_with(|| {
                            queue.push_back(target);
                            next
                        });
                        ImportTarget::File(target_id)
                    }
                });
            }
            files.push(file);
        }

        debug!("Registered {} files", files.len());
        if !loaded.is_empty() {
            debug!("{} loaded files are unreachable from the start file", loaded.len());
        }

        Ok(Self {
            files,
            path_to_id,
            bindings: Vec::new(),
        })
    }

    /// The file bundling started from
    pub fn start(&self) -> FileId {
        FileId::new(0)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, id: FileId) -> &SourceFile {
        &self.files[id.index()]
    }

    pub fn get_mut(&mut self, id: FileId) -> &mut SourceFile {
        &mut self.files[id.index()]
    }

    pub fn find(&self, path: &Path) -> Option<FileId> {
        self.path_to_id.get(path).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = FileId> + '_ {
        self.files.iter().map(|file| file.id)
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// Number of import sites across the project that resolve to `target`
    pub fn import_site_count(&self, target: FileId) -> usize {
        self.files
            .iter()
            .flat_map(|file| &file.imports)
            .filter(|import| import.target_file() == Some(target))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TextRange;

    fn import(specifier: &str) -> ImportNode {
        ImportNode {
            specifier: specifier.to_owned(),
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
        }
    }

    fn loaded(path: &str, targets: &[&str]) -> (PathBuf, LoadedFile) {
        let file = LoadedFile {
            path: PathBuf::from(path),
            source: String::new(),
            kind: SourceKind::Script,
            nodes: ExtractedNodes {
                imports: targets.iter().map(|target| import(target)).collect(),
                ..ExtractedNodes::default()
            },
            resolutions: targets
                .iter()
                .map(|target| Resolved::File(PathBuf::from(target)))
                .collect(),
        };
        (PathBuf::from(path), file)
    }

    #[test]
    fn test_breadth_first_numbering() -> Result<()> {
        let loaded: HashMap<PathBuf, LoadedFile> = [
            loaded("/p/d.js", &[]),
            loaded("/p/c.js", &["/p/d.js"]),
            loaded("/p/a.js", &["/p/b.js", "/p/c.js"]),
            loaded("/p/b.js", &["/p/d.js"]),
        ]
        .into_iter()
        .collect();

        let registry = FileRegistry::from_discovery(Path::new("/p/a.js"), loaded)?;
        let paths: Vec<&Path> = registry.files().iter().map(|f| f.path.as_path()).collect();
        assert_eq!(
            paths,
            vec![
                Path::new("/p/a.js"),
                Path::new("/p/b.js"),
                Path::new("/p/c.js"),
                Path::new("/p/d.js")
            ]
        );
        assert_eq!(registry.find(Path::new("/p/d.js")), Some(FileId::new(3)));
        assert_eq!(registry.import_site_count(FileId::new(3)), 2);
        assert_eq!(
            registry.get(FileId::new(2)).imports[0].target,
            Some(ImportTarget::File(FileId::new(3)))
        );
        Ok(())
    }

    #[test]
    fn test_missing_file_is_an_invariant_violation() {
        let loaded: HashMap<PathBuf, LoadedFile> =
            [loaded("/p/a.js", &["/p/b.js"])].into_iter().collect();
        let err = FileRegistry::from_discovery(Path::new("/p/a.js"), loaded)
            .expect_err("b.js was never loaded");
        assert!(matches!(
            err.downcast_ref::<BundleError>(),
            Some(BundleError::InternalInvariant { .. })
        ));
    }
}
