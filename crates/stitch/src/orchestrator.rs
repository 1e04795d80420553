//! Compilation driver
//!
//! Loads the project asynchronously, then runs the synchronous pipeline:
//! bind, order, structure, rewrite, bundle, package and write. Loading is a
//! fan-in over a set of in-flight file loads; the later stages start once
//! that set drains.

use std::{
    path::{Path, PathBuf},
    rc::Rc,
};

use anyhow::{Context, Result};
use futures::{
    StreamExt,
    future::join_all,
    stream::FuturesUnordered,
};
use log::{debug, info, warn};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use crate::{
    binder::bind,
    bundler::Bundler,
    config::{Config, OutputFormat},
    dependency_graph::generate_order,
    extractor::{SourceKind, extract},
    file_registry::{FileRegistry, LoadedFile, Resolved},
    io::Io,
    names::NameAllocator,
    package::{Packages, emit_packages},
    parser::strip_bom,
    resolver::{ModuleResolver, normalize_path},
    rewriter::rewrite_all,
    source_map::{Flattened, SourceNode, flatten},
    structure::generate_structure,
};

/// Progress notifications of one run, fired at most once each and in this order
#[derive(Debug)]
pub enum CompileEvent<'a> {
    /// Every reachable file is loaded, parsed and resolved
    Read { files: usize },
    GeneratedOrder,
    GeneratedStructure,
    Rewritten,
    Bundled(&'a Packages),
    /// All configured output files were written
    Written { files: usize },
    Error(&'a anyhow::Error),
}

/// Everything a successful run produced
#[derive(Debug)]
pub struct Compilation {
    pub registry: FileRegistry,
    pub root: Rc<SourceNode>,
    pub packages: Packages,
    /// Output files written, bundles and their maps
    pub written: Vec<PathBuf>,
}

impl Compilation {
    /// Text and source map of one format; `file` names the output in the map
    pub fn flatten(&self, format: OutputFormat, file: &str) -> Flattened {
        flatten(self.packages.get(format), &self.registry, file)
    }
}

pub async fn compile<I: Io>(start: &Path, config: &Config, io: &I) -> Result<Compilation> {
    compile_with_events(start, config, io, |_| {}).await
}

pub async fn compile_with_events<I, F>(
    start: &Path,
    config: &Config,
    io: &I,
    mut on_event: F,
) -> Result<Compilation>
where
    I: Io,
    F: FnMut(CompileEvent<'_>),
{
    match run(start, config, io, &mut on_event).await {
        Ok(compilation) => Ok(compilation),
        Err(err) => {
            on_event(CompileEvent::Error(&err));
            Err(err)
        }
    }
}

async fn run<I, F>(start: &Path, config: &Config, io: &I, on_event: &mut F) -> Result<Compilation>
where
    I: Io,
    F: FnMut(CompileEvent<'_>),
{
    let start = normalize_path(
        &std::path::absolute(start)
            .with_context(|| format!("Failed to resolve start file {}", start.display()))?,
    );
    info!("Compiling {}", start.display());

    let loaded = load_project(&start, config, io).await?;
    let mut registry = FileRegistry::from_discovery(&start, loaded)?;
    bind(&mut registry);
    on_event(CompileEvent::Read {
        files: registry.len(),
    });

    generate_order(&mut registry)?;
    on_event(CompileEvent::GeneratedOrder);

    generate_structure(&mut registry)?;
    on_event(CompileEvent::GeneratedStructure);

    let names = NameAllocator::new(config.var_prefix.clone());
    rewrite_all(&mut registry, &names)?;
    on_event(CompileEvent::Rewritten);

    let root = Bundler::new(&registry, &names, config.global_modules.len()).bundle_root()?;
    let packages = emit_packages(&root, config);
    info!("Bundled {} files", registry.len());
    on_event(CompileEvent::Bundled(&packages));

    let written = write_outputs(&registry, &packages, config, io).await?;
    if !written.is_empty() {
        on_event(CompileEvent::Written {
            files: written.len(),
        });
    }

    Ok(Compilation {
        registry,
        root,
        packages,
        written,
    })
}

/// Read, parse and resolve one file
async fn load_file<I: Io>(io: &I, resolver: &ModuleResolver<'_, I>, path: PathBuf) -> Result<LoadedFile> {
    let raw = io.read_file(&path).await?;
    let source = strip_bom(&raw).to_owned();
    let kind = SourceKind::of(&path);
    let nodes = extract(&path, kind, &source)?;

    let resolutions = join_all(
        nodes
            .imports
            .iter()
            .map(|import| resolver.resolve(&path, &import.specifier)),
    )
    .await
    .into_iter()
    .collect::<Result<Vec<Resolved>>>()?;

    debug!("Loaded {} ({} imports)", path.display(), resolutions.len());
    Ok(LoadedFile {
        path,
        source,
        kind,
        nodes,
        resolutions,
    })
}

/// Load every file reachable from `start`. After the first failure no new
/// loads are scheduled; loads already in flight drain and are discarded.
async fn load_project<I: Io>(
    start: &Path,
    config: &Config,
    io: &I,
) -> Result<HashMap<PathBuf, LoadedFile>> {
    let resolver = ModuleResolver::new(io, config);
    let mut pending = FuturesUnordered::new();
    let mut scheduled: HashSet<PathBuf> = HashSet::default();
    let mut loaded: HashMap<PathBuf, LoadedFile> = HashMap::default();
    let mut failure: Option<anyhow::Error> = None;

    scheduled.insert(start.to_path_buf());
    pending.push(load_file(io, &resolver, start.to_path_buf()));

    while let Some(result) = pending.next().await {
        match result {
            Ok(file) if failure.is_none() => {
                for resolved in &file.resolutions {
                    if let Resolved::File(target) = resolved
                        && scheduled.insert(target.clone())
                    {
                        pending.push(load_file(io, &resolver, target.clone()));
                    }
                }
                loaded.insert(file.path.clone(), file);
            }
            Ok(file) => debug!("Discarding {} after an earlier failure", file.path.display()),
            Err(err) => match failure {
                None => failure = Some(err),
                Some(_) => debug!("Discarding later failure: {err:#}"),
            },
        }
    }

    if let Some(err) = failure {
        return Err(err);
    }
    info!("Read {} files", loaded.len());
    Ok(loaded)
}

/// Write each format that has an output file, plus its `.map`
async fn write_outputs<I: Io>(
    registry: &FileRegistry,
    packages: &Packages,
    config: &Config,
    io: &I,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for format in OutputFormat::ALL {
        let Some(path) = config.output_file_name.get(format) else {
            continue;
        };
        let Some(file_name) = path.file_name().map(|name| name.to_string_lossy().into_owned()) else {
            warn!("Output path {} for {format} has no file name, skipping", path.display());
            continue;
        };

        let Flattened { mut code, map } = flatten(packages.get(format), registry, &file_name);
        code.push('\n');
        if config.source_map_comment {
            code.push_str(&format!("//# sourceMappingURL={file_name}.map\n"));
        }

        let mut map_path = path.clone().into_os_string();
        map_path.push(".map");
        let map_path = PathBuf::from(map_path);

        io.write_file(path, &code).await?;
        io.write_file(&map_path, &map).await?;
        info!("Wrote {format} bundle to {}", path.display());
        written.push(path.clone());
        written.push(map_path);
    }
    Ok(written)
}
