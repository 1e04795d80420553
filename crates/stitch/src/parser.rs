//! swc front-end: parses one CommonJS script and runs both collectors over it

use std::path::Path;

use anyhow::Result;
use rustc_hash::FxHashSet as HashSet;
use swc_common::{
    BytePos, FileName, GLOBALS, Globals, Mark, SourceMap, Spanned, sync::Lrc,
};
use swc_ecma_ast::EsVersion;
use swc_ecma_parser::{EsSyntax, Parser, StringInput, Syntax, lexer::Lexer};
use swc_ecma_transforms_base::resolver;
use swc_ecma_visit::{VisitMutWith, VisitWith};

use crate::{
    error::BundleError,
    nodes::ExtractedNodes,
    types::{SymbolId, TextRange},
    visitors::{ReferenceCollector, SiteCollector, SymbolOracle},
};

/// Sites of one file plus the import symbols that are written after declaration
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub nodes: ExtractedNodes,
    pub reassigned: HashSet<SymbolId>,
}

/// Remove a leading byte order mark so offsets match the stored text
pub fn strip_bom(source: &str) -> &str {
    source.strip_prefix('\u{feff}').unwrap_or(source)
}

pub fn parse_script(path: &Path, source: &str) -> Result<ParsedFile> {
    let source_map: Lrc<SourceMap> = Lrc::default();
    let file = source_map.new_source_file(
        Lrc::new(FileName::Real(path.to_path_buf())),
        source.to_owned(),
    );
    let locate = |pos: BytePos| {
        let loc = source_map.lookup_char_pos(pos);
        (loc.line, loc.col_display + 1)
    };

    GLOBALS.set(&Globals::default(), || -> Result<ParsedFile> {
        let lexer = Lexer::new(
            Syntax::Es(EsSyntax::default()),
            EsVersion::EsNext,
            StringInput::from(&*file),
            None,
        );
        let mut parser = Parser::new_from(lexer);
        let parsed = parser.parse_script();
        let recovered = parser.take_errors();
        let mut script = match parsed {
            Ok(script) => script,
            Err(err) => {
                let (line, column) = locate(err.span().lo);
                return Err(BundleError::parse(path, line, column, format!("{:?}", err.kind())).into());
            }
        };
        if let Some(err) = recovered.first() {
            let (line, column) = locate(err.span().lo);
            return Err(BundleError::parse(path, line, column, format!("{:?}", err.kind())).into());
        }

        let unresolved_mark = Mark::new();
        let top_level_mark = Mark::new();
        script.visit_mut_with(&mut resolver(unresolved_mark, top_level_mark, false));

        let mut oracle = SymbolOracle::new(source_map.clone(), file.start_pos, unresolved_mark);
        let mut nodes = SiteCollector::new(&mut oracle)
            .collect(&script)
            .map_err(|err| {
                let (line, column) = locate(err.span.lo);
                BundleError::parse(path, line, column, err.message)
            })?;

        let excluded: HashSet<TextRange> = nodes
            .imports
            .iter()
            .filter_map(|import| import.declaration.as_ref())
            .map(|declaration| declaration.binding_range)
            .collect();
        let mut collector = ReferenceCollector::new(&oracle, excluded);
        script.visit_with(&mut collector);
        let (references, reassigned) = collector.finish();

        for import in &mut nodes.imports {
            if let Some(declaration) = &import.declaration
                && let Some(found) = references.get(&declaration.symbol)
            {
                import.references = found.clone();
            }
        }

        Ok(ParsedFile { nodes, reassigned })
    })
}
