/*!
# FileRewriter - File-based Pass Runner

Reads Java files, runs one pass over each, and writes back the files the
pass actually edited. A failure on one file is recorded in the summary
and never stops the rest of the batch.
*/

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::parser::{JavaParser, SourceFile};

use super::format::LineEnding;
use super::pass::{run_pass, Pass, PassStats};
use super::TransformResult;

/// Result of rewriting one file
#[derive(Debug)]
pub struct FileOutcome<T> {
    pub output: T,
    pub changed: bool,
}

/// File-based pass runner
///
/// Owns the parser, per-pass statistics, and the record of each file's
/// original line-ending style.
pub struct FileRewriter {
    parser: JavaParser,
    stats: IndexMap<String, PassStats>,
    source_extension: String,
    line_endings: HashMap<PathBuf, LineEnding>,
}

impl FileRewriter {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            parser: JavaParser::new()?,
            stats: IndexMap::new(),
            source_extension: "java".to_string(),
            line_endings: HashMap::new(),
        })
    }

    /// Set the file extension to process
    pub fn source_extension(mut self, extension: impl Into<String>) -> Self {
        self.source_extension = extension.into();
        self
    }

    /// Files directly inside `dir` with the source extension, sorted.
    /// A missing directory yields no files.
    pub fn list_sources(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "source directory absent");
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && self.should_process_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn should_process_file(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(&self.source_extension))
            .unwrap_or(false)
    }

    /// Read and parse a file, remembering its original line ending
    pub fn parse(&mut self, path: &Path) -> crate::Result<SourceFile> {
        let text = fs::read_to_string(path)?;
        self.line_endings
            .entry(path.to_path_buf())
            .or_insert_with(|| LineEnding::detect(&text));
        self.parser.parse(path, text)
    }

    /// Run `pass` over one file and write the result if it staged edits
    pub fn rewrite_file<P: Pass>(
        &mut self,
        path: &Path,
        pass: &mut P,
    ) -> TransformResult<FileOutcome<P::Output>> {
        let result = self.parse(path).map_err(anyhow::Error::from).and_then(|source| {
            let outcome = run_pass(pass, &source)?;
            if let Some(text) = &outcome.rewritten {
                fs::write(path, text)?;
            }
            Ok(outcome)
        });

        let stats = self
            .stats
            .entry(pass.name().to_string())
            .or_insert_with(|| PassStats::new(pass.name().to_string()));
        stats.files_visited += 1;
        match result {
            Ok(outcome) => {
                let changed = outcome.changed();
                if changed {
                    stats.files_changed += 1;
                    debug!(pass = pass.name(), file = %path.display(), "rewrote");
                }
                Ok(FileOutcome {
                    output: outcome.output,
                    changed,
                })
            }
            Err(e) => {
                stats.errors += 1;
                Err(e)
            }
        }
    }

    /// Run a fresh pass from `make_pass` over each file
    pub fn rewrite_all<P, F>(&mut self, paths: &[PathBuf], mut make_pass: F) -> RewriteSummary
    where
        P: Pass,
        F: FnMut(&Path) -> P,
    {
        let mut summary = RewriteSummary::new();
        for path in paths {
            let mut pass = make_pass(path);
            match self.rewrite_file(path, &mut pass) {
                Ok(outcome) => summary.record(path, outcome.changed),
                Err(e) => summary.record_error(path, &e),
            }
        }
        summary
    }

    /// Put each file back into the line-ending style it had when first read
    pub fn restore_line_endings(&self, paths: &[PathBuf]) -> RewriteSummary {
        let mut summary = RewriteSummary::new();
        for path in paths {
            let Some(ending) = self.line_endings.get(path) else {
                continue;
            };
            let restored = fs::read_to_string(path).and_then(|text| {
                let fixed = ending.apply(&text);
                let differs = fixed != text;
                if differs {
                    fs::write(path, fixed)?;
                }
                Ok(differs)
            });
            match restored {
                Ok(differs) => summary.record(path, differs),
                Err(e) => summary.record_error(path, &anyhow::Error::from(e)),
            }
        }
        summary
    }

    /// Get pass statistics
    pub fn stats(&self) -> &IndexMap<String, PassStats> {
        &self.stats
    }
}

/// Summary of rewriting a set of files
#[derive(Debug, Default, Clone)]
pub struct RewriteSummary {
    pub files_processed: u64,
    pub files_changed: u64,
    pub changed: Vec<PathBuf>,
    pub errors: Vec<String>,
}

impl RewriteSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: &Path, changed: bool) {
        self.files_processed += 1;
        if changed {
            self.files_changed += 1;
            if !self.changed.iter().any(|p| p == path) {
                self.changed.push(path.to_path_buf());
            }
        }
    }

    pub fn record_error(&mut self, path: &Path, error: &anyhow::Error) {
        self.files_processed += 1;
        warn!(file = %path.display(), "skipped: {error:#}");
        self.errors
            .push(format!("Error processing {}: {error:#}", path.display()));
    }

    pub fn merge(&mut self, other: RewriteSummary) {
        self.files_processed += other.files_processed;
        self.files_changed += other.files_changed;
        for path in other.changed {
            if !self.changed.contains(&path) {
                self.changed.push(path);
            }
        }
        self.errors.extend(other.errors);
    }

    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{NodeExt, SyntaxKind};
    use crate::rewrite::RewriteContext;
    use tree_sitter::Node;

    struct MarkClasses;

    impl Pass for MarkClasses {
        type Output = ();

        fn name(&self) -> &'static str {
            "mark-classes"
        }

        fn description(&self) -> &'static str {
            "Prefixes every class with a marker comment"
        }

        fn visit<'t>(&mut self, node: Node<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<()> {
            match node.syntax() {
                SyntaxKind::ClassDeclaration => {
                    cx.insert_before(node, "/* marked */\n");
                    Ok(())
                }
                _ => self.visit_children(node, cx),
            }
        }
    }

    #[test]
    fn rewrites_and_reports_per_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("A.java"), "class A {}\r\n")?;
        fs::write(dir.path().join("B.java"), "interface B {}\n")?;
        fs::write(dir.path().join("Broken.java"), "class {")?;
        fs::write(dir.path().join("notes.txt"), "class C {}")?;

        let mut rewriter = FileRewriter::new()?;
        let files = rewriter.list_sources(dir.path())?;
        assert_eq!(files.len(), 3);

        let summary = rewriter.rewrite_all(&files, |_| MarkClasses);
        assert_eq!(summary.files_processed, 3);
        assert_eq!(summary.changed, vec![dir.path().join("A.java")]);
        assert_eq!(summary.errors.len(), 1);

        let restored = rewriter.restore_line_endings(&summary.changed);
        assert_eq!(restored.files_changed, 1);
        let text = fs::read_to_string(dir.path().join("A.java"))?;
        assert_eq!(text, "/* marked */\r\nclass A {}\r\n");

        let stats = &rewriter.stats()["mark-classes"];
        assert_eq!(stats.files_visited, 3);
        assert_eq!(stats.files_changed, 1);
        assert_eq!(stats.errors, 1);
        Ok(())
    }
}
