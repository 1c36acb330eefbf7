// Parser module - Java compilation units via tree-sitter
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use tree_sitter::{Node, Tree};

use crate::{Result, RewriteError};

pub mod syntax;
pub mod tokens;

pub use syntax::{NodeExt, SyntaxKind};
pub use tokens::{TokenIndex, TokenStream};

/// Java parser backed by tree-sitter-java
pub struct JavaParser {
    parser: tree_sitter::Parser,
}

impl JavaParser {
    pub fn new() -> anyhow::Result<Self> {
        let mut parser = tree_sitter::Parser::new();
        let language: tree_sitter::Language = tree_sitter_java::LANGUAGE.into();
        parser
            .set_language(&language)
            .map_err(|e| anyhow!("Failed to set Java language: {}", e))?;

        Ok(Self { parser })
    }

    /// Parse source text into a fresh [`SourceFile`]
    pub fn parse(&mut self, path: impl Into<PathBuf>, text: String) -> Result<SourceFile> {
        let path = path.into();
        let tree = self
            .parser
            .parse(&text, None)
            .ok_or_else(|| RewriteError::Syntax {
                path: path.clone(),
                line: 0,
            })?;

        if let Some(bad) = first_error(tree.root_node()) {
            return Err(RewriteError::Syntax {
                path,
                line: bad.start_position().row + 1,
            });
        }

        let tokens = TokenStream::from_tree(text, &tree);
        Ok(SourceFile { path, tree, tokens })
    }

    /// Read and parse a file
    pub fn parse_file(&mut self, path: &Path) -> Result<SourceFile> {
        let text = std::fs::read_to_string(path)?;
        self.parse(path, text)
    }
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if !node.has_error() {
        return None;
    }
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    node.child_nodes().into_iter().find_map(first_error).or(Some(node))
}

/// One parsed compilation unit
///
/// Owns its text, tree and token stream for the duration of a single
/// pass; the next pass parses the rewritten text again.
pub struct SourceFile {
    path: PathBuf,
    tree: Tree,
    tokens: TokenStream,
}

impl SourceFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without extension, the expected top-level type name
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn text(&self) -> &str {
        self.tokens.text()
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn tokens(&self) -> &TokenStream {
        &self.tokens
    }

    pub fn node_text(&self, node: Node<'_>) -> &str {
        node.text(self.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_broken_source() {
        let mut parser = JavaParser::new().unwrap();
        let err = parser
            .parse("Broken.java", "class Broken {\n  void f( {\n}\n".to_string())
            .err()
            .unwrap();
        assert!(matches!(err, RewriteError::Syntax { .. }));
    }

    #[test]
    fn parses_clean_source() {
        let mut parser = JavaParser::new().unwrap();
        let source = parser
            .parse("src/Store.java", "public class Store {}\n".to_string())
            .unwrap();
        assert_eq!(source.stem(), "Store");
        assert_eq!(source.root().syntax(), SyntaxKind::Program);
    }
}
