/*!
# Rewrite Framework

Token-anchored rewriting of Java compilation units.

## Architecture

- `EditBuffer`: staged insert/replace/delete edits over one token stream
- `Pass`: tree-walking visitor with a default "visit children" rule
- `ImportSynchronizer`: adds the imports a pass asked for, once
- `FileRewriter`: runs one pass over one file or a directory of files
- `passes`: the concrete Java-to-chaincode rewrites

Every pass starts from freshly parsed text. A pass stages edits into the
`RewriteContext` it is handed; the file rewriter renders and writes them
back before the next pass parses the file again.
*/

pub mod edit_buffer;
pub mod file_rewriter;
pub mod format;
pub mod imports;
pub mod pass;
pub mod passes;

use tree_sitter::Node;

use crate::parser::{NodeExt, SourceFile, TokenIndex};

// Re-export main types
pub use edit_buffer::{EditBuffer, EditError};
pub use file_rewriter::{FileOutcome, FileRewriter, RewriteSummary};
pub use imports::ImportSynchronizer;
pub use pass::{run_pass, Pass, PassOutcome, PassStats};

// Common result type for passes
pub type TransformResult<T> = anyhow::Result<T>;

/// Per-file state shared by the edits of one pass
pub struct RewriteContext<'s> {
    source: &'s SourceFile,
    pub edits: EditBuffer<'s>,
    pub imports: ImportSynchronizer,
}

impl<'s> RewriteContext<'s> {
    pub fn new(source: &'s SourceFile) -> Self {
        Self {
            source,
            edits: EditBuffer::new(source.tokens()),
            imports: ImportSynchronizer::for_source(source),
        }
    }

    pub fn source(&self) -> &'s SourceFile {
        self.source
    }

    /// Source text of the whole file
    pub fn text(&self) -> &'s str {
        self.source.text()
    }

    pub fn node_text(&self, node: Node<'_>) -> &'s str {
        node.text(self.source.text())
    }

    pub fn first_token(&self, node: Node<'_>) -> TokenIndex {
        self.source.tokens().first_token(&node)
    }

    pub fn last_token(&self, node: Node<'_>) -> TokenIndex {
        self.source.tokens().last_token(&node)
    }

    /// Leading whitespace of the line a node starts on
    pub fn indent_of(&self, node: Node<'_>) -> &'s str {
        self.source.tokens().line_indent(self.first_token(node))
    }

    pub fn insert_before(&mut self, node: Node<'_>, text: impl Into<String>) {
        let at = self.first_token(node);
        self.edits.insert_before(at, text);
    }

    pub fn insert_after(&mut self, node: Node<'_>, text: impl Into<String>) {
        let at = self.last_token(node);
        self.edits.insert_after(at, text);
    }

    pub fn replace(&mut self, node: Node<'_>, text: impl Into<String>) -> TransformResult<()> {
        let (from, to) = (self.first_token(node), self.last_token(node));
        self.edits.replace(from, to, text)?;
        Ok(())
    }

    /// Replace everything from the start of `first` to the end of `last`
    pub fn replace_span(
        &mut self,
        first: Node<'_>,
        last: Node<'_>,
        text: impl Into<String>,
    ) -> TransformResult<()> {
        let (from, to) = (self.first_token(first), self.last_token(last));
        self.edits.replace(from, to, text)?;
        Ok(())
    }

    /// Replace everything from the start of `first` up to where `next` begins
    pub fn replace_until(
        &mut self,
        first: Node<'_>,
        next: Node<'_>,
        text: impl Into<String>,
    ) -> TransformResult<()> {
        let from = self.first_token(first);
        let to = TokenIndex(self.first_token(next).0.saturating_sub(1).max(from.0));
        self.edits.replace(from, to, text)?;
        Ok(())
    }

    pub fn delete(&mut self, node: Node<'_>) -> TransformResult<()> {
        let (from, to) = (self.first_token(node), self.last_token(node));
        self.edits.delete(from, to)?;
        Ok(())
    }

    /// Delete a node along with the whitespace and comments that precede it
    pub fn delete_with_leading_trivia(&mut self, node: Node<'_>) -> TransformResult<()> {
        let first = self.first_token(node);
        let from = self
            .source
            .tokens()
            .previous_token(first)
            .map_or(first, TokenIndex::next);
        self.edits.delete(from, self.last_token(node))?;
        Ok(())
    }

    /// Insert right after the `{` of a class body or block
    pub fn insert_after_open_brace(&mut self, body: Node<'_>, text: impl Into<String>) {
        match body.child_nodes().into_iter().next().filter(|b| b.kind() == "{") {
            Some(brace) => self.insert_after(brace, text),
            None => self.insert_before(body, text),
        }
    }

    /// Insert right before the `}` of a class body or block
    pub fn insert_before_close_brace(&mut self, body: Node<'_>, text: impl Into<String>) {
        let close = body.child_nodes().into_iter().last().filter(|b| b.kind() == "}");
        match close {
            Some(brace) => self.insert_before(brace, text),
            None => self.insert_after(body, text),
        }
    }

    pub fn require_import(&mut self, qualified_name: impl Into<String>) {
        self.imports.require(qualified_name);
    }

    /// Commit imports and render; `None` when nothing was staged.
    pub fn finish(mut self) -> Option<String> {
        self.imports.commit(&mut self.edits);
        self.edits.has_pending_edits().then(|| self.edits.render())
    }
}
