/*!
# Import Synchronizer

Collects a compilation unit's imports, accepts the symbols a pass needs,
and on commit inserts only the missing ones at a fixed anchor.
*/

use std::collections::{BTreeSet, HashSet};

use crate::parser::{NodeExt, SourceFile, SyntaxKind, TokenIndex};

use super::EditBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    /// After the last import or the package declaration
    After(TokenIndex),
    /// Before the first type declaration
    Before(TokenIndex),
    None,
}

#[derive(Debug, Clone)]
pub struct ImportSynchronizer {
    /// Existing imports, wildcards stored as `pkg.*`
    existing: HashSet<String>,
    required: BTreeSet<String>,
    anchor: Anchor,
}

impl ImportSynchronizer {
    pub fn new() -> Self {
        Self {
            existing: HashSet::new(),
            required: BTreeSet::new(),
            anchor: Anchor::None,
        }
    }

    /// Collect imports and the insertion anchor of a compilation unit
    pub fn for_source(source: &SourceFile) -> Self {
        let mut sync = Self::new();
        let tokens = source.tokens();
        let mut last_import = None;
        let mut package = None;
        let mut first_type = None;

        for node in source.root().named_child_nodes() {
            match node.syntax() {
                SyntaxKind::ImportDeclaration => {
                    let wildcard = node.child_nodes().iter().any(|c| c.kind() == "asterisk");
                    let name = node
                        .named_child_nodes()
                        .into_iter()
                        .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"));
                    if let Some(name) = name {
                        sync.record_existing_import(&name.compact_text(source.text()), wildcard);
                    }
                    last_import = Some(tokens.last_token(&node));
                }
                SyntaxKind::PackageDeclaration => package = Some(tokens.last_token(&node)),
                kind if kind.is_type_declaration() && first_type.is_none() => {
                    first_type = Some(tokens.first_token(&node));
                }
                _ => {}
            }
        }

        sync.anchor = match (last_import.or(package), first_type) {
            (Some(after), _) => Anchor::After(after),
            (None, Some(before)) => Anchor::Before(before),
            (None, None) => Anchor::None,
        };
        sync
    }

    pub fn record_existing_import(&mut self, qualified_name: &str, is_wildcard: bool) {
        if is_wildcard {
            self.existing.insert(format!("{qualified_name}.*"));
        } else {
            self.existing.insert(qualified_name.to_string());
        }
    }

    /// Request an import, `pkg.Symbol` or `pkg.*`
    pub fn require(&mut self, qualified_name: impl Into<String>) {
        self.required.insert(qualified_name.into());
    }

    pub fn is_covered(&self, qualified_name: &str) -> bool {
        if self.existing.contains(qualified_name) {
            return true;
        }
        match qualified_name.rsplit_once('.') {
            Some((package, symbol)) if symbol != "*" => {
                self.existing.contains(&format!("{package}.*"))
            }
            _ => false,
        }
    }

    /// Imports commit would add, sorted
    pub fn missing(&self) -> Vec<&str> {
        self.required
            .iter()
            .filter(|name| !self.is_covered(name))
            .map(String::as_str)
            .collect()
    }

    /// Stage the missing imports; returns how many were added.
    pub fn commit(&self, edits: &mut EditBuffer<'_>) -> usize {
        let missing = self.missing();
        match self.anchor {
            Anchor::After(anchor) => {
                for name in missing.iter().rev() {
                    edits.insert_after(anchor, format!("\nimport {name};"));
                }
            }
            Anchor::Before(anchor) => {
                if !missing.is_empty() {
                    edits.insert_before(anchor, "\n");
                }
                for name in missing.iter().rev() {
                    edits.insert_before(anchor, format!("import {name};\n"));
                }
            }
            Anchor::None => {
                if !missing.is_empty() {
                    tracing::warn!(count = missing.len(), "no place to insert imports");
                }
                return 0;
            }
        }
        missing.len()
    }
}

impl Default for ImportSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::JavaParser;
    use pretty_assertions::assert_eq;

    fn sync_and_render(text: &str, required: &[&str]) -> String {
        let mut parser = JavaParser::new().unwrap();
        let source = parser.parse("A.java", text.to_string()).unwrap();
        let mut sync = ImportSynchronizer::for_source(&source);
        for name in required {
            sync.require(*name);
        }
        let mut edits = EditBuffer::new(source.tokens());
        sync.commit(&mut edits);
        edits.render()
    }

    #[test]
    fn wildcard_covers_single_symbol() {
        let text = "package a;\n\nimport pkg.*;\n\nclass A {}\n";
        assert_eq!(sync_and_render(text, &["pkg.Specific"]), text);
    }

    #[test]
    fn exact_import_covers_itself() {
        let text = "import java.util.List;\nclass A {}\n";
        assert_eq!(sync_and_render(text, &["java.util.List"]), text);
    }

    #[test]
    fn missing_imports_are_sorted_after_last_import() {
        let text = "package a;\n\nimport x.Y;\n\nclass A {}\n";
        let rendered = sync_and_render(text, &["java.util.*", "com.owlike.genson.Genson", "x.Y"]);
        assert_eq!(
            rendered,
            "package a;\n\nimport x.Y;\nimport com.owlike.genson.Genson;\nimport java.util.*;\n\nclass A {}\n"
        );
    }

    #[test]
    fn package_is_the_anchor_without_imports() {
        let text = "package a;\n\nclass A {}\n";
        let rendered = sync_and_render(text, &["b.C"]);
        assert_eq!(rendered, "package a;\nimport b.C;\n\nclass A {}\n");
    }

    #[test]
    fn bare_file_gets_imports_before_type() {
        let text = "class A {}\n";
        let rendered = sync_and_render(text, &["b.D", "b.C"]);
        assert_eq!(rendered, "import b.C;\nimport b.D;\n\nclass A {}\n");
    }

    #[test]
    fn wildcard_requirement_needs_wildcard() {
        let mut sync = ImportSynchronizer::new();
        sync.record_existing_import("java.util.List", false);
        assert!(!sync.is_covered("java.util.*"));
        sync.record_existing_import("java.util", true);
        assert!(sync.is_covered("java.util.*"));
        assert!(sync.is_covered("java.util.Map"));
        assert!(!sync.is_covered("java.util.stream.Collectors"));
    }
}
