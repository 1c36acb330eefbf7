/*!
# Entity Annotator

Marks entity classes for the Fabric contract API. The class gains
`@DataType()`, its private data fields gain `@Property()` and lose an
upper-case first letter, and date-typed accessors get a Genson converter.

Fields after a `/* all references */` comment belong to the hand-written
reference section and keep their declaration untouched.
*/

use std::collections::{HashMap, HashSet};

use tracing::debug;
use tree_sitter::Node;

use crate::analysis::{declared_names, is_entity_class};
use crate::parser::syntax::{FieldShape, MethodShape, TypeShape};
use crate::parser::{NodeExt, SyntaxKind};
use crate::rewrite::format::{lower_first, starts_uppercase};
use crate::rewrite::{Pass, RewriteContext, TransformResult};
use crate::RewriteError;

use super::imports;

const REFERENCE_SECTION_MARKER: &str = "all references";

pub struct EntityAnnotator {
    synthetic_key: String,
    date_types: Vec<String>,
    /// Old name -> lowered name
    renamed: HashMap<String, String>,
}

impl EntityAnnotator {
    pub fn new(synthetic_key: impl Into<String>, date_types: Vec<String>) -> Self {
        Self {
            synthetic_key: synthetic_key.into(),
            date_types,
            renamed: HashMap::new(),
        }
    }

    fn annotate_class<'t>(
        &mut self,
        class: &TypeShape<'t>,
        cx: &mut RewriteContext<'t>,
    ) -> TransformResult<()> {
        if !class.modifiers.has_annotation("DataType") {
            cx.insert_before(class.node, "@DataType()\n");
            cx.require_import(imports::FABRIC_ANNOTATIONS);
        }

        let mut in_reference_section = false;
        for member in class.members() {
            if !in_reference_section && self.opens_reference_section(member, cx) {
                in_reference_section = true;
            }
            if member.syntax() == SyntaxKind::FieldDeclaration && !in_reference_section {
                self.annotate_field(member, cx)?;
            }
        }

        for member in class.members() {
            match member.syntax() {
                SyntaxKind::MethodDeclaration => {
                    if let Some(method) = MethodShape::of(member, cx.text()) {
                        self.mark_date_converter(&method, cx);
                    }
                    self.rename_references(member, cx)?;
                }
                SyntaxKind::ConstructorDeclaration => self.rename_references(member, cx)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn opens_reference_section(&self, member: Node<'_>, cx: &RewriteContext<'_>) -> bool {
        let tokens = cx.source().tokens();
        tokens
            .comments_before(tokens.first_token(&member))
            .iter()
            .any(|c| c.to_ascii_lowercase().contains(REFERENCE_SECTION_MARKER))
    }

    fn annotate_field<'t>(&mut self, node: Node<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<()> {
        let Some(field) = FieldShape::of(node, cx.text()) else {
            return Ok(());
        };
        if !field.is_private() || field.is_static() {
            return Ok(());
        }
        let [declarator] = field.declarators.as_slice() else {
            return Err(RewriteError::UnsupportedShape {
                path: cx.source().path().to_path_buf(),
                detail: format!(
                    "\"{}\" declares several fields; each field needs its own declaration",
                    field.node.compact_text(cx.text())
                ),
            }
            .into());
        };
        let Some(name_node) = declarator.field("name") else {
            return Ok(());
        };
        let name = cx.node_text(name_node);
        if name == self.synthetic_key {
            return Ok(());
        }

        let already_marked = ["Property", "JsonProperty", "JsonIgnore"]
            .iter()
            .any(|a| field.modifiers.has_annotation(a));
        if !already_marked {
            let indent = cx.indent_of(node);
            cx.insert_before(node, format!("@Property()\n{indent}"));
            cx.require_import(imports::FABRIC_ANNOTATIONS);
        }

        if starts_uppercase(name) {
            let lowered = lower_first(name);
            debug!(field = name, to = %lowered, "lowering field name");
            cx.replace(name_node, lowered.clone())?;
            self.renamed.insert(name.to_string(), lowered);
        }
        Ok(())
    }

    fn mark_date_converter<'t>(&self, method: &MethodShape<'t>, cx: &mut RewriteContext<'t>) {
        if method.modifiers.has_annotation("JsonConverter") {
            return;
        }
        let date_type = if method.is_conventional_getter() {
            Some(method.return_type.as_str())
        } else if method.is_conventional_setter() {
            method.params.first().map(|p| p.ty.as_str())
        } else {
            None
        };
        let Some(date_type) = date_type.filter(|t| self.date_types.iter().any(|d| d == t)) else {
            return;
        };
        let indent = cx.indent_of(method.node);
        cx.insert_before(
            method.node,
            format!("@JsonConverter({date_type}Converter.class)\n{indent}"),
        );
        cx.require_import(imports::GENSON_ANNOTATIONS);
        cx.require_import(imports::CONVERTERS);
    }

    /// Rename uses of lowered fields inside one method or constructor
    fn rename_references<'t>(&self, member: Node<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<()> {
        if self.renamed.is_empty() {
            return Ok(());
        }
        let Some(body) = member.field("body") else {
            return Ok(());
        };
        let shadowed: HashSet<String> = declared_names(member, cx.text());

        let mut stack = vec![body];
        while let Some(node) = stack.pop() {
            stack.extend(node.named_child_nodes());
            if node.syntax() != SyntaxKind::Identifier {
                continue;
            }
            let Some(lowered) = self.renamed.get(cx.node_text(node)) else {
                continue;
            };
            let Some(parent) = node.parent() else {
                continue;
            };
            let qualified_by_this = match parent.syntax() {
                SyntaxKind::FieldAccess if node.is_parent_field("field") => {
                    match parent.field("object") {
                        Some(object) if object.syntax() == SyntaxKind::This => true,
                        // another object's member
                        _ => continue,
                    }
                }
                SyntaxKind::MethodInvocation if node.is_parent_field("name") => continue,
                SyntaxKind::VariableDeclarator | SyntaxKind::FormalParameter
                    if node.is_parent_field("name") =>
                {
                    continue
                }
                _ => false,
            };
            if !qualified_by_this && shadowed.contains(cx.node_text(node)) {
                continue;
            }
            cx.replace(node, lowered.clone())?;
        }
        Ok(())
    }
}

impl Pass for EntityAnnotator {
    type Output = ();

    fn name(&self) -> &'static str {
        "entity-annotator"
    }

    fn description(&self) -> &'static str {
        "Adds Fabric data annotations to entity classes and lowers field names"
    }

    fn visit<'t>(&mut self, node: Node<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<()> {
        match node.syntax() {
            SyntaxKind::Program => self.visit_children(node, cx),
            SyntaxKind::ClassDeclaration => {
                match TypeShape::of(node, cx.text()) {
                    Some(class) if is_entity_class(&class) => self.annotate_class(&class, cx),
                    _ => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::JavaParser;
    use crate::rewrite::run_pass;
    use pretty_assertions::assert_eq;

    fn annotate(text: &str) -> anyhow::Result<Option<String>> {
        let source = JavaParser::new()?.parse("Item.java", text.to_string())?;
        let mut pass = EntityAnnotator::new("guid", vec!["LocalDate".to_string()]);
        Ok(run_pass(&mut pass, &source)?.rewritten)
    }

    #[test]
    fn annotates_and_lowers_fields() -> anyhow::Result<()> {
        let text = "package entities;\n\
\n\
public class Item implements Serializable {\n\
\tprivate int Barcode;\n\
\tprivate LocalDate Expires;\n\
\t\n\
\t/* all references */\n\
\tprivate Store BelongedStore;\n\
\n\
\tpublic int getBarcode() {\n\
\t\treturn Barcode;\n\
\t}\n\
\n\
\tpublic void setBarcode(int Barcode) {\n\
\t\tthis.Barcode = Barcode;\n\
\t}\n\
\n\
\tpublic LocalDate getExpires() {\n\
\t\treturn Expires;\n\
\t}\n\
}\n";
        let expected = "package entities;\n\
import com.owlike.genson.annotation.*;\n\
import converters.*;\n\
import org.hyperledger.fabric.contract.annotation.*;\n\
\n\
@DataType()\n\
public class Item implements Serializable {\n\
\t@Property()\n\
\tprivate int barcode;\n\
\t@Property()\n\
\tprivate LocalDate expires;\n\
\t\n\
\t/* all references */\n\
\tprivate Store BelongedStore;\n\
\n\
\tpublic int getBarcode() {\n\
\t\treturn barcode;\n\
\t}\n\
\n\
\tpublic void setBarcode(int Barcode) {\n\
\t\tthis.barcode = Barcode;\n\
\t}\n\
\n\
\t@JsonConverter(LocalDateConverter.class)\n\
\tpublic LocalDate getExpires() {\n\
\t\treturn expires;\n\
\t}\n\
}\n";
        assert_eq!(annotate(text)?.as_deref(), Some(expected));
        Ok(())
    }

    #[test]
    fn second_run_changes_nothing() -> anyhow::Result<()> {
        let text = "@DataType()\npublic class Store implements Serializable {\n\t@Property()\n\tprivate String id;\n\tprivate final String guid = EntityManager.getGuid();\n}\n";
        assert_eq!(annotate(text)?, None);
        Ok(())
    }

    #[test]
    fn non_entities_are_left_alone() -> anyhow::Result<()> {
        assert_eq!(annotate("public class EntityManager {\n\tprivate int Count;\n}\n")?, None);
        Ok(())
    }

    #[test]
    fn several_declarators_are_rejected() {
        let err = annotate("public class Pair implements Serializable {\n\tprivate int a, b;\n}\n")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RewriteError>(),
            Some(RewriteError::UnsupportedShape { .. })
        ));
    }
}
