/*!
# Synthetic Keys

Entities without a hinted primary key get a generated string identifier,
assigned from the entity manager's transaction-seeded guid source when
the instance is constructed.
*/

use tracing::debug;
use tree_sitter::Node;

use crate::analysis::{is_entity_class, EntityDescriptor, MemberIndex};
use crate::parser::syntax::TypeShape;
use crate::parser::{NodeExt, SyntaxKind};
use crate::rewrite::format::upper_first;
use crate::rewrite::{Pass, RewriteContext, TransformResult};

use super::members::{append_members, GeneratedMember};
use super::{imports, member_indent};

/// Adds a guid field and getter to an entity class. Output is the key
/// descriptor for the class, reused when a guid field already exists.
pub struct GuidAdder {
    synthetic_key: String,
    manager: String,
}

impl GuidAdder {
    pub fn new(synthetic_key: impl Into<String>, manager: impl Into<String>) -> Self {
        Self {
            synthetic_key: synthetic_key.into(),
            manager: manager.into(),
        }
    }

    fn guid_source(&self) -> String {
        format!("{}.getGuid()", self.manager)
    }

    /// Field already initialized from the guid source
    fn existing_key(&self, class: &TypeShape<'_>, text: &str) -> Option<String> {
        let source = self.guid_source();
        class.fields(text).into_iter().find_map(|field| {
            let [declarator] = field.declarators.as_slice() else {
                return None;
            };
            let value = declarator.field("value")?;
            if value.compact_text(text) != source {
                return None;
            }
            field.single_name().map(str::to_string)
        })
    }

    /// `guid`, else `guid1`, `guid2`, ... clear of fields and accessors
    fn free_name(&self, index: &MemberIndex) -> String {
        let taken = |name: &str| {
            index.has_field(name) || index.has_method(&format!("get{}", upper_first(name)))
        };
        if !taken(&self.synthetic_key) {
            return self.synthetic_key.clone();
        }
        (1..)
            .map(|n| format!("{}{n}", self.synthetic_key))
            .find(|name| !taken(name))
            .unwrap_or_else(|| self.synthetic_key.clone())
    }

    fn add_key<'t>(&self, class: &TypeShape<'t>, cx: &mut RewriteContext<'t>) -> EntityDescriptor {
        let index = MemberIndex::of_type(class, cx.text());
        let key = match self.existing_key(class, cx.text()) {
            Some(existing) => existing,
            None => {
                let name = self.free_name(&index);
                if name != self.synthetic_key {
                    debug!(entity = %class.name, key = %name, "synthetic key name taken; using alternative");
                }
                if let Some(body) = class.body {
                    let indent = member_indent(cx, class);
                    cx.insert_after_open_brace(
                        body,
                        format!(
                            "\n{indent}@JsonProperty\n{indent}private final String {name} = {};",
                            self.guid_source()
                        ),
                    );
                    cx.require_import(imports::GENSON_ANNOTATIONS);
                }
                name
            }
        };

        let getter = format!("get{}", upper_first(&key));
        let template = format!("public String {getter}() {{\n\treturn {key};\n}}");
        append_members(cx, class, &index, &[GeneratedMember::method(getter, template)]);
        EntityDescriptor::new(class.name.clone(), key, "String")
    }
}

impl Pass for GuidAdder {
    type Output = Option<EntityDescriptor>;

    fn name(&self) -> &'static str {
        "guid-adder"
    }

    fn description(&self) -> &'static str {
        "Gives entities without a known key a generated string identifier"
    }

    fn visit<'t>(
        &mut self,
        node: Node<'t>,
        cx: &mut RewriteContext<'t>,
    ) -> TransformResult<Option<EntityDescriptor>> {
        match node.syntax() {
            SyntaxKind::Program => self.visit_children(node, cx),
            SyntaxKind::ClassDeclaration => Ok(TypeShape::of(node, cx.text())
                .filter(is_entity_class)
                .map(|class| self.add_key(&class, cx))),
            _ => Ok(None),
        }
    }

    fn aggregate(
        &mut self,
        aggregate: Option<EntityDescriptor>,
        next: Option<EntityDescriptor>,
    ) -> Option<EntityDescriptor> {
        aggregate.or(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::JavaParser;
    use crate::rewrite::run_pass;
    use pretty_assertions::assert_eq;

    fn synthesize(text: &str) -> (Option<EntityDescriptor>, Option<String>) {
        let source = JavaParser::new().unwrap().parse("Sale.java", text.to_string()).unwrap();
        let outcome = run_pass(&mut GuidAdder::new("guid", "EntityManager"), &source).unwrap();
        (outcome.output, outcome.rewritten)
    }

    #[test]
    fn adds_guid_field_and_getter() {
        let text = "@DataType()\npublic class Sale implements Serializable {\n\t@Property()\n\tprivate int time;\n}\n";
        let (descriptor, rewritten) = synthesize(text);
        assert_eq!(descriptor, Some(EntityDescriptor::new("Sale", "guid", "String")));
        assert_eq!(
            rewritten.unwrap(),
            "import com.owlike.genson.annotation.*;\n\n@DataType()\npublic class Sale implements Serializable {\n\t@JsonProperty\n\tprivate final String guid = EntityManager.getGuid();\n\t@Property()\n\tprivate int time;\n\n\tpublic String getGuid() {\n\t\treturn guid;\n\t}\n}\n"
        );
    }

    #[test]
    fn existing_guid_is_reused() {
        let text = "public class Sale implements Serializable {\n\t@JsonProperty\n\tprivate final String guid = EntityManager.getGuid();\n\n\tpublic String getGuid() {\n\t\treturn guid;\n\t}\n}\n";
        let (descriptor, rewritten) = synthesize(text);
        assert_eq!(descriptor.map(|d| d.key_field), Some("guid".to_string()));
        assert_eq!(rewritten, None);
    }

    #[test]
    fn taken_name_gets_a_suffix() {
        let text = "public class Sale implements Serializable {\n\tprivate String guid;\n}\n";
        let (descriptor, rewritten) = synthesize(text);
        assert_eq!(descriptor.map(|d| d.key_field), Some("guid1".to_string()));
        let rewritten = rewritten.unwrap();
        assert!(rewritten.contains("private final String guid1 = EntityManager.getGuid();"));
        assert!(rewritten.contains("public String getGuid1() {"));
    }

    #[test]
    fn non_entities_get_nothing() {
        let (descriptor, rewritten) = synthesize("class Helper {\n}\n");
        assert_eq!(descriptor, None);
        assert_eq!(rewritten, None);
    }
}
