/*!
# Entity Reference Normalization

Entities reference each other through shadow key fields so that only
keys reach the world state. Two passes, with a re-parse between them:

1. [`ShadowKeyInserter`] adds `fooKey` (or `fooKeys`) next to every
   entity-typed field `foo`.
2. [`KeyedAccessorRewriter`] makes the getter resolve the cached object
   lazily from the key, and the setter (and list `add`/`delete`
   methods) keep the key in step with the object.

The original fields stay; whole-object copies still read them. A list
field loses its initializer so the getter sees it unset after the object
is rebuilt from the world state and loads it from the key list.
*/

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;
use tree_sitter::Node;

use crate::analysis::{is_entity_class, Catalog, EntityDescriptor, MemberIndex};
use crate::parser::syntax::{FieldShape, MethodShape, TypeShape};
use crate::parser::{NodeExt, SyntaxKind};
use crate::rewrite::format::{member_block, upper_first};
use crate::rewrite::{Pass, RewriteContext, TransformResult};
use crate::{NamingConventions, NullKeyPolicy};

use super::{body_indent, imports};

fn accessor_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(get|set|add|delete)(\w+)$").expect("valid accessor pattern"))
}

/// Key stored when a reference is set to null
pub(crate) fn null_key_fallback(policy: NullKeyPolicy, key_type: &str, manager: &str) -> String {
    match policy {
        NullKeyPolicy::FreshIdentifier if key_type == "String" => format!("{manager}.getGuid()"),
        _ => "null".to_string(),
    }
}

/// An entity-typed field of an entity class and its shadow key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowedField {
    pub declaring_class: String,
    pub name: String,
    pub entity_type: String,
    pub is_list: bool,
}

impl ShadowedField {
    pub fn shadow_name(&self, naming: &NamingConventions) -> String {
        let suffix = if self.is_list {
            &naming.keys_suffix
        } else {
            &naming.key_suffix
        };
        format!("{}{suffix}", self.name)
    }
}

/// Inserts shadow key fields; collects every entity-typed field it saw
pub struct ShadowKeyInserter<'c> {
    catalog: &'c Catalog,
    naming: &'c NamingConventions,
    pub fields: Vec<ShadowedField>,
}

impl<'c> ShadowKeyInserter<'c> {
    pub fn new(catalog: &'c Catalog, naming: &'c NamingConventions) -> Self {
        Self {
            catalog,
            naming,
            fields: Vec::new(),
        }
    }

    fn shadow_class<'t>(&mut self, class: &TypeShape<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<()> {
        let index = MemberIndex::of_type(class, cx.text());
        for field in class.fields(cx.text()) {
            if field.is_static() {
                continue;
            }
            let Some(name) = field.single_name() else {
                continue;
            };
            if name.ends_with(&self.naming.key_suffix) || name.ends_with(&self.naming.keys_suffix) {
                continue;
            }
            let Some((entity, is_list)) = self.catalog.reference(&field.ty) else {
                continue;
            };
            let shadowed = ShadowedField {
                declaring_class: class.name.clone(),
                name: name.to_string(),
                entity_type: entity.type_name.clone(),
                is_list,
            };
            let shadow = shadowed.shadow_name(self.naming);
            if !index.has_field(&shadow) {
                self.insert_shadow(&field, &shadow, entity, is_list, cx)?;
            }
            self.fields.push(shadowed);
        }
        Ok(())
    }

    fn insert_shadow<'t>(
        &self,
        field: &FieldShape<'t>,
        shadow: &str,
        entity: &EntityDescriptor,
        is_list: bool,
        cx: &mut RewriteContext<'t>,
    ) -> TransformResult<()> {
        let key = entity.boxed_key_type();
        let declaration = if is_list {
            cx.require_import(imports::JAVA_UTIL);
            // the cache must start out null for the getter to resolve it
            if let [declarator] = field.declarators.as_slice() {
                if let (Some(name), Some(_)) = (declarator.field("name"), declarator.field("value")) {
                    let name = cx.node_text(name);
                    cx.replace(*declarator, name)?;
                }
            }
            format!("private List<{key}> {shadow} = new LinkedList<>();")
        } else {
            format!("private {key} {shadow};")
        };
        let indent = cx.indent_of(field.node);
        debug!(field = %shadow, "inserting shadow key");
        cx.insert_before(field.node, format!("@JsonProperty\n{indent}{declaration}\n{indent}"));
        cx.require_import(imports::GENSON_ANNOTATIONS);
        Ok(())
    }
}

impl Pass for ShadowKeyInserter<'_> {
    type Output = ();

    fn name(&self) -> &'static str {
        "shadow-key-inserter"
    }

    fn description(&self) -> &'static str {
        "Adds a key field next to every entity-typed field of an entity"
    }

    fn visit<'t>(&mut self, node: Node<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<()> {
        match node.syntax() {
            SyntaxKind::Program => self.visit_children(node, cx),
            SyntaxKind::ClassDeclaration => {
                match TypeShape::of(node, cx.text()).filter(is_entity_class) {
                    Some(class) => self.shadow_class(&class, cx),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }
}

/// Rewrites accessors of shadowed fields to go through the key
pub struct KeyedAccessorRewriter<'c> {
    catalog: &'c Catalog,
    naming: &'c NamingConventions,
    null_policy: NullKeyPolicy,
    manager: String,
    fields: &'c [ShadowedField],
    /// `Class.method` of every rewritten accessor
    pub rewritten: Vec<String>,
}

impl<'c> KeyedAccessorRewriter<'c> {
    pub fn new(
        catalog: &'c Catalog,
        naming: &'c NamingConventions,
        null_policy: NullKeyPolicy,
        manager: impl Into<String>,
        fields: &'c [ShadowedField],
    ) -> Self {
        Self {
            catalog,
            naming,
            null_policy,
            manager: manager.into(),
            fields,
            rewritten: Vec::new(),
        }
    }

    fn rewrite_class<'t>(&mut self, class: &TypeShape<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<()> {
        let fields: Vec<&ShadowedField> = self
            .fields
            .iter()
            .filter(|f| f.declaring_class == class.name)
            .collect();
        if fields.is_empty() {
            return Ok(());
        }
        for method in class.methods(cx.text()) {
            let Some(caps) = accessor_pattern().captures(&method.name) else {
                continue;
            };
            let Some(field) = fields.iter().find(|f| f.name.eq_ignore_ascii_case(&caps[2])) else {
                continue;
            };
            let Some(entity) = self.catalog.get(&field.entity_type) else {
                continue;
            };
            let Some(body) = method.body else {
                continue;
            };
            let shadow = field.shadow_name(self.naming);
            if cx.node_text(body).contains(&shadow) {
                continue;
            }
            let rewritten = match (&caps[1], method.params.as_slice()) {
                ("get", []) => {
                    self.rewrite_getter(&method, body, field, entity, &shadow, cx)?;
                    true
                }
                ("set", [param]) => {
                    self.rewrite_setter(body, &method, &param.name, field, entity, &shadow, cx);
                    true
                }
                (verb @ ("add" | "delete"), [param]) if field.is_list => {
                    let getter = format!("get{}", upper_first(&field.name));
                    let mutation = if verb == "add" { "add" } else { "remove" };
                    let indent = body_indent(cx, method.node);
                    cx.insert_after_open_brace(
                        body,
                        format!(
                            "\n{indent}{getter}();\n{indent}this.{shadow}.{mutation}(({key}) {p}.{accessor}());",
                            key = entity.boxed_key_type(),
                            p = param.name,
                            accessor = entity.key_accessor(),
                        ),
                    );
                    true
                }
                _ => false,
            };
            if rewritten {
                debug!(class = %class.name, method = %method.name, "rewrote keyed accessor");
                self.rewritten.push(format!("{}.{}", class.name, method.name));
            }
        }
        Ok(())
    }

    fn rewrite_getter<'t>(
        &self,
        method: &MethodShape<'t>,
        body: Node<'t>,
        field: &ShadowedField,
        entity: &EntityDescriptor,
        shadow: &str,
        cx: &mut RewriteContext<'t>,
    ) -> TransformResult<()> {
        let f = &field.name;
        let template = if field.is_list {
            cx.require_import(imports::JAVA_STREAM);
            format!(
                "{{\n\
                 \tif ({f} == null)\n\
                 \t\t{f} = {shadow}.stream().map({manager}::{resolver}).collect(Collectors.toList());\n\
                 \treturn {f};\n\
                 }}",
                manager = self.manager,
                resolver = entity.resolver(),
            )
        } else {
            format!(
                "{{\n\
                 \tif ({f} == null) {{\n\
                 \t\tfor (var candidate : {manager}.getAllInstancesOf({ty}.class)) {{\n\
                 \t\t\tif (Objects.equals(candidate.{accessor}(), {shadow})) {{\n\
                 \t\t\t\t{f} = candidate;\n\
                 \t\t\t\tbreak;\n\
                 \t\t\t}}\n\
                 \t\t}}\n\
                 \t}}\n\
                 \treturn {f};\n\
                 }}",
                manager = self.manager,
                ty = entity.type_name,
                accessor = entity.key_accessor(),
            )
        };
        let indent = cx.indent_of(method.node);
        cx.replace(body, member_block(&template, indent))?;
        if !method.modifiers.has_annotation("JsonIgnore") {
            cx.insert_before(method.node, format!("@JsonIgnore\n{indent}"));
            cx.require_import(imports::GENSON_ANNOTATIONS);
        }
        cx.require_import(imports::JAVA_UTIL);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn rewrite_setter<'t>(
        &self,
        body: Node<'t>,
        method: &MethodShape<'t>,
        param: &str,
        field: &ShadowedField,
        entity: &EntityDescriptor,
        shadow: &str,
        cx: &mut RewriteContext<'t>,
    ) {
        let accessor = entity.key_accessor();
        let assignment = if field.is_list {
            cx.require_import(imports::JAVA_UTIL);
            cx.require_import(imports::JAVA_STREAM);
            format!(
                "this.{shadow} = {param} != null ? {param}.stream().map({ty}::{accessor}).collect(Collectors.toList()) : new LinkedList<>();",
                ty = entity.type_name,
            )
        } else {
            let fallback = null_key_fallback(self.null_policy, &entity.key_type, &self.manager);
            format!("this.{shadow} = {param} != null ? {param}.{accessor}() : {fallback};")
        };
        let indent = body_indent(cx, method.node);
        cx.insert_after_open_brace(body, format!("\n{indent}{assignment}"));
    }
}

impl Pass for KeyedAccessorRewriter<'_> {
    type Output = ();

    fn name(&self) -> &'static str {
        "keyed-accessor-rewriter"
    }

    fn description(&self) -> &'static str {
        "Routes entity reference accessors through their shadow keys"
    }

    fn visit<'t>(&mut self, node: Node<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<()> {
        match node.syntax() {
            SyntaxKind::Program => self.visit_children(node, cx),
            SyntaxKind::ClassDeclaration => match TypeShape::of(node, cx.text()) {
                Some(class) if is_entity_class(&class) => self.rewrite_class(&class, cx),
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::CatalogBuilder;
    use crate::parser::JavaParser;
    use crate::rewrite::run_pass;
    use pretty_assertions::assert_eq;

    const ITEM: &str = "package entities;\n\
\n\
import java.util.*;\n\
\n\
public class Item implements Serializable {\n\
\t/* all references */\n\
\tprivate Store store;\n\
\tprivate List<Tag> tags = new LinkedList<Tag>();\n\
\n\
\tpublic Store getStore() {\n\
\t\treturn store;\n\
\t}\n\
\n\
\tpublic void setStore(Store store) {\n\
\t\tthis.store = store;\n\
\t}\n\
\n\
\tpublic List<Tag> getTags() {\n\
\t\treturn tags;\n\
\t}\n\
\n\
\tpublic void addTags(Tag tag) {\n\
\t\tthis.tags.add(tag);\n\
\t}\n\
}\n";

    fn catalog() -> Catalog {
        let mut builder = CatalogBuilder::new(".");
        builder.register(EntityDescriptor::new("Store", "storeId", "String"));
        builder.register(EntityDescriptor::new("Tag", "id", "int"));
        builder.build()
    }

    /// Both passes with a re-parse between them
    fn normalize(text: &str, policy: NullKeyPolicy) -> anyhow::Result<(Vec<ShadowedField>, String)> {
        let catalog = catalog();
        let naming = NamingConventions::default();
        let mut parser = JavaParser::new()?;

        let source = parser.parse("Item.java", text.to_string())?;
        let mut inserter = ShadowKeyInserter::new(&catalog, &naming);
        let shadowed = run_pass(&mut inserter, &source)?.rewritten.unwrap_or_else(|| text.to_string());
        let fields = inserter.fields;

        let source = parser.parse("Item.java", shadowed.clone())?;
        let mut rewriter = KeyedAccessorRewriter::new(&catalog, &naming, policy, "EntityManager", &fields);
        let rewritten = run_pass(&mut rewriter, &source)?.rewritten.unwrap_or(shadowed);
        Ok((fields, rewritten))
    }

    #[test]
    fn singular_reference_resolves_through_key() -> anyhow::Result<()> {
        let (fields, text) = normalize(ITEM, NullKeyPolicy::FreshIdentifier)?;
        assert_eq!(fields.len(), 2);

        assert!(text.contains("\t@JsonProperty\n\tprivate String storeKey;\n\tprivate Store store;"));
        assert!(text.contains(
            "\t@JsonIgnore\n\tpublic Store getStore() {\n\
             \t\tif (store == null) {\n\
             \t\t\tfor (var candidate : EntityManager.getAllInstancesOf(Store.class)) {\n\
             \t\t\t\tif (Objects.equals(candidate.getStoreId(), storeKey)) {\n\
             \t\t\t\t\tstore = candidate;\n\
             \t\t\t\t\tbreak;\n\
             \t\t\t\t}\n\
             \t\t\t}\n\
             \t\t}\n\
             \t\treturn store;\n\
             \t}"
        ));
        assert!(text.contains(
            "\tpublic void setStore(Store store) {\n\
             \t\tthis.storeKey = store != null ? store.getStoreId() : EntityManager.getGuid();\n\
             \t\tthis.store = store;"
        ));
        Ok(())
    }

    #[test]
    fn list_reference_keeps_key_list_in_step() -> anyhow::Result<()> {
        let (_, text) = normalize(ITEM, NullKeyPolicy::FreshIdentifier)?;
        assert!(text.contains(
            "\t@JsonProperty\n\tprivate List<Integer> tagsKeys = new LinkedList<>();\n\tprivate List<Tag> tags;\n"
        ));
        assert!(!text.contains("new LinkedList<Tag>()"));
        assert!(text.contains(
            "\t\tif (tags == null)\n\t\t\ttags = tagsKeys.stream().map(EntityManager::getTagByKey).collect(Collectors.toList());"
        ));
        assert!(text.contains(
            "\tpublic void addTags(Tag tag) {\n\t\tgetTags();\n\t\tthis.tagsKeys.add((Integer) tag.getId());\n\t\tthis.tags.add(tag);"
        ));
        assert!(text.contains("import java.util.stream.*;"));
        Ok(())
    }

    #[test]
    fn null_key_policy_stores_null() -> anyhow::Result<()> {
        let (_, text) = normalize(ITEM, NullKeyPolicy::NullKey)?;
        assert!(text.contains("this.storeKey = store != null ? store.getStoreId() : null;"));
        Ok(())
    }

    #[test]
    fn second_normalization_is_a_no_op() -> anyhow::Result<()> {
        let (_, once) = normalize(ITEM, NullKeyPolicy::FreshIdentifier)?;
        let catalog = catalog();
        let naming = NamingConventions::default();
        let mut parser = JavaParser::new()?;

        let source = parser.parse("Item.java", once.clone())?;
        let mut inserter = ShadowKeyInserter::new(&catalog, &naming);
        assert_eq!(run_pass(&mut inserter, &source)?.rewritten, None);

        let fields = inserter.fields;
        let mut rewriter =
            KeyedAccessorRewriter::new(&catalog, &naming, NullKeyPolicy::FreshIdentifier, "EntityManager", &fields);
        assert_eq!(run_pass(&mut rewriter, &source)?.rewritten, None);
        assert!(rewriter.rewritten.is_empty());
        Ok(())
    }
}
