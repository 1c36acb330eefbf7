/*!
# Entity and Member Analysis

Read-only passes that find entity classes, entity-typed fields of
contract classes, and the process-wide fields a system interface
declares. None of them stage edits.
*/

use std::collections::{BTreeSet, HashSet};

use tree_sitter::Node;

use crate::parser::syntax::{list_element_type, FieldShape, MethodShape, TypeShape};
use crate::parser::{NodeExt, SourceFile, SyntaxKind};
use crate::rewrite::format::lower_first;
use crate::rewrite::{Pass, RewriteContext, TransformResult};

/// Public, serializable classes are persisted entities
pub fn is_entity_class(shape: &TypeShape<'_>) -> bool {
    !shape.is_interface && shape.modifiers.has("public") && shape.implements("Serializable")
}

/// Finds entity classes; output is the set of their names
#[derive(Debug, Default)]
pub struct EntityScanner;

impl Pass for EntityScanner {
    type Output = BTreeSet<String>;

    fn name(&self) -> &'static str {
        "entity-scanner"
    }

    fn description(&self) -> &'static str {
        "Collects public Serializable classes"
    }

    fn visit<'t>(
        &mut self,
        node: Node<'t>,
        cx: &mut RewriteContext<'t>,
    ) -> TransformResult<Self::Output> {
        match node.syntax() {
            SyntaxKind::ClassDeclaration => {
                let mut found = self.visit_children(node, cx)?;
                if let Some(shape) = TypeShape::of(node, cx.text()) {
                    if is_entity_class(&shape) {
                        found.insert(shape.name);
                    }
                }
                Ok(found)
            }
            SyntaxKind::Program | SyntaxKind::ClassBody => self.visit_children(node, cx),
            _ => Ok(BTreeSet::new()),
        }
    }

    fn aggregate(&mut self, mut aggregate: Self::Output, next: Self::Output) -> Self::Output {
        aggregate.extend(next);
        aggregate
    }
}

/// A contract-class field holding an entity or a list of entities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFieldOccurrence {
    pub declaring_class: String,
    pub field_name: String,
    pub entity_type: String,
    pub is_collection: bool,
}

/// Entity type referenced by a declared type, with its collection flag
pub fn entity_reference<'a>(ty: &'a str, known: &BTreeSet<String>) -> Option<(&'a str, bool)> {
    if known.contains(ty) {
        return Some((ty, false));
    }
    list_element_type(ty)
        .filter(|inner| known.contains(*inner))
        .map(|inner| (inner, true))
}

/// Collects [`EntityFieldOccurrence`]s for fields whose type is known
pub struct EntityFieldCollector<'c> {
    known: &'c BTreeSet<String>,
    classes: Vec<String>,
    pub occurrences: Vec<EntityFieldOccurrence>,
}

impl<'c> EntityFieldCollector<'c> {
    pub fn new(known: &'c BTreeSet<String>) -> Self {
        Self {
            known,
            classes: Vec::new(),
            occurrences: Vec::new(),
        }
    }
}

impl Pass for EntityFieldCollector<'_> {
    type Output = ();

    fn name(&self) -> &'static str {
        "entity-field-collector"
    }

    fn description(&self) -> &'static str {
        "Collects fields typed as a known entity or list of entities"
    }

    fn visit<'t>(&mut self, node: Node<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<()> {
        match node.syntax() {
            SyntaxKind::ClassDeclaration => {
                let Some(name) = node.field("name") else {
                    return Ok(());
                };
                self.classes.push(cx.node_text(name).to_string());
                let result = self.visit_children(node, cx);
                self.classes.pop();
                result
            }
            SyntaxKind::FieldDeclaration => {
                let (Some(class), Some(field)) =
                    (self.classes.last(), FieldShape::of(node, cx.text()))
                else {
                    return Ok(());
                };
                if let Some((entity, is_collection)) = entity_reference(&field.ty, self.known) {
                    for name in &field.names {
                        self.occurrences.push(EntityFieldOccurrence {
                            declaring_class: class.clone(),
                            field_name: name.clone(),
                            entity_type: entity.to_string(),
                            is_collection,
                        });
                    }
                }
                Ok(())
            }
            SyntaxKind::Program | SyntaxKind::ClassBody => self.visit_children(node, cx),
            _ => Ok(()),
        }
    }
}

/// Process-wide fields, one per getter of the system interface
#[derive(Debug, Default)]
pub struct SystemFieldCollector {
    fields: BTreeSet<String>,
}

impl SystemFieldCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeSet<String> {
        self.fields
    }
}

impl Pass for SystemFieldCollector {
    type Output = ();

    fn name(&self) -> &'static str {
        "system-field-collector"
    }

    fn description(&self) -> &'static str {
        "Collects process-wide fields declared by the system interface"
    }

    fn visit<'t>(&mut self, node: Node<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<()> {
        match node.syntax() {
            SyntaxKind::MethodDeclaration => {
                if let Some(method) = MethodShape::of(node, cx.text()) {
                    if method.is_conventional_getter() && method.name.len() > 3 {
                        self.fields.insert(lower_first(&method.name[3..]));
                    }
                }
                Ok(())
            }
            SyntaxKind::Program
            | SyntaxKind::InterfaceDeclaration
            | SyntaxKind::InterfaceBody => self.visit_children(node, cx),
            _ => Ok(()),
        }
    }
}

/// Field names and method signatures of a file's first class
#[derive(Debug, Clone, Default)]
pub struct MemberIndex {
    pub class_name: String,
    pub fields: HashSet<String>,
    pub method_names: HashSet<String>,
    pub signatures: HashSet<String>,
}

impl MemberIndex {
    pub fn of(source: &SourceFile) -> Self {
        let text = source.text();
        let Some(class) = crate::parser::syntax::type_declarations(source.root(), text)
            .into_iter()
            .find(|t| !t.is_interface)
        else {
            return Self::default();
        };
        Self::of_type(&class, text)
    }

    pub fn of_type(class: &TypeShape<'_>, text: &str) -> Self {
        let mut index = Self {
            class_name: class.name.clone(),
            ..Self::default()
        };
        for field in class.fields(text) {
            index.fields.extend(field.names);
        }
        for method in class.methods(text) {
            index.signatures.insert(method.signature());
            index.method_names.insert(method.name);
        }
        index
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains(name)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.method_names.contains(name)
    }
}

/// Names a method or lambda declares: parameters, locals, loop and
/// catch variables. Used to tell a field reference from a shadowing local.
pub fn declared_names(root: Node<'_>, text: &str) -> HashSet<String> {
    let mut names = HashSet::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        match node.syntax() {
            SyntaxKind::FormalParameter | SyntaxKind::CatchFormalParameter => {
                if let Some(name) = node.field("name") {
                    names.insert(name.text(text).to_string());
                }
            }
            SyntaxKind::VariableDeclarator => {
                if let Some(name) = node.field("name") {
                    names.insert(name.text(text).to_string());
                }
            }
            SyntaxKind::EnhancedForStatement => {
                if let Some(name) = node.field("name") {
                    names.insert(name.text(text).to_string());
                }
            }
            SyntaxKind::InferredParameters => {
                for id in node.children_of(SyntaxKind::Identifier) {
                    names.insert(id.text(text).to_string());
                }
            }
            SyntaxKind::LambdaExpression => {
                if let Some(param) = node.field("parameters") {
                    if param.syntax() == SyntaxKind::Identifier {
                        names.insert(param.text(text).to_string());
                    }
                }
            }
            _ => {}
        }
        stack.extend(node.named_child_nodes());
    }
    names
}
