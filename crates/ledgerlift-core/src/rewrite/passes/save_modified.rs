/*!
# Mutation Tracking

Entity objects changed through setters inside a transaction must be
written back to the world state before it commits. For every
submit-intent method this pass records which entity-typed variables
are mutated, then joins one `saveModified(T.class)` call per dirty type
into the method's postcondition guard:

```java
if (!(sale.getTotal() == total &&
    true)) {
    throw new PostconditionException();
}
```

becomes a guard whose condition ends in
`EntityManager.saveModified(Sale.class) && true`, so a failed write
fails the postcondition and aborts the transaction.
*/

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;
use tracing::{debug, warn};
use tree_sitter::Node;

use crate::parser::syntax::{FieldShape, MethodShape, TypeShape};
use crate::parser::{NodeExt, SyntaxKind};
use crate::rewrite::format::upper_first;
use crate::rewrite::{Pass, RewriteContext, TransformResult};

const MUTATOR_PREFIXES: [&str; 3] = ["set", "add", "delete"];

/// What the analysis found in one method
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodMutations {
    pub method_name: String,
    /// Variable -> entity type, in order of first mutation
    pub dirty: Vec<(String, String)>,
    /// Types whose save call was joined into the guard
    pub injected: Vec<String>,
}

impl MethodMutations {
    /// Distinct dirty types, in order of first mutation
    pub fn dirty_types(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.dirty
            .iter()
            .map(|(_, ty)| ty.as_str())
            .filter(|ty| seen.insert(*ty))
            .collect()
    }
}

pub struct MutationTracker<'c> {
    entity_names: &'c BTreeSet<String>,
    submit_methods: HashSet<&'c str>,
    exception: String,
    manager: String,
    pub mutations: Vec<MethodMutations>,
}

impl<'c> MutationTracker<'c> {
    pub fn new(
        entity_names: &'c BTreeSet<String>,
        submit_methods: HashSet<&'c str>,
        exception: impl Into<String>,
        manager: impl Into<String>,
    ) -> Self {
        Self {
            entity_names,
            submit_methods,
            exception: exception.into(),
            manager: manager.into(),
            mutations: Vec::new(),
        }
    }

    /// Whether any method had a save call joined into its guard
    pub fn injected_any(&self) -> bool {
        self.mutations.iter().any(|m| !m.injected.is_empty())
    }

    fn is_submit(&self, method: &MethodShape<'_>, text: &str) -> bool {
        if self.submit_methods.contains(method.name.as_str()) {
            return true;
        }
        method
            .node
            .first_child_of(SyntaxKind::Modifiers)
            .is_some_and(|m| m.compact_text(text).contains("Transaction.TYPE.SUBMIT"))
    }

    fn track_class<'t>(&mut self, class: &TypeShape<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<()> {
        let text = cx.text();
        let fields: HashMap<String, String> = class
            .fields(text)
            .into_iter()
            .filter(|f| self.entity_names.contains(&f.ty))
            .flat_map(|f| {
                let ty = f.ty.clone();
                f.names.into_iter().map(move |n| (n, ty.clone()))
            })
            .collect();

        for method in class.methods(text) {
            if !self.is_submit(&method, text) {
                continue;
            }
            let Some(body) = method.body else {
                continue;
            };
            let mut declared = fields.clone();
            self.declare_locals(body, text, &mut declared);
            let dirty = self.mutated_variables(body, text, &declared, &fields);
            if dirty.is_empty() {
                continue;
            }

            let mut mutations = MethodMutations {
                method_name: method.name.clone(),
                dirty: dirty.into_iter().collect(),
                injected: Vec::new(),
            };
            match self.find_guard(body, text) {
                Some((condition, literal)) => {
                    mutations.injected = self.inject(condition, literal, &mutations, cx);
                }
                None => warn!(
                    path = %cx.source().path().display(),
                    method = %method.name,
                    types = ?mutations.dirty_types(),
                    "mutated entities but no postcondition guard; nothing saved"
                ),
            }
            self.mutations.push(mutations);
        }
        Ok(())
    }

    /// Entity-typed locals and loop variables
    fn declare_locals(&self, body: Node<'_>, text: &str, declared: &mut HashMap<String, String>) {
        let mut stack = vec![body];
        while let Some(node) = stack.pop() {
            match node.syntax() {
                SyntaxKind::LocalVariableDeclaration => {
                    if let Some(local) = FieldShape::of(node, text) {
                        if self.entity_names.contains(&local.ty) {
                            for name in local.names {
                                declared.insert(name, local.ty.clone());
                            }
                        }
                    }
                }
                SyntaxKind::EnhancedForStatement => {
                    if let (Some(ty), Some(name)) = (node.field("type"), node.field("name")) {
                        let ty = ty.compact_text(text);
                        if self.entity_names.contains(&ty) {
                            declared.insert(name.text(text).to_string(), ty);
                        }
                    }
                }
                _ => {}
            }
            stack.extend(node.named_child_nodes());
        }
    }

    /// Walk calls in document order; mutators dirty their receiver and
    /// object commits clean their arguments.
    fn mutated_variables(
        &self,
        body: Node<'_>,
        text: &str,
        declared: &HashMap<String, String>,
        fields: &HashMap<String, String>,
    ) -> IndexMap<String, String> {
        let mut dirty = IndexMap::new();
        let mut stack = vec![body];
        while let Some(node) = stack.pop() {
            let mut children = node.named_child_nodes();
            children.reverse();
            stack.extend(children);
            if node.syntax() != SyntaxKind::MethodInvocation {
                continue;
            }
            let Some(name) = node.field("name").map(|n| n.text(text)) else {
                continue;
            };

            if is_object_commit(name) {
                for arg in node.field("arguments").map(|a| a.named_child_nodes()).unwrap_or_default() {
                    if arg.syntax() == SyntaxKind::Identifier {
                        dirty.shift_remove(arg.text(text));
                    }
                }
                continue;
            }
            if !MUTATOR_PREFIXES.iter().any(|p| name.starts_with(p)) {
                continue;
            }
            let Some(receiver) = node.field("object") else {
                continue;
            };
            if let Some((variable, ty)) = receiver_variable(receiver, text, declared, fields) {
                debug!(variable = %variable, ty = %ty, call = name, "entity mutated");
                dirty.entry(variable).or_insert(ty);
            }
        }
        dirty
    }

    /// The guard's condition and the trailing `true` to insert before
    fn find_guard<'t>(&self, body: Node<'t>, text: &str) -> Option<(Node<'t>, Node<'t>)> {
        let throw = format!("thrownew{}();", self.exception);
        let mut stack = vec![body];
        while let Some(node) = stack.pop() {
            let mut children = node.named_child_nodes();
            children.reverse();
            stack.extend(children);
            if node.syntax() != SyntaxKind::IfStatement {
                continue;
            }
            let Some(consequence) = node.field("consequence") else {
                continue;
            };
            let throws_violation = match consequence.syntax() {
                SyntaxKind::ThrowStatement => consequence.compact_text(text) == throw,
                SyntaxKind::Block => match consequence.named_child_nodes().as_slice() {
                    [only] => only.syntax() == SyntaxKind::ThrowStatement && only.compact_text(text) == throw,
                    _ => false,
                },
                _ => false,
            };
            if !throws_violation {
                continue;
            }
            let condition = node.field("condition")?;
            return trailing_true(condition).map(|literal| (condition, literal));
        }
        None
    }

    fn inject<'t>(
        &self,
        condition: Node<'t>,
        literal: Node<'t>,
        mutations: &MethodMutations,
        cx: &mut RewriteContext<'t>,
    ) -> Vec<String> {
        let existing = condition.compact_text(cx.text());
        let types: Vec<String> = mutations
            .dirty_types()
            .into_iter()
            .filter(|ty| !existing.contains(&format!("saveModified({ty}.class)")))
            .map(str::to_string)
            .collect();
        if types.is_empty() {
            return types;
        }

        let text = cx.text();
        let line_start = text[..literal.start_byte()].rfind('\n').map_or(0, |i| i + 1);
        let before = &text[line_start..literal.start_byte()];
        let separator = if before.trim().is_empty() {
            format!("\n{before}")
        } else {
            " ".to_string()
        };
        let calls: Vec<String> = types
            .iter()
            .map(|ty| format!("{}.saveModified({ty}.class) &&{separator}", self.manager))
            .collect();
        cx.insert_before(literal, calls.concat());
        debug!(method = %mutations.method_name, types = ?types, "joined save calls into guard");
        types
    }
}

/// `addObject(...)` or `add<T>Object(...)` persists its argument itself
fn is_object_commit(name: &str) -> bool {
    name == "addObject"
        || name
            .strip_prefix("add")
            .and_then(|rest| rest.strip_suffix("Object"))
            .is_some_and(|ty| !ty.is_empty() && ty.chars().all(|c| c.is_alphanumeric() || c == '_'))
}

/// Variable behind a receiver: `x`, `this.x` or a field getter `getX()`
fn receiver_variable(
    receiver: Node<'_>,
    text: &str,
    declared: &HashMap<String, String>,
    fields: &HashMap<String, String>,
) -> Option<(String, String)> {
    match receiver.syntax() {
        SyntaxKind::Identifier => {
            let name = receiver.text(text);
            declared.get(name).map(|ty| (name.to_string(), ty.clone()))
        }
        SyntaxKind::FieldAccess => {
            let object = receiver.field("object")?;
            if object.syntax() != SyntaxKind::This {
                return None;
            }
            let name = receiver.field("field")?.text(text);
            fields.get(name).map(|ty| (name.to_string(), ty.clone()))
        }
        SyntaxKind::MethodInvocation => {
            if receiver.field("object").is_some() {
                return None;
            }
            let has_args = receiver
                .field("arguments")
                .is_some_and(|a| !a.named_child_nodes().is_empty());
            if has_args {
                return None;
            }
            let getter = receiver.field("name")?.text(text);
            fields
                .iter()
                .find(|(field, _)| getter == format!("get{}", upper_first(field)))
                .map(|(field, ty)| (field.clone(), ty.clone()))
        }
        _ => None,
    }
}

/// First `true` closing a conjunction, or alone in parentheses
fn trailing_true(condition: Node<'_>) -> Option<Node<'_>> {
    let mut stack = vec![condition];
    while let Some(node) = stack.pop() {
        if node.syntax() == SyntaxKind::True {
            let closes_conjunction = node.parent().is_some_and(|p| {
                (p.syntax() == SyntaxKind::BinaryExpression
                    && node.is_parent_field("right")
                    && p.field("operator").is_some_and(|op| op.kind() == "&&"))
                    || p.syntax() == SyntaxKind::ParenthesizedExpression
            });
            if closes_conjunction {
                return Some(node);
            }
        }
        let mut children = node.named_child_nodes();
        children.reverse();
        stack.extend(children);
    }
    None
}

impl Pass for MutationTracker<'_> {
    type Output = ();

    fn name(&self) -> &'static str {
        "mutation-tracker"
    }

    fn description(&self) -> &'static str {
        "Saves entities mutated by a transaction before its postcondition passes"
    }

    fn visit<'t>(&mut self, node: Node<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<()> {
        match node.syntax() {
            SyntaxKind::Program => self.visit_children(node, cx),
            SyntaxKind::ClassDeclaration => match TypeShape::of(node, cx.text()) {
                Some(class) => self.track_class(&class, cx),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }
}
