/*!
# Member Adder

Appends generated members to the end of a class unless a member with the
same name (or, when given, the same signature) is already declared.
*/

use tracing::debug;
use tree_sitter::Node;

use crate::analysis::MemberIndex;
use crate::parser::syntax::TypeShape;
use crate::parser::{NodeExt, SyntaxKind};
use crate::rewrite::format::member_block;
use crate::rewrite::{Pass, RewriteContext, TransformResult};

use super::member_indent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Method,
}

/// Member text keyed by what makes it already present
#[derive(Debug, Clone)]
pub struct GeneratedMember {
    pub kind: MemberKind,
    pub name: String,
    /// `name(T1,T2)`; when set, only this exact overload counts as present
    pub signature: Option<String>,
    /// Member source at indentation zero, nested lines tab-indented
    pub template: String,
}

impl GeneratedMember {
    pub fn method(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            kind: MemberKind::Method,
            name: name.into(),
            signature: None,
            template: template.into(),
        }
    }

    pub fn field(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            kind: MemberKind::Field,
            name: name.into(),
            signature: None,
            template: template.into(),
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn is_present_in(&self, index: &MemberIndex) -> bool {
        match (&self.signature, self.kind) {
            (Some(signature), _) => index.signatures.contains(signature),
            (None, MemberKind::Method) => index.has_method(&self.name),
            (None, MemberKind::Field) => index.has_field(&self.name),
        }
    }
}

/// Stage the absent members before the closing brace of `class`, in
/// order. Returns the names added.
pub(crate) fn append_members(
    cx: &mut RewriteContext<'_>,
    class: &TypeShape<'_>,
    index: &MemberIndex,
    members: &[GeneratedMember],
) -> Vec<String> {
    let Some(body) = class.body else {
        return Vec::new();
    };
    let indent = member_indent(cx, class);
    let mut added = Vec::new();
    let mut text = String::new();
    for member in members {
        if member.is_present_in(index) {
            debug!(class = %class.name, member = %member.name, "member already present");
            continue;
        }
        text.push('\n');
        text.push_str(&indent);
        text.push_str(&member_block(&member.template, &indent));
        text.push('\n');
        added.push(member.name.clone());
    }
    if !added.is_empty() {
        cx.insert_before_close_brace(body, text);
    }
    added
}

/// Adds members to the first class of a file, optionally only to the
/// class with a given name.
pub struct MemberAdder {
    class_name: Option<String>,
    members: Vec<GeneratedMember>,
    imports: Vec<String>,
    pub added: Vec<String>,
}

impl MemberAdder {
    pub fn new(members: Vec<GeneratedMember>) -> Self {
        Self {
            class_name: None,
            members,
            imports: Vec::new(),
            added: Vec::new(),
        }
    }

    pub fn for_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn with_import(mut self, qualified_name: impl Into<String>) -> Self {
        self.imports.push(qualified_name.into());
        self
    }
}

impl Pass for MemberAdder {
    type Output = usize;

    fn name(&self) -> &'static str {
        "member-adder"
    }

    fn description(&self) -> &'static str {
        "Appends generated members that a class does not declare yet"
    }

    fn visit<'t>(&mut self, node: Node<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<usize> {
        match node.syntax() {
            SyntaxKind::Program => self.visit_children(node, cx),
            SyntaxKind::ClassDeclaration => {
                let Some(class) = TypeShape::of(node, cx.text()) else {
                    return Ok(0);
                };
                let wanted = self.class_name.as_deref().unwrap_or(&class.name);
                if wanted != class.name || !self.added.is_empty() {
                    return Ok(0);
                }
                let index = MemberIndex::of_type(&class, cx.text());
                self.added = append_members(cx, &class, &index, &self.members);
                if !self.added.is_empty() {
                    for import in &self.imports {
                        cx.require_import(import.clone());
                    }
                }
                Ok(self.added.len())
            }
            _ => Ok(0),
        }
    }

    fn aggregate(&mut self, aggregate: usize, next: usize) -> usize {
        aggregate + next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::JavaParser;
    use crate::rewrite::run_pass;
    use pretty_assertions::assert_eq;

    #[test]
    fn appends_only_absent_members() {
        let text = "package entities;\n\npublic class EntityManager {\n\tpublic static int count() {\n\t\treturn 0;\n\t}\n}\n";
        let source = JavaParser::new().unwrap().parse("EntityManager.java", text.to_string()).unwrap();
        let mut adder = MemberAdder::new(vec![
            GeneratedMember::method("count", "public static int count() {\n\treturn 1;\n}"),
            GeneratedMember::method("total", "public static int total() {\n\treturn 2;\n}"),
        ])
        .with_import("java.util.*");

        let outcome = run_pass(&mut adder, &source).unwrap();
        assert_eq!(outcome.output, 1);
        assert_eq!(
            outcome.rewritten.unwrap(),
            "package entities;\nimport java.util.*;\n\npublic class EntityManager {\n\tpublic static int count() {\n\t\treturn 0;\n\t}\n\n\tpublic static int total() {\n\t\treturn 2;\n\t}\n}\n"
        );
    }

    #[test]
    fn signature_distinguishes_overloads() {
        let text = "class EntityManager {\n\tpublic static List getAllInstancesOf(String name) { return null; }\n}\n";
        let source = JavaParser::new().unwrap().parse("EntityManager.java", text.to_string()).unwrap();
        let mut adder = MemberAdder::new(vec![GeneratedMember::method(
            "getAllInstancesOf",
            "public static <T> List<T> getAllInstancesOf(Class<T> clazz) {\n\treturn loadList(clazz);\n}",
        )
        .with_signature("getAllInstancesOf(Class<T>)")]);
        let outcome = run_pass(&mut adder, &source).unwrap();
        assert_eq!(adder.added, vec!["getAllInstancesOf".to_string()]);
        assert!(outcome.changed());
    }
}
