/*!
# Passes

Core trait for tree-walking analysis and rewrite passes.
*/

use tree_sitter::Node;

use crate::parser::{NodeExt, SourceFile};

use super::{RewriteContext, TransformResult};

/// A single-purpose traversal over one compilation unit
///
/// Implementors override [`Pass::visit`] and `match` on the node's
/// [`SyntaxKind`](crate::parser::SyntaxKind), falling back to
/// [`Pass::visit_children`] for kinds they do not handle. Passes keep
/// their own state and receive shared tables through their constructor.
pub trait Pass {
    /// Value a traversal produces
    type Output: Default;

    /// Human-readable name for this pass
    fn name(&self) -> &'static str;

    /// Detailed description of what this pass does
    fn description(&self) -> &'static str;

    /// Visit one node; the default visits its children.
    fn visit<'t>(
        &mut self,
        node: Node<'t>,
        cx: &mut RewriteContext<'t>,
    ) -> TransformResult<Self::Output> {
        self.visit_children(node, cx)
    }

    /// Visit named children in order, folding results with [`Pass::aggregate`].
    fn visit_children<'t>(
        &mut self,
        node: Node<'t>,
        cx: &mut RewriteContext<'t>,
    ) -> TransformResult<Self::Output> {
        let mut result = Self::Output::default();
        for child in node.named_child_nodes() {
            let next = self.visit(child, cx)?;
            result = self.aggregate(result, next);
        }
        Ok(result)
    }

    /// Combine the running result with the next child's; last child wins.
    fn aggregate(&mut self, aggregate: Self::Output, next: Self::Output) -> Self::Output {
        let _ = aggregate;
        next
    }
}

/// Result of running one pass over one file
#[derive(Debug)]
pub struct PassOutcome<T> {
    pub output: T,
    /// Rewritten text, present only when edits were staged
    pub rewritten: Option<String>,
}

impl<T> PassOutcome<T> {
    pub fn changed(&self) -> bool {
        self.rewritten.is_some()
    }
}

/// Run a pass over a parsed file without touching the file system
pub fn run_pass<P: Pass + ?Sized>(
    pass: &mut P,
    source: &SourceFile,
) -> TransformResult<PassOutcome<P::Output>> {
    let mut cx = RewriteContext::new(source);
    let output = pass.visit(source.root(), &mut cx)?;
    let rewritten = cx.finish();
    Ok(PassOutcome { output, rewritten })
}

/// Pass execution statistics
#[derive(Debug, Default, Clone)]
pub struct PassStats {
    pub pass_name: String,
    pub files_visited: u64,
    pub files_changed: u64,
    pub errors: u64,
}

impl PassStats {
    pub fn new(pass_name: String) -> Self {
        Self {
            pass_name,
            ..Default::default()
        }
    }

    pub fn change_rate(&self) -> f64 {
        if self.files_visited == 0 {
            0.0
        } else {
            (self.files_changed as f64) / (self.files_visited as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{JavaParser, SyntaxKind};

    /// Collects method names; the first one found wins as output.
    struct FirstMethod {
        seen: Vec<String>,
    }

    impl Pass for FirstMethod {
        type Output = Option<String>;

        fn name(&self) -> &'static str {
            "first-method"
        }

        fn description(&self) -> &'static str {
            "Finds the first method name"
        }

        fn visit<'t>(
            &mut self,
            node: Node<'t>,
            cx: &mut RewriteContext<'t>,
        ) -> TransformResult<Self::Output> {
            match node.syntax() {
                SyntaxKind::MethodDeclaration => {
                    let name = cx.node_text(node.field("name").unwrap()).to_string();
                    self.seen.push(name.clone());
                    Ok(Some(name))
                }
                _ => self.visit_children(node, cx),
            }
        }

        fn aggregate(&mut self, aggregate: Option<String>, next: Option<String>) -> Option<String> {
            aggregate.or(next)
        }
    }

    #[test]
    fn custom_aggregate_and_dispatch() {
        let mut parser = JavaParser::new().unwrap();
        let source = parser
            .parse("A.java", "class A { void a() {} void b() {} }".to_string())
            .unwrap();
        let mut pass = FirstMethod { seen: Vec::new() };
        let outcome = run_pass(&mut pass, &source).unwrap();
        assert_eq!(outcome.output.as_deref(), Some("a"));
        assert_eq!(pass.seen, vec!["a".to_string(), "b".to_string()]);
        assert!(!outcome.changed());
    }
}
