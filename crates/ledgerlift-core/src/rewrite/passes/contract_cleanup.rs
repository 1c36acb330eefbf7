/*!
# Contract Cleanup

Service implementations reload their state through `refresh()`, which
has no meaning once state lives in the ledger. This pass removes the
method and its call sites and switches `getAllInstancesOf("X")` lookups
to the class-token form the entity manager now takes.
*/

use tracing::debug;
use tree_sitter::Node;

use crate::parser::syntax::MethodShape;
use crate::parser::{NodeExt, SyntaxKind};
use crate::rewrite::{Pass, RewriteContext, TransformResult};

const REFRESH: &str = "refresh";
const GET_ALL_INSTANCES_OF: &str = "getAllInstancesOf";

/// Output is the number of edits staged
#[derive(Debug, Default)]
pub struct ContractCleanup;

impl ContractCleanup {
    fn is_refresh_call(node: Node<'_>, text: &str) -> bool {
        let Some(call) = node.named_child_nodes().into_iter().next() else {
            return false;
        };
        call.syntax() == SyntaxKind::MethodInvocation
            && call.field("object").is_none()
            && call.field("name").map(|n| n.text(text)) == Some(REFRESH)
            && call
                .field("arguments")
                .is_some_and(|args| args.named_child_nodes().is_empty())
    }

    /// `getAllInstancesOf("Item")` -> `getAllInstancesOf(Item.class)`
    fn class_token_lookup<'t>(&self, call: Node<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<usize> {
        if call.field("name").map(|n| cx.node_text(n)) != Some(GET_ALL_INSTANCES_OF) {
            return Ok(0);
        }
        let args = call
            .field("arguments")
            .map(|a| a.named_child_nodes())
            .unwrap_or_default();
        let [literal] = args.as_slice() else {
            return Ok(0);
        };
        if literal.syntax() != SyntaxKind::StringLiteral {
            return Ok(0);
        }
        let type_name = cx.node_text(*literal).trim_matches('"');
        if type_name.is_empty() || !type_name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Ok(0);
        }
        cx.replace(*literal, format!("{type_name}.class"))?;
        Ok(1)
    }
}

impl Pass for ContractCleanup {
    type Output = usize;

    fn name(&self) -> &'static str {
        "contract-cleanup"
    }

    fn description(&self) -> &'static str {
        "Removes refresh() and switches entity lookups to class tokens"
    }

    fn visit<'t>(&mut self, node: Node<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<usize> {
        match node.syntax() {
            SyntaxKind::MethodDeclaration => {
                let is_refresh = MethodShape::of(node, cx.text())
                    .is_some_and(|m| m.name == REFRESH && m.is_void() && m.params.is_empty());
                if is_refresh {
                    debug!(path = %cx.source().path().display(), "removing refresh()");
                    cx.delete_with_leading_trivia(node)?;
                    return Ok(1);
                }
                self.visit_children(node, cx)
            }
            SyntaxKind::ExpressionStatement if Self::is_refresh_call(node, cx.text()) => {
                cx.delete_with_leading_trivia(node)?;
                Ok(1)
            }
            SyntaxKind::MethodInvocation => {
                let here = self.class_token_lookup(node, cx)?;
                Ok(here + self.visit_children(node, cx)?)
            }
            _ => self.visit_children(node, cx),
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
    fn removes_refresh_and_rewrites_lookups() {
        let text = "public class ProcessSaleImpl {\n\
\tpublic boolean makeNewSale() {\n\
\t\trefresh();\n\
\t\tList<Item> items = EntityManager.getAllInstancesOf(\"Item\");\n\
\t\treturn true;\n\
\t}\n\
\n\
\t/* reload */\n\
\tpublic void refresh() {\n\
\t\tsystem = (CoCoMESystem) ServiceManager.getAllInstancesOf(\"CoCoMESystem\").get(0);\n\
\t}\n\
}\n";
        let source = JavaParser::new().unwrap().parse("ProcessSaleImpl.java", text.to_string()).unwrap();
        let outcome = run_pass(&mut ContractCleanup, &source).unwrap();
        assert_eq!(outcome.output, 3);
        assert_eq!(
            outcome.rewritten.unwrap(),
            "public class ProcessSaleImpl {\n\
\tpublic boolean makeNewSale() {\n\
\t\tList<Item> items = EntityManager.getAllInstancesOf(Item.class);\n\
\t\treturn true;\n\
\t}\n\
}\n"
        );
    }

    #[test]
    fn calls_on_other_objects_stay() {
        let text = "class A {\n\tvoid run() {\n\t\tcache.refresh();\n\t}\n}\n";
        let source = JavaParser::new().unwrap().parse("A.java", text.to_string()).unwrap();
        let outcome = run_pass(&mut ContractCleanup, &source).unwrap();
        assert_eq!(outcome.output, 0);
        assert_eq!(outcome.rewritten, None);
    }
}
