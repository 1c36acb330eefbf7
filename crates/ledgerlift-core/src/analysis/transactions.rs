/*!
# Transaction Scanning

Service interfaces declare the externally invocable operations. Every
method except plain property accessors becomes a transaction of the
matching `<Interface>Impl` class.
*/

use std::collections::{BTreeMap, HashSet};

use tree_sitter::Node;

use crate::parser::syntax::MethodShape;
use crate::parser::{NodeExt, SyntaxKind};
use crate::rewrite::{Pass, RewriteContext, TransformResult};

/// Whether a transaction may write world state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationIntent {
    Submit,
    Evaluate,
}

impl MutationIntent {
    /// Every interface operation may write state unless the interface itself
    /// declares it `Transaction.TYPE.EVALUATE`.
    pub fn for_method(method: &MethodShape<'_>, source: &str) -> Self {
        let declared_evaluate = method
            .node
            .first_child_of(SyntaxKind::Modifiers)
            .is_some_and(|m| m.compact_text(source).contains("Transaction.TYPE.EVALUATE"));
        if declared_evaluate {
            MutationIntent::Evaluate
        } else {
            MutationIntent::Submit
        }
    }

    /// Constant of `Transaction.TYPE`
    pub fn annotation_type(self) -> &'static str {
        match self {
            MutationIntent::Submit => "SUBMIT",
            MutationIntent::Evaluate => "EVALUATE",
        }
    }
}

/// One interface method exposed as a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDescriptor {
    pub method_name: String,
    pub parameter_types: Vec<String>,
    pub return_type: String,
    pub throws_types: Vec<String>,
    pub intent: MutationIntent,
}

impl TransactionDescriptor {
    pub fn from_method(method: &MethodShape<'_>, source: &str) -> Self {
        Self {
            method_name: method.name.clone(),
            parameter_types: method.params.iter().map(|p| p.ty.clone()).collect(),
            return_type: method.return_type.clone(),
            throws_types: method.throws.clone(),
            intent: MutationIntent::for_method(method, source),
        }
    }
}

/// Reads the transactions of a service interface
#[derive(Debug, Default)]
pub struct InterfaceScanner {
    pub interface_name: Option<String>,
    pub transactions: Vec<TransactionDescriptor>,
}

impl InterfaceScanner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Pass for InterfaceScanner {
    type Output = ();

    fn name(&self) -> &'static str {
        "interface-scanner"
    }

    fn description(&self) -> &'static str {
        "Collects non-accessor interface methods as transactions"
    }

    fn visit<'t>(&mut self, node: Node<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<()> {
        match node.syntax() {
            SyntaxKind::InterfaceDeclaration => {
                if self.interface_name.is_some() {
                    return Ok(());
                }
                self.interface_name = node.field("name").map(|n| cx.node_text(n).to_string());
                self.visit_children(node, cx)
            }
            SyntaxKind::MethodDeclaration => {
                if let Some(method) = MethodShape::of(node, cx.text()) {
                    if !method.is_conventional_getter() && !method.is_conventional_setter() {
                        self.transactions.push(TransactionDescriptor::from_method(&method, cx.text()));
                    }
                }
                Ok(())
            }
            SyntaxKind::Program | SyntaxKind::InterfaceBody => self.visit_children(node, cx),
            _ => Ok(()),
        }
    }
}

/// Implementation class name -> its transactions
#[derive(Debug, Clone, Default)]
pub struct TransactionTable {
    by_class: BTreeMap<String, Vec<TransactionDescriptor>>,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, impl_class: impl Into<String>, transactions: Vec<TransactionDescriptor>) {
        self.by_class
            .entry(impl_class.into())
            .or_default()
            .extend(transactions);
    }

    pub fn get(&self, impl_class: &str) -> &[TransactionDescriptor] {
        self.by_class.get(impl_class).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Names of the write-capable transactions of a class
    pub fn submit_names(&self, impl_class: &str) -> HashSet<&str> {
        self.get(impl_class)
            .iter()
            .filter(|t| t.intent == MutationIntent::Submit)
            .map(|t| t.method_name.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[TransactionDescriptor])> {
        self.by_class.iter().map(|(c, t)| (c.as_str(), t.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.by_class.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::JavaParser;
    use crate::rewrite::run_pass;

    #[test]
    fn skips_conventional_accessors() {
        let text = "public interface ManageFoo {\n\
                    \tFoo getCurrentFoo();\n\
                    \tvoid setCurrentFoo(Foo f);\n\
                    \tboolean addFooObject(Context ctx, Foo o) throws PreconditionException;\n\
                    \tFoo getFoo(String id);\n\
                    }\n";
        let source = JavaParser::new().unwrap().parse("ManageFoo.java", text.to_string()).unwrap();
        let mut scanner = InterfaceScanner::new();
        run_pass(&mut scanner, &source).unwrap();

        assert_eq!(scanner.interface_name.as_deref(), Some("ManageFoo"));
        let names: Vec<_> = scanner.transactions.iter().map(|t| t.method_name.as_str()).collect();
        assert_eq!(names, vec!["addFooObject", "getFoo"]);

        let add = &scanner.transactions[0];
        assert_eq!(add.parameter_types, vec!["Context".to_string(), "Foo".to_string()]);
        assert_eq!(add.throws_types, vec!["PreconditionException".to_string()]);
        assert_eq!(add.intent, MutationIntent::Submit);
        assert_eq!(scanner.transactions[1].intent, MutationIntent::Submit);
    }

    #[test]
    fn query_names_do_not_make_read_only_transactions() {
        let text = "public interface ManageOrder {\n\
                    \tboolean findAndCloseOrder(int id) throws PreconditionException;\n\
                    \tList<Order> listOrders();\n\
                    \t@Transaction(intent = Transaction.TYPE.EVALUATE)\n\
                    \tint countOrders();\n\
                    }\n";
        let source = JavaParser::new().unwrap().parse("ManageOrder.java", text.to_string()).unwrap();
        let mut scanner = InterfaceScanner::new();
        run_pass(&mut scanner, &source).unwrap();

        let intents: Vec<_> = scanner.transactions.iter().map(|t| (t.method_name.as_str(), t.intent)).collect();
        assert_eq!(
            intents,
            vec![
                ("findAndCloseOrder", MutationIntent::Submit),
                ("listOrders", MutationIntent::Submit),
                ("countOrders", MutationIntent::Evaluate),
            ]
        );

        let mut table = TransactionTable::new();
        table.insert("ManageOrderImpl", scanner.transactions);
        let submit = table.submit_names("ManageOrderImpl");
        assert!(submit.contains("findAndCloseOrder"));
        assert!(submit.contains("listOrders"));
        assert!(!submit.contains("countOrders"));
    }

    #[test]
    fn table_reports_submit_names() {
        let mut table = TransactionTable::new();
        table.insert(
            "ManageFooImpl",
            vec![TransactionDescriptor {
                method_name: "addFooObject".into(),
                parameter_types: vec!["Foo".into()],
                return_type: "boolean".into(),
                throws_types: vec![],
                intent: MutationIntent::Submit,
            }],
        );
        assert!(table.submit_names("ManageFooImpl").contains("addFooObject"));
        assert!(table.get("Other").is_empty());
        assert_eq!(table.len(), 1);
    }
}
