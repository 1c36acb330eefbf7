/*!
# Transaction Wrappers

Fabric transactions take a `Context` first and only values the ledger
client can send as strings. For each transaction of a service
implementation this pass adds an overload that takes the context plus
primitive or string parameters, installs the transaction's stub in the
entity manager, deserializes complex arguments with Genson and delegates
to the original method.

A `List<T>` result is returned as `T[]`. Methods that already take a
leading `Context` and nothing but primitives or strings are annotated in
place instead of wrapped.
*/

use tracing::{debug, info};
use tree_sitter::Node;

use crate::analysis::{MemberIndex, TransactionDescriptor};
use crate::parser::syntax::{is_primitive_or_string, list_element_type, MethodShape, TypeShape};
use crate::parser::{NodeExt, SyntaxKind};
use crate::rewrite::format::member_block;
use crate::rewrite::{Pass, RewriteContext, TransformResult};

use super::{body_indent, imports, member_indent};

const CONTEXT_TYPE: &str = "Context";
const CONTRACT_INTERFACE: &str = "ContractInterface";

/// Parameter list and call arguments of one wrapper
struct WrapperParams {
    context: String,
    declarations: Vec<String>,
    types: Vec<String>,
    arguments: Vec<String>,
    needs_genson: bool,
    date_types: Vec<String>,
}

pub struct TransactionWrapperSynthesizer<'c> {
    transactions: &'c [TransactionDescriptor],
    date_types: &'c [String],
    manager: String,
    /// Transactions that got a wrapper overload
    pub wrapped: Vec<String>,
    /// Context-first transactions annotated in place
    pub annotated: Vec<String>,
}

impl<'c> TransactionWrapperSynthesizer<'c> {
    pub fn new(transactions: &'c [TransactionDescriptor], date_types: &'c [String], manager: impl Into<String>) -> Self {
        Self {
            transactions,
            date_types,
            manager: manager.into(),
            wrapped: Vec::new(),
            annotated: Vec::new(),
        }
    }

    fn is_date(&self, ty: &str) -> bool {
        self.date_types.iter().any(|d| d == ty)
    }

    fn descriptor_for(&self, method: &MethodShape<'_>) -> Option<&'c TransactionDescriptor> {
        self.transactions.iter().find(|t| {
            t.method_name == method.name
                && t.parameter_types.len() == method.params.len()
                && t.parameter_types.iter().zip(&method.params).all(|(ty, p)| *ty == p.ty)
        })
    }

    fn rewrite_class<'t>(&mut self, class: &TypeShape<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<()> {
        let index = MemberIndex::of_type(class, cx.text());
        let mut needs_genson = false;

        for method in class.methods(cx.text()) {
            let Some(descriptor) = self.descriptor_for(&method) else {
                continue;
            };
            if method.modifiers.has_annotation("Transaction") {
                continue;
            }
            let starts_with_context = method.params.first().is_some_and(|p| p.ty == CONTEXT_TYPE);
            let only_plain_values = method.params.iter().skip(1).all(|p| is_primitive_or_string(&p.ty));
            if starts_with_context && only_plain_values {
                self.annotate_in_place(&method, descriptor, cx);
                continue;
            }

            let params = self.wrapper_params(&method);
            let signature = format!("{}({})", method.name, params.types.join(","));
            if index.signatures.contains(&signature) {
                debug!(method = %method.name, "wrapper already present");
                continue;
            }
            needs_genson |= params.needs_genson && params.date_types.is_empty();
            self.insert_wrapper(&method, descriptor, &params, cx);
        }

        if self.wrapped.is_empty() && self.annotated.is_empty() {
            return Ok(());
        }
        self.mark_contract(class, cx);
        if needs_genson && !index.has_field("genson") {
            if let Some(body) = class.body {
                let indent = member_indent(cx, class);
                cx.insert_after_open_brace(
                    body,
                    format!("\n{indent}private static final Genson genson = new Genson();\n"),
                );
                cx.require_import(imports::GENSON);
            }
        }
        Ok(())
    }

    /// `@Contract` on the class and `ContractInterface` in its implements list
    fn mark_contract<'t>(&self, class: &TypeShape<'t>, cx: &mut RewriteContext<'t>) {
        if !class.modifiers.has_annotation("Contract") {
            cx.insert_before(class.node, "@Contract\n");
            cx.require_import(imports::FABRIC_ANNOTATIONS);
        }
        if class.implements(CONTRACT_INTERFACE) {
            return;
        }
        match class.node.field("interfaces") {
            Some(interfaces) => cx.insert_after(interfaces, format!(", {CONTRACT_INTERFACE}")),
            None => {
                let anchor = class.node.field("superclass").or_else(|| class.node.field("name"));
                if let Some(anchor) = anchor {
                    cx.insert_after(anchor, format!(" implements {CONTRACT_INTERFACE}"));
                }
            }
        }
        cx.require_import(imports::FABRIC_CONTRACT);
    }

    fn annotate_in_place<'t>(
        &mut self,
        method: &MethodShape<'t>,
        descriptor: &TransactionDescriptor,
        cx: &mut RewriteContext<'t>,
    ) {
        let indent = cx.indent_of(method.node);
        cx.insert_before(
            method.node,
            format!(
                "@Transaction(intent = Transaction.TYPE.{})\n{indent}",
                descriptor.intent.annotation_type()
            ),
        );
        if let (Some(body), Some(context)) = (method.body, method.params.first()) {
            if !cx.node_text(body).contains("setStub(") {
                let indent = body_indent(cx, method.node);
                cx.insert_after_open_brace(
                    body,
                    format!("\n{indent}{}.setStub({}.getStub());", self.manager, context.name),
                );
            }
        }
        cx.require_import(imports::FABRIC_ANNOTATIONS);
        debug!(method = %method.name, "annotated context-first transaction");
        self.annotated.push(method.name.clone());
    }

    fn wrapper_params(&self, method: &MethodShape<'_>) -> WrapperParams {
        let context = if method.params.iter().any(|p| p.name == "ctx" && p.ty != CONTEXT_TYPE) {
            "context".to_string()
        } else {
            "ctx".to_string()
        };
        let mut params = WrapperParams {
            declarations: vec![format!("final {CONTEXT_TYPE} {context}")],
            types: vec![CONTEXT_TYPE.to_string()],
            arguments: Vec::new(),
            needs_genson: false,
            date_types: Vec::new(),
            context,
        };

        for (i, param) in method.params.iter().enumerate() {
            if i == 0 && param.ty == CONTEXT_TYPE {
                params.arguments.push(params.context.clone());
                continue;
            }
            if is_primitive_or_string(&param.ty) {
                params.declarations.push(format!("{} {}", param.ty, param.name));
                params.types.push(param.ty.clone());
                params.arguments.push(param.name.clone());
                continue;
            }
            params.declarations.push(format!("String {}", param.name));
            params.types.push("String".to_string());
            params.needs_genson = true;
            if self.is_date(&param.ty) {
                if !params.date_types.contains(&param.ty) {
                    params.date_types.push(param.ty.clone());
                }
                params.arguments.push(format!(
                    "genson.deserialize(\"\\\"\" + {} + \"\\\"\", {}.class)",
                    param.name, param.ty
                ));
            } else {
                params
                    .arguments
                    .push(format!("genson.deserialize({}, {}.class)", param.name, param.ty));
            }
        }
        params
    }

    fn insert_wrapper<'t>(
        &mut self,
        method: &MethodShape<'t>,
        descriptor: &TransactionDescriptor,
        params: &WrapperParams,
        cx: &mut RewriteContext<'t>,
    ) {
        let list_element = list_element_type(&method.return_type);
        let return_type = match list_element {
            Some(element) => format!("{element}[]"),
            None => method.return_type.clone(),
        };
        let throws = if method.throws.is_empty() {
            String::new()
        } else {
            format!(" throws {}", method.throws.join(", "))
        };
        let call = format!("{}({})", method.name, params.arguments.join(", "));

        let mut lines = vec![
            format!(
                "@Transaction(intent = Transaction.TYPE.{})",
                descriptor.intent.annotation_type()
            ),
            format!(
                "public {return_type} {}({}){throws} {{",
                method.name,
                params.declarations.join(", ")
            ),
            format!("\tChaincodeStub stub = {}.getStub();", params.context),
            format!("\t{}.setStub(stub);", self.manager),
        ];
        if !params.date_types.is_empty() {
            let converters: Vec<String> = params
                .date_types
                .iter()
                .map(|ty| format!("new {ty}Converter()"))
                .collect();
            lines.push(format!(
                "\tvar genson = new GensonBuilder().withConverters({}).create();",
                converters.join(", ")
            ));
            cx.require_import(imports::GENSON_BUILDER);
            cx.require_import(imports::CONVERTERS);
        }
        lines.push(String::new());
        match list_element {
            _ if method.is_void() => lines.push(format!("\t{call};")),
            Some(element) => {
                lines.push(format!("\tvar res = {call};"));
                lines.push(format!("\treturn res.toArray({element}[]::new);"));
            }
            None => {
                lines.push(format!("\tvar res = {call};"));
                lines.push("\treturn res;".to_string());
            }
        }
        lines.push("}".to_string());

        let indent = cx.indent_of(method.node);
        let wrapper = member_block(&lines.join("\n"), indent);
        cx.insert_before(method.node, format!("{wrapper}\n\n{indent}"));
        for import in [imports::FABRIC_ANNOTATIONS, imports::FABRIC_CONTRACT, imports::FABRIC_SHIM] {
            cx.require_import(import);
        }
        info!(method = %method.name, intent = descriptor.intent.annotation_type(), "synthesized transaction wrapper");
        self.wrapped.push(method.name.clone());
    }
}

impl Pass for TransactionWrapperSynthesizer<'_> {
    type Output = ();

    fn name(&self) -> &'static str {
        "transaction-wrapper-synthesizer"
    }

    fn description(&self) -> &'static str {
        "Adds Context-first transaction overloads with string-only parameters"
    }

    fn visit<'t>(&mut self, node: Node<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<()> {
        match node.syntax() {
            SyntaxKind::Program => self.visit_children(node, cx),
            SyntaxKind::ClassDeclaration => match TypeShape::of(node, cx.text()) {
                Some(class) => self.rewrite_class(&class, cx),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }
}
