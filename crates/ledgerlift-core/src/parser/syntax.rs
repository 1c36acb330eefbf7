/*!
# Java Syntax Kinds

Closed set of node kinds the rewrite passes dispatch on, plus shape
helpers that read declarations the way the generated projects write them.
*/

use tree_sitter::Node;

/// Node kinds of the Java grammar that passes care about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxKind {
    Program,
    PackageDeclaration,
    ImportDeclaration,
    ClassDeclaration,
    InterfaceDeclaration,
    EnumDeclaration,
    RecordDeclaration,
    AnnotationTypeDeclaration,
    ClassBody,
    InterfaceBody,
    FieldDeclaration,
    ConstantDeclaration,
    MethodDeclaration,
    ConstructorDeclaration,
    Modifiers,
    MarkerAnnotation,
    Annotation,
    FormalParameters,
    FormalParameter,
    SpreadParameter,
    VariableDeclarator,
    Block,
    ConstructorBody,
    LocalVariableDeclaration,
    ExpressionStatement,
    IfStatement,
    ThrowStatement,
    ReturnStatement,
    MethodInvocation,
    ArgumentList,
    FieldAccess,
    AssignmentExpression,
    BinaryExpression,
    UnaryExpression,
    ParenthesizedExpression,
    ObjectCreationExpression,
    LambdaExpression,
    InferredParameters,
    CatchFormalParameter,
    EnhancedForStatement,
    MethodReference,
    Identifier,
    TypeIdentifier,
    This,
    True,
    False,
    StringLiteral,
    LineComment,
    BlockComment,
    Other,
}

impl SyntaxKind {
    pub fn of(node: &Node<'_>) -> Self {
        match node.kind() {
            "program" => Self::Program,
            "package_declaration" => Self::PackageDeclaration,
            "import_declaration" => Self::ImportDeclaration,
            "class_declaration" => Self::ClassDeclaration,
            "interface_declaration" => Self::InterfaceDeclaration,
            "enum_declaration" => Self::EnumDeclaration,
            "record_declaration" => Self::RecordDeclaration,
            "annotation_type_declaration" => Self::AnnotationTypeDeclaration,
            "class_body" => Self::ClassBody,
            "interface_body" => Self::InterfaceBody,
            "field_declaration" => Self::FieldDeclaration,
            "constant_declaration" => Self::ConstantDeclaration,
            "method_declaration" => Self::MethodDeclaration,
            "constructor_declaration" => Self::ConstructorDeclaration,
            "modifiers" => Self::Modifiers,
            "marker_annotation" => Self::MarkerAnnotation,
            "annotation" => Self::Annotation,
            "formal_parameters" => Self::FormalParameters,
            "formal_parameter" => Self::FormalParameter,
            "spread_parameter" => Self::SpreadParameter,
            "variable_declarator" => Self::VariableDeclarator,
            "block" => Self::Block,
            "constructor_body" => Self::ConstructorBody,
            "local_variable_declaration" => Self::LocalVariableDeclaration,
            "expression_statement" => Self::ExpressionStatement,
            "if_statement" => Self::IfStatement,
            "throw_statement" => Self::ThrowStatement,
            "return_statement" => Self::ReturnStatement,
            "method_invocation" => Self::MethodInvocation,
            "argument_list" => Self::ArgumentList,
            "field_access" => Self::FieldAccess,
            "assignment_expression" => Self::AssignmentExpression,
            "binary_expression" => Self::BinaryExpression,
            "unary_expression" => Self::UnaryExpression,
            "parenthesized_expression" => Self::ParenthesizedExpression,
            "object_creation_expression" => Self::ObjectCreationExpression,
            "lambda_expression" => Self::LambdaExpression,
            "inferred_parameters" => Self::InferredParameters,
            "catch_formal_parameter" => Self::CatchFormalParameter,
            "enhanced_for_statement" => Self::EnhancedForStatement,
            "method_reference" => Self::MethodReference,
            "identifier" => Self::Identifier,
            "type_identifier" => Self::TypeIdentifier,
            "this" => Self::This,
            "true" => Self::True,
            "false" => Self::False,
            "string_literal" => Self::StringLiteral,
            "line_comment" => Self::LineComment,
            "block_comment" => Self::BlockComment,
            _ => Self::Other,
        }
    }

    pub fn is_type_declaration(self) -> bool {
        matches!(
            self,
            Self::ClassDeclaration
                | Self::InterfaceDeclaration
                | Self::EnumDeclaration
                | Self::RecordDeclaration
                | Self::AnnotationTypeDeclaration
        )
    }
}

/// Convenience accessors on tree-sitter nodes
pub trait NodeExt<'t>: Sized {
    fn syntax(&self) -> SyntaxKind;
    fn field(&self, name: &str) -> Option<Node<'t>>;
    fn child_nodes(&self) -> Vec<Node<'t>>;
    fn named_child_nodes(&self) -> Vec<Node<'t>>;
    fn children_of(&self, kind: SyntaxKind) -> Vec<Node<'t>>;
    fn first_child_of(&self, kind: SyntaxKind) -> Option<Node<'t>>;
    /// Whether this node fills `field` of its parent
    fn is_parent_field(&self, field: &str) -> bool;
    fn text<'s>(&self, source: &'s str) -> &'s str;
    /// Node text with all whitespace removed
    fn compact_text(&self, source: &str) -> String;
}

impl<'t> NodeExt<'t> for Node<'t> {
    fn syntax(&self) -> SyntaxKind {
        SyntaxKind::of(self)
    }

    fn field(&self, name: &str) -> Option<Node<'t>> {
        self.child_by_field_name(name)
    }

    fn child_nodes(&self) -> Vec<Node<'t>> {
        let mut cursor = self.walk();
        self.children(&mut cursor).collect()
    }

    fn named_child_nodes(&self) -> Vec<Node<'t>> {
        let mut cursor = self.walk();
        self.named_children(&mut cursor).collect()
    }

    fn children_of(&self, kind: SyntaxKind) -> Vec<Node<'t>> {
        self.named_child_nodes()
            .into_iter()
            .filter(|c| c.syntax() == kind)
            .collect()
    }

    fn first_child_of(&self, kind: SyntaxKind) -> Option<Node<'t>> {
        self.named_child_nodes().into_iter().find(|c| c.syntax() == kind)
    }

    fn is_parent_field(&self, field: &str) -> bool {
        let Some(parent) = self.parent() else {
            return false;
        };
        let mut cursor = parent.walk();
        let found = parent
            .children_by_field_name(field, &mut cursor)
            .any(|n| n.id() == self.id());
        found
    }

    fn text<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.start_byte()..self.end_byte()).unwrap_or("")
    }

    fn compact_text(&self, source: &str) -> String {
        self.text(source).chars().filter(|c| !c.is_whitespace()).collect()
    }
}

/// Modifier keywords and annotation names of a declaration
#[derive(Debug, Clone, Default)]
pub struct Modifiers {
    pub keywords: Vec<String>,
    pub annotations: Vec<String>,
}

impl Modifiers {
    pub fn of(decl: Node<'_>, source: &str) -> Self {
        let mut modifiers = Self::default();
        let Some(node) = decl.first_child_of(SyntaxKind::Modifiers) else {
            return modifiers;
        };
        for child in node.child_nodes() {
            match child.syntax() {
                SyntaxKind::MarkerAnnotation | SyntaxKind::Annotation => {
                    if let Some(name) = child.field("name") {
                        let name = name.text(source);
                        let simple = name.rsplit('.').next().unwrap_or(name);
                        modifiers.annotations.push(simple.to_string());
                    }
                }
                _ => modifiers.keywords.push(child.text(source).to_string()),
            }
        }
        modifiers
    }

    pub fn has(&self, keyword: &str) -> bool {
        self.keywords.iter().any(|k| k == keyword)
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotations.iter().any(|a| a == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamShape {
    pub ty: String,
    pub name: String,
}

/// A method declaration read into plain strings
#[derive(Debug, Clone)]
pub struct MethodShape<'t> {
    pub node: Node<'t>,
    pub name: String,
    pub return_type: String,
    pub params: Vec<ParamShape>,
    pub throws: Vec<String>,
    pub modifiers: Modifiers,
    pub body: Option<Node<'t>>,
}

impl<'t> MethodShape<'t> {
    pub fn of(node: Node<'t>, source: &str) -> Option<Self> {
        if node.syntax() != SyntaxKind::MethodDeclaration {
            return None;
        }
        let name = node.field("name")?.text(source).to_string();
        let return_type = node.field("type")?.compact_text(source);
        let params = node
            .field("parameters")
            .map(|p| params_of(p, source))
            .unwrap_or_default();
        let throws = node
            .named_child_nodes()
            .into_iter()
            .find(|c| c.kind() == "throws")
            .map(|t| {
                t.named_child_nodes()
                    .iter()
                    .map(|ty| ty.compact_text(source))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            node,
            name,
            return_type,
            params,
            throws,
            modifiers: Modifiers::of(node, source),
            body: node.field("body"),
        })
    }

    pub fn is_void(&self) -> bool {
        self.return_type == "void"
    }

    /// `getX()` returning a value
    pub fn is_conventional_getter(&self) -> bool {
        self.name.starts_with("get") && self.params.is_empty() && !self.is_void()
    }

    /// `void setX(value)`
    pub fn is_conventional_setter(&self) -> bool {
        self.name.starts_with("set") && self.params.len() == 1 && self.is_void()
    }

    /// `name(type,type)` used to detect already-present members
    pub fn signature(&self) -> String {
        let types: Vec<&str> = self.params.iter().map(|p| p.ty.as_str()).collect();
        format!("{}({})", self.name, types.join(","))
    }
}

fn params_of(params: Node<'_>, source: &str) -> Vec<ParamShape> {
    params
        .named_child_nodes()
        .into_iter()
        .filter_map(|p| match p.syntax() {
            SyntaxKind::FormalParameter => Some(ParamShape {
                ty: p.field("type")?.compact_text(source),
                name: p.field("name")?.text(source).to_string(),
            }),
            SyntaxKind::SpreadParameter => {
                let ty = p
                    .named_child_nodes()
                    .into_iter()
                    .find(|c| c.syntax() != SyntaxKind::Modifiers)?;
                let declarator = p.first_child_of(SyntaxKind::VariableDeclarator)?;
                Some(ParamShape {
                    ty: format!("{}...", ty.compact_text(source)),
                    name: declarator.field("name")?.text(source).to_string(),
                })
            }
            _ => None,
        })
        .collect()
}

/// A field (or local variable) declaration
#[derive(Debug, Clone)]
pub struct FieldShape<'t> {
    pub node: Node<'t>,
    pub ty: String,
    pub declarators: Vec<Node<'t>>,
    pub names: Vec<String>,
    pub modifiers: Modifiers,
}

impl<'t> FieldShape<'t> {
    pub fn of(node: Node<'t>, source: &str) -> Option<Self> {
        if !matches!(
            node.syntax(),
            SyntaxKind::FieldDeclaration
                | SyntaxKind::ConstantDeclaration
                | SyntaxKind::LocalVariableDeclaration
        ) {
            return None;
        }
        let ty = node.field("type")?.compact_text(source);
        let mut cursor = node.walk();
        let declarators: Vec<Node<'t>> = node
            .children_by_field_name("declarator", &mut cursor)
            .collect();
        let names = declarators
            .iter()
            .filter_map(|d| d.field("name"))
            .map(|n| n.text(source).to_string())
            .collect();

        Some(Self {
            node,
            ty,
            declarators,
            names,
            modifiers: Modifiers::of(node, source),
        })
    }

    /// Name of a single-declarator field
    pub fn single_name(&self) -> Option<&str> {
        match self.names.as_slice() {
            [name] => Some(name),
            _ => None,
        }
    }

    pub fn is_private(&self) -> bool {
        self.modifiers.has("private")
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.has("static")
    }
}

/// A class or interface declaration
#[derive(Debug, Clone)]
pub struct TypeShape<'t> {
    pub node: Node<'t>,
    pub name: String,
    pub is_interface: bool,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub modifiers: Modifiers,
    pub body: Option<Node<'t>>,
}

impl<'t> TypeShape<'t> {
    pub fn of(node: Node<'t>, source: &str) -> Option<Self> {
        let is_interface = match node.syntax() {
            SyntaxKind::ClassDeclaration => false,
            SyntaxKind::InterfaceDeclaration => true,
            _ => return None,
        };
        let name = node.field("name")?.text(source).to_string();
        let superclass = node
            .field("superclass")
            .and_then(|s| s.named_child_nodes().into_iter().next())
            .map(|t| base_type_name(&t.compact_text(source)).to_string());
        let interfaces = node
            .field("interfaces")
            .and_then(|i| i.named_child_nodes().into_iter().next())
            .map(|list| {
                list.named_child_nodes()
                    .iter()
                    .map(|t| t.compact_text(source))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            node,
            name,
            is_interface,
            superclass,
            interfaces,
            modifiers: Modifiers::of(node, source),
            body: node.field("body"),
        })
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces
            .iter()
            .any(|i| base_type_name(i) == interface)
    }

    pub fn members(&self) -> Vec<Node<'t>> {
        self.body.map(|b| b.named_child_nodes()).unwrap_or_default()
    }

    pub fn methods(&self, source: &str) -> Vec<MethodShape<'t>> {
        self.members()
            .into_iter()
            .filter_map(|m| MethodShape::of(m, source))
            .collect()
    }

    pub fn fields(&self, source: &str) -> Vec<FieldShape<'t>> {
        self.members()
            .into_iter()
            .filter_map(|m| FieldShape::of(m, source))
            .collect()
    }
}

/// Top-level type declarations of a compilation unit
pub fn type_declarations<'t>(root: Node<'t>, source: &str) -> Vec<TypeShape<'t>> {
    root.named_child_nodes()
        .into_iter()
        .filter_map(|n| TypeShape::of(n, source))
        .collect()
}

/// `List<Item>` -> `Item`
pub fn list_element_type(ty: &str) -> Option<&str> {
    let inner = ty.strip_prefix("List<")?.strip_suffix('>')?;
    let is_simple = !inner.is_empty() && inner.chars().all(|c| c.is_alphanumeric() || c == '_');
    is_simple.then_some(inner)
}

/// Type name without generic arguments or package qualifier
pub fn base_type_name(ty: &str) -> &str {
    let raw = ty.split('<').next().unwrap_or(ty);
    raw.rsplit('.').next().unwrap_or(raw)
}

pub const PRIMITIVE_TYPES: [&str; 8] = [
    "byte", "short", "int", "long", "float", "double", "boolean", "char",
];

pub fn is_primitive_or_string(ty: &str) -> bool {
    ty == "String" || PRIMITIVE_TYPES.contains(&ty)
}

/// Reference type usable as a generic argument
pub fn boxed_type(ty: &str) -> &str {
    match ty {
        "byte" => "Byte",
        "short" => "Short",
        "int" => "Integer",
        "long" => "Long",
        "float" => "Float",
        "double" => "Double",
        "boolean" => "Boolean",
        "char" => "Character",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::JavaParser;

    #[test]
    fn reads_method_shape() {
        let text = "interface S {\n  boolean addFooObject(Context ctx, Foo o) throws IOException, X;\n}\n";
        let mut parser = JavaParser::new().unwrap();
        let source = parser.parse("S.java", text.to_string()).unwrap();
        let types = type_declarations(source.root(), source.text());
        assert_eq!(types.len(), 1);
        assert!(types[0].is_interface);

        let methods = types[0].methods(source.text());
        let m = &methods[0];
        assert_eq!(m.name, "addFooObject");
        assert_eq!(m.return_type, "boolean");
        assert_eq!(m.params[1], ParamShape { ty: "Foo".into(), name: "o".into() });
        assert_eq!(m.throws, vec!["IOException".to_string(), "X".to_string()]);
        assert_eq!(m.signature(), "addFooObject(Context,Foo)");
        assert!(m.body.is_none());
    }

    #[test]
    fn reads_class_and_fields() {
        let text = "public class Sale extends Base implements Serializable {\n  @Id private List<Item> items;\n  int a, b;\n}\n";
        let mut parser = JavaParser::new().unwrap();
        let source = parser.parse("Sale.java", text.to_string()).unwrap();
        let class = &type_declarations(source.root(), source.text())[0];
        assert_eq!(class.superclass.as_deref(), Some("Base"));
        assert!(class.implements("Serializable"));
        assert!(class.modifiers.has("public"));

        let fields = class.fields(source.text());
        assert_eq!(fields[0].ty, "List<Item>");
        assert!(fields[0].is_private());
        assert!(fields[0].modifiers.has_annotation("Id"));
        assert_eq!(fields[0].single_name(), Some("items"));
        assert_eq!(fields[1].names, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(fields[1].single_name(), None);
    }

    #[test]
    fn type_helpers() {
        assert_eq!(list_element_type("List<Item>"), Some("Item"));
        assert_eq!(list_element_type("List<Map<A,B>>"), None);
        assert_eq!(base_type_name("java.util.List<Item>"), "List");
        assert_eq!(boxed_type("int"), "Integer");
        assert_eq!(boxed_type("String"), "String");
        assert!(is_primitive_or_string("char"));
        assert!(!is_primitive_or_string("LocalDate"));
    }
}
