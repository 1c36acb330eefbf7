/*!
# Entity Manager Runtime

Turns the in-memory `EntityManager` registry into one backed by the
ledger's world state. Each entity list is stored as JSON under the
entity's simple class name; `setStub` is called at the start of every
transaction and drops whatever the previous transaction loaded.
*/

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;
use tree_sitter::Node;

use crate::analysis::{Catalog, MemberIndex};
use crate::parser::syntax::{list_element_type, MethodShape, TypeShape};
use crate::parser::{NodeExt, SyntaxKind};
use crate::rewrite::format::member_block;
use crate::rewrite::{Pass, RewriteContext, TransformResult};

use super::members::{append_members, GeneratedMember};
use super::{imports, member_indent};

fn object_method_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(add|delete)(\w+)Object$").expect("valid object method pattern"))
}

const LOAD_LIST: &str = "\
private static <T> List<T> loadList(Class<T> clazz) {
\tString key = clazz.getSimpleName();
\tList<T> list = AllInstance.get(key);
\tif (list == null || list.size() == 0) {
\t\tString json = stub.getStringState(key);
\t\tif (json != null && !json.isEmpty())
\t\t\tlist = GensonHelper.deserializeList(genson, json, clazz);
\t\telse
\t\t\tlist = new LinkedList<>();
\t\tAllInstance.put(key, list);
\t}
\treturn list;
}";

const GET_ALL_INSTANCES_OF: &str = "\
public static <T> List<T> getAllInstancesOf(Class<T> clazz) {
\treturn loadList(clazz);
}";

const GET_STUB: &str = "\
public static ChaincodeStub getStub() {
\treturn stub;
}";

const GET_RANDOM: &str = "\
public static Random getRandom() {
\tif (random == null)
\t\trandom = new Random(getStub().getTxTimestamp().toEpochMilli());
\treturn random;
}";

const GET_GUID: &str = "\
public static String getGuid() {
\treturn UUID.nameUUIDFromBytes(Long.toString(getRandom().nextLong()).getBytes(StandardCharsets.UTF_8)).toString();
}";

const SAVE_MODIFIED: &str = "\
public static <T> boolean saveModified(Class<T> clazz) {
\tList<T> list = loadList(clazz);
\tString json = genson.serialize(list);
\tstub.putStringState(clazz.getSimpleName(), json);
\treturn true;
}";

/// `saveModified(Class<T>)`, persisting a whole entity list
pub fn save_modified_member() -> GeneratedMember {
    GeneratedMember::method("saveModified", SAVE_MODIFIED)
}

/// `get<T>ByKey(Object key)` for every catalogued type, in type order
pub fn key_resolver_members(catalog: &Catalog, manager: &str) -> Vec<GeneratedMember> {
    catalog
        .iter()
        .map(|entity| {
            let template = format!(
                "public static {ty} {resolver}(Object key) {{\n\
                 \tif (key == null)\n\
                 \t\treturn null;\n\
                 \tfor (var candidate : {manager}.getAllInstancesOf({ty}.class)) {{\n\
                 \t\tif (Objects.equals(candidate.{accessor}(), key))\n\
                 \t\t\treturn candidate;\n\
                 \t}}\n\
                 \treturn null;\n\
                 }}",
                ty = entity.type_name,
                resolver = entity.resolver(),
                accessor = entity.key_accessor(),
            );
            GeneratedMember::method(entity.resolver(), template)
                .with_signature(format!("{}(Object)", entity.resolver()))
        })
        .collect()
}

/// Adds world-state persistence to the entity manager class
pub struct EntityManagerRuntime {
    class_name: String,
    /// `addXObject`/`deleteXObject` methods whose bodies were replaced
    pub persisted_methods: Vec<String>,
    /// Runtime members that were missing and got added
    pub added_members: Vec<String>,
}

impl EntityManagerRuntime {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            persisted_methods: Vec::new(),
            added_members: Vec::new(),
        }
    }

    fn prepare<'t>(&mut self, class: &TypeShape<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<()> {
        let Some(body) = class.body else {
            return Ok(());
        };
        let index = MemberIndex::of_type(class, cx.text());
        let indent = member_indent(cx, class);

        let mut head = String::new();
        if !index.has_field("genson") {
            head.push_str(&format!("\n{indent}private static final Genson genson = new Genson();\n"));
            self.added_members.push("genson".to_string());
        }
        if !index.has_field("stub") {
            head.push_str(&format!("\n{indent}private static ChaincodeStub stub;\n"));
            self.added_members.push("stub".to_string());
        }
        if !head.is_empty() {
            cx.insert_after_open_brace(body, head);
        }

        for method in class.methods(cx.text()) {
            self.persist_object_method(&method, cx)?;
        }

        let members = vec![
            GeneratedMember::method("loadList", LOAD_LIST),
            GeneratedMember::method("getAllInstancesOf", GET_ALL_INSTANCES_OF)
                .with_signature("getAllInstancesOf(Class<T>)"),
            GeneratedMember::method("getStub", GET_STUB),
            GeneratedMember::method("setStub", self.set_stub_template(class, &index, cx.text())),
            GeneratedMember::field("random", "private static Random random;"),
            GeneratedMember::method("getRandom", GET_RANDOM),
            GeneratedMember::method("getGuid", GET_GUID),
        ];
        let added = append_members(cx, class, &index, &members);
        self.added_members.extend(added);

        if !self.added_members.is_empty() || !self.persisted_methods.is_empty() {
            for import in [imports::GENSON, imports::CHAINCODE_STUB, imports::JAVA_UTIL, imports::JAVA_CHARSET] {
                cx.require_import(import);
            }
        }
        Ok(())
    }

    /// `setStub` resets every entity list so the next `loadList` reads
    /// the new transaction's state.
    fn set_stub_template(&self, class: &TypeShape<'_>, index: &MemberIndex, text: &str) -> String {
        let mut lists: Vec<(String, String)> = class
            .fields(text)
            .into_iter()
            .filter_map(|f| {
                let element = list_element_type(&f.ty)?.to_string();
                Some((f.single_name()?.to_string(), element))
            })
            .collect();
        lists.sort();

        let mut lines = vec![
            "public static void setStub(ChaincodeStub stub) {".to_string(),
            format!("\t{}.stub = stub;", self.class_name),
            "\trandom = null;".to_string(),
        ];
        if !lists.is_empty() {
            lines.push(String::new());
            lines.extend(lists.iter().map(|(name, _)| format!("\t{name} = new LinkedList<>();")));
            if index.has_field("AllInstance") {
                lines.push(String::new());
                lines.extend(
                    lists
                        .iter()
                        .map(|(name, ty)| format!("\tAllInstance.put(\"{ty}\", {name});")),
                );
            }
        }
        lines.push("}".to_string());
        lines.join("\n")
    }

    /// Replace `boolean addXObject(X o)` and `deleteXObject(X o)` bodies
    /// with a load-mutate-store sequence on the list of `X`.
    fn persist_object_method<'t>(
        &mut self,
        method: &MethodShape<'t>,
        cx: &mut RewriteContext<'t>,
    ) -> TransformResult<()> {
        let (Some(body), [param]) = (method.body, method.params.as_slice()) else {
            return Ok(());
        };
        if method.return_type != "boolean" {
            return Ok(());
        }
        let Some(caps) = object_method_pattern().captures(&method.name) else {
            return Ok(());
        };
        let ty = &caps[2];
        if param.ty != ty || cx.node_text(body).contains("putStringState") {
            return Ok(());
        }

        let mutation = if &caps[1] == "add" { "add" } else { "remove" };
        let template = format!(
            "{{\n\
             \tList<{ty}> list = loadList({ty}.class);\n\
             \tif (list.{mutation}({o})) {{\n\
             \t\tString json = genson.serialize(list);\n\
             \t\tstub.putStringState(\"{ty}\", json);\n\
             \t\treturn true;\n\
             \t}} else\n\
             \t\treturn false;\n\
             }}",
            o = param.name,
        );
        let indent = cx.indent_of(method.node);
        cx.replace(body, member_block(&template, indent))?;
        debug!(method = %method.name, "persisting object method");
        self.persisted_methods.push(method.name.clone());
        Ok(())
    }
}

impl Pass for EntityManagerRuntime {
    type Output = ();

    fn name(&self) -> &'static str {
        "entity-manager-runtime"
    }

    fn description(&self) -> &'static str {
        "Backs the entity manager's lists with world-state reads and writes"
    }

    fn visit<'t>(&mut self, node: Node<'t>, cx: &mut RewriteContext<'t>) -> TransformResult<()> {
        match node.syntax() {
            SyntaxKind::Program => self.visit_children(node, cx),
            SyntaxKind::ClassDeclaration => match TypeShape::of(node, cx.text()) {
                Some(class) if class.name == self.class_name => self.prepare(&class, cx),
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }
}
