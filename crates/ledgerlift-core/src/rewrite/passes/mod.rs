/*!
# Chaincode Rewrite Passes

Concrete passes that port a generated Java business program to
Hyperledger Fabric chaincode. Each pass handles one concern and receives
the cross-file tables it needs through its constructor.

## Pass Categories

- **Entities**: `EntityAnnotator`, `GuidAdder`, `ShadowKeyInserter`,
  `KeyedAccessorRewriter`
- **Entity manager**: `EntityManagerRuntime`, `MemberAdder`
- **Contracts**: `ContractCleanup`, `ContractFieldNormalizer`,
  `TransactionWrapperSynthesizer`, `MutationTracker`
*/

pub mod contract_cleanup;
pub mod contract_fields;
pub mod entity_annotator;
pub mod entity_manager;
pub mod entity_references;
pub mod key_synthesizer;
pub mod members;
pub mod save_modified;
pub mod transaction_wrapper;

use tree_sitter::Node;

use crate::parser::syntax::TypeShape;

use super::RewriteContext;

pub use contract_cleanup::ContractCleanup;
pub use contract_fields::{ContractFieldNormalizer, KeyedContractField};
pub use entity_annotator::EntityAnnotator;
pub use entity_manager::EntityManagerRuntime;
pub use entity_references::{KeyedAccessorRewriter, ShadowKeyInserter, ShadowedField};
pub use key_synthesizer::GuidAdder;
pub use members::{GeneratedMember, MemberAdder};
pub use save_modified::{MethodMutations, MutationTracker};
pub use transaction_wrapper::TransactionWrapperSynthesizer;

pub(crate) mod imports {
    pub const FABRIC_ANNOTATIONS: &str = "org.hyperledger.fabric.contract.annotation.*";
    pub const FABRIC_CONTRACT: &str = "org.hyperledger.fabric.contract.*";
    pub const FABRIC_SHIM: &str = "org.hyperledger.fabric.shim.*";
    pub const CHAINCODE_STUB: &str = "org.hyperledger.fabric.shim.ChaincodeStub";
    pub const GENSON: &str = "com.owlike.genson.Genson";
    pub const GENSON_BUILDER: &str = "com.owlike.genson.GensonBuilder";
    pub const GENSON_ANNOTATIONS: &str = "com.owlike.genson.annotation.*";
    pub const CONVERTERS: &str = "converters.*";
    pub const JAVA_UTIL: &str = "java.util.*";
    pub const JAVA_STREAM: &str = "java.util.stream.*";
    pub const JAVA_CHARSET: &str = "java.nio.charset.StandardCharsets";
}

/// Indentation of a class's members: that of its first member, else one
/// tab deeper than the class itself.
pub(crate) fn member_indent(cx: &RewriteContext<'_>, class: &TypeShape<'_>) -> String {
    match class.members().first() {
        Some(member) => cx.indent_of(*member).to_string(),
        None => format!("{}\t", cx.indent_of(class.node)),
    }
}

/// Indentation of statements inside a method body
pub(crate) fn body_indent(cx: &RewriteContext<'_>, method: Node<'_>) -> String {
    format!("{}\t", cx.indent_of(method))
}
