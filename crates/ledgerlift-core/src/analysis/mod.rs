/*!
# Cross-file Analysis

Read-only passes and the tables they produce: key hints from the
requirements model, the entity catalog, entity-typed contract fields and
the transaction table. Tables are built once per run and handed to later
rewrite passes by reference.
*/

pub mod catalog;
pub mod entities;
pub mod hints;
pub mod transactions;

pub use catalog::{Catalog, CatalogBuilder, EntityDescriptor};
pub use entities::{
    declared_names, entity_reference, is_entity_class, EntityFieldCollector,
    EntityFieldOccurrence, EntityScanner, MemberIndex, SystemFieldCollector,
};
pub use hints::KeyHints;
pub use transactions::{InterfaceScanner, MutationIntent, TransactionDescriptor, TransactionTable};
