/*!
# Entity Catalog

Cross-file table from entity type name to its primary key. Built once
per run by [`CatalogBuilder`], then handed read-only to every later pass.
*/

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::parser::syntax::{boxed_type, list_element_type, type_declarations};
use crate::rewrite::format::{lower_first, upper_first};
use crate::rewrite::FileRewriter;

use super::hints::KeyHints;

/// Primary key of one entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub type_name: String,
    pub key_field: String,
    pub key_type: String,
}

impl EntityDescriptor {
    pub fn new(
        type_name: impl Into<String>,
        key_field: impl Into<String>,
        key_type: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            key_field: key_field.into(),
            key_type: key_type.into(),
        }
    }

    /// Getter reading the key off an instance
    pub fn key_accessor(&self) -> String {
        format!("get{}", upper_first(&self.key_field))
    }

    /// Key type usable in generic positions and null checks
    pub fn boxed_key_type(&self) -> &str {
        boxed_type(&self.key_type)
    }

    /// `EntityManager` method resolving a key to an instance
    pub fn resolver(&self) -> String {
        format!("get{}ByKey", self.type_name)
    }
}

/// Read-only entity type -> key table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: BTreeMap<String, EntityDescriptor>,
}

impl Catalog {
    pub fn get(&self, type_name: &str) -> Option<&EntityDescriptor> {
        self.entries.get(type_name)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptors in type-name order
    pub fn iter(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entries.values()
    }

    pub fn type_names(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }

    /// Descriptor for a declared field type (`T` or `List<T>`)
    pub fn reference(&self, ty: &str) -> Option<(&EntityDescriptor, bool)> {
        if let Some(descriptor) = self.entries.get(ty) {
            return Some((descriptor, false));
        }
        let inner = list_element_type(ty)?;
        self.entries.get(inner).map(|d| (d, true))
    }
}

/// Mutable staging area for a [`Catalog`]
pub struct CatalogBuilder {
    entities_dir: PathBuf,
    entries: BTreeMap<String, EntityDescriptor>,
    dropped: BTreeSet<String>,
}

impl CatalogBuilder {
    pub fn new(entities_dir: impl Into<PathBuf>) -> Self {
        Self {
            entities_dir: entities_dir.into(),
            entries: BTreeMap::new(),
            dropped: BTreeSet::new(),
        }
    }

    /// Resolve each hinted key through the class and its superclass chain.
    /// Unresolvable hints drop their type for this run.
    pub fn resolve_hints(&mut self, hints: &KeyHints, rewriter: &mut FileRewriter) {
        for (type_name, key) in hints.iter() {
            match self.find_field_type(rewriter, type_name, key) {
                Some((field, ty)) => {
                    debug!(entity = type_name, key = %field, ty = %ty, "resolved key hint");
                    self.register(EntityDescriptor::new(type_name, field, ty));
                }
                None => {
                    warn!(
                        entity = type_name,
                        key, "key field not found in class or ancestors; type left out of catalog"
                    );
                    self.dropped.insert(type_name.to_string());
                }
            }
        }
    }

    /// Find a field's declared type, walking `extends` links. The key name
    /// may have had its first letter lowered by entity annotation.
    pub fn find_field_type(
        &self,
        rewriter: &mut FileRewriter,
        type_name: &str,
        field: &str,
    ) -> Option<(String, String)> {
        let candidates = [field.to_string(), lower_first(field)];
        let mut visited = HashSet::new();
        let mut current = Some(type_name.to_string());

        while let Some(class_name) = current.take() {
            if !visited.insert(class_name.clone()) {
                warn!(entity = type_name, "cyclic superclass chain at {class_name}");
                return None;
            }
            let path = self.class_file(&class_name);
            let source = match rewriter.parse(&path) {
                Ok(source) => source,
                Err(e) => {
                    debug!(class = %class_name, "cannot read class: {e}");
                    return None;
                }
            };
            let text = source.text();
            let class = type_declarations(source.root(), text)
                .into_iter()
                .find(|t| t.name == class_name)?;

            for decl in class.fields(text) {
                if let Some(name) = decl.names.iter().find(|n| candidates.contains(n)) {
                    return Some((name.clone(), decl.ty.clone()));
                }
            }
            current = class.superclass.clone();
        }
        None
    }

    fn class_file(&self, class_name: &str) -> PathBuf {
        self.entities_dir.join(format!("{class_name}.java"))
    }

    pub fn entities_dir(&self) -> &Path {
        &self.entities_dir
    }

    /// Add a descriptor unless the type already has one
    pub fn register(&mut self, descriptor: EntityDescriptor) -> bool {
        if self.entries.contains_key(&descriptor.type_name) {
            return false;
        }
        self.entries.insert(descriptor.type_name.clone(), descriptor);
        true
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.contains_key(type_name)
    }

    /// Whether a hint for this type failed to resolve
    pub fn was_dropped(&self, type_name: &str) -> bool {
        self.dropped.contains(type_name)
    }

    pub fn build(self) -> Catalog {
        Catalog {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn descriptor_names() {
        let d = EntityDescriptor::new("Store", "storeId", "int");
        assert_eq!(d.key_accessor(), "getStoreId");
        assert_eq!(d.boxed_key_type(), "Integer");
        assert_eq!(d.resolver(), "getStoreByKey");
    }

    #[test]
    fn resolves_key_on_superclass() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("Person.java"),
            "public class Person implements Serializable {\n  private String Id;\n}\n",
        )?;
        fs::write(
            dir.path().join("Cashier.java"),
            "public class Cashier extends Person implements Serializable {\n  private String name;\n}\n",
        )?;

        let mut hints = KeyHints::new();
        hints.insert("Cashier", "Id");
        hints.insert("Ghost", "Id");

        let mut rewriter = FileRewriter::new()?;
        let mut builder = CatalogBuilder::new(dir.path());
        builder.resolve_hints(&hints, &mut rewriter);
        assert!(builder.was_dropped("Ghost"));
        assert!(!builder.register(EntityDescriptor::new("Cashier", "x", "int")));

        let catalog = builder.build();
        assert_eq!(catalog.len(), 1);
        assert_eq!(
            catalog.get("Cashier"),
            Some(&EntityDescriptor::new("Cashier", "Id", "String"))
        );
        Ok(())
    }

    #[test]
    fn reference_detects_lists() {
        let mut builder = CatalogBuilder::new(".");
        builder.register(EntityDescriptor::new("Item", "barcode", "int"));
        let catalog = builder.build();
        assert!(matches!(catalog.reference("Item"), Some((_, false))));
        assert!(matches!(catalog.reference("List<Item>"), Some((_, true))));
        assert!(catalog.reference("Set<Item>").is_none());
    }
}
