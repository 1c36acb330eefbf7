// Primary-key hints read from a requirements model.
//
// The model states identity constraints as OCL-like expressions such as
// `Store.allInstance()->isUnique(s:Store | s.Id)` or
// `Item.allInstance()->any(i:Item | i.Barcode = barcode)`; the bound
// variable's type and the attribute it ranges over name the key.

use std::path::Path;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::warn;

fn patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"\.allInstance\(\)->isUnique\((\w+):(\w+)\s*\|\s*(\w+)\.(\w+)\)")
                .expect("valid isUnique pattern"),
            Regex::new(r"\.allInstance\(\)->any\((\w+):(\w+)\s*\|\s*(\w+)\.(\w+)\s*=")
                .expect("valid any pattern"),
        ]
    })
}

/// Type name -> declared key field name, in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyHints {
    keys: IndexMap<String, String>,
}

impl KeyHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(model: &str) -> Self {
        let mut hints = Self::new();
        for pattern in patterns() {
            for caps in pattern.captures_iter(model) {
                // the attribute must be read off the bound variable
                if caps[1] != caps[3] {
                    continue;
                }
                hints.insert(&caps[2], &caps[4]);
            }
        }
        hints
    }

    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    /// First hint for a type wins; later different keys are reported and ignored.
    pub fn insert(&mut self, type_name: &str, key: &str) {
        match self.keys.get(type_name) {
            Some(existing) if existing != key => {
                warn!(
                    "{type_name} has primary key {existing}. Another primary key {key} will be ignored."
                );
            }
            Some(_) => {}
            None => {
                self.keys.insert(type_name.to_string(), key.to_string());
            }
        }
    }

    pub fn get(&self, type_name: &str) -> Option<&str> {
        self.keys.get(type_name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys.iter().map(|(t, k)| (t.as_str(), k.as_str()))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_both_constraint_shapes() {
        let model = r#"
            Contract ProcessSale::makeNewSale() {
                precondition: Store.allInstance()->isUnique(s:Store | s.Id)
                definition: item:Item = Item.allInstance()->any(i:Item | i.Barcode = barcode)
            }
        "#;
        let hints = KeyHints::parse(model);
        assert_eq!(hints.get("Store"), Some("Id"));
        assert_eq!(hints.get("Item"), Some("Barcode"));
        assert_eq!(hints.len(), 2);
    }

    #[test]
    fn first_key_wins() {
        let model = "A.allInstance()->isUnique(a:Cashier | a.Id) \
                     B.allInstance()->any(c:Cashier | c.Name = n)";
        let hints = KeyHints::parse(model);
        assert_eq!(hints.get("Cashier"), Some("Id"));
    }

    #[test]
    fn attribute_of_another_variable_is_ignored() {
        let hints = KeyHints::parse("X.allInstance()->any(a:Sale | b.Id = id)");
        assert!(hints.is_empty());
    }
}
