//! # Ledgerlift Core
//!
//! Rewriting engine that ports generated Java business programs to
//! Hyperledger Fabric chaincode, including:
//! - Java parsing glue and a token-anchored edit buffer
//! - A tree-walking pass framework with import synchronization
//! - Cross-file analyses (entity catalog, contract fields, transactions)
//! - Rewrite passes and the operation pipeline that sequences them
//!
//! The crate is library-first; the `ledgerlift` binary only wires the
//! pipeline to the command line.

#![warn(clippy::all)]

pub mod analysis;
pub mod parser;
pub mod pipeline;
pub mod rewrite;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use analysis::{Catalog, EntityDescriptor, KeyHints, TransactionTable};
pub use parser::{JavaParser, SourceFile};
pub use pipeline::{OperationReport, Pipeline, RunReport};
pub use rewrite::{EditBuffer, FileRewriter, ImportSynchronizer, Pass, RewriteContext};

/// Ledgerlift version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for ledgerlift components
///
/// `RUST_LOG` still wins for anything it names explicitly.
pub fn init_tracing(level: &str) {
    use tracing_subscriber::filter::{Directive, LevelFilter};

    let directive = format!("ledgerlift_core={level}")
        .parse::<Directive>()
        .unwrap_or_else(|_| LevelFilter::INFO.into());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .with_target(false)
        .init();
}

/// Where the generated project keeps each kind of source file, relative
/// to the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectLayout {
    pub entities_dir: PathBuf,
    pub services_dir: PathBuf,
    pub services_impl_dir: PathBuf,
    /// Class name of the runtime registry that owns all entity lists
    pub entity_manager: String,
    /// Implementation class that is never treated as a contract
    pub service_manager: String,
}

impl Default for ProjectLayout {
    fn default() -> Self {
        Self {
            entities_dir: "src/main/java/entities".into(),
            services_dir: "src/main/java/services".into(),
            services_impl_dir: "src/main/java/services/impl".into(),
            entity_manager: "EntityManager".to_string(),
            service_manager: "ServiceManager".to_string(),
        }
    }
}

/// Names given to generated members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConventions {
    /// Suffix of a singular shadow key field (`store` -> `storeKey`)
    pub key_suffix: String,
    /// Suffix of a list-valued shadow key field (`items` -> `itemsKeys`)
    pub keys_suffix: String,
    /// Preferred name of a synthesized identifier field
    pub synthetic_key: String,
}

impl Default for NamingConventions {
    fn default() -> Self {
        Self {
            key_suffix: "Key".to_string(),
            keys_suffix: "Keys".to_string(),
            synthetic_key: "guid".to_string(),
        }
    }
}

/// Shadow key written when an entity reference is set to null
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullKeyPolicy {
    /// Store a freshly generated identifier that matches no instance
    #[default]
    FreshIdentifier,
    /// Store null, so a cleared reference reads back as absent
    NullKey,
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Root of the generated Java project
    pub project_root: PathBuf,
    /// Requirements model carrying primary-key hints
    pub model_file: Option<PathBuf>,
    pub layout: ProjectLayout,
    pub naming: NamingConventions,
    pub null_key_policy: NullKeyPolicy,
    /// Exception thrown by a postcondition guard
    pub postcondition_exception: String,
    /// Parameter types that need quoting before deserialization
    pub date_types: Vec<String>,
    /// Commit each operation's changes with git
    pub commit_changes: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            project_root: ".".into(),
            model_file: None,
            layout: ProjectLayout::default(),
            naming: NamingConventions::default(),
            null_key_policy: NullKeyPolicy::default(),
            postcondition_exception: "PostconditionException".to_string(),
            date_types: vec!["LocalDate".to_string()],
            commit_changes: false,
        }
    }
}

impl RewriteConfig {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file; missing keys take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn with_model_file(mut self, model: impl Into<PathBuf>) -> Self {
        self.model_file = Some(model.into());
        self
    }

    pub fn entities_dir(&self) -> PathBuf {
        self.project_root.join(&self.layout.entities_dir)
    }

    pub fn services_dir(&self) -> PathBuf {
        self.project_root.join(&self.layout.services_dir)
    }

    pub fn services_impl_dir(&self) -> PathBuf {
        self.project_root.join(&self.layout.services_impl_dir)
    }

    pub fn entity_manager_file(&self) -> PathBuf {
        self.entities_dir()
            .join(format!("{}.java", self.layout.entity_manager))
    }

    /// Name of the interface whose getters declare process-wide fields,
    /// derived from the model file name (`CoCoME.remodel` -> `CoCoMESystem`).
    pub fn system_interface(&self) -> Option<String> {
        let stem = self.model_file.as_ref()?.file_stem()?.to_string_lossy();
        Some(format!("{stem}System"))
    }

    /// Reject configurations the pipeline cannot start from.
    pub fn validate(&self) -> Result<()> {
        if !self.project_root.is_dir() {
            return Err(RewriteError::Config(format!(
                "project root does not exist: {}",
                self.project_root.display()
            )));
        }
        if let Some(model) = &self.model_file {
            if !model.is_file() {
                return Err(RewriteError::Config(format!(
                    "model file does not exist: {}",
                    model.display()
                )));
            }
        }
        if self.naming.key_suffix.is_empty() || self.naming.keys_suffix.is_empty() {
            return Err(RewriteError::Config("key suffixes must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Error types for ledgerlift core operations
#[derive(thiserror::Error, Debug)]
pub enum RewriteError {
    /// File could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Source text did not parse cleanly
    #[error("Syntax error in {path} at line {line}")]
    Syntax { path: PathBuf, line: usize },

    /// A declaration shape the rewrite cannot target
    #[error("Unsupported shape in {path}: {detail}")]
    UnsupportedShape { path: PathBuf, detail: String },

    /// Two replacements claimed overlapping token ranges
    #[error("Edit error: {0}")]
    Edit(#[from] rewrite::EditError),

    /// Configuration file could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for ledgerlift core operations
pub type Result<T> = std::result::Result<T, RewriteError>;
