/*!
# Pipeline - Operation Driver

Runs the chaincode migration over one generated project as a fixed
sequence of operations. Each operation reads the files it targets fresh
from disk, so edits from earlier operations are always re-parsed before
the next one looks at them.

## Operations

1. `annotate_entities` - Fabric data annotations, entity name set
2. `prepare_entity_manager` - ledger-backed registry runtime
3. `build_catalog` - primary keys from hints, synthesized identifiers
4. `add_key_resolvers` - by-key lookups on the registry
5. `normalize_entity_references` - shadow keys in entity classes
6. `clean_up_contracts` - `refresh()` removal, class-token lookups
7. `normalize_contract_fields` - ledger-backed contract fields
8. `synthesize_transaction_wrappers` - Fabric transaction entry points
9. `track_mutations` - persistence calls joined into postconditions
10. `restore_line_endings` - original line-ending style for every touched file

Per-file failures are logged and counted in the operation's report; only
an invalid configuration stops a run before it starts.
*/

pub mod vcs;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::analysis::{
    Catalog, CatalogBuilder, EntityFieldCollector, EntityFieldOccurrence, EntityScanner,
    InterfaceScanner, KeyHints, SystemFieldCollector, TransactionTable,
};
use crate::rewrite::passes::entity_manager::{key_resolver_members, save_modified_member};
use crate::rewrite::passes::imports::JAVA_UTIL;
use crate::rewrite::passes::{
    ContractCleanup, ContractFieldNormalizer, EntityAnnotator, EntityManagerRuntime, GuidAdder,
    KeyedAccessorRewriter, MemberAdder, MutationTracker, ShadowKeyInserter,
    TransactionWrapperSynthesizer,
};
use crate::rewrite::{FileRewriter, RewriteSummary};
use crate::{RewriteConfig, RewriteError};

pub use vcs::{ChangeRecorder, GitRecorder, NoopRecorder};

/// Changed files and per-file errors of one operation
#[derive(Debug, Clone, Default)]
pub struct OperationReport {
    pub name: String,
    pub changed: Vec<PathBuf>,
    pub errors: Vec<String>,
}

impl OperationReport {
    fn from_summary(name: &str, summary: RewriteSummary) -> Self {
        Self {
            name: name.to_string(),
            changed: summary.changed,
            errors: summary.errors,
        }
    }
}

/// Everything one run produced
#[derive(Debug, Default)]
pub struct RunReport {
    pub operations: Vec<OperationReport>,
    /// Entity class names found by annotation
    pub entities: BTreeSet<String>,
    pub catalog: Catalog,
    pub transactions: TransactionTable,
}

impl RunReport {
    pub fn operation(&self, name: &str) -> Option<&OperationReport> {
        self.operations.iter().find(|op| op.name == name)
    }

    /// Every file changed by any operation, in first-changed order
    pub fn changed_files(&self) -> Vec<&Path> {
        let mut seen = BTreeSet::new();
        self.operations
            .iter()
            .flat_map(|op| op.changed.iter())
            .filter(|path| seen.insert(path.as_path()))
            .map(PathBuf::as_path)
            .collect()
    }

    pub fn error_count(&self) -> usize {
        self.operations.iter().map(|op| op.errors.len()).sum()
    }
}

/// Commit messages of the recorded operations
const MESSAGES: &[(&str, &str)] = &[
    ("annotate_entities", "Annotate entity classes for Fabric"),
    ("prepare_entity_manager", "Back the entity manager with ledger state"),
    ("build_catalog", "Add identifiers to entities without a primary key"),
    ("add_key_resolvers", "Add by-key entity resolvers"),
    ("normalize_entity_references", "Store entity references by primary key"),
    ("clean_up_contracts", "Remove refresh from contracts"),
    ("normalize_contract_fields", "Store contract fields in ledger state"),
    ("synthesize_transaction_wrappers", "Add transaction entry points"),
    ("track_mutations", "Persist modified entities before postconditions"),
    ("restore_line_endings", "Restore line endings"),
];

/// Sequences the rewrite operations over one project
pub struct Pipeline {
    config: RewriteConfig,
    rewriter: FileRewriter,
    recorder: Box<dyn ChangeRecorder>,
    touched: Vec<PathBuf>,
}

impl Pipeline {
    /// Validate the configuration and set up the parser
    pub fn new(config: RewriteConfig) -> crate::Result<Self> {
        config.validate()?;
        let rewriter = FileRewriter::new()
            .map_err(|e| RewriteError::Config(format!("cannot initialize the Java parser: {e:#}")))?;
        let recorder: Box<dyn ChangeRecorder> = if config.commit_changes {
            Box::new(GitRecorder::new(config.project_root.clone()))
        } else {
            Box::new(NoopRecorder)
        };
        Ok(Self {
            config,
            rewriter,
            recorder,
            touched: Vec::new(),
        })
    }

    pub fn with_recorder(mut self, recorder: Box<dyn ChangeRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }

    pub fn rewriter(&self) -> &FileRewriter {
        &self.rewriter
    }

    /// Run every operation in order
    pub fn run(&mut self) -> RunReport {
        info!(root = %self.config.project_root.display(), "starting chaincode migration");
        let mut report = RunReport::default();

        let mut summary = RewriteSummary::new();
        let entity_files = self.annotate_entities(&mut summary);
        report.entities = entity_files.keys().cloned().collect();
        self.finish("annotate_entities", summary, &mut report);

        let mut summary = RewriteSummary::new();
        self.prepare_entity_manager(&mut summary);
        self.finish("prepare_entity_manager", summary, &mut report);

        let mut summary = RewriteSummary::new();
        report.catalog = self.build_catalog(&entity_files, &mut summary);
        self.finish("build_catalog", summary, &mut report);

        let mut summary = RewriteSummary::new();
        self.add_key_resolvers(&report.catalog, &mut summary);
        self.finish("add_key_resolvers", summary, &mut report);

        let mut summary = RewriteSummary::new();
        self.normalize_entity_references(&entity_files, &report.catalog, &mut summary);
        self.finish("normalize_entity_references", summary, &mut report);

        let mut summary = RewriteSummary::new();
        self.clean_up_contracts(&mut summary);
        self.finish("clean_up_contracts", summary, &mut report);

        let mut summary = RewriteSummary::new();
        self.normalize_contract_fields(&report.entities, &report.catalog, &mut summary);
        self.finish("normalize_contract_fields", summary, &mut report);

        let mut summary = RewriteSummary::new();
        report.transactions = self.synthesize_transaction_wrappers(&mut summary);
        self.finish("synthesize_transaction_wrappers", summary, &mut report);

        let mut summary = RewriteSummary::new();
        self.track_mutations(&report.entities, &report.transactions, &mut summary);
        self.finish("track_mutations", summary, &mut report);

        let summary = self.rewriter.restore_line_endings(&self.touched);
        self.finish("restore_line_endings", summary, &mut report);

        info!(
            entities = report.entities.len(),
            catalogued = report.catalog.len(),
            transactions = report.transactions.len(),
            changed = report.changed_files().len(),
            errors = report.error_count(),
            "migration finished"
        );
        report
    }

    fn finish(&mut self, name: &str, mut summary: RewriteSummary, report: &mut RunReport) {
        for path in &summary.changed {
            if !self.touched.contains(path) {
                self.touched.push(path.clone());
            }
        }
        if self.config.commit_changes && !summary.changed.is_empty() {
            // committed text must already carry the file's own line endings
            let restored = self.rewriter.restore_line_endings(&summary.changed);
            summary.errors.extend(restored.errors);
            let message = MESSAGES
                .iter()
                .find(|(op, _)| *op == name)
                .map(|(_, message)| *message)
                .unwrap_or(name);
            if let Err(e) = self.recorder.record(message, &summary.changed) {
                warn!(operation = name, "could not record changes: {e:#}");
            }
        }
        info!(
            operation = name,
            changed = summary.changed.len(),
            errors = summary.errors.len(),
            "operation complete"
        );
        report.operations.push(OperationReport::from_summary(name, summary));
    }

    fn sources(&self, dir: &Path, summary: &mut RewriteSummary) -> Vec<PathBuf> {
        match self.rewriter.list_sources(dir) {
            Ok(files) => files,
            Err(e) => {
                summary.record_error(dir, &e.into());
                Vec::new()
            }
        }
    }

    fn implementation_sources(&self, summary: &mut RewriteSummary) -> Vec<PathBuf> {
        let excluded = format!("{}.java", self.config.layout.service_manager);
        self.sources(&self.config.services_impl_dir(), summary)
            .into_iter()
            .filter(|path| path.file_name().is_some_and(|name| name.to_string_lossy() != excluded))
            .collect()
    }

    fn annotate_entities(&mut self, summary: &mut RewriteSummary) -> BTreeMap<String, PathBuf> {
        let files = self.sources(&self.config.entities_dir(), summary);
        let mut entity_files = BTreeMap::new();
        let mut parsed = Vec::new();
        for path in files {
            match self.rewriter.rewrite_file(&path, &mut EntityScanner) {
                Ok(outcome) => {
                    for name in outcome.output {
                        entity_files.insert(name, path.clone());
                    }
                    parsed.push(path);
                }
                Err(e) => summary.record_error(&path, &e),
            }
        }
        debug!(entities = ?entity_files.keys().collect::<Vec<_>>(), "entity classes");

        let synthetic_key = self.config.naming.synthetic_key.clone();
        let date_types = self.config.date_types.clone();
        let annotated = self.rewriter.rewrite_all(&parsed, |_| {
            EntityAnnotator::new(synthetic_key.clone(), date_types.clone())
        });
        summary.merge(annotated);
        entity_files
    }

    fn prepare_entity_manager(&mut self, summary: &mut RewriteSummary) {
        let path = self.config.entity_manager_file();
        if !path.is_file() {
            warn!(file = %path.display(), "entity manager not found");
            return;
        }
        let mut runtime = EntityManagerRuntime::new(self.config.layout.entity_manager.clone());
        match self.rewriter.rewrite_file(&path, &mut runtime) {
            Ok(outcome) => {
                debug!(
                    persisted = ?runtime.persisted_methods,
                    added = ?runtime.added_members,
                    "entity manager runtime"
                );
                summary.record(&path, outcome.changed);
            }
            Err(e) => summary.record_error(&path, &e),
        }
    }

    fn build_catalog(
        &mut self,
        entity_files: &BTreeMap<String, PathBuf>,
        summary: &mut RewriteSummary,
    ) -> Catalog {
        let hints = match &self.config.model_file {
            Some(model) => KeyHints::from_file(model).unwrap_or_else(|e| {
                summary.record_error(model, &e.into());
                KeyHints::new()
            }),
            None => {
                debug!("no model file; every entity gets a synthesized identifier");
                KeyHints::new()
            }
        };

        let mut builder = CatalogBuilder::new(self.config.entities_dir());
        builder.resolve_hints(&hints, &mut self.rewriter);

        for (type_name, path) in entity_files {
            if builder.contains(type_name) || builder.was_dropped(type_name) {
                continue;
            }
            let mut adder = GuidAdder::new(
                self.config.naming.synthetic_key.clone(),
                self.config.layout.entity_manager.clone(),
            );
            match self.rewriter.rewrite_file(path, &mut adder) {
                Ok(outcome) => {
                    summary.record(path, outcome.changed);
                    match outcome.output {
                        Some(descriptor) => {
                            builder.register(descriptor);
                        }
                        None => warn!(entity = %type_name, "no identifier could be attached"),
                    }
                }
                Err(e) => summary.record_error(path, &e),
            }
        }

        let catalog = builder.build();
        for descriptor in catalog.iter() {
            debug!(
                entity = %descriptor.type_name,
                key = %descriptor.key_field,
                ty = %descriptor.key_type,
                "catalogued"
            );
        }
        catalog
    }

    fn add_key_resolvers(&mut self, catalog: &Catalog, summary: &mut RewriteSummary) {
        let path = self.config.entity_manager_file();
        if catalog.is_empty() || !path.is_file() {
            return;
        }
        let manager = &self.config.layout.entity_manager;
        let mut adder = MemberAdder::new(key_resolver_members(catalog, manager))
            .for_class(manager.clone())
            .with_import(JAVA_UTIL);
        match self.rewriter.rewrite_file(&path, &mut adder) {
            Ok(outcome) => summary.record(&path, outcome.changed),
            Err(e) => summary.record_error(&path, &e),
        }
    }

    fn normalize_entity_references(
        &mut self,
        entity_files: &BTreeMap<String, PathBuf>,
        catalog: &Catalog,
        summary: &mut RewriteSummary,
    ) {
        let manager_file = self.config.entity_manager_file();
        let files: BTreeSet<&PathBuf> = entity_files
            .values()
            .filter(|path| **path != manager_file)
            .collect();
        let naming = &self.config.naming;

        for path in files {
            let mut inserter = ShadowKeyInserter::new(catalog, naming);
            let inserted = match self.rewriter.rewrite_file(path, &mut inserter) {
                Ok(outcome) => outcome.changed,
                Err(e) => {
                    summary.record_error(path, &e);
                    continue;
                }
            };
            let fields = inserter.fields;
            if fields.is_empty() {
                summary.record(path, inserted);
                continue;
            }

            let mut accessors = KeyedAccessorRewriter::new(
                catalog,
                naming,
                self.config.null_key_policy,
                self.config.layout.entity_manager.clone(),
                &fields,
            );
            match self.rewriter.rewrite_file(path, &mut accessors) {
                Ok(outcome) => {
                    debug!(file = %path.display(), accessors = ?accessors.rewritten, "keyed accessors");
                    summary.record(path, inserted || outcome.changed);
                }
                Err(e) => summary.record_error(path, &e),
            }
        }
    }

    fn clean_up_contracts(&mut self, summary: &mut RewriteSummary) {
        let files = self.sources(&self.config.services_impl_dir(), summary);
        summary.merge(self.rewriter.rewrite_all(&files, |_| ContractCleanup));
    }

    fn normalize_contract_fields(
        &mut self,
        entities: &BTreeSet<String>,
        catalog: &Catalog,
        summary: &mut RewriteSummary,
    ) {
        let files = self.implementation_sources(summary);
        let global_fields = self.system_fields(summary);

        let mut occurrences: Vec<EntityFieldOccurrence> = Vec::new();
        for path in &files {
            let mut collector = EntityFieldCollector::new(entities);
            // parse failures surface again below, where they are counted
            if self.rewriter.rewrite_file(path, &mut collector).is_ok() {
                occurrences.append(&mut collector.occurrences);
            }
        }
        debug!(fields = occurrences.len(), "entity-typed contract fields");

        let naming = &self.config.naming;
        let policy = self.config.null_key_policy;
        let manager = &self.config.layout.entity_manager;
        let normalized = self.rewriter.rewrite_all(&files, |_| {
            ContractFieldNormalizer::new(catalog, &occurrences, &global_fields, naming, policy, manager.clone())
        });
        summary.merge(normalized);
    }

    /// Fields named by the getters of the `<Model>System` interface
    fn system_fields(&mut self, summary: &mut RewriteSummary) -> BTreeSet<String> {
        let Some(interface) = self.config.system_interface() else {
            return BTreeSet::new();
        };
        let path = self.config.services_dir().join(format!("{interface}.java"));
        if !path.is_file() {
            debug!(file = %path.display(), "no system interface");
            return BTreeSet::new();
        }
        let mut collector = SystemFieldCollector::new();
        match self.rewriter.rewrite_file(&path, &mut collector) {
            Ok(_) => collector.into_fields(),
            Err(e) => {
                summary.record_error(&path, &e);
                BTreeSet::new()
            }
        }
    }

    fn synthesize_transaction_wrappers(&mut self, summary: &mut RewriteSummary) -> TransactionTable {
        let interfaces = self.sources(&self.config.services_dir(), summary);
        let impl_dir = self.config.services_impl_dir();
        let mut table = TransactionTable::new();

        for path in &interfaces {
            let mut scanner = InterfaceScanner::new();
            if let Err(e) = self.rewriter.rewrite_file(path, &mut scanner) {
                summary.record_error(path, &e);
                continue;
            }
            if scanner.transactions.is_empty() {
                continue;
            }
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            if let Some(name) = &scanner.interface_name {
                if *name != stem {
                    warn!(
                        file = %path.display(),
                        "Interface {name} found in file {stem}.java."
                    );
                }
            }
            let impl_class = format!("{stem}Impl");
            if !impl_dir.join(format!("{impl_class}.java")).is_file() {
                warn!(interface = %stem, "no implementation class {impl_class}");
                continue;
            }
            debug!(
                interface = %stem,
                transactions = ?scanner.transactions.iter().map(|t| &t.method_name).collect::<Vec<_>>(),
                "contract methods"
            );
            table.insert(impl_class, scanner.transactions);
        }

        let date_types = &self.config.date_types;
        let manager = &self.config.layout.entity_manager;
        for (impl_class, transactions) in table.iter() {
            let path = impl_dir.join(format!("{impl_class}.java"));
            let mut wrapper = TransactionWrapperSynthesizer::new(transactions, date_types, manager.clone());
            match self.rewriter.rewrite_file(&path, &mut wrapper) {
                Ok(outcome) => {
                    debug!(
                        class = impl_class,
                        wrapped = ?wrapper.wrapped,
                        annotated = ?wrapper.annotated,
                        "transactions"
                    );
                    summary.record(&path, outcome.changed);
                }
                Err(e) => summary.record_error(&path, &e),
            }
        }
        table
    }

    fn track_mutations(
        &mut self,
        entities: &BTreeSet<String>,
        table: &TransactionTable,
        summary: &mut RewriteSummary,
    ) {
        let files = self.implementation_sources(summary);
        let mut injected = false;

        for path in &files {
            let class = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut tracker = MutationTracker::new(
                entities,
                table.submit_names(&class),
                self.config.postcondition_exception.clone(),
                self.config.layout.entity_manager.clone(),
            );
            match self.rewriter.rewrite_file(path, &mut tracker) {
                Ok(outcome) => {
                    injected |= tracker.injected_any();
                    summary.record(path, outcome.changed);
                }
                Err(e) => summary.record_error(path, &e),
            }
        }

        let manager_file = self.config.entity_manager_file();
        if injected && manager_file.is_file() {
            let mut adder = MemberAdder::new(vec![save_modified_member()])
                .for_class(self.config.layout.entity_manager.clone());
            match self.rewriter.rewrite_file(&manager_file, &mut adder) {
                Ok(outcome) => summary.record(&manager_file, outcome.changed),
                Err(e) => summary.record_error(&manager_file, &e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Recorded(Rc<RefCell<Vec<(String, usize)>>>);

    impl ChangeRecorder for Recorded {
        fn record(&mut self, message: &str, files: &[PathBuf]) -> anyhow::Result<()> {
            self.0.borrow_mut().push((message.to_string(), files.len()));
            Ok(())
        }
    }

    #[test]
    fn missing_root_is_a_configuration_error() {
        let config = RewriteConfig::new("/definitely/not/a/project");
        assert!(matches!(Pipeline::new(config), Err(RewriteError::Config(_))));
    }

    #[test]
    fn empty_project_runs_every_operation() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut pipeline = Pipeline::new(RewriteConfig::new(dir.path()))?;
        let report = pipeline.run();
        let names: Vec<_> = report.operations.iter().map(|op| op.name.as_str()).collect();
        let expected: Vec<_> = MESSAGES.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, expected);
        assert!(report.changed_files().is_empty());
        assert_eq!(report.error_count(), 0);
        Ok(())
    }

    #[test]
    fn commits_once_per_changing_operation() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let entities = dir.path().join("src/main/java/entities");
        fs::create_dir_all(&entities)?;
        fs::write(
            entities.join("Store.java"),
            "package entities;\n\npublic class Store implements Serializable {\n\tprivate String name;\n}\n",
        )?;

        let recorded = Recorded::default();
        let mut config = RewriteConfig::new(dir.path());
        config.commit_changes = true;
        let mut pipeline = Pipeline::new(config)?.with_recorder(Box::new(recorded.clone()));
        let report = pipeline.run();

        assert!(report.catalog.contains("Store"));
        let commits = recorded.0.borrow();
        assert_eq!(
            commits.iter().map(|(m, _)| m.as_str()).collect::<Vec<_>>(),
            vec![
                "Annotate entity classes for Fabric",
                "Add identifiers to entities without a primary key",
            ]
        );
        Ok(())
    }

    #[test]
    fn failed_line_ending_restore_is_reported() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("Store.java");
        fs::write(&path, "public class Store {\r\n}\r\n")?;

        let recorded = Recorded::default();
        let mut config = RewriteConfig::new(dir.path());
        config.commit_changes = true;
        let mut pipeline = Pipeline::new(config)?.with_recorder(Box::new(recorded.clone()));
        pipeline.rewriter.parse(&path)?;
        fs::remove_file(&path)?;

        let mut summary = RewriteSummary::new();
        summary.record(&path, true);
        let mut report = RunReport::default();
        pipeline.finish("annotate_entities", summary, &mut report);

        let op = report.operation("annotate_entities").expect("operation reported");
        assert_eq!(op.errors.len(), 1);
        assert!(op.errors[0].contains("Store.java"));
        assert_eq!(recorded.0.borrow().len(), 1);
        Ok(())
    }
}
