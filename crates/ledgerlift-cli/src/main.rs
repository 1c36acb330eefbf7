use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use ledgerlift_core::{init_tracing, NullKeyPolicy, Pipeline, RewriteConfig, RunReport};
use tracing::error;

fn cli() -> Command {
    Command::new("ledgerlift")
        .version(ledgerlift_core::VERSION)
        .about("Ports a generated Java business program to Hyperledger Fabric chaincode in place")
        .arg(
            Arg::new("project")
                .value_name("PROJECT_ROOT")
                .help("Root directory of the generated Java project")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("model")
                .long("model")
                .value_name("FILE")
                .help("Requirements model carrying primary-key constraints"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file; command-line options override it"),
        )
        .arg(
            Arg::new("commit")
                .long("commit")
                .help("Commit each operation's changes with git")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("null-keys")
                .long("null-keys")
                .value_name("POLICY")
                .help("Key stored when an entity reference is cleared")
                .value_parser(["fresh", "null"]),
        )
        .arg(
            Arg::new("log")
                .long("log")
                .value_name("LEVEL")
                .help("Log level: error, warn, info, debug or trace")
                .default_value("info"),
        )
}

fn load_config(matches: &clap::ArgMatches) -> anyhow::Result<RewriteConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => RewriteConfig::from_json_file(path)
            .with_context(|| format!("could not load configuration from {path}"))?,
        None => RewriteConfig::default(),
    };
    if let Some(root) = matches.get_one::<String>("project") {
        config.project_root = PathBuf::from(root);
    }
    if let Some(model) = matches.get_one::<String>("model") {
        config.model_file = Some(PathBuf::from(model));
    }
    if matches.get_flag("commit") {
        config.commit_changes = true;
    }
    match matches.get_one::<String>("null-keys").map(String::as_str) {
        Some("null") => config.null_key_policy = NullKeyPolicy::NullKey,
        Some("fresh") => config.null_key_policy = NullKeyPolicy::FreshIdentifier,
        _ => {}
    }
    Ok(config)
}

fn print_report(report: &RunReport) {
    println!(
        "{} entities, {} catalogued, {} transactions",
        report.entities.len(),
        report.catalog.len(),
        report.transactions.len()
    );
    for op in &report.operations {
        println!("{}: {} changed, {} errors", op.name, op.changed.len(), op.errors.len());
        for path in &op.changed {
            println!("  {}", path.display());
        }
        for message in &op.errors {
            println!("  ! {message}");
        }
    }
}

fn run(matches: &clap::ArgMatches) -> anyhow::Result<RunReport> {
    let config = load_config(matches)?;
    let root = config.project_root.display().to_string();
    let mut pipeline = Pipeline::new(config).with_context(|| format!("cannot migrate project {root}"))?;
    Ok(pipeline.run())
}

fn main() -> ExitCode {
    let matches = cli().get_matches();
    let level = matches
        .get_one::<String>("log")
        .map(String::as_str)
        .unwrap_or("info");
    init_tracing(level);

    match run(&matches) {
        Ok(report) => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            eprintln!("ledgerlift: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_overrides_defaults() {
        let matches = cli()
            .try_get_matches_from(["ledgerlift", "/tmp/project", "--model", "CoCoME.remodel", "--commit", "--null-keys", "null"])
            .unwrap();
        let config = load_config(&matches).unwrap();
        assert_eq!(config.project_root, PathBuf::from("/tmp/project"));
        assert_eq!(config.system_interface().as_deref(), Some("CoCoMESystem"));
        assert!(config.commit_changes);
        assert_eq!(config.null_key_policy, NullKeyPolicy::NullKey);
    }

    #[test]
    fn rejects_unknown_null_key_policy() {
        assert!(cli()
            .try_get_matches_from(["ledgerlift", ".", "--null-keys", "zero"])
            .is_err());
    }

    #[test]
    fn unreadable_config_names_the_file() {
        let matches = cli()
            .try_get_matches_from(["ledgerlift", ".", "--config", "/no/such/ledgerlift.json"])
            .unwrap();
        let message = format!("{:#}", load_config(&matches).unwrap_err());
        assert!(message.contains("could not load configuration from /no/such/ledgerlift.json"));
    }

    #[test]
    fn missing_project_fails_with_context() {
        let matches = cli().try_get_matches_from(["ledgerlift", "/no/such/project"]).unwrap();
        let message = format!("{:#}", run(&matches).unwrap_err());
        assert!(message.starts_with("cannot migrate project /no/such/project"));
    }

    #[test]
    fn project_root_is_required() {
        assert!(cli().try_get_matches_from(["ledgerlift"]).is_err());
    }
}
