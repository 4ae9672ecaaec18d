use clap::{Parser, Subcommand};
use dashkeeper::prelude::*;
use std::fs;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Repair and deploy analytics asset definitions
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List references, declarations and dangling identifiers of a definition file
    Diagnose {
        /// Path to an exported definition JSON file
        path: String,
    },
    /// Remove dangling references from a definition file
    Repair {
        /// Path to an exported definition JSON file
        path: String,
        /// Where to write the repaired definition (stdout when omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Repair an asset held in a local store in place
    Fix {
        /// Root directory of the local store
        #[arg(long)]
        store: String,
        #[arg(long)]
        account: String,
        #[arg(long)]
        region: String,
        #[arg(long, value_enum)]
        kind: AssetKind,
        #[arg(long)]
        asset_id: String,
    },
    /// Deploy the assets described by one or more spec files into a local store
    Deploy {
        /// Deployment spec files, each holding one spec or an array of them
        #[arg(required = true)]
        specs: Vec<String>,
        /// Root directory of the local store
        #[arg(long)]
        store: String,
        /// Optional config file; DASHKEEPER_* variables override it
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Diagnose { path } => run_diagnose(&path),
        Command::Repair { path, output } => run_repair(&path, output.as_deref()),
        Command::Fix {
            store,
            account,
            region,
            kind,
            asset_id,
        } => run_fix(store, Destination::new(account, region), kind, &asset_id).await,
        Command::Deploy {
            specs,
            store,
            config,
        } => run_deploy(&specs, store, config.as_deref()).await,
    }
}

fn load_tree(path: &str) -> Node {
    let json = fs::read_to_string(path)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to read '{}': {}", path, e)));
    Node::from_json_str(&json)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to parse '{}': {}", path, e)))
}

fn run_diagnose(path: &str) {
    let tree = load_tree(path);
    let diagnosis = Diagnosis::of(&tree);

    println!("References:   {}", diagnosis.references.len());
    println!("Declarations: {}", diagnosis.declared.len());
    if !diagnosis.has_declarations {
        println!("No DataSetIdentifierDeclarations found; repair will leave this definition alone.");
        return;
    }
    let dangling = diagnosis.dangling_sorted();
    if dangling.is_empty() {
        println!("No dangling references.");
    } else {
        println!("Dangling:");
        for id in dangling {
            println!("  - {}", id);
        }
    }
}

fn run_repair(path: &str, output: Option<&str>) {
    let mut tree = load_tree(path);
    match repair(&mut tree) {
        RepairOutcome::Modified(report) => info!(?report, "definition repaired"),
        RepairOutcome::Unchanged => info!("definition unchanged"),
        RepairOutcome::NoDeclarations { references } => {
            warn!(?references, "definition declares no datasets; left unchanged")
        }
    }

    let json = tree.to_json_pretty();
    match output {
        Some(output) => fs::write(output, json)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to write '{}': {}", output, e))),
        None => println!("{}", json),
    }
}

async fn run_fix(store: String, destination: Destination, kind: AssetKind, asset_id: &str) {
    let client = LocalStore::new(store, destination);
    let config = Config::default()
        .with_env_overrides()
        .unwrap_or_else(|e| exit_with_error(&e.to_string()));
    let assets = AssetManager::new(std::sync::Arc::new(client), kind, config.executor());

    match assets.remove_broken_references(asset_id).await {
        Ok(RepairOutcome::Modified(report)) => println!("Repaired '{}': {:?}", asset_id, report),
        Ok(RepairOutcome::Unchanged) => println!("'{}' has no dangling references", asset_id),
        Ok(RepairOutcome::NoDeclarations { references }) => exit_with_error(&format!(
            "'{}' declares no datasets but references {}; nothing was changed",
            asset_id,
            references.join(", ")
        )),
        Err(e) => exit_with_error(&e.to_string()),
    }
}

async fn run_deploy(spec_paths: &[String], store: String, config_path: Option<&str>) {
    // --- 1. Configuration ---
    let config = match config_path {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    }
    .and_then(Config::with_env_overrides)
    .unwrap_or_else(|e| exit_with_error(&e.to_string()));

    // --- 2. Spec Loading ---
    let mut specs = Vec::new();
    for path in spec_paths {
        let loaded = DeploymentSpec::from_file(path).unwrap_or_else(|e| exit_with_error(&e.to_string()));
        specs.extend(loaded);
    }

    // --- 3. Deployment ---
    let deployer = Deployer::new(LocalStore::provider(store), config);
    let results = deployer.deploy_all(&specs).await;

    // --- 4. Summary ---
    let mut failures = 0;
    for result in &results {
        match result {
            Ok(deployed) => println!(
                "  ok    {} ({}, {:?}{})",
                deployed.asset_id,
                deployed.kind,
                deployed.action,
                deployed
                    .version
                    .map(|v| format!(", version {}", v))
                    .unwrap_or_default()
            ),
            Err(failure) => {
                failures += 1;
                error!(asset_id = %failure.asset_id, rollback = %failure.rollback, "{}", failure.error);
                println!("  FAIL  {}", failure.asset_id);
            }
        }
    }
    println!("\n{} deployed, {} failed", results.len() - failures, failures);
    if failures > 0 {
        std::process::exit(1);
    }
}

fn exit_with_error(message: &str) -> ! {
    error!("{}", message);
    std::process::exit(1);
}
