//! Floe artifacts CLI
//!
//! Entry point for the `floe-artifacts` command-line tool.

use clap::{ArgAction, Parser, Subcommand};
use floe_artifacts::cache::CacheManager;
use floe_artifacts::catalog::{register_contract_metadata, ContractMetadata, RestCatalogClient};
use floe_artifacts::config::{env, ConfigError, EffectiveConfig, DEFAULT_CONFIG_FILE};
use floe_artifacts::promotion::PromotionController;
use floe_artifacts::signing::{KeylessSigner, SbomFormat, SbomGenerator};
use floe_artifacts::{logging, ArtifactError, PushOptions, RegistryClient, Result};
use floe_oci::annotations;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "floe-artifacts")]
#[command(about = "Compiled artifact registry, signing and environment promotion", version)]
struct Cli {
    /// Path to config file (default: floe.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Registry URI, overriding config and environment
    #[arg(long, global = true)]
    registry: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push a compiled artifact under a tag
    Push {
        /// Target tag (e.g. v1.2.0)
        tag: String,

        /// File holding the compiled artifact
        file: PathBuf,

        /// Extra annotation, KEY=VALUE (repeatable)
        #[arg(long = "annotation", short = 'a', value_parser = parse_key_value)]
        annotations: Vec<(String, String)>,

        /// Artifact media type
        #[arg(long)]
        media_type: Option<String>,
    },

    /// Pull artifact content
    Pull {
        tag: String,

        /// Write content here instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Environment whose verification overrides apply
        #[arg(long)]
        env: Option<String>,
    },

    /// Show artifact metadata without downloading content
    Inspect { tag: String },

    /// List artifact tags
    List {
        /// Substring or glob (*, ?, [..]) on tag names
        filter: Option<String>,
    },

    /// Sign an artifact with a short-lived identity-bound key
    Sign { tag: String },

    /// Verify an artifact against the verification policy
    Verify {
        tag: String,

        /// Environment whose policy overrides apply
        #[arg(long)]
        env: Option<String>,
    },

    /// Attach a signed attestation to an artifact
    Attest {
        tag: String,

        /// Predicate JSON file
        #[arg(long, required_unless_present = "sbom", conflicts_with = "sbom")]
        predicate: Option<PathBuf>,

        /// Predicate type URI (with --predicate)
        #[arg(long, requires = "predicate")]
        predicate_type: Option<String>,

        /// Generate an SBOM for this project directory and attach it
        #[arg(long)]
        sbom: Option<PathBuf>,

        /// SBOM format: spdx or cyclonedx
        #[arg(long, default_value = "spdx")]
        format: SbomFormat,
    },

    /// Promote a tag into the next environment
    Promote {
        tag: String,

        /// Environment the tag is coming from (omit for a first promotion)
        #[arg(long)]
        from: Option<String>,

        /// Target environment
        #[arg(long)]
        to: String,

        /// Operator recorded in the audit trail (default: $USER)
        #[arg(long)]
        operator: Option<String>,

        /// Validate, verify and run gates without writing tags
        #[arg(long)]
        dry_run: bool,
    },

    /// Roll an environment back to a previously promoted tag
    Rollback {
        tag: String,

        #[arg(long)]
        env: String,

        #[arg(long, required_unless_present = "analyze")]
        reason: Option<String>,

        #[arg(long)]
        operator: Option<String>,

        /// Report the impact without rolling back
        #[arg(long)]
        analyze: bool,
    },

    /// Lock an environment against promotions
    Lock {
        env: String,

        #[arg(long)]
        reason: String,

        #[arg(long)]
        operator: Option<String>,
    },

    /// Unlock an environment
    Unlock {
        env: String,

        #[arg(long)]
        operator: Option<String>,
    },

    /// Show where a tag stands, or lock state of every environment
    Status {
        /// Artifact tag (omit for environment locks)
        tag: Option<String>,
    },

    /// Promotion history of a tag, or rollback history of an environment
    History {
        #[arg(required_unless_present = "rollbacks")]
        tag: Option<String>,

        /// Show rollbacks of this environment instead
        #[arg(long, conflicts_with = "tag")]
        rollbacks: Option<String>,
    },

    /// Local content cache
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },

    /// Configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Cache size and entry count
    Stats,
    /// Remove every cache entry
    Clear,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration with sources (secrets redacted)
    Show,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_json);

    if let Err(e) = run(&cli) {
        eprintln!("error[{}]: {}", e.kind(), e);
        process::exit(e.exit_code().as_i32());
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let json = cli.json;

    match &cli.command {
        Commands::Push {
            tag,
            file,
            annotations,
            media_type,
        } => run_push(&config, tag, file, annotations, media_type.clone(), json),
        Commands::Pull { tag, output, env } => {
            run_pull(&config, tag, output.as_deref(), env.as_deref())
        }
        Commands::Inspect { tag } => {
            let manifest = client(&config)?.inspect(tag)?;
            if json {
                print_json(&manifest)
            } else {
                println!("Tag:      {}", tag);
                println!("Digest:   {}", manifest.digest);
                println!("Type:     {}", manifest.artifact_type);
                println!("Size:     {}", manifest.size);
                println!("Created:  {}", manifest.created_at.to_rfc3339());
                for (key, value) in &manifest.annotations {
                    println!("  {} = {}", key, value);
                }
                Ok(())
            }
        }
        Commands::List { filter } => {
            let tags = client(&config)?.list(filter.as_deref())?;
            if json {
                return print_json(&tags);
            }
            for tag in &tags {
                println!("{}\t{}\t{}", tag.name, tag.digest, tag.created_at.to_rfc3339());
            }
            Ok(())
        }
        Commands::Sign { tag } => {
            let signer = KeylessSigner::from_config(&config.platform.signing)?;
            let metadata = client(&config)?.sign(&signer, tag)?;
            if json {
                return print_json(&metadata);
            }
            println!("Signed {} ({})", tag, metadata.bundle.artifact_digest);
            println!("  Issuer:  {}", metadata.issuer);
            println!("  Subject: {}", metadata.subject);
            if let Some(index) = metadata.rekor_log_index {
                println!("  Log index: {}", index);
            }
            Ok(())
        }
        Commands::Verify { tag, env } => {
            let result = client(&config)?.verify(tag, env.as_deref(), None)?;
            if json {
                return print_json(&result);
            }
            println!(
                "{}: {} (enforcement {})",
                tag,
                label(&result.status),
                result.enforcement
            );
            if let Some(signer) = &result.signer {
                println!("  Signer: {} {}", signer.issuer, signer.subject);
            }
            for warning in &result.warnings {
                println!("  warning: {}", warning);
            }
            Ok(())
        }
        Commands::Attest {
            tag,
            predicate,
            predicate_type,
            sbom,
            format,
        } => run_attest(
            &config,
            tag,
            predicate.as_deref(),
            predicate_type.as_deref(),
            sbom.as_deref(),
            *format,
            json,
        ),
        Commands::Promote {
            tag,
            from,
            to,
            operator,
            dry_run,
        } => {
            let record = controller(&config)?.promote(
                tag,
                from.as_deref(),
                to,
                &operator_name(operator.as_deref()),
                *dry_run,
            )?;
            if json {
                return print_json(&record);
            }
            let verb = if record.dry_run { "Would promote" } else { "Promoted" };
            println!(
                "{} {} ({}) {} -> {}",
                verb,
                tag,
                record.artifact_digest,
                record.source_environment.as_deref().unwrap_or("(none)"),
                record.target_environment
            );
            for gate in &record.gate_results {
                match &gate.error {
                    Some(error) => println!("  {} {} ({})", gate.gate, label(&gate.status), error),
                    None => println!("  {} {}", gate.gate, label(&gate.status)),
                }
            }
            println!("  Trace: {}", record.trace_id);
            Ok(())
        }
        Commands::Rollback {
            tag,
            env,
            reason,
            operator,
            analyze,
        } => run_rollback(
            &config,
            tag,
            env,
            reason.as_deref(),
            operator.as_deref(),
            *analyze,
            json,
        ),
        Commands::Lock {
            env,
            reason,
            operator,
        } => {
            let lock = controller(&config)?.lock_environment(env, reason, &operator_name(operator.as_deref()))?;
            if json {
                return print_json(&lock);
            }
            println!("Locked {}: {}", env, reason);
            Ok(())
        }
        Commands::Unlock { env, operator } => {
            let lock = controller(&config)?.unlock_environment(env, &operator_name(operator.as_deref()))?;
            if json {
                return print_json(&lock);
            }
            println!("Unlocked {}", env);
            Ok(())
        }
        Commands::Status { tag } => run_status(&config, tag.as_deref(), json),
        Commands::History { tag, rollbacks } => {
            let controller = controller(&config)?;
            match (tag, rollbacks) {
                (_, Some(environment)) => {
                    let history = controller.get_rollback_history(environment)?;
                    if json {
                        return print_json(&history);
                    }
                    for record in &history {
                        println!(
                            "#{} {} -> {} by {}: {}",
                            record.sequence,
                            record.rolled_back_at.to_rfc3339(),
                            record.tag,
                            record.operator,
                            record.reason
                        );
                    }
                    Ok(())
                }
                (Some(tag), None) => {
                    let history = controller.get_promotion_history(tag)?;
                    if json {
                        return print_json(&history);
                    }
                    for record in &history {
                        println!(
                            "{} {} -> {} by {} ({})",
                            record.promoted_at.to_rfc3339(),
                            record.source_environment.as_deref().unwrap_or("(none)"),
                            record.target_environment,
                            record.operator,
                            record.trace_id
                        );
                    }
                    Ok(())
                }
                (None, None) => Err(usage("history needs a tag or --rollbacks <ENV>")),
            }
        }
        Commands::Cache { action } => {
            let cache = match &config.platform.registry.cache {
                Some(cache) => CacheManager::new(cache.clone()),
                None => CacheManager::disabled(),
            };
            match action {
                CacheCommands::Stats => {
                    let stats = cache.stats()?;
                    if json {
                        return print_json(&stats);
                    }
                    println!("Path:    {}", stats.path.display());
                    println!("Entries: {}", stats.entry_count);
                    println!(
                        "Size:    {} bytes (limit {} GB)",
                        stats.total_size_bytes, stats.max_size_gb
                    );
                    Ok(())
                }
                CacheCommands::Clear => {
                    cache.clear()?;
                    println!("Cache cleared");
                    Ok(())
                }
            }
        }
        Commands::Config { action } => match action {
            ConfigCommands::Show => {
                println!("{}", config.to_json()?);
                Ok(())
            }
        },
    }
}

fn load_config(cli: &Cli) -> Result<EffectiveConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let overrides = cli
        .registry
        .as_ref()
        .map(|uri| json!({"registry": {"uri": uri}}));
    Ok(EffectiveConfig::build(
        Some(&path),
        Some(env::from_process_env()),
        overrides,
    )?)
}

fn client(config: &EffectiveConfig) -> Result<RegistryClient> {
    RegistryClient::from_config(&config.platform.registry)
}

fn controller(config: &EffectiveConfig) -> Result<PromotionController> {
    PromotionController::new(client(config)?, config.platform.promotion.clone())
}

fn run_push(
    config: &EffectiveConfig,
    tag: &str,
    file: &Path,
    extra: &[(String, String)],
    media_type: Option<String>,
    json: bool,
) -> Result<()> {
    let content = fs::read(file)?;
    let options = PushOptions {
        annotations: extra.iter().cloned().collect(),
        media_type,
    };
    let digest = client(config)?.push_bytes(&content, tag, &options)?;

    let registration = match (&config.platform.catalog, contract_metadata(&options.annotations)) {
        (Some(catalog), Some(metadata)) => Some(register_contract_metadata(
            &RestCatalogClient::from_config(catalog),
            &catalog.namespace,
            &metadata,
        )),
        _ => None,
    };

    if json {
        return print_json(&json!({
            "tag": tag,
            "digest": digest,
            "size": content.len(),
            "catalog": registration,
        }));
    }
    println!("Pushed {} ({})", tag, digest);
    if let Some(warning) = registration.and_then(|r| r.warning) {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}

/// Contract metadata from `floe.contract.*` push annotations, if complete
fn contract_metadata(values: &BTreeMap<String, String>) -> Option<ContractMetadata> {
    Some(ContractMetadata::new(
        values.get(annotations::CONTRACT_ID)?,
        values.get(annotations::CONTRACT_VERSION)?,
        values.get(annotations::CONTRACT_SCHEMA_HASH)?,
        values.get(annotations::CONTRACT_OWNER)?,
    ))
}

fn run_pull(
    config: &EffectiveConfig,
    tag: &str,
    output: Option<&Path>,
    environment: Option<&str>,
) -> Result<()> {
    let (content, verification) = client(config)?.pull_verified(tag, environment)?;
    if let Some(result) = verification {
        for warning in &result.warnings {
            eprintln!("warning: {}", warning);
        }
    }
    match output {
        Some(path) => {
            fs::write(path, &content)?;
            eprintln!("Wrote {} bytes to {}", content.len(), path.display());
        }
        None => std::io::stdout().write_all(&content)?,
    }
    Ok(())
}

fn run_attest(
    config: &EffectiveConfig,
    tag: &str,
    predicate: Option<&Path>,
    predicate_type: Option<&str>,
    sbom: Option<&Path>,
    format: SbomFormat,
    json: bool,
) -> Result<()> {
    let signer = KeylessSigner::from_config(&config.platform.signing)?;
    let client = client(config)?;

    let attestation = match (predicate, sbom) {
        (Some(path), _) => {
            let predicate_type = predicate_type.unwrap_or("https://floe.dev/attestations/custom/v1");
            client.attach_attestation(&signer, tag, path, predicate_type, true)?
        }
        (None, Some(project_dir)) => {
            let document = SbomGenerator::default().generate(project_dir, format)?;
            let mut file = tempfile::NamedTempFile::new()?;
            serde_json::to_writer(&mut file, &document.document)?;
            file.flush()?;
            client.attach_attestation(&signer, tag, file.path(), format.predicate_type(), true)?
        }
        (None, None) => return Err(usage("attest needs --predicate or --sbom")),
    };

    if json {
        return print_json(&attestation);
    }
    println!("Attached {} attestation to {}", attestation.predicate_type, tag);
    Ok(())
}

fn run_rollback(
    config: &EffectiveConfig,
    tag: &str,
    environment: &str,
    reason: Option<&str>,
    operator: Option<&str>,
    analyze: bool,
    json: bool,
) -> Result<()> {
    let controller = controller(config)?;

    if analyze {
        let analysis = controller.analyze_rollback_impact(tag, environment)?;
        if json {
            return print_json(&analysis);
        }
        println!("Rollback of {} to {} ({})", environment, tag, analysis.target_digest);
        match &analysis.current_digest {
            Some(current) => println!("  Current: {}", current),
            None => println!("  Current: (none)"),
        }
        for change in &analysis.breaking_changes {
            println!("  breaking: {}", change);
        }
        if !analysis.affected_products.is_empty() {
            println!("  Affected products: {}", analysis.affected_products.join(", "));
        }
        for recommendation in &analysis.recommendations {
            println!("  - {}", recommendation);
        }
        return Ok(());
    }

    let record = controller.rollback(
        tag,
        environment,
        reason.unwrap_or_default(),
        &operator_name(operator),
    )?;
    if json {
        return print_json(&record);
    }
    println!(
        "Rolled back {} to {} ({}) as {}",
        environment, tag, record.artifact_digest, record.rollback_tag
    );
    Ok(())
}

fn run_status(config: &EffectiveConfig, tag: Option<&str>, json: bool) -> Result<()> {
    let controller = controller(config)?;

    if let Some(tag) = tag {
        let status = controller.get_status(tag)?;
        let signature = controller.client().signature_status(tag)?;
        if json {
            return print_json(&json!({
                "tag": status.tag,
                "digest": status.digest,
                "environments": status.environments,
                "signature": signature,
            }));
        }
        println!("Tag:          {}", status.tag);
        println!("Digest:       {}", status.digest);
        println!("Environments: {}", status.environments.join(" -> "));
        println!("Signed:       {}", signature.is_signed());
        return Ok(());
    }

    let mut locks = Vec::new();
    for environment in controller.config().names() {
        locks.push(controller.get_lock_status(environment)?);
    }
    if json {
        return print_json(&locks);
    }
    for lock in &locks {
        if lock.locked {
            println!(
                "{}\tlocked by {}: {}",
                lock.environment,
                lock.locked_by.as_deref().unwrap_or("unknown"),
                lock.reason.as_deref().unwrap_or("")
            );
        } else {
            println!("{}\tunlocked", lock.environment);
        }
    }
    Ok(())
}

fn operator_name(operator: Option<&str>) -> String {
    operator
        .map(str::to_string)
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "unknown".to_string())
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

fn usage(message: &str) -> ArtifactError {
    ArtifactError::Config(ConfigError::ValidationError(message.to_string()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Serialized name of a unit enum value
fn label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}
