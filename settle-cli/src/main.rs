mod manifest;

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;

use settle_core::CancellationToken;
use settle_core::differ::{Diff, create_plan, destroy_plan, diff};
use settle_core::effect::Effect;
use settle_core::error::ProviderError;
use settle_core::identifier;
use settle_core::interpreter::{EffectOutcome, Interpreter};
use settle_core::plan::Plan;
use settle_core::provider::Provider;
use settle_core::resource::{Resource, ResourceId, State, Value};
use settle_provider_aws::AwsProvider;
use settle_provider_awscc::AwsccProvider;
use settle_state::{LockInfo, ResourceState, StateBackend, StateFile, create_backend};

use manifest::{Bindings, Manifest, sort_by_dependencies, unresolved_refs};

#[derive(Parser)]
#[command(name = "settle")]
#[command(about = "Apply resources and wait until they settle", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v, -vv); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the manifest
    Validate {
        /// Path to the manifest
        #[arg(default_value = "settle.json")]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        /// Path to the manifest
        #[arg(default_value = "settle.json")]
        file: PathBuf,
    },
    /// Apply changes and wait for every resource to settle
    Apply {
        /// Path to the manifest
        #[arg(default_value = "settle.json")]
        file: PathBuf,
    },
    /// Destroy every resource recorded in state
    Destroy {
        /// Path to the manifest
        #[arg(default_value = "settle.json")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Remove a stale state lock
    ForceUnlock {
        /// Lock ID reported by the failed command
        lock_id: String,

        /// Path to the manifest
        #[arg(default_value = "settle.json")]
        file: PathBuf,
    },
    /// Encode or decode composite identifiers
    Id {
        #[command(subcommand)]
        command: IdCommands,
    },
}

#[derive(Subcommand)]
enum IdCommands {
    /// Join parts into an identifier
    Encode {
        #[arg(required = true)]
        parts: Vec<String>,
    },
    /// Split an identifier into its parts
    Decode {
        identifier: String,

        /// Fail unless the identifier has exactly this many parts
        #[arg(long)]
        parts: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file, cancel).await,
        Commands::Plan { file } => run_plan(&file, cancel).await,
        Commands::Apply { file } => run_apply(&file, cancel).await,
        Commands::Destroy { file, auto_approve } => {
            run_destroy(&file, auto_approve, cancel).await
        }
        Commands::ForceUnlock { lock_id, file } => run_force_unlock(&file, &lock_id).await,
        Commands::Id { command } => run_id_command(command),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Cancel in-flight waits on the first Ctrl-C
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "\n{}",
                "Interrupted, cancelling waits (resources may still be changing remotely)..."
                    .yellow()
            );
            cancel.cancel();
        }
    });
}

fn run_id_command(command: IdCommands) -> Result<(), String> {
    match command {
        IdCommands::Encode { parts } => {
            if let Some(part) = parts.iter().find(|p| p.contains(identifier::DELIMITER)) {
                return Err(format!(
                    "part {:?} contains the delimiter '{}'",
                    part,
                    identifier::DELIMITER
                ));
            }
            println!("{}", identifier::encode(&parts));
        }
        IdCommands::Decode {
            identifier: encoded,
            parts,
        } => {
            let decoded = match parts {
                Some(n) => identifier::decode(&encoded, n).map_err(|e| e.to_string())?,
                None => encoded
                    .split(identifier::DELIMITER)
                    .map(str::to_string)
                    .collect(),
            };
            for part in decoded {
                println!("{}", part);
            }
        }
    }
    Ok(())
}

async fn get_provider(
    manifest: &Manifest,
    cancel: CancellationToken,
) -> Result<Box<dyn Provider>, String> {
    let region = manifest.provider.region.as_str();
    let settings = manifest.settings.clone();
    let provider: Box<dyn Provider> = match manifest.provider.name.as_str() {
        "aws" => Box::new(
            AwsProvider::new(region, settings, cancel)
                .await
                .map_err(|e| e.to_string())?,
        ),
        "awscc" => Box::new(
            AwsccProvider::new(region, settings, cancel)
                .await
                .map_err(|e| e.to_string())?,
        ),
        other => {
            return Err(format!(
                "unknown provider '{}' (expected one of: {})",
                other,
                manifest::PROVIDERS.join(", ")
            ));
        }
    };
    log::info!("using provider {} in {}", provider.name(), region);
    Ok(provider)
}

/// Load, validate and order the manifest's resources
async fn load(
    file: &Path,
    cancel: CancellationToken,
) -> Result<(Manifest, Box<dyn Provider>, Vec<Resource>), String> {
    let manifest = Manifest::load(file)?;
    let provider = get_provider(&manifest, cancel).await?;
    manifest.validate(&provider.resource_types())?;
    let resources = sort_by_dependencies(&manifest.resources())?;
    Ok((manifest, provider, resources))
}

async fn run_validate(file: &Path, cancel: CancellationToken) -> Result<(), String> {
    println!("{}", "Validating...".cyan());

    let (_, _, resources) = load(file, cancel).await?;

    println!(
        "{}",
        format!("✓ {} resources validated successfully.", resources.len())
            .green()
            .bold()
    );
    for resource in &resources {
        println!("  • {}", resource.id);
    }
    Ok(())
}

async fn run_plan(file: &Path, cancel: CancellationToken) -> Result<(), String> {
    let (manifest, provider, resources) = load(file, cancel).await?;
    let backend = create_backend(&manifest.backend).map_err(|e| e.to_string())?;

    let mut state = backend
        .read_state()
        .await
        .map_err(|e| e.to_string())?
        .unwrap_or_default();
    refresh(provider.as_ref(), &mut state).await?;

    let bindings = Bindings::from_state(&state);
    let desired: Vec<Resource> = resources.iter().map(|r| bindings.resolve(r)).collect();
    let plan = create_plan(&desired, &state.state_map());
    print_plan(&plan);
    Ok(())
}

async fn run_apply(file: &Path, cancel: CancellationToken) -> Result<(), String> {
    let (manifest, provider, resources) = load(file, cancel).await?;
    let backend = create_backend(&manifest.backend).map_err(|e| e.to_string())?;

    let lock = backend
        .acquire_lock("apply")
        .await
        .map_err(|e| e.to_string())?;
    let result = apply_locked(backend.as_ref(), provider, &resources).await;
    release_lock(backend.as_ref(), &lock).await;
    result
}

async fn apply_locked(
    backend: &dyn StateBackend,
    provider: Box<dyn Provider>,
    resources: &[Resource],
) -> Result<(), String> {
    let mut state = backend
        .read_state()
        .await
        .map_err(|e| e.to_string())?
        .unwrap_or_default();
    refresh(provider.as_ref(), &mut state).await?;

    let mut bindings = Bindings::from_state(&state);
    let desired: Vec<Resource> = resources.iter().map(|r| bindings.resolve(r)).collect();
    let plan = create_plan(&desired, &state.state_map());

    if plan.is_empty() {
        println!("{}", "No changes needed.".green());
        return Ok(());
    }

    print_plan(&plan);
    println!();
    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let provider_name = provider.name();
    let interpreter = Interpreter::new(provider);
    let mut success_count = 0;

    for effect in plan.effects() {
        // Re-resolve against what earlier effects produced
        let effect = match effect {
            Effect::Create(resource) => Effect::Create(bindings.resolve(resource)),
            Effect::Update { id, from, to } => Effect::Update {
                id: id.clone(),
                from: from.clone(),
                to: bindings.resolve(to),
            },
            other => other.clone(),
        };

        let result = match pending_refs(&effect) {
            Some(refs) => Err(ProviderError::invalid_configuration(format!(
                "unresolved references: {}",
                refs.join(", ")
            ))
            .for_resource(effect.resource_id().clone())),
            None => interpreter.execute(&effect).await,
        };

        match result {
            Ok(outcome) => {
                println!("  {} {}", "✓".green(), format_effect(&effect));
                success_count += 1;
                record_outcome(&mut state, &mut bindings, outcome, provider_name);
                persist(backend, &mut state).await?;
            }
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), format_effect(&effect), e);
                record_failure(&mut state, &effect, &e, provider_name);
                persist(backend, &mut state).await?;
                println!();
                println!(
                    "{}",
                    format!(
                        "Apply failed. {} succeeded, 1 failed, {} not attempted.",
                        success_count,
                        plan.effects().len() - success_count - 1
                    )
                    .red()
                    .bold()
                );
                return Err(e.to_string());
            }
        }
    }

    println!();
    println!(
        "{}",
        format!("Apply complete! {} changes applied.", success_count)
            .green()
            .bold()
    );
    Ok(())
}

async fn run_destroy(
    file: &Path,
    auto_approve: bool,
    cancel: CancellationToken,
) -> Result<(), String> {
    let manifest = Manifest::load(file)?;
    let provider = get_provider(&manifest, cancel).await?;
    let backend = create_backend(&manifest.backend).map_err(|e| e.to_string())?;

    let lock = backend
        .acquire_lock("destroy")
        .await
        .map_err(|e| e.to_string())?;
    let result = destroy_locked(backend.as_ref(), provider, auto_approve).await;
    release_lock(backend.as_ref(), &lock).await;
    result
}

async fn destroy_locked(
    backend: &dyn StateBackend,
    provider: Box<dyn Provider>,
    auto_approve: bool,
) -> Result<(), String> {
    let Some(mut state) = backend.read_state().await.map_err(|e| e.to_string())? else {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    };
    refresh(provider.as_ref(), &mut state).await?;

    let plan = destroy_plan(&state.states());
    if plan.is_empty() {
        persist(backend, &mut state).await?;
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for effect in plan.effects() {
        println!("  {}", effect.to_string().red());
    }
    println!();
    println!(
        "Plan: {} to destroy.",
        plan.mutation_count().to_string().red()
    );
    println!();

    if !auto_approve && !confirm("Do you really want to destroy all resources?")? {
        println!();
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let provider_name = provider.name();
    let interpreter = Interpreter::new(provider);
    let mut success_count = 0;
    let mut failure_count = 0;

    // Keep going past failures; later deletions do not depend on earlier ones
    for effect in plan.effects() {
        match interpreter.execute(effect).await {
            Ok(outcome) => {
                println!("  {} {}", "✓".green(), format_effect(effect));
                success_count += 1;
                let mut bindings = Bindings::default();
                record_outcome(&mut state, &mut bindings, outcome, provider_name);
                persist(backend, &mut state).await?;
            }
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), format_effect(effect), e);
                failure_count += 1;
            }
        }
    }

    println!();
    if failure_count == 0 {
        println!(
            "{}",
            format!("Destroy complete! {} resources destroyed.", success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        println!(
            "{}",
            format!(
                "Destroy failed. {} succeeded, {} failed.",
                success_count, failure_count
            )
            .red()
            .bold()
        );
        Err(format!("{} resources could not be destroyed", failure_count))
    }
}

async fn run_force_unlock(file: &Path, lock_id: &str) -> Result<(), String> {
    let manifest = Manifest::load(file)?;
    let backend = create_backend(&manifest.backend).map_err(|e| e.to_string())?;
    backend
        .force_unlock(lock_id)
        .await
        .map_err(|e| e.to_string())?;
    println!("{}", format!("Lock {} removed.", lock_id).green());
    Ok(())
}

fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
    println!(
        "  {}",
        "This action cannot be undone. Type 'yes' to confirm.".yellow()
    );
    print!("\n  Enter a value: ");
    std::io::stdout().flush().map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    Ok(input.trim() == "yes")
}

/// Read every recorded resource from the provider
///
/// Resources deleted outside settle drop out of the state.
async fn refresh(provider: &dyn Provider, state: &mut StateFile) -> Result<(), String> {
    for recorded in state.states() {
        let refreshed = provider
            .read(&recorded.id, recorded.identifier.as_deref())
            .await
            .map_err(|e| format!("Failed to read state: {}", e))?;
        if !refreshed.exists {
            log::warn!("{} no longer exists remotely", recorded.id);
        }
        state.record(&refreshed, provider.name());
    }
    Ok(())
}

async fn persist(backend: &dyn StateBackend, state: &mut StateFile) -> Result<(), String> {
    state.increment_serial();
    backend
        .write_state(state)
        .await
        .map_err(|e| format!("Failed to write state: {}", e))
}

async fn release_lock(backend: &dyn StateBackend, lock: &LockInfo) {
    if let Err(e) = backend.release_lock(lock).await {
        eprintln!(
            "{} failed to release lock {}: {}",
            "Warning:".yellow().bold(),
            lock.id,
            e
        );
    }
}

fn record_outcome(
    state: &mut StateFile,
    bindings: &mut Bindings,
    outcome: EffectOutcome,
    provider_name: &str,
) {
    match outcome {
        EffectOutcome::Read { state: settled }
        | EffectOutcome::Created { state: settled }
        | EffectOutcome::Updated { state: settled } => {
            state.record(&settled, provider_name);
            bindings.record(&settled);
        }
        EffectOutcome::Deleted { id } => {
            state.remove_resource(&id);
            bindings.remove(&id.name);
        }
    }
}

/// Keep a half-created resource in state so the next run can find it
fn record_failure(
    state: &mut StateFile,
    effect: &Effect,
    error: &ProviderError,
    provider_name: &str,
) {
    if let (Effect::Create(resource), Some(identifier)) = (effect, &error.identifier)
        && state.find_resource(&resource.id).is_none()
    {
        log::warn!(
            "{} was dispatched as {} but did not settle; recording it",
            resource.id,
            identifier
        );
        state.upsert_resource(
            ResourceState::new(&resource.id.resource_type, &resource.id.name, provider_name)
                .with_identifier(identifier.clone()),
        );
    }
}

fn pending_refs(effect: &Effect) -> Option<Vec<String>> {
    let resource = match effect {
        Effect::Create(resource) | Effect::Update { to: resource, .. } => resource,
        Effect::Read { .. } | Effect::Delete { .. } => return None,
    };
    let refs = unresolved_refs(resource);
    (!refs.is_empty()).then_some(refs)
}

fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        match effect {
            Effect::Create(resource) => {
                println!("  {}", effect.to_string().green().bold());
                for (key, value) in sorted(&resource.attributes) {
                    println!("      {}: {}", key, format_value(value));
                }
            }
            Effect::Update { from, to, .. } => {
                println!("  {}", effect.to_string().yellow().bold());
                for (key, change) in changed_attributes(from, to) {
                    println!("      {}: {}", key, change);
                }
            }
            Effect::Delete { .. } => println!("  {}", effect.to_string().red().bold()),
            Effect::Read { .. } => println!("  {}", effect.to_string().dimmed()),
        }
    }

    println!();
    println!("{}", plan.summary().to_string().bold());
}

fn sorted(attributes: &HashMap<String, Value>) -> Vec<(&String, &Value)> {
    let mut attrs: Vec<_> = attributes.iter().collect();
    attrs.sort_by_key(|(k, _)| *k);
    attrs
}

/// Attributes the differ considers changed, as "old → new"
fn changed_attributes(from: &State, to: &Resource) -> Vec<(String, String)> {
    let Diff::Update {
        changed_attributes, ..
    } = diff(to, from)
    else {
        return Vec::new();
    };
    changed_attributes
        .into_iter()
        .map(|key| {
            let old = from
                .attributes
                .get(&key)
                .map(format_value)
                .unwrap_or_else(|| "(unset)".to_string());
            let new = to
                .attributes
                .get(&key)
                .map(format_value)
                .unwrap_or_else(|| "(unset)".to_string());
            let change = format!("{} → {}", old, new);
            (key, change)
        })
        .collect()
}

fn format_effect(effect: &Effect) -> String {
    let id: &ResourceId = effect.resource_id();
    match effect {
        Effect::Create(_) => format!("Create {}", id),
        Effect::Update { .. } => format!("Update {}", id),
        Effect::Delete { identifier, .. } => format!("Delete {} ({})", id, identifier),
        Effect::Read { .. } => format!("Read {}", id),
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(i) => i.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let strs: Vec<String> = sorted(map)
                .into_iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            format!("{{{}}}", strs.join(", "))
        }
        Value::ResourceRef(name, attribute) => {
            format!("{}.{} (known after apply)", name, attribute)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use settle_core::error::ErrorKind;
    use settle_core::status::Operation;

    #[test]
    fn format_value_is_stable() {
        let value = Value::Map(HashMap::from([
            ("b".to_string(), Value::Int(2)),
            ("a".to_string(), Value::List(vec![Value::Bool(true)])),
        ]));
        assert_eq!(format_value(&value), "{a: [true], b: 2}");
        assert_eq!(
            format_value(&Value::ResourceRef("main".to_string(), "id".to_string())),
            "main.id (known after apply)"
        );
    }

    #[test]
    fn changed_attributes_lists_only_differences() {
        let from = State::existing(
            ResourceId::new("kx.environment", "main"),
            HashMap::from([
                ("name".to_string(), Value::String("research".to_string())),
                ("description".to_string(), Value::String("old".to_string())),
            ]),
        );
        let to = Resource::new("kx.environment", "main")
            .with_attribute("name", Value::String("research".to_string()))
            .with_attribute("description", Value::String("new".to_string()));

        assert_eq!(
            changed_attributes(&from, &to),
            vec![(
                "description".to_string(),
                "\"old\" → \"new\"".to_string()
            )]
        );
    }

    #[test]
    fn pending_refs_only_for_create_and_update() {
        let create = Effect::Create(
            Resource::new("kx.volume", "data").with_attribute(
                "environment_id",
                Value::ResourceRef("main".to_string(), "id".to_string()),
            ),
        );
        assert_eq!(pending_refs(&create), Some(vec!["main.id".to_string()]));

        let delete = Effect::Delete {
            id: ResourceId::new("kx.volume", "data"),
            identifier: "env-1,data".to_string(),
        };
        assert_eq!(pending_refs(&delete), None);
    }

    #[test]
    fn failed_create_with_identifier_is_recorded() {
        let mut state = StateFile::new();
        let effect = Effect::Create(Resource::new("kx.cluster", "hdb"));
        let error = ProviderError::new(ErrorKind::Cancelled { last_status: None })
            .during(Operation::Create, Some("env-1,hdb"));

        record_failure(&mut state, &effect, &error, "aws");

        let recorded = state
            .find_resource(&ResourceId::new("kx.cluster", "hdb"))
            .unwrap();
        assert_eq!(recorded.identifier.as_deref(), Some("env-1,hdb"));

        let mut untouched = StateFile::new();
        record_failure(&mut untouched, &effect, &ProviderError::api("denied"), "aws");
        assert!(untouched.resources.is_empty());
    }

    #[test]
    fn outcomes_update_state_and_bindings() {
        let mut state = StateFile::new();
        let mut bindings = Bindings::default();
        let id = ResourceId::new("kx.environment", "main");
        let created = State::existing(
            id.clone(),
            HashMap::from([("id".to_string(), Value::String("env-1".to_string()))]),
        )
        .with_identifier("env-1");

        record_outcome(
            &mut state,
            &mut bindings,
            EffectOutcome::Created { state: created },
            "aws",
        );
        assert!(state.find_resource(&id).is_some());

        let volume = Resource::new("kx.volume", "data").with_attribute(
            "environment_id",
            Value::ResourceRef("main".to_string(), "id".to_string()),
        );
        assert!(unresolved_refs(&bindings.resolve(&volume)).is_empty());

        record_outcome(
            &mut state,
            &mut bindings,
            EffectOutcome::Deleted { id: id.clone() },
            "aws",
        );
        assert!(state.find_resource(&id).is_none());
        assert_eq!(unresolved_refs(&bindings.resolve(&volume)).len(), 1);
    }

    #[test]
    fn cli_parses_id_commands() {
        let cli = Cli::try_parse_from([
            "settle", "-vv", "id", "decode", "env-1,hdb", "--parts", "2",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::Id {
                command: IdCommands::Decode { parts: Some(2), .. }
            }
        ));

        assert!(Cli::try_parse_from(["settle", "id", "encode"]).is_err());
    }

    #[test]
    fn id_decode_checks_part_count() {
        let result = run_id_command(IdCommands::Decode {
            identifier: "env-1,hdb".to_string(),
            parts: Some(3),
        });
        assert!(result.unwrap_err().contains("expected 3 parts, found 2"));

        let result = run_id_command(IdCommands::Encode {
            parts: vec!["a,b".to_string()],
        });
        assert!(result.is_err());
    }
}
