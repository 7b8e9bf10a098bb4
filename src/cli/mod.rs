//! # Command Line Interface
//!
//! Reads, writes, provisions and reverts tag secrets, and manages the local
//! database. Configuration comes from `--config`, `TAGVAULT__*` environment
//! variables and `.env`.

pub mod output;

use crate::config::{AppConfig, DatabaseConfig};
use crate::domain::{
    Actor, ApplicationId, ApplicationRef, EnvironmentId, EnvironmentRef, SecretKeyValues,
};
use crate::observability::{init_observability, log_config_info};
use crate::secrets::{BackendClientCache, SecretBackendRegistry};
use crate::services::{TagAddress, TagSecretService};
use crate::storage::{
    create_pool, get_migration_version, list_applied_migrations, run_migrations,
    validate_migrations, MigrationInfo,
};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use output::OutputFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tagvault")]
#[command(about = "Tag-based secret inheritance on top of external secret managers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database URL override
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Actor id recorded in the version ledger
    #[arg(long, global = true, default_value = "cli")]
    pub actor_id: String,

    /// Actor name recorded in the version ledger
    #[arg(long, global = true, default_value = "tagvault cli")]
    pub actor_name: String,
}

/// Application, environment and tag of one secret
#[derive(Args, Debug, Clone)]
pub struct TagArgs {
    pub application: String,
    pub environment: String,
    pub tag: String,
}

impl From<TagArgs> for TagAddress {
    fn from(args: TagArgs) -> Self {
        TagAddress::new(args.application, args.environment, args.tag)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show a tag's values merged with its base
    Get {
        #[command(flatten)]
        tag: TagArgs,
    },

    /// Show the raw values of one version
    GetVersion {
        #[command(flatten)]
        tag: TagArgs,
        #[arg(value_name = "VERSION")]
        version_id: String,
    },

    /// Set keys on a tag from a JSON object
    Set {
        #[command(flatten)]
        tag: TagArgs,
        /// JSON object of key/value pairs, e.g. '{"API_KEY":"abc"}'
        #[arg(long)]
        values: String,
        /// Fail unless this is still the current version
        #[arg(long)]
        expected_version: Option<String>,
    },

    /// Remove keys from a tag
    DeleteKeys {
        #[command(flatten)]
        tag: TagArgs,
        #[arg(required = true)]
        keys: Vec<String>,
        /// Fail unless this is still the current version
        #[arg(long)]
        expected_version: Option<String>,
    },

    /// Create a tag's secret in one or more environments
    Provision {
        application: String,
        tag: String,
        /// Comma-separated environment names
        #[arg(long, value_delimiter = ',', required = true)]
        environments: Vec<String>,
        /// Initial JSON object of key/value pairs
        #[arg(long, default_value = "{}")]
        values: String,
        /// Application id; defaults to the application name
        #[arg(long)]
        application_id: Option<String>,
    },

    /// Show backend versions with their ledger entries
    History {
        #[command(flatten)]
        tag: TagArgs,
        /// Output format: json or table
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Write an older version's content back as a new version
    Revert {
        #[command(flatten)]
        tag: TagArgs,
        /// The version currently live
        #[arg(long)]
        current: String,
        /// The version whose content to restore
        #[arg(long)]
        to: String,
    },

    /// Database management commands
    Database {
        #[command(subcommand)]
        command: DatabaseCommands,
    },
}

#[derive(Subcommand)]
pub enum DatabaseCommands {
    /// Run pending migrations
    Migrate,

    /// Show migration status
    Status,

    /// List all applied migrations
    List,
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }

    init_observability(&config.observability)?;
    log_config_info(&config);

    let actor = Actor::new(cli.actor_id, cli.actor_name);

    match cli.command {
        Commands::Database { command } => handle_database_command(command, &config.database).await,
        command => {
            let service = build_service(&config).await?;
            handle_secret_command(command, &service, &actor).await
        }
    }
}

async fn build_service(config: &AppConfig) -> anyhow::Result<TagSecretService> {
    let pool = create_pool(&config.database).await?;
    let cache = BackendClientCache::new(
        config.secrets.client_cache_capacity,
        config.secrets.client_cache_ttl(),
    );
    let registry =
        SecretBackendRegistry::with_default_factories(cache, config.secrets.call_timeout());

    let service = TagSecretService::connect(
        pool,
        &registry,
        &config.backend.credentials(),
        config.secrets.concurrency_mode,
    )
    .await?;
    Ok(service)
}

async fn handle_secret_command(
    command: Commands,
    service: &TagSecretService,
    actor: &Actor,
) -> anyhow::Result<()> {
    match command {
        Commands::Get { tag } => {
            let view = service.get_merged(&tag.into()).await?;
            output::print_json(&view)?;
        }

        Commands::GetVersion { tag, version_id } => {
            let payload = service.get_version(&tag.into(), &version_id).await?;
            output::print_json(&payload.key_values)?;
        }

        Commands::Set { tag, values, expected_version } => {
            let delta = SecretKeyValues::from_json_str(&values)?;
            let written =
                service.update(&tag.into(), &delta, actor, expected_version.as_deref()).await?;
            output::print_json(&written)?;
        }

        Commands::DeleteKeys { tag, keys, expected_version } => {
            let written =
                service.delete_keys(&tag.into(), &keys, actor, expected_version.as_deref()).await?;
            output::print_json(&written)?;
        }

        Commands::Provision { application, tag, environments, values, application_id } => {
            let initial = SecretKeyValues::from_json_str(&values)?;
            let application = ApplicationRef {
                id: ApplicationId::from(application_id.unwrap_or_else(|| application.clone())),
                name: application,
            };
            let environments: Vec<EnvironmentRef> = environments
                .into_iter()
                .map(|name| EnvironmentRef { id: EnvironmentId::from(name.as_str()), name })
                .collect();

            let report =
                service.provision(&application, &environments, &tag, &initial, actor).await?;
            output::print_provision_report(&report);
            report.into_result()?;
        }

        Commands::History { tag, output: format } => {
            let format: OutputFormat = format.parse()?;
            let timeline = service.timeline(&tag.into()).await?;
            output::print_timeline(&timeline, format)?;
        }

        Commands::Revert { tag, current, to } => {
            let report = service.revert(&tag.into(), &current, &to, actor).await?;
            if !report.ledger_recorded() {
                eprintln!("Warning: revert succeeded but the ledger entry could not be written");
            }
            output::print_json(&report)?;
        }

        Commands::Database { .. } => {
            anyhow::bail!("Database commands do not use a secret backend")
        }
    }

    Ok(())
}

/// Handle database management commands
async fn handle_database_command(
    command: DatabaseCommands,
    config: &DatabaseConfig,
) -> anyhow::Result<()> {
    let config = DatabaseConfig { auto_migrate: false, ..config.clone() };
    let pool = create_pool(&config).await.context("Failed to open database")?;

    match command {
        DatabaseCommands::Migrate => {
            println!("Running database migrations...");
            run_migrations(&pool).await?;
            println!("Migrations completed successfully!");
        }

        DatabaseCommands::Status => {
            let version = get_migration_version(&pool).await?;
            let is_valid = validate_migrations(&pool).await?;
            match version {
                Some(version) => println!("Current schema version: {}", version),
                None => println!("No migrations have been applied"),
            }
            if is_valid {
                println!("✅ Database schema is up to date");
            } else {
                println!("⚠️  Database schema has pending migrations");
                std::process::exit(1);
            }
        }

        DatabaseCommands::List => {
            let migrations = list_applied_migrations(&pool).await?;
            if migrations.is_empty() {
                println!("No migrations have been applied");
            } else {
                println!("Applied migrations:");
                print_migrations_table(&migrations);
            }
        }
    }

    Ok(())
}

/// Print migrations in a formatted table
fn print_migrations_table(migrations: &[MigrationInfo]) {
    println!();
    println!("{:<15} {:<50} {:<25} {:<10}", "Version", "Description", "Applied On", "Time (ms)");
    println!("{}", "-".repeat(100));

    for migration in migrations {
        println!(
            "{:<15} {:<50} {:<25} {:<10}",
            migration.version,
            output::truncate(&migration.description, 48),
            migration.installed_on.format("%Y-%m-%d %H:%M:%S"),
            migration.execution_time / 1_000_000
        );
    }
}
