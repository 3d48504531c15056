use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use fl_config::{report_unused_keys, resolve_secrets, UnusedKeyPolicy};

mod commands;

#[derive(Parser)]
#[command(name = "fl")]
#[command(about = "Freightline operations CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        /// Layered config paths in merge order; names the database url env var
        #[arg(long = "config")]
        config_paths: Vec<String>,

        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> overrides)
        #[arg(required = true)]
        paths: Vec<String>,

        /// Binary whose consumed keys the unused-key report is checked against
        #[arg(long, default_value = "daemon")]
        consumer: String,

        /// Fail instead of warn when unused keys are present
        #[arg(long, default_value_t = false)]
        strict: bool,
    },

    /// Compute a compensation decision offline from an assessment input
    Assess {
        /// Path to an assessment input JSON file
        #[arg(long)]
        input: String,

        /// Layered config paths; supplies the legal cap multiplier
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Print the decision as JSON instead of key=value lines
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List the status transition table for orders or packages
    Transitions {
        /// "order" | "package"
        entity: String,

        /// Only edges leaving this status
        #[arg(long)]
        from: Option<String>,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations. Guardrail: refuses while any trip is ACTIVE unless --yes is provided.
    Migrate {
        /// Acknowledge you are migrating a DB with trips on the road.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { config_paths, cmd } => {
            let loaded = commands::load_cli_config(&config_paths)?;
            let secrets = resolve_secrets(&loaded.config_json, true)?;
            let Some(url) = secrets.database_url.as_deref() else {
                bail!("SECRETS_MISSING: {} is not set", secrets.database_url_env);
            };
            let pool = fl_db::connect(url).await?;
            match cmd {
                DbCmd::Status => {
                    let s = fl_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_shipments_table={}",
                        s.ok, s.has_shipments_table
                    );
                }
                DbCmd::Migrate { yes } => {
                    let n = fl_db::count_active_trips(&pool).await?;
                    if n > 0 && !yes {
                        bail!(
                            "REFUSING MIGRATE: detected {} ACTIVE trip(s). Re-run with: `fl db migrate --yes`",
                            n
                        );
                    }

                    fl_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash {
            paths,
            consumer,
            strict,
        } => {
            let consumer = commands::parse_consumer(&consumer)?;
            let loaded = commands::load_config(&paths)?;
            loaded.settings()?;

            let policy = if strict {
                UnusedKeyPolicy::Fail
            } else {
                UnusedKeyPolicy::Warn
            };
            let report = report_unused_keys(consumer, &loaded.config_json, policy)?;
            for leaf in &report.unused_leaf_pointers {
                eprintln!("CONFIG_UNUSED_KEYS consumer={} leaf={}", report.consumer, leaf);
            }

            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Assess {
            input,
            config_paths,
            json,
        } => commands::assess::run(&input, &config_paths, json)?,

        Commands::Transitions { entity, from } => {
            commands::transitions::run(&entity, from.as_deref())?
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}
