//! omni-admin - Operator tool for Omnicast
//!
//! Manages reseller OAuth applications, inspects connected accounts and
//! refreshes post analytics without going through the HTTP API.

use std::io::Read;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use libomnicast::logging::{LogFormat, LoggingConfig};
use libomnicast::service::analytics::{AnalyticsOverview, MetricTotals};
use libomnicast::service::oauth::ConnectionSummary;
use libomnicast::{
    AppConfigRecord, AppConfigRepository, Config, CredentialStore, OmnicastError,
    OmnicastService, PlatformKind, Result, TenantContext,
};

#[derive(Parser, Debug)]
#[command(name = "omni-admin")]
#[command(version, about = "Administer Omnicast app configs, connections and analytics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file (overrides OMNICAST_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage reseller OAuth applications
    #[command(subcommand)]
    AppConfig(AppConfigCommand),

    /// Inspect connected accounts
    #[command(subcommand)]
    Credentials(CredentialsCommand),

    /// Refresh and summarize post analytics
    #[command(subcommand)]
    Analytics(AnalyticsCommand),
}

#[derive(Subcommand, Debug)]
enum AppConfigCommand {
    /// Create or replace a reseller's OAuth application
    Set {
        /// Platform (facebook, instagram, linkedin, youtube) or app key
        app: String,

        #[arg(long)]
        reseller: String,

        #[arg(long)]
        client_id: String,

        /// Client secret; prefer OMNICAST_CLIENT_SECRET or --secret-stdin
        #[arg(long, env = "OMNICAST_CLIENT_SECRET", hide_env_values = true)]
        client_secret: Option<String>,

        /// Read the client secret from stdin
        #[arg(long, conflicts_with = "client_secret")]
        secret_stdin: bool,

        #[arg(long)]
        redirect_url: String,
    },

    /// List OAuth applications (secrets are never shown)
    List {
        /// Only this reseller's rows
        #[arg(long)]
        reseller: Option<String>,
    },

    /// Delete a reseller's OAuth application
    Delete {
        app: String,

        #[arg(long)]
        reseller: String,
    },
}

#[derive(Subcommand, Debug)]
enum CredentialsCommand {
    /// List a tenant's connected accounts (without tokens)
    List {
        #[arg(long)]
        tenant: String,
    },
}

#[derive(Subcommand, Debug)]
enum AnalyticsCommand {
    /// Fetch fresh metrics for one post
    Refresh {
        #[arg(long)]
        tenant: String,

        #[arg(long)]
        post_id: String,

        /// Reseller whose OAuth app is used if a token must be refreshed
        #[arg(long)]
        reseller: Option<String>,
    },

    /// Sum stored metrics per platform
    Overview {
        #[arg(long)]
        tenant: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    LoggingConfig::new(LogFormat::Text, level.to_string(), cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    tracing::debug!("Using database {}", config.database.path);
    let service = OmnicastService::from_config(config).await?;

    match cli.command {
        Commands::AppConfig(command) => app_config(&service, command, cli.format).await,
        Commands::Credentials(CredentialsCommand::List { tenant }) => {
            list_credentials(&service, &tenant, cli.format).await
        }
        Commands::Analytics(command) => analytics(&service, command, cli.format).await,
    }
}

/// Accept `facebook` as well as `app/facebook`
fn app_key(app: &str) -> Result<&'static str> {
    let platform: PlatformKind = app.strip_prefix("app/").unwrap_or(app).parse()?;
    Ok(platform.app_key())
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| OmnicastError::InvalidInput(format!("Failed to serialize output: {}", e)))?;
    println!("{}", json);
    Ok(())
}

fn format_time(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

async fn app_config(service: &OmnicastService, command: AppConfigCommand, format: OutputFormat) -> Result<()> {
    let db = service.database();

    match command {
        AppConfigCommand::Set {
            app,
            reseller,
            client_id,
            client_secret,
            secret_stdin,
            redirect_url,
        } => {
            let client_secret = if secret_stdin {
                let mut buffer = String::new();
                std::io::stdin()
                    .read_to_string(&mut buffer)
                    .map_err(|e| OmnicastError::InvalidInput(format!("Failed to read stdin: {}", e)))?;
                buffer.trim().to_string()
            } else {
                client_secret.unwrap_or_default()
            };

            let app_name = app_key(&app)?;
            let mut record = AppConfigRecord::new(app_name, reseller, client_id, client_secret, redirect_url);
            if !record.is_complete() {
                return Err(OmnicastError::InvalidInput(
                    "client id, client secret and redirect URL are all required".to_string(),
                ));
            }
            if let Some(existing) = db.find(app_name, &record.reseller_id).await? {
                record.created_at = existing.created_at;
            }
            AppConfigRepository::upsert(db, &record).await?;

            match format {
                OutputFormat::Json => print_json(&record)?,
                OutputFormat::Text => println!("✓ Saved {} for reseller {}", app_name, record.reseller_id),
            }
            Ok(())
        }
        AppConfigCommand::List { reseller } => {
            let rows = AppConfigRepository::list(db, reseller.as_deref()).await?;
            match format {
                OutputFormat::Json => print_json(&rows)?,
                OutputFormat::Text => {
                    if rows.is_empty() {
                        println!("No app configs stored");
                    }
                    for row in &rows {
                        println!(
                            "{:<14} {:<20} client_id={} redirect={} updated={}",
                            row.app_name,
                            row.reseller_id,
                            row.client_id,
                            row.redirect_url,
                            format_time(row.updated_at)
                        );
                    }
                }
            }
            Ok(())
        }
        AppConfigCommand::Delete { app, reseller } => {
            let app_name = app_key(&app)?;
            if !AppConfigRepository::delete(db, app_name, &reseller).await? {
                return Err(OmnicastError::NotFound(format!(
                    "No {} config for reseller {}",
                    app_name, reseller
                )));
            }
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "deleted": true,
                    "appName": app_name,
                    "resellerId": reseller,
                }))?,
                OutputFormat::Text => println!("✓ Deleted {} for reseller {}", app_name, reseller),
            }
            Ok(())
        }
    }
}

async fn list_credentials(service: &OmnicastService, tenant: &str, format: OutputFormat) -> Result<()> {
    let connections: Vec<ConnectionSummary> = CredentialStore::list(service.database(), tenant)
        .await?
        .iter()
        .map(ConnectionSummary::from)
        .collect();

    match format {
        OutputFormat::Json => print_json(&connections)?,
        OutputFormat::Text => {
            if connections.is_empty() {
                println!("No accounts connected for tenant {}", tenant);
            }
            for connection in &connections {
                let expiry = connection
                    .expires_at
                    .map(format_time)
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{:<10} {} ({}) expires={} connected_by={}",
                    connection.platform,
                    connection.account_label,
                    connection.account_id,
                    expiry,
                    connection.connected_by
                );
            }
        }
    }
    Ok(())
}

fn print_totals(label: &str, totals: &MetricTotals) {
    println!(
        "{:<10} posts={} engagement={} synced={} pending={} failed={}",
        label,
        totals.posts,
        totals.engagement,
        totals.status.synced,
        totals.status.pending,
        totals.status.failed
    );
    for (metric, value) in &totals.metrics {
        println!("  {:<12} {}", metric, value);
    }
}

fn print_overview(overview: &AnalyticsOverview) {
    print_totals("total", &overview.total);
    for (platform, totals) in &overview.platforms {
        print_totals(platform.as_str(), totals);
    }
}

async fn analytics(service: &OmnicastService, command: AnalyticsCommand, format: OutputFormat) -> Result<()> {
    match command {
        AnalyticsCommand::Refresh {
            tenant,
            post_id,
            reseller,
        } => {
            let context = TenantContext::for_user(tenant, reseller);
            let summary = service.analytics().refresh_post(&context, &post_id).await?;
            match format {
                OutputFormat::Json => print_json(&summary)?,
                OutputFormat::Text => {
                    println!(
                        "✓ Refreshed {} post {} (engagement {})",
                        summary.post.platform, summary.post.platform_post_id, summary.engagement
                    );
                    if let Some(analytics) = &summary.post.analytics {
                        for (metric, value) in &analytics.metrics {
                            println!("  {:<12} {}", metric, value);
                        }
                    }
                }
            }
            Ok(())
        }
        AnalyticsCommand::Overview { tenant } => {
            let overview = service.analytics().overview(&tenant).await?;
            match format {
                OutputFormat::Json => print_json(&overview)?,
                OutputFormat::Text => print_overview(&overview),
            }
            Ok(())
        }
    }
}
