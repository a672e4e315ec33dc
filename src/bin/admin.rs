//! CLI administration tool for shortlink.
//!
//! Creates, resolves and deletes short links, inspects rate limits and
//! checks the database without going through an HTTP front end.
//!
//! # Usage
//!
//! ```bash
//! # Shorten a URL
//! cargo run --bin admin -- shorten https://example.com --alias docs
//!
//! # Resolve a short code
//! cargo run --bin admin -- resolve docs
//!
//! # Delete a short link
//! cargo run --bin admin -- delete docs
//!
//! # Preview the code generated for a URL
//! cargo run --bin admin -- encode https://example.com --length 8
//!
//! # Rate limits
//! cargo run --bin admin -- rate allow 203.0.113.7 --ip --count 5
//! cargo run --bin admin -- rate info 203.0.113.7 --ip
//! cargo run --bin admin -- rate reset 203.0.113.7 --ip
//!
//! # Check database connection
//! cargo run --bin admin -- db check
//! ```
//!
//! # Environment Variables
//!
//! Read through [`shortlink::config`]. Without `DATABASE_URL` the in-memory
//! stack is used, so links only live for the duration of one command.

use shortlink::application::services::{ShortenRequest, ShortenedUrl};
use shortlink::bootstrap::{self, Services};
use shortlink::config::{self, Config};
use shortlink::domain::repositories::UrlRepository;
use shortlink::telemetry;
use shortlink::utils::code_generator::{CodeGenerator, GenerationMode};
use shortlink::utils::rate_limit_key::RateLimitKey;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Confirm;
use sqlx::PgPool;
use std::time::Duration;

/// CLI tool for managing shortlink.
#[derive(Parser)]
#[command(name = "admin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Top-level commands.
#[derive(Subcommand)]
enum Commands {
    /// Create a short link
    Shorten {
        /// Absolute http(s) URL to shorten
        url: String,

        /// Custom alias instead of a generated code
        #[arg(short, long)]
        alias: Option<String>,

        /// Lifetime in seconds
        #[arg(short, long)]
        expires_in: Option<u64>,

        /// Owner of the link
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Resolve a short code to its URL
    Resolve { code: String },

    /// Delete a short link
    Delete {
        code: String,

        /// Owner of the link
        #[arg(short, long)]
        user: Option<String>,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Print the deterministic code for a URL
    Encode {
        url: String,

        /// Code length (4-10)
        #[arg(short, long, default_value_t = 7)]
        length: usize,
    },

    /// Inspect and manipulate rate limits
    Rate {
        #[command(subcommand)]
        action: RateAction,
    },

    /// Database operations
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

/// Rate limit subcommands.
#[derive(Subcommand)]
enum RateAction {
    /// Record requests and print each decision
    Allow {
        key: String,

        /// Treat the key as a client IP address
        #[arg(long)]
        ip: bool,

        /// Number of requests to record
        #[arg(short, long, default_value_t = 1)]
        count: u32,
    },

    /// Show the current state of a key
    Info {
        key: String,

        #[arg(long)]
        ip: bool,
    },

    /// Clear the state of a key
    Reset {
        key: String,

        #[arg(long)]
        ip: bool,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

/// Database operation subcommands.
#[derive(Subcommand)]
enum DbAction {
    /// Check database connection
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = config::load_from_env()?;

    // CLI output goes to stdout; keep logs quiet unless asked for
    telemetry::init_tracing("warn", &config.log_format)?;

    match cli.command {
        Commands::Encode { url, length } => encode(&url, length),
        Commands::Db { action } => handle_db_action(action, &config).await,
        command => {
            if config.database_url.is_some() {
                let services = bootstrap::connect(&config).await?;
                run(command, services).await
            } else {
                println!(
                    "{}",
                    "⚠️  DATABASE_URL not set, using in-memory storage".yellow()
                );
                let services = bootstrap::in_memory(&config);
                run(command, services).await
            }
        }
    }
}

/// Runs a command against wired services, then flushes pending side effects.
async fn run<R: UrlRepository + 'static>(command: Commands, services: Services<R>) -> Result<()> {
    let result = match command {
        Commands::Shorten {
            url,
            alias,
            expires_in,
            user,
        } => shorten(&services, url, alias, expires_in, user).await,
        Commands::Resolve { code } => resolve(&services, &code).await,
        Commands::Delete { code, user, yes } => delete(&services, &code, user, yes).await,
        Commands::Rate { action } => handle_rate_action(&services, action).await,
        Commands::Encode { .. } | Commands::Db { .. } => Ok(()),
    };

    services.shutdown().await;
    result
}

async fn shorten<R: UrlRepository>(
    services: &Services<R>,
    url: String,
    alias: Option<String>,
    expires_in: Option<u64>,
    user: Option<String>,
) -> Result<()> {
    println!("{}", "🔗 Shorten URL".bright_blue().bold());
    println!();

    let mut request = ShortenRequest::new(url);
    if let Some(alias) = alias {
        request = request.with_alias(alias);
    }
    if let Some(secs) = expires_in {
        request = request.expires_in(Duration::from_secs(secs));
    }
    if let Some(user) = user {
        request = request.for_user(user);
    }

    let ShortenedUrl {
        record,
        short_url,
        created,
    } = services
        .state
        .links
        .shorten(request)
        .await
        .context("Failed to shorten URL")?;

    if created {
        println!("{}", "✅ Short link created".green().bold());
    } else {
        println!("{}", "ℹ️  Existing short link returned".yellow());
    }
    println!();
    println!("  Code:      {}", record.short_code.cyan());
    println!("  Short URL: {}", short_url.bright_yellow().bold());
    println!("  Target:    {}", record.original_url.bright_white());
    if let Some(expires_at) = record.expires_at {
        println!(
            "  Expires:   {}",
            expires_at
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string()
                .bright_black()
        );
    }
    println!();

    Ok(())
}

async fn resolve<R: UrlRepository>(services: &Services<R>, code: &str) -> Result<()> {
    let url = services
        .state
        .resolver
        .resolve(code, None)
        .await
        .with_context(|| format!("Failed to resolve '{code}'"))?;

    println!("{} → {}", code.cyan(), url.bright_white());
    Ok(())
}

/// Deletes a link with confirmation prompt.
///
/// Requires confirmation (default: No) unless `--yes` is given.
async fn delete<R: UrlRepository>(
    services: &Services<R>,
    code: &str,
    user: Option<String>,
    skip_confirm: bool,
) -> Result<()> {
    println!("{}", "🗑️  Delete Short Link".bright_blue().bold());
    println!();

    let record = services
        .state
        .links
        .get(code)
        .await
        .with_context(|| format!("Short link '{code}' not found"))?;

    println!("  Code:   {}", record.short_code.cyan());
    println!("  Target: {}", record.original_url.bright_white());
    println!(
        "  Clicks: {}",
        record.click_count.to_string().bright_black()
    );
    println!();

    if !skip_confirm {
        let confirmed = Confirm::new()
            .with_prompt("Delete this short link?")
            .default(false)
            .interact()?;

        if !confirmed {
            println!("{}", "❌ Cancelled".red());
            return Ok(());
        }
    }

    services
        .state
        .links
        .delete(code, user.as_deref())
        .await
        .context("Failed to delete short link")?;

    println!("{}", "✅ Short link deleted".green().bold());
    println!();

    Ok(())
}

fn encode(url: &str, length: usize) -> Result<()> {
    let generator = CodeGenerator::new(GenerationMode::Deterministic, length);
    let code = generator.generate(url, 0);

    println!("{} → {}", url.bright_white(), code.cyan().bold());
    if generator.length() != length {
        println!(
            "{}",
            format!(
                "⚠️  Length {} out of range, used {}",
                length,
                generator.length()
            )
            .yellow()
        );
    }

    Ok(())
}

/// Dispatches rate limit commands.
async fn handle_rate_action<R: UrlRepository>(
    services: &Services<R>,
    action: RateAction,
) -> Result<()> {
    let limiter = &services.state.rate_limiter;
    let config = limiter.config();

    println!(
        "{} {} per {}s",
        limiter.algorithm().to_string().bright_blue().bold(),
        config.limit,
        config.window.as_secs()
    );
    println!();

    match action {
        RateAction::Allow { key, ip, count } => {
            let key = limit_key(&key, ip);

            for i in 1..=count {
                let decision = limiter
                    .check(&key)
                    .await
                    .context("Rate limit check failed")?;

                let verdict = if decision.degraded {
                    "DEGRADED".yellow()
                } else if decision.allowed {
                    "ALLOWED".green()
                } else {
                    "DENIED".red()
                };

                println!(
                    "  {:>3}  {:<8}  remaining {:<6} retry after {}ms",
                    i.to_string().bright_black(),
                    verdict,
                    decision.info.remaining,
                    decision.retry_after.as_millis()
                );
            }
        }
        RateAction::Info { key, ip } => {
            let key = limit_key(&key, ip);
            let info = limiter
                .info(&key)
                .await
                .context("Failed to read rate limit state")?;

            println!("  Key:       {}", key.cyan());
            println!("  Count:     {}", info.count.to_string().bright_white());
            println!("  Limit:     {}", info.limit.to_string().bright_white());
            println!(
                "  Remaining: {}",
                info.remaining.to_string().bright_green().bold()
            );
            println!(
                "  Resets at: {}",
                info.reset_at
                    .format("%Y-%m-%d %H:%M:%S UTC")
                    .to_string()
                    .bright_black()
            );
        }
        RateAction::Reset { key, ip, yes } => {
            let key = limit_key(&key, ip);

            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt(format!("Reset rate limit for '{key}'?"))
                    .default(false)
                    .interact()?;

                if !confirmed {
                    println!("{}", "❌ Cancelled".red());
                    return Ok(());
                }
            }

            limiter
                .reset(&key)
                .await
                .context("Failed to reset rate limit")?;

            println!("{}", "✅ Rate limit reset".green().bold());
        }
    }

    println!();
    Ok(())
}

fn limit_key(raw: &str, ip: bool) -> String {
    if ip {
        RateLimitKey::ip(raw).to_string()
    } else {
        raw.to_string()
    }
}

/// Handles database diagnostic commands.
async fn handle_db_action(action: DbAction, config: &Config) -> Result<()> {
    match action {
        DbAction::Check => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;

            println!("{}", "🔍 Checking database connection...".bright_blue());

            let pool = PgPool::connect(database_url)
                .await
                .context("Failed to connect to database")?;

            sqlx::query("SELECT 1").fetch_one(&pool).await?;

            let urls: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM urls WHERE deleted_at IS NULL")
                    .fetch_one(&pool)
                    .await
                    .unwrap_or(0);

            println!("{}", "✅ Database connection OK".green().bold());
            println!("  Links: {}", urls.to_string().bright_green().bold());
        }
    }

    Ok(())
}
