// CLI module - command-line argument parsing and handlers
//
// Every history and question command goes through the messaging transport,
// exactly like the extension UI would. Only `config` touches files directly.
//
// Subcommands:
// - record / import: add analyses to the history
// - export / history: read it back
// - dashboard: render the aggregate views
// - ask / chat: Q&A grounded in one analysis
// - host: native-messaging host on stdio
// - config: --show, --reset, --path

use crate::config::{Config, VERSION};
use crate::dashboard::{DashboardController, TextSink};
use crate::error::CoreError;
use crate::messaging::{native, Payload, Request, Transport};
use crate::model::{AnalysisRecord, CookieCategory, CookieCounts, RiskLevel};
use crate::qa::{display_answer, QaSession, SharedProvider};
use crate::storage::import;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// privlens - privacy analysis history, dashboard and Q&A
#[derive(Parser)]
#[command(name = "privlens")]
#[command(version = VERSION)]
#[command(about = "Privacy analysis history, dashboard and Q&A", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a completed page analysis
    Record {
        /// Site the analysis is for
        site: String,

        /// Privacy score (0-100)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        score: u8,

        /// Risk level (derived from the score when omitted)
        #[arg(long, value_parser = parse_risk)]
        risk: Option<RiskLevel>,

        /// Cookie count per category, e.g. --cookie Marketing=3 (repeatable)
        #[arg(long = "cookie", value_parser = parse_cookie)]
        cookies: Vec<(CookieCategory, u32)>,

        /// Number of trackers blocked
        #[arg(long, default_value_t = 0)]
        trackers: u32,

        /// Analysis time, RFC 3339 (defaults to now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Import an extension export ({"analysisHistory": {...}})
    Import {
        /// JSON file to read
        file: PathBuf,
    },

    /// Export the history in the extension's format
    Export {
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show dashboard statistics
    Dashboard {
        /// Refresh every N seconds until interrupted
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },

    /// List recorded analyses, oldest first
    History {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Ask one question about an analysis
    Ask {
        /// Site (or record id) to ask about; defaults to the latest analysis
        #[arg(long)]
        site: Option<String>,

        /// The question
        question: String,
    },

    /// Interactive Q&A about an analysis
    Chat {
        /// Site (or record id) to ask about; defaults to the latest analysis
        #[arg(long)]
        site: Option<String>,
    },

    /// Run as a native-messaging host on stdin/stdout
    Host,

    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

fn parse_risk(s: &str) -> Result<RiskLevel, String> {
    RiskLevel::parse(s).ok_or_else(|| format!("expected Safe, Watch or Risky, got {:?}", s))
}

fn parse_cookie(s: &str) -> Result<(CookieCategory, u32), String> {
    let (name, count) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CATEGORY=COUNT, got {:?}", s))?;
    let category = CookieCategory::parse(name).ok_or_else(|| {
        format!(
            "unknown cookie category {:?} (Essential, Functional, Analytics, Marketing, Advertising)",
            name
        )
    })?;
    let count = count
        .trim()
        .parse()
        .map_err(|_| format!("cookie count must be a non-negative integer, got {:?}", count))?;
    Ok((category, count))
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime commands (everything except `config`)
// ─────────────────────────────────────────────────────────────────────────────

/// What a runtime command needs: the channel and the provider preference
pub struct App {
    pub transport: Arc<dyn Transport>,
    pub provider: SharedProvider,
}

pub async fn run(command: Commands, app: &App) -> Result<()> {
    match command {
        Commands::Record {
            site,
            score,
            risk,
            cookies,
            trackers,
            at,
        } => {
            let analyzed_at = at.unwrap_or_else(Utc::now);
            let mut cookie_categories = CookieCounts::new();
            for (category, count) in cookies {
                *cookie_categories.entry(category).or_insert(0) += count;
            }
            let record = AnalysisRecord {
                id: AnalysisRecord::composite_id(&site, analyzed_at),
                analyzed_at,
                privacy_score: score,
                risk_level: risk.unwrap_or_else(|| RiskLevel::from_score(score)),
                cookie_categories,
                trackers_blocked_count: trackers,
            };
            let id = record.id.clone();
            record_analysis(app, record).await?;
            println!("Recorded {}", id);
        }

        Commands::Import { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let records = import::parse_export(&json)
                .with_context(|| format!("Failed to import {}", file.display()))?;
            let count = records.len();
            for record in records {
                record_analysis(app, record).await?;
            }
            println!("Imported {} analys{}", count, if count == 1 { "is" } else { "es" });
        }

        Commands::Export { output } => {
            let records = fetch_history(app).await?;
            let json = serde_json::to_string_pretty(&import::to_export(&records)?)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    eprintln!("Exported {} record(s) to {}", records.len(), path.display());
                }
                None => println!("{}", json),
            }
        }

        Commands::Dashboard { watch } => {
            let sink = Arc::new(TextSink::new(std::io::stdout()));
            let controller = DashboardController::new(Arc::clone(&app.transport), sink);
            match watch {
                Some(secs) => watch_dashboard(&controller, secs).await?,
                None => {
                    let aggregate = controller.request_refresh().await?;
                    if aggregate.is_empty() {
                        println!("No analyses recorded yet. Add one with `privlens record`.");
                    }
                }
            }
        }

        Commands::History { json } => {
            let records = fetch_history(app).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No analyses recorded yet.");
            } else {
                print_history(&records);
            }
        }

        Commands::Ask { site, question } => {
            let session = open_session(app, site.as_deref()).await?;
            // Errors go back to main, which reports them once
            let answer = session.ask(&question).await?;
            println!("{}", answer);
        }

        Commands::Chat { site } => {
            let session = open_session(app, site.as_deref()).await?;
            chat(&session).await?;
        }

        Commands::Host => {
            let mut stdin = tokio::io::stdin();
            let mut stdout = tokio::io::stdout();
            native::serve(&mut stdin, &mut stdout, app.transport.as_ref()).await?;
        }

        Commands::Config { .. } => bail!("config is handled before startup"),
    }
    Ok(())
}

async fn record_analysis(app: &App, record: AnalysisRecord) -> Result<()> {
    let id = record.id.clone();
    match app.transport.send(Request::RecordAnalysis { record }).await {
        Ok(Payload::Recorded) => Ok(()),
        Ok(other) => bail!("unexpected reply to RECORD_ANALYSIS: {:?}", other),
        Err(e) => Err(CoreError::from(e)).with_context(|| format!("Failed to record {}", id)),
    }
}

async fn fetch_history(app: &App) -> Result<Vec<AnalysisRecord>> {
    match app.transport.send(Request::GetHistory).await.map_err(CoreError::from)? {
        Payload::History(records) => Ok(records),
        other => bail!("unexpected reply to GET_HISTORY: {:?}", other),
    }
}

/// Refresh on a fixed interval until Ctrl-C
///
/// Each tick is a new, explicit refresh; a failed tick is reported and the
/// next one tries again.
async fn watch_dashboard(controller: &DashboardController, secs: u64) -> Result<()> {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(secs.max(1)));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                println!("\n{}", Utc::now().format("%Y-%m-%d %H:%M:%S"));
                if controller.request_refresh().await.is_err() {
                    if let Some(last) = controller.last_aggregate() {
                        println!("(last good refresh: {} site(s))", last.total_sites);
                    }
                }
                tracing::debug!("Dashboard state: {:?}", controller.state());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

/// Latest analysis for `site` (matched on site or full id), or the latest
/// overall. `records` must be sorted oldest first.
fn pick_context(records: &[AnalysisRecord], site: Option<&str>) -> Option<AnalysisRecord> {
    records
        .iter()
        .rev()
        .find(|r| match site {
            Some(site) => r.id == site || r.site() == site,
            None => true,
        })
        .cloned()
}

async fn open_session(app: &App, site: Option<&str>) -> Result<QaSession> {
    let records = fetch_history(app).await?;
    let context = pick_context(&records, site);
    if context.is_none() {
        if let Some(site) = site {
            tracing::warn!("No analysis recorded for {}", site);
        }
    }

    let session = QaSession::new(Arc::clone(&app.transport), Arc::clone(&app.provider));
    session.initialize(context)?;
    Ok(session)
}

fn print_history(records: &[AnalysisRecord]) {
    println!(
        "{:<20}  {:<32}  {:>5}  {:<5}  {:>8}  {:>7}",
        "ANALYZED", "SITE", "SCORE", "RISK", "TRACKERS", "COOKIES"
    );
    for record in records {
        println!(
            "{:<20}  {:<32}  {:>5}  {:<5}  {:>8}  {:>7}",
            record.analyzed_at.format("%Y-%m-%d %H:%M:%S"),
            truncate(record.site(), 32),
            record.privacy_score,
            record.risk_level.as_str(),
            record.trackers_blocked_count,
            record.total_cookies()
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max - 1).collect();
        format!("{}…", kept)
    }
}

/// Line-oriented Q&A loop on stdin
async fn chat(session: &QaSession) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    chat_loop(session, stdin, &mut std::io::stdout()).await
}

async fn chat_loop<R, W>(session: &QaSession, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    if let Some(context) = session.context() {
        writeln!(
            out,
            "Asking about {} (score {}, {}) via provider '{}'. /history, /clear, /provider, /quit",
            context.site(),
            context.privacy_score,
            context.risk_level,
            session.provider()
        )?;
    }

    let mut lines = input.lines();
    loop {
        write!(out, "> ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear_history();
                writeln!(out, "History cleared.")?;
            }
            "/history" => {
                let history = session.history();
                if history.is_empty() {
                    writeln!(out, "No questions answered yet.")?;
                }
                for turn in history {
                    writeln!(out, "[{}] Q: {}", turn.timestamp.format("%H:%M:%S"), turn.question)?;
                    writeln!(out, "           A: {}", turn.answer)?;
                }
            }
            "/provider" => writeln!(out, "Provider: {}", session.provider())?,
            command if command.starts_with("/provider ") => {
                let name = command["/provider ".len()..].trim();
                session.set_provider(name);
                tracing::debug!("Chat provider switched to '{}'", name);
                writeln!(out, "Provider set to '{}'.", name)?;
            }
            question => {
                // Failures are shown in place of the answer and never logged
                let result = session.ask(question).await;
                writeln!(out, "{}", display_answer(&result))?;
            }
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Config command (runs before the runtime starts)
// ─────────────────────────────────────────────────────────────────────────────

pub fn handle_config(show: bool, reset: bool, path: bool) -> Result<()> {
    if path {
        handle_config_path()
    } else if show {
        handle_config_show()
    } else if reset {
        handle_config_reset()
    } else {
        // No flag provided, show help
        println!("Usage: privlens config [--show|--reset|--path]");
        println!();
        println!("Options:");
        println!("  --show    Display effective configuration");
        println!("  --reset   Reset config file to defaults");
        println!("  --path    Show config file path");
        Ok(())
    }
}

fn handle_config_path() -> Result<()> {
    let path = Config::config_path().context("Could not determine config path")?;
    println!("{}", path.display());
    Ok(())
}

fn handle_config_show() -> Result<()> {
    let config = Config::from_env()?;
    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());
    Ok(())
}

fn handle_config_reset() -> Result<()> {
    let path = Config::config_path().context("Could not determine config path")?;

    if path.exists() {
        print!("Overwrite {} with defaults? [y/N] ", path.display());
        std::io::stdout().flush()?;
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    // Config's to_toml() is the single source of truth
    Config::default().write_to(&path)?;
    println!("Config reset to defaults: {}", path.display());
    Ok(())
}
