mod ai;
mod analyzer;
mod cli;
mod config;
mod store;
mod waka;

use crate::analyzer::productivity::{self, Section};
use crate::analyzer::report;
use crate::analyzer::sessions::digest_heartbeats;
use crate::cli::{AiCommands, Cli, Commands, ConfigCommands};
use crate::config::Config;
use crate::store::StatsStore;
use crate::waka::{ActivitySource, StatsRange, WakaTimeClient};
use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use clap::Parser;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => handle_run(),
        Commands::Analyze => handle_analyze(),
        Commands::Sessions {
            date,
            min_duration,
            merge_threshold,
        } => handle_sessions(date, min_duration, merge_threshold),
        Commands::Heartbeats { date } => handle_heartbeats(date),
        Commands::Languages { range } => handle_languages(range),
        Commands::Summarize { date } => handle_summarize(date),
        Commands::Status => handle_status(),
        Commands::Doctor => handle_doctor(),
        Commands::Config { command } => handle_config_command(command),
        Commands::Ai { command } => handle_ai_command(command),
    }
}

fn handle_run() -> Result<()> {
    let config = load_config()?;
    config.ensure_bootstrap_files()?;
    let client = WakaTimeClient::from_config(&config)?;
    let today = Local::now().date_naive();

    let day_log = analyzer::generate_day_log(&config, &client, today)?;
    print!("{}", day_log.content);
    println!("\nDay log saved: {}", day_log.path.display());

    match ai::summarize_day_log(&config, &day_log.content) {
        Ok(Some(summary)) => {
            println!("\n=== AI Summary ===\n{summary}");
            match ai::save_summary(&config.summary_dir, today, &summary) {
                Ok(path) => println!("Summary saved: {}", path.display()),
                Err(error) => warn!(error = %format!("{error:#}"), "failed to save summary"),
            }
        }
        Ok(None) => info!("AI summary skipped (disabled or no API key)"),
        Err(error) => warn!(error = %format!("{error:#}"), "AI summary failed"),
    }

    Ok(())
}

fn handle_analyze() -> Result<()> {
    let config = load_config()?;
    let client = WakaTimeClient::from_config(&config)?;
    let today = Local::now().date_naive();

    let analysis = analyzer::run_productivity_analysis(&config, &client, today);
    print!("{}", report::render_analysis(&analysis));

    Ok(())
}

fn handle_sessions(
    date: Option<String>,
    min_duration: Option<f64>,
    merge_threshold: Option<f64>,
) -> Result<()> {
    let mut config = load_config()?;
    if let Some(threshold) = merge_threshold {
        config.set_value("merge_threshold_seconds", &threshold.to_string())?;
    }
    if let Some(minutes) = min_duration {
        config.set_value("min_duration_minutes", &minutes.to_string())?;
    }

    let client = WakaTimeClient::from_config(&config)?;
    let date = parse_optional_date(date)?;

    let sessions = analyzer::run_session_analysis(&config, &client, date)?;
    print!(
        "{}",
        report::render_sessions(&sessions, config.min_duration_minutes)
    );

    Ok(())
}

fn handle_heartbeats(date: Option<String>) -> Result<()> {
    let config = load_config()?;
    let client = WakaTimeClient::from_config(&config)?;
    let date = parse_optional_date(date)?;

    let heartbeats = client.heartbeats(date)?;
    let digest = digest_heartbeats(&heartbeats);
    print!("{}", report::render_heartbeats(&heartbeats, &digest));

    Ok(())
}

fn handle_languages(range: StatsRange) -> Result<()> {
    let config = load_config()?;
    let client = WakaTimeClient::from_config(&config)?;

    match productivity::top_languages(&client.stats(range)) {
        Section::Ready(languages) => println!("{}", report::render_languages(&languages, range)),
        Section::Degraded(message) => println!("{message}"),
    }

    Ok(())
}

fn handle_summarize(date: Option<String>) -> Result<()> {
    let config = load_config()?;
    config.ensure_bootstrap_files()?;
    let date = parse_optional_date(date)?;

    let day_log = report::read_day_log(&config.report_dir, date)
        .context("No day log for that date. Run `wakareport run` first.")?;
    let Some(summary) = ai::summarize_day_log(&config, &day_log)? else {
        bail!("AI summary is disabled or no AI API key is configured");
    };

    let path = ai::save_summary(&config.summary_dir, date, &summary)?;
    println!("{summary}");
    println!("\nSummary saved: {}", path.display());

    Ok(())
}

fn handle_status() -> Result<()> {
    let config = load_config()?;
    let store = StatsStore::new(&config.stats_path);
    let document = store.load();

    println!("wakareport status");
    println!("- stats_store: {}", store.path().display());
    println!("- stored_days: {}", document.record_count());
    match document.latest() {
        Some(record) => println!(
            "- latest_record: {} ({}) {:.2} hours",
            record.date, record.weekday, record.total_hours
        ),
        None => println!("- latest_record: none"),
    }
    println!(
        "- latest_day_log: {}",
        latest_day_log(&config)
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "none".to_string())
    );

    if !config.has_wakatime_key() {
        println!("- all_time: unavailable (WakaTime API key not set)");
        return Ok(());
    }

    let client = WakaTimeClient::from_config(&config)?;
    match client.all_time_since_today() {
        Ok(body) => println!(
            "- all_time: {}",
            body.get("data")
                .and_then(|data| data.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("unknown")
        ),
        Err(error) => {
            warn!(error = %error, "all-time total unavailable");
            println!("- all_time: unavailable");
        }
    }

    Ok(())
}

fn handle_doctor() -> Result<()> {
    let config_path = Config::config_path()?;
    let mut issues = Vec::new();

    if config_path.exists() {
        println!("[OK] config.json found: {}", config_path.display());
    } else {
        println!("[WARN] config.json not found: {}", config_path.display());
        issues.push("config missing".to_string());
    }

    let config = load_config()?;

    if config.has_wakatime_key() {
        println!("[OK] WakaTime API key is configured");
    } else {
        println!("[WARN] WakaTime API key is missing");
        issues.push("wakatime api key missing".to_string());
    }

    let store = StatsStore::new(&config.stats_path);
    match store.read() {
        Ok(_) if !store.path().exists() => println!(
            "[OK] stats store will be created on first run: {}",
            store.path().display()
        ),
        Ok(document) => {
            let usable = document.records().len();
            println!(
                "[OK] stats store readable: {} ({usable} of {} days usable)",
                store.path().display(),
                document.record_count()
            );
            if usable < document.record_count() {
                issues.push("unreadable stats records".to_string());
            }
        }
        Err(error) => {
            println!("[WARN] stats store unreadable: {error:#}");
            issues.push("stats store unreadable".to_string());
        }
    }

    if config.report_dir.exists() {
        println!("[OK] report dir exists: {}", config.report_dir.display());
    } else {
        println!("[WARN] report dir missing: {}", config.report_dir.display());
        issues.push("report dir missing".to_string());
    }

    if config.ai_enabled {
        if ai::has_api_key(&config) {
            println!("[OK] AI API key is configured");
        } else {
            println!("[WARN] AI is enabled but API key is missing");
            issues.push("ai api key missing".to_string());
        }

        if config.prompts_path.exists() {
            println!("[OK] prompts file found: {}", config.prompts_path.display());
        } else {
            println!("[WARN] prompts file missing: {}", config.prompts_path.display());
            issues.push("prompts missing".to_string());
        }
    } else {
        println!("[OK] AI feature disabled");
    }

    if issues.is_empty() {
        println!("doctor result: no issues");
    } else {
        println!("doctor result: {} warning(s)", issues.len());
    }

    Ok(())
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            // Stored config only; environment keys must not leak into the file
            let mut config = load_or_default_config()?;
            config.set_value(&key, &value)?;
            config.ensure_bootstrap_files()?;
            config.save()?;

            let masked = if key.contains("api_key") {
                "***hidden***".to_string()
            } else {
                value
            };
            println!("Config saved: {key} = {masked}");
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let config = load_config()?;
            let value = config
                .get_value(&key)
                .with_context(|| format!("Unsupported config key: {key}"))?;

            println!("{value}");
            Ok(())
        }
    }
}

fn handle_ai_command(command: AiCommands) -> Result<()> {
    match command {
        AiCommands::Test {
            key,
            base_url,
            model,
        } => {
            let mut config = load_config()?;

            if let Some(value) = key {
                config.ai_api_key = Some(value);
            }
            if let Some(value) = base_url {
                config.ai_api_base_url = value;
            }
            if let Some(value) = model {
                config.ai_model = value;
            }

            let response = ai::test_connection(&config)?;
            println!("AI API connection successful");
            println!("{response}");

            Ok(())
        }
    }
}

fn latest_day_log(config: &Config) -> Option<std::path::PathBuf> {
    let today = Local::now().date_naive();
    (0..7)
        .filter_map(|offset| today.checked_sub_days(chrono::Days::new(offset)))
        .map(|date| report::day_log_path(&config.report_dir, date))
        .find(|path| path.exists())
}

fn parse_optional_date(input: Option<String>) -> Result<NaiveDate> {
    input
        .as_deref()
        .map(|date| {
            NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("Invalid date format: {date}. Example: 2024-01-08"))
        })
        .transpose()?
        .map_or_else(|| Ok(Local::now().date_naive()), Ok)
}

fn load_or_default_config() -> Result<Config> {
    let config_path = Config::config_path()?;
    if config_path.exists() {
        return Config::load();
    }

    let config = Config::default();
    config.ensure_bootstrap_files()?;
    config.save()?;
    info!(path = %config_path.display(), "default config created");

    Ok(config)
}

fn load_config() -> Result<Config> {
    Ok(load_or_default_config()?.with_env_overrides())
}
