pub mod productivity;
pub mod report;
pub mod sessions;

use crate::analyzer::productivity::{LiveAggregates, ProductivityReport};
use crate::analyzer::sessions::{Session, SessionSummary, reconstruct_sessions};
use crate::config::Config;
use crate::store::{DailyRecord, StatsStore};
use crate::waka::{ActivitySource, WakaError};
use anyhow::Result;
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug)]
pub struct DayLog {
    pub content: String,
    pub path: PathBuf,
}

/// Fetches the live aggregates, records today's stats, then analyzes against the
/// stored history. Every failure here degrades a section instead of the run.
pub fn run_productivity_analysis<S: ActivitySource + ?Sized>(
    config: &Config,
    source: &S,
    today: NaiveDate,
) -> ProductivityReport {
    let live = LiveAggregates::fetch(source, today);
    let store = StatsStore::new(&config.stats_path);

    let today_record = match &live.today_status {
        Ok(status) => match DailyRecord::from_status(today, status) {
            Ok(record) => Some(record),
            Err(error) => {
                warn!(error = %error, "today status unusable, daily stats not recorded");
                None
            }
        },
        Err(_) => None,
    };

    let document = match today_record {
        Some(record) => store.record_daily(&record).unwrap_or_else(|error| {
            warn!(error = %format!("{error:#}"), "failed to persist daily stats");
            store.load()
        }),
        None => store.load(),
    };

    productivity::analyze(today, &live, &document.records())
}

pub fn run_session_analysis<S: ActivitySource + ?Sized>(
    config: &Config,
    source: &S,
    date: NaiveDate,
) -> Result<Vec<SessionSummary>, WakaError> {
    let heartbeats = source.heartbeats(date)?;
    let sessions = reconstruct_sessions(heartbeats, config.merge_threshold_seconds);
    info!(date = %date, sessions = sessions.len(), "sessions reconstructed");

    Ok(sessions.iter().map(Session::summarize).collect())
}

/// Analysis report followed by the session report, saved as the day log.
pub fn generate_day_log<S: ActivitySource + ?Sized>(
    config: &Config,
    source: &S,
    today: NaiveDate,
) -> Result<DayLog> {
    let analysis = run_productivity_analysis(config, source, today);
    let mut content = report::render_analysis(&analysis);

    content.push_str("\nAnalyzing today's coding sessions...\n\n");
    match run_session_analysis(config, source, today) {
        Ok(sessions) => {
            content.push_str(&report::render_sessions(
                &sessions,
                config.min_duration_minutes,
            ));
        }
        Err(error) => {
            warn!(error = %error, "session analysis failed");
            content.push_str(&format!("Error fetching heartbeats from WakaTime: {error}\n"));
        }
    }

    let path = report::save_day_log(&config.report_dir, today, &content)?;

    Ok(DayLog { content, path })
}
