use crate::analyzer::productivity::{
    DayHours, LanguageUsage, ProductivityReport, Section, TodayActivity, WeekBreakdown,
    WeekdayHistory, WeeklyAverage,
};
use crate::analyzer::sessions::{Heartbeat, HeartbeatDigest, SessionSummary, format_local};
use crate::waka::StatsRange;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub fn render_analysis(report: &ProductivityReport) -> String {
    let date = report.date.format("%Y-%m-%d");

    [
        "=== Productivity Analysis ===".to_string(),
        render_section(&report.today, |today| render_today(today, &date.to_string())),
        render_section(&report.week_breakdown, render_week_breakdown),
        render_section(&report.weekday_history, render_weekday_history),
        render_section(&report.weekly_trend, |weeks| render_weekly_trend(weeks)),
        render_section(&report.languages, |languages| {
            render_languages(languages, StatsRange::Last7Days)
        }),
        render_section(&report.week_days, |days| render_week_days(days)),
    ]
    .join("\n\n")
        + "\n"
}

fn render_section<T, F>(section: &Section<T>, render: F) -> String
where
    F: FnOnce(&T) -> String,
{
    match section {
        Section::Ready(value) => render(value),
        Section::Degraded(message) => message.clone(),
    }
}

fn render_today(today: &TodayActivity, date: &str) -> String {
    let breakdown = match &today.categories {
        None => "No category breakdown available".to_string(),
        Some(categories) if categories.is_empty() => "Activity Breakdown:\n  - No categories".to_string(),
        Some(categories) => {
            let rows = categories
                .iter()
                .map(|category| format!("  - {}: {} hours", category.name, category.hours))
                .collect::<Vec<_>>()
                .join("\n");
            format!("Activity Breakdown:\n{rows}")
        }
    };

    format!(
        "Today's Activity ({date}):\nTotal time: {} hours\n\n{breakdown}",
        today.total_hours
    )
}

fn render_week_breakdown(week: &WeekBreakdown) -> String {
    let rows = if week.days.is_empty() {
        "  - No days with data".to_string()
    } else {
        day_rows(&week.days)
    };

    let average = week
        .average
        .map(|average| format!("\n\n7-Day Average: {average:.2} hours"))
        .unwrap_or_default();
    let ratio = week
        .today_vs_average
        .map(|ratio| format!("\nToday vs 7-day average: {ratio:.1}%"))
        .unwrap_or_default();

    format!("Daily Breakdown (Last 7 Days):\n{rows}{average}{ratio}")
}

fn render_weekday_history(history: &WeekdayHistory) -> String {
    let weekday = &history.weekday;
    let ratio = history
        .today_vs_average
        .map(|ratio| format!("\nToday vs Historical {weekday} average: {ratio:.1}%"))
        .unwrap_or_default();
    let recent = history
        .recent
        .iter()
        .map(|record| format!("  - {}: {:.2} hours", record.date, record.total_hours))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Historical {weekday} Analysis ({} days):\nHistorical {weekday} Average: {:.2} hours{ratio}\nPrevious {weekday}s:\n{recent}",
        history.sample_count, history.average
    )
}

fn render_weekly_trend(weeks: &[WeeklyAverage]) -> String {
    let rows = weeks
        .iter()
        .map(|week| format!("  {}: {:.2} hours/day", week.label(), week.average_hours))
        .collect::<Vec<_>>()
        .join("\n");

    format!("Weekly Averages:\n{rows}")
}

pub fn render_languages(languages: &[LanguageUsage], range: StatsRange) -> String {
    let period = range.label();
    if languages.is_empty() {
        return format!("Languages Used ({period}):\n  - No data");
    }

    let rows = languages
        .iter()
        .map(|language| format!("  - {}: {} ({}%)", language.name, language.text, language.percent))
        .collect::<Vec<_>>()
        .join("\n");

    format!("Languages Used ({period}):\n{rows}")
}

fn render_week_days(days: &[DayHours]) -> String {
    format!("Current Week Breakdown:\n{}", day_rows(days))
}

fn day_rows(days: &[DayHours]) -> String {
    days.iter()
        .map(|day| format!("  - {} ({}): {:.2} hours", day.weekday, day.date, day.hours))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Session report. Sessions and entries shorter than `min_duration` minutes are
/// hidden; hidden sessions still take a number.
pub fn render_sessions(sessions: &[SessionSummary], min_duration: f64) -> String {
    let mut blocks = vec![format!("Found {} coding sessions:", sessions.len())];

    blocks.extend(
        sessions
            .iter()
            .enumerate()
            .filter(|(_, session)| session.duration_minutes >= min_duration)
            .map(|(index, session)| render_session(index + 1, session, min_duration)),
    );

    blocks.join("\n\n") + "\n"
}

fn render_session(number: usize, session: &SessionSummary, min_duration: f64) -> String {
    let files = session
        .files
        .iter()
        .filter(|(_, file)| file.minutes >= min_duration)
        .map(|(name, file)| format!("  - {name} ({}): {} minutes", file.kind, file.minutes))
        .collect::<Vec<_>>();

    format!(
        "=== Session {number} ===\nTime: {} to {}\nTotal Duration: {} minutes\n\nFiles:\n{}\n\nProjects:\n{}\n\nLanguages:\n{}\n\nCategories:\n{}\n\nLine Changes: +{} -{}",
        session.start_time,
        session.end_time,
        session.duration_minutes,
        rows_or_placeholder(files, "files"),
        minute_rows(&session.projects, min_duration, "projects"),
        minute_rows(&session.languages, min_duration, "languages"),
        minute_rows(&session.categories, min_duration, "categories"),
        session.line_changes.additions,
        session.line_changes.deletions,
    )
}

fn minute_rows(source: &BTreeMap<String, f64>, min_duration: f64, dimension: &str) -> String {
    let rows = source
        .iter()
        .filter(|(_, minutes)| **minutes >= min_duration)
        .map(|(name, minutes)| format!("  - {name}: {minutes} minutes"))
        .collect::<Vec<_>>();

    rows_or_placeholder(rows, dimension)
}

fn rows_or_placeholder(rows: Vec<String>, dimension: &str) -> String {
    if rows.is_empty() {
        format!("  No {dimension} exceeded minimum duration threshold")
    } else {
        rows.join("\n")
    }
}

pub fn render_heartbeats(heartbeats: &[Heartbeat], digest: &HeartbeatDigest) -> String {
    let counts = |source: &BTreeMap<String, usize>| {
        if source.is_empty() {
            return "  - No data".to_string();
        }
        source
            .iter()
            .map(|(name, count)| format!("  - {name}: {count} heartbeats"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let details = heartbeats
        .iter()
        .map(render_heartbeat)
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Found {} heartbeats across {} files\n\nProjects:\n{}\n\nLanguages:\n{}\n\n{details}\n",
        digest.heartbeat_count,
        digest.files.len(),
        counts(&digest.projects),
        counts(&digest.languages),
    )
}

fn render_heartbeat(heartbeat: &Heartbeat) -> String {
    let or_na = |value: &Option<String>| value.clone().unwrap_or_else(|| "N/A".to_string());

    let optional_numbers = [
        ("Total lines", heartbeat.lines),
        ("Lines added", heartbeat.line_additions),
        ("Lines deleted", heartbeat.line_deletions),
        ("Line number", heartbeat.lineno),
        ("Cursor position", heartbeat.cursorpos),
    ]
    .into_iter()
    .filter_map(|(label, value)| value.map(|value| format!("\n{label}: {value}")))
    .collect::<String>();

    format!(
        "--- Heartbeat ---\nTime: {}\nEntity: {}\nType: {}\nCategory: {}\nProject: {}\nLanguage: {}\nBranch: {}{optional_numbers}\nIs write: {}",
        format_local(heartbeat.time),
        or_na(&heartbeat.entity),
        or_na(&heartbeat.kind),
        or_na(&heartbeat.category),
        or_na(&heartbeat.project),
        or_na(&heartbeat.language),
        or_na(&heartbeat.branch),
        heartbeat.is_write.unwrap_or(false),
    )
}

pub fn day_log_path(report_dir: &Path, date: NaiveDate) -> PathBuf {
    report_dir.join(format!("productivity_log_{}.txt", date.format("%Y-%m-%d")))
}

pub fn save_day_log(report_dir: &Path, date: NaiveDate, content: &str) -> Result<PathBuf> {
    fs::create_dir_all(report_dir).with_context(|| {
        format!(
            "Failed to create report directory: {}",
            report_dir.display()
        )
    })?;

    let path = day_log_path(report_dir, date);
    fs::write(&path, content)
        .with_context(|| format!("Failed to write day log: {}", path.display()))?;

    Ok(path)
}

pub fn read_day_log(report_dir: &Path, date: NaiveDate) -> Result<String> {
    let path = day_log_path(report_dir, date);
    fs::read_to_string(&path).with_context(|| format!("Failed to read day log: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::{read_day_log, render_analysis, render_sessions, save_day_log};
    use crate::analyzer::productivity::{ProductivityReport, Section, TodayActivity};
    use crate::analyzer::sessions::{Heartbeat, reconstruct_sessions};
    use chrono::NaiveDate;

    fn beat(time: f64, entity: &str) -> Heartbeat {
        Heartbeat {
            time,
            entity: Some(entity.to_string()),
            project: Some("wakareport".to_string()),
            ..Heartbeat::default()
        }
    }

    #[test]
    fn short_sessions_are_hidden_but_counted() {
        let heartbeats = vec![
            beat(0.0, "a.rs"),
            beat(240.0, "a.rs"),
            beat(5000.0, "b.rs"),
            beat(5030.0, "b.rs"),
        ];
        let summaries = reconstruct_sessions(heartbeats, 300.0)
            .iter()
            .map(|session| session.summarize())
            .collect::<Vec<_>>();

        let rendered = render_sessions(&summaries, 3.0);

        assert!(rendered.starts_with("Found 2 coding sessions:"));
        assert!(rendered.contains("=== Session 1 ==="));
        assert!(!rendered.contains("=== Session 2 ==="));
        assert!(rendered.contains("  - a.rs (unknown): 4 minutes"));
        assert!(rendered.contains("  - wakareport: 4 minutes"));
        assert!(rendered.contains("  No languages exceeded minimum duration threshold"));
    }

    #[test]
    fn degraded_sections_render_their_message() {
        let report = ProductivityReport {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date"),
            today: Section::Ready(TodayActivity {
                total_hours: 1.5,
                categories: None,
            }),
            week_breakdown: Section::Degraded("week unavailable".to_string()),
            weekday_history: Section::Degraded("No historical Monday records yet".to_string()),
            weekly_trend: Section::Degraded("No stored daily records yet".to_string()),
            languages: Section::Degraded("No language data found".to_string()),
            week_days: Section::Degraded("No daily data found in the response".to_string()),
        };

        let rendered = render_analysis(&report);

        assert!(rendered.contains("Total time: 1.5 hours"));
        assert!(rendered.contains("No category breakdown available"));
        assert!(rendered.contains("week unavailable"));
        assert!(rendered.contains("No language data found"));
    }

    #[test]
    fn day_log_is_written_and_read_back() {
        let dir = tempfile::tempdir().expect("temp dir");
        let date = NaiveDate::from_ymd_opt(2024, 5, 6).expect("valid date");

        let path = save_day_log(&dir.path().join("logs"), date, "hello").expect("log saved");

        assert!(path.ends_with("productivity_log_2024-05-06.txt"));
        assert_eq!(
            read_day_log(&dir.path().join("logs"), date).expect("log read"),
            "hello"
        );
    }
}
