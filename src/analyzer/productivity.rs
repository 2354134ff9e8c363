use crate::store::DailyRecord;
use crate::waka::{ActivitySource, StatsRange, WakaError, decimal_hours, grand_total_hours};
use chrono::{Datelike, Duration, IsoWeek, NaiveDate};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

const RECENT_WEEKDAYS: usize = 4;
const RECENT_WEEKS: usize = 4;
const TOP_LANGUAGES: usize = 5;

/// Outcome of one report section. A degraded section carries the line shown in
/// place of its data; it never aborts the sibling sections.
#[derive(Debug, Clone, PartialEq)]
pub enum Section<T> {
    Ready(T),
    Degraded(String),
}

impl<T> Section<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Degraded(_) => None,
        }
    }
}

#[derive(Debug)]
pub struct LiveAggregates {
    pub today_status: Result<Value, WakaError>,
    pub week_stats: Result<Value, WakaError>,
    pub week_summaries: Result<Value, WakaError>,
}

impl LiveAggregates {
    pub fn fetch<S: ActivitySource + ?Sized>(source: &S, today: NaiveDate) -> Self {
        let week_start = today - Duration::days(6);

        let aggregates = Self {
            today_status: source.today_status(),
            week_stats: source.stats(StatsRange::Last7Days),
            week_summaries: source.summaries(week_start, today),
        };

        [
            ("today status", aggregates.today_status.as_ref().err()),
            ("7 day stats", aggregates.week_stats.as_ref().err()),
            ("7 day summaries", aggregates.week_summaries.as_ref().err()),
        ]
        .into_iter()
        .filter_map(|(name, error)| error.map(|error| (name, error)))
        .for_each(|(name, error)| warn!(aggregate = name, error = %error, "live aggregate unavailable"));

        aggregates
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedHours {
    pub name: String,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TodayActivity {
    pub total_hours: f64,
    /// `None` when the aggregate carries no category list at all.
    pub categories: Option<Vec<NamedHours>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayHours {
    pub date: NaiveDate,
    pub weekday: String,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeekBreakdown {
    pub days: Vec<DayHours>,
    pub average: Option<f64>,
    pub today_vs_average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeekdayHistory {
    pub weekday: String,
    pub sample_count: usize,
    pub average: f64,
    pub today_vs_average: Option<f64>,
    pub recent: Vec<DailyRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyAverage {
    pub week: IsoWeek,
    pub days: usize,
    pub average_hours: f64,
    pub is_current: bool,
}

impl WeeklyAverage {
    pub fn label(&self) -> String {
        if self.is_current {
            "Current Week".to_string()
        } else {
            format!("Week {}", self.week.week())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LanguageUsage {
    pub name: String,
    pub text: String,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductivityReport {
    pub date: NaiveDate,
    pub today: Section<TodayActivity>,
    pub week_breakdown: Section<WeekBreakdown>,
    pub weekday_history: Section<WeekdayHistory>,
    pub weekly_trend: Section<Vec<WeeklyAverage>>,
    pub languages: Section<Vec<LanguageUsage>>,
    pub week_days: Section<Vec<DayHours>>,
}

pub fn analyze(today: NaiveDate, live: &LiveAggregates, records: &[DailyRecord]) -> ProductivityReport {
    let today_section = today_activity(&live.today_status);
    let today_total = today_section.ready().map(|activity| activity.total_hours);

    ProductivityReport {
        date: today,
        week_breakdown: week_breakdown(&live.week_summaries, today_total),
        weekday_history: weekday_history(today, records, today_total),
        weekly_trend: weekly_trend(today, records),
        languages: top_languages(&live.week_stats),
        week_days: week_days(&live.week_stats),
        today: today_section,
    }
}

pub fn today_activity(status: &Result<Value, WakaError>) -> Section<TodayActivity> {
    let status = match status {
        Ok(status) => status,
        Err(error) => return Section::Degraded(format!("Unable to fetch today's activity: {error}")),
    };

    let Some(data) = status.get("data") else {
        return Section::Degraded("No activity recorded today".to_string());
    };
    let Some(total_hours) = grand_total_hours(data) else {
        return Section::Degraded("No activity recorded today".to_string());
    };

    let categories = data.get("categories").and_then(Value::as_array).map(|items| {
        items
            .iter()
            .map(|item| NamedHours {
                name: text_field(item, "name", "Unknown"),
                hours: item.get("decimal").and_then(decimal_hours).unwrap_or_default(),
            })
            .collect::<Vec<_>>()
    });

    Section::Ready(TodayActivity {
        total_hours,
        categories,
    })
}

pub fn week_breakdown(
    summaries: &Result<Value, WakaError>,
    today_total: Option<f64>,
) -> Section<WeekBreakdown> {
    let summaries = match summaries {
        Ok(summaries) => summaries,
        Err(error) => {
            return Section::Degraded(format!("Unable to fetch current week statistics: {error}"));
        }
    };

    let Some(entries) = summaries.get("data").and_then(Value::as_array) else {
        return Section::Degraded("No summary data found for the last 7 days".to_string());
    };

    let days = entries
        .iter()
        .filter_map(|entry| {
            let date = entry
                .get("range")
                .and_then(|range| range.get("date"))
                .and_then(Value::as_str)
                .and_then(parse_iso_date);
            let hours = grand_total_hours(entry);

            match (date, hours) {
                (Some(date), Some(hours)) => Some(DayHours {
                    date,
                    weekday: weekday_name(date),
                    hours,
                }),
                _ => {
                    warn!(entry = %entry, "skipping malformed summary day");
                    None
                }
            }
        })
        .collect::<Vec<_>>();

    let average = mean(days.iter().map(|day| day.hours));

    Section::Ready(WeekBreakdown {
        today_vs_average: average.and_then(|average| percent_of(today_total, average)),
        days,
        average,
    })
}

pub fn weekday_history(
    today: NaiveDate,
    records: &[DailyRecord],
    today_total: Option<f64>,
) -> Section<WeekdayHistory> {
    let weekday = weekday_name(today);
    let mut matching = records
        .iter()
        .filter(|record| record.weekday == weekday)
        .collect::<Vec<_>>();

    let Some(average) = mean(matching.iter().map(|record| record.total_hours)) else {
        return Section::Degraded(format!("No historical {weekday} records yet"));
    };

    matching.sort_by(|left, right| right.date.cmp(&left.date));

    Section::Ready(WeekdayHistory {
        sample_count: matching.len(),
        today_vs_average: percent_of(today_total, average),
        recent: matching
            .into_iter()
            .take(RECENT_WEEKDAYS)
            .cloned()
            .collect(),
        weekday,
        average,
    })
}

pub fn weekly_trend(today: NaiveDate, records: &[DailyRecord]) -> Section<Vec<WeeklyAverage>> {
    let grouped = records.iter().fold(BTreeMap::new(), |mut acc, record| {
        match record.parsed_date() {
            Some(date) => acc
                .entry(date.iso_week())
                .or_insert_with(Vec::new)
                .push(record.total_hours),
            None => warn!(date = %record.date, "skipping stored record with invalid date"),
        }
        acc
    });

    if grouped.is_empty() {
        return Section::Degraded("No stored daily records yet".to_string());
    }

    let current_week = today.iso_week();
    let weeks = grouped
        .into_iter()
        .rev()
        .take(RECENT_WEEKS)
        .map(|(week, hours)| WeeklyAverage {
            week,
            days: hours.len(),
            average_hours: mean(hours.iter().copied()).unwrap_or_default(),
            is_current: week == current_week,
        })
        .collect::<Vec<_>>();

    Section::Ready(weeks)
}

pub fn top_languages(stats: &Result<Value, WakaError>) -> Section<Vec<LanguageUsage>> {
    let stats = match stats {
        Ok(stats) => stats,
        Err(error) => return Section::Degraded(format!("Unable to fetch language statistics: {error}")),
    };

    let Some(languages) = stats
        .get("data")
        .and_then(|data| data.get("languages"))
        .and_then(Value::as_array)
    else {
        return Section::Degraded("No language data found".to_string());
    };

    Section::Ready(
        languages
            .iter()
            .take(TOP_LANGUAGES)
            .map(|language| LanguageUsage {
                name: text_field(language, "name", "Unknown"),
                text: text_field(language, "text", "0 hrs"),
                percent: language
                    .get("percent")
                    .and_then(Value::as_f64)
                    .unwrap_or_default(),
            })
            .collect(),
    )
}

pub fn week_days(stats: &Result<Value, WakaError>) -> Section<Vec<DayHours>> {
    let stats = match stats {
        Ok(stats) => stats,
        Err(error) => {
            return Section::Degraded(format!("Unable to fetch current week statistics: {error}"));
        }
    };

    let Some(days) = stats
        .get("data")
        .and_then(|data| data.get("days"))
        .and_then(Value::as_array)
    else {
        return Section::Degraded("No daily data found in the response".to_string());
    };

    if days.is_empty() {
        return Section::Degraded("No activity recorded in the last 7 days".to_string());
    }

    let mut parsed = days
        .iter()
        .filter_map(|day| {
            let date = day.get("date").and_then(Value::as_str).and_then(parse_iso_date);
            if date.is_none() {
                warn!(day = %day, "skipping day without a valid date");
            }

            date.map(|date| DayHours {
                date,
                weekday: weekday_name(date),
                hours: grand_total_hours(day).unwrap_or_default(),
            })
        })
        .collect::<Vec<_>>();
    parsed.sort_by_key(|day| day.date);

    Section::Ready(parsed)
}

fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    // range.date may carry a time part
    NaiveDate::parse_from_str(raw.get(..10).unwrap_or(raw), "%Y-%m-%d").ok()
}

fn weekday_name(date: NaiveDate) -> String {
    date.format("%A").to_string()
}

fn text_field(item: &Value, key: &str, fallback: &str) -> String {
    item.get(key)
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0_usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Today's total as a percentage of `average`; undefined for an idle day or a
/// zero average.
fn percent_of(today_total: Option<f64>, average: f64) -> Option<f64> {
    today_total
        .filter(|_| average > 0.0)
        .map(|total| total / average * 100.0)
}
