use crate::waka::{WakaError, decimal_hours, grand_total_hours, text_hours};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageShare {
    #[serde(deserialize_with = "hours")]
    pub hours: f64,
    #[serde(default)]
    pub percent: f64,
}

/// Snapshot of one calendar day, unique by `date`.
///
/// Hours are written as numbers, but older stores may hold numeric strings
/// (`"3.00"`) or duration texts (`"5 hrs"`); both are read back as hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: String,
    pub weekday: String,
    #[serde(deserialize_with = "hours")]
    pub total_hours: f64,
    #[serde(default, deserialize_with = "hours_by_name")]
    pub categories: BTreeMap<String, f64>,
    #[serde(default)]
    pub languages: BTreeMap<String, LanguageShare>,
}

impl DailyRecord {
    /// Builds today's record from the `status_bar/today` aggregate.
    pub fn from_status(date: NaiveDate, status: &Value) -> Result<Self, WakaError> {
        let data = status
            .get("data")
            .ok_or_else(|| WakaError::parse("today status", "missing `data`"))?;
        let total_hours = grand_total_hours(data)
            .ok_or_else(|| WakaError::parse("today status", "missing `grand_total.decimal`"))?;

        let categories = named_items(data, "categories")
            .map(|item| {
                (
                    item_name(item),
                    item.get("decimal").and_then(decimal_hours).unwrap_or_default(),
                )
            })
            .collect();

        let languages = named_items(data, "languages")
            .filter(|item| !is_zero_duration(item))
            .map(|item| {
                (
                    item_name(item),
                    LanguageShare {
                        hours: item.get("decimal").and_then(decimal_hours).unwrap_or_default(),
                        percent: item.get("percent").and_then(Value::as_f64).unwrap_or_default(),
                    },
                )
            })
            .collect();

        Ok(Self {
            date: date.format("%Y-%m-%d").to_string(),
            weekday: date.format("%A").to_string(),
            total_hours: total_hours.max(0.0),
            categories,
            languages,
        })
    }

    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").ok()
    }
}

fn hours_of(value: &Value) -> Option<f64> {
    decimal_hours(value).or_else(|| value.as_str().and_then(text_hours))
}

fn hours<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    hours_of(&value).ok_or_else(|| de::Error::custom(format!("unreadable hours value: {value}")))
}

fn hours_by_name<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    BTreeMap::<String, Value>::deserialize(deserializer)?
        .into_iter()
        .map(|(name, value)| {
            hours_of(&value)
                .map(|hours| (name, hours))
                .ok_or_else(|| de::Error::custom(format!("unreadable hours value: {value}")))
        })
        .collect()
}

/// The stats file. Records stay raw JSON so entries this version cannot read
/// are written back untouched; [`StatsDocument::records`] yields the usable ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsDocument {
    #[serde(default)]
    daily_records: Vec<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl StatsDocument {
    pub fn record_count(&self) -> usize {
        self.daily_records.len()
    }

    /// Typed records; unreadable entries are skipped with a warning.
    pub fn records(&self) -> Vec<DailyRecord> {
        self.daily_records
            .iter()
            .filter_map(|raw| match DailyRecord::deserialize(raw) {
                Ok(record) => Some(record),
                Err(error) => {
                    let date = raw.get("date").and_then(Value::as_str).unwrap_or("unknown");
                    warn!(date, error = %error, "skipping unreadable stats record");
                    None
                }
            })
            .collect()
    }

    /// Replaces the entry with the same date, or appends.
    pub fn upsert(&mut self, record: &DailyRecord) -> Result<()> {
        let value = serde_json::to_value(record)
            .with_context(|| format!("Failed to serialize stats record {}", record.date))?;

        match self
            .daily_records
            .iter_mut()
            .find(|existing| existing.get("date").and_then(Value::as_str) == Some(record.date.as_str()))
        {
            Some(existing) => *existing = value,
            None => self.daily_records.push(value),
        }

        Ok(())
    }

    pub fn latest(&self) -> Option<DailyRecord> {
        self.records()
            .into_iter()
            .max_by(|left, right| left.date.cmp(&right.date))
    }
}

pub struct StatsStore {
    path: PathBuf,
}

impl StatsStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Strict read: a missing file is empty, anything unreadable is an error.
    pub fn read(&self) -> Result<StatsDocument> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Ok(StatsDocument::default());
            }
            Err(error) => {
                return Err(error).with_context(|| {
                    format!("Failed to read stats store: {}", self.path.display())
                });
            }
        };

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse stats store: {}", self.path.display()))
    }

    /// Like [`StatsStore::read`], but an unreadable store is an empty collection.
    pub fn load(&self) -> StatsDocument {
        self.read().unwrap_or_else(|error| {
            warn!(error = %format!("{error:#}"), "stats store unusable, starting empty");
            StatsDocument::default()
        })
    }

    pub fn save(&self, document: &StatsDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create stats directory: {}", parent.display())
            })?;
        }

        let content =
            serde_json::to_string_pretty(document).context("Failed to serialize stats store")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write stats store: {}", self.path.display()))?;

        Ok(())
    }

    /// Load, upsert by date, write back as one document. A store that cannot
    /// be parsed is left as it is.
    pub fn record_daily(&self, record: &DailyRecord) -> Result<StatsDocument> {
        let mut document = self
            .read()
            .context("Stats store left untouched; fix or remove it to resume recording")?;
        document.upsert(record)?;
        self.save(&document)?;

        info!(date = %record.date, records = document.record_count(), "daily stats recorded");
        Ok(document)
    }
}

fn named_items<'a>(data: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    data.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn item_name(item: &Value) -> String {
    item.get("name")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string()
}

fn is_zero_duration(item: &Value) -> bool {
    match item.get("total_seconds").and_then(Value::as_f64) {
        Some(seconds) => seconds <= 0.0,
        None => item.get("text").and_then(Value::as_str) == Some("0 secs"),
    }
}

#[cfg(test)]
mod tests {
    use super::{DailyRecord, StatsDocument, StatsStore};
    use chrono::NaiveDate;
    use serde_json::{Value, json};
    use std::collections::BTreeMap;
    use std::fs;

    fn record(date: &str, total_hours: f64) -> DailyRecord {
        DailyRecord {
            date: date.to_string(),
            weekday: "Monday".to_string(),
            total_hours,
            categories: BTreeMap::new(),
            languages: BTreeMap::new(),
        }
    }

    #[test]
    fn upsert_replaces_existing_date() {
        let mut document: StatsDocument = serde_json::from_value(json!({
            "daily_records": [{"date": "2024-01-01", "total_hours": 5, "weekday": "Monday"}]
        }))
        .expect("document parsed");

        document.upsert(&record("2024-01-01", 7.0)).expect("upserted");

        let records = document.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].total_hours, 7.0);
    }

    #[test]
    fn upsert_appends_new_date() {
        let mut document = StatsDocument::default();
        document.upsert(&record("2024-01-01", 1.0)).expect("upserted");
        document.upsert(&record("2024-01-02", 2.0)).expect("upserted");
        document.upsert(&record("2024-01-01", 3.0)).expect("upserted");

        assert_eq!(document.record_count(), 2);
        assert_eq!(
            document.latest().map(|latest| latest.date),
            Some("2024-01-02".to_string())
        );
    }

    #[test]
    fn missing_or_corrupt_store_loads_empty() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("coding_stats.json");
        let store = StatsStore::new(&path);

        assert_eq!(store.load().record_count(), 0);

        fs::write(&path, "{ not json").expect("corrupt file written");
        assert_eq!(store.load().record_count(), 0);
    }

    #[test]
    fn corrupt_store_is_never_overwritten() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("coding_stats.json");
        fs::write(&path, "{ not json").expect("corrupt file written");
        let store = StatsStore::new(&path);

        assert!(store.record_daily(&record("2024-03-04", 2.0)).is_err());
        assert_eq!(fs::read_to_string(&path).expect("store read"), "{ not json");
    }

    #[test]
    fn record_daily_is_idempotent_on_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = StatsStore::new(&dir.path().join("stats").join("coding_stats.json"));

        store.record_daily(&record("2024-03-04", 2.0)).expect("first write");
        store.record_daily(&record("2024-03-04", 4.5)).expect("second write");

        let reloaded = store.load().records();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].total_hours, 4.5);
    }

    #[test]
    fn unreadable_records_survive_an_upsert() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("coding_stats.json");
        let missing_weekday = json!({"date": "2024-01-01", "total_hours": 1.0});
        fs::write(
            &path,
            json!({"daily_records": [
                missing_weekday.clone(),
                {"date": "2024-01-02", "weekday": "Tuesday", "total_hours": 2.0}
            ]})
            .to_string(),
        )
        .expect("store written");
        let store = StatsStore::new(&path);

        let document = store
            .record_daily(&record("2024-01-03", 3.0))
            .expect("recorded");

        assert_eq!(document.record_count(), 3);
        assert_eq!(document.records().len(), 2);

        let on_disk: Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("store read")).expect("json");
        assert_eq!(on_disk["daily_records"][0], missing_weekday);
        assert_eq!(on_disk["daily_records"][1]["date"], "2024-01-02");
        assert_eq!(on_disk["daily_records"][2]["date"], "2024-01-03");
    }

    #[test]
    fn text_hours_from_older_stores_are_read() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("coding_stats.json");
        fs::write(
            &path,
            json!({
                "daily_records": [
                    {
                        "date": "2024-01-01",
                        "weekday": "Monday",
                        "total_hours": 5.5,
                        "categories": {"Coding": "5.50"},
                        "languages": {"Rust": {"hours": "5 hrs 30 mins", "percent": 100.0}}
                    },
                    {"date": "2024-01-02", "weekday": "Tuesday", "total_hours": 2.0}
                ],
                "version": 1
            })
            .to_string(),
        )
        .expect("store written");
        let store = StatsStore::new(&path);

        store.record_daily(&record("2024-01-03", 3.0)).expect("recorded");

        let records = store.load().records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].categories["Coding"], 5.5);
        assert_eq!(records[0].languages["Rust"].hours, 5.5);

        let on_disk: Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("store read")).expect("json");
        assert_eq!(on_disk["version"], 1);
        assert_eq!(on_disk["daily_records"][0]["languages"]["Rust"]["hours"], "5 hrs 30 mins");
    }

    #[test]
    fn record_from_status_filters_idle_languages() {
        let status = json!({"data": {
            "grand_total": {"decimal": "3.50", "text": "3 hrs 30 mins"},
            "categories": [{"name": "Coding", "decimal": "3.00"}, {"name": "Debugging", "decimal": "0.50"}],
            "languages": [
                {"name": "Rust", "decimal": "3.00", "percent": 85.7, "total_seconds": 10800.0},
                {"name": "TOML", "decimal": "0.00", "percent": 0.0, "total_seconds": 0.0},
                {"name": "Text", "text": "0 secs", "percent": 0.0}
            ]
        }});
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");

        let record = DailyRecord::from_status(date, &status).expect("record built");

        assert_eq!(record.weekday, "Monday");
        assert_eq!(record.total_hours, 3.5);
        assert_eq!(record.categories["Debugging"], 0.5);
        assert_eq!(record.languages.len(), 1);
        assert_eq!(record.languages["Rust"].hours, 3.0);
        assert_eq!(record.languages["Rust"].percent, 85.7);
    }

    #[test]
    fn record_from_status_requires_grand_total() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");

        assert!(DailyRecord::from_status(date, &json!({"data": {}})).is_err());
        assert!(DailyRecord::from_status(date, &json!({})).is_err());
    }
}
