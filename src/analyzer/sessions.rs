use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One editor heartbeat as returned by `users/current/heartbeats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub time: f64,
    pub entity: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub project: Option<String>,
    pub language: Option<String>,
    pub category: Option<String>,
    pub branch: Option<String>,
    pub line_additions: Option<i64>,
    pub line_deletions: Option<i64>,
    pub lines: Option<i64>,
    pub lineno: Option<i64>,
    pub cursorpos: Option<i64>,
    pub is_write: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileActivity {
    pub seconds: f64,
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Activities {
    pub files: BTreeMap<String, FileActivity>,
    pub projects: BTreeMap<String, f64>,
    pub languages: BTreeMap<String, f64>,
    pub categories: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LineChanges {
    pub additions: u64,
    pub deletions: u64,
}

impl LineChanges {
    fn of(heartbeat: &Heartbeat) -> Self {
        Self {
            additions: non_negative(heartbeat.line_additions),
            deletions: non_negative(heartbeat.line_deletions),
        }
    }

    fn fold(&mut self, heartbeat: &Heartbeat) {
        let delta = Self::of(heartbeat);
        self.additions += delta.additions;
        self.deletions += delta.deletions;
    }
}

/// A contiguous block of activity. Durations are seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub start_time: f64,
    pub end_time: f64,
    pub duration_seconds: f64,
    pub activities: Activities,
    pub line_changes: LineChanges,
}

impl Session {
    fn open(heartbeat: &Heartbeat) -> Self {
        let mut session = Self {
            start_time: heartbeat.time,
            end_time: heartbeat.time,
            duration_seconds: 0.0,
            activities: Activities::default(),
            line_changes: LineChanges::of(heartbeat),
        };
        session.register(heartbeat);
        session
    }

    fn register(&mut self, heartbeat: &Heartbeat) {
        self.add(heartbeat, 0.0);
    }

    /// Charges `seconds` to every dimension present on `heartbeat`.
    fn charge(&mut self, heartbeat: &Heartbeat, seconds: f64) {
        // NaN falls through here too
        if !(seconds > 0.0) {
            return;
        }
        self.add(heartbeat, seconds);
    }

    fn add(&mut self, heartbeat: &Heartbeat, seconds: f64) {
        let activities = &mut self.activities;

        if let Some(entity) = heartbeat.entity.as_deref() {
            activities
                .files
                .entry(file_key(entity).to_string())
                .or_insert_with(|| FileActivity {
                    seconds: 0.0,
                    kind: heartbeat
                        .kind
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                })
                .seconds += seconds;
        }

        [
            (&mut activities.projects, &heartbeat.project),
            (&mut activities.languages, &heartbeat.language),
            (&mut activities.categories, &heartbeat.category),
        ]
        .into_iter()
        .filter_map(|(map, key)| key.as_ref().map(|key| (map, key)))
        .for_each(|(map, key)| {
            *map.entry(key.clone()).or_insert(0.0) += seconds;
        });
    }

    pub fn summarize(&self) -> SessionSummary {
        let to_minutes = |source: &BTreeMap<String, f64>| {
            source
                .iter()
                .map(|(name, seconds)| (name.clone(), sec_to_min(*seconds)))
                .collect::<BTreeMap<_, _>>()
        };

        SessionSummary {
            start_time: format_local(self.start_time),
            end_time: format_local(self.end_time),
            duration_seconds: self.duration_seconds.round() as i64,
            duration_minutes: sec_to_min(self.duration_seconds),
            files: self
                .activities
                .files
                .iter()
                .map(|(name, file)| {
                    (
                        name.clone(),
                        FileMinutes {
                            minutes: sec_to_min(file.seconds),
                            kind: file.kind.clone(),
                        },
                    )
                })
                .collect(),
            projects: to_minutes(&self.activities.projects),
            languages: to_minutes(&self.activities.languages),
            categories: to_minutes(&self.activities.categories),
            line_changes: self.line_changes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMinutes {
    pub minutes: f64,
    pub kind: String,
}

/// Display form of a [`Session`]: local timestamps and two-decimal minutes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub start_time: String,
    pub end_time: String,
    pub duration_seconds: i64,
    pub duration_minutes: f64,
    pub files: BTreeMap<String, FileMinutes>,
    pub projects: BTreeMap<String, f64>,
    pub languages: BTreeMap<String, f64>,
    pub categories: BTreeMap<String, f64>,
    pub line_changes: LineChanges,
}

/// Merges heartbeats into sessions.
///
/// Heartbeats are sorted by time first. Two consecutive heartbeats belong to the
/// same session when their gap is at most `merge_threshold` seconds. The gap is
/// charged to the dimensions of the earlier heartbeat, i.e. the activity that was
/// ongoing while the time elapsed.
pub fn reconstruct_sessions(mut heartbeats: Vec<Heartbeat>, merge_threshold: f64) -> Vec<Session> {
    heartbeats.sort_by(|left, right| left.time.total_cmp(&right.time));

    let Some((first, rest)) = heartbeats.split_first() else {
        return Vec::new();
    };

    let mut sessions = Vec::new();
    let mut current = Session::open(first);
    let mut previous = first;

    for heartbeat in rest {
        let gap = heartbeat.time - previous.time;

        if gap <= merge_threshold {
            current.end_time = heartbeat.time;
            current.duration_seconds = heartbeat.time - current.start_time;
            current.charge(previous, gap);
            current.line_changes.fold(heartbeat);
        } else {
            let remaining = current.end_time - previous.time;
            current.charge(previous, remaining);
            sessions.push(current);
            current = Session::open(heartbeat);
        }

        previous = heartbeat;
    }

    let remaining = current.end_time - previous.time;
    current.charge(previous, remaining);
    sessions.push(current);

    sessions
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeartbeatDigest {
    pub heartbeat_count: usize,
    pub files: BTreeSet<String>,
    pub projects: BTreeMap<String, usize>,
    pub languages: BTreeMap<String, usize>,
}

/// Counts heartbeats per project and language and collects the touched entities.
pub fn digest_heartbeats(heartbeats: &[Heartbeat]) -> HeartbeatDigest {
    heartbeats
        .iter()
        .fold(HeartbeatDigest::default(), |mut acc, heartbeat| {
            acc.heartbeat_count += 1;
            if let Some(entity) = &heartbeat.entity {
                acc.files.insert(entity.clone());
            }
            if let Some(project) = &heartbeat.project {
                *acc.projects.entry(project.clone()).or_insert(0) += 1;
            }
            if let Some(language) = &heartbeat.language {
                *acc.languages.entry(language.clone()).or_insert(0) += 1;
            }
            acc
        })
}

/// Base name of an entity path; both separators are accepted since heartbeats
/// can originate from Windows editors.
pub fn file_key(entity: &str) -> &str {
    entity
        .rsplit(['/', '\\'])
        .find(|part| !part.is_empty())
        .unwrap_or(entity)
}

pub fn format_local(epoch_seconds: f64) -> String {
    DateTime::from_timestamp(epoch_seconds.floor() as i64, 0)
        .map(|datetime| {
            datetime
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| epoch_seconds.to_string())
}

fn sec_to_min(seconds: f64) -> f64 {
    round2(seconds / 60.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn non_negative(value: Option<i64>) -> u64 {
    value.unwrap_or_default().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::{Heartbeat, digest_heartbeats, file_key, reconstruct_sessions};

    fn beat(time: f64, entity: &str) -> Heartbeat {
        Heartbeat {
            time,
            entity: Some(entity.to_string()),
            ..Heartbeat::default()
        }
    }

    #[test]
    fn empty_input_yields_no_sessions() {
        assert!(reconstruct_sessions(Vec::new(), 300.0).is_empty());
    }

    #[test]
    fn gap_beyond_threshold_splits_sessions() {
        let heartbeats = vec![
            beat(0.0, "a.py"),
            beat(100.0, "a.py"),
            beat(200.0, "a.py"),
            beat(1000.0, "a.py"),
        ];

        let sessions = reconstruct_sessions(heartbeats, 300.0);

        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].start_time, 0.0);
        assert_eq!(sessions[0].end_time, 200.0);
        assert_eq!(sessions[0].duration_seconds, 200.0);
        assert_eq!(sessions[0].activities.files["a.py"].seconds, 200.0);
        assert_eq!(sessions[1].start_time, 1000.0);
        assert_eq!(sessions[1].end_time, 1000.0);
        assert_eq!(sessions[1].duration_seconds, 0.0);
        assert_eq!(sessions[1].activities.files["a.py"].seconds, 0.0);
    }

    #[test]
    fn threshold_is_inclusive() {
        let merged = reconstruct_sessions(vec![beat(0.0, "a.rs"), beat(300.0, "a.rs")], 300.0);
        let split = reconstruct_sessions(vec![beat(0.0, "a.rs"), beat(300.5, "a.rs")], 300.0);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].duration_seconds, 300.0);
        assert_eq!(split.len(), 2);
    }

    #[test]
    fn lone_heartbeat_is_zero_length_session() {
        let sessions = reconstruct_sessions(vec![beat(42.0, "main.rs")], 300.0);

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration_seconds, 0.0);
        assert_eq!(sessions[0].activities.files["main.rs"].seconds, 0.0);
    }

    #[test]
    fn identical_timestamps_merge_without_attribution() {
        let sessions = reconstruct_sessions(vec![beat(10.0, "a.rs"), beat(10.0, "b.rs")], 300.0);

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration_seconds, 0.0);
        assert_eq!(sessions[0].activities.files["a.rs"].seconds, 0.0);
        assert!(!sessions[0].activities.files.contains_key("b.rs"));
    }

    #[test]
    fn gap_is_charged_to_the_previous_heartbeat() {
        let heartbeats = vec![
            beat(0.0, "first.rs"),
            beat(60.0, "second.rs"),
            beat(180.0, "third.rs"),
        ];

        let session = &reconstruct_sessions(heartbeats, 300.0)[0];

        assert_eq!(session.activities.files["first.rs"].seconds, 60.0);
        assert_eq!(session.activities.files["second.rs"].seconds, 120.0);
        assert!(!session.activities.files.contains_key("third.rs"));
    }

    #[test]
    fn file_keys_ignore_directories() {
        let heartbeats = vec![
            beat(0.0, "/a/b/x.py"),
            beat(30.0, "/c/x.py"),
            beat(90.0, "C:\\work\\x.py"),
            beat(100.0, "other.py"),
        ];

        let session = &reconstruct_sessions(heartbeats, 300.0)[0];

        assert_eq!(session.activities.files.len(), 1);
        assert_eq!(session.activities.files["x.py"].seconds, 100.0);
        assert_eq!(file_key("/tmp/dir/"), "dir");
    }

    #[test]
    fn dimensions_accumulate_independently() {
        let heartbeats = vec![
            Heartbeat {
                time: 0.0,
                project: Some("core".to_string()),
                language: Some("Rust".to_string()),
                category: Some("coding".to_string()),
                ..Heartbeat::default()
            },
            Heartbeat {
                time: 50.0,
                language: Some("Rust".to_string()),
                category: Some("debugging".to_string()),
                ..Heartbeat::default()
            },
            Heartbeat {
                time: 80.0,
                ..Heartbeat::default()
            },
        ];

        let session = &reconstruct_sessions(heartbeats, 300.0)[0];

        assert_eq!(session.duration_seconds, 80.0);
        assert_eq!(session.activities.projects["core"], 50.0);
        assert_eq!(session.activities.languages["Rust"], 80.0);
        assert_eq!(session.activities.categories["coding"], 50.0);
        assert_eq!(session.activities.categories["debugging"], 30.0);
        assert!(session.activities.files.is_empty());
    }

    #[test]
    fn line_changes_fold_per_session() {
        let with_lines = |time: f64, additions: i64, deletions: i64| Heartbeat {
            time,
            line_additions: Some(additions),
            line_deletions: Some(deletions),
            ..Heartbeat::default()
        };
        let heartbeats = vec![
            with_lines(0.0, 1, 0),
            with_lines(10.0, 5, 2),
            with_lines(20.0, 3, 1),
            with_lines(5000.0, 7, 4),
            with_lines(5010.0, -3, 2),
        ];

        let sessions = reconstruct_sessions(heartbeats, 300.0);

        assert_eq!(sessions[0].line_changes.additions, 9);
        assert_eq!(sessions[0].line_changes.deletions, 3);
        assert_eq!(sessions[1].line_changes.additions, 7);
        assert_eq!(sessions[1].line_changes.deletions, 6);
    }

    #[test]
    fn unsorted_input_is_ordered_before_merging() {
        let heartbeats = vec![beat(200.0, "a.rs"), beat(0.0, "a.rs"), beat(100.0, "a.rs")];

        let sessions = reconstruct_sessions(heartbeats, 300.0);

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].start_time, 0.0);
        assert_eq!(sessions[0].activities.files["a.rs"].seconds, 200.0);
    }

    #[test]
    fn summary_rounds_to_minutes() {
        let mut heartbeats = vec![beat(0.0, "lib.rs"), beat(100.0, "lib.rs")];
        heartbeats[0].kind = Some("file".to_string());

        let summary = reconstruct_sessions(heartbeats, 300.0)[0].summarize();

        assert_eq!(summary.duration_seconds, 100);
        assert_eq!(summary.duration_minutes, 1.67);
        assert_eq!(summary.files["lib.rs"].minutes, 1.67);
        assert_eq!(summary.files["lib.rs"].kind, "file");
    }

    #[test]
    fn digest_counts_projects_and_languages() {
        let heartbeats = vec![
            Heartbeat {
                time: 1.0,
                entity: Some("/src/a.rs".to_string()),
                project: Some("p".to_string()),
                language: Some("Rust".to_string()),
                ..Heartbeat::default()
            },
            Heartbeat {
                time: 2.0,
                entity: Some("/src/a.rs".to_string()),
                project: Some("p".to_string()),
                ..Heartbeat::default()
            },
        ];

        let digest = digest_heartbeats(&heartbeats);

        assert_eq!(digest.heartbeat_count, 2);
        assert_eq!(digest.files.len(), 1);
        assert_eq!(digest.projects["p"], 2);
        assert_eq!(digest.languages["Rust"], 1);
    }

    #[test]
    fn heartbeat_parses_api_shape() {
        let raw = r#"{"time": 1700000000.5, "entity": "/x/y.rs", "type": "file",
            "line_additions": null, "is_write": true, "dependencies": []}"#;

        let heartbeat: Heartbeat = serde_json::from_str(raw).expect("heartbeat parsed");

        assert_eq!(heartbeat.kind.as_deref(), Some("file"));
        assert_eq!(heartbeat.line_additions, None);
        assert_eq!(heartbeat.is_write, Some(true));
    }
}
