//! Consolidation layer: merges extracted brackets into one persisted store,
//! derives the athlete index, and answers opponent-path queries.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use bscout_core::{
    AthleteKey, CanonicalBracket, CategoryDescriptor, Corner, CornerSide, Gender, MatchRecord,
};
use bscout_extract::ExtractError;
use bscout_session::{extract_snapshots, SessionOptions};
use bscout_storage::{write_json_atomic, BackoffPolicy, SnapshotRef, SnapshotStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const CRATE_NAME: &str = "bscout-sync";

/// Identity of one match slot across fetches of the same category.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchKey {
    pub event_id: String,
    pub category_id: String,
    pub round_index: u32,
    pub slot_index: u32,
}

impl MatchKey {
    pub fn of(record: &MatchRecord) -> Self {
        Self {
            event_id: record.event_id.clone(),
            category_id: record.category_id.clone(),
            round_index: record.round_index,
            slot_index: record.slot_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMatch {
    pub record: MatchRecord,
    pub fetched_at: DateTime<Utc>,
}

/// Display metadata carried per category, refreshed on the same
/// latest-fetch-wins rule as match records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMeta {
    pub event_id: String,
    pub category_id: String,
    pub event_name: String,
    pub category_label: String,
    pub round_labels: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Outcome of merging one bracket. Ambiguous slots are reported, never
/// surfaced as errors; the previously stored value stays in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub inserted: usize,
    pub replaced: usize,
    pub unchanged: usize,
    pub ambiguous: Vec<MatchKey>,
}

/// All merged match records, keyed by `(event, category, round, slot)`.
///
/// A single writer mutates the store; readers work off the last persisted
/// JSON document. Merging the same bracket twice is a no-op, and merging two
/// fetches in either order converges on the newer `fetched_at` per slot.
#[derive(Debug, Clone, Default)]
pub struct ConsolidatedStore {
    matches: BTreeMap<MatchKey, StoredMatch>,
    categories: BTreeMap<(String, String), CategoryMeta>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    schema_version: u32,
    categories: Vec<CategoryMeta>,
    matches: Vec<StoredMatch>,
}

const STORE_SCHEMA_VERSION: u32 = 1;

impl ConsolidatedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn get(&self, key: &MatchKey) -> Option<&StoredMatch> {
        self.matches.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MatchKey, &StoredMatch)> {
        self.matches.iter()
    }

    /// `(event_id, category_id)` pairs present in the store, sorted.
    pub fn categories(&self) -> impl Iterator<Item = &CategoryMeta> {
        self.categories.values()
    }

    pub fn category_meta(&self, event_id: &str, category_id: &str) -> Option<&CategoryMeta> {
        self.categories
            .get(&(event_id.to_string(), category_id.to_string()))
    }

    /// Matches of one category in bracket order (round, then slot).
    pub fn category_matches<'a>(
        &'a self,
        event_id: &'a str,
        category_id: &'a str,
    ) -> impl Iterator<Item = &'a StoredMatch> {
        self.matches
            .iter()
            .filter(move |(k, _)| k.event_id == event_id && k.category_id == category_id)
            .map(|(_, v)| v)
    }

    /// Merge one extracted bracket stamped with its snapshot's fetch time.
    ///
    /// Per slot: a newer fetch replaces, an older fetch is ignored, an equal
    /// timestamp with an identical record is a no-op, and an equal timestamp
    /// with a *different* record is ambiguous: the stored value is kept and
    /// the conflict logged.
    pub fn merge(&mut self, bracket: &CanonicalBracket, fetched_at: DateTime<Utc>) -> MergeSummary {
        let mut summary = MergeSummary::default();

        for record in bracket.all_matches() {
            let key = MatchKey::of(record);
            match self.matches.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(StoredMatch {
                        record: record.clone(),
                        fetched_at,
                    });
                    summary.inserted += 1;
                }
                Entry::Occupied(mut slot) => {
                    let stored = slot.get();
                    if fetched_at > stored.fetched_at {
                        slot.insert(StoredMatch {
                            record: record.clone(),
                            fetched_at,
                        });
                        summary.replaced += 1;
                    } else if fetched_at == stored.fetched_at && stored.record != *record {
                        let key = slot.key().clone();
                        warn!(
                            event_id = %key.event_id,
                            category_id = %key.category_id,
                            round_index = key.round_index,
                            slot_index = key.slot_index,
                            "ambiguous merge: same fetch time, different records; keeping stored value"
                        );
                        summary.ambiguous.push(key);
                    } else {
                        summary.unchanged += 1;
                    }
                }
            }
        }

        let meta_key = (bracket.event_id.clone(), bracket.category_id.clone());
        let incoming = CategoryMeta {
            event_id: bracket.event_id.clone(),
            category_id: bracket.category_id.clone(),
            event_name: bracket.event_name.clone(),
            category_label: bracket.category_label.clone(),
            round_labels: bracket.round_labels(),
            fetched_at,
        };
        match self.categories.entry(meta_key) {
            Entry::Vacant(slot) => {
                slot.insert(incoming);
            }
            Entry::Occupied(mut slot) => {
                if fetched_at > slot.get().fetched_at {
                    slot.insert(incoming);
                }
            }
        }

        summary
    }

    /// Load the persisted store. A missing file is an empty store.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path)
            .await
            .with_context(|| format!("checking {}", path.display()))?
        {
            return Ok(Self::default());
        }
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let document: StoreDocument =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;

        let mut store = Self::default();
        for meta in document.categories {
            store
                .categories
                .insert((meta.event_id.clone(), meta.category_id.clone()), meta);
        }
        for stored in document.matches {
            store.matches.insert(MatchKey::of(&stored.record), stored);
        }
        Ok(store)
    }

    /// Atomically replace the persisted document.
    pub async fn persist(&self, path: &Path) -> Result<()> {
        let document = StoreDocument {
            schema_version: STORE_SCHEMA_VERSION,
            categories: self.categories.values().cloned().collect(),
            matches: self.matches.values().cloned().collect(),
        };
        write_json_atomic(path, &document).await
    }
}

/// Athlete lookup over the consolidated store. Rebuilt by full scan after
/// every merge pass; never persisted. Names fold case, country codes do not.
#[derive(Debug, Default)]
pub struct AthleteMatchIndex {
    by_athlete: BTreeMap<AthleteKey, Vec<MatchKey>>,
}

fn fold_athlete(key: &AthleteKey) -> AthleteKey {
    AthleteKey::new(key.name.to_ascii_uppercase(), key.country_code.clone())
}

impl AthleteMatchIndex {
    pub fn rebuild(store: &ConsolidatedStore) -> Self {
        let mut by_athlete: BTreeMap<AthleteKey, Vec<MatchKey>> = BTreeMap::new();
        // Store iteration is already (event, category, round, slot) order,
        // so per-athlete lists come out sorted.
        for (key, stored) in store.iter() {
            for corner in [&stored.record.red, &stored.record.blue]
                .into_iter()
                .flatten()
            {
                by_athlete
                    .entry(fold_athlete(&AthleteKey::of(corner)))
                    .or_default()
                    .push(key.clone());
            }
        }
        Self { by_athlete }
    }

    pub fn matches_for(&self, athlete: &AthleteKey) -> &[MatchKey] {
        self.by_athlete
            .get(&fold_athlete(athlete))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn athlete_count(&self) -> usize {
        self.by_athlete.len()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AnalyzerError {
    #[error("athlete {name:?} ({country_code}) not found in {event_id}/{category_id}")]
    AthleteNotFound {
        name: String,
        country_code: String,
        event_id: String,
        category_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepOutcome {
    Won,
    Lost,
    Bye,
    Unresolved,
}

/// One round of an athlete's run through a bracket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathStep {
    pub round_index: u32,
    pub round_label: String,
    pub slot_index: u32,
    /// Absent for byes.
    pub opponent: Option<Corner>,
    pub outcome: StepOutcome,
}

/// Walk an athlete's run through one category, earliest appearance onward.
///
/// The winner of slot `i` meets slot `i / 2` of the next round, so the walk
/// follows that halving until the athlete loses, a match is unresolved, or
/// the rounds run out. Byes contribute a step without an opponent. Read-only
/// over the store, so concurrent queries are safe.
pub fn opponent_path(
    store: &ConsolidatedStore,
    event_id: &str,
    category_id: &str,
    athlete: &AthleteKey,
) -> Result<Vec<PathStep>, AnalyzerError> {
    let mut start = None;
    for stored in store.category_matches(event_id, category_id) {
        if stored.record.side_of(athlete).is_some() {
            start = Some(MatchKey::of(&stored.record));
            break;
        }
    }
    let Some(mut cursor) = start else {
        return Err(AnalyzerError::AthleteNotFound {
            name: athlete.name.clone(),
            country_code: athlete.country_code.clone(),
            event_id: event_id.to_string(),
            category_id: category_id.to_string(),
        });
    };

    let mut steps = Vec::new();
    while let Some(stored) = store.get(&cursor) {
        let record = &stored.record;
        let Some(side) = record.side_of(athlete) else {
            // The fed slot does not carry the athlete; two fetches merged
            // into an inconsistent chain. Stop rather than guess.
            break;
        };
        let opponent = match side {
            CornerSide::Red => record.blue.clone(),
            CornerSide::Blue => record.red.clone(),
        };
        let outcome = match record.winner {
            Some(winner) if winner == side => {
                if record.is_bye {
                    StepOutcome::Bye
                } else {
                    StepOutcome::Won
                }
            }
            Some(_) => StepOutcome::Lost,
            None => StepOutcome::Unresolved,
        };
        steps.push(PathStep {
            round_index: record.round_index,
            round_label: record.round_label.clone(),
            slot_index: record.slot_index,
            opponent,
            outcome,
        });

        match outcome {
            StepOutcome::Won | StepOutcome::Bye => {
                cursor = MatchKey {
                    event_id: cursor.event_id,
                    category_id: cursor.category_id,
                    round_index: cursor.round_index + 1,
                    slot_index: cursor.slot_index / 2,
                };
            }
            StepOutcome::Lost | StepOutcome::Unresolved => break,
        }
    }

    Ok(steps)
}

/// Opponents faced along a path, in round order. Byes are skipped.
pub fn path_opponents(steps: &[PathStep]) -> Vec<&Corner> {
    steps.iter().filter_map(|s| s.opponent.as_ref()).collect()
}

/// Snapshots re-extracted into brackets, ready to merge. Parse failures stay
/// isolated per snapshot; the raw files are never touched.
#[derive(Debug, Default)]
pub struct ReparseOutcome {
    pub brackets: Vec<(CanonicalBracket, DateTime<Utc>)>,
    pub failures: Vec<(SnapshotRef, ExtractError)>,
}

const REPARSE_CONCURRENCY: usize = 4;

/// Re-extract retained snapshots: the newest per category, or every snapshot
/// when `force` is set. `event_id = None` covers all events on disk.
pub async fn reparse_all(
    snapshots: &SnapshotStore,
    event_id: Option<&str>,
    force: bool,
) -> Result<ReparseOutcome> {
    let event_ids = match event_id {
        Some(id) => vec![id.to_string()],
        None => snapshots.event_ids().await?,
    };

    let mut refs = Vec::new();
    for event in &event_ids {
        for category in snapshots.category_ids(event).await? {
            if force {
                refs.extend(snapshots.list_category(event, &category).await?);
            } else if let Some(latest) = snapshots.latest(event, &category).await? {
                refs.push(latest);
            }
        }
    }

    let mut outcome = ReparseOutcome::default();
    for (snapshot_ref, result) in extract_snapshots(snapshots, refs, REPARSE_CONCURRENCY).await {
        match result {
            Ok(bracket) => outcome.brackets.push((bracket, snapshot_ref.fetched_at)),
            Err(err) => {
                warn!(
                    event_id = %snapshot_ref.event_id,
                    category_id = %snapshot_ref.category_id,
                    error = %err,
                    "snapshot failed to re-extract; raw file retained"
                );
                outcome.failures.push((snapshot_ref, err));
            }
        }
    }
    Ok(outcome)
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryMergeReport {
    pub event_id: String,
    pub category_id: String,
    pub inserted: usize,
    pub replaced: usize,
    pub unchanged: usize,
    pub ambiguous: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryFailure {
    pub event_id: String,
    pub category_id: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub merged: Vec<CategoryMergeReport>,
    pub failed: Vec<CategoryFailure>,
    pub stored_matches: usize,
    pub indexed_athletes: usize,
    pub store_path: String,
}

/// Merge a batch of brackets into the persisted store and rebuild the index.
///
/// The store is loaded, mutated, and atomically re-persisted by this single
/// writer; a crash mid-run leaves the previous document intact.
pub async fn merge_all(
    store_path: &Path,
    batch: Vec<(CanonicalBracket, DateTime<Utc>)>,
    failures: Vec<(SnapshotRef, ExtractError)>,
) -> Result<(ConsolidatedStore, RunSummary)> {
    let started_at = Utc::now();
    let mut store = ConsolidatedStore::load(store_path).await?;

    let mut merged = Vec::new();
    for (bracket, fetched_at) in &batch {
        let summary = store.merge(bracket, *fetched_at);
        merged.push(CategoryMergeReport {
            event_id: bracket.event_id.clone(),
            category_id: bracket.category_id.clone(),
            inserted: summary.inserted,
            replaced: summary.replaced,
            unchanged: summary.unchanged,
            ambiguous: summary.ambiguous.len(),
        });
    }

    let failed = failures
        .into_iter()
        .map(|(snapshot_ref, err)| CategoryFailure {
            event_id: snapshot_ref.event_id,
            category_id: snapshot_ref.category_id,
            detail: err.to_string(),
        })
        .collect::<Vec<_>>();

    let index = AthleteMatchIndex::rebuild(&store);
    store.persist(store_path).await?;

    let summary = RunSummary {
        started_at,
        finished_at: Utc::now(),
        merged,
        failed,
        stored_matches: store.len(),
        indexed_athletes: index.athlete_count(),
        store_path: store_path.display().to_string(),
    };
    info!(
        categories = summary.merged.len(),
        failures = summary.failed.len(),
        stored_matches = summary.stored_matches,
        indexed_athletes = summary.indexed_athletes,
        "merge pass complete"
    );
    Ok((store, summary))
}

/// External event catalog: human names mapped to the draw service's numeric
/// ids, with an optional category list per event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventCatalog {
    pub events: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub event_id: String,
    pub name: String,
    #[serde(default)]
    pub categories: Vec<CatalogCategory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogCategory {
    pub category_id: String,
    pub label: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub weight_class: Option<String>,
}

impl EventCatalog {
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn find(&self, event_id: &str) -> Option<&CatalogEntry> {
        self.events.iter().find(|e| e.event_id == event_id)
    }
}

impl CatalogEntry {
    pub fn category_descriptors(&self) -> Vec<CategoryDescriptor> {
        self.categories
            .iter()
            .map(|c| CategoryDescriptor {
                event_id: self.event_id.clone(),
                category_id: c.category_id.clone(),
                label: c.label.clone(),
                gender: c.gender.as_deref().and_then(parse_gender),
                weight_class: c.weight_class.clone(),
            })
            .collect()
    }
}

fn parse_gender(raw: &str) -> Option<Gender> {
    match raw.to_ascii_lowercase().as_str() {
        "male" | "m" => Some(Gender::Male),
        "female" | "f" => Some(Gender::Female),
        "mixed" | "x" => Some(Gender::Mixed),
        _ => None,
    }
}

/// Runtime configuration from the environment, defaults matching the live
/// draw service's tolerances.
#[derive(Debug, Clone)]
pub struct ScoutConfig {
    pub data_dir: PathBuf,
    pub catalog_path: PathBuf,
    pub base_url: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub challenge_max_wait_secs: u64,
    pub poll_interval_secs: u64,
    pub staleness_hours: i64,
    pub max_retries: usize,
}

impl ScoutConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("BSCOUT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            catalog_path: std::env::var("BSCOUT_EVENTS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("events.yaml")),
            base_url: std::env::var("BSCOUT_BASE_URL").unwrap_or_else(|_| {
                "https://www.sportdata.org/ju-jitsu/set-online".to_string()
            }),
            user_agent: std::env::var("BSCOUT_USER_AGENT")
                .unwrap_or_else(|_| "bscout/0.1".to_string()),
            http_timeout_secs: env_parse("BSCOUT_HTTP_TIMEOUT_SECS", 30),
            challenge_max_wait_secs: env_parse("BSCOUT_CHALLENGE_MAX_WAIT_SECS", 600),
            poll_interval_secs: env_parse("BSCOUT_POLL_INTERVAL_SECS", 3),
            staleness_hours: env_parse("BSCOUT_STALENESS_HOURS", 24),
            max_retries: env_parse("BSCOUT_MAX_RETRIES", 3),
        }
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("consolidated.json")
    }

    pub fn session_options(&self, force: bool) -> SessionOptions {
        SessionOptions {
            force,
            max_wait: Duration::from_secs(self.challenge_max_wait_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            retry: BackoffPolicy {
                max_retries: self.max_retries,
                ..BackoffPolicy::default()
            },
            staleness: chrono::Duration::hours(self.staleness_hours),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
