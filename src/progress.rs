use crate::data::Dataset;
use crate::error::StorageError;
use serde::Serialize;
use simd_json::prelude::*;
use simd_json::OwnedValue;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::PathBuf;

/// Key the progress document is stored under
pub const DEFAULT_STORAGE_KEY: &str = "gift_progress_v1";

/// Persistent key/value store for small documents
pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// One `<key>.json` file per key inside a directory
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        // Write then rename so a crash never leaves half a document behind
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        fs::write(&tmp, value)?;
        if let Err(e) = fs::rename(&tmp, self.path_for(key)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

/// In-memory store
#[cfg(test)]
#[derive(Default, Debug, Clone)]
pub struct MemoryStorage {
    entries: std::collections::HashMap<String, String>,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn with_entry(key: &str, value: &str) -> Self {
        let mut storage = Self::default();
        storage.entries.insert(key.to_string(), value.to_string());
        storage
    }
}

#[cfg(test)]
impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Unlock and solved state of one city
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CityProgress {
    pub unlocked_max_order: u32,
    pub solved: BTreeSet<String>,
}

impl Default for CityProgress {
    fn default() -> Self {
        Self {
            unlocked_max_order: 1,
            solved: BTreeSet::new(),
        }
    }
}

/// Progress of every city, keyed by city key
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    cities: BTreeMap<String, CityProgress>,
}

impl Progress {
    /// Defaults for each of `keys`
    pub fn fresh<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            cities: keys
                .into_iter()
                .map(|k| (k.to_string(), CityProgress::default()))
                .collect(),
        }
    }

    /// State of a city; a city never seen counts as fresh
    pub fn city(&self, key: &str) -> CityProgress {
        self.cities.get(key).cloned().unwrap_or_default()
    }

    pub fn unlocked_max_order(&self, city: &str) -> u32 {
        self.cities.get(city).map_or(1, |c| c.unlocked_max_order)
    }

    pub fn is_solved(&self, city: &str, place_id: &str) -> bool {
        self.cities
            .get(city)
            .is_some_and(|c| c.solved.contains(place_id))
    }

    pub fn city_mut(&mut self, key: &str) -> &mut CityProgress {
        self.cities.entry(key.to_string()).or_default()
    }

    /// Serialize to the persisted document format
    pub fn to_json(&self) -> Result<String, StorageError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Record<'a> {
            unlocked_max_order: u32,
            solved: BTreeMap<&'a str, bool>,
        }

        let doc: BTreeMap<&str, Record> = self
            .cities
            .iter()
            .map(|(key, city)| {
                let record = Record {
                    unlocked_max_order: city.unlocked_max_order,
                    solved: city.solved.iter().map(|id| (id.as_str(), true)).collect(),
                };
                (key.as_str(), record)
            })
            .collect();
        Ok(simd_json::serde::to_string(&doc)?)
    }
}

/// Counter from a stored value; whole-number floats count, anything else is
/// unreadable
fn read_order(value: &OwnedValue) -> Option<u32> {
    let n = if let Some(n) = value.as_i64() {
        n
    } else if let Some(n) = value.as_u64() {
        i64::try_from(n).unwrap_or(i64::MAX)
    } else {
        let f = value.as_f64()?;
        if !f.is_finite() || f.fract() != 0.0 {
            return None;
        }
        f as i64
    };
    Some(n.clamp(1, u32::MAX as i64) as u32)
}

/// Loose truthiness, so `1` or `"yes"` in a solved map still counts
fn is_truthy(value: &OwnedValue) -> bool {
    if let Some(b) = value.as_bool() {
        b
    } else if let Some(n) = value.as_i64() {
        n != 0
    } else if let Some(n) = value.as_u64() {
        n != 0
    } else if let Some(f) = value.as_f64() {
        f != 0.0 && !f.is_nan()
    } else if let Some(s) = value.as_str() {
        !s.is_empty()
    } else {
        !value.is_null()
    }
}

/// Overlay persisted records onto fresh defaults, field by field. A field
/// that cannot be read keeps its default; the other field still applies.
/// Known cities get their counter clamped into [1, max order]; unknown
/// cities are carried along.
fn merge_persisted(raw: &str, limits: &BTreeMap<String, u32>) -> Result<Progress, simd_json::Error> {
    let mut bytes = raw.as_bytes().to_vec();
    let doc: BTreeMap<String, OwnedValue> = simd_json::serde::from_slice(&mut bytes)?;

    let mut progress = Progress::fresh(limits.keys().map(String::as_str));
    for (key, value) in doc {
        let city = progress.city_mut(&key);
        let Some(record) = value.as_object() else {
            tracing::warn!(city = %key, "ignoring progress record that is not an object");
            continue;
        };

        if let Some(unlocked) = record.get("unlockedMaxOrder") {
            match read_order(unlocked) {
                Some(order) => city.unlocked_max_order = order,
                None => tracing::warn!(city = %key, "ignoring unreadable unlockedMaxOrder"),
            }
        }
        if let Some(solved) = record.get("solved") {
            match solved.as_object() {
                Some(entries) => {
                    city.solved = entries
                        .iter()
                        .filter(|(_, done)| is_truthy(done))
                        .map(|(id, _)| id.to_string())
                        .collect();
                }
                None => tracing::warn!(city = %key, "ignoring unreadable solved set"),
            }
        }

        if let Some(&max) = limits.get(&key) {
            city.unlocked_max_order = city.unlocked_max_order.min(max.max(1));
        }
    }
    Ok(progress)
}

/// Owns the in-memory progress and keeps storage in step with it
pub struct ProgressStore<S> {
    storage: S,
    key: String,
    /// Known city -> highest order
    limits: BTreeMap<String, u32>,
    progress: Progress,
}

impl<S: Storage> ProgressStore<S> {
    /// Read persisted progress for the dataset's cities. Never fails: absent or
    /// unreadable data yields defaults.
    pub fn load(storage: S, key: impl Into<String>, dataset: &Dataset) -> Self {
        let key = key.into();
        let limits: BTreeMap<String, u32> = dataset
            .city_keys()
            .map(|k| (k.to_string(), dataset.max_order(k)))
            .collect();

        let progress = match storage.get(&key) {
            Ok(Some(raw)) => match merge_persisted(&raw, &limits) {
                Ok(progress) => {
                    tracing::info!(key = %key, "progress restored");
                    progress
                }
                Err(e) => {
                    tracing::warn!(key = %key, "cannot read progress, starting fresh: {}", e);
                    Progress::fresh(limits.keys().map(String::as_str))
                }
            },
            Ok(None) => {
                tracing::info!(key = %key, "no saved progress, starting fresh");
                Progress::fresh(limits.keys().map(String::as_str))
            }
            Err(e) => {
                tracing::warn!(key = %key, "cannot read progress, starting fresh: {}", e);
                Progress::fresh(limits.keys().map(String::as_str))
            }
        };

        Self {
            storage,
            key,
            limits,
            progress,
        }
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Persist the current progress
    pub fn save(&mut self) -> Result<(), StorageError> {
        let doc = self.progress.to_json()?;
        self.storage.set(&self.key, &doc)
    }

    /// Replace the progress and persist it. Memory is updated even when
    /// persisting fails.
    pub fn commit(&mut self, progress: Progress) -> Result<(), StorageError> {
        self.progress = progress;
        self.save()
    }

    /// Back to defaults for every known city, persisted immediately
    pub fn reset(&mut self) -> Result<(), StorageError> {
        self.progress = Progress::fresh(self.limits.keys().map(String::as_str));
        self.save()
    }

    #[cfg(test)]
    pub fn storage(&self) -> &S {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample;

    fn load_from(raw: Option<&str>) -> ProgressStore<MemoryStorage> {
        let storage = match raw {
            Some(raw) => MemoryStorage::with_entry(DEFAULT_STORAGE_KEY, raw),
            None => MemoryStorage::default(),
        };
        ProgressStore::load(storage, DEFAULT_STORAGE_KEY, &sample())
    }

    fn defaults() -> Progress {
        Progress::fresh(["kaliningrad", "grodno"])
    }

    #[test]
    fn test_absent_yields_defaults() {
        let store = load_from(None);
        assert_eq!(store.progress(), &defaults());
        assert_eq!(store.progress().city("grodno"), CityProgress::default());
    }

    #[test]
    fn test_corrupted_yields_defaults() {
        for raw in ["{not json", "null", "[1, 2]", "42", ""] {
            let store = load_from(Some(raw));
            assert_eq!(store.progress(), &defaults(), "input {:?}", raw);
        }
    }

    #[test]
    fn test_missing_solved_gets_default() {
        let store = load_from(Some(r#"{"kaliningrad": {"unlockedMaxOrder": 2}}"#));
        let city = store.progress().city("kaliningrad");
        assert_eq!(city.unlocked_max_order, 2);
        assert!(city.solved.is_empty());
        assert_eq!(store.progress().city("grodno"), CityProgress::default());
    }

    #[test]
    fn test_persisted_solved_replaces_default() {
        let store = load_from(Some(
            r#"{"grodno": {"unlockedMaxOrder": 3, "solved": {"g1": true, "g2": false}}}"#,
        ));
        assert!(store.progress().is_solved("grodno", "g1"));
        assert!(!store.progress().is_solved("grodno", "g2"));
    }

    #[test]
    fn test_counter_clamped_to_city_max() {
        let store = load_from(Some(
            r#"{"kaliningrad": {"unlockedMaxOrder": 9}, "grodno": {"unlockedMaxOrder": 0}}"#,
        ));
        assert_eq!(store.progress().unlocked_max_order("kaliningrad"), 3);
        assert_eq!(store.progress().unlocked_max_order("grodno"), 1);
    }

    #[test]
    fn test_unknown_city_preserved() {
        let mut store = load_from(Some(r#"{"minsk": {"unlockedMaxOrder": 4, "solved": {"m1": true}}}"#));
        assert_eq!(store.progress().unlocked_max_order("minsk"), 4);
        store.save().unwrap();
        let raw = store.storage().get(DEFAULT_STORAGE_KEY).unwrap().unwrap();
        assert!(raw.contains("minsk"));
    }

    #[test]
    fn test_unreadable_record_defaults_only_that_city() {
        let store = load_from(Some(
            r#"{"kaliningrad": 7, "grodno": {"unlockedMaxOrder": 2}}"#,
        ));
        assert_eq!(store.progress().city("kaliningrad"), CityProgress::default());
        assert_eq!(store.progress().unlocked_max_order("grodno"), 2);
    }

    #[test]
    fn test_bad_solved_entry_keeps_counter_and_other_entries() {
        let store = load_from(Some(
            r#"{"grodno": {"unlockedMaxOrder": 4, "solved": {"g1": true, "g2": 1, "g3": 0}}}"#,
        ));
        assert_eq!(store.progress().unlocked_max_order("grodno"), 4);
        assert!(store.progress().is_solved("grodno", "g1"));
        assert!(store.progress().is_solved("grodno", "g2"));
        assert!(!store.progress().is_solved("grodno", "g3"));
    }

    #[test]
    fn test_counter_fields_read_independently() {
        let store = load_from(Some(
            r#"{"kaliningrad": {"unlockedMaxOrder": 2.0, "solved": {"k1": true}},
                "grodno": {"unlockedMaxOrder": "three", "solved": {"g1": true}}}"#,
        ));
        assert_eq!(store.progress().unlocked_max_order("kaliningrad"), 2);
        assert!(store.progress().is_solved("kaliningrad", "k1"));
        assert_eq!(store.progress().unlocked_max_order("grodno"), 1);
        assert!(store.progress().is_solved("grodno", "g1"));

        let store = load_from(Some(
            r#"{"grodno": {"unlockedMaxOrder": 2.5, "solved": ["g1"]}}"#,
        ));
        assert_eq!(store.progress().city("grodno"), CityProgress::default());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let mut store = load_from(None);
        let mut progress = store.progress().clone();
        progress.city_mut("kaliningrad").unlocked_max_order = 3;
        progress.city_mut("kaliningrad").solved.insert("k1".into());
        progress.city_mut("kaliningrad").solved.insert("k2".into());
        progress.city_mut("grodno").unlocked_max_order = 2;
        store.commit(progress.clone()).unwrap();

        let raw = store.storage().get(DEFAULT_STORAGE_KEY).unwrap().unwrap();
        let reloaded = load_from(Some(&raw));
        assert_eq!(reloaded.progress(), &progress);
    }

    #[test]
    fn test_wire_format() {
        let mut progress = Progress::fresh(["grodno"]);
        progress.city_mut("grodno").solved.insert("g1".into());
        assert_eq!(
            progress.to_json().unwrap(),
            r#"{"grodno":{"unlockedMaxOrder":1,"solved":{"g1":true}}}"#
        );
    }

    #[test]
    fn test_reset_persists_defaults() {
        let mut store = load_from(Some(
            r#"{"kaliningrad": {"unlockedMaxOrder": 3, "solved": {"k1": true}}, "minsk": {}}"#,
        ));
        store.reset().unwrap();
        assert_eq!(store.progress(), &defaults());
        let raw = store.storage().get(DEFAULT_STORAGE_KEY).unwrap().unwrap();
        assert_eq!(load_from(Some(&raw)).progress(), &defaults());
        assert!(!raw.contains("minsk"));
    }

    #[test]
    fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path().join("nested"));
        assert_eq!(storage.get("k").unwrap(), None);
        storage.set("k", "{\"a\":1}").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("{\"a\":1}"));
        storage.set("k", "{}").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_failed_rename_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory where the document should go makes rename fail
        fs::create_dir_all(dir.path().join("k.json").join("occupied")).unwrap();
        let mut storage = FileStorage::new(dir.path());
        assert!(storage.set("k", "{}").is_err());
        assert!(!dir.path().join(".k.json.tmp").exists());
    }
}
