use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use tracing::warn;

use crate::error::StoreError;
use crate::model::{Decisions, Solution};

pub const DEFAULT_STORE_FILE: &str = "decisions.json";

/// How the last `load` went. Every variant other than `Loaded` yields an
/// empty mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    Missing,
    Empty,
    Unreadable(String),
    Corrupt(String),
}

impl LoadStatus {
    /// Message for the user when the store could not be used as-is.
    pub fn warning(&self) -> Option<String> {
        match self {
            LoadStatus::Unreadable(reason) => Some(format!(
                "could not read saved decisions ({reason}); starting empty"
            )),
            LoadStatus::Corrupt(reason) => Some(format!(
                "saved decisions are corrupted ({reason}); starting empty"
            )),
            _ => None,
        }
    }
}

pub struct Loaded {
    pub decisions: Decisions,
    pub status: LoadStatus,
}

impl Loaded {
    fn empty(status: LoadStatus) -> Self {
        Self {
            decisions: Decisions::new(),
            status,
        }
    }
}

/// Durable home of the decisions mapping.
pub trait Store {
    /// Never fails: problems are reported through [`LoadStatus`].
    fn load(&self) -> Loaded;

    fn save(&self, decisions: &Decisions) -> Result<(), StoreError>;
}

/// Pretty-printed JSON file, written atomically through a sibling temp file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_STORE_FILE.to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Default for JsonFileStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_FILE)
    }
}

impl Store for JsonFileStore {
    fn load(&self) -> Loaded {
        match fs::read(&self.path) {
            Ok(bytes) => decode_document(&bytes),
            Err(err) if err.kind() == IoErrorKind::NotFound => Loaded::empty(LoadStatus::Missing),
            Err(err) => Loaded::empty(LoadStatus::Unreadable(err.to_string())),
        }
    }

    fn save(&self, decisions: &Decisions) -> Result<(), StoreError> {
        let bytes = encode_document(decisions)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }
        let temp = self.temp_path();
        fs::write(&temp, &bytes).map_err(|err| self.io_error(err))?;
        if let Err(err) = fs::rename(&temp, &self.path) {
            let _ = fs::remove_file(&temp);
            return Err(self.io_error(err));
        }
        Ok(())
    }
}

/// In-process store holding the encoded document, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<Option<Vec<u8>>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            document: Mutex::new(Some(bytes.into())),
            ..Self::default()
        }
    }

    pub fn with_decisions(decisions: &Decisions) -> Result<Self, StoreError> {
        Ok(Self::with_document(encode_document(decisions)?))
    }

    /// Bytes of the last successful save (or the seeded document).
    pub fn document(&self) -> Option<Vec<u8>> {
        self.document.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }

    /// Makes every following `save` fail, to exercise persistence errors.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::Relaxed);
    }
}

impl Store for MemoryStore {
    fn load(&self) -> Loaded {
        match self.document.lock().as_deref() {
            Some(bytes) => decode_document(bytes),
            None => Loaded::empty(LoadStatus::Missing),
        }
    }

    fn save(&self, decisions: &Decisions) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("saves disabled".to_string()));
        }
        let bytes = encode_document(decisions)?;
        *self.document.lock() = Some(bytes);
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Encodes the mapping with the 4-space indentation the file has always used.
pub fn encode_document(decisions: &Decisions) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::with_capacity(256);
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut bytes, PrettyFormatter::with_indent(b"    "));
    decisions.serialize(&mut serializer)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decodes a stored document. The top level must be an object; individual
/// problems or records that cannot be understood are skipped with a warning
/// rather than discarding the whole file.
pub fn decode_document(bytes: &[u8]) -> Loaded {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Loaded::empty(LoadStatus::Empty);
    }
    let root: Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(err) => return Loaded::empty(LoadStatus::Corrupt(err.to_string())),
    };
    let problems = match root {
        Value::Object(problems) => problems,
        other => {
            return Loaded::empty(LoadStatus::Corrupt(format!(
                "expected an object of problems, found {}",
                json_type(&other)
            )));
        }
    };

    let mut decisions = Decisions::new();
    for (problem, records) in problems {
        if problem.trim().is_empty() {
            warn!("skipping problem with an empty name");
            continue;
        }
        let records = match records {
            Value::Array(records) => records,
            other => {
                warn!(%problem, found = json_type(&other), "skipping problem without a solution list");
                continue;
            }
        };
        let mut solutions: Vec<Solution> = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_value::<Solution>(record) {
                Ok(solution) if solution.text().is_empty() => {
                    warn!(%problem, "skipping solution with empty text");
                }
                Ok(solution) if solutions.iter().any(|s| s.text() == solution.text()) => {
                    warn!(%problem, solution = solution.text(), "skipping duplicate solution");
                }
                Ok(solution) => solutions.push(solution),
                Err(err) => warn!(%problem, error = %err, "skipping unreadable solution record"),
            }
        }
        decisions.insert(problem, solutions);
    }
    Loaded {
        decisions,
        status: LoadStatus::Loaded,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Decisions {
        let mut decisions = Decisions::new();
        decisions.insert(
            "lunch".to_string(),
            vec![Solution::new("pizza").with_ranking(1), Solution::new("salad")],
        );
        decisions
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("decisions.json"));
        let loaded = store.load();
        assert_eq!(loaded.status, LoadStatus::Missing);
        assert!(loaded.decisions.is_empty());
        assert!(loaded.status.warning().is_none());
    }

    #[test]
    fn blank_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.json");
        fs::write(&path, "  \n").unwrap();
        let loaded = JsonFileStore::new(&path).load();
        assert_eq!(loaded.status, LoadStatus::Empty);
        assert!(loaded.decisions.is_empty());
    }

    #[test]
    fn corrupt_file_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.json");
        fs::write(&path, "{\"lunch\": [").unwrap();
        let loaded = JsonFileStore::new(&path).load();
        assert!(matches!(loaded.status, LoadStatus::Corrupt(_)));
        assert!(loaded.decisions.is_empty());
        assert!(loaded.status.warning().unwrap().contains("corrupted"));
    }

    #[test]
    fn non_object_document_is_corrupt() {
        let loaded = decode_document(b"[\"pizza\"]");
        match loaded.status {
            LoadStatus::Corrupt(reason) => assert!(reason.contains("a list")),
            other => panic!("unexpected status {other:?}"),
        }
        assert!(loaded.decisions.is_empty());
    }

    #[test]
    fn save_then_load_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("decisions.json"));
        store.save(&sample()).unwrap();
        let loaded = store.load();
        assert_eq!(loaded.status, LoadStatus::Loaded);
        assert_eq!(loaded.decisions, sample());
        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("\n    \"lunch\": ["));
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn bad_records_are_skipped_individually() {
        let document = br#"{
            "lunch": [
                {"solutions": "pizza", "history": 2},
                {"solutions": "pizza", "history": 9},
                {"solutions": ""},
                {"ranking": 1},
                "soup"
            ],
            "dinner": "tacos",
            "": []
        }"#;
        let loaded = decode_document(document);
        assert_eq!(loaded.status, LoadStatus::Loaded);
        assert_eq!(loaded.decisions.len(), 1);
        let lunch = &loaded.decisions["lunch"];
        assert_eq!(lunch.len(), 1);
        assert_eq!(lunch[0].history(), 2);
    }

    #[test]
    fn memory_store_can_fail_saves() {
        let store = MemoryStore::new();
        store.save(&sample()).unwrap();
        assert_eq!(store.save_count(), 1);
        store.fail_saves(true);
        assert!(store.save(&Decisions::new()).is_err());
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.load().decisions, sample());
    }
}
