use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::str::FromStr;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dates::{monday_of, parse_date};
use crate::models::WeekSheet;

const KEY_SEPARATOR: &str = "::";
const DATA_FILE_NAME: &str = "timesheet_data.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode timesheet data: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Identifies one employee's sheet for one week.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SheetKey {
    employee: String,
    week_start: NaiveDate,
}

impl SheetKey {
    pub fn new(employee: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            employee: employee.into(),
            week_start: monday_of(date),
        }
    }

    pub fn employee(&self) -> &str {
        &self.employee
    }

    pub fn week_start(&self) -> NaiveDate {
        self.week_start
    }
}

impl fmt::Display for SheetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{KEY_SEPARATOR}{}",
            self.employee,
            self.week_start.format("%Y-%m-%d")
        )
    }
}

impl FromStr for SheetKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (employee, date) = value
            .rsplit_once(KEY_SEPARATOR)
            .ok_or_else(|| format!("Sheet key {value:?} has no week date."))?;
        if employee.is_empty() {
            return Err(format!("Sheet key {value:?} has no employee."));
        }
        let week_start = parse_date(date)?;
        if monday_of(week_start) != week_start {
            return Err(format!("Sheet key {value:?} does not start on a Monday."));
        }
        Ok(SheetKey::new(employee, week_start))
    }
}

impl Serialize for SheetKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SheetKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

pub type SheetMap = BTreeMap<SheetKey, WeekSheet>;

/// Result of loading the sheet map. A corrupt store still yields a usable
/// (empty) map, with the reason kept in `recovered`.
#[derive(Debug, Default)]
pub struct Loaded {
    pub sheets: SheetMap,
    pub recovered: Option<StoreError>,
}

impl Loaded {
    fn recovered(err: StoreError) -> Self {
        warn!(error = %err, "timesheet data unreadable; starting empty");
        Self {
            sheets: SheetMap::new(),
            recovered: Some(err),
        }
    }
}

pub trait SheetStore {
    fn load(&self) -> Loaded;
    fn save(&self, sheets: &SheetMap) -> Result<(), StoreError>;
}

impl<T: SheetStore + ?Sized> SheetStore for Rc<T> {
    fn load(&self) -> Loaded {
        (**self).load()
    }

    fn save(&self, sheets: &SheetMap) -> Result<(), StoreError> {
        (**self).save(sheets)
    }
}

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

    fn write_error(&self, source: io::Error) -> StoreError {
        StoreError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl SheetStore for JsonFileStore {
    fn load(&self) -> Loaded {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no timesheet data yet");
                return Loaded::default();
            }
            Err(source) => {
                return Loaded::recovered(StoreError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        match decode(&contents) {
            Ok(sheets) => {
                info!(path = %self.path.display(), sheets = sheets.len(), "loaded timesheet data");
                Loaded {
                    sheets,
                    recovered: None,
                }
            }
            Err(source) => Loaded::recovered(StoreError::Parse {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Writes to a sibling temp file and renames it over the target.
    fn save(&self, sheets: &SheetMap) -> Result<(), StoreError> {
        let json = encode(sheets)?;
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|err| self.write_error(err))?;

        let mut file = NamedTempFile::new_in(parent).map_err(|err| self.write_error(err))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.as_file().sync_all())
            .map_err(|err| self.write_error(err))?;
        file.persist(&self.path)
            .map_err(|err| self.write_error(err.error))?;

        debug!(path = %self.path.display(), sheets = sheets.len(), "saved timesheet data");
        Ok(())
    }
}

/// Keeps the encoded form in memory. Used by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    contents: RefCell<Option<String>>,
    fail_writes: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: RefCell::new(Some(contents.into())),
            fail_writes: Cell::new(false),
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.borrow().clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }
}

impl SheetStore for MemoryStore {
    fn load(&self) -> Loaded {
        let Some(contents) = self.contents.borrow().clone() else {
            return Loaded::default();
        };
        match decode(&contents) {
            Ok(sheets) => Loaded {
                sheets,
                recovered: None,
            },
            Err(source) => Loaded::recovered(StoreError::Parse {
                path: PathBuf::from("<memory>"),
                source,
            }),
        }
    }

    fn save(&self, sheets: &SheetMap) -> Result<(), StoreError> {
        if self.fail_writes.get() {
            return Err(StoreError::Write {
                path: PathBuf::from("<memory>"),
                source: io::Error::new(io::ErrorKind::Other, "writes disabled"),
            });
        }
        *self.contents.borrow_mut() = Some(encode(sheets)?);
        Ok(())
    }
}

fn decode(contents: &str) -> Result<SheetMap, serde_json::Error> {
    if contents.trim().is_empty() {
        return Ok(SheetMap::new());
    }
    serde_json::from_str(contents)
}

fn encode(sheets: &SheetMap) -> Result<String, StoreError> {
    serde_json::to_string_pretty(sheets).map_err(StoreError::Encode)
}

pub fn default_data_path() -> PathBuf {
    match dirs::data_dir() {
        Some(mut path) => {
            path.push("timesheet");
            path.push(DATA_FILE_NAME);
            path
        }
        None => PathBuf::from(DATA_FILE_NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::parse_timestamp;
    use assert_matches::assert_matches;
    use chrono::Weekday;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    fn sample_map() -> SheetMap {
        let mut sheet = WeekSheet::new();
        let index = sheet.add_entry("Curriculum Development", "Presentation (PPT) Preparation");
        let entry = sheet.entry_mut(index).unwrap();
        entry
            .day_mut(Weekday::Mon)
            .add_session(
                parse_timestamp("2024-06-03T09:00:00").unwrap(),
                parse_timestamp("2024-06-03T10:15:00").unwrap(),
            )
            .unwrap();
        entry.day_mut(Weekday::Tue).set_notes("deck review");
        sheet.add_entry("Meeting", "Meeting");

        let mut map = SheetMap::new();
        map.insert(SheetKey::new("A", monday()), sheet);
        map.insert(SheetKey::new("B", monday()), WeekSheet::new());
        map
    }

    #[test]
    fn sheet_key_is_stable() {
        let key = SheetKey::new("Ritu Das", NaiveDate::from_ymd_opt(2024, 6, 6).unwrap());
        assert_eq!(key.to_string(), "Ritu Das::2024-06-03");
        assert_eq!(key.week_start(), monday());
    }

    #[test]
    fn sheet_key_parses_on_last_separator() {
        let key: SheetKey = "team::lead::2024-06-03".parse().unwrap();
        assert_eq!(key.employee(), "team::lead");
        assert_eq!(key.week_start(), monday());
        assert!("no-separator".parse::<SheetKey>().is_err());
        assert!("::2024-06-03".parse::<SheetKey>().is_err());
        assert!("A::June".parse::<SheetKey>().is_err());
    }

    #[test]
    fn sheet_key_rejects_mid_week_dates() {
        assert!("A::2024-06-04".parse::<SheetKey>().is_err());
        assert!("A::2024-06-09".parse::<SheetKey>().is_err());
    }

    #[test]
    fn mid_week_keys_fail_the_load_visibly() {
        let raw = r#"{"A::2024-06-04": [{"task": "One"}], "A::2024-06-05": [{"task": "Two"}]}"#;
        let loaded = MemoryStore::with_contents(raw).load();
        assert!(loaded.sheets.is_empty());
        assert_matches!(loaded.recovered, Some(StoreError::Parse { .. }));
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join(DATA_FILE_NAME));
        let map = sample_map();

        store.save(&map).unwrap();
        let loaded = store.load();

        assert!(loaded.recovered.is_none());
        assert_eq!(loaded.sheets, map);
    }

    #[test]
    fn file_store_writes_expected_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join(DATA_FILE_NAME));
        store.save(&sample_map()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        let entry = &raw["A::2024-06-03"][0];
        assert_eq!(entry["task"], "Curriculum Development");
        assert_eq!(entry["days"].as_array().unwrap().len(), 7);
        assert_eq!(
            entry["days"][0]["sessions"][0],
            serde_json::json!(["2024-06-03T09:00:00", "2024-06-03T10:15:00"])
        );
        assert_eq!(entry["days"][1]["notes"], "deck review");
        assert_eq!(raw["B::2024-06-03"], serde_json::json!([]));
    }

    #[test]
    fn file_store_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join(DATA_FILE_NAME));
        store.save(&sample_map()).unwrap();
        store.save(&SheetMap::new()).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(DATA_FILE_NAME)]);
    }

    #[test]
    fn missing_file_loads_empty_without_warning() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = JsonFileStore::new(dir.path().join("absent.json")).load();
        assert!(loaded.sheets.is_empty());
        assert!(loaded.recovered.is_none());
    }

    #[test]
    fn corrupt_file_recovers_empty_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DATA_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();

        let loaded = JsonFileStore::new(&path).load();

        assert!(loaded.sheets.is_empty());
        assert_matches!(loaded.recovered, Some(StoreError::Parse { .. }));
    }

    #[test]
    fn reference_layout_without_running_start_loads() {
        let raw = r#"{
            "A::2024-06-03": [
                {"task": "Meeting", "subtask": "Meeting",
                 "days": [{"sessions": [["2024-06-03T09:00:00.500000", "2024-06-03T09:30:00"]], "notes": "sync"}]},
                {"task": "Adhoc", "subtask": "Others (Please fill the comment)"}
            ]
        }"#;
        let loaded = MemoryStore::with_contents(raw).load();
        assert!(loaded.recovered.is_none());
        let sheet = &loaded.sheets[&SheetKey::new("A", monday())];
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet.entry(0).unwrap().day(Weekday::Mon).notes(), "sync");
        assert_eq!(sheet.entry(1).unwrap().days().len(), 7);
    }

    #[test]
    fn memory_store_can_fail_writes() {
        let store = MemoryStore::new();
        store.fail_writes(true);
        assert_matches!(store.save(&sample_map()), Err(StoreError::Write { .. }));
        assert!(store.contents().is_none());

        store.fail_writes(false);
        store.save(&sample_map()).unwrap();
        assert_eq!(store.load().sheets, sample_map());
    }
}
