use chrono::{NaiveDateTime, Weekday};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::dates::{self, day_index, format_timestamp, hours_between, parse_timestamp};

pub const DAYS_PER_WEEK: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DayError {
    #[error("end {end} must be after start {start}")]
    InvalidInterval {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    #[error("a timer is already running for this day")]
    AlreadyRunning,
    #[error("no timer is running for this day")]
    NotRunning,
}

/// A closed interval of recorded work. `end` is always after `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(String, String)", into = "(String, String)")]
pub struct Session {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl Session {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, DayError> {
        if end <= start {
            return Err(DayError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn hours(&self) -> f64 {
        hours_between(self.start, self.end)
    }
}

impl TryFrom<(String, String)> for Session {
    type Error = String;

    fn try_from((start, end): (String, String)) -> Result<Self, Self::Error> {
        let start = parse_timestamp(&start)?;
        let end = parse_timestamp(&end)?;
        Session::new(start, end).map_err(|err| err.to_string())
    }
}

impl From<Session> for (String, String) {
    fn from(session: Session) -> Self {
        (format_timestamp(session.start), format_timestamp(session.end))
    }
}

/// Sessions, notes and the optional open timer for one task on one weekday.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayRecord {
    #[serde(default)]
    sessions: Vec<Session>,
    #[serde(default)]
    notes: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "dates::optional_timestamp"
    )]
    running_start: Option<NaiveDateTime>,
}

impl DayRecord {
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.notes = notes.into();
    }

    pub fn running_start(&self) -> Option<NaiveDateTime> {
        self.running_start
    }

    pub fn is_running(&self) -> bool {
        self.running_start.is_some()
    }

    pub fn add_session(
        &mut self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Session, DayError> {
        let session = Session::new(start, end)?;
        self.sessions.push(session);
        Ok(session)
    }

    pub fn start_running(&mut self, at: NaiveDateTime) -> Result<(), DayError> {
        if self.running_start.is_some() {
            return Err(DayError::AlreadyRunning);
        }
        self.running_start = Some(at);
        Ok(())
    }

    /// Closes the open timer into a session. On error the timer keeps running.
    pub fn stop_running(&mut self, at: NaiveDateTime) -> Result<Session, DayError> {
        let start = self.running_start.ok_or(DayError::NotRunning)?;
        let session = Session::new(start, at)?;
        self.sessions.push(session);
        self.running_start = None;
        Ok(session)
    }

    pub(crate) fn discard_running(&mut self) -> Option<NaiveDateTime> {
        self.running_start.take()
    }

    pub fn total_hours(&self, now: NaiveDateTime) -> f64 {
        let closed: f64 = self.sessions.iter().map(Session::hours).sum();
        let open = self
            .running_start
            .map(|start| hours_between(start, now))
            .unwrap_or(0.0);
        closed + open
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEntry {
    #[serde(rename = "task")]
    task_name: String,
    #[serde(rename = "subtask", default)]
    subtask_name: String,
    #[serde(default, deserialize_with = "deserialize_days")]
    days: [DayRecord; DAYS_PER_WEEK],
}

impl TaskEntry {
    pub fn new(task_name: impl Into<String>, subtask_name: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            subtask_name: subtask_name.into(),
            days: Default::default(),
        }
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn subtask_name(&self) -> &str {
        &self.subtask_name
    }

    pub fn days(&self) -> &[DayRecord; DAYS_PER_WEEK] {
        &self.days
    }

    pub fn day(&self, weekday: Weekday) -> &DayRecord {
        &self.days[day_index(weekday)]
    }

    pub fn day_mut(&mut self, weekday: Weekday) -> &mut DayRecord {
        &mut self.days[day_index(weekday)]
    }

    pub fn total_hours(&self, now: NaiveDateTime) -> f64 {
        self.days.iter().map(|day| day.total_hours(now)).sum()
    }
}

fn deserialize_days<'de, D>(deserializer: D) -> Result<[DayRecord; DAYS_PER_WEEK], D::Error>
where
    D: Deserializer<'de>,
{
    let mut days = Vec::<DayRecord>::deserialize(deserializer)?;
    if days.len() > DAYS_PER_WEEK {
        return Err(D::Error::custom(format!(
            "expected at most {DAYS_PER_WEEK} days, found {}",
            days.len()
        )));
    }
    days.resize_with(DAYS_PER_WEEK, DayRecord::default);
    days.try_into()
        .map_err(|_| D::Error::custom("day list has the wrong length"))
}

/// All task entries of one employee for one Monday-start week.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekSheet {
    entries: Vec<TaskEntry>,
}

impl WeekSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TaskEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&TaskEntry> {
        self.entries.get(index)
    }

    pub fn entry_mut(&mut self, index: usize) -> Option<&mut TaskEntry> {
        self.entries.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add_entry(
        &mut self,
        task_name: impl Into<String>,
        subtask_name: impl Into<String>,
    ) -> usize {
        self.entries.push(TaskEntry::new(task_name, subtask_name));
        self.entries.len() - 1
    }

    pub fn remove_entry(&mut self, index: usize) -> Option<TaskEntry> {
        if index < self.entries.len() {
            Some(self.entries.remove(index))
        } else {
            None
        }
    }

    pub fn daily_total(&self, weekday: Weekday, now: NaiveDateTime) -> f64 {
        self.entries
            .iter()
            .map(|entry| entry.day(weekday).total_hours(now))
            .sum()
    }

    pub fn weekly_total(&self, now: NaiveDateTime) -> f64 {
        self.entries.iter().map(|entry| entry.total_hours(now)).sum()
    }
}
