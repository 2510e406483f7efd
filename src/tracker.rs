use chrono::{Duration, NaiveDate, NaiveDateTime, Weekday};
use thiserror::Error;
use tracing::{error, info};

use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::dates::monday_of;
use crate::models::{DayError, Session, WeekSheet};
use crate::rollups::Rollup;
use crate::storage::{SheetKey, SheetMap, SheetStore, StoreError};
use crate::timer::{Stopped, TickReport, TimerController, TimerError};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("select an employee first")]
    NoEmployee,
    #[error("unknown employee {0:?}")]
    UnknownEmployee(String),
    #[error("please enter or select a task")]
    EmptyTaskName,
    #[error("task {0} does not exist")]
    UnknownEntry(usize),
    #[error("stop the running timer before deleting task {0}")]
    EntryRunning(usize),
    #[error("stop the running timer first")]
    TimerActive,
    #[error("timers only run in the current week (viewing {viewing}, current week starts {current})")]
    WrongWeek { viewing: NaiveDate, current: NaiveDate },
    #[error(transparent)]
    Timer(#[from] TimerError),
    #[error(transparent)]
    Day(#[from] DayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TrackerError {
    /// Whether the user can fix this by choosing a different action.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, TrackerError::Store(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    Started { entry: usize, weekday: Weekday },
    Stopped(Stopped),
}

/// Selected employee and week, the loaded sheets, and the timer for the
/// sheet in view. Every mutation is written through the store.
pub struct Tracker<S: SheetStore, C: Clock> {
    catalog: Catalog,
    store: S,
    clock: C,
    sheets: SheetMap,
    employee: Option<String>,
    week_start: NaiveDate,
    timer: TimerController,
    load_warning: Option<StoreError>,
}

impl<S: SheetStore, C: Clock> Tracker<S, C> {
    pub fn open(catalog: Catalog, store: S, clock: C) -> Self {
        let loaded = store.load();
        let week_start = monday_of(clock.now().date());
        Self {
            catalog,
            store,
            clock,
            sheets: loaded.sheets,
            employee: None,
            week_start,
            timer: TimerController::new(),
            load_warning: loaded.recovered,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn load_warning(&self) -> Option<&StoreError> {
        self.load_warning.as_ref()
    }

    pub fn take_load_warning(&mut self) -> Option<StoreError> {
        self.load_warning.take()
    }

    pub fn employee(&self) -> Option<&str> {
        self.employee.as_deref()
    }

    pub fn department(&self) -> Option<&str> {
        self.employee
            .as_deref()
            .and_then(|employee| self.catalog.department_of(employee))
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.department()
            .map(|department| self.catalog.task_names(department))
            .unwrap_or_default()
    }

    pub fn subtask_names(&self, task: &str) -> &[String] {
        match self.department() {
            Some(department) => self.catalog.subtask_names(department, task),
            None => &[],
        }
    }

    pub fn week_start(&self) -> NaiveDate {
        self.week_start
    }

    pub fn timer(&self) -> &TimerController {
        &self.timer
    }

    pub fn sheet(&self) -> Option<&WeekSheet> {
        let employee = self.employee.as_deref()?;
        self.sheets.get(&SheetKey::new(employee, self.week_start))
    }

    pub fn select_employee(&mut self, employee: &str) -> Result<(), TrackerError> {
        self.ensure_idle()?;
        if !self.catalog.contains_employee(employee) {
            return Err(TrackerError::UnknownEmployee(employee.to_string()));
        }
        self.employee = Some(employee.to_string());
        self.open_sheet();
        info!(employee, week = %self.week_start, "employee selected");
        Ok(())
    }

    pub fn select_week(&mut self, date: NaiveDate) -> Result<(), TrackerError> {
        self.ensure_idle()?;
        self.week_start = monday_of(date);
        if self.employee.is_some() {
            self.open_sheet();
        }
        info!(week = %self.week_start, "week selected");
        Ok(())
    }

    pub fn shift_week(&mut self, weeks: i64) -> Result<(), TrackerError> {
        self.select_week(self.week_start + Duration::weeks(weeks))
    }

    pub fn current_week(&mut self) -> Result<(), TrackerError> {
        let today = self.clock.now().date();
        self.select_week(today)
    }

    pub fn add_task(&mut self, task: &str, subtask: &str) -> Result<usize, TrackerError> {
        let task = task.trim();
        let subtask = subtask.trim();
        if task.is_empty() {
            return Err(TrackerError::EmptyTaskName);
        }
        let index = self.sheet_mut()?.add_entry(task, subtask);
        info!(task, subtask, index, "task added");
        self.persist()?;
        Ok(index)
    }

    pub fn delete_task(&mut self, index: usize) -> Result<(), TrackerError> {
        if let Some((entry, _)) = self.timer.active() {
            if entry == index {
                return Err(TrackerError::EntryRunning(index));
            }
        }
        let removed = self
            .sheet_mut()?
            .remove_entry(index)
            .ok_or(TrackerError::UnknownEntry(index))?;
        self.timer.entry_removed(index);
        info!(task = removed.task_name(), index, "task deleted");
        self.persist()
    }

    pub fn start_timer(&mut self, entry: usize, weekday: Weekday) -> Result<(), TrackerError> {
        let now = self.clock.now();
        let key = self.key()?;
        let current = monday_of(now.date());
        if self.week_start != current {
            return Err(TrackerError::WrongWeek {
                viewing: self.week_start,
                current,
            });
        }
        let sheet = self.sheets.entry(key).or_default();
        self.timer.start(sheet, entry, weekday, now)?;
        self.persist()
    }

    pub fn stop_timer(&mut self) -> Result<Stopped, TrackerError> {
        let now = self.clock.now();
        let key = self.key()?;
        let sheet = self.sheets.entry(key).or_default();
        let stopped = self.timer.stop(sheet, now)?;
        self.persist()?;
        Ok(stopped)
    }

    /// Stops the timer if it runs on this cell, otherwise starts it there.
    pub fn toggle_timer(
        &mut self,
        entry: usize,
        weekday: Weekday,
    ) -> Result<TimerAction, TrackerError> {
        if self.timer.active() == Some((entry, weekday)) {
            return self.stop_timer().map(TimerAction::Stopped);
        }
        self.start_timer(entry, weekday)?;
        Ok(TimerAction::Started { entry, weekday })
    }

    pub fn add_session(
        &mut self,
        entry: usize,
        weekday: Weekday,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Session, TrackerError> {
        let task = self
            .sheet_mut()?
            .entry_mut(entry)
            .ok_or(TrackerError::UnknownEntry(entry))?;
        let session = task.day_mut(weekday).add_session(start, end)?;
        info!(entry, %weekday, hours = session.hours(), "session added");
        self.persist()?;
        Ok(session)
    }

    pub fn set_notes(
        &mut self,
        entry: usize,
        weekday: Weekday,
        notes: &str,
    ) -> Result<(), TrackerError> {
        let task = self
            .sheet_mut()?
            .entry_mut(entry)
            .ok_or(TrackerError::UnknownEntry(entry))?;
        task.day_mut(weekday).set_notes(notes);
        self.persist()
    }

    pub fn tick(&self) -> Option<TickReport> {
        let now = self.clock.now();
        self.timer.tick(self.sheet()?, now)
    }

    pub fn rollup(&self) -> Rollup {
        let now = self.clock.now();
        match self.sheet() {
            Some(sheet) => Rollup::build(sheet, now),
            None => Rollup::build(&WeekSheet::new(), now),
        }
    }

    fn ensure_idle(&self) -> Result<(), TrackerError> {
        if self.timer.is_running() {
            return Err(TrackerError::TimerActive);
        }
        Ok(())
    }

    fn key(&self) -> Result<SheetKey, TrackerError> {
        let employee = self.employee.as_deref().ok_or(TrackerError::NoEmployee)?;
        Ok(SheetKey::new(employee, self.week_start))
    }

    fn sheet_mut(&mut self) -> Result<&mut WeekSheet, TrackerError> {
        let key = self.key()?;
        Ok(self.sheets.entry(key).or_default())
    }

    fn open_sheet(&mut self) {
        let Ok(key) = self.key() else {
            return;
        };
        let sheet = self.sheets.entry(key).or_default();
        self.timer = TimerController::resume(sheet);
    }

    /// Failed writes keep the in-memory change; the next successful save
    /// carries it.
    fn persist(&self) -> Result<(), TrackerError> {
        self.store.save(&self.sheets).map_err(|err| {
            error!(error = %err, "failed to save timesheet data");
            TrackerError::Store(err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::dates::parse_timestamp;
    use crate::storage::MemoryStore;
    use assert_matches::assert_matches;
    use std::rc::Rc;

    fn at(value: &str) -> NaiveDateTime {
        parse_timestamp(value).unwrap()
    }

    fn tracker_at(now: &str) -> (Tracker<Rc<MemoryStore>, FixedClock>, Rc<MemoryStore>, FixedClock) {
        let store = Rc::new(MemoryStore::new());
        let clock = FixedClock::new(at(now));
        let tracker = Tracker::open(Catalog::builtin().unwrap(), Rc::clone(&store), clock.clone());
        (tracker, store, clock)
    }

    #[test]
    fn mutations_require_an_employee() {
        let (mut tracker, _, _) = tracker_at("2024-06-03T09:00:00");
        assert_matches!(tracker.add_task("Meeting", "Meeting"), Err(TrackerError::NoEmployee));
        assert_matches!(
            tracker.start_timer(0, Weekday::Mon),
            Err(TrackerError::NoEmployee)
        );
        assert!(tracker.sheet().is_none());
        assert_eq!(tracker.rollup().weekly_hours, 0.0);
    }

    #[test]
    fn unknown_employee_is_rejected() {
        let (mut tracker, _, _) = tracker_at("2024-06-03T09:00:00");
        assert_matches!(
            tracker.select_employee("Nobody"),
            Err(TrackerError::UnknownEmployee(_))
        );
        assert_eq!(tracker.employee(), None);
    }

    #[test]
    fn catalog_cascade_follows_department() {
        let (mut tracker, _, _) = tracker_at("2024-06-03T09:00:00");
        assert!(tracker.task_names().is_empty());
        tracker.select_employee("Ayos Ghosh").unwrap();
        assert_eq!(tracker.department(), Some("Operation"));
        assert!(tracker.task_names().is_empty());

        tracker.select_employee("Dipangsu Mukherjee").unwrap();
        assert_eq!(tracker.department(), Some("Technical"));
        assert!(tracker.task_names().contains(&"Curriculum Development"));
        assert_eq!(tracker.subtask_names("Meeting"), ["Meeting"]);
        assert!(tracker.subtask_names("Lead Management").is_empty());
    }

    #[test]
    fn blank_task_is_rejected() {
        let (mut tracker, store, _) = tracker_at("2024-06-03T09:00:00");
        tracker.select_employee("Ritu Das").unwrap();
        assert_matches!(tracker.add_task("   ", "x"), Err(TrackerError::EmptyTaskName));
        assert!(store.contents().is_none());
    }

    #[test]
    fn add_task_trims_and_persists() {
        let (mut tracker, store, _) = tracker_at("2024-06-03T09:00:00");
        tracker.select_employee("Ritu Das").unwrap();
        let index = tracker.add_task("  Custom work ", " notes ").unwrap();

        assert_eq!(index, 0);
        let entry = tracker.sheet().unwrap().entry(0).unwrap();
        assert_eq!(entry.task_name(), "Custom work");
        assert_eq!(entry.subtask_name(), "notes");
        assert!(store.contents().unwrap().contains("Ritu Das::2024-06-03"));
    }

    #[test]
    fn delete_task_shifts_running_timer() {
        let (mut tracker, _, _) = tracker_at("2024-06-03T09:00:00");
        tracker.select_employee("Ritu Das").unwrap();
        tracker.add_task("Meeting", "Meeting").unwrap();
        tracker.add_task("Adhoc", "Others").unwrap();
        tracker.start_timer(1, Weekday::Mon).unwrap();

        assert_matches!(tracker.delete_task(1), Err(TrackerError::EntryRunning(1)));
        assert_matches!(tracker.delete_task(5), Err(TrackerError::UnknownEntry(5)));
        tracker.delete_task(0).unwrap();

        assert_eq!(tracker.timer().active(), Some((0, Weekday::Mon)));
        assert_eq!(tracker.sheet().unwrap().entry(0).unwrap().task_name(), "Adhoc");
    }

    #[test]
    fn switching_while_running_is_rejected() {
        let (mut tracker, _, _) = tracker_at("2024-06-03T09:00:00");
        tracker.select_employee("Ritu Das").unwrap();
        tracker.add_task("Meeting", "Meeting").unwrap();
        tracker.start_timer(0, Weekday::Mon).unwrap();

        assert_matches!(tracker.select_employee("Romit Roy"), Err(TrackerError::TimerActive));
        assert_matches!(tracker.shift_week(1), Err(TrackerError::TimerActive));
        assert_eq!(tracker.employee(), Some("Ritu Das"));
    }

    #[test]
    fn toggle_starts_then_stops_same_cell() {
        let (mut tracker, _, clock) = tracker_at("2024-06-03T09:00:00");
        tracker.select_employee("Ritu Das").unwrap();
        tracker.add_task("Meeting", "Meeting").unwrap();

        let started = tracker.toggle_timer(0, Weekday::Mon).unwrap();
        assert_eq!(
            started,
            TimerAction::Started {
                entry: 0,
                weekday: Weekday::Mon
            }
        );
        clock.advance(Duration::minutes(45));
        let stopped = tracker.toggle_timer(0, Weekday::Mon).unwrap();
        assert_matches!(stopped, TimerAction::Stopped(Stopped { entry: 0, .. }));
        assert!(!tracker.timer().is_running());
        assert!((tracker.rollup().weekly_hours - 0.75).abs() < 1e-9);
    }

    #[test]
    fn write_failure_surfaces_and_keeps_memory_state() {
        let (mut tracker, store, _) = tracker_at("2024-06-03T09:00:00");
        tracker.select_employee("Ritu Das").unwrap();
        store.fail_writes(true);

        let result = tracker.add_task("Meeting", "Meeting");

        assert_matches!(result, Err(TrackerError::Store(StoreError::Write { .. })));
        assert!(!result.unwrap_err().is_user_error());
        assert_eq!(tracker.sheet().unwrap().len(), 1);

        store.fail_writes(false);
        tracker.add_task("Adhoc", "Others").unwrap();
        let reloaded = store.load();
        let key = SheetKey::new("Ritu Das", tracker.week_start());
        assert_eq!(reloaded.sheets[&key].len(), 2);
    }

    #[test]
    fn running_timer_resumes_after_reopen() {
        let (mut tracker, store, clock) = tracker_at("2024-06-03T09:00:00");
        tracker.select_employee("Ritu Das").unwrap();
        tracker.add_task("Meeting", "Meeting").unwrap();
        tracker.start_timer(0, Weekday::Mon).unwrap();
        drop(tracker);

        clock.set(at("2024-06-03T11:00:00"));
        let mut reopened = Tracker::open(Catalog::builtin().unwrap(), Rc::clone(&store), clock.clone());
        reopened.select_employee("Ritu Das").unwrap();

        assert_eq!(reopened.timer().active(), Some((0, Weekday::Mon)));
        let report = reopened.tick().unwrap();
        assert!((report.day_hours - 2.0).abs() < 1e-9);
        let stopped = reopened.stop_timer().unwrap();
        assert_eq!(stopped.session.start(), at("2024-06-03T09:00:00"));
    }

    #[test]
    fn corrupt_store_is_reported_once() {
        let store = MemoryStore::with_contents("[1, 2");
        let clock = FixedClock::new(at("2024-06-03T09:00:00"));
        let mut tracker = Tracker::open(Catalog::builtin().unwrap(), store, clock);

        assert_matches!(tracker.load_warning(), Some(StoreError::Parse { .. }));
        assert!(tracker.take_load_warning().is_some());
        assert!(tracker.load_warning().is_none());
        tracker.select_employee("Ritu Das").unwrap();
        assert!(tracker.sheet().unwrap().is_empty());
    }

    #[test]
    fn notes_and_manual_sessions_persist() {
        let (mut tracker, store, _) = tracker_at("2024-06-05T17:00:00");
        tracker.select_employee("Ritu Das").unwrap();
        tracker.add_task("Meeting", "Meeting").unwrap();
        tracker.set_notes(0, Weekday::Mon, "kickoff").unwrap();
        tracker
            .add_session(0, Weekday::Mon, at("2024-06-03T14:00:00"), at("2024-06-03T15:30:00"))
            .unwrap();
        assert_matches!(
            tracker.add_session(0, Weekday::Mon, at("2024-06-03T15:30:00"), at("2024-06-03T15:30:00")),
            Err(TrackerError::Day(DayError::InvalidInterval { .. }))
        );
        assert_matches!(
            tracker.set_notes(3, Weekday::Mon, "x"),
            Err(TrackerError::UnknownEntry(3))
        );

        let key = SheetKey::new("Ritu Das", tracker.week_start());
        let loaded = store.load();
        let sheet = &loaded.sheets[&key];
        let monday = sheet.entry(0).unwrap().day(Weekday::Mon);
        assert_eq!(monday.notes(), "kickoff");
        assert_eq!(monday.sessions().len(), 1);
    }

    #[test]
    fn timer_cannot_start_in_another_week() {
        let (mut tracker, _, _) = tracker_at("2024-06-05T09:00:00");
        tracker.select_employee("Ritu Das").unwrap();

        for weeks in [-1, 2] {
            tracker.current_week().unwrap();
            tracker.shift_week(weeks).unwrap();
            tracker.add_task("Meeting", "Meeting").unwrap();

            assert_matches!(
                tracker.start_timer(0, Weekday::Wed),
                Err(TrackerError::WrongWeek { current, .. })
                    if current == NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
            );
            assert!(!tracker.timer().is_running());
            assert!(!tracker.sheet().unwrap().entry(0).unwrap().day(Weekday::Wed).is_running());
        }

        tracker.current_week().unwrap();
        tracker.add_task("Meeting", "Meeting").unwrap();
        tracker.start_timer(0, Weekday::Wed).unwrap();
    }

    #[test]
    fn week_navigation_normalizes_to_monday() {
        let (mut tracker, _, _) = tracker_at("2024-06-05T09:00:00");
        assert_eq!(tracker.week_start(), NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
        tracker.shift_week(-1).unwrap();
        assert_eq!(tracker.week_start(), NaiveDate::from_ymd_opt(2024, 5, 27).unwrap());
        tracker
            .select_week(NaiveDate::from_ymd_opt(2024, 6, 16).unwrap())
            .unwrap();
        assert_eq!(tracker.week_start(), NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());
        tracker.current_week().unwrap();
        assert_eq!(tracker.week_start(), NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
    }
}
