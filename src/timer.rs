use chrono::{NaiveDateTime, Weekday};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dates::{WEEKDAYS, weekday_of};
use crate::models::{DayError, Session, WeekSheet};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("a timer is already running (task {entry}, {weekday}); stop it first")]
    Busy { entry: usize, weekday: Weekday },
    #[error("only today's timer can be started (requested {requested}, today is {today})")]
    WrongDay { requested: Weekday, today: Weekday },
    #[error("no timer is running")]
    NotRunning,
    #[error("task {0} does not exist")]
    UnknownEntry(usize),
    #[error(transparent)]
    Day(#[from] DayError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerState {
    #[default]
    Idle,
    Running { entry: usize, weekday: Weekday },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub entry: usize,
    pub weekday: Weekday,
    pub day_hours: f64,
    pub entry_hours: f64,
    pub weekly_hours: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped {
    pub entry: usize,
    pub weekday: Weekday,
    pub session: Session,
}

/// Owns the single active-timer reference for the sheet in view.
#[derive(Debug, Clone, Default)]
pub struct TimerController {
    state: TimerState,
}

impl TimerController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the controller from persisted `running_start` fields.
    ///
    /// Only the first running day in (entry, weekday) order survives; any
    /// other open timer is discarded.
    pub fn resume(sheet: &mut WeekSheet) -> Self {
        let mut state = TimerState::Idle;
        for entry in 0..sheet.len() {
            for weekday in WEEKDAYS {
                let Some(task) = sheet.entry_mut(entry) else {
                    continue;
                };
                let day = task.day_mut(weekday);
                if !day.is_running() {
                    continue;
                }
                if state == TimerState::Idle {
                    info!(entry, %weekday, "resuming running timer");
                    state = TimerState::Running { entry, weekday };
                } else if let Some(start) = day.discard_running() {
                    warn!(entry, %weekday, %start, "discarding extra running timer");
                }
            }
        }
        Self { state }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn active(&self) -> Option<(usize, Weekday)> {
        match self.state {
            TimerState::Idle => None,
            TimerState::Running { entry, weekday } => Some((entry, weekday)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.active().is_some()
    }

    pub fn start(
        &mut self,
        sheet: &mut WeekSheet,
        entry: usize,
        weekday: Weekday,
        now: NaiveDateTime,
    ) -> Result<(), TimerError> {
        if let TimerState::Running {
            entry: running,
            weekday: running_day,
        } = self.state
        {
            return Err(TimerError::Busy {
                entry: running,
                weekday: running_day,
            });
        }
        let today = weekday_of(now);
        if weekday != today {
            return Err(TimerError::WrongDay {
                requested: weekday,
                today,
            });
        }
        let task = sheet
            .entry_mut(entry)
            .ok_or(TimerError::UnknownEntry(entry))?;
        task.day_mut(weekday).start_running(now)?;
        self.state = TimerState::Running { entry, weekday };
        info!(entry, %weekday, %now, "timer started");
        Ok(())
    }

    pub fn stop(
        &mut self,
        sheet: &mut WeekSheet,
        now: NaiveDateTime,
    ) -> Result<Stopped, TimerError> {
        let (entry, weekday) = self.active().ok_or(TimerError::NotRunning)?;
        let task = sheet
            .entry_mut(entry)
            .ok_or(TimerError::UnknownEntry(entry))?;
        let session = task.day_mut(weekday).stop_running(now)?;
        self.state = TimerState::Idle;
        info!(entry, %weekday, hours = session.hours(), "timer stopped");
        Ok(Stopped {
            entry,
            weekday,
            session,
        })
    }

    /// Live hours for the running cell. Never mutates the sheet.
    pub fn tick(&self, sheet: &WeekSheet, now: NaiveDateTime) -> Option<TickReport> {
        let (entry, weekday) = self.active()?;
        let task = sheet.entry(entry)?;
        let report = TickReport {
            entry,
            weekday,
            day_hours: task.day(weekday).total_hours(now),
            entry_hours: task.total_hours(now),
            weekly_hours: sheet.weekly_total(now),
        };
        debug!(entry, %weekday, hours = report.day_hours, "tick");
        Some(report)
    }

    /// Keeps the active reference on the same task after `index` is removed.
    pub fn entry_removed(&mut self, index: usize) {
        if let TimerState::Running { entry, weekday } = self.state {
            if entry > index {
                self.state = TimerState::Running {
                    entry: entry - 1,
                    weekday,
                };
            }
        }
    }
}
