use chrono::Weekday;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::widgets::ListState;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::clock::Clock;
use crate::config::{self, ThemePreference};
use crate::dates::{WEEKDAYS, day_index, weekday_of};
use crate::storage::SheetStore;
use crate::timer::TickReport;
use crate::tracker::{TimerAction, Tracker, TrackerError};

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const TOAST_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    EmployeeSelect,
    Sheet,
    TaskSelect,
    SubtaskSelect,
    NotesInput,
    ConfirmDelete,
}

pub struct App<S: SheetStore, C: Clock> {
    pub should_quit: bool,
    pub mode: Mode,
    pub tracker: Tracker<S, C>,
    pub theme: ThemePreference,
    pub show_help: bool,
    pub input: String,
    pub employee_state: ListState,
    pub picker_state: ListState,
    pub pending_task: Option<String>,
    pub selected_row: usize,
    pub selected_day: usize,
    pub live: Option<TickReport>,
    persist_preferences: bool,
    last_tick: Option<Instant>,
    toast: Option<Toast>,
}

impl<S: SheetStore, C: Clock> App<S, C> {
    pub fn new(tracker: Tracker<S, C>, theme: ThemePreference, employee: Option<&str>) -> Self {
        let mut employee_state = ListState::default();
        employee_state.select(Some(0));
        let selected_day = day_index(weekday_of(tracker.now()));

        let mut app = App {
            should_quit: false,
            mode: Mode::EmployeeSelect,
            tracker,
            theme,
            show_help: false,
            input: String::new(),
            employee_state,
            picker_state: ListState::default(),
            pending_task: None,
            selected_row: 0,
            selected_day,
            live: None,
            persist_preferences: true,
            last_tick: None,
            toast: None,
        };

        if let Some(err) = app.tracker.take_load_warning() {
            app.set_toast(format!("{err}; starting with an empty timesheet"), true);
        }

        if let Some(employee) = employee {
            match app.tracker.select_employee(employee) {
                Ok(()) => app.mode = Mode::Sheet,
                Err(err) => app.set_toast(err.to_string(), true),
            }
        }

        if let Some(index) = app
            .tracker
            .employee()
            .and_then(|current| app.employee_names().iter().position(|name| name == current))
        {
            app.employee_state.select(Some(index));
        }
        app
    }

    /// Keeps theme and employee choices out of the user's config file.
    pub fn without_saved_preferences(mut self) -> Self {
        self.persist_preferences = false;
        self
    }

    pub fn handle_key_event(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if self.show_help {
            match key.code {
                KeyCode::Char('h') | KeyCode::Esc => self.show_help = false,
                KeyCode::Char('q') => self.should_quit = true,
                _ => {}
            }
            return;
        }

        match self.mode {
            Mode::EmployeeSelect => self.handle_employee_input(key),
            Mode::Sheet => self.handle_sheet_input(key),
            Mode::TaskSelect => self.handle_task_input(key),
            Mode::SubtaskSelect => self.handle_subtask_input(key),
            Mode::NotesInput => self.handle_notes_input(key),
            Mode::ConfirmDelete => self.handle_confirm_delete(key),
        }
    }

    /// Refreshes the live timer readout, at most once per second.
    pub fn on_tick(&mut self) {
        if let Some(last) = self.last_tick {
            if last.elapsed() < TICK_INTERVAL {
                return;
            }
        }
        self.last_tick = Some(Instant::now());
        self.live = self.tracker.tick();
    }

    pub fn selected_weekday(&self) -> Weekday {
        WEEKDAYS[self.selected_day]
    }

    pub fn employee_names(&self) -> Vec<String> {
        self.tracker
            .catalog()
            .employees()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Catalog tasks matching the typed filter.
    pub fn task_choices(&self) -> Vec<String> {
        filter_choices(
            self.tracker.task_names().into_iter().map(str::to_string),
            &self.input,
        )
    }

    pub fn subtask_choices(&self) -> Vec<String> {
        let Some(task) = self.pending_task.as_deref() else {
            return Vec::new();
        };
        filter_choices(
            self.tracker.subtask_names(task).iter().cloned(),
            &self.input,
        )
    }

    pub fn selected_task_name(&self) -> Option<String> {
        self.tracker
            .sheet()?
            .entry(self.selected_row)
            .map(|entry| entry.task_name().to_string())
    }

    fn handle_employee_input(&mut self, key: KeyEvent) {
        let count = self.tracker.catalog().employees().len();
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Up => select_previous(&mut self.employee_state, count),
            KeyCode::Down => select_next(&mut self.employee_state, count),
            KeyCode::Enter => {
                let names = self.employee_names();
                let Some(name) = self
                    .employee_state
                    .selected()
                    .and_then(|index| names.get(index))
                else {
                    return;
                };
                match self.tracker.select_employee(name) {
                    Ok(()) => {
                        self.selected_row = 0;
                        self.mode = Mode::Sheet;
                        self.refresh_live();
                        if self.persist_preferences {
                            if let Err(err) = config::write_last_employee(name) {
                                warn!(error = %err, "failed to remember employee");
                            }
                        }
                    }
                    Err(err) => self.report_error(err),
                }
            }
            KeyCode::Esc => {
                if self.tracker.employee().is_some() {
                    self.mode = Mode::Sheet;
                } else {
                    self.should_quit = true;
                }
            }
            _ => {}
        }
    }

    fn handle_sheet_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('h') => self.show_help = true,
            KeyCode::Up => {
                self.selected_row = self.selected_row.saturating_sub(1);
            }
            KeyCode::Down => {
                if self.selected_row + 1 < self.row_count() {
                    self.selected_row += 1;
                }
            }
            KeyCode::Left => {
                self.selected_day = self.selected_day.saturating_sub(1);
            }
            KeyCode::Right => {
                if self.selected_day + 1 < WEEKDAYS.len() {
                    self.selected_day += 1;
                }
            }
            KeyCode::Enter | KeyCode::Char(' ') => self.toggle_selected(),
            KeyCode::Char('a') => {
                self.input.clear();
                self.pending_task = None;
                self.picker_state.select(Some(0));
                self.mode = Mode::TaskSelect;
            }
            KeyCode::Char('d') => {
                if self.selected_row < self.row_count() {
                    self.mode = Mode::ConfirmDelete;
                }
            }
            KeyCode::Char('n') => {
                let notes = self
                    .tracker
                    .sheet()
                    .and_then(|sheet| sheet.entry(self.selected_row))
                    .map(|entry| entry.day(self.selected_weekday()).notes().to_string());
                if let Some(notes) = notes {
                    self.input = notes;
                    self.mode = Mode::NotesInput;
                }
            }
            KeyCode::Char('e') => {
                if self.tracker.timer().is_running() {
                    self.report_error(TrackerError::TimerActive);
                } else {
                    self.mode = Mode::EmployeeSelect;
                }
            }
            KeyCode::Char('[') => {
                let result = self.tracker.shift_week(-1);
                self.after_week_change(result);
            }
            KeyCode::Char(']') => {
                let result = self.tracker.shift_week(1);
                self.after_week_change(result);
            }
            KeyCode::Char('w') => {
                let result = self.tracker.current_week();
                self.after_week_change(result);
            }
            KeyCode::Char('c') => self.cycle_theme(),
            _ => {}
        }
    }

    fn handle_task_input(&mut self, key: KeyEvent) {
        let choices = self.task_choices();
        match key.code {
            KeyCode::Up => select_previous(&mut self.picker_state, choices.len()),
            KeyCode::Down => select_next(&mut self.picker_state, choices.len()),
            KeyCode::Enter => {
                let task = picked(&self.picker_state, &choices, &self.input);
                if task.is_empty() {
                    self.report_error(TrackerError::EmptyTaskName);
                    return;
                }
                self.pending_task = Some(task);
                self.input.clear();
                self.picker_state.select(Some(0));
                self.mode = Mode::SubtaskSelect;
            }
            KeyCode::Backspace => {
                self.input.pop();
                self.picker_state.select(Some(0));
            }
            KeyCode::Char(ch) if !ch.is_control() => {
                self.input.push(ch);
                self.picker_state.select(Some(0));
            }
            KeyCode::Esc => self.close_picker(),
            _ => {}
        }
    }

    fn handle_subtask_input(&mut self, key: KeyEvent) {
        let choices = self.subtask_choices();
        match key.code {
            KeyCode::Up => select_previous(&mut self.picker_state, choices.len()),
            KeyCode::Down => select_next(&mut self.picker_state, choices.len()),
            KeyCode::Enter => {
                let subtask = picked(&self.picker_state, &choices, &self.input);
                let task = self.pending_task.take().unwrap_or_default();
                match self.tracker.add_task(&task, &subtask) {
                    Ok(index) => {
                        self.selected_row = index;
                        self.set_toast(format!("Added {task}"), false);
                    }
                    Err(err) => self.report_error(err),
                }
                self.close_picker();
            }
            KeyCode::Backspace => {
                self.input.pop();
                self.picker_state.select(Some(0));
            }
            KeyCode::Char(ch) if !ch.is_control() => {
                self.input.push(ch);
                self.picker_state.select(Some(0));
            }
            KeyCode::Esc => {
                self.input.clear();
                self.pending_task = None;
                self.mode = Mode::TaskSelect;
            }
            _ => {}
        }
    }

    fn handle_notes_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => {
                let notes = std::mem::take(&mut self.input);
                match self
                    .tracker
                    .set_notes(self.selected_row, self.selected_weekday(), notes.trim())
                {
                    Ok(()) => self.set_toast("Notes saved", false),
                    Err(err) => self.report_error(err),
                }
                self.mode = Mode::Sheet;
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(ch) if !ch.is_control() => self.input.push(ch),
            KeyCode::Esc => {
                self.input.clear();
                self.mode = Mode::Sheet;
            }
            _ => {}
        }
    }

    fn handle_confirm_delete(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                match self.tracker.delete_task(self.selected_row) {
                    Ok(()) => {
                        self.clamp_row();
                        self.refresh_live();
                        self.set_toast("Task deleted", false);
                    }
                    Err(err) => self.report_error(err),
                }
                self.mode = Mode::Sheet;
            }
            KeyCode::Char('n') | KeyCode::Esc => self.mode = Mode::Sheet,
            _ => {}
        }
    }

    fn toggle_selected(&mut self) {
        if self.selected_row >= self.row_count() {
            return;
        }
        let weekday = self.selected_weekday();
        match self.tracker.toggle_timer(self.selected_row, weekday) {
            Ok(TimerAction::Started { .. }) => {
                self.set_toast(format!("Timer started ({weekday})"), false);
            }
            Ok(TimerAction::Stopped(stopped)) => {
                self.set_toast(format!("Stopped: +{:.2}h", stopped.session.hours()), false);
            }
            Err(err) => self.report_error(err),
        }
        self.refresh_live();
    }

    fn after_week_change(&mut self, result: Result<(), TrackerError>) {
        match result {
            Ok(()) => {
                self.selected_row = 0;
                self.refresh_live();
            }
            Err(err) => self.report_error(err),
        }
    }

    fn cycle_theme(&mut self) {
        self.theme = self.theme.next();
        if self.persist_preferences {
            if let Err(err) = config::write_theme(self.theme) {
                warn!(error = %err, "failed to save theme");
                self.set_toast(format!("Failed to save theme: {err}"), true);
                return;
            }
        }
        self.set_toast(format!("Theme: {}", self.theme.label()), false);
    }

    fn close_picker(&mut self) {
        self.input.clear();
        self.pending_task = None;
        self.mode = Mode::Sheet;
    }

    fn row_count(&self) -> usize {
        self.tracker.sheet().map_or(0, |sheet| sheet.len())
    }

    fn clamp_row(&mut self) {
        let count = self.row_count();
        if self.selected_row >= count {
            self.selected_row = count.saturating_sub(1);
        }
    }

    fn refresh_live(&mut self) {
        self.last_tick = Some(Instant::now());
        self.live = self.tracker.tick();
    }

    fn report_error(&mut self, err: TrackerError) {
        self.set_toast(err.to_string(), true);
    }

    pub fn active_toast(&mut self) -> Option<ToastView> {
        let toast = self.toast.as_ref()?;
        if toast.created_at.elapsed() > TOAST_TTL {
            self.toast = None;
            return None;
        }
        Some(ToastView {
            message: toast.message.clone(),
            is_error: toast.is_error,
        })
    }

    fn set_toast(&mut self, message: impl Into<String>, is_error: bool) {
        self.toast = Some(Toast {
            message: message.into(),
            created_at: Instant::now(),
            is_error,
        });
    }
}

fn filter_choices(choices: impl Iterator<Item = String>, filter: &str) -> Vec<String> {
    let needle = filter.trim().to_lowercase();
    choices
        .filter(|choice| needle.is_empty() || choice.to_lowercase().contains(&needle))
        .collect()
}

/// The highlighted choice, or the typed text when nothing matches.
fn picked(state: &ListState, choices: &[String], typed: &str) -> String {
    state
        .selected()
        .and_then(|index| choices.get(index))
        .cloned()
        .unwrap_or_else(|| typed.trim().to_string())
}

fn select_previous(state: &mut ListState, len: usize) {
    if len == 0 {
        return;
    }
    let selected = state.selected().unwrap_or(0);
    let new_index = if selected == 0 { len - 1 } else { selected - 1 };
    state.select(Some(new_index));
}

fn select_next(state: &mut ListState, len: usize) {
    if len == 0 {
        return;
    }
    let selected = state.selected().unwrap_or(0);
    let new_index = if selected + 1 >= len { 0 } else { selected + 1 };
    state.select(Some(new_index));
}

struct Toast {
    message: String,
    created_at: Instant,
    is_error: bool,
}

pub struct ToastView {
    pub message: String,
    pub is_error: bool,
}
