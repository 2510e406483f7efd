use std::error::Error;
use std::fs::{self, OpenOptions};
use std::io::Stdout;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::NaiveDate;
use clap::Parser;
use crossterm::ExecutableCommand;
use crossterm::event::{self, Event};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing::info;
use tracing_subscriber::EnvFilter;

use timesheet::app::App;
use timesheet::catalog::Catalog;
use timesheet::clock::SystemClock;
use timesheet::config::{self, ThemePreference};
use timesheet::dates::parse_date;
use timesheet::storage::{JsonFileStore, default_data_path};
use timesheet::tracker::Tracker;
use timesheet::ui;

const LOG_FILE_NAME: &str = "timesheet.log";
const LOG_ENV: &str = "TIMESHEET_LOG";
const POLL_INTERVAL: Duration = Duration::from_millis(120);

/// Weekly timesheet tracker for the terminal
#[derive(Parser, Debug)]
#[clap(version, about)]
struct Cli {
    /// timesheet data file (defaults to the platform data directory)
    #[clap(long, value_name = "PATH")]
    data_file: Option<PathBuf>,

    /// roster and task catalog JSON to use instead of the built-in one
    #[clap(long, value_name = "PATH")]
    catalog: Option<PathBuf>,

    /// employee to open directly
    #[clap(long)]
    employee: Option<String>,

    /// any date inside the week to open
    #[clap(long, value_name = "YYYY-MM-DD", value_parser = parse_date)]
    week: Option<NaiveDate>,

    /// color theme
    #[clap(long, value_enum)]
    theme: Option<ThemePreference>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = config::read_config().unwrap_or_default();

    let data_path = cli
        .data_file
        .or(config.data_file)
        .unwrap_or_else(default_data_path);
    init_logging(&data_path)?;

    let catalog = match cli.catalog.or(config.catalog_file) {
        Some(path) => Catalog::from_path(&path)?,
        None => Catalog::builtin()?,
    };
    let theme = cli.theme.or(config.theme).unwrap_or_default();
    let employee = cli.employee.or(config.last_employee);

    info!(path = %data_path.display(), "starting timesheet");
    let mut tracker = Tracker::open(catalog, JsonFileStore::new(data_path), SystemClock);
    if let Some(week) = cli.week {
        tracker.select_week(week)?;
    }
    let mut app = App::new(tracker, theme, employee.as_deref());

    let mut stdout = std::io::stdout();
    enable_raw_mode()?;
    stdout.execute(EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = run(&mut terminal, &mut app);

    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App<JsonFileStore, SystemClock>,
) -> Result<(), Box<dyn Error>> {
    loop {
        app.on_tick();
        terminal.draw(|frame| ui::draw(frame, app))?;

        if app.should_quit {
            return Ok(());
        }

        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                app.handle_key_event(key);
            }
        }
    }
}

/// Logs go to a file beside the data file since the terminal belongs to the UI.
fn init_logging(data_path: &Path) -> Result<(), Box<dyn Error>> {
    let log_path = data_path.with_file_name(LOG_FILE_NAME);
    if let Some(parent) = log_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&log_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
