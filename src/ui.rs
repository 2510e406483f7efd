use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Margin, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, BorderType, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table, Wrap,
};

use crate::app::{App, Mode};
use crate::clock::Clock;
use crate::config::ThemePreference;
use crate::dates::{WEEKDAYS, week_label, weekday_label};
use crate::rollups::Rollup;
use crate::storage::SheetStore;

pub fn draw<S: SheetStore, C: Clock>(frame: &mut Frame, app: &mut App<S, C>) {
    let size = frame.area();
    let theme = theme_from(app.theme);
    draw_background(frame, size, &theme);
    draw_sheet(frame, app, size, &theme);

    match app.mode {
        Mode::EmployeeSelect => draw_employee_select(frame, app, size, &theme),
        Mode::TaskSelect => draw_picker(frame, app, size, "Add Task", &theme),
        Mode::SubtaskSelect => draw_picker(frame, app, size, "Select Subtask", &theme),
        Mode::NotesInput => draw_notes_input(frame, app, size, &theme),
        Mode::ConfirmDelete => draw_confirm_delete(frame, app, size, &theme),
        Mode::Sheet => {}
    }

    if !app.show_help {
        if let Some(toast) = app.active_toast() {
            draw_toast(frame, size, &toast.message, toast.is_error, &theme);
        }
    }

    if app.show_help {
        draw_help(frame, size, &theme);
    }
}

fn draw_sheet<S: SheetStore, C: Clock>(
    frame: &mut Frame,
    app: &App<S, C>,
    area: Rect,
    theme: &Theme,
) {
    let content = area.inner(Margin {
        vertical: 1,
        horizontal: 2,
    });

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(2)])
        .split(content);

    let header = Paragraph::new(header_line(app, theme))
        .alignment(Alignment::Left)
        .block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_style(theme.border_style())
                .style(theme.panel_style()),
        );
    frame.render_widget(header, chunks[0]);

    let rollup = app.tracker.rollup();
    let table = sheet_table(app, &rollup, theme);
    frame.render_widget(table, chunks[1]);

    let footer = Paragraph::new(footer_line(app, &rollup, theme))
        .alignment(Alignment::Left)
        .block(
            Block::default()
                .borders(Borders::TOP)
                .border_style(theme.border_style())
                .style(theme.panel_style()),
        );
    frame.render_widget(footer, chunks[2]);
}

fn sheet_table<S: SheetStore, C: Clock>(
    app: &App<S, C>,
    rollup: &Rollup,
    theme: &Theme,
) -> Table<'static> {
    let header_style = Style::default().fg(theme.accent).add_modifier(Modifier::BOLD);
    let selected_style = Style::default()
        .bg(theme.accent)
        .fg(theme.accent_contrast())
        .add_modifier(Modifier::BOLD);
    let running_style = Style::default()
        .fg(theme.highlight)
        .add_modifier(Modifier::BOLD);

    let mut header_cells = vec![Cell::from(Span::styled("Task", header_style))];
    header_cells.extend(
        WEEKDAYS
            .iter()
            .map(|weekday| Cell::from(Span::styled(weekday_label(*weekday), header_style))),
    );
    header_cells.push(Cell::from(Span::styled("TOTAL", header_style)));

    let running = app.tracker.timer().active();
    let mut rows: Vec<Row> = rollup
        .entries
        .iter()
        .enumerate()
        .map(|(row, entry)| {
            let label = if entry.subtask_name.is_empty() {
                entry.task_name.clone()
            } else {
                format!("{} / {}", entry.task_name, entry.subtask_name)
            };
            let mut cells = vec![Cell::from(label)];
            for (column, hours) in entry.days.iter().enumerate() {
                let is_running = running == Some((row, WEEKDAYS[column]));
                let text = if is_running {
                    format!("▶{hours:.2}")
                } else {
                    format_hours(*hours)
                };
                let style = if row == app.selected_row && column == app.selected_day {
                    selected_style
                } else if is_running {
                    running_style
                } else {
                    theme.panel_style()
                };
                cells.push(Cell::from(text).style(style));
            }
            cells.push(
                Cell::from(format!("{:.2}", entry.total_hours))
                    .style(Style::default().add_modifier(Modifier::BOLD)),
            );
            Row::new(cells)
        })
        .collect();

    if rows.is_empty() {
        rows.push(Row::new(vec![Cell::from(Span::styled(
            "No tasks yet. Press a to add one.",
            theme.muted_style(),
        ))]));
    }

    let mut totals = vec![Cell::from(Span::styled("Daily total", header_style))];
    totals.extend(rollup.daily.iter().map(|total| {
        Cell::from(format!("{:.2}", total.hours)).style(theme.muted_style())
    }));
    totals.push(
        Cell::from(format!("{:.2}", rollup.weekly_hours))
            .style(Style::default().fg(theme.success).add_modifier(Modifier::BOLD)),
    );
    rows.push(Row::new(totals).top_margin(1));

    let mut widths = vec![Constraint::Min(24)];
    widths.extend(std::iter::repeat_n(Constraint::Length(7), WEEKDAYS.len()));
    widths.push(Constraint::Length(8));

    Table::new(rows, widths)
        .header(Row::new(header_cells).bottom_margin(1))
        .block(panel_block("Week", theme))
        .column_spacing(1)
}

fn format_hours(hours: f64) -> String {
    if hours == 0.0 {
        "·".to_string()
    } else {
        format!("{hours:.2}")
    }
}

fn header_line<S: SheetStore, C: Clock>(app: &App<S, C>, theme: &Theme) -> Line<'static> {
    let employee = app
        .tracker
        .employee()
        .map(str::to_string)
        .unwrap_or_else(|| "No employee".to_string());
    let department = app
        .tracker
        .department()
        .unwrap_or("No department")
        .to_string();
    Line::from(vec![
        Span::styled("Timesheet", theme.title_style()),
        Span::raw("  "),
        Span::styled("Employee", theme.muted_style()),
        Span::raw(": "),
        Span::styled(employee, Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(format!(" ({department})"), theme.muted_style()),
        Span::raw("  "),
        Span::styled("Week", theme.muted_style()),
        Span::raw(": "),
        Span::raw(week_label(app.tracker.week_start())),
    ])
}

fn footer_line<S: SheetStore, C: Clock>(
    app: &App<S, C>,
    rollup: &Rollup,
    theme: &Theme,
) -> Line<'static> {
    let running = match app.live {
        Some(report) => {
            let task = app
                .tracker
                .sheet()
                .and_then(|sheet| sheet.entry(report.entry))
                .map(|entry| entry.task_name().to_string())
                .unwrap_or_default();
            Span::styled(
                format!(
                    "▶ {task} {} {:.2}h",
                    weekday_label(report.weekday),
                    report.day_hours
                ),
                Style::default().fg(theme.highlight).add_modifier(Modifier::BOLD),
            )
        }
        None => Span::styled("No timer running", theme.muted_style()),
    };

    Line::from(vec![
        Span::styled(
            format!("Week total {:.2}h", rollup.weekly_hours),
            Style::default().fg(theme.success).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" as of {}", rollup.at.format("%H:%M:%S")),
            theme.muted_style(),
        ),
        Span::raw("   "),
        running,
        Span::raw("   "),
        Span::styled("h help", theme.muted_style()),
        Span::raw(" · "),
        Span::styled("a add", theme.muted_style()),
        Span::raw(" · "),
        Span::styled("enter timer", theme.muted_style()),
        Span::raw(" · "),
        Span::styled("q quit", theme.muted_style()),
    ])
}

fn draw_employee_select<S: SheetStore, C: Clock>(
    frame: &mut Frame,
    app: &mut App<S, C>,
    area: Rect,
    theme: &Theme,
) {
    let block = centered_rect(50, 70, area);
    frame.render_widget(Clear, block);

    let items: Vec<ListItem> = app
        .tracker
        .catalog()
        .employees()
        .into_iter()
        .map(|name| {
            let department = app.tracker.catalog().department_of(name).unwrap_or("");
            ListItem::new(Line::from(vec![
                Span::raw(name.to_string()),
                Span::styled(format!("  {department}"), theme.muted_style()),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(panel_block("Select Employee", theme))
        .highlight_style(
            Style::default()
                .bg(theme.accent)
                .fg(theme.accent_contrast())
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▍ ");

    frame.render_stateful_widget(list, block, &mut app.employee_state);
}

fn draw_picker<S: SheetStore, C: Clock>(
    frame: &mut Frame,
    app: &mut App<S, C>,
    area: Rect,
    title: &str,
    theme: &Theme,
) {
    let block = centered_rect(60, 60, area);
    frame.render_widget(Clear, block);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(block);

    let choices = if app.mode == Mode::SubtaskSelect {
        app.subtask_choices()
    } else {
        app.task_choices()
    };
    let prompt = match app.pending_task.as_deref() {
        Some(task) if app.mode == Mode::SubtaskSelect => format!("{task} › "),
        _ => String::new(),
    };
    let input = Paragraph::new(Line::from(vec![
        Span::styled(prompt, theme.muted_style()),
        Span::styled(app.input.clone(), Style::default().fg(theme.accent)),
    ]))
    .block(panel_block(title, theme));
    frame.render_widget(input, chunks[0]);

    let items: Vec<ListItem> = if choices.is_empty() {
        vec![ListItem::new(Line::from(Span::styled(
            "No matches. Enter uses the typed text.",
            theme.muted_style(),
        )))]
    } else {
        choices
            .into_iter()
            .map(|choice| ListItem::new(Line::from(choice)))
            .collect()
    };

    let list = List::new(items)
        .block(panel_block("Type to filter • Enter select • Esc back", theme))
        .highlight_style(
            Style::default()
                .bg(theme.accent)
                .fg(theme.accent_contrast())
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▍ ");

    frame.render_stateful_widget(list, chunks[1], &mut app.picker_state);
}

fn draw_notes_input<S: SheetStore, C: Clock>(
    frame: &mut Frame,
    app: &App<S, C>,
    area: Rect,
    theme: &Theme,
) {
    let block = centered_rect(60, 30, area);
    frame.render_widget(Clear, block);

    let task = app.selected_task_name().unwrap_or_default();
    let lines = vec![
        Line::from(format!(
            "Notes for {task} on {}",
            weekday_label(app.selected_weekday())
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("Notes: ", Style::default().add_modifier(Modifier::BOLD)),
            Span::styled(app.input.clone(), Style::default().fg(theme.accent)),
        ]),
        Line::from(""),
        Line::from("Enter save • Esc cancel"),
    ];

    let paragraph = Paragraph::new(lines)
        .alignment(Alignment::Left)
        .block(panel_block("Notes", theme))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, block);
}

fn draw_confirm_delete<S: SheetStore, C: Clock>(
    frame: &mut Frame,
    app: &App<S, C>,
    area: Rect,
    theme: &Theme,
) {
    let block = centered_rect(50, 20, area);
    frame.render_widget(Clear, block);

    let task = app.selected_task_name().unwrap_or_default();
    let lines = vec![
        Line::from(vec![
            Span::raw("Delete "),
            Span::styled(task, Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" and all of its hours?"),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            "y delete • n / Esc keep",
            Style::default().fg(theme.error),
        )),
    ];

    let paragraph = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(panel_block("Confirm", theme))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, block);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1]);
    vertical[1]
}

fn draw_toast(frame: &mut Frame, area: Rect, message: &str, is_error: bool, theme: &Theme) {
    let text_width = u16::try_from(message.chars().count()).unwrap_or(u16::MAX);
    let width = text_width
        .saturating_add(6)
        .max(20)
        .min(area.width.saturating_sub(2));
    let height = 3;
    if width == 0 || area.height < height {
        return;
    }
    let x = area.x + area.width.saturating_sub(width + 1);
    let y = area.y + area.height.saturating_sub(height + 4);
    let rect = Rect::new(x, y, width, height);

    frame.render_widget(Clear, rect);
    let (title, style) = if is_error {
        (
            "Error",
            Style::default().fg(theme.error).add_modifier(Modifier::BOLD),
        )
    } else {
        (
            "Done",
            Style::default().fg(theme.success).add_modifier(Modifier::BOLD),
        )
    };
    let paragraph = Paragraph::new(Line::from(Span::styled(message.to_string(), style)))
        .alignment(Alignment::Center)
        .block(panel_block(title, theme));
    frame.render_widget(paragraph, rect);
}

fn draw_help(frame: &mut Frame, area: Rect, theme: &Theme) {
    let block = centered_rect(70, 70, area);
    frame.render_widget(Clear, block);

    let header_style = Style::default().add_modifier(Modifier::BOLD).fg(theme.accent);
    let key_style = Style::default().fg(theme.highlight);
    let section = |title: &'static str| {
        Row::new(vec![
            Cell::from(Span::styled(title, header_style)),
            Cell::from(""),
        ])
    };
    let binding = |keys: &'static str, action: &'static str| {
        Row::new(vec![
            Cell::from(Span::styled(keys, key_style)),
            Cell::from(action),
        ])
    };

    let rows = vec![
        section("Sheet"),
        binding("Arrows", "Move between tasks and days"),
        binding("Enter / Space", "Start or stop the timer (today only)"),
        binding("a", "Add task"),
        binding("d", "Delete task (confirm with y)"),
        binding("n", "Edit notes for the selected day"),
        Row::new(vec![Cell::from(""), Cell::from("")]),
        section("Navigation"),
        binding("e", "Switch employee"),
        binding("[ / ]", "Previous / next week"),
        binding("w", "Back to this week"),
        Row::new(vec![Cell::from(""), Cell::from("")]),
        section("General"),
        binding("c", "Cycle theme"),
        binding("h / Esc", "Close help"),
        binding("q", "Quit (a running timer keeps running)"),
    ];

    let table = Table::new(rows, [Constraint::Length(20), Constraint::Min(10)])
        .block(panel_block("Help", theme))
        .column_spacing(2);

    frame.render_widget(table, block);
}

fn draw_background(frame: &mut Frame, area: Rect, theme: &Theme) {
    let block = Block::default().style(Style::default().bg(theme.bg).fg(theme.text));
    frame.render_widget(block, area);
}

fn panel_block(title: &str, theme: &Theme) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(theme.border_style())
        .style(theme.panel_style())
        .title(Line::from(Span::styled(
            format!(" {} ", title),
            theme.title_style(),
        )))
}

#[derive(Clone, Copy)]
struct Theme {
    bg: Color,
    panel: Color,
    border: Color,
    text: Color,
    muted: Color,
    accent: Color,
    highlight: Color,
    success: Color,
    error: Color,
    accent_dark: Color,
}

impl Theme {
    fn panel_style(&self) -> Style {
        Style::default().bg(self.panel).fg(self.text)
    }

    fn border_style(&self) -> Style {
        Style::default().fg(self.border)
    }

    fn title_style(&self) -> Style {
        Style::default().fg(self.accent).add_modifier(Modifier::BOLD)
    }

    fn muted_style(&self) -> Style {
        Style::default().fg(self.muted)
    }

    fn accent_contrast(&self) -> Color {
        if matches!(self.bg, Color::Rgb(242, 244, 248)) {
            self.accent_dark
        } else {
            Color::Black
        }
    }
}

fn theme_from(pref: ThemePreference) -> Theme {
    match pref {
        ThemePreference::Terminal => Theme {
            bg: Color::Reset,
            panel: Color::Reset,
            border: Color::DarkGray,
            text: Color::Reset,
            muted: Color::DarkGray,
            accent: Color::Cyan,
            highlight: Color::Yellow,
            success: Color::Green,
            error: Color::Red,
            accent_dark: Color::Black,
        },
        ThemePreference::Dark => Theme {
            bg: Color::Rgb(16, 20, 28),
            panel: Color::Rgb(24, 30, 42),
            border: Color::Rgb(56, 72, 96),
            text: Color::Rgb(226, 232, 240),
            muted: Color::Rgb(140, 154, 178),
            accent: Color::Rgb(94, 196, 180),
            highlight: Color::Rgb(250, 204, 110),
            success: Color::Rgb(124, 214, 142),
            error: Color::Rgb(248, 113, 113),
            accent_dark: Color::Rgb(20, 72, 66),
        },
        ThemePreference::Light => Theme {
            bg: Color::Rgb(242, 244, 248),
            panel: Color::Rgb(255, 255, 255),
            border: Color::Rgb(206, 214, 228),
            text: Color::Rgb(30, 36, 48),
            muted: Color::Rgb(96, 110, 134),
            accent: Color::Rgb(22, 140, 126),
            highlight: Color::Rgb(214, 122, 24),
            success: Color::Rgb(36, 150, 90),
            error: Color::Rgb(210, 58, 74),
            accent_dark: Color::Rgb(14, 48, 44),
        },
    }
}
