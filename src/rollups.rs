use chrono::{NaiveDateTime, Weekday};

use crate::dates::WEEKDAYS;
use crate::models::{DAYS_PER_WEEK, WeekSheet};

#[derive(Debug, Clone, PartialEq)]
pub struct DailyTotal {
    pub weekday: Weekday,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryRollup {
    pub task_name: String,
    pub subtask_name: String,
    pub days: [f64; DAYS_PER_WEEK],
    pub total_hours: f64,
}

/// Totals of one sheet read at a single instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Rollup {
    pub at: NaiveDateTime,
    pub entries: Vec<EntryRollup>,
    pub daily: Vec<DailyTotal>,
    pub weekly_hours: f64,
}

impl Rollup {
    pub fn build(sheet: &WeekSheet, now: NaiveDateTime) -> Self {
        let entries = sheet
            .entries()
            .iter()
            .map(|entry| {
                let mut days = [0.0; DAYS_PER_WEEK];
                for (slot, day) in days.iter_mut().zip(entry.days()) {
                    *slot = day.total_hours(now);
                }
                EntryRollup {
                    task_name: entry.task_name().to_string(),
                    subtask_name: entry.subtask_name().to_string(),
                    days,
                    total_hours: entry.total_hours(now),
                }
            })
            .collect();

        let daily = WEEKDAYS
            .iter()
            .map(|weekday| DailyTotal {
                weekday: *weekday,
                hours: sheet.daily_total(*weekday, now),
            })
            .collect();

        Self {
            at: now,
            entries,
            daily,
            weekly_hours: sheet.weekly_total(now),
        }
    }

    pub fn daily_hours(&self, weekday: Weekday) -> f64 {
        self.daily
            .iter()
            .find(|total| total.weekday == weekday)
            .map(|total| total.hours)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::parse_timestamp;

    fn at(value: &str) -> NaiveDateTime {
        parse_timestamp(value).unwrap()
    }

    #[test]
    fn rollup_includes_empty_days() {
        let mut sheet = WeekSheet::new();
        let index = sheet.add_entry("Meeting", "Meeting");
        sheet
            .entry_mut(index)
            .unwrap()
            .day_mut(Weekday::Tue)
            .add_session(at("2024-06-04T09:00:00"), at("2024-06-04T11:00:00"))
            .unwrap();

        let rollup = Rollup::build(&sheet, at("2024-06-04T12:00:00"));

        assert_eq!(rollup.daily.len(), 7);
        assert_eq!(rollup.daily_hours(Weekday::Mon), 0.0);
        assert!((rollup.daily_hours(Weekday::Tue) - 2.0).abs() < 1e-9);
        assert_eq!(rollup.entries.len(), 1);
        assert_eq!(rollup.entries[0].days[1], rollup.daily_hours(Weekday::Tue));
        assert_eq!(rollup.weekly_hours, rollup.entries[0].total_hours);
    }

    #[test]
    fn rollup_of_empty_sheet_is_zero() {
        let now = at("2024-06-04T12:00:00");
        let rollup = Rollup::build(&WeekSheet::new(), now);
        assert_eq!(rollup.at, now);
        assert!(rollup.entries.is_empty());
        assert_eq!(rollup.weekly_hours, 0.0);
        assert!(rollup.daily.iter().all(|total| total.hours == 0.0));
    }

    #[test]
    fn rollup_reads_running_timer_live() {
        let mut sheet = WeekSheet::new();
        let index = sheet.add_entry("Meeting", "Meeting");
        sheet
            .entry_mut(index)
            .unwrap()
            .day_mut(Weekday::Mon)
            .start_running(at("2024-06-03T09:00:00"))
            .unwrap();

        let early = Rollup::build(&sheet, at("2024-06-03T09:30:00"));
        let later = Rollup::build(&sheet, at("2024-06-03T10:00:00"));

        assert_eq!(early.at, at("2024-06-03T09:30:00"));
        assert!((early.weekly_hours - 0.5).abs() < 1e-9);
        assert!((later.weekly_hours - 1.0).abs() < 1e-9);
    }
}
