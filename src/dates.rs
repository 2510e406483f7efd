use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

pub const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Monday on or before `date`.
pub fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub fn weekday_of(at: NaiveDateTime) -> Weekday {
    at.date().weekday()
}

pub fn day_index(weekday: Weekday) -> usize {
    weekday.num_days_from_monday() as usize
}

pub fn weekday_label(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "MON",
        Weekday::Tue => "TUE",
        Weekday::Wed => "WED",
        Weekday::Thu => "THU",
        Weekday::Fri => "FRI",
        Weekday::Sat => "SAT",
        Weekday::Sun => "SUN",
    }
}

/// Elapsed hours between two instants, never negative.
///
/// Both closed sessions and the open timer go through this so a total read
/// just before a stop matches the total read just after it.
pub fn hours_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    let millis = (end - start).num_milliseconds().max(0);
    millis as f64 / MILLIS_PER_HOUR
}

pub fn week_label(week_start: NaiveDate) -> String {
    let week = week_start.iso_week();
    let week_end = week_start + Duration::days(6);
    format!(
        "W{:02} {} ({} → {})",
        week.week(),
        week.year(),
        week_start.format("%Y-%m-%d"),
        week_end.format("%Y-%m-%d")
    )
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| "Invalid date format. Use YYYY-MM-DD.".to_string())
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
        .map_err(|err| format!("Invalid timestamp {value:?}: {err}"))
}

/// Serde adapter for an optional local-naive ISO timestamp.
pub(crate) mod optional_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(at) => serializer.serialize_some(&super::format_timestamp(*at)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|value| super::parse_timestamp(&value).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(value: &str) -> NaiveDateTime {
        parse_timestamp(value).unwrap()
    }

    #[test]
    fn monday_of_normalizes_every_weekday() {
        let monday = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        for offset in 0..7 {
            let date = monday + Duration::days(offset);
            assert_eq!(monday_of(date), monday);
        }
        let next_monday = monday + Duration::days(7);
        assert_eq!(monday_of(next_monday), next_monday);
    }

    #[test]
    fn weekday_of_uses_the_calendar_date() {
        assert_eq!(weekday_of(at("2024-06-05T23:59:59")), Weekday::Wed);
        assert_eq!(day_index(Weekday::Mon), 0);
        assert_eq!(day_index(Weekday::Sun), 6);
    }

    #[test]
    fn hours_between_handles_fractions_and_clamps() {
        let start = at("2024-06-03T09:00:00");
        assert!((hours_between(start, at("2024-06-03T10:15:00")) - 1.25).abs() < 1e-9);
        assert_eq!(hours_between(at("2024-06-03T10:00:00"), start), 0.0);
    }

    #[test]
    fn timestamps_accept_optional_fraction() {
        let plain = at("2024-06-03T09:00:00");
        assert_eq!(format_timestamp(plain), "2024-06-03T09:00:00");
        let fractional = at("2024-06-03T09:00:00.250000");
        assert_eq!(format_timestamp(fractional), "2024-06-03T09:00:00.250");
        assert!(parse_timestamp("2024-06-03 09:00").is_err());
    }

    #[test]
    fn week_label_spans_monday_to_sunday() {
        let label = week_label(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
        assert_eq!(label, "W23 2024 (2024-06-03 → 2024-06-09)");
    }

    #[test]
    fn parse_date_invalid() {
        assert!(parse_date("03-06-2024").is_err());
        assert_eq!(
            parse_date("2024-06-03").unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
        );
    }
}
