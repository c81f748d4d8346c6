use std::collections::HashMap;

use chrono::{NaiveDateTime, TimeDelta};

/// Converts an iterator of column names to a `--format` argument
pub fn format_string<'a, I, S>(iter: I) -> String
where
    I: Iterator<Item = &'a S>,
    S: ?Sized + AsRef<str> + 'a,
{
    let columns = iter.map(|v| v.as_ref()).collect::<Vec<_>>().join(",");

    format!("--format={}", columns)
}

/// Converts relative dates such as `d=2,h=1` (2 days and 1 hour ago) into a
/// timestamp understood by sacct. Units are weeks, days, hours and minutes;
/// unknown units and invalid amounts are ignored.
pub fn parse_date(value: &str, now: NaiveDateTime) -> String {
    let mut amounts = HashMap::new();

    for arg in value.split(',') {
        let mut tokens = arg.split('=');
        let (Some(unit), Some(amount)) = (tokens.next(), tokens.next()) else {
            continue;
        };

        let unit = match unit {
            "w" | "W" => "weeks".to_string(),
            "d" | "D" => "days".to_string(),
            "h" | "H" => "hours".to_string(),
            "m" | "M" => "minutes".to_string(),
            unit => unit.to_lowercase(),
        };

        if let Ok(amount) = amount.trim().parse::<i64>() {
            amounts.insert(unit, amount);
        }
    }

    let mut date = now;
    for (unit, amount) in amounts {
        let delta = match unit.as_str() {
            "weeks" => TimeDelta::try_weeks(amount),
            "days" => TimeDelta::try_days(amount),
            "hours" => TimeDelta::try_hours(amount),
            "minutes" => TimeDelta::try_minutes(amount),
            _ => None,
        };

        if let Some(earlier) = delta.and_then(|delta| date.checked_sub_signed(delta)) {
            date = earlier;
        }
    }

    date.format("%Y-%m-%dT%H:%M").to_string()
}
