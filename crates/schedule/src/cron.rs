//! 5-field cron expression parsing and matching.
//!
//! Fields: minute hour day-of-month month day-of-week. Supports `*`,
//! lists (`1,15`), ranges (`9-17`), and steps (`*/5`, `10-30/10`).

use chrono::{DateTime, Datelike, Timelike, Utc};

/// A parsed cron expression; each field holds the expanded set of matching
/// values.
#[derive(Debug, Clone)]
pub struct CronExpr {
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days_of_month: Vec<u32>,
    months: Vec<u32>,
    days_of_week: Vec<u32>,
}

impl CronExpr {
    /// Parse a standard 5-field expression.
    pub fn parse(expr: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!(
                "expected 5 cron fields (minute hour dom month dow), got {}",
                fields.len()
            ));
        }

        Ok(Self {
            minutes: parse_field(fields[0], 0, 59)?,
            hours: parse_field(fields[1], 0, 23)?,
            days_of_month: parse_field(fields[2], 1, 31)?,
            months: parse_field(fields[3], 1, 12)?,
            days_of_week: parse_field(fields[4], 0, 6)?,
        })
    }

    /// Whether the expression matches the given instant (minute precision).
    pub fn matches(&self, dt: &DateTime<Utc>) -> bool {
        self.minutes.contains(&dt.minute())
            && self.hours.contains(&dt.hour())
            && self.days_of_month.contains(&dt.day())
            && self.months.contains(&dt.month())
            && self
                .days_of_week
                .contains(&dt.weekday().num_days_from_sunday())
    }
}

fn parse_field(field: &str, min: u32, max: u32) -> Result<Vec<u32>, String> {
    let mut values = Vec::new();

    for part in field.split(',') {
        let (range_part, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid step in '{part}'"))?;
                if step == 0 {
                    return Err(format!("step must be positive in '{part}'"));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (start, end) = parse_range(range_part, min, max)?;
        let mut value = start;
        while value <= end {
            if !values.contains(&value) {
                values.push(value);
            }
            value += step;
        }
    }

    values.sort_unstable();
    Ok(values)
}

fn parse_range(s: &str, min: u32, max: u32) -> Result<(u32, u32), String> {
    if s == "*" {
        return Ok((min, max));
    }

    if let Some((start, end)) = s.split_once('-') {
        let start: u32 = start.parse().map_err(|_| format!("invalid range '{s}'"))?;
        let end: u32 = end.parse().map_err(|_| format!("invalid range '{s}'"))?;
        if start > end || start < min || end > max {
            return Err(format!("range '{s}' out of bounds {min}-{max}"));
        }
        return Ok((start, end));
    }

    let value: u32 = s.parse().map_err(|_| format!("invalid value '{s}'"))?;
    if value < min || value > max {
        return Err(format!("value {value} out of bounds {min}-{max}"));
    }
    Ok((value, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn every_minute() {
        let expr = CronExpr::parse("* * * * *").unwrap();
        assert!(expr.matches(&at(2026, 3, 1, 12, 30)));
        assert!(expr.matches(&at(2026, 12, 31, 23, 59)));
    }

    #[test]
    fn specific_time() {
        let expr = CronExpr::parse("0 9 * * *").unwrap();
        assert!(expr.matches(&at(2026, 3, 1, 9, 0)));
        assert!(!expr.matches(&at(2026, 3, 1, 9, 1)));
        assert!(!expr.matches(&at(2026, 3, 1, 10, 0)));
    }

    #[test]
    fn steps_and_lists() {
        let expr = CronExpr::parse("*/15 * * * *").unwrap();
        for minute in [0, 15, 30, 45] {
            assert!(expr.matches(&at(2026, 1, 1, 0, minute)));
        }
        assert!(!expr.matches(&at(2026, 1, 1, 0, 7)));

        let expr = CronExpr::parse("5,35 8-10 * * *").unwrap();
        assert!(expr.matches(&at(2026, 1, 1, 9, 35)));
        assert!(!expr.matches(&at(2026, 1, 1, 11, 5)));
    }

    #[test]
    fn day_of_week() {
        // 2026-03-01 is a Sunday (dow 0).
        let expr = CronExpr::parse("0 9 * * 0").unwrap();
        assert!(expr.matches(&at(2026, 3, 1, 9, 0)));
        assert!(!expr.matches(&at(2026, 3, 2, 9, 0)));
    }

    #[test]
    fn ranged_step() {
        let expr = CronExpr::parse("10-30/10 * * * *").unwrap();
        for minute in [10, 20, 30] {
            assert!(expr.matches(&at(2026, 1, 1, 0, minute)));
        }
        assert!(!expr.matches(&at(2026, 1, 1, 0, 40)));
    }

    #[test]
    fn invalid_expressions_rejected() {
        assert!(CronExpr::parse("* * * *").is_err()); // 4 fields
        assert!(CronExpr::parse("61 * * * *").is_err()); // out of bounds
        assert!(CronExpr::parse("* 25 * * *").is_err());
        assert!(CronExpr::parse("*/0 * * * *").is_err()); // zero step
        assert!(CronExpr::parse("9-5 * * * *").is_err()); // inverted range
        assert!(CronExpr::parse("a * * * *").is_err());
    }
}
