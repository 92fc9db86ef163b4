use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::scan::run_reindex;
use crate::state::AppState;

#[derive(Debug)]
pub enum ScheduleError {
    Empty,
    Cron(String, cron::error::Error),
    Interval(String),
}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleError::Empty => write!(f, "empty schedule"),
            ScheduleError::Cron(expr, err) => {
                write!(f, "invalid cron expression {:?}: {}", expr, err)
            }
            ScheduleError::Interval(expr) => write!(f, "invalid interval {:?}", expr),
        }
    }
}

impl std::error::Error for ScheduleError {}

#[derive(Clone, Debug)]
pub enum IndexSchedule {
    Cron(Box<cron::Schedule>),
    Every(Duration),
}

impl IndexSchedule {
    /// Accepts classic 5-field cron, 6/7-field cron with seconds, `@daily`
    /// style shortcuts, or `@every 30m`.
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(ScheduleError::Empty);
        }
        if let Some(interval) = expr.strip_prefix("@every") {
            return parse_interval(interval.trim())
                .map(IndexSchedule::Every)
                .ok_or_else(|| ScheduleError::Interval(expr.to_string()));
        }

        let normalized = normalize_cron(expr);
        cron::Schedule::from_str(&normalized)
            .map(|schedule| IndexSchedule::Cron(Box::new(schedule)))
            .map_err(|err| ScheduleError::Cron(expr.to_string(), err))
    }

    /// Time to wait from `now` until the next tick.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            IndexSchedule::Every(interval) => Some(*interval),
            IndexSchedule::Cron(schedule) => {
                let next = schedule.after(&now).next()?;
                (next - now).to_std().ok()
            }
        }
    }
}

/// Five-field expressions get a leading seconds field, and their numeric
/// day-of-week values move from 0=Sunday to the 1=Sunday numbering the
/// parser expects.
fn normalize_cron(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return fields.join(" ");
    }
    format!(
        "0 {} {} {} {} {}",
        fields[0],
        fields[1],
        fields[2],
        fields[3],
        translate_day_of_week(fields[4])
    )
}

fn translate_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(|part| {
            let (base, step) = match part.split_once('/') {
                Some((base, step)) => (base, Some(step)),
                None => (part, None),
            };
            let base = match base.split_once('-') {
                Some((from, to)) => match (from.parse::<u32>(), to.parse::<u32>()) {
                    (Ok(from), Ok(7)) if from <= 7 => {
                        // `5-7` wraps through Sunday.
                        if from == 0 || from == 7 {
                            "1-7".to_string()
                        } else {
                            format!("{}-7,1", from + 1)
                        }
                    }
                    (Ok(from), Ok(to)) if from <= 6 && to <= 6 => {
                        format!("{}-{}", from + 1, to + 1)
                    }
                    _ => base.to_string(),
                },
                None => match base.parse::<u32>() {
                    Ok(day) if day <= 7 => (day % 7 + 1).to_string(),
                    _ => base.to_string(),
                },
            };
            match step {
                Some(step) => format!("{}/{}", base, step),
                None => base,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_interval(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value.find(|c: char| !c.is_ascii_digit())?;
    let (amount, unit) = value.split_at(split);
    let amount: u64 = amount.parse().ok()?;
    if amount == 0 {
        return None;
    }
    let secs = match unit.trim() {
        "s" => amount,
        "m" => amount.checked_mul(60)?,
        "h" => amount.checked_mul(60 * 60)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

/// Runs a reindex at every tick of `schedule` until the runtime shuts down.
pub fn spawn_scheduler(state: AppState, schedule: IndexSchedule, expr: String) -> JoinHandle<()> {
    info!("Starting scheduled reindex with schedule: {}", expr);
    tokio::spawn(async move {
        loop {
            let Some(delay) = schedule.next_delay(Utc::now()) else {
                warn!("Reindex schedule {:?} has no upcoming runs; stopping", expr);
                return;
            };
            tokio::time::sleep(delay).await;
            info!("Running scheduled reindex...");
            run_reindex(state.clone()).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn five_field_cron_gets_seconds() {
        assert_eq!(normalize_cron("*/15 * * * *"), "0 */15 * * * *");
        let schedule = IndexSchedule::parse("*/15 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 7, 30).unwrap();
        assert_eq!(
            schedule.next_delay(now),
            Some(Duration::from_secs(7 * 60 + 30))
        );
    }

    #[test]
    fn six_field_cron_is_used_as_is() {
        let schedule = IndexSchedule::parse("30 0 3 * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap();
        assert_eq!(schedule.next_delay(now), Some(Duration::from_secs(30)));
    }

    #[test]
    fn shortcuts_parse() {
        let schedule = IndexSchedule::parse("@hourly").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 3, 59, 0).unwrap();
        assert_eq!(schedule.next_delay(now), Some(Duration::from_secs(60)));
    }

    #[test]
    fn sunday_zero_maps_to_parser_numbering() {
        assert_eq!(translate_day_of_week("0"), "1");
        assert_eq!(translate_day_of_week("1-5"), "2-6");
        assert_eq!(translate_day_of_week("5-7"), "6-7,1");
        assert_eq!(translate_day_of_week("*/2"), "*/2");
        assert_eq!(translate_day_of_week("MON"), "MON");

        // 2024-01-06 is a Saturday; the next Sunday 00:00 is one day away.
        let schedule = IndexSchedule::parse("0 0 * * 0").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap();
        assert_eq!(
            schedule.next_delay(now),
            Some(Duration::from_secs(24 * 60 * 60))
        );
    }

    #[test]
    fn every_intervals() {
        let every = |expr: &str| match IndexSchedule::parse(expr).unwrap() {
            IndexSchedule::Every(d) => d,
            IndexSchedule::Cron(_) => panic!("expected interval"),
        };
        assert_eq!(every("@every 30s"), Duration::from_secs(30));
        assert_eq!(every("@every 10m"), Duration::from_secs(600));
        assert_eq!(every("@every 2h"), Duration::from_secs(7200));
    }

    #[test]
    fn invalid_schedules_are_rejected() {
        assert!(matches!(IndexSchedule::parse(""), Err(ScheduleError::Empty)));
        assert!(matches!(
            IndexSchedule::parse("@every 0m"),
            Err(ScheduleError::Interval(_))
        ));
        assert!(matches!(
            IndexSchedule::parse("@every soon"),
            Err(ScheduleError::Interval(_))
        ));
        assert!(matches!(
            IndexSchedule::parse("not a cron"),
            Err(ScheduleError::Cron(_, _))
        ));
    }
}
