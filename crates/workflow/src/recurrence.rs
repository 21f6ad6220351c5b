//! Recurrence specs and next-run arithmetic.
//!
//! Recognized specs (case-insensitive, surrounding whitespace ignored):
//!
//! | spec | interval |
//! |---|---|
//! | `""`, `once` | one-shot |
//! | `minutely`, `hourly`, `daily`, `weekly` | fixed |
//! | `every_N_minute(s)`, `every_N_hour(s)`, `every_N_day(s)` | N × unit |
//!
//! Anything else, including `N = 0`, is one-shot.

use chrono::{DateTime, TimeDelta, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    Once,
    Every(TimeDelta),
}

impl Recurrence {
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim().to_ascii_lowercase();
        let interval = match spec.as_str() {
            "" | "once" => None,
            "minutely" => TimeDelta::try_minutes(1),
            "hourly" => TimeDelta::try_hours(1),
            "daily" => TimeDelta::try_days(1),
            "weekly" => TimeDelta::try_weeks(1),
            other => parse_every(other),
        };

        match interval {
            Some(d) if d > TimeDelta::zero() => Recurrence::Every(d),
            _ => Recurrence::Once,
        }
    }

    pub fn interval(&self) -> Option<TimeDelta> {
        match self {
            Recurrence::Once => None,
            Recurrence::Every(d) => Some(*d),
        }
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self, Recurrence::Every(_))
    }
}

fn parse_every(spec: &str) -> Option<TimeDelta> {
    let rest = spec.strip_prefix("every_")?;
    let (count, unit) = rest.split_once('_')?;
    let n: i64 = count.parse().ok()?;

    match unit {
        "minute" | "minutes" => TimeDelta::try_minutes(n),
        "hour" | "hours" => TimeDelta::try_hours(n),
        "day" | "days" => TimeDelta::try_days(n),
        _ => None,
    }
}

/// The first `run_at + k·interval` (k ≥ 1) strictly after `now`, or `None`
/// when that instant is past the representable range.
pub fn next_run(
    run_at: DateTime<Utc>,
    now: DateTime<Utc>,
    interval: TimeDelta,
) -> Option<DateTime<Utc>> {
    let mut candidate = run_at.checked_add_signed(interval)?;
    if candidate > now {
        return Some(candidate);
    }

    // Jump close to `now` instead of stepping one interval at a time.
    let step_ms = interval.num_milliseconds().max(1);
    let behind_ms = (now - candidate).num_milliseconds();
    let steps = behind_ms / step_ms;
    if let Some(jump) = interval.checked_mul(i32::try_from(steps).unwrap_or(i32::MAX)) {
        candidate = candidate.checked_add_signed(jump)?;
    }

    while candidate <= now {
        candidate = candidate.checked_add_signed(interval)?;
    }
    Some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn named_intervals() {
        assert_eq!(Recurrence::parse("minutely").interval(), Some(TimeDelta::minutes(1)));
        assert_eq!(Recurrence::parse(" Hourly ").interval(), Some(TimeDelta::hours(1)));
        assert_eq!(Recurrence::parse("DAILY").interval(), Some(TimeDelta::days(1)));
        assert_eq!(Recurrence::parse("weekly").interval(), Some(TimeDelta::weeks(1)));
    }

    #[test]
    fn every_n_units() {
        assert_eq!(Recurrence::parse("every_5_minutes").interval(), Some(TimeDelta::minutes(5)));
        assert_eq!(Recurrence::parse("every_1_minute").interval(), Some(TimeDelta::minutes(1)));
        assert_eq!(Recurrence::parse("every_2_hours").interval(), Some(TimeDelta::hours(2)));
        assert_eq!(Recurrence::parse("every_3_days").interval(), Some(TimeDelta::days(3)));
    }

    #[test]
    fn one_shot_specs() {
        for spec in [
            "",
            "once",
            "every_0_minutes",
            "every_-5_minutes",
            "every_x_hours",
            "every_5_fortnights",
            "monthly",
            "every_5",
        ] {
            assert_eq!(Recurrence::parse(spec), Recurrence::Once, "spec {spec:?}");
        }
    }

    #[test]
    fn next_run_is_one_interval_when_not_behind() {
        let hour = TimeDelta::hours(1);
        assert_eq!(next_run(at(9, 0, 0), at(9, 0, 10), hour), Some(at(10, 0, 0)));
    }

    #[test]
    fn next_run_skips_missed_boundaries() {
        // run_at = now - 90s, hourly: first boundary after now is run_at + 1h.
        let now = at(12, 0, 0);
        let run_at = now - TimeDelta::seconds(90);
        assert_eq!(
            next_run(run_at, now, TimeDelta::hours(1)),
            Some(run_at + TimeDelta::hours(1))
        );

        // Three and a half hours behind.
        let run_at = at(8, 30, 0);
        assert_eq!(next_run(run_at, now, TimeDelta::hours(1)), Some(at(12, 30, 0)));
    }

    #[test]
    fn next_run_exact_boundary_is_not_now() {
        let now = at(12, 0, 0);
        assert_eq!(next_run(at(11, 0, 0), now, TimeDelta::hours(1)), Some(at(13, 0, 0)));
    }

    #[test]
    fn next_run_stays_on_grid() {
        let run_at = at(0, 0, 7);
        let interval = TimeDelta::minutes(7);
        for offset_secs in [0, 1, 419, 420, 421, 86_399] {
            let now = run_at + TimeDelta::seconds(offset_secs);
            let next = next_run(run_at, now, interval).unwrap();
            assert!(next > now);
            assert!(next - interval <= now);
            assert_eq!((next - run_at).num_seconds() % interval.num_seconds(), 0);
        }
    }

    #[test]
    fn next_run_out_of_range_is_none() {
        let huge = Recurrence::parse("every_100000000_days").interval().unwrap();
        assert_eq!(next_run(at(11, 58, 30), at(12, 0, 0), huge), None);
    }
}
