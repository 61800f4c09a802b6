//! Recurrence rules and fire-time arithmetic.
//!
//! All times are local wall-clock `NaiveDateTime`s: "every day at 09:00"
//! means 09:00 on the clock of the machine running the bot.

use std::{str::FromStr, time::Duration};

use chrono::{Datelike, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc, Weekday};

use crate::ScheduleError;

/// When a task fires again after it has fired once.
#[derive(Debug, Clone)]
pub enum Recurrence {
    /// Fire once, then drop the task.
    Once,
    /// Fire at a fixed interval.
    Every(TimeDelta),
    /// Fire every day at the given time.
    DailyAt(NaiveTime),
    /// Fire every week on the given weekday and time.
    WeeklyAt(Weekday, NaiveTime),
    /// Fire on every occurrence of a cron expression.
    Cron(Box<cron::Schedule>),
}

impl Recurrence {
    /// Fixed-interval recurrence.
    ///
    /// # Errors
    /// Returns [`ScheduleError::InvalidInterval`] for a zero or
    /// out-of-range interval.
    pub fn every(interval: Duration) -> Result<Self, ScheduleError> {
        match TimeDelta::from_std(interval) {
            Ok(delta) if delta > TimeDelta::zero() => Ok(Self::Every(delta)),
            _ => Err(ScheduleError::InvalidInterval(interval)),
        }
    }

    /// Daily recurrence at `hour:minute:second`.
    ///
    /// # Errors
    /// Returns [`ScheduleError::InvalidTime`] if the time does not exist.
    pub fn daily(hour: u32, minute: u32, second: u32) -> Result<Self, ScheduleError> {
        Ok(Self::DailyAt(time_of_day(hour, minute, second)?))
    }

    /// Weekly recurrence on `weekday` at `hour:minute:second`.
    ///
    /// # Errors
    /// Returns [`ScheduleError::InvalidTime`] if the time does not exist.
    pub fn weekly(
        weekday: Weekday,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> Result<Self, ScheduleError> {
        Ok(Self::WeeklyAt(weekday, time_of_day(hour, minute, second)?))
    }

    /// Cron recurrence.
    ///
    /// Five-field expressions are read as standard Unix cron: they get a
    /// leading `0` seconds field, and day-of-week numbers count from Sunday
    /// as `0` (or `7`). Six- and seven-field expressions go to the `cron`
    /// crate untouched, so their day numbers count from Sunday as `1`.
    ///
    /// # Errors
    /// Returns [`ScheduleError::Cron`] if the expression does not parse.
    pub fn cron(expr: &str) -> Result<Self, ScheduleError> {
        let expr = expr.trim();
        let invalid = |reason: String| ScheduleError::Cron {
            expr: expr.to_string(),
            reason,
        };
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let full = if let [minute, hour, day, month, weekday] = fields[..] {
            let weekday = unix_weekdays(weekday).map_err(invalid)?;
            format!("0 {minute} {hour} {day} {month} {weekday}")
        } else {
            expr.to_string()
        };
        cron::Schedule::from_str(&full)
            .map(|s| Self::Cron(Box::new(s)))
            .map_err(|e| invalid(e.to_string()))
    }

    /// First fire time for a task created at `now` with the given start
    /// delay. The delay only applies to `Once` and `Every`.
    #[must_use]
    pub fn first_fire(&self, now: NaiveDateTime, delay: TimeDelta) -> Option<NaiveDateTime> {
        match self {
            Self::Once | Self::Every(_) => now.checked_add_signed(delay),
            Self::DailyAt(time) => {
                let today = now.date().and_time(*time);
                if today < now {
                    today.checked_add_signed(TimeDelta::days(1))
                } else {
                    Some(today)
                }
            }
            Self::WeeklyAt(weekday, time) => {
                let mut date = now.date();
                while date.and_time(*time) < now || date.weekday() != *weekday {
                    date = date.succ_opt()?;
                }
                Some(date.and_time(*time))
            }
            Self::Cron(schedule) => cron_after(schedule, now),
        }
    }

    /// Next fire time after a fire at `fired`, or `None` if the task is done.
    #[must_use]
    pub fn next_after(&self, fired: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Self::Once => None,
            Self::Every(interval) => fired.checked_add_signed(*interval),
            Self::DailyAt(_) => fired.checked_add_signed(TimeDelta::days(1)),
            Self::WeeklyAt(..) => fired.checked_add_signed(TimeDelta::weeks(1)),
            Self::Cron(schedule) => cron_after(schedule, fired),
        }
    }
}

fn time_of_day(hour: u32, minute: u32, second: u32) -> Result<NaiveTime, ScheduleError> {
    NaiveTime::from_hms_opt(hour, minute, second).ok_or(ScheduleError::InvalidTime {
        hour,
        minute,
        second,
    })
}

const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Rewrite a Unix day-of-week field (`0`-`7`, Sunday at both ends) as an
/// explicit list of the `cron` crate's day numbers (Sunday is `1`).
fn unix_weekdays(field: &str) -> Result<String, String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }

    let mut days = [false; 7];
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| format!("invalid day-of-week step {step:?}"))?;
                if step == 0 {
                    return Err("day-of-week step must be positive".to_string());
                }
                (range, Some(step))
            }
            None => (item, None),
        };
        let (first, last) = match range.split_once('-') {
            _ if range == "*" => (0, 6),
            Some((first, last)) => (unix_weekday(first)?, unix_weekday(last)?),
            None => {
                let day = unix_weekday(range)?;
                // `5/2` runs to the end of the week.
                (day, if step.is_some() { 6 } else { day })
            }
        };
        if first > last {
            return Err(format!("day-of-week range {range:?} runs backwards"));
        }
        for day in (first..=last).step_by(step.unwrap_or(1) as usize) {
            days[day as usize % 7] = true;
        }
    }

    let list: Vec<String> = (0..7u32)
        .filter(|&day| days[day as usize])
        .map(|day| (day + 1).to_string())
        .collect();
    Ok(list.join(","))
}

/// A single Unix weekday: a number `0`-`7` or a three-letter name.
fn unix_weekday(token: &str) -> Result<u32, String> {
    if let Ok(day) = token.parse::<u32>() {
        return if day <= 7 {
            Ok(day)
        } else {
            Err(format!("day-of-week {day} out of range"))
        };
    }
    WEEKDAY_NAMES
        .iter()
        .zip(0..)
        .find(|(name, _)| name.eq_ignore_ascii_case(token))
        .map(|(_, day)| day)
        .ok_or_else(|| format!("invalid day-of-week {token:?}"))
}

// Wall-clock times are fed through UTC so the cron crate does no zone
// conversion of its own.
fn cron_after(schedule: &cron::Schedule, after: NaiveDateTime) -> Option<NaiveDateTime> {
    schedule
        .after(&Utc.from_utc_datetime(&after))
        .next()
        .map(|dt| dt.naive_utc())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    // 2024-01-01 is a Monday.
    const MON: (i32, u32, u32) = (2024, 1, 1);

    #[test]
    fn test_weekly_from_monday_fires_next_wednesday() {
        let rule = Recurrence::weekly(Weekday::Wed, 9, 0, 0).unwrap();
        let now = at(MON.0, MON.1, MON.2, 12, 0, 0);
        assert_eq!(
            rule.first_fire(now, TimeDelta::zero()),
            Some(at(2024, 1, 3, 9, 0, 0))
        );
    }

    #[test]
    fn test_weekly_exact_match_fires_immediately() {
        let rule = Recurrence::weekly(Weekday::Wed, 9, 0, 0).unwrap();
        let now = at(2024, 1, 3, 9, 0, 0);
        assert_eq!(rule.first_fire(now, TimeDelta::zero()), Some(now));
    }

    #[test]
    fn test_weekly_just_missed_waits_a_week() {
        let rule = Recurrence::weekly(Weekday::Wed, 9, 0, 0).unwrap();
        let now = at(2024, 1, 3, 9, 0, 1);
        assert_eq!(
            rule.first_fire(now, TimeDelta::zero()),
            Some(at(2024, 1, 10, 9, 0, 0))
        );
        assert_eq!(
            rule.next_after(at(2024, 1, 10, 9, 0, 0)),
            Some(at(2024, 1, 17, 9, 0, 0))
        );
    }

    #[test]
    fn test_daily_today_or_tomorrow() {
        let rule = Recurrence::daily(8, 30, 0).unwrap();
        assert_eq!(
            rule.first_fire(at(2024, 1, 1, 7, 0, 0), TimeDelta::zero()),
            Some(at(2024, 1, 1, 8, 30, 0))
        );
        assert_eq!(
            rule.first_fire(at(2024, 1, 1, 9, 0, 0), TimeDelta::zero()),
            Some(at(2024, 1, 2, 8, 30, 0))
        );
        assert_eq!(
            rule.next_after(at(2024, 1, 2, 8, 30, 0)),
            Some(at(2024, 1, 3, 8, 30, 0))
        );
    }

    #[test]
    fn test_every_reschedules_by_interval() {
        let rule = Recurrence::every(Duration::from_secs(60)).unwrap();
        let t = at(2024, 1, 1, 0, 0, 0);
        assert_eq!(rule.next_after(t), Some(at(2024, 1, 1, 0, 1, 0)));
        assert_eq!(
            rule.first_fire(t, TimeDelta::seconds(5)),
            Some(at(2024, 1, 1, 0, 0, 5))
        );
    }

    #[test]
    fn test_once_has_no_next() {
        let t = at(2024, 1, 1, 0, 0, 0);
        assert_eq!(Recurrence::Once.first_fire(t, TimeDelta::zero()), Some(t));
        assert_eq!(Recurrence::Once.next_after(t), None);
    }

    #[test]
    fn test_five_field_cron_gets_seconds() {
        let rule = Recurrence::cron("30 9 * * *").unwrap();
        let t = at(2024, 1, 1, 9, 30, 0);
        // Strictly after the given time.
        assert_eq!(rule.next_after(t), Some(at(2024, 1, 2, 9, 30, 0)));
        assert_eq!(
            rule.first_fire(at(2024, 1, 1, 0, 0, 0), TimeDelta::zero()),
            Some(t)
        );
    }

    #[test]
    fn test_five_field_weekdays_count_from_sunday() {
        let monday = at(MON.0, MON.1, MON.2, 0, 0, 0);

        let rule = Recurrence::cron("0 9 * * 1").unwrap();
        assert_eq!(rule.next_after(monday), Some(at(2024, 1, 1, 9, 0, 0)));

        let rule = Recurrence::cron("* * * * 1").unwrap();
        assert_eq!(rule.next_after(monday), Some(at(2024, 1, 1, 0, 1, 0)));

        for sunday in ["0 9 * * 0", "0 9 * * 7", "0 9 * * sun"] {
            let rule = Recurrence::cron(sunday).unwrap();
            assert_eq!(
                rule.next_after(monday),
                Some(at(2024, 1, 7, 9, 0, 0)),
                "{sunday}"
            );
        }
    }

    #[test]
    fn test_five_field_weekday_ranges_and_lists() {
        // Friday evening: the next weekday run is Monday.
        let friday = at(2024, 1, 5, 18, 0, 0);
        let rule = Recurrence::cron("0 9 * * 1-5").unwrap();
        assert_eq!(rule.next_after(friday), Some(at(2024, 1, 8, 9, 0, 0)));

        let rule = Recurrence::cron("0 9 * * 6,0").unwrap();
        assert_eq!(rule.next_after(friday), Some(at(2024, 1, 6, 9, 0, 0)));
        assert_eq!(
            rule.next_after(at(2024, 1, 6, 9, 0, 0)),
            Some(at(2024, 1, 7, 9, 0, 0))
        );

        // 5-7 wraps onto Sunday.
        let rule = Recurrence::cron("0 9 * * 5-7").unwrap();
        assert_eq!(
            rule.next_after(at(2024, 1, 6, 9, 0, 0)),
            Some(at(2024, 1, 7, 9, 0, 0))
        );

        // Every other day from Monday: Mon, Wed, Fri.
        let rule = Recurrence::cron("0 9 * * 1-5/2").unwrap();
        assert_eq!(
            rule.next_after(at(2024, 1, 1, 9, 0, 0)),
            Some(at(2024, 1, 3, 9, 0, 0))
        );
    }

    #[test]
    fn test_unix_weekday_translation() {
        assert_eq!(unix_weekdays("*").unwrap(), "*");
        assert_eq!(unix_weekdays("0").unwrap(), "1");
        assert_eq!(unix_weekdays("1-5").unwrap(), "2,3,4,5,6");
        assert_eq!(unix_weekdays("MON-FRI").unwrap(), "2,3,4,5,6");
        assert_eq!(unix_weekdays("*/3").unwrap(), "1,4,7");
        assert_eq!(unix_weekdays("0-7").unwrap(), "1,2,3,4,5,6,7");
        assert!(unix_weekdays("8").is_err());
        assert!(unix_weekdays("5-1").is_err());
        assert!(unix_weekdays("*/0").is_err());
        assert!(unix_weekdays("funday").is_err());
    }

    #[test]
    fn test_six_field_cron_is_kept() {
        let rule = Recurrence::cron("*/10 * * * * *").unwrap();
        assert_eq!(
            rule.next_after(at(2024, 1, 1, 0, 0, 0)),
            Some(at(2024, 1, 1, 0, 0, 10))
        );
    }

    #[test]
    fn test_invalid_rules_are_rejected() {
        assert!(matches!(
            Recurrence::every(Duration::ZERO),
            Err(ScheduleError::InvalidInterval(_))
        ));
        assert!(matches!(
            Recurrence::daily(24, 0, 0),
            Err(ScheduleError::InvalidTime { hour: 24, .. })
        ));
        assert!(matches!(
            Recurrence::cron("not a cron"),
            Err(ScheduleError::Cron { .. })
        ));
    }
}
