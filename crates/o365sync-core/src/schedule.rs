//! Schedule helpers
//!
//! The job itself is triggered by an external scheduler. This module only
//! parses the schedule settings, enforces the optional start window, and
//! renders the cron expression an installer registers.
//!
//! Overlapping invocations are not guarded against: the scheduler is
//! expected to start at most one run at a time.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::config::{ScheduleConfig, SchedulePeriod};
use crate::error::{Error, Result};

/// Parse a 24-hour `H:MM` / `HH:MM` time
///
/// Fails with tag 1021 on a malformed value and 1022 on an out-of-range
/// hour or minute.
pub fn parse_clock_time(field: &str, text: &str) -> Result<NaiveTime> {
    let malformed = || {
        Error::validation(
            1021,
            format!(
                "Schedule \"{}\" value must be a valid 24-hour time (ex. 14:30)",
                field
            ),
        )
    };

    let (hour, minute) = text.split_once(':').ok_or_else(malformed)?;
    if hour.is_empty()
        || hour.len() > 2
        || minute.len() != 2
        || !hour.bytes().all(|b| b.is_ascii_digit())
        || !minute.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(malformed());
    }

    let hour: u32 = hour.parse().map_err(|_| malformed())?;
    let minute: u32 = minute.parse().map_err(|_| malformed())?;

    if hour > 23 {
        return Err(Error::validation(
            1022,
            format!(
                "Schedule \"{}\" hour value must be a valid 24-hour integer between 0 and 23",
                field
            ),
        ));
    }
    if minute > 59 {
        return Err(Error::validation(
            1022,
            format!(
                "Schedule \"{}\" minute value must be a valid integer between 0 and 59",
                field
            ),
        ));
    }

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(malformed)
}

/// Parse a `m/d/Y` start date (tag 1023)
pub fn parse_start_date(text: &str) -> Result<NaiveDate> {
    let malformed = || {
        Error::validation(
            1023,
            "Schedule \"start_date\" value must be in month/day/year format (ex. 03/29/2021)",
        )
    };

    let parts: Vec<&str> = text.split('/').collect();
    let [month, day, year] = parts.as_slice() else {
        return Err(malformed());
    };

    let digits = |s: &str, min: usize, max: usize| {
        (min..=max).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
    };
    if !digits(month, 1, 2) || !digits(day, 1, 2) || !digits(year, 4, 4) {
        return Err(malformed());
    }

    let month: u32 = month.parse().map_err(|_| malformed())?;
    let day: u32 = day.parse().map_err(|_| malformed())?;
    let year: i32 = year.parse().map_err(|_| malformed())?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(malformed)
}

/// Earliest local date/time at which runs may proceed, if one is configured
///
/// An empty `start_time` means midnight.
pub fn start_window(schedule: &ScheduleConfig) -> Result<Option<NaiveDateTime>> {
    if schedule.start_date.is_empty() {
        return Ok(None);
    }

    let date = parse_start_date(&schedule.start_date)?;
    let time = if schedule.start_time.is_empty() {
        NaiveTime::MIN
    } else {
        parse_clock_time("start_time", &schedule.start_time)?
    };

    Ok(Some(date.and_time(time)))
}

/// Fail with [`Error::ScheduleGate`] when `now` precedes the start window
pub fn check_start_window(schedule: &ScheduleConfig, now: NaiveDateTime) -> Result<()> {
    match start_window(schedule)? {
        Some(start) if start > now => Err(Error::schedule_gate(format!(
            "runs are enabled from {} (now {})",
            start.format("%Y-%m-%d %H:%M"),
            now.format("%Y-%m-%d %H:%M")
        ))),
        _ => Ok(()),
    }
}

/// Five-field cron expression for the configured period
///
/// Weekly runs use `run_date` as day of week, monthly runs as day of month.
pub fn cron_expression(schedule: &ScheduleConfig) -> Result<String> {
    let time = parse_clock_time("run_time", &schedule.run_time)?;
    let (hour, minute) = (time.hour(), time.minute());

    Ok(match schedule.periods {
        SchedulePeriod::Weekly => format!("{} {} * * {}", minute, hour, schedule.run_date),
        SchedulePeriod::Monthly => format!("{} {} {} * *", minute, hour, schedule.run_date),
    })
}
