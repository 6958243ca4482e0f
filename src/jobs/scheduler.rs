//! Time-of-day schedules.
//!
//! A job is due while the local time in its timezone lies inside the minute
//! that starts at its schedule time.

use jiff::civil::{Date, Time};
use jiff::tz::TimeZone;
use jiff::{SignedDuration, Timestamp};

/// Width of the window in which a scheduled job may fire
pub const FIRE_WINDOW: SignedDuration = SignedDuration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTime(Time);

impl ScheduleTime {
    pub fn time(&self) -> Time {
        self.0
    }

    fn start_on(&self, date: Date, tz: &TimeZone) -> Option<Timestamp> {
        date.to_datetime(self.0)
            .to_zoned(tz.clone())
            .ok()
            .map(|z| z.timestamp())
    }

    /// Local date on which the job is due at `now`, if `now` is in the window
    pub fn due_date(&self, tz: &TimeZone, now: Timestamp) -> Option<Date> {
        let date = now.to_zoned(tz.clone()).date();
        let start = self.start_on(date, tz)?;
        let elapsed = now.duration_since(start);
        (elapsed >= SignedDuration::ZERO && elapsed < FIRE_WINDOW).then_some(date)
    }

    /// First window start strictly after `now`
    pub fn next_after(&self, tz: &TimeZone, now: Timestamp) -> Option<Timestamp> {
        let today = now.to_zoned(tz.clone()).date();
        let start = self.start_on(today, tz)?;
        if start > now {
            return Some(start);
        }
        self.start_on(today.tomorrow().ok()?, tz)
    }
}

impl std::fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.0.hour(),
            self.0.minute(),
            self.0.second()
        )
    }
}

/// Parses `HH:MM` or `HH:MM:SS` (24-hour clock)
pub fn parse_schedule_time(value: &str) -> Result<ScheduleTime, String> {
    let invalid = || {
        format!(
            "Invalid schedule time '{}'. Expected HH:MM or HH:MM:SS",
            value
        )
    };

    let parts: Vec<&str> = value.trim().split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(invalid());
    }

    let mut numbers = [0i8; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        *slot = part.parse().map_err(|_| invalid())?;
    }

    Time::new(numbers[0], numbers[1], numbers[2], 0)
        .map(ScheduleTime)
        .map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokyo() -> TimeZone {
        TimeZone::get("Asia/Tokyo").unwrap()
    }

    fn ts(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_schedule_time() {
        assert_eq!(parse_schedule_time("02:00").unwrap().to_string(), "02:00:00");
        assert_eq!(parse_schedule_time("23:59:30").unwrap().to_string(), "23:59:30");
        assert_eq!(parse_schedule_time("4:30").unwrap().to_string(), "04:30:00");

        for bad in ["24:00", "12", "12:60", "aa:bb", "12:00:00:00", "-1:00", "", "120:00"] {
            assert!(parse_schedule_time(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_due_window_in_job_timezone() {
        let schedule = parse_schedule_time("02:00").unwrap();
        // 02:00 JST is 17:00 UTC the previous day
        assert!(schedule.due_date(&tokyo(), ts("2026-03-09T16:59:59Z")).is_none());
        assert_eq!(
            schedule.due_date(&tokyo(), ts("2026-03-09T17:00:00Z")),
            Some(jiff::civil::date(2026, 3, 10))
        );
        assert!(schedule.due_date(&tokyo(), ts("2026-03-09T17:00:59Z")).is_some());
        assert!(schedule.due_date(&tokyo(), ts("2026-03-09T17:01:00Z")).is_none());
    }

    #[test]
    fn test_next_after() {
        let schedule = parse_schedule_time("02:00").unwrap();
        assert_eq!(
            schedule.next_after(&tokyo(), ts("2026-03-09T12:00:00Z")),
            Some(ts("2026-03-09T17:00:00Z"))
        );
        assert_eq!(
            schedule.next_after(&tokyo(), ts("2026-03-09T17:00:00Z")),
            Some(ts("2026-03-10T17:00:00Z"))
        );
    }
}
