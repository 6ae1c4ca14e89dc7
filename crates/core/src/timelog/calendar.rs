//! Local calendar days expressed as UTC ranges.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

/// One calendar day in a given timezone, as an inclusive UTC range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub day: NaiveDate,
    pub timezone: Tz,
    pub start: DateTime<Utc>,
    /// Last representable instant of the day (one millisecond before the
    /// next local midnight).
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn for_date(day: NaiveDate, timezone: Tz) -> Self {
        let start = local_midnight(day, timezone);
        let next = day.checked_add_days(Days::new(1)).unwrap_or(day);
        let end = local_midnight(next, timezone) - TimeDelta::milliseconds(1);
        Self { day, timezone, start, end }
    }

    /// The local day containing `now`.
    pub fn containing(now: DateTime<Utc>, timezone: Tz) -> Self {
        Self::for_date(now.with_timezone(&timezone).date_naive(), timezone)
    }

    /// The local day before the one containing `now`; what a nightly run
    /// processes.
    pub fn previous_day(now: DateTime<Utc>, timezone: Tz) -> Self {
        let today = now.with_timezone(&timezone).date_naive();
        Self::for_date(today.pred_opt().unwrap_or(today), timezone)
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }

    pub fn clamp(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        instant.clamp(self.start, self.end)
    }
}

/// First existing local instant of `day`. Zones that skip midnight on a DST
/// switch start the day at the first valid hour.
fn local_midnight(day: NaiveDate, timezone: Tz) -> DateTime<Utc> {
    (0..=3)
        .filter_map(|hour| NaiveTime::from_hms_opt(hour, 0, 0))
        .find_map(|time| timezone.from_local_datetime(&day.and_time(time)).earliest())
        .map_or_else(
            || Utc.from_utc_datetime(&day.and_time(NaiveTime::default())),
            |local| local.with_timezone(&Utc),
        )
}

#[cfg(test)]
mod tests {
    use chrono_tz::Europe::Paris;

    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).single().expect("valid timestamp")
    }

    #[test]
    fn previous_day_uses_local_calendar() {
        // 01:30 UTC on the 5th is 02:30 in Paris (winter), so yesterday is the 4th.
        let window = DayWindow::previous_day(utc(2025, 3, 5, 1, 30), Paris);
        assert_eq!(window.day, NaiveDate::from_ymd_opt(2025, 3, 4).expect("date"));
        assert_eq!(window.start, utc(2025, 3, 3, 23, 0));
        assert_eq!(window.end, utc(2025, 3, 4, 23, 0) - TimeDelta::milliseconds(1));
    }

    #[test]
    fn dst_day_is_23_hours_long() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 30).expect("date");
        let window = DayWindow::for_date(day, Paris);
        let length = window.end - window.start + TimeDelta::milliseconds(1);
        assert_eq!(length, TimeDelta::hours(23));
    }

    #[test]
    fn clamp_keeps_instants_inside_the_day() {
        let window = DayWindow::for_date(NaiveDate::from_ymd_opt(2025, 3, 4).expect("date"), Paris);
        assert_eq!(window.clamp(utc(2025, 3, 5, 6, 0)), window.end);
        assert!(window.contains(utc(2025, 3, 4, 12, 0)));
        assert!(!window.contains(utc(2025, 3, 4, 23, 0)));
    }
}
