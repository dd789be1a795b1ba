use chrono::{
    DateTime, Datelike, FixedOffset, Local, NaiveDateTime, Offset, Timelike, Utc, Weekday,
};

/// The zone used both for printing timestamps and for weekday/time-of-day rules.
#[derive(Debug, Clone, Copy, Default)]
pub enum Zone {
    #[default]
    Local,
    Fixed(FixedOffset),
}

impl Zone {
    pub fn utc() -> Self {
        Zone::Fixed(Utc.fix())
    }

    fn naive(&self, t: DateTime<Utc>) -> NaiveDateTime {
        match self {
            Zone::Local => t.with_timezone(&Local).naive_local(),
            Zone::Fixed(offset) => t.with_timezone(offset).naive_local(),
        }
    }

    /// Weekday and minutes since midnight of `t` in this zone.
    pub fn weekday_minute(&self, t: DateTime<Utc>) -> (Weekday, u32) {
        let local = self.naive(t);
        (local.weekday(), local.hour() * 60 + local.minute())
    }

    /// Time only when `t` falls on the same local day as `now`, otherwise date and time.
    pub fn format(&self, t: DateTime<Utc>, now: DateTime<Utc>) -> String {
        let local = self.naive(t);
        if local.date() == self.naive(now).date() {
            local.format("%H:%M:%S").to_string()
        } else {
            local.format("%Y-%m-%d %H:%M:%S").to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_same_day_shows_time_only() {
        let zone = Zone::utc();
        let t = Utc.with_ymd_and_hms(2016, 2, 24, 9, 5, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2016, 2, 24, 23, 0, 0).unwrap();
        assert_eq!(zone.format(t, now), "09:05:00");
    }

    #[test]
    fn test_format_other_day_shows_date() {
        let zone = Zone::utc();
        let t = Utc.with_ymd_and_hms(2016, 2, 23, 9, 5, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2016, 2, 24, 1, 0, 0).unwrap();
        assert_eq!(zone.format(t, now), "2016-02-23 09:05:00");
    }

    #[test]
    fn test_weekday_minute_respects_offset() {
        let jst = Zone::Fixed(FixedOffset::east_opt(9 * 3600).unwrap());
        // Sunday 20:30 UTC is Monday 05:30 in +09:00
        let t = Utc.with_ymd_and_hms(2016, 2, 21, 20, 30, 0).unwrap();
        assert_eq!(jst.weekday_minute(t), (Weekday::Mon, 5 * 60 + 30));
    }
}
