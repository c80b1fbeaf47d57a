use time::OffsetDateTime;

pub const MINUTE: i64 = 60;
pub const DAY: i64 = 86_400;

/// Current wall-clock time as unix seconds (UTC).
pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Floor a timestamp to the start of its minute. Anchors check bucket
/// boundaries so duplicate tick invocations land on the same `checked_at`.
pub fn floor_to_minute(ts: i64) -> i64 {
    ts - ts.rem_euclid(MINUTE)
}

/// Floor a timestamp to UTC midnight.
pub fn utc_day_start(ts: i64) -> i64 {
    ts - ts.rem_euclid(DAY)
}

/// Supported analytics ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Range {
    Day,
    Week,
    Month,
    Quarter,
}

impl Range {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "24h" => Some(Range::Day),
            "7d" => Some(Range::Week),
            "30d" => Some(Range::Month),
            "90d" => Some(Range::Quarter),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Range::Day => "24h",
            Range::Week => "7d",
            Range::Month => "30d",
            Range::Quarter => "90d",
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            Range::Day => DAY,
            Range::Week => 7 * DAY,
            Range::Month => 30 * DAY,
            Range::Quarter => 90 * DAY,
        }
    }

    /// Live ranges end at the current minute; day-aligned ranges end at the
    /// current UTC day boundary.
    pub fn is_live(&self) -> bool {
        matches!(self, Range::Day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_to_minute() {
        assert_eq!(floor_to_minute(0), 0);
        assert_eq!(floor_to_minute(59), 0);
        assert_eq!(floor_to_minute(60), 60);
        assert_eq!(floor_to_minute(1_700_000_123), 1_700_000_100);
    }

    #[test]
    fn test_utc_day_start() {
        assert_eq!(utc_day_start(0), 0);
        assert_eq!(utc_day_start(DAY - 1), 0);
        assert_eq!(utc_day_start(DAY), DAY);
        assert_eq!(utc_day_start(3 * DAY + 12_345), 3 * DAY);
    }

    #[test]
    fn test_range_parse() {
        assert_eq!(Range::parse("24h"), Some(Range::Day));
        assert_eq!(Range::parse("7d"), Some(Range::Week));
        assert_eq!(Range::parse("90d"), Some(Range::Quarter));
        assert_eq!(Range::parse("1h"), None);
        assert_eq!(Range::Month.seconds(), 30 * DAY);
    }
}
