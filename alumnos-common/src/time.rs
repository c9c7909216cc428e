//! Timestamp and date utilities

use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current UTC timestamp formatted for TEXT columns
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Today's date in UTC
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Age in completed years on `on`, or `None` if `birth` is in the future
pub fn age_on(birth: NaiveDate, on: NaiveDate) -> Option<u32> {
    if birth > on {
        return None;
    }
    let mut years = on.year() - birth.year();
    if (on.month(), on.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
    }

    #[test]
    fn test_now_rfc3339_parses_back() {
        let text = now_rfc3339();
        assert!(DateTime::parse_from_rfc3339(&text).is_ok());
    }

    #[test]
    fn test_age_before_birthday() {
        assert_eq!(age_on(date(2010, 6, 15), date(2020, 6, 14)), Some(9));
    }

    #[test]
    fn test_age_on_birthday() {
        assert_eq!(age_on(date(2010, 6, 15), date(2020, 6, 15)), Some(10));
    }

    #[test]
    fn test_age_leap_day_birth() {
        assert_eq!(age_on(date(2012, 2, 29), date(2021, 2, 28)), Some(8));
        assert_eq!(age_on(date(2012, 2, 29), date(2021, 3, 1)), Some(9));
    }

    #[test]
    fn test_age_future_birth() {
        assert_eq!(age_on(date(2030, 1, 1), date(2020, 1, 1)), None);
    }
}
