//! Exchange trading hours
//!
//! Two continuous-auction windows per weekday, in market-local time. Window
//! ends are exclusive (11:30 and 15:00 are closed). Holidays are not modeled.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::types::MARKET_TZ;

#[derive(Debug, Clone)]
pub struct TradingSession {
    pub timezone: Tz,
    /// `[open, close)` windows, local time
    pub windows: Vec<(NaiveTime, NaiveTime)>,
}

impl Default for TradingSession {
    fn default() -> Self {
        Self::a_share()
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

impl TradingSession {
    /// Shanghai / Shenzhen: 09:30-11:30 and 13:00-15:00
    pub fn a_share() -> Self {
        Self {
            timezone: MARKET_TZ,
            windows: vec![(hm(9, 30), hm(11, 30)), (hm(13, 0), hm(15, 0))],
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.timezone);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let time = local.time();
        self.windows
            .iter()
            .any(|(open, close)| time >= *open && time < *close)
    }

    /// Local calendar date, used for settlement
    pub fn trading_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }
}
