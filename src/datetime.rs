use chrono::{DateTime, Duration, NaiveDate, Utc};

#[cfg(not(test))]
/// 現在のUTC時間を取得する。
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// UTCでの今日の日付を取得する。
pub fn today() -> NaiveDate {
    now().date_naive()
}

/// UTCでの昨日の日付を取得する。
pub fn yesterday() -> NaiveDate {
    today() - Duration::days(1)
}


#[cfg(test)]
pub use mock_datetime::now;
