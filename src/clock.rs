//! Wall-clock helpers. All timestamps in the data model are epoch milliseconds.

use chrono::Utc;

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
