//! Display-timestamp formatting.

use chrono::{FixedOffset, Utc};

const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Current time rendered in the display format used in status cells
/// and notifications: `YYYY-MM-DD HH:MM:SS UTC+0900 (JST)`.
pub fn now_jst() -> String {
    format_jst(Utc::now())
}

fn format_jst(instant: chrono::DateTime<Utc>) -> String {
    let jst = FixedOffset::east_opt(JST_OFFSET_SECS).expect("fixed offset in range");
    instant
        .with_timezone(&jst)
        .format("%Y-%m-%d %H:%M:%S UTC+0900 (JST)")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_jst() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_jst(instant), "2024-01-01 09:00:00 UTC+0900 (JST)");
    }

    #[test]
    fn test_now_jst_shape() {
        let ts = now_jst();
        assert!(ts.ends_with(" UTC+0900 (JST)"));
        assert_eq!(ts.len(), "2024-01-01 09:00:00 UTC+0900 (JST)".len());
    }
}
