//! ISO-8601 UTC conversions for the wire boundary (spec §4.5: "All wire
//! timestamps are ISO-8601; local timestamps are Unix-ms").

use chrono::{DateTime, Utc};

use crate::error::{PeekError, Result};

pub fn to_iso(unix_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(unix_ms)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp_millis(0).unwrap())
        .to_rfc3339()
}

pub fn from_iso(s: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| PeekError::validation(format!("invalid ISO-8601 timestamp {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_rfc3339() {
        let ms = 1_700_000_000_000i64;
        let iso = to_iso(ms);
        assert_eq!(from_iso(&iso).unwrap(), ms);
    }

    #[test]
    fn rejects_malformed_timestamp() {
        assert!(from_iso("not-a-date").is_err());
    }
}
