use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse an ISO 8601 timestamp into UTC. Accepts RFC 3339 offsets (including
/// `Z`) and naive timestamps, which are assumed to already be UTC.
pub fn parse_iso8601(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").map(|naive| naive.and_utc())
}
