use time::{
    OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339,
    macros::format_description,
};

use crate::errors::AppError;

pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// ISO-8601 in UTC with millisecond precision, e.g. `2024-01-02T03:04:05.678Z`.
pub fn format_stored(instant: OffsetDateTime) -> Result<String, AppError> {
    let format = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    );
    Ok(instant.to_offset(UtcOffset::UTC).format(format)?)
}

pub fn to_millis(instant: OffsetDateTime) -> i64 {
    (instant.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Parses a query-parameter date, BAD_REQUEST when it is not RFC 3339.
pub fn parse_param(name: &str, raw: &str) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339)
        .map_err(|_| AppError::BadRequest(format!("Invalid {name} date: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn stored_format_has_millisecond_precision() {
        let instant = datetime!(2024-01-02 03:04:05.678901 UTC);
        assert_eq!(format_stored(instant).unwrap(), "2024-01-02T03:04:05.678Z");
        assert_eq!(to_millis(instant), 1_704_164_645_678);
    }

    #[test]
    fn parses_offsets_and_rejects_garbage() {
        let parsed = parse_param("since", "2024-01-02T05:04:05+02:00").unwrap();
        assert_eq!(to_millis(parsed), 1_704_164_645_000);
        assert!(parse_param("since", "yesterday").is_err());
    }
}
