use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Decode a JSON text column into `T`, returning CorruptRow on parse failure.
pub fn parse_json<T: serde::de::DeserializeOwned>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid JSON: {e}"),
    })
}

/// Parse a string into an enum, returning CorruptRow on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

/// Fixed-width UTC encoding; lexical order matches chronological order.
pub fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow {
            table,
            column,
            detail: format!("invalid timestamp {raw:?}: {e}"),
        })
}

/// Required timestamp column.
pub fn get_ts(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<DateTime<Utc>, StoreError> {
    let raw: String = get(row, idx, table, column)?;
    parse_ts(&raw, table, column)
}

/// Nullable timestamp column.
pub fn get_ts_opt(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    get_opt::<String>(row, idx, table, column)?
        .map(|raw| parse_ts(&raw, table, column))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use chrono::TimeZone;

    #[test]
    fn parse_enum_success() {
        let result: Result<Role, _> = parse_enum("assistant", "archived_messages", "role");
        assert_eq!(result.unwrap(), Role::Assistant);
    }

    #[test]
    fn parse_enum_failure() {
        let result: Result<Role, _> = parse_enum("narrator", "archived_messages", "role");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "archived_messages", column: "role", .. })
        ));
    }

    #[test]
    fn parse_json_failure() {
        let result: Result<Vec<String>, _> = parse_json("not json", "sessions", "tags");
        assert!(matches!(
            result,
            Err(StoreError::CorruptRow { table: "sessions", column: "tags", .. })
        ));
    }

    #[test]
    fn timestamps_are_fixed_width_and_ordered() {
        let a = Utc.with_ymd_and_hms(2026, 2, 10, 9, 0, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(1500);
        let (fa, fb) = (fmt_ts(&a), fmt_ts(&b));
        assert_eq!(fa, "2026-02-10T09:00:00.000000Z");
        assert_eq!(fa.len(), fb.len());
        assert!(fa < fb);
        assert_eq!(parse_ts(&fb, "t", "c").unwrap(), b);
    }

    #[test]
    fn parse_ts_accepts_offsets() {
        let t = parse_ts("2026-02-10T13:00:00+01:00", "t", "c").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap());
    }
}
