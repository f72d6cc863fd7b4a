//! Entry repository: reads and column-whitelisted writes on
//! `legal_knowledge_base`.

use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Statement};
use serde_json::{Number, Value};

use super::{Database, DatabaseError};
use crate::entry::{
    format_timestamp, EntryFields, EntryUpdate, BOOL_COLUMNS, ENTRY_COLUMNS, JSON_COLUMNS,
};

/// Inserts an entry row with `initial` column values. Status defaults to
/// `pending`.
pub fn insert(
    db: &Database,
    id: &str,
    organization_id: Option<&str>,
    initial: &EntryFields,
) -> Result<(), DatabaseError> {
    let now = format_timestamp(Utc::now());
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO legal_knowledge_base (id, organization_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![id, organization_id, now],
        )?;
        Ok(())
    })?;

    if !initial.is_empty() {
        let mut fields = EntryUpdate::new();
        for (column, value) in initial {
            fields.insert(column, value.clone());
        }
        update(db, id, &fields)?;
    }
    Ok(())
}

type RawRow = Vec<(String, SqlValue)>;

fn column_names(stmt: &Statement<'_>) -> Vec<String> {
    stmt.column_names().iter().map(|n| n.to_string()).collect()
}

fn read_row(row: &Row<'_>, names: &[String]) -> rusqlite::Result<RawRow> {
    let mut values = Vec::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        values.push((name.clone(), row.get::<_, SqlValue>(i)?));
    }
    Ok(values)
}

fn decode_row(raw: RawRow) -> Result<EntryFields, DatabaseError> {
    let mut fields = EntryFields::new();
    for (column, value) in raw {
        let decoded = decode_column(&column, value)?;
        fields.insert(column, decoded);
    }
    Ok(fields)
}

/// Loads every column of an entry. JSON columns come back decoded and
/// boolean columns as booleans.
pub fn get(db: &Database, id: &str) -> Result<Option<EntryFields>, DatabaseError> {
    let raw = db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM legal_knowledge_base WHERE id = ?1")?;
        let names = column_names(&stmt);
        let row = stmt
            .query_row(params![id], |row| read_row(row, &names))
            .optional()?;
        Ok(row)
    })?;

    raw.map(decode_row).transpose()
}

/// Active entries, most recently updated first. `None` lists them all.
pub fn list_active(db: &Database, limit: Option<usize>) -> Result<Vec<EntryFields>, DatabaseError> {
    // SQLite treats a negative LIMIT as unbounded.
    let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM legal_knowledge_base
             WHERE is_active = 1
             ORDER BY updated_at DESC, rowid DESC
             LIMIT ?1",
        )?;
        let names = column_names(&stmt);
        let rows = stmt
            .query_map(params![limit], |row| read_row(row, &names))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;

    rows.into_iter().map(decode_row).collect()
}

/// Writes `update` to an entry. Returns whether the row exists.
///
/// Column names are checked against [`ENTRY_COLUMNS`] before they reach
/// the SQL text.
pub fn update(db: &Database, id: &str, update: &EntryUpdate) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| update_in(conn, id, update))
}

/// [`update`] on an open connection or transaction.
pub(crate) fn update_in(
    conn: &Connection,
    id: &str,
    update: &EntryUpdate,
) -> Result<bool, DatabaseError> {
    if update.is_empty() {
        return Ok(false);
    }

    let mut assignments = Vec::with_capacity(update.len());
    let mut values = Vec::with_capacity(update.len() + 1);
    for (column, value) in update.iter() {
        if !ENTRY_COLUMNS.contains(&column.as_str()) {
            return Err(DatabaseError::UnknownColumn(column.clone()));
        }
        values.push(encode_column(column, value)?);
        assignments.push(format!("{} = ?{}", column, values.len()));
    }
    values.push(SqlValue::Text(id.to_string()));

    let sql = format!(
        "UPDATE legal_knowledge_base SET {} WHERE id = ?{}",
        assignments.join(", "),
        values.len()
    );

    let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
    Ok(changed > 0)
}

fn encode_column(column: &str, value: &Value) -> Result<SqlValue, DatabaseError> {
    if BOOL_COLUMNS.contains(&column) {
        let flag = match value {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_i64().unwrap_or(0) != 0,
            Value::Null => false,
            other => {
                return Err(DatabaseError::InvalidValue {
                    column: column.to_string(),
                    value: other.to_string(),
                })
            }
        };
        return Ok(SqlValue::Integer(i64::from(flag)));
    }

    if JSON_COLUMNS.contains(&column) {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }
        let text = serde_json::to_string(value).map_err(|e| DatabaseError::Json {
            column: column.to_string(),
            source: e,
        })?;
        return Ok(SqlValue::Text(text));
    }

    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        other => SqlValue::Text(other.to_string()),
    })
}

fn decode_column(column: &str, value: SqlValue) -> Result<Value, DatabaseError> {
    Ok(match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) if BOOL_COLUMNS.contains(&column) => Value::Bool(i != 0),
        SqlValue::Integer(i) => Value::Number(i.into()),
        SqlValue::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        SqlValue::Text(text) if JSON_COLUMNS.contains(&column) => serde_json::from_str(&text)
            .map_err(|e| DatabaseError::Json {
                column: column.to_string(),
                source: e,
            })?,
        SqlValue::Text(text) => Value::String(text),
        SqlValue::Blob(_) => Value::Null,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ProcessingStatus;
    use serde_json::json;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    #[test]
    fn test_insert_and_get_defaults() {
        let db = test_db();
        insert(&db, "e1", Some("org-1"), &EntryFields::new()).unwrap();

        let entry = get(&db, "e1").unwrap().unwrap();
        assert_eq!(entry["id"], json!("e1"));
        assert_eq!(entry["organization_id"], json!("org-1"));
        assert_eq!(entry["processing_status"], json!("pending"));
        assert_eq!(entry["ai_processed"], json!(false));
        assert_eq!(entry["title"], Value::Null);
    }

    #[test]
    fn test_get_missing() {
        let db = test_db();
        assert!(get(&db, "missing").unwrap().is_none());
    }

    #[test]
    fn test_insert_with_initial_fields() {
        let db = test_db();
        let initial = json!({"title": "", "document_type": "case_law", "keywords": ["tort"]});
        insert(&db, "e1", None, initial.as_object().unwrap()).unwrap();

        let entry = get(&db, "e1").unwrap().unwrap();
        assert_eq!(entry["title"], json!(""));
        assert_eq!(entry["document_type"], json!("case_law"));
        assert_eq!(entry["keywords"], json!(["tort"]));
    }

    #[test]
    fn test_update_json_and_bool_columns() {
        let db = test_db();
        insert(&db, "e1", None, &EntryFields::new()).unwrap();

        let update_fields = EntryUpdate::new()
            .status(ProcessingStatus::Completed)
            .set("ai_processed", true)
            .set("pageindex_metadata", json!({"tree_depth": 3, "node_count": 4}))
            .set("ai_embedding", json!([0.25, -0.5]))
            .set("cited_cases", Value::Null);
        assert!(update(&db, "e1", &update_fields).unwrap());

        let entry = get(&db, "e1").unwrap().unwrap();
        assert_eq!(entry["processing_status"], json!("completed"));
        assert_eq!(entry["ai_processed"], json!(true));
        assert_eq!(entry["pageindex_metadata"]["node_count"], json!(4));
        assert_eq!(entry["ai_embedding"], json!([0.25, -0.5]));
        assert_eq!(entry["cited_cases"], Value::Null);
    }

    #[test]
    fn test_update_rejects_unknown_column() {
        let db = test_db();
        insert(&db, "e1", None, &EntryFields::new()).unwrap();

        let bad = EntryUpdate::new().set("id = 'x'; --", "boom");
        assert!(matches!(
            update(&db, "e1", &bad),
            Err(DatabaseError::UnknownColumn(_))
        ));

        let immutable = EntryUpdate::new().set("created_at", "2020-01-01T00:00:00Z");
        assert!(matches!(
            update(&db, "e1", &immutable),
            Err(DatabaseError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_update_missing_row() {
        let db = test_db();
        let fields = EntryUpdate::new().status(ProcessingStatus::Failed);
        assert!(!update(&db, "missing", &fields).unwrap());
        assert!(!update(&db, "missing", &EntryUpdate::new()).unwrap());
    }

    #[test]
    fn test_list_active_newest_first() {
        let db = test_db();
        for (id, updated_at) in [
            ("old", "2026-01-01T00:00:00.000000Z"),
            ("new", "2026-03-01T00:00:00.000000Z"),
            ("mid", "2026-02-01T00:00:00.000000Z"),
        ] {
            insert(&db, id, None, &EntryFields::new()).unwrap();
            update(&db, id, &EntryUpdate::new().set("updated_at", updated_at)).unwrap();
        }
        update(&db, "mid", &EntryUpdate::new().set("is_active", false)).unwrap();

        let ids = |rows: Vec<EntryFields>| -> Vec<String> {
            rows.iter()
                .map(|r| r["id"].as_str().unwrap().to_string())
                .collect()
        };
        assert_eq!(ids(list_active(&db, None).unwrap()), vec!["new", "old"]);
        assert_eq!(ids(list_active(&db, Some(1)).unwrap()), vec!["new"]);
        assert_eq!(get(&db, "mid").unwrap().unwrap()["is_active"], json!(false));
    }
}
