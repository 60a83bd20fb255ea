//! Result-set to Arrow conversion
//!
//! Drains a source session into a [`MaterializedTable`] whose columns follow
//! the query's declared output schema by name and type.

use crate::session::{ResultSet, SourceSession};
use arrow::array::*;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlcache_core::{CacheError, DataType, Field, MaterializedTable, Result, Schema, SelectQuery, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Default number of rows per record batch
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// Execute `query` on `session` and materialize the full result set
pub async fn convert<S>(query: &SelectQuery, session: &S) -> Result<MaterializedTable>
where
    S: SourceSession + ?Sized,
{
    convert_with_batch_size(query, session, DEFAULT_BATCH_SIZE).await
}

pub async fn convert_with_batch_size<S>(
    query: &SelectQuery,
    session: &S,
    batch_size: usize,
) -> Result<MaterializedTable>
where
    S: SourceSession + ?Sized,
{
    let schema = query.output_schema();
    let result = session.fetch(query).await?;
    debug!(
        "Fetched {} rows ({} columns) from source",
        result.num_rows(),
        result.columns.len()
    );
    result_set_to_table(&schema, result, batch_size)
}

/// Build a table from already-drained rows
pub fn result_set_to_table(
    schema: &Schema,
    result: ResultSet,
    batch_size: usize,
) -> Result<MaterializedTable> {
    if result.columns.len() != schema.len() {
        return Err(CacheError::QueryExecution(format!(
            "source returned {} columns, query selects {}",
            result.columns.len(),
            schema.len()
        )));
    }
    if let Some(pos) = result.rows.iter().position(|row| row.len() != schema.len()) {
        return Err(CacheError::QueryExecution(format!(
            "row {} has {} values, expected {}",
            pos,
            result.rows[pos].len(),
            schema.len()
        )));
    }

    let positions = column_positions(schema, &result.columns)?;
    let arrow_schema = schema.to_arrow_ref();
    let mut batches = Vec::new();

    for chunk in result.rows.chunks(batch_size.max(1)) {
        let columns = schema
            .fields()
            .iter()
            .zip(&positions)
            .map(|(field, &pos)| build_column(field, chunk, pos))
            .collect::<Result<Vec<_>>>()?;
        batches.push(RecordBatch::try_new(Arc::clone(&arrow_schema), columns)?);
    }

    Ok(MaterializedTable::new(arrow_schema, batches))
}

/// Position of each declared column in the source result, matched by name.
///
/// Repeated names pair up in order of appearance.
fn column_positions(schema: &Schema, columns: &[String]) -> Result<Vec<usize>> {
    let mut taken = vec![false; columns.len()];
    schema
        .fields()
        .iter()
        .map(|field| {
            let pos = columns
                .iter()
                .enumerate()
                .position(|(i, name)| !taken[i] && name == field.name())
                .ok_or_else(|| {
                    CacheError::QueryExecution(format!(
                        "source result has no column '{}' (returned: {})",
                        field.name(),
                        columns.join(", ")
                    ))
                })?;
            taken[pos] = true;
            Ok(pos)
        })
        .collect()
}

fn build_column(field: &Field, rows: &[Vec<Value>], idx: usize) -> Result<ArrayRef> {
    let array: ArrayRef = match field.data_type() {
        DataType::Boolean => Arc::new(BooleanArray::from(collect(field, rows, idx, to_bool)?)),
        DataType::Int32 => Arc::new(Int32Array::from(collect(field, rows, idx, |v| match v {
            Value::Int64(i) => i32::try_from(*i).ok(),
            _ => None,
        })?)),
        DataType::Int64 => Arc::new(Int64Array::from(collect(field, rows, idx, |v| match v {
            Value::Int64(i) => Some(*i),
            _ => None,
        })?)),
        DataType::Float64 => Arc::new(Float64Array::from(collect(field, rows, idx, |v| match v {
            Value::Float64(f) => Some(*f),
            Value::Int64(i) => Some(*i as f64),
            _ => None,
        })?)),
        DataType::Utf8 => Arc::new(StringArray::from_iter(collect(field, rows, idx, |v| {
            match v {
                Value::Text(s) => Some(s.clone()),
                _ => None,
            }
        })?)),
        DataType::Binary => Arc::new(BinaryArray::from_iter(collect(field, rows, idx, |v| {
            match v {
                Value::Blob(b) => Some(b.clone()),
                Value::Text(s) => Some(s.as_bytes().to_vec()),
                _ => None,
            }
        })?)),
        DataType::Date32 => Arc::new(Date32Array::from(collect(field, rows, idx, to_date32)?)),
        DataType::Timestamp => Arc::new(TimestampMicrosecondArray::from(collect(
            field,
            rows,
            idx,
            to_timestamp_micros,
        )?)),
        DataType::Uuid => Arc::new(StringArray::from_iter(collect(field, rows, idx, to_uuid)?)),
        DataType::Null => Arc::new(NullArray::new(rows.len())),
    };
    Ok(array)
}

/// Convert one column, enforcing nullability and reporting the first bad value
fn collect<T>(
    field: &Field,
    rows: &[Vec<Value>],
    idx: usize,
    convert: impl Fn(&Value) -> Option<T>,
) -> Result<Vec<Option<T>>> {
    rows.iter()
        .map(|row| {
            let value = &row[idx];
            if value.is_null() {
                return if field.nullable() {
                    Ok(None)
                } else {
                    Err(CacheError::type_mismatch(
                        field.name(),
                        format!("non-null {}", field.data_type()),
                        "Null",
                    ))
                };
            }
            convert(value).map(Some).ok_or_else(|| {
                CacheError::type_mismatch(field.name(), field.data_type(), describe(value))
            })
        })
        .collect()
}

fn describe(value: &Value) -> String {
    match value {
        Value::Text(s) => format!("Text '{}'", s),
        Value::Int64(i) => format!("Int64 {}", i),
        other => other.kind().to_string(),
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Boolean(b) => Some(*b),
        Value::Int64(i) => Some(*i != 0),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Some(true),
            "false" | "f" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn to_date32(value: &Value) -> Option<i32> {
    match value {
        Value::Text(s) => {
            let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()?;
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
            i32::try_from(date.signed_duration_since(epoch).num_days()).ok()
        }
        Value::Int64(days) => i32::try_from(*days).ok(),
        _ => None,
    }
}

fn to_timestamp_micros(value: &Value) -> Option<i64> {
    match value {
        Value::Text(s) => parse_timestamp_micros(s.trim()),
        Value::Int64(micros) => Some(*micros),
        _ => None,
    }
}

/// Accepts RFC 3339 and the `YYYY-MM-DD HH:MM:SS[.f][+HH:MM]` forms written by
/// row stores; offsets are normalized to UTC, naive values are taken as UTC.
fn parse_timestamp_micros(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).timestamp_micros());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Utc).timestamp_micros());
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive).timestamp_micros());
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?).timestamp_micros())
}

fn to_uuid(value: &Value) -> Option<String> {
    let uuid = match value {
        Value::Text(s) => Uuid::parse_str(s.trim()).ok()?,
        Value::Blob(b) => Uuid::from_slice(b).ok()?,
        _ => return None,
    };
    Some(uuid.hyphenated().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sqlcache_core::TableDef;

    struct StaticSource {
        result: ResultSet,
    }

    #[async_trait]
    impl SourceSession for StaticSource {
        async fn fetch(&self, _query: &SelectQuery) -> Result<ResultSet> {
            Ok(self.result.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl SourceSession for FailingSource {
        async fn fetch(&self, _query: &SelectQuery) -> Result<ResultSet> {
            Err(CacheError::QueryExecution("no such table: users".to_string()))
        }
    }

    fn users() -> TableDef {
        TableDef::new("users")
            .column("id", DataType::Int64, false)
            .column("name", DataType::Utf8, true)
    }

    fn users_rows() -> ResultSet {
        ResultSet::new(
            vec!["id".to_string(), "name".to_string()],
            vec![
                vec![Value::Int64(1), Value::from("a")],
                vec![Value::Int64(2), Value::Null],
                vec![Value::Int64(3), Value::from("c")],
            ],
        )
    }

    #[tokio::test]
    async fn test_convert_preserves_names_types_and_values() {
        let source = StaticSource {
            result: users_rows(),
        };
        let table = convert(&users().select(), &source).await.unwrap();

        assert_eq!(table.column_names(), vec!["id", "name"]);
        assert_eq!(table.num_rows(), 3);
        let batch = table.concat().unwrap();
        assert_eq!(batch.schema().field(0).data_type(), &arrow::datatypes::DataType::Int64);

        let names = batch.column(1).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(names.value(0), "a");
        assert!(names.is_null(1));
        assert_eq!(names.value(2), "c");
    }

    #[tokio::test]
    async fn test_convert_chunks_into_batches() {
        let source = StaticSource {
            result: users_rows(),
        };
        let table = convert_with_batch_size(&users().select(), &source, 2)
            .await
            .unwrap();
        assert_eq!(table.batches().len(), 2);
        assert_eq!(table.num_rows(), 3);
    }

    #[tokio::test]
    async fn test_empty_result_keeps_schema() {
        let source = StaticSource {
            result: ResultSet::new(vec!["id".into(), "name".into()], vec![]),
        };
        let table = convert(&users().select(), &source).await.unwrap();
        assert!(table.is_empty());
        assert_eq!(table.column_names(), vec!["id", "name"]);
    }

    #[tokio::test]
    async fn test_source_failure_propagates() {
        let err = convert(&users().select(), &FailingSource).await.unwrap_err();
        assert!(matches!(err, CacheError::QueryExecution(_)));
    }

    #[test]
    fn test_null_in_non_nullable_column() {
        let result = ResultSet::new(
            vec!["id".into(), "name".into()],
            vec![vec![Value::Null, Value::from("a")]],
        );
        let err = result_set_to_table(&users().select().output_schema(), result, 10).unwrap_err();
        assert!(matches!(err, CacheError::TypeMismatch { ref column, .. } if column == "id"));
    }

    #[test]
    fn test_column_count_mismatch() {
        let result = ResultSet::new(vec!["id".into()], vec![vec![Value::Int64(1)]]);
        let err = result_set_to_table(&users().select().output_schema(), result, 10).unwrap_err();
        assert!(matches!(err, CacheError::QueryExecution(_)));
    }

    #[test]
    fn test_columns_matched_by_name() {
        let schema = Schema::new(vec![
            Field::new("a", DataType::Utf8, false),
            Field::new("b", DataType::Utf8, false),
        ]);
        let result = ResultSet::new(
            vec!["b".into(), "a".into()],
            vec![vec![Value::from("B"), Value::from("A")]],
        );
        let batch = result_set_to_table(&schema, result, 10)
            .unwrap()
            .concat()
            .unwrap();

        let a = batch.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        let b = batch.column(1).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(a.value(0), "A");
        assert_eq!(b.value(0), "B");
    }

    #[test]
    fn test_unknown_column_name() {
        let result = ResultSet::new(
            vec!["id".into(), "username".into()],
            vec![vec![Value::Int64(1), Value::from("a")]],
        );
        let err = result_set_to_table(&users().select().output_schema(), result, 10).unwrap_err();
        assert!(matches!(err, CacheError::QueryExecution(ref msg) if msg.contains("no column 'name'")));
    }

    #[test]
    fn test_repeated_names_pair_in_order() {
        let schema = Schema::new(vec![
            Field::new("x", DataType::Int64, false),
            Field::new("x", DataType::Utf8, false),
        ]);
        let result = ResultSet::new(
            vec!["x".into(), "x".into()],
            vec![vec![Value::Int64(1), Value::from("one")]],
        );
        let table = result_set_to_table(&schema, result, 10).unwrap();
        assert_eq!(table.num_rows(), 1);
    }

    #[test]
    fn test_wrong_storage_class() {
        let result = ResultSet::new(
            vec!["id".into(), "name".into()],
            vec![vec![Value::from("one"), Value::from("a")]],
        );
        let err = result_set_to_table(&users().select().output_schema(), result, 10).unwrap_err();
        assert!(err.to_string().contains("expected Int64"));
    }

    #[test]
    fn test_int32_overflow_is_rejected() {
        let schema = Schema::new(vec![Field::new("n", DataType::Int32, false)]);
        let result = ResultSet::new(vec!["n".into()], vec![vec![Value::Int64(i64::MAX)]]);
        assert!(result_set_to_table(&schema, result, 10).is_err());
    }

    #[test]
    fn test_boolean_from_integer_and_text() {
        assert_eq!(to_bool(&Value::Int64(0)), Some(false));
        assert_eq!(to_bool(&Value::Int64(7)), Some(true));
        assert_eq!(to_bool(&Value::from("TRUE")), Some(true));
        assert_eq!(to_bool(&Value::from("maybe")), None);
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = 1_700_000_000_123_456;
        assert_eq!(
            parse_timestamp_micros("2023-11-14 22:13:20.123456"),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp_micros("2023-11-14T22:13:20.123456Z"),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp_micros("2023-11-15 00:13:20.123456+02:00"),
            Some(expected)
        );
        assert_eq!(parse_timestamp_micros("1970-01-02"), Some(86_400_000_000));
        assert_eq!(parse_timestamp_micros("yesterday"), None);
    }

    #[test]
    fn test_date32_from_text() {
        assert_eq!(to_date32(&Value::from("1970-01-11")), Some(10));
        assert_eq!(to_date32(&Value::from("1969-12-31")), Some(-1));
    }

    #[test]
    fn test_uuid_normalization() {
        let simple = Value::from("67e5504410b1426f9247bb680e5fe0c8");
        assert_eq!(
            to_uuid(&simple).as_deref(),
            Some("67e55044-10b1-426f-9247-bb680e5fe0c8")
        );
        let blob = Value::Blob(Uuid::nil().as_bytes().to_vec());
        assert_eq!(
            to_uuid(&blob).as_deref(),
            Some("00000000-0000-0000-0000-000000000000")
        );
        assert_eq!(to_uuid(&Value::from("not-a-uuid")), None);
    }
}
