use serde_json::Value as JsonValue;
use sqlx::Sqlite;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Binds `params` to `query` in order.
pub(crate) fn bind_all(query: SqliteQuery<'_>, params: Vec<JsonValue>) -> SqliteQuery<'_> {
   params.into_iter().fold(query, bind_value)
}

/// Helper function to bind a JSON value to a SQLx query.
fn bind_value(query: SqliteQuery<'_>, value: JsonValue) -> SqliteQuery<'_> {
   match value {
      JsonValue::Null => query.bind(None::<JsonValue>),
      JsonValue::String(text) => query.bind(text),
      JsonValue::Bool(flag) => query.bind(flag),
      JsonValue::Number(number) => {
         // Preserve integer precision by binding as i64 when possible
         if let Some(int_val) = number.as_i64() {
            query.bind(int_val)
         } else if let Some(uint_val) = number.as_u64() {
            // Too large for SQLite's INTEGER, bind as f64 (will lose precision)
            query.bind(uint_val as f64)
         } else {
            query.bind(number.as_f64().unwrap_or_default())
         }
      }
      other => query.bind(other),
   }
}
