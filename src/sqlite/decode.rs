use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteRow, SqliteValueRef};
use sqlx::{Row as _, TypeInfo, Value, ValueRef};
use time::PrimitiveDateTime;

use super::native_error;
use crate::native::{NativeError, NativeResult, Row};

/// Native code reported for values that cannot be represented as JSON.
const UNSUPPORTED_DATATYPE: i64 = -2;

/// Decodes every column of `row` in order.
pub(crate) fn decode_row(row: &SqliteRow) -> NativeResult<Row> {
   (0..row.len())
      .map(|index| {
         let value = row.try_get_raw(index).map_err(|e| native_error(&e))?;
         to_json(value)
      })
      .collect()
}

/// Convert a SQLite value to a JSON value.
///
/// Dispatch is on the stored value's type, not the column's declared type.
/// BLOB values are returned as base64-encoded strings since JSON has no
/// native binary type.
pub(crate) fn to_json(value: SqliteValueRef) -> NativeResult<JsonValue> {
   if value.is_null() {
      return Ok(JsonValue::Null);
   }

   let value_type = value.type_info();

   let result = match value_type.name() {
      "TEXT" | "DATE" | "TIME" => value
         .to_owned()
         .try_decode::<String>()
         .map(JsonValue::String)
         .unwrap_or(JsonValue::Null),

      "REAL" => value
         .to_owned()
         .try_decode::<f64>()
         .map(JsonValue::from)
         .unwrap_or(JsonValue::Null),

      "INTEGER" | "NUMERIC" => value
         .to_owned()
         .try_decode::<i64>()
         .map(JsonValue::from)
         .unwrap_or(JsonValue::Null),

      "BOOLEAN" => value
         .to_owned()
         .try_decode::<bool>()
         .map(JsonValue::Bool)
         .unwrap_or(JsonValue::Null),

      "DATETIME" => {
         let owned = value.to_owned();
         if let Ok(dt) = owned.try_decode::<PrimitiveDateTime>() {
            JsonValue::String(dt.to_string())
         } else {
            owned
               .try_decode::<String>()
               .map(JsonValue::String)
               .unwrap_or(JsonValue::Null)
         }
      }

      "BLOB" => value
         .to_owned()
         .try_decode::<Vec<u8>>()
         .map(|blob| JsonValue::String(base64_encode(&blob)))
         .unwrap_or(JsonValue::Null),

      "NULL" => JsonValue::Null,

      other => match value.to_owned().try_decode::<String>() {
         Ok(text) => JsonValue::String(text),
         Err(_) => {
            return Err(NativeError::new(
               UNSUPPORTED_DATATYPE,
               format!("Unsupported SQL type: {other}"),
            ));
         }
      },
   };

   Ok(result)
}

fn base64_encode(data: &[u8]) -> String {
   use base64::Engine;
   base64::engine::general_purpose::STANDARD.encode(data)
}
