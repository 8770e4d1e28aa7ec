use native_handle_rc::NativeError;
use serde::{Serialize, Serializer};

/// Result type alias for adapter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error response for hosts.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
   code: String,
   message: String,
   #[serde(skip_serializing_if = "Option::is_none")]
   native_code: Option<i64>,
}

/// Error types for the handle adapter.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Handle lifecycle violation or close failure.
   #[error(transparent)]
   Lifecycle(#[from] native_handle_rc::Error),

   /// A native library call failed.
   #[error("{message}")]
   Database { code: i64, message: String },

   /// Connection configuration is incomplete.
   #[error("invalid configuration: {0}")]
   InvalidConfig(String),

   /// Prepared statement parameters are numbered from 1.
   #[error("parameter index must be 1 or greater, got {0}")]
   InvalidParameterIndex(usize),

   /// I/O error when accessing database files.
   #[error("io error: {0}")]
   Io(#[from] std::io::Error),
}

impl Error {
   /// Wraps a native failure with the operation that caused it.
   pub(crate) fn database(context: &str, err: NativeError) -> Self {
      Error::Database {
         code: err.code,
         message: format!("{context}: {}", err.message),
      }
   }

   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for host error handling.
   pub fn error_code(&self) -> String {
      match self {
         Error::Lifecycle(e) => e.error_code(),
         Error::Database { .. } => "DATABASE_ERROR".to_string(),
         Error::InvalidConfig(_) => "INVALID_CONFIG".to_string(),
         Error::InvalidParameterIndex(_) => "INVALID_PARAMETER_INDEX".to_string(),
         Error::Io(_) => "IO_ERROR".to_string(),
      }
   }

   /// The native library's error code, when there is one.
   pub fn native_code(&self) -> Option<i64> {
      match self {
         Error::Lifecycle(e) => e.native_code(),
         Error::Database { code, .. } => Some(*code),
         _ => None,
      }
   }
}

impl Serialize for Error {
   fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
   where
      S: Serializer,
   {
      let response = ErrorResponse {
         code: self.error_code(),
         message: self.to_string(),
         native_code: self.native_code(),
      };
      response.serialize(serializer)
   }
}
