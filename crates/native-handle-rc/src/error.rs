use serde::{Serialize, Serializer};

/// Result type alias for handle lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a native client library call.
///
/// `code` is the library's own error code, preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct NativeError {
   pub code: i64,
   pub message: String,
}

impl NativeError {
   pub fn new(code: i64, message: impl Into<String>) -> Self {
      Self {
         code,
         message: message.into(),
      }
   }
}

/// Structured error response for hosts.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
   code: String,
   message: String,
   #[serde(skip_serializing_if = "Option::is_none")]
   native_code: Option<i64>,
}

/// Errors raised by the handle lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// The handle's native object is gone.
   #[error("invalid state: {kind} handle closed")]
   InvalidState { kind: &'static str },

   /// A child was requested from a parent whose native object is gone.
   #[error("invalid state: {parent} handle closed, cannot create {kind}")]
   ParentInvalid {
      kind: &'static str,
      parent: &'static str,
   },

   /// The native close routine reported a failure.
   #[error("Failed to successfully close {kind}: {message}")]
   NativeClose {
      kind: &'static str,
      code: i64,
      message: String,
   },

   /// The native close routine panicked.
   #[error("{kind} close panicked: {message}")]
   ClosePanicked { kind: &'static str, message: String },
}

impl Error {
   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> String {
      match self {
         Error::InvalidState { .. } => "INVALID_STATE".to_string(),
         Error::ParentInvalid { .. } => "PARENT_INVALID".to_string(),
         Error::NativeClose { .. } => "NATIVE_CLOSE_FAILED".to_string(),
         Error::ClosePanicked { .. } => "NATIVE_CLOSE_PANICKED".to_string(),
      }
   }

   /// The native library's error code, when the failure came from it.
   pub fn native_code(&self) -> Option<i64> {
      match self {
         Error::NativeClose { code, .. } => Some(*code),
         _ => None,
      }
   }

   /// Kind name of the handle the error is about.
   pub fn kind(&self) -> &'static str {
      match self {
         Error::InvalidState { kind }
         | Error::ParentInvalid { kind, .. }
         | Error::NativeClose { kind, .. }
         | Error::ClosePanicked { kind, .. } => *kind,
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
