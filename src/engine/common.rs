// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Provides the engine Result alias and the codec panic policy.

use crate::error::ConvertError;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Result type used by every engine stage.
pub type EngineResult<T> = std::result::Result<T, ConvertError>;

/// Run a codec call, converting a panic inside it into `InternalPanic`.
///
/// C codecs behind the bindings and several pure-Rust decoders can panic on
/// hostile input. A panic must never escape a conversion call, so every stage
/// that touches codec code goes through here. `stage` ends up in the error
/// message and the log line.
pub fn run_with_panic_policy<T, F>(stage: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(stage, %message, "codec panicked");
            Err(ConvertError::internal_panic(format!(
                "{stage}: panic: {message}"
            )))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
