//! JSON body extractor.
//!
//! [`AppJson`] wraps `axum::Json` so a missing field, a mistyped value or a
//! malformed body is answered with a 400 and the usual `{"message"}` body
//! instead of axum's plain-text 422.

use axum::extract::FromRequest;

use crate::error::AppError;

/// Request body deserialized from JSON, rejecting with [`AppError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);
