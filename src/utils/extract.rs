use axum::extract::FromRequest;

use crate::error::Error;

/// `axum::Json` whose rejections are rendered as [`Error`] bodies.
#[derive(Debug, Clone, Copy, Default, FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct AppJson<T>(pub T);
