use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Redirect, Response};

use crate::views;

/// Which unique field a signup collided on. Email is checked before SRN, so
/// a record colliding on both is reported as an email collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateField {
    Email,
    Srn,
}

#[derive(Debug)]
pub enum Error {
    /// Email or SRN already taken. The signup handler intercepts this to
    /// re-render the form; it only reaches a response on a handler bug.
    Duplicate(DuplicateField),
    /// Registration target not in the catalog.
    UnknownCourse { id: String },
    /// No valid session on a route that needs one.
    Unauthenticated,
    /// Store or connectivity failure. Logged with detail server-side,
    /// rendered as generic text to the client.
    Internal { kind: &'static str, message: String },
}

impl Error {
    pub fn internal<S: Into<String>>(kind: &'static str, message: S) -> Error {
        Error::Internal {
            kind,
            message: message.into(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::Unauthenticated => Redirect::to("/login").into_response(),
            Error::UnknownCourse { id } => (
                StatusCode::BAD_REQUEST,
                format!("no such course: {}", id),
            )
                .into_response(),
            Error::Internal { kind, message } => {
                log::error!("{}: {}", kind, message);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            Error::Duplicate(field) => {
                log::error!("unhandled duplicate key on {:?}", field);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Internal {
            kind: "DatabaseError",
            message: err.to_string(),
        }
    }
}

pub async fn handler404(path: Uri) -> Response {
    (StatusCode::NOT_FOUND, views::not_found_page(path.path())).into_response()
}
