//! Error handler for accounts.

use std::borrow::Cow;

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use validator::{ValidationError, ValidationErrors};

use crate::media::MediaError;

pub type Result<T> = std::result::Result<T, AccountError>;

/// Enum representing account errors.
#[derive(Debug, Error)]
pub enum AccountError {
    /// A value the factory cannot work without is empty.
    #[error("{0}")]
    MissingField(&'static str),

    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    /// A storage unique constraint rejected the write.
    #[error("{field} already exists")]
    Duplicate { field: &'static str },

    #[error("resource not found")]
    NotFound,

    #[error("missing acting user")]
    Unauthorized,

    #[error("permission denied")]
    Forbidden,

    #[error("SQL request failed: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("internal server error, {details}")]
    Internal { details: String },
}

impl AccountError {
    /// Build a single-field [`AccountError::Validation`].
    pub fn field(
        field: &'static str,
        code: &'static str,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, ValidationError::new(code).with_message(message.into()));
        Self::Validation(errors)
    }

    /// Turn a storage uniqueness violation into a field error carrying
    /// `message`; other errors pass through.
    pub fn duplicate_as_field(self, message: impl FnOnce(&'static str) -> String) -> Self {
        match self {
            AccountError::Duplicate { field } => Self::field(field, "unique", message(field)),
            err => err,
        }
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(self) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut fields = errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue.to_string(),
            })
        })
        .collect::<Vec<_>>();
    fields.sort_by(|a, b| a.field.cmp(&b.field));
    fields
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .title("There were validation errors with your request.")
            .details(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match &self {
            AccountError::Validation(validation_errors) => response.errors(validation_errors),

            AccountError::Duplicate { .. } => response.status(StatusCode::CONFLICT),

            AccountError::NotFound => response
                .title("Resource not found.")
                .status(StatusCode::NOT_FOUND),

            AccountError::Unauthorized => response
                .title("Missing acting user.")
                .status(StatusCode::UNAUTHORIZED),

            AccountError::Forbidden => response
                .title("You do not have permission to perform this action.")
                .status(StatusCode::FORBIDDEN),

            AccountError::Axum(rejection) => response
                .title("Request body could not be parsed.")
                .details(&rejection.body_text()),

            AccountError::Media(MediaError::TooLarge { .. }) => response
                .title("Uploaded image is too large.")
                .status(StatusCode::PAYLOAD_TOO_LARGE),

            AccountError::Media(MediaError::Image(_) | MediaError::Empty) => {
                response.title("Uploaded image could not be processed.")
            },

            AccountError::MissingField(_) => response,

            AccountError::Sql(_)
            | AccountError::Migrate(_)
            | AccountError::Crypto(_)
            | AccountError::Media(MediaError::Io(_) | MediaError::Task(_))
            | AccountError::Internal { .. } => {
                tracing::error!(error = %self, "server returned 500 status");

                ResponseError::default()
            },
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
