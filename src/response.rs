use axum::{http::StatusCode, Json};
use serde::Serialize;

/// JSON envelope every endpoint answers with.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl Envelope<()> {
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

pub type ApiJson<T> = Json<Envelope<T>>;

pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> ApiJson<T> {
    Json(Envelope::ok(message, data))
}

pub fn created<T: Serialize>(message: impl Into<String>, data: T) -> (StatusCode, ApiJson<T>) {
    (StatusCode::CREATED, Json(Envelope::ok(message, data)))
}

pub fn done(message: impl Into<String>) -> ApiJson<()> {
    Json(Envelope::done(message))
}
