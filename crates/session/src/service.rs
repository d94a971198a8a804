use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::upload::DocumentFile;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Body of one question sent to the answering service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub question: String,
    pub is_general: bool,
}

impl AskRequest {
    pub fn new(question: impl Into<String>, is_general: bool) -> Self {
        Self {
            question: question.into(),
            is_general,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
}

/// Acknowledgement of a processed document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub message: Option<String>,
}

/// Failure reported by a boundary collaborator.
///
/// Only [`ServiceError::Reported`] carries text meant for the user; every other variant is
/// rendered through the caller's fallback message.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ServiceError {
    #[snafu(display("service reported an error on `{stage}`: {message}"))]
    Reported {
        stage: &'static str,
        status: Option<u16>,
        message: String,
    },
    #[snafu(display("service request failed on `{stage}`: {details}"))]
    Unavailable {
        stage: &'static str,
        status: Option<u16>,
        details: String,
    },
    #[snafu(display("service response could not be decoded on `{stage}`: {details}"))]
    MalformedResponse {
        stage: &'static str,
        details: String,
    },
}

impl ServiceError {
    /// User-facing message supplied by the service, if any.
    pub fn reported_message(&self) -> Option<&str> {
        match self {
            Self::Reported { message, .. } if !message.trim().is_empty() => Some(message.as_str()),
            Self::Reported { .. } | Self::Unavailable { .. } | Self::MalformedResponse { .. } => {
                None
            }
        }
    }

    pub fn user_message_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.reported_message().unwrap_or(fallback)
    }
}

/// Remote question answering endpoint.
pub trait AnsweringService: Send + Sync {
    fn ask<'a>(&'a self, request: AskRequest) -> BoxFuture<'a, ServiceResult<AskResponse>>;
}

/// Remote document ingestion endpoint.
pub trait UploadService: Send + Sync {
    fn upload<'a>(&'a self, document: DocumentFile) -> BoxFuture<'a, ServiceResult<UploadReceipt>>;
}
