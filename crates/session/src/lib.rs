#![deny(unsafe_code)]

//! Client-side conversation state for general and document-scoped chat.
//!
//! [`ChatSession`] owns the mode, the message log, the upload state, the busy flag, and the
//! study-trigger record. Remote answering and document ingestion are reached through the
//! [`AnsweringService`] and [`UploadService`] contracts.

/// Derived input enablement for presentation layers.
pub mod composer;
pub mod error;
pub mod message;
pub mod mode;
pub mod service;
/// Session context and the request lifecycle.
pub mod session;
pub mod trigger;
pub mod upload;

pub use composer::{ComposerView, EmptyState};
pub use error::{SessionError, SessionResult};
pub use message::{ChatTurn, MessageLog, Sender};
pub use mode::Mode;
pub use service::{
    AnsweringService, AskRequest, AskResponse, BoxFuture, ServiceError, ServiceResult,
    UploadReceipt, UploadService,
};
pub use session::{
    ChatSession, DOCUMENT_WELCOME_MESSAGE, EXCHANGE_FALLBACK_ERROR, ExchangeOutcome,
    STUDY_FALLBACK_ERROR, SessionOptions, SessionSnapshot, UploadOutcome,
};
pub use trigger::{
    DEFAULT_ORIGIN_LABEL, StudyTrigger, TriggerGuard, TriggerId, TriggerOutcome,
    TriggerParseError, TriggerPhase, TriggerRefusal,
};
pub use upload::{DocumentFile, UploadState, UploadStatus};
