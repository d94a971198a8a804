use snafu::Snafu;

use crate::mode::Mode;
use crate::upload::UploadStatus;

/// Refusals returned by session operations.
///
/// A refused call has not touched the session: nothing was appended and no request was sent.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    #[snafu(display("question text is empty on `{stage}`"))]
    EmptyQuestion { stage: &'static str },
    #[snafu(display("another exchange is still in flight on `{stage}`"))]
    ExchangeInFlight { stage: &'static str },
    #[snafu(display("document is not ready for questions on `{stage}` (upload status {status:?})"))]
    DocumentNotReady {
        stage: &'static str,
        status: UploadStatus,
    },
    #[snafu(display("no file is selected for upload on `{stage}` (upload status {status:?})"))]
    NoFileSelected {
        stage: &'static str,
        status: UploadStatus,
    },
    #[snafu(display("uploads require document mode on `{stage}`, current mode is {mode}"))]
    UploadRequiresDocumentMode { stage: &'static str, mode: Mode },
    #[snafu(display("an upload is already in progress on `{stage}`"))]
    UploadInProgress { stage: &'static str },
}

pub type SessionResult<T> = Result<T, SessionError>;
