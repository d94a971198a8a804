use std::fmt;
use std::sync::Arc;

pub const DEFAULT_CONTENT_TYPE: &str = "application/pdf";

pub const UPLOADING_STATUS_MESSAGE: &str = "Analysing document...";
pub const READY_STATUS_MESSAGE: &str = "PDF uploaded and processed successfully!";
pub const UPLOAD_FALLBACK_ERROR: &str = "Error uploading file.";

/// A document candidate selected by the user.
///
/// Bytes are reference counted so snapshots and session clones share one payload. Transports
/// that need an owned buffer copy it once per request.
#[derive(Clone, PartialEq, Eq)]
pub struct DocumentFile {
    name: String,
    content_type: String,
    bytes: Arc<[u8]>,
}

impl DocumentFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for DocumentFile {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DocumentFile")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UploadStatus {
    #[default]
    Empty,
    Selected,
    Uploading,
    Ready,
    Failed,
}

/// Document upload sub-state.
///
/// Transitions are only reachable through [`crate::ChatSession`], which pairs them with the
/// busy flag and the mode checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadState {
    candidate: Option<DocumentFile>,
    status: UploadStatus,
    status_message: String,
}

impl UploadState {
    pub fn candidate(&self) -> Option<&DocumentFile> {
        self.candidate.as_ref()
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    /// Document questions are allowed iff the upload finished successfully.
    pub fn is_ready(&self) -> bool {
        self.status == UploadStatus::Ready
    }

    pub fn is_uploading(&self) -> bool {
        self.status == UploadStatus::Uploading
    }

    pub(crate) fn select(&mut self, file: DocumentFile) {
        self.status_message = format!("Ready to upload: {}", file.name());
        self.candidate = Some(file);
        self.status = UploadStatus::Selected;
    }

    /// Moves `Selected` to `Uploading` and hands out the file to send.
    pub(crate) fn start(&mut self) -> Option<DocumentFile> {
        if self.status != UploadStatus::Selected {
            return None;
        }
        let file = self.candidate.clone()?;
        self.status = UploadStatus::Uploading;
        self.status_message = UPLOADING_STATUS_MESSAGE.to_string();
        Some(file)
    }

    pub(crate) fn finish_ready(&mut self) {
        self.status = UploadStatus::Ready;
        self.status_message = READY_STATUS_MESSAGE.to_string();
    }

    pub(crate) fn finish_failed(&mut self, message: impl Into<String>) {
        self.status = UploadStatus::Failed;
        self.status_message = message.into();
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> DocumentFile {
        DocumentFile::new("notes.pdf", b"%PDF-1.7".to_vec())
    }

    #[test]
    fn clones_share_one_payload() {
        let file = sample_file().with_content_type("application/octet-stream");
        let mut state = UploadState::default();
        state.select(file.clone());

        let candidate = state.candidate().unwrap();
        assert!(std::ptr::eq(candidate.bytes().as_ptr(), file.bytes().as_ptr()));
        assert_eq!(candidate.content_type(), "application/octet-stream");
    }

    #[test]
    fn select_sets_candidate_and_message() {
        let mut state = UploadState::default();
        state.select(sample_file());

        assert_eq!(state.status(), UploadStatus::Selected);
        assert_eq!(state.status_message(), "Ready to upload: notes.pdf");
        assert_eq!(state.candidate().map(DocumentFile::name), Some("notes.pdf"));
    }

    #[test]
    fn start_requires_selected_status() {
        let mut state = UploadState::default();
        assert!(state.start().is_none());
        assert_eq!(state, UploadState::default());

        state.select(sample_file());
        let file = state.start().expect("selected file should start");
        assert_eq!(file.name(), "notes.pdf");
        assert!(state.is_uploading());

        // A second start while uploading is refused.
        assert!(state.start().is_none());
    }

    #[test]
    fn failed_upload_can_be_reselected() {
        let mut state = UploadState::default();
        state.select(sample_file());
        state.start();
        state.finish_failed("bad pdf");
        assert_eq!(state.status(), UploadStatus::Failed);
        assert_eq!(state.status_message(), "bad pdf");

        state.select(DocumentFile::new("fixed.pdf", Vec::<u8>::new()));
        assert_eq!(state.status(), UploadStatus::Selected);
    }

    #[test]
    fn debug_output_omits_payload() {
        let rendered = format!("{:?}", sample_file());
        assert!(rendered.contains("size_bytes: 8"));
        assert!(!rendered.contains("PDF-1.7"));
    }
}
