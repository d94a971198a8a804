use crate::mode::Mode;
use crate::session::SessionSnapshot;
use crate::upload::UploadStatus;

pub const GENERAL_PLACEHOLDER: &str = "Ask me anything about scheduling, planning, or general topics...";
pub const DOCUMENT_READY_PLACEHOLDER: &str = "Ask about your document...";
pub const DOCUMENT_PENDING_PLACEHOLDER: &str = "Upload a PDF first using the + button...";

/// Hint shown while the conversation has nothing in it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyState {
    pub title: &'static str,
    pub hint: &'static str,
}

/// Enablement of the input affordances, derived from one snapshot.
///
/// Everything here is a pure function of session state so the shell never has to re-derive the
/// busy and readiness rules on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposerView {
    pub input_enabled: bool,
    pub upload_affordance_visible: bool,
    /// Selected-but-not-ready file row with its upload button.
    pub pending_file: Option<String>,
    pub upload_button_enabled: bool,
    pub thinking: bool,
    pub placeholder: &'static str,
    pub assistant_label: &'static str,
    pub empty_state: Option<EmptyState>,
}

impl ComposerView {
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        let document_mode = snapshot.mode == Mode::Document;
        let document_ready = snapshot.upload_status == UploadStatus::Ready;

        let placeholder = match (document_mode, document_ready) {
            (false, _) => GENERAL_PLACEHOLDER,
            (true, true) => DOCUMENT_READY_PLACEHOLDER,
            (true, false) => DOCUMENT_PENDING_PLACEHOLDER,
        };

        let pending_file = if document_mode && !document_ready {
            snapshot.candidate_name.clone()
        } else {
            None
        };

        let empty_state = (snapshot.turns.is_empty() && snapshot.upload_message.is_empty())
            .then(|| Self::empty_state(snapshot.mode));

        Self {
            input_enabled: !snapshot.busy && (!document_mode || document_ready),
            upload_affordance_visible: document_mode,
            pending_file,
            upload_button_enabled: !snapshot.busy,
            thinking: snapshot.busy,
            placeholder,
            assistant_label: if document_mode {
                "Document Assistant"
            } else {
                "AI Assistant"
            },
            empty_state,
        }
    }

    /// Whether the send action is available for the given draft.
    pub fn can_submit(&self, draft: &str) -> bool {
        self.input_enabled && !draft.trim().is_empty()
    }

    fn empty_state(mode: Mode) -> EmptyState {
        match mode {
            Mode::General => EmptyState {
                title: "AI Assistant Ready!",
                hint: "Ask me anything! I can help with scheduling, planning, learning, or general questions.",
            },
            Mode::Document => EmptyState {
                title: "Ready for PDF Chat!",
                hint: "Click the + button to upload a PDF and start asking questions about it.",
            },
        }
    }
}
