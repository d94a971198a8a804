use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use snafu::{OptionExt, ensure};
use tokio::sync::watch;

use crate::error::{
    DocumentNotReadySnafu, EmptyQuestionSnafu, ExchangeInFlightSnafu, NoFileSelectedSnafu,
    SessionResult, UploadInProgressSnafu, UploadRequiresDocumentModeSnafu,
};
use crate::message::{ChatTurn, MessageLog};
use crate::mode::Mode;
use crate::service::{AnsweringService, AskRequest, UploadService};
use crate::trigger::{StudyTrigger, TriggerGuard, TriggerId, TriggerOutcome, TriggerRefusal};
use crate::upload::{DocumentFile, UPLOAD_FALLBACK_ERROR, UploadState, UploadStatus};

pub const EXCHANGE_FALLBACK_ERROR: &str = "Sorry, I encountered an error.";
pub const STUDY_FALLBACK_ERROR: &str =
    "Sorry, I encountered an error while trying to help you study.";
pub const DOCUMENT_WELCOME_MESSAGE: &str = "**PDF Upload Complete!**\n\n\
Your document has been successfully processed and I'm ready to answer questions about it. \
You can ask me to:\n\n\
- **Summarize** the main points\n\
- **Explain** specific concepts\n\
- **Find** particular information\n\
- **Compare** different sections\n\n\
What would you like to know about your document?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Append an assistant welcome turn once a document becomes ready.
    pub welcome_on_ready: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            welcome_on_ready: true,
        }
    }
}

/// How an admitted exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Answered,
    Failed { message: String },
    /// The session was reset while the request was in flight; the reply was dropped.
    Discarded,
}

/// How an admitted upload ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Ready,
    Failed { message: String },
    Discarded,
}

/// Read model handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub mode: Mode,
    pub turns: Vec<ChatTurn>,
    pub upload_status: UploadStatus,
    pub upload_message: String,
    pub candidate_name: Option<String>,
    pub busy: bool,
    pub draft: String,
    pub trigger_phase: crate::trigger::TriggerPhase,
}

#[derive(Debug, Default)]
struct SessionState {
    mode: Mode,
    log: MessageLog,
    upload: UploadState,
    trigger: TriggerGuard,
    draft: String,
    // Bumped on every reset so replies started before it can be recognised as stale.
    epoch: u64,
}

impl SessionState {
    fn reset_for_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.log.clear();
        self.upload.reset();
        self.trigger.rearm();
        self.draft.clear();
        self.epoch = self.epoch.wrapping_add(1);
    }

    fn reset_document(&mut self) {
        self.log.clear();
        self.upload.reset();
        self.epoch = self.epoch.wrapping_add(1);
    }
}

/// Holds the busy flag for the lifetime of one exchange or upload.
///
/// Dropping it clears the flag, so a failed, panicking, or cancelled request can never leave
/// the session wedged.
struct InFlight {
    busy: Arc<watch::Sender<bool>>,
}

impl InFlight {
    fn acquire(busy: &Arc<watch::Sender<bool>>) -> Option<Self> {
        let acquired = busy.send_if_modified(|flag| {
            if *flag {
                false
            } else {
                *flag = true;
                true
            }
        });
        acquired.then(|| Self { busy: busy.clone() })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.busy.send_replace(false);
    }
}

struct PreparedExchange {
    in_flight: InFlight,
    request: AskRequest,
    epoch: u64,
}

enum TriggerAdmission {
    Start(PreparedExchange),
    Refused(TriggerRefusal),
    Busy,
}

/// Conversation session shared by the shell and background tasks.
///
/// Cloning yields another handle to the same session. State is only locked for synchronous
/// transitions, never across a collaborator call.
#[derive(Clone)]
pub struct ChatSession {
    state: Arc<Mutex<SessionState>>,
    busy: Arc<watch::Sender<bool>>,
    answering: Arc<dyn AnsweringService>,
    uploader: Arc<dyn UploadService>,
    options: SessionOptions,
}

impl ChatSession {
    pub fn new(answering: Arc<dyn AnsweringService>, uploader: Arc<dyn UploadService>) -> Self {
        Self::with_options(answering, uploader, SessionOptions::default())
    }

    pub fn with_options(
        answering: Arc<dyn AnsweringService>,
        uploader: Arc<dyn UploadService>,
        options: SessionOptions,
    ) -> Self {
        let (busy, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            busy: Arc::new(busy),
            answering,
            uploader,
            options,
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> Mode {
        self.state().mode
    }

    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state();
        SessionSnapshot {
            mode: state.mode,
            turns: state.log.turns().to_vec(),
            upload_status: state.upload.status(),
            upload_message: state.upload.status_message().to_string(),
            candidate_name: state
                .upload
                .candidate()
                .map(|file| file.name().to_string()),
            busy: self.is_busy(),
            draft: state.draft.clone(),
            trigger_phase: state.trigger.phase(),
        }
    }

    /// Switches mode and resets the log, the upload state, and the trigger record together.
    pub fn set_mode(&self, mode: Mode) {
        let mut state = self.state();
        let previous = state.mode;
        state.reset_for_mode(mode);
        tracing::info!(
            previous = %previous,
            mode = %mode,
            epoch = state.epoch,
            "switched conversation mode"
        );
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        self.state().draft = text.into();
    }

    pub fn draft(&self) -> String {
        self.state().draft.clone()
    }

    /// Sends one question in the current mode.
    ///
    /// On admission the log grows by exactly one user turn now and one assistant turn when the
    /// collaborator resolves, unless the session is reset in between.
    pub async fn submit(&self, text: impl Into<String>) -> SessionResult<ExchangeOutcome> {
        let prepared = {
            let mut state = self.state();
            self.admit_exchange(&mut state, text.into(), "submit")?
        };
        Ok(self.run_exchange(prepared, EXCHANGE_FALLBACK_ERROR).await)
    }

    /// Submits the staged draft, clearing it as soon as the exchange is admitted.
    pub async fn submit_draft(&self) -> SessionResult<ExchangeOutcome> {
        let prepared = {
            let mut state = self.state();
            let text = state.draft.clone();
            let prepared = self.admit_exchange(&mut state, text, "submit-draft")?;
            state.draft.clear();
            prepared
        };
        Ok(self.run_exchange(prepared, EXCHANGE_FALLBACK_ERROR).await)
    }

    fn admit_exchange(
        &self,
        state: &mut SessionState,
        text: String,
        stage: &'static str,
    ) -> SessionResult<PreparedExchange> {
        ensure!(!text.trim().is_empty(), EmptyQuestionSnafu { stage });
        ensure!(!self.is_busy(), ExchangeInFlightSnafu { stage });
        if state.mode == Mode::Document {
            ensure!(
                state.upload.is_ready(),
                DocumentNotReadySnafu {
                    stage,
                    status: state.upload.status(),
                }
            );
        }

        let in_flight = InFlight::acquire(&self.busy).context(ExchangeInFlightSnafu { stage })?;
        Ok(Self::open_exchange(state, in_flight, text))
    }

    fn open_exchange(
        state: &mut SessionState,
        in_flight: InFlight,
        text: String,
    ) -> PreparedExchange {
        let request = AskRequest::new(text.clone(), state.mode.is_general());
        state.log.append(ChatTurn::user(text));
        tracing::debug!(
            mode = %state.mode,
            epoch = state.epoch,
            question_len = request.question.len(),
            "exchange admitted"
        );
        PreparedExchange {
            in_flight,
            request,
            epoch: state.epoch,
        }
    }

    async fn run_exchange(&self, prepared: PreparedExchange, fallback: &str) -> ExchangeOutcome {
        let PreparedExchange {
            in_flight,
            request,
            epoch,
        } = prepared;
        let is_general = request.is_general;

        let result = self.answering.ask(request).await;

        let mut state = self.state();
        if state.epoch != epoch {
            tracing::debug!(
                started_epoch = epoch,
                current_epoch = state.epoch,
                "dropping reply for a conversation that was reset"
            );
            return ExchangeOutcome::Discarded;
        }

        let outcome = match result {
            Ok(response) => {
                tracing::info!(is_general, answer_len = response.answer.len(), "answer received");
                state.log.append(ChatTurn::assistant(response.answer));
                ExchangeOutcome::Answered
            }
            Err(error) => {
                tracing::warn!(is_general, error = %error, "answering service failed");
                let message = error.user_message_or(fallback).to_string();
                state.log.append(ChatTurn::assistant(message.clone()));
                ExchangeOutcome::Failed { message }
            }
        };

        // Release the busy flag only after the reply is visible.
        drop(state);
        drop(in_flight);
        outcome
    }

    /// Stages a document for upload. Refused while an upload is running.
    pub fn select_file(&self, file: DocumentFile) -> SessionResult<()> {
        let mut state = self.state();
        ensure!(
            !state.upload.is_uploading(),
            UploadInProgressSnafu {
                stage: "select-file",
            }
        );
        tracing::info!(file = %file.name(), size_bytes = file.len(), "document selected");
        state.upload.select(file);
        Ok(())
    }

    /// Uploads the selected document and gates document questions on the result.
    pub async fn begin_upload(&self) -> SessionResult<UploadOutcome> {
        let stage = "begin-upload";
        let (in_flight, file, epoch) = {
            let mut state = self.state();
            ensure!(
                state.mode == Mode::Document,
                UploadRequiresDocumentModeSnafu {
                    stage,
                    mode: state.mode,
                }
            );
            match state.upload.status() {
                UploadStatus::Selected => {}
                UploadStatus::Uploading => return UploadInProgressSnafu { stage }.fail(),
                status @ (UploadStatus::Empty | UploadStatus::Ready | UploadStatus::Failed) => {
                    return NoFileSelectedSnafu { stage, status }.fail();
                }
            }
            let in_flight =
                InFlight::acquire(&self.busy).context(ExchangeInFlightSnafu { stage })?;
            let file = state
                .upload
                .start()
                .context(NoFileSelectedSnafu {
                    stage,
                    status: state.upload.status(),
                })?;
            state.log.clear();
            (in_flight, file, state.epoch)
        };

        tracing::info!(file = %file.name(), size_bytes = file.len(), "uploading document");
        let result = self.uploader.upload(file).await;

        let mut state = self.state();
        if state.epoch != epoch {
            tracing::debug!(
                started_epoch = epoch,
                current_epoch = state.epoch,
                "dropping upload result for a conversation that was reset"
            );
            return Ok(UploadOutcome::Discarded);
        }

        let outcome = match result {
            Ok(_) => {
                state.upload.finish_ready();
                if self.options.welcome_on_ready {
                    state.log.append(ChatTurn::assistant(DOCUMENT_WELCOME_MESSAGE));
                }
                tracing::info!("document ready for questions");
                UploadOutcome::Ready
            }
            Err(error) => {
                tracing::warn!(error = %error, "upload service failed");
                let message = error.user_message_or(UPLOAD_FALLBACK_ERROR).to_string();
                state.upload.finish_failed(message.clone());
                UploadOutcome::Failed { message }
            }
        };

        drop(state);
        drop(in_flight);
        Ok(outcome)
    }

    /// Drops the current document and the conversation about it. Mode is unchanged.
    pub fn clear(&self) {
        let mut state = self.state();
        state.reset_document();
        tracing::info!(mode = %state.mode, "document and conversation cleared");
    }

    /// Dismisses the document and returns to general chat.
    ///
    /// Unlike [`ChatSession::set_mode`] this keeps the consumed trigger record.
    pub fn clear_document(&self) {
        let mut state = self.state();
        state.reset_document();
        state.mode = Mode::General;
        state.draft.clear();
        tracing::info!("document dismissed, back to general chat");
    }

    /// Converts an external study request into at most one general-mode exchange.
    ///
    /// A trigger that arrives while another exchange is running waits for it once; if the
    /// session is still busy after that the trigger is dropped and the guard stays idle.
    pub async fn deliver_trigger(&self, trigger: StudyTrigger) -> TriggerOutcome {
        let identity = trigger.identity();

        match self.admit_trigger(&trigger, &identity) {
            TriggerAdmission::Start(prepared) => {
                return TriggerOutcome::Submitted(
                    self.run_exchange(prepared, STUDY_FALLBACK_ERROR).await,
                );
            }
            TriggerAdmission::Refused(refusal) => {
                tracing::debug!(trigger = %identity, ?refusal, "study trigger ignored");
                return TriggerOutcome::Ignored(refusal);
            }
            TriggerAdmission::Busy => {
                tracing::debug!(trigger = %identity, "study trigger waiting for the active exchange");
            }
        }

        let mut busy_updates = self.busy.subscribe();
        let _ = busy_updates.wait_for(|busy| !*busy).await;

        match self.admit_trigger(&trigger, &identity) {
            TriggerAdmission::Start(prepared) => {
                TriggerOutcome::Submitted(self.run_exchange(prepared, STUDY_FALLBACK_ERROR).await)
            }
            TriggerAdmission::Refused(refusal) => {
                tracing::debug!(trigger = %identity, ?refusal, "study trigger ignored after wait");
                TriggerOutcome::Ignored(refusal)
            }
            // Only reachable on a multi-threaded runtime, when another worker takes the flag
            // between `wait_for` returning and re-admission.
            TriggerAdmission::Busy => {
                let reason = "another exchange started before the study request could run";
                tracing::warn!(trigger = %identity, reason, "study trigger dropped");
                TriggerOutcome::Dropped {
                    reason: reason.to_string(),
                }
            }
        }
    }

    fn admit_trigger(&self, trigger: &StudyTrigger, identity: &TriggerId) -> TriggerAdmission {
        let mut state = self.state();
        if let Err(refusal) = state.trigger.check(identity) {
            return TriggerAdmission::Refused(refusal);
        }
        let Some(in_flight) = InFlight::acquire(&self.busy) else {
            return TriggerAdmission::Busy;
        };

        state.reset_for_mode(Mode::General);
        state.trigger.begin();
        let prompt = trigger.study_prompt();
        state.trigger.commit(identity.clone());
        tracing::info!(
            trigger = %identity,
            title = %trigger.title(),
            origin = %trigger.origin(),
            "study trigger consumed"
        );

        TriggerAdmission::Start(Self::open_exchange(&mut state, in_flight, prompt))
    }
}
