use std::path::{Path, PathBuf};
use std::sync::Arc;

use snafu::{ResultExt, Snafu, ensure};
use studychat_rag::{RagClient, RagClientError};
use studychat_session::{
    ChatSession, ChatTurn, ComposerView, DocumentFile, ExchangeOutcome, Mode, Sender,
    SessionError, StudyTrigger, TriggerOutcome, TriggerParseError, TriggerRefusal, UploadOutcome,
    UploadStatus,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::{JoinError, JoinSet};

use crate::live::LiveRagClient;
use crate::settings::{SessionSettings, SettingsError, SettingsStore};

pub const HELP_TEXT: &str = "\
commands:
  <text>            ask a question in the current mode
  /general          switch to general chat (clears the conversation)
  /document         switch to document chat (clears the conversation)
  /select <path>    stage a document for upload
  /upload           upload the staged document
  /clear            drop the document and the conversation
  /close            drop the document and return to general chat
  /set <key> <value>
                    change and save a setting (service.base_url, service.connect_timeout_ms,
                    service.request_timeout_ms, session.accepted_extensions)
  /study <json>     deliver a study request, e.g. {\"task\":{\"id\":1,\"task_title\":\"Graphs\"}}
  /show             print the conversation and composer state
  /help             print this help
  /quit             exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    SetMode(Mode),
    Select(PathBuf),
    Upload,
    Clear,
    CloseDocument,
    Study(String),
    Set { key: String, value: String },
    Show,
    Help,
    Quit,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ShellError {
    #[snafu(display("unknown command `/{name}`, try /help"))]
    UnknownCommand { stage: &'static str, name: String },
    #[snafu(display("`/{name}` needs an argument"))]
    MissingArgument {
        stage: &'static str,
        name: &'static str,
    },
    #[snafu(display("failed to read {path:?} on `{stage}`: {source}"))]
    ReadDocument {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("{path:?} is not an accepted document type (accepted: {accepted})"))]
    UnsupportedDocument {
        stage: &'static str,
        path: PathBuf,
        accepted: String,
    },
    #[snafu(display("invalid study request: {source}"))]
    InvalidStudyRequest {
        stage: &'static str,
        source: TriggerParseError,
    },
    #[snafu(display("settings cannot be changed in this shell"))]
    SettingsUnavailable { stage: &'static str },
    #[snafu(display("{source}"))]
    Setting {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("service settings rejected, keeping the current connection: {source}"))]
    Reconnect {
        stage: &'static str,
        source: RagClientError,
    },
    #[snafu(display("{source}"))]
    Refused {
        stage: &'static str,
        source: SessionError,
    },
    #[snafu(display("failed to write shell output on `{stage}`: {source}"))]
    WriteOutput {
        stage: &'static str,
        source: std::io::Error,
    },
}

pub type ShellResult<T> = Result<T, ShellError>;

/// Parses one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> ShellResult<Option<Command>> {
    let stage = "parse-command";
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Ask(line.to_string())));
    };

    let (name, argument) = match rest.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (rest, ""),
    };
    let required = |name: &'static str| -> ShellResult<String> {
        ensure!(!argument.is_empty(), MissingArgumentSnafu { stage, name });
        Ok(argument.to_string())
    };

    let command = match name {
        "general" | "g" => Command::SetMode(Mode::General),
        "document" | "doc" | "d" => Command::SetMode(Mode::Document),
        "select" => Command::Select(PathBuf::from(required("select")?)),
        "upload" => Command::Upload,
        "clear" => Command::Clear,
        "close" => Command::CloseDocument,
        "study" => Command::Study(required("study")?),
        "set" => {
            let assignment = required("set")?;
            let Some((key, value)) = assignment.split_once(char::is_whitespace) else {
                return MissingArgumentSnafu { stage, name: "set" }.fail();
            };
            Command::Set {
                key: key.to_string(),
                value: value.trim().to_string(),
            }
        }
        "show" => Command::Show,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => {
            return UnknownCommandSnafu {
                stage,
                name: other.to_string(),
            }
            .fail();
        }
    };
    Ok(Some(command))
}

/// Result of one background session task.
#[derive(Debug)]
pub enum Completion {
    Exchange(Result<ExchangeOutcome, SessionError>),
    Upload(Result<UploadOutcome, SessionError>),
    Study(TriggerOutcome),
}

/// Whether the read loop should keep going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Persistent settings plus the live client they configure, used by `/set`.
pub struct SettingsLink {
    pub store: SettingsStore,
    pub client: Arc<LiveRagClient>,
}

/// Line-oriented front end over a [`ChatSession`].
///
/// Exchanges and uploads run as background tasks so mode switches and clears stay responsive
/// while a request is in flight. Output is incremental: only turns not yet printed are written.
pub struct Shell<W> {
    session: ChatSession,
    settings: SessionSettings,
    link: Option<SettingsLink>,
    output: W,
    pending: JoinSet<Completion>,
    printed: Vec<ChatTurn>,
}

impl<W> Shell<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(session: ChatSession, settings: SessionSettings, output: W) -> Self {
        Self {
            session,
            settings,
            link: None,
            output,
            pending: JoinSet::new(),
            printed: Vec::new(),
        }
    }

    pub fn with_settings_link(mut self, link: SettingsLink) -> Self {
        self.link = Some(link);
        self
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Parses and runs one input line, reporting refusals inline.
    pub async fn handle_line(&mut self, line: &str) -> ShellResult<Flow> {
        let command = match parse_command(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(Flow::Continue),
            Err(error) => {
                self.note(&error.to_string()).await?;
                return Ok(Flow::Continue);
            }
        };
        match self.execute(command).await {
            Ok(flow) => Ok(flow),
            Err(error @ ShellError::WriteOutput { .. }) => Err(error),
            Err(error) => {
                tracing::debug!(error = %error, "command refused");
                self.note(&error.to_string()).await?;
                Ok(Flow::Continue)
            }
        }
    }

    pub async fn execute(&mut self, command: Command) -> ShellResult<Flow> {
        match command {
            Command::Ask(text) => {
                let session = self.session.clone();
                self.pending
                    .spawn(async move { Completion::Exchange(session.submit(text).await) });
                // Let the exchange append the user turn (or refuse) before echoing it.
                tokio::task::yield_now().await;
                self.render_turns().await?;
            }
            Command::SetMode(mode) => {
                self.session.set_mode(mode);
                self.note(&format!("switched to {mode} chat")).await?;
                self.render_turns().await?;
            }
            Command::Select(path) => {
                let file = self.load_document(&path).await?;
                self.session
                    .select_file(file)
                    .context(RefusedSnafu { stage: "select" })?;
                self.render_status().await?;
                if self.session.mode() != Mode::Document {
                    self.note("switch to /document to upload it").await?;
                }
            }
            Command::Upload => {
                let session = self.session.clone();
                self.pending
                    .spawn(async move { Completion::Upload(session.begin_upload().await) });
                tokio::task::yield_now().await;
                self.render_turns().await?;
                if self.session.snapshot().upload_status == UploadStatus::Uploading {
                    self.render_status().await?;
                }
            }
            Command::Clear => {
                self.session.clear();
                self.note("document and conversation cleared").await?;
                self.render_turns().await?;
            }
            Command::CloseDocument => {
                self.session.clear_document();
                self.note("document closed, back to general chat").await?;
                self.render_turns().await?;
            }
            Command::Study(raw) => {
                let trigger = StudyTrigger::from_handoff_json(&raw)
                    .context(InvalidStudyRequestSnafu { stage: "study" })?;
                self.deliver(trigger).await?;
            }
            Command::Set { key, value } => self.apply_setting(&key, &value).await?,
            Command::Show => self.render_full().await?,
            Command::Help => self.write(HELP_TEXT).await?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Hands a study request to the session in the background.
    pub async fn deliver(&mut self, trigger: StudyTrigger) -> ShellResult<()> {
        tracing::info!(trigger = %trigger.identity(), title = %trigger.title(), "study request received");
        let session = self.session.clone();
        self.pending
            .spawn(async move { Completion::Study(session.deliver_trigger(trigger).await) });
        tokio::task::yield_now().await;
        self.render_turns().await
    }

    /// Waits for the next background task without rendering anything.
    ///
    /// Cancel safe: dropping the future before it resolves leaves the task in the set.
    pub async fn join_next(&mut self) -> Option<Result<Completion, JoinError>> {
        self.pending.join_next().await
    }

    /// Renders the effect of a task returned by [`Shell::join_next`].
    pub async fn render_completion(
        &mut self,
        joined: Result<Completion, JoinError>,
    ) -> ShellResult<()> {
        match joined {
            Ok(completion) => self.finish(completion).await,
            Err(error) => {
                tracing::error!(error = %error, "background session task failed");
                self.note("request task failed").await
            }
        }
    }

    /// Waits for the next background task and renders its effect. Returns `false` when idle.
    pub async fn next_completion(&mut self) -> ShellResult<bool> {
        let Some(joined) = self.join_next().await else {
            return Ok(false);
        };
        self.render_completion(joined).await?;
        Ok(true)
    }

    /// Drains every background task.
    pub async fn settle(&mut self) -> ShellResult<()> {
        while self.next_completion().await? {}
        Ok(())
    }

    async fn finish(&mut self, completion: Completion) -> ShellResult<()> {
        self.render_turns().await?;
        match completion {
            Completion::Exchange(Ok(outcome)) | Completion::Study(TriggerOutcome::Submitted(outcome)) => {
                if outcome == ExchangeOutcome::Discarded {
                    self.note("reply discarded, the conversation was reset").await?;
                }
            }
            Completion::Exchange(Err(error)) | Completion::Upload(Err(error)) => {
                self.note(&error.to_string()).await?;
            }
            Completion::Upload(Ok(UploadOutcome::Discarded)) => {
                self.note("upload result discarded, the conversation was reset").await?;
            }
            Completion::Upload(Ok(_)) => self.render_status().await?,
            Completion::Study(TriggerOutcome::Ignored(refusal)) => {
                let reason = match refusal {
                    TriggerRefusal::Duplicate => "this study request was already handled",
                    TriggerRefusal::AlreadyConsumed => {
                        "a study request was already handled, switch mode to accept another"
                    }
                };
                self.note(reason).await?;
            }
            Completion::Study(TriggerOutcome::Dropped { reason }) => {
                self.note(&format!("study request dropped: {reason}")).await?;
            }
        }
        Ok(())
    }

    async fn apply_setting(&mut self, key: &str, value: &str) -> ShellResult<()> {
        let stage = "apply-setting";
        let Some(link) = &self.link else {
            return SettingsUnavailableSnafu { stage }.fail();
        };
        let candidate = link
            .store
            .settings()
            .as_ref()
            .clone()
            .with_value(key, value)
            .context(SettingSnafu { stage })?;
        // Build the replacement first so a URL the client rejects is never written to disk.
        let replacement = if key.starts_with("service.") {
            Some(RagClient::new(candidate.service.clone()).context(ReconnectSnafu { stage })?)
        } else {
            None
        };
        let saved = link.store.save(candidate).context(SettingSnafu { stage })?;
        if let Some(client) = replacement {
            link.client.replace(client);
        }
        let saved_to = link.store.config_path().display().to_string();
        tracing::info!(key, path = %saved_to, "setting changed");
        self.settings = saved.session.clone();
        self.note(&format!("{key} updated and saved to {saved_to}")).await
    }

    async fn load_document(&self, path: &Path) -> ShellResult<DocumentFile> {
        let stage = "load-document";
        ensure!(
            self.settings.accepts(path),
            UnsupportedDocumentSnafu {
                stage,
                path: path.to_path_buf(),
                accepted: self.settings.accepted_extensions.join(", "),
            }
        );
        let bytes = tokio::fs::read(path).await.context(ReadDocumentSnafu {
            stage,
            path: path.to_path_buf(),
        })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let is_pdf = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("pdf"));
        let file = DocumentFile::new(name, bytes);
        Ok(if is_pdf {
            file
        } else {
            file.with_content_type("application/octet-stream")
        })
    }

    async fn render_turns(&mut self) -> ShellResult<()> {
        let turns = self.session.snapshot().turns;
        if !turns.starts_with(&self.printed) {
            self.printed.clear();
        }
        let fresh = turns[self.printed.len()..].to_vec();
        for turn in &fresh {
            let line = format_turn(turn);
            self.write(&line).await?;
        }
        self.printed = turns;
        Ok(())
    }

    async fn render_status(&mut self) -> ShellResult<()> {
        let snapshot = self.session.snapshot();
        if snapshot.upload_message.is_empty() {
            return Ok(());
        }
        self.note(&snapshot.upload_message).await
    }

    async fn render_full(&mut self) -> ShellResult<()> {
        let snapshot = self.session.snapshot();
        let view = ComposerView::from_snapshot(&snapshot);
        let mut report = format!("mode: {}\n", snapshot.mode);
        if let Some(empty) = view.empty_state {
            report.push_str(&format!("{}\n{}\n", empty.title, empty.hint));
        }
        for turn in &snapshot.turns {
            report.push_str(&format_turn(turn));
            report.push('\n');
        }
        if view.upload_affordance_visible {
            report.push_str(&format!(
                "document: {} ({:?}{})\n",
                view.pending_file.as_deref().unwrap_or("none"),
                snapshot.upload_status,
                if snapshot.upload_message.is_empty() {
                    String::new()
                } else {
                    format!(", {}", snapshot.upload_message)
                }
            ));
        }
        if view.thinking {
            report.push_str(&format!("{} is thinking...\n", view.assistant_label));
        }
        report.push_str(&format!(
            "input: {} ({})",
            if view.input_enabled { "enabled" } else { "disabled" },
            view.placeholder
        ));
        self.printed = snapshot.turns;
        self.write(&report).await
    }

    async fn note(&mut self, text: &str) -> ShellResult<()> {
        self.write(&format!("-- {text}")).await
    }

    async fn write(&mut self, text: &str) -> ShellResult<()> {
        let stage = "write-output";
        self.output
            .write_all(text.as_bytes())
            .await
            .context(WriteOutputSnafu { stage })?;
        self.output
            .write_all(b"\n")
            .await
            .context(WriteOutputSnafu { stage })?;
        self.output.flush().await.context(WriteOutputSnafu { stage })
    }
}

fn format_turn(turn: &ChatTurn) -> String {
    let label = match turn.sender() {
        Sender::User => "you",
        Sender::Assistant => "assistant",
    };
    format!("{label}> {}", turn.text())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use studychat_session::{
        AnsweringService, AskRequest, AskResponse, BoxFuture, DOCUMENT_WELCOME_MESSAGE,
        ServiceResult, UploadReceipt, UploadService,
    };

    use super::*;

    #[derive(Default)]
    struct CannedService {
        questions: AtomicUsize,
        uploads: AtomicUsize,
    }

    impl AnsweringService for CannedService {
        fn ask<'a>(&'a self, request: AskRequest) -> BoxFuture<'a, ServiceResult<AskResponse>> {
            self.questions.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let scope = if request.is_general { "general" } else { "document" };
                Ok(AskResponse {
                    answer: format!("{scope} answer"),
                })
            })
        }
    }

    impl UploadService for CannedService {
        fn upload<'a>(&'a self, _document: DocumentFile) -> BoxFuture<'a, ServiceResult<UploadReceipt>> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(UploadReceipt::default()) })
        }
    }

    /// Answers once the test sends on the gate.
    struct HeldAnswers {
        gate: std::sync::Mutex<Option<tokio::sync::oneshot::Receiver<()>>>,
    }

    impl AnsweringService for HeldAnswers {
        fn ask<'a>(&'a self, _request: AskRequest) -> BoxFuture<'a, ServiceResult<AskResponse>> {
            let gate = self.gate.lock().unwrap().take();
            Box::pin(async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Ok(AskResponse {
                    answer: "held answer".to_string(),
                })
            })
        }
    }

    fn shell() -> (Shell<Vec<u8>>, Arc<CannedService>) {
        let service = Arc::new(CannedService::default());
        let session = ChatSession::new(service.clone(), service.clone());
        (
            Shell::new(session, SessionSettings::default(), Vec::new()),
            service,
        )
    }

    fn printed(shell: &Shell<Vec<u8>>) -> String {
        String::from_utf8_lossy(shell.output()).into_owned()
    }

    #[test]
    fn parses_commands_and_questions() {
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(
            parse_command(" what is a graph? ").unwrap(),
            Some(Command::Ask("what is a graph?".to_string()))
        );
        assert_eq!(
            parse_command("/document").unwrap(),
            Some(Command::SetMode(Mode::Document))
        );
        assert_eq!(
            parse_command("/select  notes/week 1.pdf ").unwrap(),
            Some(Command::Select(PathBuf::from("notes/week 1.pdf")))
        );
        assert_eq!(
            parse_command(r#"/study {"task":{"name":"Graphs"}}"#).unwrap(),
            Some(Command::Study(r#"{"task":{"name":"Graphs"}}"#.to_string()))
        );
        assert_eq!(parse_command("/exit").unwrap(), Some(Command::Quit));
        assert_eq!(
            parse_command("/set service.base_url  http://10.0.0.5:5000/api/rag ").unwrap(),
            Some(Command::Set {
                key: "service.base_url".to_string(),
                value: "http://10.0.0.5:5000/api/rag".to_string(),
            })
        );
        assert!(matches!(
            parse_command("/set service.base_url"),
            Err(ShellError::MissingArgument { name: "set", .. })
        ));

        assert!(matches!(
            parse_command("/select"),
            Err(ShellError::MissingArgument { name: "select", .. })
        ));
        assert!(matches!(
            parse_command("/teleport"),
            Err(ShellError::UnknownCommand { .. })
        ));
    }

    #[tokio::test]
    async fn general_question_prints_both_turns() {
        let (mut shell, service) = shell();

        let flow = shell.handle_line("what is 2+2?").await.unwrap();
        shell.settle().await.unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(service.questions.load(Ordering::SeqCst), 1);
        let output = printed(&shell);
        assert!(output.contains("you> what is 2+2?\n"));
        assert!(output.contains("assistant> general answer\n"));
        assert_eq!(output.matches("you> ").count(), 1);
    }

    #[tokio::test]
    async fn document_question_before_upload_is_refused() {
        let (mut shell, service) = shell();

        shell.handle_line("/document").await.unwrap();
        shell.handle_line("summarize it").await.unwrap();
        shell.settle().await.unwrap();

        assert_eq!(service.questions.load(Ordering::SeqCst), 0);
        assert!(shell.session().snapshot().turns.is_empty());
        assert!(printed(&shell).contains("document is not ready"));
    }

    #[tokio::test]
    async fn select_upload_then_ask_about_document() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("lecture.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();
        let (mut shell, service) = shell();

        shell.handle_line("/document").await.unwrap();
        shell
            .handle_line(&format!("/select {}", path.display()))
            .await
            .unwrap();
        shell.handle_line("/upload").await.unwrap();
        shell.settle().await.unwrap();
        shell.handle_line("summarize it").await.unwrap();
        shell.settle().await.unwrap();

        assert_eq!(service.uploads.load(Ordering::SeqCst), 1);
        let output = printed(&shell);
        assert!(output.contains("-- Ready to upload: lecture.pdf"));
        assert!(output.contains("-- PDF uploaded and processed successfully!"));
        assert!(output.contains(DOCUMENT_WELCOME_MESSAGE));
        assert!(output.contains("assistant> document answer"));
    }

    #[tokio::test]
    async fn select_in_general_mode_hints_at_document_mode() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("scan.PDF");
        std::fs::write(&path, b"%PDF-1.7").unwrap();
        let (mut shell, _) = shell();

        shell
            .handle_line(&format!("/select {}", path.display()))
            .await
            .unwrap();

        let snapshot = shell.session().snapshot();
        assert_eq!(snapshot.upload_status, UploadStatus::Selected);
        assert!(printed(&shell).contains("-- switch to /document to upload it"));
    }

    #[tokio::test]
    async fn set_saves_setting_and_swaps_client() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("settings.json");
        let notes = directory.path().join("notes.txt");
        std::fs::write(&notes, b"plain notes").unwrap();
        let client = Arc::new(LiveRagClient::new(Default::default()).unwrap());
        let (shell, _) = shell();
        let mut shell = shell.with_settings_link(SettingsLink {
            store: SettingsStore::new(path.clone()),
            client: client.clone(),
        });

        shell
            .handle_line("/set service.base_url http://10.0.0.5:5000/api/rag/")
            .await
            .unwrap();
        shell
            .handle_line("/set session.accepted_extensions pdf,txt")
            .await
            .unwrap();
        shell.handle_line("/document").await.unwrap();
        shell
            .handle_line(&format!("/select {}", notes.display()))
            .await
            .unwrap();

        assert_eq!(
            client.current().config().ask_url(),
            "http://10.0.0.5:5000/api/rag/ask"
        );
        let reloaded = SettingsStore::new(path).settings();
        assert_eq!(reloaded.service.base_url, "http://10.0.0.5:5000/api/rag");
        assert_eq!(reloaded.session.accepted_extensions, ["pdf", "txt"]);
        let snapshot = shell.session().snapshot();
        assert_eq!(snapshot.upload_status, UploadStatus::Selected);
        assert!(printed(&shell).contains("-- service.base_url updated and saved to"));
    }

    #[tokio::test]
    async fn rejected_base_url_keeps_client_and_file() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("settings.json");
        let client = Arc::new(LiveRagClient::new(Default::default()).unwrap());
        let before = client.current();
        let (shell, _) = shell();
        let mut shell = shell.with_settings_link(SettingsLink {
            store: SettingsStore::new(path.clone()),
            client: client.clone(),
        });

        shell
            .handle_line("/set service.base_url ftp://files.local/rag")
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&before, &client.current()));
        assert!(!path.exists());
        assert!(printed(&shell).contains("keeping the current connection"));
    }

    #[tokio::test]
    async fn set_without_settings_link_is_reported() {
        let (mut shell, _) = shell();

        shell
            .handle_line("/set service.request_timeout_ms off")
            .await
            .unwrap();

        assert!(printed(&shell).contains("-- settings cannot be changed in this shell"));
    }

    #[tokio::test]
    async fn rejects_unaccepted_extension_without_touching_session() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("notes.docx");
        std::fs::write(&path, b"not a pdf").unwrap();
        let (mut shell, _) = shell();

        shell.handle_line("/document").await.unwrap();
        shell
            .handle_line(&format!("/select {}", path.display()))
            .await
            .unwrap();

        assert_eq!(
            shell.session().snapshot().upload_status,
            studychat_session::UploadStatus::Empty
        );
        assert!(printed(&shell).contains("is not an accepted document type"));
    }

    #[tokio::test]
    async fn repeated_study_request_runs_once() {
        let (mut shell, service) = shell();
        let request = r#"/study {"task":{"id":7,"task_title":"Graphs"},"scheduleName":"Week 3"}"#;

        shell.handle_line(request).await.unwrap();
        shell.settle().await.unwrap();
        shell.handle_line(request).await.unwrap();
        shell.settle().await.unwrap();

        assert_eq!(service.questions.load(Ordering::SeqCst), 1);
        let output = printed(&shell);
        assert!(output.contains("I want to study and learn about: \"Graphs\""));
        assert!(output.contains("**From:** Week 3"));
        assert!(output.contains("-- this study request was already handled"));
    }

    #[tokio::test]
    async fn invalid_study_payload_is_reported() {
        let (mut shell, service) = shell();

        shell.handle_line("/study {\"task\":{}}").await.unwrap();
        shell.settle().await.unwrap();

        assert_eq!(service.questions.load(Ordering::SeqCst), 0);
        assert!(printed(&shell).contains("invalid study request"));
    }

    #[tokio::test]
    async fn show_reports_composer_state() {
        let (mut shell, _) = shell();

        shell.handle_line("/document").await.unwrap();
        shell.handle_line("/show").await.unwrap();

        let output = printed(&shell);
        assert!(output.contains("mode: document"));
        assert!(output.contains("document: none (Empty)"));
        assert!(output.contains("input: disabled (Upload a PDF first using the + button...)"));
    }

    #[tokio::test]
    async fn abandoned_join_keeps_the_task() {
        let (release, gate) = tokio::sync::oneshot::channel();
        let answers = Arc::new(HeldAnswers {
            gate: std::sync::Mutex::new(Some(gate)),
        });
        let session = ChatSession::new(answers, Arc::new(CannedService::default()));
        let mut shell = Shell::new(session, SessionSettings::default(), Vec::new());

        shell.handle_line("slow question").await.unwrap();
        tokio::select! {
            biased;
            _ = shell.join_next() => panic!("the exchange is still waiting on its gate"),
            _ = std::future::ready(()) => {}
        }

        assert!(shell.has_pending());
        release.send(()).unwrap();
        let joined = shell.join_next().await.unwrap();
        shell.render_completion(joined).await.unwrap();
        assert!(!shell.has_pending());
        assert!(printed(&shell).contains("assistant> held answer"));
    }

    #[tokio::test]
    async fn quit_stops_the_loop() {
        let (mut shell, _) = shell();
        assert_eq!(shell.handle_line("/quit").await.unwrap(), Flow::Quit);
    }
}
