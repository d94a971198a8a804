use std::process::ExitCode;

use std::sync::Arc;

use snafu::{ResultExt, Snafu};
use studychat::live::LiveRagClient;
use studychat::settings::SettingsStore;
use studychat::shell::{Flow, SettingsLink, Shell, ShellError};
use studychat_rag::RagClientError;
use studychat_session::{ChatSession, StudyTrigger, TriggerParseError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Study request handed over at startup, in the same JSON shape `/study` accepts.
const STARTUP_TRIGGER_ENV: &str = "STUDYCHAT_STUDY_TASK";

#[derive(Debug, Snafu)]
enum AppError {
    #[snafu(display("failed to create the service client: {source}"))]
    CreateClient { source: RagClientError },
    #[snafu(display("invalid {STARTUP_TRIGGER_ENV}: {source}"))]
    StartupTrigger { source: TriggerParseError },
    #[snafu(display("failed to read input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("{source}"))]
    ShellFailed { source: ShellError },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so they never interleave with the conversation on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "studychat stopped");
            eprintln!("studychat: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), AppError> {
    let store = SettingsStore::load();
    let settings = store.settings();
    tracing::info!(path = %store.config_path().display(), "settings loaded");

    let client =
        Arc::new(LiveRagClient::new(settings.service.clone()).context(CreateClientSnafu)?);
    let session = ChatSession::with_options(
        client.clone(),
        client.clone(),
        settings.session.session_options(),
    );
    let mut shell = Shell::new(session, settings.session.clone(), tokio::io::stdout())
        .with_settings_link(SettingsLink { store, client });

    shell
        .execute(studychat::Command::Help)
        .await
        .context(ShellFailedSnafu)?;

    if let Ok(raw) = std::env::var(STARTUP_TRIGGER_ENV) {
        let trigger = StudyTrigger::from_handoff_json(&raw).context(StartupTriggerSnafu)?;
        shell.deliver(trigger).await.context(ShellFailedSnafu)?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context(ReadInputSnafu { stage: "read-stdin" })? else {
                    // Input closed: let in-flight requests finish so piped sessions see replies.
                    shell.settle().await.context(ShellFailedSnafu)?;
                    break;
                };
                if shell.handle_line(&line).await.context(ShellFailedSnafu)? == Flow::Quit {
                    break;
                }
            }
            // Only the join is raced; rendering runs outside `select!` so it is never cut short.
            Some(joined) = shell.join_next(), if shell.has_pending() => {
                shell.render_completion(joined).await.context(ShellFailedSnafu)?;
            }
        }
    }

    tracing::info!("studychat exiting");
    Ok(())
}
