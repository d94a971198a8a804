#![deny(unsafe_code)]

//! Terminal front end for the study chat session.

pub mod live;
pub mod settings;
pub mod shell;

pub use live::LiveRagClient;
pub use settings::{AppSettings, SessionSettings, SettingsError, SettingsStore};
pub use shell::{
    Command, Completion, Flow, SettingsLink, Shell, ShellError, ShellResult, parse_command,
};
