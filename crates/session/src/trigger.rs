//! Externally delivered "study this topic" requests and the guard that turns each one into at
//! most one submission.

use std::fmt;

use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::session::ExchangeOutcome;

pub const DEFAULT_ORIGIN_LABEL: &str = "My Studies";

/// Identity used to recognise a redelivered trigger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerId(String);

impl TriggerId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// A study request handed over from another page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyTrigger {
    topic_id: Option<String>,
    title: String,
    description: Option<String>,
    origin: String,
}

impl StudyTrigger {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            topic_id: None,
            title: title.into(),
            description: None,
            origin: DEFAULT_ORIGIN_LABEL.to_string(),
        }
    }

    pub fn with_topic_id(mut self, topic_id: impl Into<String>) -> Self {
        self.topic_id = non_blank(topic_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = non_blank(description.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = non_blank(origin.into()).unwrap_or_else(|| DEFAULT_ORIGIN_LABEL.to_string());
        self
    }

    /// Parses the navigation handoff payload.
    ///
    /// Accepts both `task_title`/`task_description` and the shorter `name`/`description` keys,
    /// preferring the former when both are present.
    pub fn from_handoff_json(raw: &str) -> Result<Self, TriggerParseError> {
        let payload: HandoffPayload = serde_json::from_str(raw).context(InvalidJsonSnafu {
            stage: "parse-trigger-handoff",
        })?;
        let task = payload.task;

        let title = task
            .task_title
            .and_then(non_blank)
            .or_else(|| task.name.and_then(non_blank))
            .context(MissingTitleSnafu {
                stage: "parse-trigger-title",
            })?;

        let mut trigger = Self::new(title);
        if let Some(id) = task.id {
            trigger = trigger.with_topic_id(json_scalar_to_string(id));
        }
        if let Some(description) = task
            .task_description
            .and_then(non_blank)
            .or_else(|| task.description.and_then(non_blank))
        {
            trigger = trigger.with_description(description);
        }
        if let Some(origin) = payload.schedule_name {
            trigger = trigger.with_origin(origin);
        }
        Ok(trigger)
    }

    pub fn topic_id(&self) -> Option<&str> {
        self.topic_id.as_deref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Topic id when known, otherwise the serialized trigger itself.
    pub fn identity(&self) -> TriggerId {
        if let Some(topic_id) = &self.topic_id {
            return TriggerId::new(format!("topic:{topic_id}"));
        }
        let serialized = serde_json::to_string(self).unwrap_or_else(|_| {
            format!("{}\u{1f}{}", self.title, self.origin)
        });
        TriggerId::new(serialized)
    }

    /// Renders the fixed study prompt.
    ///
    /// The details line is left blank, not removed, when there is no description.
    pub fn study_prompt(&self) -> String {
        let details = self
            .description
            .as_deref()
            .map(|description| format!("**Topic Details:** {description}"))
            .unwrap_or_default();

        format!(
            "I want to study and learn about: \"{title}\"\n\n{details}\n**From:** {origin}\n\n\
             Please teach me about this topic with clear explanations and practical examples.",
            title = self.title,
            origin = self.origin,
        )
    }
}

#[derive(Debug, Deserialize)]
struct HandoffPayload {
    task: HandoffTask,
    #[serde(default, rename = "scheduleName", alias = "schedule_name")]
    schedule_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HandoffTask {
    #[serde(default, alias = "_id")]
    id: Option<serde_json::Value>,
    #[serde(default)]
    task_title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    task_description: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TriggerParseError {
    #[snafu(display("trigger payload is not valid JSON on `{stage}`: {source}"))]
    InvalidJson {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("trigger payload has neither `task_title` nor `name` on `{stage}`"))]
    MissingTitle { stage: &'static str },
}

/// Guard lifecycle.
///
/// `Consuming` only exists between `begin` and `commit`, which run under the session lock, so
/// snapshots report `Idle` or `Consumed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TriggerPhase {
    #[default]
    Idle,
    Consuming,
    Consumed,
}

/// Why a delivered trigger did not produce a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerRefusal {
    /// Same identity as the trigger already consumed.
    Duplicate,
    /// A different trigger was already consumed; only a mode switch re-arms the guard.
    AlreadyConsumed,
}

/// Result of delivering a trigger to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Submitted(ExchangeOutcome),
    Ignored(TriggerRefusal),
    /// An exchange was still in flight after waiting once; the guard stays `Idle`.
    Dropped { reason: String },
}

/// De-duplication state keyed by trigger identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerGuard {
    phase: TriggerPhase,
    last_consumed: Option<TriggerId>,
}

impl TriggerGuard {
    pub fn phase(&self) -> TriggerPhase {
        self.phase
    }

    pub(crate) fn check(&self, identity: &TriggerId) -> Result<(), TriggerRefusal> {
        if self.last_consumed.as_ref() == Some(identity) {
            return Err(TriggerRefusal::Duplicate);
        }
        match self.phase {
            TriggerPhase::Idle => Ok(()),
            TriggerPhase::Consuming | TriggerPhase::Consumed => {
                Err(TriggerRefusal::AlreadyConsumed)
            }
        }
    }

    pub(crate) fn begin(&mut self) {
        self.phase = TriggerPhase::Consuming;
    }

    pub(crate) fn commit(&mut self, identity: TriggerId) {
        self.last_consumed = Some(identity);
        self.phase = TriggerPhase::Consumed;
    }

    pub(crate) fn rearm(&mut self) {
        *self = Self::default();
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn json_scalar_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(raw) => raw,
        other => other.to_string(),
    }
}
