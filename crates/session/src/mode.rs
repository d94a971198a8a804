use std::fmt;

use serde::{Deserialize, Serialize};

/// Conversation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Free-form questions without document context.
    #[default]
    General,
    /// Questions scoped to the uploaded document.
    Document,
}

impl Mode {
    /// Value of the `isGeneral` flag sent to the answering service.
    pub fn is_general(self) -> bool {
        matches!(self, Self::General)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}
