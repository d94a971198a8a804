use snafu::Snafu;
use studychat_session::ServiceError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RagClientError {
    #[snafu(display("invalid service base URL '{base_url}': {details}"))]
    InvalidBaseUrl {
        stage: &'static str,
        base_url: String,
        details: String,
    },
    #[snafu(display("failed to build http client on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("failed to build multipart body on `{stage}`: {source}"))]
    BuildMultipart {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request to {url} failed on `{stage}`: {source}"))]
    SendRequest {
        stage: &'static str,
        url: String,
        source: reqwest::Error,
    },
    #[snafu(display("failed to read response body on `{stage}`: {source}"))]
    ReadBody {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("service returned status {status} on `{stage}`: {body}"))]
    ErrorStatus {
        stage: &'static str,
        status: u16,
        reported: Option<String>,
        body: String,
    },
    #[snafu(display("failed to decode response on `{stage}`: {source}"))]
    DecodeBody {
        stage: &'static str,
        body: String,
        source: serde_json::Error,
    },
}

pub type RagClientResult<T> = Result<T, RagClientError>;

impl RagClientError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidBaseUrl { stage, .. }
            | Self::BuildClient { stage, .. }
            | Self::BuildMultipart { stage, .. }
            | Self::SendRequest { stage, .. }
            | Self::ReadBody { stage, .. }
            | Self::ErrorStatus { stage, .. }
            | Self::DecodeBody { stage, .. } => stage,
        }
    }
}

impl From<RagClientError> for ServiceError {
    fn from(error: RagClientError) -> Self {
        let stage = error.stage();
        match error {
            RagClientError::ErrorStatus {
                status,
                reported: Some(message),
                ..
            } => ServiceError::Reported {
                stage,
                status: Some(status),
                message,
            },
            RagClientError::ErrorStatus { status, body, .. } => ServiceError::Unavailable {
                stage,
                status: Some(status),
                details: truncate_for_error(&body, 200),
            },
            RagClientError::DecodeBody { source, body, .. } => ServiceError::MalformedResponse {
                stage,
                details: format!("{source}; body: {}", truncate_for_error(&body, 200)),
            },
            RagClientError::SendRequest { ref source, .. }
            | RagClientError::ReadBody { ref source, .. } => ServiceError::Unavailable {
                stage,
                status: source.status().map(|status| status.as_u16()),
                details: error.to_string(),
            },
            RagClientError::InvalidBaseUrl { .. }
            | RagClientError::BuildClient { .. }
            | RagClientError::BuildMultipart { .. } => ServiceError::Unavailable {
                stage,
                status: None,
                details: error.to_string(),
            },
        }
    }
}

pub(crate) fn truncate_for_error(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    text.chars().take(max).collect()
}
