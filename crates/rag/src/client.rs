use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use snafu::ResultExt;
use studychat_session::{
    AnsweringService, AskRequest, AskResponse, BoxFuture, DocumentFile, ServiceError,
    ServiceResult, UploadReceipt, UploadService,
};

use super::config::RagClientConfig;
use super::error::{
    BuildClientSnafu, BuildMultipartSnafu, DecodeBodySnafu, ErrorStatusSnafu, InvalidBaseUrlSnafu,
    RagClientResult, ReadBodySnafu, SendRequestSnafu, truncate_for_error,
};

/// HTTP client for the question answering and document ingestion endpoints.
#[derive(Debug, Clone)]
pub struct RagClient {
    http: Client,
    config: RagClientConfig,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl RagClient {
    pub fn new(config: RagClientConfig) -> RagClientResult<Self> {
        let config = config.normalized();
        let url_problem = match reqwest::Url::parse(&config.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => None,
            Ok(url) => Some(format!("unsupported scheme '{}'", url.scheme())),
            Err(source) => Some(source.to_string()),
        };
        if let Some(details) = url_problem {
            return InvalidBaseUrlSnafu {
                stage: "rag-client-new",
                base_url: config.base_url,
                details,
            }
            .fail();
        }

        let mut builder = Client::builder().connect_timeout(config.connect_timeout());
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context(BuildClientSnafu {
            stage: "build-http-client",
        })?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &RagClientConfig {
        &self.config
    }

    pub async fn post_question(&self, request: &AskRequest) -> RagClientResult<AskResponse> {
        let url = self.config.ask_url();
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .context(SendRequestSnafu {
                stage: "send-ask-request",
                url: url.clone(),
            })?;

        let answer: AskResponse = Self::read_json(response, "read-ask-response").await?;
        tracing::debug!(
            url = %url,
            is_general = request.is_general,
            answer_len = answer.answer.len(),
            "ask request completed"
        );
        Ok(answer)
    }

    pub async fn post_document(&self, document: &DocumentFile) -> RagClientResult<UploadReceipt> {
        let url = self.config.upload_url();
        let part = Part::bytes(document.bytes().to_vec())
            .file_name(document.name().to_string())
            .mime_str(document.content_type())
            .context(BuildMultipartSnafu {
                stage: "build-upload-part",
            })?;
        let form = Form::new().part(self.config.upload_field.clone(), part);

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .context(SendRequestSnafu {
                stage: "send-upload-request",
                url: url.clone(),
            })?;

        let status = response.status();
        let body = response.text().await.context(ReadBodySnafu {
            stage: "read-upload-response",
        })?;
        Self::ensure_success(status, &body, "upload-http-status")?;

        // The ingestion endpoint's success body is informational only.
        let receipt = serde_json::from_str::<UploadReceipt>(&body).unwrap_or_default();
        tracing::info!(
            url = %url,
            file = %document.name(),
            size_bytes = document.len(),
            "document upload accepted"
        );
        Ok(receipt)
    }

    async fn read_json<T>(response: Response, stage: &'static str) -> RagClientResult<T>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        let body = response.text().await.context(ReadBodySnafu { stage })?;
        Self::ensure_success(status, &body, stage)?;
        serde_json::from_str(&body).context(DecodeBodySnafu {
            stage,
            body: truncate_for_error(&body, 200),
        })
    }

    fn ensure_success(
        status: reqwest::StatusCode,
        body: &str,
        stage: &'static str,
    ) -> RagClientResult<()> {
        if status.is_success() {
            return Ok(());
        }
        tracing::warn!(status = status.as_u16(), stage, "service returned an error status");
        ErrorStatusSnafu {
            stage,
            status: status.as_u16(),
            reported: reported_error(body),
            body: truncate_for_error(body, 200),
        }
        .fail()
    }
}

/// Extracts the `{"error": "..."}` message the service attaches to failures.
pub fn reported_error(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
}

impl AnsweringService for RagClient {
    fn ask<'a>(&'a self, request: AskRequest) -> BoxFuture<'a, ServiceResult<AskResponse>> {
        Box::pin(async move {
            self.post_question(&request)
                .await
                .map_err(ServiceError::from)
        })
    }
}

impl UploadService for RagClient {
    fn upload<'a>(&'a self, document: DocumentFile) -> BoxFuture<'a, ServiceResult<UploadReceipt>> {
        Box::pin(async move {
            self.post_document(&document)
                .await
                .map_err(ServiceError::from)
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::error::RagClientError;

    /// Serves one canned HTTP response and returns the raw request it received.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });

        (format!("http://{address}/api/rag"), handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut raw = Vec::new();
        let mut chunk = [0_u8; 4096];
        loop {
            let read = socket.read(&mut chunk).await.unwrap();
            if read == 0 {
                break;
            }
            raw.extend_from_slice(&chunk[..read]);
            if request_complete(&raw) {
                break;
            }
        }
        String::from_utf8_lossy(&raw).into_owned()
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let headers = text[..header_end].to_ascii_lowercase();
        let body = &raw[header_end + 4..];

        if let Some(length) = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
        {
            return body.len() >= length;
        }
        if headers.contains("transfer-encoding: chunked") {
            return body.ends_with(b"0\r\n\r\n");
        }
        true
    }

    fn client_for(base_url: String) -> RagClient {
        RagClient::new(RagClientConfig::new(base_url)).unwrap()
    }

    #[test]
    fn reported_error_reads_error_field() {
        assert_eq!(
            reported_error(r#"{"error":"Please upload a PDF first."}"#),
            Some("Please upload a PDF first.".to_string())
        );
        assert_eq!(reported_error(r#"{"error":"   "}"#), None);
        assert_eq!(reported_error(r#"{"message":"nope"}"#), None);
        assert_eq!(reported_error("<html>502</html>"), None);
    }

    #[test]
    fn rejects_non_http_base_url() {
        let error = RagClient::new(RagClientConfig::new("ftp://example.com")).unwrap_err();
        assert!(matches!(error, RagClientError::InvalidBaseUrl { .. }));

        let error = RagClient::new(RagClientConfig::new("not a url")).unwrap_err();
        assert!(matches!(error, RagClientError::InvalidBaseUrl { .. }));
    }

    #[tokio::test]
    async fn ask_posts_camel_case_json() {
        let (base_url, server) = serve_once("200 OK", r#"{"answer":"4"}"#).await;
        let client = client_for(base_url);

        let response = client
            .ask(AskRequest::new("What is 2+2?", true))
            .await
            .unwrap();
        let request = server.await.unwrap();

        assert_eq!(response.answer, "4");
        assert!(request.starts_with("POST /api/rag/ask "));
        assert!(request.contains(r#""question":"What is 2+2?""#));
        assert!(request.contains(r#""isGeneral":true"#));
    }

    #[tokio::test]
    async fn ask_surfaces_reported_error() {
        let (base_url, server) =
            serve_once("400 Bad Request", r#"{"error":"No document has been uploaded"}"#).await;
        let client = client_for(base_url);

        let error = client
            .ask(AskRequest::new("Summarize", false))
            .await
            .unwrap_err();
        server.await.unwrap();

        assert_eq!(error.reported_message(), Some("No document has been uploaded"));
    }

    #[tokio::test]
    async fn ask_without_answer_field_is_malformed() {
        let (base_url, server) = serve_once("200 OK", r#"{"result":"4"}"#).await;
        let client = client_for(base_url);

        let error = client
            .ask(AskRequest::new("What is 2+2?", true))
            .await
            .unwrap_err();
        server.await.unwrap();

        assert!(matches!(error, ServiceError::MalformedResponse { .. }));
        assert_eq!(error.reported_message(), None);
    }

    #[tokio::test]
    async fn upload_sends_multipart_field() {
        let (base_url, server) = serve_once("200 OK", r#"{"message":"processed"}"#).await;
        let client = client_for(base_url);
        let document = DocumentFile::new("lecture.pdf", b"%PDF-1.7 test".to_vec());

        let receipt = client.upload(document).await.unwrap();
        let request = server.await.unwrap();

        assert_eq!(receipt.message.as_deref(), Some("processed"));
        assert!(request.starts_with("POST /api/rag/upload "));
        assert!(request.contains(r#"name="pdfFile""#));
        assert!(request.contains(r#"filename="lecture.pdf""#));
        assert!(request.contains("application/pdf"));
        assert!(request.contains("%PDF-1.7 test"));
    }

    #[tokio::test]
    async fn upload_failure_without_body_is_unavailable() {
        let (base_url, server) = serve_once("500 Internal Server Error", "").await;
        let client = client_for(base_url);

        let error = client
            .upload(DocumentFile::new("lecture.pdf", b"%PDF".to_vec()))
            .await
            .unwrap_err();
        server.await.unwrap();

        assert!(matches!(
            error,
            ServiceError::Unavailable {
                status: Some(500),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);
        let client = client_for(format!("http://{address}/api/rag"));

        let error = client
            .ask(AskRequest::new("hello", true))
            .await
            .unwrap_err();

        assert!(matches!(error, ServiceError::Unavailable { status: None, .. }));
    }
}
