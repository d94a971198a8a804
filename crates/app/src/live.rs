use std::sync::Arc;

use arc_swap::ArcSwap;
use studychat_rag::{RagClient, RagClientConfig, RagClientResult, create_client};
use studychat_session::{
    AnsweringService, AskRequest, AskResponse, BoxFuture, DocumentFile, ServiceError,
    ServiceResult, UploadReceipt, UploadService,
};

/// Answering and upload collaborator whose HTTP client can be swapped while the session runs.
///
/// Each request loads the client current when it starts, so a replacement never affects a
/// request already in flight.
pub struct LiveRagClient {
    current: ArcSwap<RagClient>,
}

impl LiveRagClient {
    pub fn new(config: RagClientConfig) -> RagClientResult<Self> {
        Ok(Self {
            current: ArcSwap::new(create_client(config)?),
        })
    }

    pub fn current(&self) -> Arc<RagClient> {
        self.current.load_full()
    }

    pub fn replace(&self, client: RagClient) {
        tracing::info!(
            ask_url = %client.config().ask_url(),
            upload_url = %client.config().upload_url(),
            "rag client replaced"
        );
        self.current.store(Arc::new(client));
    }
}

impl AnsweringService for LiveRagClient {
    fn ask<'a>(&'a self, request: AskRequest) -> BoxFuture<'a, ServiceResult<AskResponse>> {
        let client = self.current();
        Box::pin(async move {
            client
                .post_question(&request)
                .await
                .map_err(ServiceError::from)
        })
    }
}

impl UploadService for LiveRagClient {
    fn upload<'a>(&'a self, document: DocumentFile) -> BoxFuture<'a, ServiceResult<UploadReceipt>> {
        let client = self.current();
        Box::pin(async move {
            client
                .post_document(&document)
                .await
                .map_err(ServiceError::from)
        })
    }
}
