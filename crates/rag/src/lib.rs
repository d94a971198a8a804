#![deny(unsafe_code)]

//! HTTP implementation of the answering and upload contracts.

use std::sync::Arc;

mod client;
mod config;
mod error;

pub use client::{RagClient, reported_error};
pub use config::{
    DEFAULT_ASK_PATH, DEFAULT_BASE_URL, DEFAULT_UPLOAD_FIELD, DEFAULT_UPLOAD_PATH, RagClientConfig,
};
pub use error::{RagClientError, RagClientResult};

/// Builds one shared client usable as both the answering and the upload collaborator.
pub fn create_client(config: RagClientConfig) -> RagClientResult<Arc<RagClient>> {
    let client = RagClient::new(config)?;
    tracing::info!(
        ask_url = %client.config().ask_url(),
        upload_url = %client.config().upload_url(),
        "rag client ready"
    );
    Ok(Arc::new(client))
}
