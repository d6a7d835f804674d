//! Model access for the judge.
//!
//! rig-core does the HTTP work; `RigAdapter` narrows a rig completion model
//! to the `LlmProvider` trait the judge depends on. Three hosted backends are
//! wired: OpenAI, Anthropic and Azure OpenAI deployments.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use rig::completion::CompletionModel;
use rig::providers::{anthropic, azure, openai};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::error::LlmError;

/// Azure API version used when none is configured.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-12-01-preview";

/// Where verdicts come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAi,
    Anthropic,
    /// An Azure OpenAI resource; the model name is the deployment name.
    Azure {
        endpoint: String,
        api_version: String,
    },
}

impl LlmBackend {
    /// Provider label used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            LlmBackend::OpenAi => "openai",
            LlmBackend::Anthropic => "anthropic",
            LlmBackend::Azure { .. } => "azure",
        }
    }
}

/// Everything needed to reach one model.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: SecretString,
    pub model: String,
}

/// Build the judge's model client. Nothing is sent over the network here.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let key = config.api_key.expose_secret();
    let client_error = |e: &dyn std::fmt::Display| LlmError::RequestFailed {
        provider: config.backend.name().to_string(),
        reason: format!("client setup failed: {e}"),
    };

    let provider = match &config.backend {
        LlmBackend::OpenAi => {
            let client: openai::Client =
                openai::Client::new(key).map_err(|e| client_error(&e))?;
            adapt(client.completion_model(&config.model), &config.model)
        }
        LlmBackend::Anthropic => {
            let client: anthropic::Client =
                anthropic::Client::new(key).map_err(|e| client_error(&e))?;
            adapt(client.completion_model(&config.model), &config.model)
        }
        LlmBackend::Azure {
            endpoint,
            api_version,
        } => {
            let auth = azure::AzureOpenAIAuth::ApiKey(key.to_string());
            let client: azure::Client = azure::Client::builder()
                .api_key::<azure::AzureOpenAIAuth>(auth)
                .azure_endpoint(endpoint.clone())
                .api_version(api_version)
                .build()
                .map_err(|e| client_error(&e))?;
            adapt(client.completion_model(&config.model), &config.model)
        }
    };

    info!(
        backend = config.backend.name(),
        model = %config.model,
        "Judgment model ready"
    );
    Ok(provider)
}

fn adapt<M>(model: M, name: &str) -> Arc<dyn LlmProvider>
where
    M: CompletionModel + Send + Sync + 'static,
{
    Arc::new(RigAdapter::new(model, name))
}
