//! Rewrite client protocol.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RewriteError;
use crate::types::UsageContext;

/// Providers the workspace knows how to talk to.
///
/// Both speak the OpenAI chat-completions wire format; they differ in
/// default endpoint and model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownProvider {
    DeepSeek,
    OpenAI,
}

impl KnownProvider {
    pub const ALL: [KnownProvider; 2] = [KnownProvider::DeepSeek, KnownProvider::OpenAI];

    /// Case-insensitive lookup of a stored provider name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "deepseek" => Some(KnownProvider::DeepSeek),
            "openai" => Some(KnownProvider::OpenAI),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KnownProvider::DeepSeek => "deepseek",
            KnownProvider::OpenAI => "openai",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            KnownProvider::DeepSeek => "https://api.deepseek.com/v1/chat/completions",
            KnownProvider::OpenAI => "https://api.openai.com/v1/chat/completions",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            KnownProvider::DeepSeek => "deepseek-chat",
            KnownProvider::OpenAI => "gpt-3.5-turbo",
        }
    }
}

/// Provider selection and credentials, read from the settings collaborator
/// once per invocation.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Provider name as stored; unknown values are rejected by the client.
    pub provider: String,
    /// Endpoint override; the provider default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Model override; the provider default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ProviderSettings {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Default::default()
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// The credential, if present and not blank.
    pub fn credential(&self) -> Option<&str> {
        self.credential
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .finish()
    }
}

/// One rewrite request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRequest {
    /// Text as captured from the surface.
    pub text: String,
    pub context: UsageContext,
    /// Fully resolved system instruction for this context.
    pub instruction: String,
}

impl RewriteRequest {
    pub fn new(text: impl Into<String>, context: UsageContext, instruction: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context,
            instruction: instruction.into(),
        }
    }
}

/// Remote completion endpoint that rewrites text.
#[async_trait]
pub trait RewriteClient: Send + Sync {
    /// Client identifier used in logs.
    fn id(&self) -> &str;

    /// Rewrite the request text. On success the returned text has already
    /// been cleaned of explanatory lead-ins.
    async fn rewrite(
        &self,
        request: &RewriteRequest,
        settings: &ProviderSettings,
    ) -> Result<String, RewriteError>;
}
