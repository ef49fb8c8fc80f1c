//! Policy classifier client — rate-limited LLM calls with fail-safe parsing.
//!
//! Supports:
//! - **Anthropic**: Direct API access via rig-core
//! - **OpenAI**: Direct API access via rig-core
//!
//! The model sees one post body plus the group's natural-language policy and
//! is asked for a strict JSON verdict. Everything downstream of the raw call
//! is engineered around the model not honoring that contract; see [`parse`].

pub mod budget;
pub mod parse;

pub use budget::RateBudget;
pub use parse::{ClassificationResult, ParseMode};

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use secrecy::ExposeSecret;
use tracing::{debug, warn};

use crate::error::ClassifierError;

/// Supported model backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelBackend {
    Anthropic,
    OpenAi,
}

/// Configuration for creating a policy model.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub backend: ModelBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Opaque natural-language completion call. The engine owns prompting and
/// parsing; implementations own transport only.
#[async_trait]
pub trait PolicyModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ClassifierError>;
}

/// Create a policy model from configuration.
pub fn create_model(config: &ModelConfig) -> Result<Arc<dyn PolicyModel>, ClassifierError> {
    match config.backend {
        ModelBackend::Anthropic => create_anthropic_model(config),
        ModelBackend::OpenAi => create_openai_model(config),
    }
}

fn create_anthropic_model(config: &ModelConfig) -> Result<Arc<dyn PolicyModel>, ClassifierError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            ClassifierError::ClientCreation(format!("Failed to create Anthropic client: {e}"))
        })?;

    let agent = client.agent(&config.model).build();
    tracing::info!("Using Anthropic classifier (model: {})", config.model);
    Ok(Arc::new(RigModel { agent }))
}

fn create_openai_model(config: &ModelConfig) -> Result<Arc<dyn PolicyModel>, ClassifierError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            ClassifierError::ClientCreation(format!("Failed to create OpenAI client: {e}"))
        })?;

    let agent = client.agent(&config.model).build();
    tracing::info!("Using OpenAI classifier (model: {})", config.model);
    Ok(Arc::new(RigModel { agent }))
}

/// Bridges a rig agent to the [`PolicyModel`] trait.
struct RigModel<M: rig::completion::CompletionModel> {
    agent: rig::agent::Agent<M>,
}

#[async_trait]
impl<M: rig::completion::CompletionModel> PolicyModel for RigModel<M> {
    async fn generate(&self, prompt: &str) -> Result<String, ClassifierError> {
        self.agent
            .prompt(prompt)
            .await
            .map_err(|e| ClassifierError::RequestFailed(e.to_string()))
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Classifies posts against a policy, gated by the shared [`RateBudget`].
pub struct ClassifierClient {
    model: Arc<dyn PolicyModel>,
    budget: Arc<RateBudget>,
}

impl ClassifierClient {
    pub fn new(model: Arc<dyn PolicyModel>, budget: Arc<RateBudget>) -> Self {
        Self { model, budget }
    }

    /// Classify one post body against a group's policy prompt.
    ///
    /// Blocks on the shared rate budget before issuing the call. Never
    /// returns an error: an unreachable or unintelligible classifier
    /// resolves to an approved verdict (degraded-mode on outage) so a user
    /// is never punished on bad infrastructure.
    pub async fn classify(&self, post_body: &str, policy_prompt: &str) -> ClassificationResult {
        self.budget.acquire().await;

        let prompt = build_moderation_prompt(policy_prompt, post_body);

        let raw = match self.model.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Classifier call failed; approving post in degraded mode");
                return ClassificationResult::degraded_default();
            }
        };

        let (verdict, mode) = parse::parse_verdict(&raw);
        match mode {
            ParseMode::Strict => {}
            ParseMode::Heuristic => {
                warn!(raw = %raw, "Classifier response malformed; recovered fields heuristically");
            }
            ParseMode::Unparsable => {
                warn!(raw = %raw, "Classifier response unparsable; approving post");
            }
        }
        debug!(
            approved = verdict.approved,
            action = verdict.action.label(),
            "Classification complete"
        );
        verdict
    }
}

/// Build the moderation prompt: role, the group's rule, the post, and the
/// strict response contract.
fn build_moderation_prompt(policy_prompt: &str, post_body: &str) -> String {
    format!(
        "You are a strict content moderation engine for a community group wall. \
         Analyze the post below against the group's moderation rule.\n\n\
         Moderation rule:\n\"{policy_prompt}\"\n\n\
         Post to analyze:\n\"{post_body}\"\n\n\
         Respond with ONLY a JSON object:\n\
         {{\"approved\": true/false, \"action\": \"...\", \"reason\": \"...\", \
         \"demotionLevels\": 1, \"targetRank\": \"...\"}}\n\n\
         Rules:\n\
         - \"approved\" is false only when the post violates the rule\n\
         - \"action\" is one of \"none\", \"deletion\", \"exile\", \"demotion\", \"rankchange\"\n\
         - \"reason\" is one short sentence naming the violation\n\
         - \"demotionLevels\" (1-3) applies only to \"demotion\"\n\
         - \"targetRank\" is a role name and applies only to \"rankchange\"\n\
         - When in doubt, approve"
    )
}
