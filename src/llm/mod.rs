pub mod gemini;
pub mod media;

use anyhow::Result;
use async_trait::async_trait;

use crate::analysis::types::ModelInvocation;

/// The generative model as seen by the analysis pipeline: one invocation in,
/// raw reply text out. The text is untrusted and may not be JSON.
#[async_trait]
pub trait AdviceModel: Send + Sync {
    async fn invoke(&self, invocation: &ModelInvocation) -> Result<String>;
}
