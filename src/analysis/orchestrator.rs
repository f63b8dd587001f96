use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::analysis::builder::AdviceRequestBuilder;
use crate::analysis::normalizer::{normalize, RejectionError};
use crate::analysis::types::{CareAdvice, RawAnalysisInput};
use crate::analysis::validator::{validate, ValidationError};
use crate::db::ledger::Ledger;
use crate::llm::AdviceModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStage {
    Received,
    Normalized,
    Invoked,
    Validated,
    Recorded,
    Responded,
    Rejected,
    InvocationFailed,
    OutputRejected,
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AnalysisStage::Received => "received",
            AnalysisStage::Normalized => "normalized",
            AnalysisStage::Invoked => "invoked",
            AnalysisStage::Validated => "validated",
            AnalysisStage::Recorded => "recorded",
            AnalysisStage::Responded => "responded",
            AnalysisStage::Rejected => "rejected",
            AnalysisStage::InvocationFailed => "invocation_failed",
            AnalysisStage::OutputRejected => "output_rejected",
        };
        f.write_str(label)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Rejected(#[from] RejectionError),
    #[error("Analysis failed: {0}")]
    InvocationFailed(#[source] anyhow::Error),
    #[error("The model returned malformed advice: {0}")]
    MalformedOutput(#[from] ValidationError),
}

impl AnalysisError {
    pub fn stage(&self) -> AnalysisStage {
        match self {
            AnalysisError::Rejected(_) => AnalysisStage::Rejected,
            AnalysisError::InvocationFailed(_) => AnalysisStage::InvocationFailed,
            AnalysisError::MalformedOutput(_) => AnalysisStage::OutputRejected,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            AnalysisError::Rejected(_) => 400,
            AnalysisError::InvocationFailed(_) => 500,
            AnalysisError::MalformedOutput(_) => 502,
        }
    }
}

/// Runs one analysis: normalize, build, invoke, validate, record.
pub struct Orchestrator {
    model: Arc<dyn AdviceModel>,
    ledger: Ledger,
    builder: AdviceRequestBuilder,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn AdviceModel>, ledger: Ledger, builder: AdviceRequestBuilder) -> Self {
        Orchestrator {
            model,
            ledger,
            builder,
        }
    }

    pub async fn analyse(
        &self,
        request_id: &str,
        input: &RawAnalysisInput,
    ) -> Result<CareAdvice, AnalysisError> {
        let result = self.run(request_id, input).await;
        if let Err(err) = &result {
            info!(request_id, stage = %err.stage(), error = %err, "Analysis ended without advice");
        }
        result
    }

    async fn run(
        &self,
        request_id: &str,
        input: &RawAnalysisInput,
    ) -> Result<CareAdvice, AnalysisError> {
        debug!(request_id, stage = %AnalysisStage::Received);

        let request = normalize(input)?;
        debug!(
            request_id,
            stage = %AnalysisStage::Normalized,
            has_prompt = !request.prompt.is_empty(),
            has_image = request.image.is_some(),
            language_hint = ?request.language_hint
        );

        let invocation = self.builder.build(&request);
        let raw = self
            .model
            .invoke(&invocation)
            .await
            .map_err(AnalysisError::InvocationFailed)?;
        debug!(request_id, stage = %AnalysisStage::Invoked, reply_len = raw.len());

        let advice = match validate(&raw) {
            Ok(advice) => advice,
            Err(err) => {
                warn!(
                    request_id,
                    error = %err,
                    raw_len = err.raw().len(),
                    "Model output failed validation"
                );
                return Err(AnalysisError::MalformedOutput(err));
            }
        };
        debug!(request_id, stage = %AnalysisStage::Validated);

        match self.ledger.record_sighting(advice.sighting_name()).await {
            Ok(()) => debug!(request_id, stage = %AnalysisStage::Recorded),
            Err(err) => warn!(
                request_id,
                plant_name = advice.sighting_name(),
                error = %err,
                "Failed to record plant sighting; returning advice anyway"
            ),
        }

        debug!(request_id, stage = %AnalysisStage::Responded);
        Ok(advice)
    }
}
