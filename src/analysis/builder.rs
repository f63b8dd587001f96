use crate::analysis::types::{AnalysisRequest, ContentPart, ModelInvocation};
use crate::config::{CARE_ADVICE_SYSTEM_PROMPT, DEFAULT_FALLBACK_LANGUAGE, IMAGE_ONLY_INSTRUCTION};
use crate::utils::language::describe_language_hint;

pub const JSON_RESPONSE_MIME_TYPE: &str = "application/json";

#[derive(Debug, Clone)]
pub struct AdviceRequestBuilder {
    system_instruction: String,
}

impl Default for AdviceRequestBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_LANGUAGE)
    }
}

impl AdviceRequestBuilder {
    pub fn new(fallback_language: &str) -> Self {
        let fallback_language = match fallback_language.trim() {
            "" => DEFAULT_FALLBACK_LANGUAGE,
            value => value,
        };
        AdviceRequestBuilder {
            system_instruction: CARE_ADVICE_SYSTEM_PROMPT
                .replace("{fallback_language}", fallback_language),
        }
    }

    #[allow(dead_code)]
    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn build(&self, request: &AnalysisRequest) -> ModelInvocation {
        let text = if request.prompt.is_empty() {
            IMAGE_ONLY_INSTRUCTION.to_string()
        } else {
            request.prompt.clone()
        };

        let mut parts = vec![ContentPart::Text(text)];
        if let Some(image) = &request.image {
            parts.push(ContentPart::InlineImage {
                mime_type: image.mime_type.clone(),
                data: image.bytes.clone(),
            });
        }

        let mut system_instruction = self.system_instruction.clone();
        if let Some(hint) = request.language_hint.as_deref() {
            system_instruction.push_str(&format!(
                "- The user asked for replies in {}. Write every text field in that language.\n",
                describe_language_hint(hint)
            ));
        }

        ModelInvocation {
            system_instruction,
            parts,
            response_mime_type: Some(JSON_RESPONSE_MIME_TYPE.to_string()),
        }
    }
}
