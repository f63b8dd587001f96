use serde::{Deserialize, Serialize};

/// Body of `POST /analyse`. Accepts both the image-capable shape
/// `{prompt, image, mimeType}` and the earlier `{prompt, language}` shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAnalysisInput {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, rename = "mimeType", alias = "mime_type")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Normalised input ready for the model. Either `prompt` is non-empty or
/// `image` is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub prompt: String,
    pub image: Option<ImagePayload>,
    pub language_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    InlineImage { mime_type: String, data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInvocation {
    pub system_instruction: String,
    pub parts: Vec<ContentPart>,
    pub response_mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PossibleCauses {
    pub environmental_problems: Vec<String>,
    pub health_problems: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CareGuide {
    #[serde(rename = "language", skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_name: Option<String>,
    #[serde(rename = "Watering", skip_serializing_if = "Option::is_none")]
    pub watering: Option<String>,
    #[serde(rename = "Light", skip_serializing_if = "Option::is_none")]
    pub light: Option<String>,
    #[serde(rename = "Soil", skip_serializing_if = "Option::is_none")]
    pub soil: Option<String>,
    #[serde(rename = "Pruning", skip_serializing_if = "Option::is_none")]
    pub pruning: Option<String>,
    #[serde(rename = "Common issues", skip_serializing_if = "Option::is_none")]
    pub common_issues: Option<String>,
}

/// Validated model reply. Missing text stays `None`; display defaults are
/// the client's business.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CareAdvice {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plant_common_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plant_scientific_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
    pub possible_causes: PossibleCauses,
    pub recommended_actions: Vec<String>,
    pub prevention_tips: Vec<String>,
    #[serde(rename = "careGuide", skip_serializing_if = "Option::is_none")]
    pub care_guide: Option<CareGuide>,
}

impl CareAdvice {
    pub fn sighting_name(&self) -> &str {
        self.plant_common_name.as_deref().unwrap_or("")
    }
}
