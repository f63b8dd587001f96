use serde_json::{Map, Value};
use tracing::debug;

use crate::analysis::types::{CareAdvice, CareGuide, PossibleCauses};

/// Model output that cannot be relayed as advice. Every variant keeps the
/// raw text for diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("model output is not valid JSON: {source}")]
    NotJson {
        raw: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("model output is a JSON {found}, expected an object")]
    NotAnObject { raw: String, found: &'static str },
    #[error("field `{field}` is {found}, expected {expected}")]
    WrongType {
        raw: String,
        field: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl ValidationError {
    pub fn raw(&self) -> &str {
        match self {
            ValidationError::NotJson { raw, .. }
            | ValidationError::NotAnObject { raw, .. }
            | ValidationError::WrongType { raw, .. } => raw,
        }
    }

    pub fn into_raw(self) -> String {
        match self {
            ValidationError::NotJson { raw, .. }
            | ValidationError::NotAnObject { raw, .. }
            | ValidationError::WrongType { raw, .. } => raw,
        }
    }
}

#[derive(Debug)]
struct ShapeError {
    field: String,
    expected: &'static str,
    found: &'static str,
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn lookup<'a>(object: &'a Map<String, Value>, keys: &[&'static str]) -> Option<(&'static str, &'a Value)> {
    keys.iter()
        .find_map(|key| {
            object
                .get(*key)
                .filter(|value| !value.is_null())
                .map(|value| (*key, value))
        })
}

fn field_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn text_field(
    object: &Map<String, Value>,
    parent: &str,
    keys: &[&'static str],
) -> Result<Option<String>, ShapeError> {
    match lookup(object, keys) {
        None => Ok(None),
        Some((_, Value::String(text))) => Ok(Some(text.clone())),
        Some((key, other)) => Err(ShapeError {
            field: field_path(parent, key),
            expected: "a string",
            found: json_kind(other),
        }),
    }
}

fn text_list(
    object: &Map<String, Value>,
    parent: &str,
    keys: &[&'static str],
) -> Result<Vec<String>, ShapeError> {
    match lookup(object, keys) {
        None => Ok(Vec::new()),
        Some((key, Value::Array(items))) => {
            let texts: Vec<String> = items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect();
            let dropped = items.len() - texts.len();
            if dropped > 0 {
                debug!(
                    field = %field_path(parent, key),
                    dropped,
                    "Dropped non-text entries from model list field"
                );
            }
            Ok(texts)
        }
        Some((key, other)) => Err(ShapeError {
            field: field_path(parent, key),
            expected: "an array of strings",
            found: json_kind(other),
        }),
    }
}

fn nested_object<'a>(
    object: &'a Map<String, Value>,
    keys: &[&'static str],
) -> Result<Option<(&'static str, &'a Map<String, Value>)>, ShapeError> {
    match lookup(object, keys) {
        None => Ok(None),
        Some((key, Value::Object(inner))) => Ok(Some((key, inner))),
        Some((key, other)) => Err(ShapeError {
            field: key.to_string(),
            expected: "an object",
            found: json_kind(other),
        }),
    }
}

fn read_possible_causes(object: &Map<String, Value>) -> Result<PossibleCauses, ShapeError> {
    let Some((key, causes)) = nested_object(object, &["possible_causes", "possibleCauses"])? else {
        return Ok(PossibleCauses::default());
    };

    Ok(PossibleCauses {
        environmental_problems: text_list(
            causes,
            key,
            &["environmental_problems", "environmentalProblems"],
        )?,
        health_problems: text_list(causes, key, &["health_problems", "healthProblems"])?,
    })
}

fn read_care_guide(object: &Map<String, Value>) -> Result<Option<CareGuide>, ShapeError> {
    let Some((key, guide)) = nested_object(object, &["careGuide", "care_guide"])? else {
        return Ok(None);
    };

    Ok(Some(CareGuide {
        language_code: text_field(guide, key, &["language", "language_code", "languageCode"])?,
        language_name: text_field(guide, key, &["language_name", "languageName"])?,
        watering: text_field(guide, key, &["Watering", "watering"])?,
        light: text_field(guide, key, &["Light", "light"])?,
        soil: text_field(guide, key, &["Soil", "soil"])?,
        pruning: text_field(guide, key, &["Pruning", "pruning"])?,
        common_issues: text_field(
            guide,
            key,
            &["Common issues", "common_issues", "commonIssues"],
        )?,
    }))
}

fn read_care_advice(object: &Map<String, Value>) -> Result<CareAdvice, ShapeError> {
    Ok(CareAdvice {
        plant_common_name: text_field(object, "", &["plant_common_name", "plantCommonName"])?,
        plant_scientific_name: text_field(
            object,
            "",
            &["plant_scientific_name", "plantScientificName"],
        )?,
        problem: text_field(object, "", &["problem"])?,
        possible_causes: read_possible_causes(object)?,
        recommended_actions: text_list(
            object,
            "",
            &["recommended_actions", "recommendedActions"],
        )?,
        prevention_tips: text_list(object, "", &["prevention_tips", "preventionTips"])?,
        care_guide: read_care_guide(object)?,
    })
}

pub fn validate(raw: &str) -> Result<CareAdvice, ValidationError> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(source) => {
            return Err(ValidationError::NotJson {
                raw: raw.to_string(),
                source,
            })
        }
    };

    let Value::Object(object) = &value else {
        return Err(ValidationError::NotAnObject {
            raw: raw.to_string(),
            found: json_kind(&value),
        });
    };

    read_care_advice(object).map_err(|shape| ValidationError::WrongType {
        raw: raw.to_string(),
        field: shape.field,
        expected: shape.expected,
        found: shape.found,
    })
}
