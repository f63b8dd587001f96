use base64::{engine::general_purpose, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::analysis::types::{AnalysisRequest, ImagePayload, RawAnalysisInput};
use crate::llm::media::{detect_mime_type, normalize_image_mime_type, DEFAULT_IMAGE_MIME_TYPE};

static DATA_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data:([^;,]*)(?:;[^,]*)?;base64,").expect("valid data url regex")
});

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RejectionError {
    #[error("Please provide a prompt or an image.")]
    EmptyRequest,
    #[error("The image could not be decoded: {0}")]
    InvalidImage(String),
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn split_data_url(image: &str) -> (Option<String>, &str) {
    match DATA_URL_RE.captures(image) {
        Some(captures) => {
            let declared = captures
                .get(1)
                .map(|value| value.as_str().trim().to_string())
                .filter(|value| !value.is_empty());
            let end = captures.get(0).map(|whole| whole.end()).unwrap_or(0);
            (declared, &image[end..])
        }
        None => (None, image),
    }
}

fn decode_image(encoded: &str) -> Result<Vec<u8>, RejectionError> {
    let compact: String = encoded.chars().filter(|ch| !ch.is_whitespace()).collect();
    general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|err| RejectionError::InvalidImage(err.to_string()))
}

fn resolve_image(
    image: Option<&str>,
    declared_mime_type: Option<&str>,
) -> Result<Option<ImagePayload>, RejectionError> {
    let Some(image) = non_blank(image) else {
        return Ok(None);
    };

    let (data_url_mime_type, encoded) = split_data_url(image);
    let bytes = decode_image(encoded)?;
    if bytes.is_empty() {
        return Ok(None);
    }

    let mime_type = non_blank(declared_mime_type)
        .map(str::to_string)
        .or(data_url_mime_type)
        .or_else(|| detect_mime_type(&bytes))
        .map(|value| normalize_image_mime_type(&value))
        .unwrap_or_else(|| DEFAULT_IMAGE_MIME_TYPE.to_string());

    Ok(Some(ImagePayload { bytes, mime_type }))
}

pub fn normalize(input: &RawAnalysisInput) -> Result<AnalysisRequest, RejectionError> {
    let prompt = input.prompt.as_deref().unwrap_or("").trim().to_string();
    let image = resolve_image(input.image.as_deref(), input.mime_type.as_deref())?;

    if prompt.is_empty() && image.is_none() {
        return Err(RejectionError::EmptyRequest);
    }

    Ok(AnalysisRequest {
        prompt,
        image,
        language_hint: non_blank(input.language.as_deref()).map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R',
    ];

    fn input(prompt: Option<&str>, image: Option<&str>, mime_type: Option<&str>) -> RawAnalysisInput {
        RawAnalysisInput {
            prompt: prompt.map(str::to_string),
            image: image.map(str::to_string),
            mime_type: mime_type.map(str::to_string),
            language: None,
        }
    }

    #[test]
    fn rejects_blank_prompt_without_image() {
        for prompt in [None, Some(""), Some("   \n\t")] {
            for image in [None, Some(""), Some("  ")] {
                assert_eq!(
                    normalize(&input(prompt, image, None)),
                    Err(RejectionError::EmptyRequest)
                );
            }
        }
    }

    #[test]
    fn trims_prompt_and_passes_language_hint_through() {
        let mut raw = input(Some("  My fern's leaves are yellowing \n"), None, None);
        raw.language = Some(" cy ".to_string());
        let request = normalize(&raw).unwrap();
        assert_eq!(request.prompt, "My fern's leaves are yellowing");
        assert_eq!(request.image, None);
        assert_eq!(request.language_hint.as_deref(), Some("cy"));
    }

    #[test]
    fn blank_language_hint_means_auto_detect() {
        let mut raw = input(Some("hello"), None, None);
        raw.language = Some("  ".to_string());
        assert_eq!(normalize(&raw).unwrap().language_hint, None);
    }

    #[test]
    fn image_without_prompt_is_accepted() {
        let encoded = general_purpose::STANDARD.encode(b"raw-leaf-bytes");
        let request = normalize(&input(None, Some(&encoded), Some("image/png"))).unwrap();
        assert_eq!(request.prompt, "");
        let image = request.image.unwrap();
        assert_eq!(image.bytes, b"raw-leaf-bytes");
        assert_eq!(image.mime_type, "image/png");
    }

    #[test]
    fn typeless_blob_defaults_to_generic_image_type() {
        let encoded = general_purpose::STANDARD.encode(b"not a known format");
        let request = normalize(&input(Some("what is this"), Some(&encoded), None)).unwrap();
        assert_eq!(request.image.unwrap().mime_type, DEFAULT_IMAGE_MIME_TYPE);
    }

    #[test]
    fn typeless_blob_is_sniffed_when_possible() {
        let encoded = general_purpose::STANDARD.encode(PNG_HEADER);
        let request = normalize(&input(None, Some(&encoded), Some("  "))).unwrap();
        assert_eq!(request.image.unwrap().mime_type, "image/png");
    }

    #[test]
    fn data_url_prefix_is_stripped_and_its_type_used() {
        let encoded = format!(
            "data:image/webp;base64,{}",
            general_purpose::STANDARD.encode(b"webp-ish")
        );
        let image = normalize(&input(None, Some(&encoded), None))
            .unwrap()
            .image
            .unwrap();
        assert_eq!(image.bytes, b"webp-ish");
        assert_eq!(image.mime_type, "image/webp");
    }

    #[test]
    fn explicit_mime_type_wins_and_is_normalised() {
        let encoded = format!(
            "data:image/webp;base64,{}",
            general_purpose::STANDARD.encode(b"bytes")
        );
        let image = normalize(&input(None, Some(&encoded), Some("Image/JPG")))
            .unwrap()
            .image
            .unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
    }

    #[test]
    fn wrapped_base64_is_tolerated() {
        let encoded = general_purpose::STANDARD.encode(b"a longer payload of leaf pixels");
        let (head, tail) = encoded.split_at(10);
        let wrapped = format!("{head}\n{tail}");
        let image = normalize(&input(None, Some(&wrapped), Some("image/png")))
            .unwrap()
            .image
            .unwrap();
        assert_eq!(image.bytes, b"a longer payload of leaf pixels");
    }

    #[test]
    fn undecodable_image_is_a_client_error() {
        let result = normalize(&input(Some("help"), Some("%%%not-base64%%%"), None));
        assert!(matches!(result, Err(RejectionError::InvalidImage(_))));
    }
}
