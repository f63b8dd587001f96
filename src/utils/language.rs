fn language_name_from_ietf_tag(language_code: &str) -> Option<&'static str> {
    let primary = language_code
        .split(|ch| ch == '-' || ch == '_')
        .next()?
        .trim()
        .to_lowercase();
    match primary.as_str() {
        "en" => Some("English"),
        "zh" => Some("Chinese"),
        "ja" => Some("Japanese"),
        "ko" => Some("Korean"),
        "ru" => Some("Russian"),
        "uk" => Some("Ukrainian"),
        "es" => Some("Spanish"),
        "pt" => Some("Portuguese"),
        "it" => Some("Italian"),
        "fr" => Some("French"),
        "de" => Some("German"),
        "ar" => Some("Arabic"),
        "hi" => Some("Hindi"),
        "tr" => Some("Turkish"),
        "nl" => Some("Dutch"),
        "pl" => Some("Polish"),
        "vi" => Some("Vietnamese"),
        "th" => Some("Thai"),
        "id" => Some("Indonesian"),
        "fa" => Some("Persian"),
        "he" | "iw" => Some("Hebrew"),
        "bn" => Some("Bengali"),
        "ta" => Some("Tamil"),
        "sv" => Some("Swedish"),
        "cy" => Some("Welsh"),
        _ => None,
    }
}

/// Describes a free-form language hint for the model, e.g. `es-MX` becomes
/// `Spanish (es-MX)`. Unknown codes are passed through untouched.
pub fn describe_language_hint(hint: &str) -> String {
    let hint = hint.trim();
    match language_name_from_ietf_tag(hint) {
        Some(name) if !name.eq_ignore_ascii_case(hint) => format!("{name} ({hint})"),
        _ => hint.to_string(),
    }
}
