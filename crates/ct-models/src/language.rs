//! Language codes understood by the speech service.

pub const ENGLISH_AMERICAN: &str = "en-US";
pub const SIMPLIFIED_CHINESE: &str = "zh-Hans";
pub const KOREAN: &str = "ko";
pub const SPANISH: &str = "es";
pub const FRENCH: &str = "fr";

/// Translation targets accepted by the speech translation service.
const SUPPORTED_TRANSLATIONS: &[&str] = &[
    "af", "ar", "as", "bg", "bn", "bs", "ca", "cs", "cy", "da", "de", "el", "en", "es", "et", "fa",
    "fi", "fil", "fj", "fr", "ga", "gu", "he", "hi", "hr", "ht", "hu", "id", "is", "it", "ja", "kk",
    "kmr", "kn", "ko", "ku", "lt", "lv", "mg", "mi", "ml", "mr", "ms", "mt", "mww", "nb", "nl", "or",
    "otq", "pa", "pl", "prs", "ps", "pt", "pt-pt", "ro", "ru", "sk", "sl", "sm", "sr-Cyrl",
    "sr-Latn", "sv", "sw", "ta", "te", "th", "tlh-Latn", "tlh-Piqd", "to", "tr", "ty", "uk", "ur",
    "vi", "yua", "yue", "zh-Hans", "zh-Hant",
];

/// Source dialects accepted for recognition. Matching is exact (`en-US`, not `en-us`).
const SUPPORTED_RECOGNITION: &[&str] = &[
    "ar-AE", "ar-BH", "ar-EG", "ar-IQ", "ar-JO", "ar-KW", "ar-LB", "ar-OM", "ar-QA", "ar-SA",
    "ar-SY", "bg-BG", "ca-ES", "cs-CZ", "da-DK", "de-DE", "el-GR", "en-AU", "en-CA", "en-GB",
    "en-HK", "en-IE", "en-IN", "en-NZ", "en-PH", "en-SG", "en-US", "en-ZA", "es-AR", "es-BO",
    "es-CL", "es-CO", "es-CR", "es-CU", "es-DO", "es-EC", "es-ES", "es-GT", "es-HN", "es-MX",
    "es-NI", "es-PA", "es-PE", "es-PR", "es-PY", "es-SV", "es-US", "es-UY", "es-VE", "et-EE",
    "fi-FI", "fr-CA", "fr-FR", "ga-IE", "gu-IN", "hi-IN", "hr-HR", "hu-HU", "it-IT", "ja-JP",
    "ko-KR", "lt-LT", "lv-LV", "mr-IN", "mt-MT", "nb-NO", "nl-NL", "pl-PL", "pt-BR", "pt-PT",
    "ro-RO", "ru-RU", "sk-SK", "sl-SI", "sv-SE", "ta-IN", "te-IN", "th-TH", "tr-TR", "zh-CN",
    "zh-HK", "zh-TW",
];

pub fn is_supported_recognition(dialect: &str) -> bool {
    SUPPORTED_RECOGNITION.contains(&dialect)
}

pub fn is_supported_translation(language: &str) -> bool {
    SUPPORTED_TRANSLATIONS.contains(&language)
}

/// Lower-cased language part of a code: `en-US` -> `en`.
pub fn short_code(language: &str) -> String {
    language
        .split('-')
        .next()
        .unwrap_or(language)
        .to_lowercase()
}
