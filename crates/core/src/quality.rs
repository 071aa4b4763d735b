use crate::models::{Language, QualityTier};
use crate::normalize::is_arabic_char;

/// Tiers a chunk by how much informative script it carries. Arabic-tagged
/// text counts Arabic-range letters, everything else counts alphabetic
/// characters; the thresholds are shared. Diagnostic only: tiers are stored
/// in metadata and reports but never gate embedding or retrieval.
pub fn classify(text: &str, language: Language) -> QualityTier {
    let informative = match language {
        Language::Arabic => text.chars().filter(|&ch| is_arabic_char(ch)).count(),
        Language::English => text.chars().filter(|ch| ch.is_alphabetic()).count(),
    };

    if informative > 100 {
        QualityTier::High
    } else if informative >= 50 {
        QualityTier::Medium
    } else {
        QualityTier::Low
    }
}
