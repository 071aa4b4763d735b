use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::models::Language;

/// Character runs outside the set worth keeping in report text: the Arabic
/// blocks (base, supplement, extended-A, presentation forms), word characters,
/// whitespace and common punctuation. Everything else is a PDF artifact and
/// degrades to a space.
static PDF_ARTIFACTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"[^\u{0600}-\u{06FF}\u{0750}-\u{077F}\u{08A0}-\u{08FF}\u{FB50}-\u{FDFF}\u{FE70}-\u{FEFF}\w\s.,;:!?()\[\]{}"'-]+"#,
    )
    .unwrap()
});

const TATWEEL: char = '\u{0640}';

/// Normalizes extracted page text: folds compatibility forms (NFKC, which
/// also maps no-break spaces to plain ones), drops control characters,
/// collapses whitespace runs to single spaces and keeps blank lines as
/// paragraph breaks. Never fails, and running it twice changes nothing.
pub fn clean_text(text: &str) -> String {
    let folded: String = text.nfkc().collect();
    collapse_whitespace(&folded)
}

/// [`clean_text`] plus the Arabic-specific steps: presentation forms
/// (U+FB50..U+FDFF, U+FE70..U+FEFF) fold to their base letters via NFKC,
/// tatweel stretching is removed, and artifact runs degrade to spaces.
pub fn clean_arabic_text(text: &str) -> String {
    let folded: String = text.nfkc().collect();
    let retained = PDF_ARTIFACTS.replace_all(&folded, " ");
    let stripped = retained.replace(TATWEEL, "");
    collapse_whitespace(&stripped)
}

/// Cleaning entry point used by the ingestion path.
pub fn clean_for_language(text: &str, language: Language) -> String {
    match language {
        Language::English => clean_text(text),
        Language::Arabic => clean_arabic_text(text),
    }
}

/// Tags text by script: Arabic when Arabic-range letters outnumber Latin
/// ones, English otherwise (including for empty input).
pub fn detect_language(text: &str) -> Language {
    let mut arabic = 0usize;
    let mut latin = 0usize;
    for ch in text.chars() {
        if is_arabic_char(ch) {
            arabic += 1;
        } else if ch.is_ascii_alphabetic() {
            latin += 1;
        }
    }
    if arabic > latin {
        Language::Arabic
    } else {
        Language::English
    }
}

/// Covers the base Arabic blocks plus the presentation forms, which raw
/// extractor output still contains before any folding.
pub fn is_arabic_char(ch: char) -> bool {
    matches!(
        ch,
        '\u{0600}'..='\u{06FF}'
            | '\u{0750}'..='\u{077F}'
            | '\u{08A0}'..='\u{08FF}'
            | '\u{FB50}'..='\u{FDFF}'
            | '\u{FE70}'..='\u{FEFF}'
    )
}

/// Collapses runs of spaces, tabs and control characters inside each line to
/// one space, keeps single newlines between adjacent lines and reduces blank
/// runs to one empty line, so paragraph boundaries stay visible downstream.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_break: Option<&str> = None;

    for line in text.lines() {
        let line = line.trim_matches(|c: char| c.is_whitespace() || c.is_control());
        if line.is_empty() {
            if !out.is_empty() {
                pending_break = Some("\n\n");
            }
            continue;
        }
        if let Some(sep) = pending_break.take() {
            out.push_str(sep);
        }
        push_collapsed_line(line, &mut out);
        pending_break = Some("\n");
    }

    out
}

fn push_collapsed_line(line: &str, out: &mut String) {
    let mut gap = false;
    for ch in line.chars() {
        if ch.is_whitespace() || ch.is_control() {
            gap = true;
        } else {
            if gap {
                out.push(' ');
                gap = false;
            }
            out.push(ch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleaning_is_idempotent() {
        let messy = "  Market overview\u{00A0}\u{00A0}2025  \r\n\r\n\r\nPrices  rose.\t5%\n";
        let once = clean_text(messy);
        assert_eq!(clean_text(&once), once);
        assert_eq!(once, "Market overview 2025\n\nPrices rose. 5%");
    }

    #[test]
    fn control_characters_become_spaces() {
        assert_eq!(clean_text("a\u{0007}b"), "a b");
        assert_eq!(clean_text("a\u{0000}\u{0001}b"), "a b");
    }

    #[test]
    fn blank_runs_keep_one_paragraph_break() {
        assert_eq!(clean_text("one\n\n\n\ntwo"), "one\n\ntwo");
        assert_eq!(clean_text("\n\none"), "one");
    }

    #[test]
    fn tatweel_is_removed() {
        assert_eq!(clean_arabic_text("العـــربية"), "العربية");
    }

    #[test]
    fn presentation_forms_fold_to_base_letters() {
        // U+FEFB is the isolated lam-alef ligature.
        assert_eq!(clean_arabic_text("\u{FEFB}"), "\u{0644}\u{0627}");
        // U+FED3 is an initial-form feh.
        assert_eq!(clean_arabic_text("\u{FED3}"), "\u{0641}");
    }

    #[test]
    fn artifacts_degrade_to_spaces() {
        assert_eq!(clean_arabic_text("النص \u{2022} بعد"), "النص بعد");
        assert_eq!(clean_arabic_text("تقرير 📊 2025"), "تقرير 2025");
    }

    #[test]
    fn arabic_cleaning_keeps_common_punctuation() {
        let text = "السوق (2025): ارتفاع 5.2!";
        assert_eq!(clean_arabic_text(text), text);
    }

    #[test]
    fn language_detection_counts_scripts() {
        assert_eq!(detect_language("Real estate prices rose"), Language::English);
        assert_eq!(detect_language("ارتفعت أسعار العقارات"), Language::Arabic);
        assert_eq!(detect_language("تقرير report عن السوق"), Language::Arabic);
        assert_eq!(detect_language(""), Language::English);
    }

    #[test]
    fn presentation_form_text_detects_as_arabic() {
        // Detection runs on extractor output before folding, so the
        // presentation-form blocks must count as Arabic themselves.
        let raw = "\u{FED3}\u{FEFB} Q1 \u{FED3}\u{FEFB}";
        assert_eq!(detect_language(raw), Language::Arabic);
        assert_eq!(detect_language(&clean_arabic_text(raw)), Language::Arabic);
    }
}
