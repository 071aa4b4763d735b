use std::sync::LazyLock;

use tiktoken_rs::CoreBPE;

// cl100k_base is the tokenizer of the text-embedding-3 family, so the chunk
// budget counts the same tokens the embedding service sees.
static BPE: LazyLock<CoreBPE> = LazyLock::new(|| {
    tiktoken_rs::cl100k_base().expect("cl100k_base vocabulary ships with the binary")
});

/// Token count of `text` under the embedding model's tokenizer.
pub fn count_tokens(text: &str) -> usize {
    BPE.encode_with_special_tokens(text).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_has_no_tokens() {
        assert_eq!(count_tokens(""), 0);
    }

    #[test]
    fn short_english_sentence_stays_small() {
        let count = count_tokens("Real estate prices rose 5% in Q1 2025.");
        assert!(count > 5 && count < 25);
    }

    #[test]
    fn arabic_words_cost_multiple_tokens() {
        assert!(count_tokens("ارتفعت أسعار العقارات") >= 3);
    }
}
