use sha2::{Digest, Sha256};

use crate::error::IngestError;
use crate::models::{ChunkingOptions, DocumentChunks, DocumentText, Language, ReportChunk};
use crate::quality;
use crate::tokens::count_tokens;

const PARAGRAPH_SEP: &str = "\n\n";

/// Two-pass chunker. The structural pass follows detected headings and
/// paragraph boundaries under the token budget; when it yields nothing, a
/// plain paragraph pass over blank-line boundaries runs instead. Identical
/// input and options always produce byte-identical chunks.
pub struct HybridChunker {
    options: ChunkingOptions,
    separator_tokens: usize,
}

/// One paragraph with the page it was extracted from.
#[derive(Debug, Clone)]
struct Span {
    text: String,
    page: u32,
}

/// Consecutive spans grouped under one detected heading. The heading's own
/// text stays in `spans` so chunk text still covers the full document.
struct Section {
    heading: Option<String>,
    spans: Vec<Span>,
}

/// A budget-compliant run of text on its way to becoming a chunk.
#[derive(Debug, Clone)]
struct Piece {
    text: String,
    pages: Vec<u32>,
    tokens: usize,
    section: Option<String>,
}

impl Piece {
    fn from_span(text: String, page: u32, tokens: usize, section: Option<String>) -> Self {
        Self {
            text,
            pages: vec![page],
            tokens,
            section,
        }
    }

    fn absorb(&mut self, other: Piece, separator_tokens: usize) {
        self.text.push_str(PARAGRAPH_SEP);
        self.text.push_str(&other.text);
        self.tokens += separator_tokens + other.tokens;
        self.merge_pages(other.pages);
    }

    fn prepend(&mut self, other: Piece, separator_tokens: usize) {
        let mut text = other.text;
        text.push_str(PARAGRAPH_SEP);
        text.push_str(&self.text);
        self.text = text;
        self.tokens += separator_tokens + other.tokens;
        self.merge_pages(other.pages);
    }

    fn merge_pages(&mut self, pages: Vec<u32>) {
        for page in pages {
            if !self.pages.contains(&page) {
                self.pages.push(page);
            }
        }
        self.pages.sort_unstable();
    }
}

impl HybridChunker {
    pub fn new(options: ChunkingOptions) -> Result<Self, IngestError> {
        options.validate()?;
        Ok(Self {
            options,
            separator_tokens: count_tokens(PARAGRAPH_SEP),
        })
    }

    /// Chunker with the per-language budget defaults, which always validate.
    pub fn with_defaults_for(language: Language) -> Self {
        Self {
            options: ChunkingOptions::for_language(language),
            separator_tokens: count_tokens(PARAGRAPH_SEP),
        }
    }

    pub fn options(&self) -> &ChunkingOptions {
        &self.options
    }

    pub fn chunk(&self, document: &DocumentText) -> Result<DocumentChunks, IngestError> {
        let spans = collect_spans(document);

        let (mut pieces, mut dropped_short) = self.structural_pass(&spans);
        if pieces.is_empty() {
            pieces = self.fallback_pass(&spans);
            dropped_short = 0;
        }
        if pieces.is_empty() {
            return Err(IngestError::NoChunks(
                document.fingerprint.filename.clone(),
            ));
        }

        let fingerprint = document.fingerprint.clone();
        let mut chunks = Vec::with_capacity(pieces.len());
        for (index, piece) in pieces.into_iter().enumerate() {
            let index = index as u64;
            let first_page = piece.pages.first().copied().unwrap_or(0);
            let token_count = count_tokens(&piece.text);
            let quality = quality::classify(&piece.text, fingerprint.language);
            let chunk_id =
                make_chunk_id(&fingerprint.document_id, first_page, index, &piece.text);

            chunks.push(ReportChunk {
                chunk_id,
                filename: fingerprint.filename.clone(),
                title: fingerprint.title.clone(),
                section: piece.section,
                page_numbers: piece.pages,
                chunk_index: index,
                text: piece.text,
                language: fingerprint.language,
                quality,
                token_count,
            });
        }

        Ok(DocumentChunks {
            fingerprint,
            chunks,
            dropped_short,
        })
    }

    fn structural_pass(&self, spans: &[Span]) -> (Vec<Piece>, usize) {
        let mut pieces = Vec::new();
        let mut dropped = 0usize;

        for section in split_sections(spans) {
            let mut section_pieces = self.bounded_pieces(&section.spans, section.heading.clone());
            if self.options.merge_peers {
                section_pieces = self.merge_adjacent(section_pieces);
            }
            let (kept, dropped_here) = self.enforce_min_tokens(section_pieces);
            dropped += dropped_here;
            pieces.extend(kept);
        }

        (pieces, dropped)
    }

    /// Plain paragraph chunking with no heading structure and no minimum-size
    /// filter, so a document survives even when every structural chunk fell
    /// under `min_tokens`.
    fn fallback_pass(&self, spans: &[Span]) -> Vec<Piece> {
        let mut pieces = self.bounded_pieces(spans, None);
        if self.options.merge_peers {
            pieces = self.merge_adjacent(pieces);
        }
        pieces
    }

    /// One piece per span, splitting oversize spans at sentence boundaries
    /// (words as a last resort) so every piece fits the budget.
    fn bounded_pieces(&self, spans: &[Span], section: Option<String>) -> Vec<Piece> {
        let mut pieces = Vec::new();
        for span in spans {
            let tokens = count_tokens(&span.text);
            if tokens <= self.options.max_tokens {
                pieces.push(Piece::from_span(
                    span.text.clone(),
                    span.page,
                    tokens,
                    section.clone(),
                ));
                continue;
            }
            for part in self.split_oversize(&span.text) {
                let tokens = count_tokens(&part);
                pieces.push(Piece::from_span(part, span.page, tokens, section.clone()));
            }
        }
        pieces
    }

    fn merge_adjacent(&self, pieces: Vec<Piece>) -> Vec<Piece> {
        let mut merged: Vec<Piece> = Vec::new();
        for piece in pieces {
            match merged.last_mut() {
                Some(last)
                    if last.tokens + self.separator_tokens + piece.tokens
                        <= self.options.max_tokens =>
                {
                    last.absorb(piece, self.separator_tokens);
                }
                _ => merged.push(piece),
            }
        }
        merged
    }

    /// Folds undersized pieces into the previous piece, else the next one,
    /// else drops them. Dropped pieces are counted, not silently lost.
    fn enforce_min_tokens(&self, pieces: Vec<Piece>) -> (Vec<Piece>, usize) {
        let mut kept: Vec<Piece> = Vec::new();
        let mut dropped = 0usize;
        let mut rest = pieces.into_iter().peekable();

        while let Some(piece) = rest.next() {
            if piece.tokens >= self.options.min_tokens {
                kept.push(piece);
                continue;
            }

            if let Some(last) = kept.last_mut() {
                if last.tokens + self.separator_tokens + piece.tokens <= self.options.max_tokens {
                    last.absorb(piece, self.separator_tokens);
                    continue;
                }
            }

            match rest.peek_mut() {
                Some(next)
                    if piece.tokens + self.separator_tokens + next.tokens
                        <= self.options.max_tokens =>
                {
                    next.prepend(piece, self.separator_tokens);
                }
                _ => dropped += 1,
            }
        }

        (kept, dropped)
    }

    fn split_oversize(&self, text: &str) -> Vec<String> {
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0usize;

        for sentence in split_sentences(text) {
            let tokens = count_tokens(&sentence);
            if tokens > self.options.max_tokens {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                    current_tokens = 0;
                }
                parts.extend(self.split_words(&sentence));
                continue;
            }
            if current.is_empty() {
                current = sentence;
                current_tokens = tokens;
            } else if current_tokens + 1 + tokens <= self.options.max_tokens {
                current.push(' ');
                current.push_str(&sentence);
                current_tokens += 1 + tokens;
            } else {
                parts.push(std::mem::replace(&mut current, sentence));
                current_tokens = tokens;
            }
        }
        if !current.is_empty() {
            parts.push(current);
        }
        parts
    }

    // Word grouping is the floor: a single word never splits further.
    fn split_words(&self, text: &str) -> Vec<String> {
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0usize;

        for word in text.split_whitespace() {
            let tokens = count_tokens(word);
            if current.is_empty() {
                current = word.to_string();
                current_tokens = tokens;
            } else if current_tokens + 1 + tokens <= self.options.max_tokens {
                current.push(' ');
                current.push_str(word);
                current_tokens += 1 + tokens;
            } else {
                parts.push(std::mem::replace(&mut current, word.to_string()));
                current_tokens = tokens;
            }
        }
        if !current.is_empty() {
            parts.push(current);
        }
        parts
    }
}

fn collect_spans(document: &DocumentText) -> Vec<Span> {
    let mut spans = Vec::new();
    for page in &document.pages {
        for paragraph in page.text.split(PARAGRAPH_SEP) {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            spans.push(Span {
                text: paragraph.to_string(),
                page: page.number,
            });
        }
    }
    spans
}

fn split_sections(spans: &[Span]) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    for span in spans {
        if is_heading(&span.text) {
            sections.push(Section {
                heading: Some(heading_title(&span.text)),
                spans: vec![span.clone()],
            });
        } else {
            match sections.last_mut() {
                Some(section) => section.spans.push(span.clone()),
                None => sections.push(Section {
                    heading: None,
                    spans: vec![span.clone()],
                }),
            }
        }
    }
    sections
}

/// Heading heuristic: a markdown-style `#` line, or a short standalone line
/// mostly in Title Case without terminal punctuation.
fn is_heading(paragraph: &str) -> bool {
    if paragraph.contains('\n') {
        return false;
    }
    if paragraph.starts_with('#') {
        return true;
    }

    let words: Vec<&str> = paragraph.split_whitespace().collect();
    if words.is_empty() || words.len() > 8 {
        return false;
    }
    if paragraph.ends_with(['.', '!', '?', ',', ';', '،', '؛', '؟']) {
        return false;
    }

    let mut capitalized = 0usize;
    let mut alphabetic = 0usize;
    for word in &words {
        if let Some(first) = word.chars().next() {
            if first.is_alphabetic() {
                alphabetic += 1;
                if first.is_uppercase() {
                    capitalized += 1;
                }
            }
        }
    }
    alphabetic > 0 && capitalized * 2 > alphabetic
}

fn heading_title(paragraph: &str) -> String {
    paragraph.trim_start_matches('#').trim().to_string()
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        let terminal = matches!(ch, '.' | '!' | '?' | '؟' | '؛');
        if terminal && chars.peek().map_or(true, |next| next.is_whitespace()) {
            let sentence = current.trim().to_string();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            current.clear();
        }
    }

    let tail = current.trim().to_string();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn make_chunk_id(document_id: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
