use crate::error::{RetrieveError, TurnError};
use crate::models::{ChatMessage, Language, RetrievedChunk};
use crate::normalize::detect_language;
use crate::retriever::{Retriever, DEFAULT_TOP_K};
use crate::traits::{AnswerStream, ChatClient, EmbeddingClient, VectorStore};

/// Formats retrieved chunks into the context handed to the model: each
/// chunk's text followed by its source attribution so the model can cite
/// filename, pages, language, quality and title.
pub fn context_block(hits: &[RetrievedChunk]) -> String {
    let mut blocks = Vec::with_capacity(hits.len());
    for hit in hits {
        let metadata = &hit.record.metadata;

        let mut source_parts = Vec::new();
        if !metadata.filename.is_empty() {
            source_parts.push(metadata.filename.clone());
        }
        if !metadata.page_numbers.is_empty() {
            let pages = metadata
                .page_numbers
                .iter()
                .map(|page| page.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            source_parts.push(format!("p. {pages}"));
        }
        source_parts.push(format!("Lang: {}", metadata.language.as_str()));
        source_parts.push(format!("Quality: {}", metadata.quality.as_str()));

        let mut block = format!("{}\nSource: {}", hit.record.text, source_parts.join(" - "));
        if let Some(title) = &metadata.title {
            block.push_str(&format!("\nTitle: {title}"));
        }
        blocks.push(block);
    }
    blocks.join("\n\n")
}

/// The system prompt follows the question's language: Arabic questions get
/// Arabic instructions and an Arabic no-context notice, everything else gets
/// the English prompt with a respond-in-kind instruction.
fn grounding_prompt(question_language: Language, hits: &[RetrievedChunk]) -> String {
    match question_language {
        Language::Arabic => {
            let context = if hits.is_empty() {
                "لم يتم استرجاع أي مقاطع داعمة لهذا السؤال. أخبر المستخدم أن قاعدة \
                 المعرفة لا تحتوي على معلومات ذات صلة بدلاً من الإجابة من الذاكرة."
                    .to_string()
            } else {
                context_block(hits)
            };
            format!(
                "أنت مساعد ذكي متخصص في تحليل التقارير. أجب على الأسئلة بناءً على \
                 المعلومات المقدمة في السياق. استخدم فقط المعلومات من السياق المقدم \
                 للإجابة على الأسئلة. إذا لم تكن متأكداً أو لم يحتوي السياق على \
                 المعلومات ذات الصلة، قل ذلك.\n\n\
                 السياق من التقارير:\n{context}\n\n\
                 تذكر أن تجيب باللغة العربية إذا كان السؤال بالعربية."
            )
        }
        Language::English => {
            let context = if hits.is_empty() {
                "No supporting passages were retrieved for this question. Tell the user that the \
                 knowledge base contains nothing relevant instead of answering from memory."
                    .to_string()
            } else {
                context_block(hits)
            };
            format!(
                "You are a helpful analyst assistant answering questions about a collection of \
                 reports. Use only the information from the provided context to answer questions. \
                 If you are unsure or the context does not contain the relevant information, say so.\n\n\
                 Context from the reports:\n{context}\n\n\
                 Always provide accurate, data-driven insights based on the report content. \
                 Respond in the same language as the user's question."
            )
        }
    }
}

/// Builds grounded message lists and submits them to the chat deployment.
pub struct AnswerComposer<C>
where
    C: ChatClient,
{
    chat: C,
}

impl<C> AnswerComposer<C>
where
    C: ChatClient + Send + Sync,
{
    pub fn new(chat: C) -> Self {
        Self { chat }
    }

    /// The full message list for one turn: grounding system prompt in the
    /// question's language, prior turns replayed in order, then the new
    /// question.
    pub fn compose(
        &self,
        question: &str,
        history: &[ChatMessage],
        hits: &[RetrievedChunk],
    ) -> Vec<ChatMessage> {
        let question_language = detect_language(question);
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(grounding_prompt(question_language, hits)));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(question));
        messages
    }
}

/// One answered question: the retrieved context plus the reply stream the
/// caller renders fragment by fragment.
pub struct ChatTurn {
    pub hits: Vec<RetrievedChunk>,
    pub stream: AnswerStream,
}

/// Interactive question-answering over one knowledge-base table. Each turn
/// runs embed, retrieve, compose, stream; a failure in any phase surfaces a
/// [`TurnError`] tagged with that phase and leaves the session ready for the
/// next question.
pub struct ChatSession<E, S, C>
where
    E: EmbeddingClient,
    S: VectorStore,
    C: ChatClient,
{
    retriever: Retriever<E, S>,
    composer: AnswerComposer<C>,
    top_k: usize,
    history: Vec<ChatMessage>,
}

impl<E, S, C> ChatSession<E, S, C>
where
    E: EmbeddingClient + Send + Sync,
    S: VectorStore + Send + Sync,
    C: ChatClient + Send + Sync,
{
    pub fn new(retriever: Retriever<E, S>, chat: C) -> Self {
        Self {
            retriever,
            composer: AnswerComposer::new(chat),
            top_k: DEFAULT_TOP_K,
            history: Vec::new(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Runs one turn. The question joins the replayed history only once the
    /// reply stream has started, so a failed turn leaves the session exactly
    /// as it was.
    pub async fn run_turn(&mut self, question: &str) -> Result<ChatTurn, TurnError> {
        let hits = self
            .retriever
            .retrieve(question, self.top_k)
            .await
            .map_err(|error| match error {
                RetrieveError::Embed(inner) => TurnError::Embedding(inner),
                RetrieveError::Store(inner) => TurnError::Retrieving(inner),
            })?;

        let messages = self.composer.compose(question, &self.history, &hits);
        let stream = self
            .composer
            .chat
            .stream_reply(&messages)
            .await
            .map_err(TurnError::Composing)?;

        self.history.push(ChatMessage::user(question));
        Ok(ChatTurn { hits, stream })
    }

    /// Records the fully rendered reply so later turns replay it. A stream
    /// that died before yielding anything leaves no assistant message behind.
    pub fn record_reply(&mut self, reply: impl Into<String>) {
        let reply = reply.into();
        if reply.is_empty() {
            return;
        }
        self.history.push(ChatMessage::assistant(reply));
    }
}
