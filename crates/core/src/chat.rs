use futures::stream::StreamExt;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::{ServiceConfig, RETRY_BASE_DELAY};
use crate::error::ChatError;
use crate::models::ChatMessage;
use crate::traits::{AnswerStream, ChatClient};

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const REPLY_MAX_TOKENS: usize = 1000;

/// Client for an Azure OpenAI-style chat deployment, always streaming.
/// Request failures retry with backoff; once the stream has started, errors
/// surface through the stream instead.
pub struct AzureChatClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
    temperature: f32,
    max_retries: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: usize,
    stream: bool,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl AzureChatClient {
    pub fn new(config: &ServiceConfig, temperature: f32) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            url: config.deployment_url(&config.chat_deployment, "chat/completions"),
            api_key: config.api_key.clone(),
            temperature: temperature.clamp(0.0, 2.0),
            max_retries: config.max_retries,
        })
    }

    async fn request_once(&self, messages: &[ChatMessage]) -> Result<reqwest::Response, ChatError> {
        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&ChatRequest {
                messages,
                temperature: self.temperature,
                max_tokens: REPLY_MAX_TOKENS,
                stream: true,
            })
            .send()
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(ChatError::RateLimited);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status { status, body });
        }

        Ok(response)
    }
}

#[async_trait::async_trait]
impl ChatClient for AzureChatClient {
    async fn stream_reply(&self, messages: &[ChatMessage]) -> Result<AnswerStream, ChatError> {
        let mut attempt = 0u32;
        loop {
            match self.request_once(messages).await {
                Err(error) if error.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt - 1)).await;
                }
                other => return other.map(fragment_stream),
            }
        }
    }
}

fn fragment_stream(response: reqwest::Response) -> AnswerStream {
    let stream = response
        .bytes_stream()
        .scan(SseDecoder::default(), |decoder, chunk| {
            let items: Vec<Result<String, ChatError>> = match chunk {
                Ok(bytes) => decoder.feed(&bytes).into_iter().map(Ok).collect(),
                Err(error) => vec![Err(ChatError::Stream(error.to_string()))],
            };
            if items.is_empty() && decoder.done {
                return futures::future::ready(None);
            }
            futures::future::ready(Some(items))
        })
        .flat_map(futures::stream::iter);
    Box::pin(stream)
}

/// Incremental decoder for `text/event-stream` replies. Network chunks can
/// split anywhere, including inside a multi-byte character, so bytes are
/// buffered until a full line is available and only whole lines are parsed.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    /// Feeds one network chunk and returns the content fragments completed
    /// by it. After the terminal `[DONE]` event everything is ignored.
    fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut fragments = Vec::new();
        if self.done {
            return fragments;
        }
        self.buffer.extend_from_slice(bytes);

        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\n', '\r']);

            let data = match line.strip_prefix("data:") {
                Some(rest) => rest.trim_start(),
                None => continue,
            };
            if data == "[DONE]" {
                self.done = true;
                break;
            }
            // Events without a text delta (role announcements, filter
            // annotations) are skipped.
            if let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) {
                if let Some(content) = chunk
                    .choices
                    .first()
                    .and_then(|choice| choice.delta.content.clone())
                {
                    if !content.is_empty() {
                        fragments.push(content);
                    }
                }
            }
        }

        fragments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_line(content: &str) -> String {
        format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{content}\"}}}}]}}\n")
    }

    #[test]
    fn fragments_survive_chunk_boundaries_inside_a_line() {
        let mut decoder = SseDecoder::default();

        let first = decoder.feed(br#"data: {"choices":[{"delta":{"con"#);
        assert!(first.is_empty());

        let rest = format!("tent\":\"Hel\"}}}}]}}\n\n{}", delta_line("lo"));
        let second = decoder.feed(rest.as_bytes());
        assert_eq!(second, vec!["Hel".to_string(), "lo".to_string()]);
    }

    #[test]
    fn multibyte_content_survives_an_awkward_split() {
        let line = delta_line("عقار");
        let bytes = line.as_bytes();
        // Split inside the first Arabic character's UTF-8 encoding.
        let (head, tail) = bytes.split_at(40);

        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(head).is_empty());
        assert_eq!(decoder.feed(tail), vec!["عقار".to_string()]);
    }

    #[test]
    fn done_marker_terminates_the_stream() {
        let mut decoder = SseDecoder::default();
        let input = format!("data: [DONE]\n\n{}", delta_line("late"));
        assert!(decoder.feed(input.as_bytes()).is_empty());
        assert!(decoder.done);
        assert!(decoder.feed(delta_line("more").as_bytes()).is_empty());
    }

    #[test]
    fn role_announcements_and_blank_lines_are_skipped() {
        let mut decoder = SseDecoder::default();
        let input = format!(
            "data: {{\"choices\":[{{\"delta\":{{\"role\":\"assistant\"}}}}]}}\n\n{}",
            delta_line("Prices")
        );
        assert_eq!(decoder.feed(input.as_bytes()), vec!["Prices".to_string()]);
    }

    #[test]
    fn request_body_streams_with_bounded_parameters() {
        let messages = [ChatMessage::user("What happened to prices?")];
        let body = serde_json::to_value(ChatRequest {
            messages: &messages,
            temperature: 0.7,
            max_tokens: REPLY_MAX_TOKENS,
            stream: true,
        })
        .unwrap();

        assert_eq!(body["stream"], serde_json::json!(true));
        assert_eq!(body["max_tokens"], serde_json::json!(1000));
        assert_eq!(body["messages"][0]["role"], serde_json::json!("user"));
    }
}
