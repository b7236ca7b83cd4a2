//! OpenAI-compatible chat completions backend (OpenAI, Ollama, LM Studio,
//! vLLM, ...).
//!
//! `chat` issues a non-streaming completion. `run` issues a streaming
//! completion and turns each SSE content delta into a `message` chunk.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, info_span, Instrument};

use crate::config::AgentConfig;
use crate::models::event::ExecutionChunk;
use crate::{AppError, Result};

use super::{ChatAgent, ChunkStream};

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatibleAgent {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleAgent {
    /// Build a client from agent configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Agent` if the HTTP client cannot be constructed.
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, text: &str, stream: bool) -> reqwest::RequestBuilder {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": text }],
            "stream": stream,
        });

        let request = self.client.post(&self.endpoint).json(&body);
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

impl ChatAgent for OpenAiCompatibleAgent {
    fn chat(&self, text: &str) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        let request = self.request(text, false);
        Box::pin(
            async move {
                let response = request.send().await?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(AppError::Agent(format!("HTTP {status}: {body}")));
                }

                let payload: Value = response.json().await?;
                payload
                    .pointer("/choices/0/message/content")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .ok_or_else(|| AppError::Agent("response has no message content".into()))
            }
            .instrument(info_span!("agent_chat")),
        )
    }

    fn run(&self, text: &str) -> ChunkStream {
        let request = self.request(text, true);
        Box::pin(futures_util::stream::unfold(
            RunState::Pending(request),
            next_chunk,
        ))
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

enum RunState {
    Pending(reqwest::RequestBuilder),
    Streaming {
        bytes: ByteStream,
        decoder: SseDecoder,
        queued: VecDeque<ExecutionChunk>,
    },
    Done,
}

async fn next_chunk(state: RunState) -> Option<(Result<ExecutionChunk>, RunState)> {
    let mut state = state;
    loop {
        match std::mem::replace(&mut state, RunState::Done) {
            RunState::Pending(request) => {
                let response = match request.send().await {
                    Ok(response) => response,
                    Err(err) => return Some((Err(err.into()), RunState::Done)),
                };
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    let err = AppError::Agent(format!("HTTP {status}: {body}"));
                    return Some((Err(err), RunState::Done));
                }
                state = RunState::Streaming {
                    bytes: Box::pin(response.bytes_stream()),
                    decoder: SseDecoder::default(),
                    queued: VecDeque::new(),
                };
            }
            RunState::Streaming {
                mut bytes,
                mut decoder,
                mut queued,
            } => {
                if let Some(chunk) = queued.pop_front() {
                    return Some((
                        Ok(chunk),
                        RunState::Streaming {
                            bytes,
                            decoder,
                            queued,
                        },
                    ));
                }
                if decoder.is_done() {
                    return None;
                }

                match bytes.next().await {
                    Some(Ok(data)) => queued.extend(decoder.push(&data)),
                    Some(Err(err)) => return Some((Err(err.into()), RunState::Done)),
                    None => {
                        queued.extend(decoder.finish());
                        if queued.is_empty() {
                            debug!("completion stream ended without [DONE]");
                            return None;
                        }
                    }
                }
                state = RunState::Streaming {
                    bytes,
                    decoder,
                    queued,
                };
            }
            RunState::Done => return None,
        }
    }
}

/// Incremental decoder for chat-completion SSE bodies.
///
/// Buffers raw bytes until a full line is available, so multi-byte
/// characters split across network reads decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    /// Feed bytes; returns one `message` chunk per completed content delta.
    pub fn push(&mut self, data: &[u8]) -> Vec<ExecutionChunk> {
        self.buffer.extend_from_slice(data);
        let mut chunks = Vec::new();

        while !self.done {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.consume_line(&String::from_utf8_lossy(&line), &mut chunks);
        }
        chunks
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<ExecutionChunk> {
        let mut chunks = Vec::new();
        if !self.done && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.consume_line(&String::from_utf8_lossy(&line), &mut chunks);
        }
        self.done = true;
        chunks
    }

    /// Whether the `[DONE]` sentinel (or end of input) has been seen.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn consume_line(&mut self, line: &str, chunks: &mut Vec<ExecutionChunk>) {
        let Some(data) = line.trim().strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            return;
        }

        let content = serde_json::from_str::<Value>(data).ok().and_then(|value| {
            value
                .pointer("/choices/0/delta/content")
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty())
                .map(str::to_owned)
        });
        if let Some(content) = content {
            chunks.push(ExecutionChunk::with_content("message", content));
        }
    }
}
