//! Deterministic [`LlmClient`] that replays queued responses.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::llm::{ChatRequest, LlmClient, LlmError, StructuredRequest, TextStream};

/// How one scripted `stream_chat` call behaves.
#[derive(Clone, Debug)]
pub enum StreamScript {
    /// Yields each delta and then ends.
    Complete(Vec<String>),
    /// Yields the deltas, then fails with a transport error.
    FailAfter { deltas: Vec<String>, error: String },
    /// The call itself fails before any stream exists.
    StartFailure(String),
}

impl StreamScript {
    pub fn complete<I, T>(deltas: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::Complete(deltas.into_iter().map(Into::into).collect())
    }
}

#[derive(Default)]
pub struct ScriptedLlmClient {
    structured: Mutex<VecDeque<Result<Value, String>>>,
    streams: Mutex<VecDeque<StreamScript>>,
    structured_requests: Mutex<Vec<StructuredRequest>>,
    chat_requests: Mutex<Vec<ChatRequest>>,
    structured_calls: AtomicUsize,
    stream_calls: AtomicUsize,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_structured(&self, value: Value) -> &Self {
        locked(&self.structured).push_back(Ok(value));
        self
    }

    pub fn push_structured_failure(&self, error: impl Into<String>) -> &Self {
        locked(&self.structured).push_back(Err(error.into()));
        self
    }

    pub fn push_stream(&self, script: StreamScript) -> &Self {
        locked(&self.streams).push_back(script);
        self
    }

    pub fn structured_calls(&self) -> usize {
        self.structured_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.structured_calls() + self.stream_calls()
    }

    pub fn structured_requests(&self) -> Vec<StructuredRequest> {
        locked(&self.structured_requests).clone()
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        locked(&self.chat_requests).clone()
    }
}

fn owned_deltas(deltas: Vec<String>) -> impl futures::Stream<Item = Result<String, LlmError>> {
    stream::iter(deltas.into_iter().map(Ok))
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete_structured(&self, request: StructuredRequest) -> Result<Value, LlmError> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        locked(&self.structured_requests).push(request);

        match locked(&self.structured).pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(error)) => Err(LlmError::Transport(error)),
            None => Err(LlmError::Transport("no scripted structured response".to_string())),
        }
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<TextStream, LlmError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        locked(&self.chat_requests).push(request);

        let script = locked(&self.streams).pop_front();
        match script {
            Some(StreamScript::Complete(deltas)) => Ok(owned_deltas(deltas).boxed()),
            Some(StreamScript::FailAfter { deltas, error }) => Ok(owned_deltas(deltas)
                .chain(stream::once(async move { Err(LlmError::Transport(error)) }))
                .boxed()),
            Some(StreamScript::StartFailure(error)) => {
                Err(LlmError::Status { status: 503, body: error })
            }
            None => Err(LlmError::Transport("no scripted stream".to_string())),
        }
    }
}
