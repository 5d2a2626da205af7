//! In-process provider that replays queued replies
//!
//! Used by the test suites to drive the pipeline deterministically and by
//! `ongoal chat --offline`, where it echoes the user instead of calling a
//! model.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{LLMError, LLMProvider, Message, MessageRole, Result, TextStream};

type StreamScript = Result<Vec<Result<String>>>;

/// What to do once a queue runs dry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WhenEmpty {
    Fail,
    Echo,
}

pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String>>>,
    streams: Mutex<VecDeque<StreamScript>>,
    prompts: Mutex<Vec<String>>,
    histories: Mutex<Vec<Vec<Message>>>,
    available: bool,
    when_empty: WhenEmpty,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    /// Provider that fails every call it has no script for
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            streams: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            histories: Mutex::new(Vec::new()),
            available: true,
            when_empty: WhenEmpty::Fail,
        }
    }

    /// Provider that reports itself unavailable and fails every call
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Offline provider: completions are `{}` and streamed replies echo the
    /// last user message back
    pub fn echo() -> Self {
        Self {
            when_empty: WhenEmpty::Echo,
            ..Self::new()
        }
    }

    /// Queue a completion reply
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.push_reply(reply);
        self
    }

    /// Queue a streamed reply made of the given fragments
    pub fn with_stream<I, S>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_stream(chunks);
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        lock(&self.replies).push_back(Ok(reply.into()));
    }

    pub fn push_failure(&self, error: LLMError) {
        lock(&self.replies).push_back(Err(error));
    }

    pub fn push_stream<I, S>(&self, chunks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let chunks = chunks.into_iter().map(|c| Ok(c.into())).collect();
        lock(&self.streams).push_back(Ok(chunks));
    }

    /// Queue a stream that cannot be opened at all
    pub fn push_stream_failure(&self, error: LLMError) {
        lock(&self.streams).push_back(Err(error));
    }

    /// Queue a stream that yields some fragments and then fails
    pub fn push_broken_stream<I, S>(&self, chunks: I, error: LLMError)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut items: Vec<Result<String>> = chunks.into_iter().map(|c| Ok(c.into())).collect();
        items.push(Err(error));
        lock(&self.streams).push_back(Ok(items));
    }

    /// Every prompt passed to `generate`, in call order
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    /// Every history passed to `generate_stream`, in call order
    pub fn histories(&self) -> Vec<Vec<Message>> {
        lock(&self.histories).clone()
    }

    fn unavailable_error() -> LLMError {
        LLMError::ProviderUnavailable("scripted provider is unavailable".to_string())
    }

    fn exhausted_error() -> LLMError {
        LLMError::ProviderUnavailable("no scripted reply left".to_string())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn echo_reply(messages: &[Message]) -> Vec<Result<String>> {
    let last = messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    let reply = format!("(offline) You said: {}", last);
    reply
        .split_inclusive(' ')
        .map(|word| Ok(word.to_string()))
        .collect()
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn generate(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
        lock(&self.prompts).push(prompt.to_string());

        if !self.available {
            return Err(Self::unavailable_error());
        }

        match lock(&self.replies).pop_front() {
            Some(reply) => reply,
            None if self.when_empty == WhenEmpty::Echo => Ok("{}".to_string()),
            None => Err(Self::exhausted_error()),
        }
    }

    async fn generate_stream(&self, messages: &[Message], _max_tokens: u32) -> Result<TextStream> {
        lock(&self.histories).push(messages.to_vec());

        if !self.available {
            return Err(Self::unavailable_error());
        }

        let script = match lock(&self.streams).pop_front() {
            Some(script) => script?,
            None if self.when_empty == WhenEmpty::Echo => echo_reply(messages),
            None => return Err(Self::exhausted_error()),
        };

        Ok(Box::pin(futures::stream::iter(script)))
    }
}
