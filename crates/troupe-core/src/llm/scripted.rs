use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{Generation, ResponseGenerator};
use crate::error::{TeamError, TeamResult};

/// One canned outcome for a [`ScriptedGenerator`] call.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Fail(String),
    /// Never resolves. Used to exercise timeouts.
    Hang,
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedReply::Text(text.into())
    }
}

/// Deterministic generator for tests and offline runs.
///
/// Replies are consumed in order; once the queue is empty the fallback is
/// used. Every prompt is recorded.
#[derive(Debug)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<ScriptedReply>>,
    fallback: ScriptedReply,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            fallback: ScriptedReply::Fail("script exhausted".into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with the same text.
    pub fn always(text: impl Into<String>) -> Self {
        Self::new([]).with_fallback(ScriptedReply::Text(text.into()))
    }

    pub fn with_fallback(mut self, fallback: ScriptedReply) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts().pop()
    }
}

#[async_trait]
impl ResponseGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> TeamResult<Generation> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            ScriptedReply::Text(text) => Ok(Generation {
                text,
                provider: "scripted".into(),
                model: "scripted-1".into(),
            }),
            ScriptedReply::Fail(reason) => Err(TeamError::Generation(reason)),
            ScriptedReply::Hang => std::future::pending().await,
        }
    }
}
