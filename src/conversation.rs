//! Conversational retrieval over a built [`VectorIndex`].
//!
//! Each accepted question runs:
//!
//! 1. **Condense**: with prior history, the chat model rephrases the
//!    follow-up into a standalone question used for retrieval.
//! 2. **Retrieve**: embed that question and take the `top_k` nearest chunks.
//! 3. **Answer**: send a system message holding the retrieved chunks, the
//!    (optionally windowed) history, and the original question.
//! 4. **Record**: append the question and the reply to history.
//!
//! Any failure returns before step 4, so history only ever grows by whole
//! exchanges.

use std::sync::Arc;

use serde::Serialize;

use crate::chat::{ChatModel, PromptMessage};
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{DocChatError, Result};
use crate::index::{ScoredChunk, VectorIndex};
use crate::models::{ChatMessage, Role, Usage};

/// Retrieval and prompting knobs for one engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub top_k: usize,
    pub condense_question: bool,
    /// Past exchanges resubmitted per turn; `None` resubmits all of them.
    pub history_window: Option<usize>,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            condense_question: config.chat.condense_question,
            history_window: config.chat.history_window,
        }
    }
}

/// The reply to one question.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    /// The question actually used for retrieval.
    pub standalone_question: String,
    pub sources: Vec<ScoredChunk>,
    pub usage: Usage,
}

pub struct ConversationEngine {
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    credential: String,
    settings: EngineSettings,
    history: Vec<ChatMessage>,
    usage: Usage,
}

impl ConversationEngine {
    pub fn new(
        index: VectorIndex,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        credential: String,
        settings: EngineSettings,
    ) -> Self {
        Self {
            index,
            embedder,
            chat,
            credential,
            settings,
            history: Vec::new(),
            usage: Usage::default(),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn chunk_count(&self) -> usize {
        self.index.len()
    }

    /// Token usage summed over every call this engine has made.
    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub async fn ask(&mut self, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DocChatError::EmptyQuestion);
        }

        let mut turn_usage = Usage::default();
        let prior = self.windowed_history();

        let standalone = if self.settings.condense_question && !prior.is_empty() {
            let prompt = [PromptMessage::user(condense_prompt(prior, question))];
            let completion = self.chat.complete(&self.credential, &prompt).await?;
            if let Some(u) = completion.usage {
                turn_usage.add(&u);
            }
            completion.content.trim().to_string()
        } else {
            question.to_string()
        };

        let query_vec = self
            .embedder
            .embed_query(&standalone)
            .await
            .map_err(DocChatError::Embedding)?;
        let sources = self.index.search(&query_vec, self.settings.top_k);

        let messages = answer_prompt(&sources, prior, question);
        let completion = self.chat.complete(&self.credential, &messages).await?;
        if let Some(u) = completion.usage {
            turn_usage.add(&u);
        }

        self.history.push(ChatMessage::user(question));
        self.history.push(ChatMessage::assistant(completion.content.clone()));
        self.usage.add(&turn_usage);

        tracing::info!(
            model = self.chat.model_name(),
            retrieved = sources.len(),
            prompt_tokens = turn_usage.prompt_tokens,
            completion_tokens = turn_usage.completion_tokens,
            total_tokens = turn_usage.total_tokens,
            session_total_tokens = self.usage.total_tokens,
            "chat turn completed"
        );

        Ok(Answer {
            answer: completion.content,
            standalone_question: standalone,
            sources,
            usage: turn_usage,
        })
    }

    fn windowed_history(&self) -> &[ChatMessage] {
        match self.settings.history_window {
            Some(exchanges) => {
                let keep = (exchanges * 2).min(self.history.len());
                &self.history[self.history.len() - keep..]
            }
            None => &self.history,
        }
    }
}

fn render_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| match m.role {
            Role::User => format!("Human: {}", m.content),
            Role::Assistant => format!("Assistant: {}", m.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn condense_prompt(history: &[ChatMessage], question: &str) -> String {
    format!(
        "Given the following conversation and a follow up question, rephrase the follow up \
         question to be a standalone question, in its original language.\n\n\
         Chat History:\n{}\nFollow Up Input: {}\nStandalone question:",
        render_history(history),
        question
    )
}

fn answer_prompt(sources: &[ScoredChunk], history: &[ChatMessage], question: &str) -> Vec<PromptMessage> {
    let context = sources
        .iter()
        .map(|s| s.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(PromptMessage::system(format!(
        "Use the following pieces of context to answer the user's question. \n\
         If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\
         ----------------\n{}",
        context
    )));
    for m in history {
        messages.push(match m.role {
            Role::User => PromptMessage::user(m.content.clone()),
            Role::Assistant => PromptMessage::assistant(m.content.clone()),
        });
    }
    messages.push(PromptMessage::user(question));
    messages
}
