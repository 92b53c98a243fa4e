//! Conversation bookkeeping for the orchestrator.
//!
//! A conversation is a bounded run of turns. Each turn may carry messages
//! and tool calls; once the turn limit is hit the conversation is ended and
//! stays ended.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::dialect::Dialect;
use crate::error::ConversationError;

/// One message exchanged in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationMessage {
    /// `user`, `assistant` or `tool`.
    pub role: String,
    /// Message body.
    pub content: Value,
    /// When the message was recorded.
    pub timestamp: DateTime<Utc>,
}

/// One tool invocation made on behalf of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    /// Invoked tool.
    pub tool_name: String,
    /// Arguments as supplied.
    pub arguments: Value,
    /// Whether the call succeeded.
    pub success: bool,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the call finished.
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationState {
    /// Identifier.
    pub conversation_id: String,
    /// Provider dialect the conversation was opened for.
    pub provider: Dialect,
    /// Messages in arrival order.
    pub messages: Vec<ConversationMessage>,
    /// Tool calls in completion order.
    pub tool_call_history: Vec<ToolCallRecord>,
    /// Turn limit.
    pub max_turns: u32,
    /// Turns started so far.
    pub current_turn: u32,
    /// Set once a turn was refused.
    pub ended: bool,
    /// Creation time.
    pub started_at: DateTime<Utc>,
}

impl ConversationState {
    fn new(conversation_id: String, provider: Dialect, max_turns: u32) -> Self {
        Self {
            conversation_id,
            provider,
            messages: Vec::new(),
            tool_call_history: Vec::new(),
            max_turns,
            current_turn: 0,
            ended: false,
            started_at: Utc::now(),
        }
    }

    fn ended_error(&self) -> ConversationError {
        ConversationError::Ended {
            id: self.conversation_id.clone(),
            max_turns: self.max_turns,
        }
    }

    /// One line per recorded call.
    #[must_use]
    pub fn history_summary(&self) -> String {
        if self.tool_call_history.is_empty() {
            return "No tool calls made yet.".to_string();
        }

        let mut lines = vec![format!(
            "Tool call history ({} calls):",
            self.tool_call_history.len()
        )];
        for (i, call) in self.tool_call_history.iter().enumerate() {
            let outcome = if call.success { "success" } else { "failed" };
            lines.push(format!("{}. {}() - {outcome}", i + 1, call.tool_name));
        }
        lines.join("\n")
    }
}

/// Call counts aggregated across live conversations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallTally {
    /// Live conversations.
    pub conversations: usize,
    /// Calls recorded.
    pub total: usize,
    /// Calls that succeeded.
    pub successful: usize,
    /// Calls per tool name.
    pub per_tool: BTreeMap<String, usize>,
}

/// Live conversations, bounded in number.
#[derive(Debug)]
pub struct ConversationStore {
    max_conversations: usize,
    max_turns: u32,
    conversations: Mutex<IndexMap<String, ConversationState>>,
}

impl ConversationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(max_conversations: usize, max_turns: u32) -> Self {
        Self {
            max_conversations,
            max_turns,
            conversations: Mutex::new(IndexMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexMap<String, ConversationState>> {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a conversation, replacing any existing one with the same id.
    /// Returns its identifier.
    pub fn create(&self, provider: Dialect, id: Option<&str>) -> String {
        let id = id.map_or_else(|| format!("conv_{}", Uuid::new_v4().simple()), str::to_string);
        let mut conversations = self.lock();
        conversations.shift_remove(&id);
        conversations.insert(
            id.clone(),
            ConversationState::new(id.clone(), provider, self.max_turns),
        );
        self.evict(&mut conversations, &id);
        tracing::debug!(conversation_id = %id, provider = %provider, "Conversation created");
        id
    }

    /// Drops the least advanced conversations until the store is within
    /// bounds. `keep` is never evicted.
    fn evict(&self, conversations: &mut IndexMap<String, ConversationState>, keep: &str) {
        while conversations.len() > self.max_conversations {
            let victim = conversations
                .values()
                .filter(|c| c.conversation_id != keep)
                .min_by_key(|c| c.current_turn)
                .map(|c| c.conversation_id.clone());
            let Some(victim) = victim else { break };
            conversations.shift_remove(&victim);
            tracing::info!(conversation_id = %victim, "Evicted conversation");
        }
    }

    /// Starts the next turn and returns its number (1-based).
    ///
    /// # Errors
    ///
    /// [`ConversationError::NotFound`] for unknown ids and
    /// [`ConversationError::Ended`] once the turn limit is reached. A refused
    /// turn ends the conversation.
    pub fn begin_turn(&self, id: &str) -> Result<u32, ConversationError> {
        let mut conversations = self.lock();
        let conversation = conversations
            .get_mut(id)
            .ok_or_else(|| ConversationError::NotFound(id.to_string()))?;

        if conversation.ended || conversation.current_turn >= conversation.max_turns {
            if !conversation.ended {
                tracing::info!(conversation_id = %id, "Conversation reached its turn limit");
            }
            conversation.ended = true;
            return Err(conversation.ended_error());
        }

        conversation.current_turn += 1;
        Ok(conversation.current_turn)
    }

    /// Appends a message.
    ///
    /// # Errors
    ///
    /// [`ConversationError::NotFound`] for unknown ids and
    /// [`ConversationError::Ended`] for ended conversations.
    pub fn record_message(
        &self,
        id: &str,
        role: &str,
        content: Value,
    ) -> Result<(), ConversationError> {
        let mut conversations = self.lock();
        let conversation = conversations
            .get_mut(id)
            .ok_or_else(|| ConversationError::NotFound(id.to_string()))?;
        if conversation.ended {
            return Err(conversation.ended_error());
        }
        conversation.messages.push(ConversationMessage {
            role: role.to_string(),
            content,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Makes sure `id` can take a tool call, creating it if unknown.
    ///
    /// # Errors
    ///
    /// [`ConversationError::Ended`] for ended conversations.
    pub fn ensure_open(&self, id: &str) -> Result<(), ConversationError> {
        let mut conversations = self.lock();
        if let Some(conversation) = conversations.get(id) {
            return if conversation.ended {
                Err(conversation.ended_error())
            } else {
                Ok(())
            };
        }
        conversations.insert(
            id.to_string(),
            ConversationState::new(id.to_string(), Dialect::Mcp, self.max_turns),
        );
        self.evict(&mut conversations, id);
        tracing::debug!(conversation_id = %id, "Conversation created on first call");
        Ok(())
    }

    /// Appends a tool call to the conversation's history, creating the
    /// conversation if it was evicted in the meantime.
    pub fn record_call(&self, id: &str, record: ToolCallRecord) {
        let mut conversations = self.lock();
        if !conversations.contains_key(id) {
            conversations.insert(
                id.to_string(),
                ConversationState::new(id.to_string(), Dialect::Mcp, self.max_turns),
            );
            self.evict(&mut conversations, id);
        }
        if let Some(conversation) = conversations.get_mut(id) {
            conversation.tool_call_history.push(record);
        }
    }

    /// Snapshot of one conversation.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ConversationState> {
        self.lock().get(id).cloned()
    }

    /// Summary of a conversation's tool calls.
    ///
    /// # Errors
    ///
    /// [`ConversationError::NotFound`] for unknown ids.
    pub fn history_summary(&self, id: &str) -> Result<String, ConversationError> {
        self.lock()
            .get(id)
            .map(ConversationState::history_summary)
            .ok_or_else(|| ConversationError::NotFound(id.to_string()))
    }

    /// Number of live conversations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when no conversation is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Aggregates call counts across live conversations.
    #[must_use]
    pub fn tally(&self) -> CallTally {
        let conversations = self.lock();
        let mut tally = CallTally {
            conversations: conversations.len(),
            ..CallTally::default()
        };
        for call in conversations.values().flat_map(|c| &c.tool_call_history) {
            tally.total += 1;
            if call.success {
                tally.successful += 1;
            }
            *tally.per_tool.entry(call.tool_name.clone()).or_default() += 1;
        }
        tally
    }
}
