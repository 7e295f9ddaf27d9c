//! Per-session conversation and feedback state.
//!
//! [`SessionState`] is an explicit value owned by the caller and passed
//! into every request that needs it; there is no ambient global history.
//! It holds the append-only turn log, the per-turn feedback map, and the
//! derived context window folded into enhanced prompts. The window is
//! always built from history up to now, never including the in-flight
//! question.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::errors::RagError;

/// Assistant excerpt length inside the context window.
const HISTORY_EXCERPT_CHARS: usize = 200;
/// Excerpt length for feedback samples folded into the prompt.
const FEEDBACK_EXCERPT_CHARS: usize = 100;
/// At most this many sampled excerpts per feedback polarity.
const FEEDBACK_EXCERPTS_PER_POLARITY: usize = 2;

/// Appended to every answer once the session has any negative feedback.
/// Deliberately session-wide and binary; a per-topic variant would need
/// feedback-to-question relevance scoring this system does not attempt.
const DISCLOSURE_SUFFIX: &str =
    "\n\nNote: this response incorporates improvements based on your previous feedback.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Positive,
    Negative,
}

/// At most one per turn. A later rating overwrites the previous one;
/// a detailed comment can be attached separately and survives a rating
/// overwrite. A comment without a rating stays unrated and contributes to
/// neither pattern bucket nor answer post-processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub rating: Option<Rating>,
    pub comment: Option<String>,
    pub given_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStats {
    pub message_count: usize,
    pub question_count: usize,
    pub feedback_count: usize,
    pub positive_feedback: usize,
    /// Share of positive ratings, when any feedback exists.
    pub satisfaction_rate: Option<f64>,
}

pub struct SessionState {
    turns: Vec<ConversationTurn>,
    history_enabled: bool,
    feedback_enabled: bool,
    /// Context window size in turn pairs.
    window_pairs: usize,
}

impl SessionState {
    pub fn new(settings: &Settings) -> Self {
        Self {
            turns: Vec::new(),
            history_enabled: settings.chat_history_enabled,
            feedback_enabled: settings.feedback_enabled,
            window_pairs: settings.max_chat_history_context,
        }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn record_question(&mut self, content: &str) {
        self.turns.push(ConversationTurn {
            role: Role::User,
            content: content.to_string(),
            timestamp: Utc::now(),
            sources: Vec::new(),
            feedback: None,
        });
    }

    pub fn record_answer(&mut self, content: &str, sources: Vec<String>) {
        self.turns.push(ConversationTurn {
            role: Role::Assistant,
            content: content.to_string(),
            timestamp: Utc::now(),
            sources,
            feedback: None,
        });
    }

    /// Rate an assistant turn. Re-rating overwrites the rating but keeps
    /// any comment already attached to the turn.
    pub fn give_feedback(&mut self, turn_index: usize, rating: Rating) -> Result<(), RagError> {
        if !self.feedback_enabled {
            return Err(RagError::BadRequest(
                "feedback is disabled for this session".to_string(),
            ));
        }

        let turn = self.assistant_turn_mut(turn_index)?;
        let comment = turn.feedback.take().and_then(|f| f.comment);
        turn.feedback = Some(Feedback {
            rating: Some(rating),
            comment,
            given_at: Utc::now(),
        });
        Ok(())
    }

    /// Attach a detailed comment to a turn. An unrated turn gets an
    /// unrated feedback entry; a later rating can still be applied.
    pub fn add_feedback_comment(
        &mut self,
        turn_index: usize,
        comment: &str,
    ) -> Result<(), RagError> {
        if !self.feedback_enabled {
            return Err(RagError::BadRequest(
                "feedback is disabled for this session".to_string(),
            ));
        }

        let turn = self.assistant_turn_mut(turn_index)?;
        match &mut turn.feedback {
            Some(feedback) => feedback.comment = Some(comment.to_string()),
            None => {
                turn.feedback = Some(Feedback {
                    rating: None,
                    comment: Some(comment.to_string()),
                    given_at: Utc::now(),
                });
            }
        }
        Ok(())
    }

    fn assistant_turn_mut(&mut self, turn_index: usize) -> Result<&mut ConversationTurn, RagError> {
        match self.turns.get_mut(turn_index) {
            Some(turn) if turn.role == Role::Assistant => Ok(turn),
            Some(_) => Err(RagError::BadRequest(format!(
                "turn {turn_index} is not an assistant turn"
            ))),
            None => Err(RagError::NotFound(format!("no turn at index {turn_index}"))),
        }
    }

    /// Build the conversation context from the most recent turn pairs plus
    /// sampled feedback excerpts. Call this before recording the in-flight
    /// question; it only ever describes history up to now.
    pub fn conversation_context(&self) -> String {
        if !self.history_enabled {
            return String::new();
        }

        let mut parts: Vec<String> = Vec::new();

        let window_start = self.turns.len().saturating_sub(self.window_pairs * 2);
        let recent = &self.turns[window_start..];
        if !recent.is_empty() {
            parts.push("Previous conversation context:".to_string());
            for turn in recent {
                match turn.role {
                    Role::User => parts.push(format!("User: {}", turn.content)),
                    Role::Assistant => parts.push(format!(
                        "Assistant: {}",
                        truncate_chars(&turn.content, HISTORY_EXCERPT_CHARS)
                    )),
                }
            }
        }

        if self.feedback_enabled {
            let mut appreciated: Vec<String> = Vec::new();
            let mut wanted_better: Vec<String> = Vec::new();
            for turn in &self.turns {
                let Some(feedback) = &turn.feedback else {
                    continue;
                };
                let bucket = match feedback.rating {
                    Some(Rating::Positive) => &mut appreciated,
                    Some(Rating::Negative) => &mut wanted_better,
                    None => continue,
                };
                if bucket.len() < FEEDBACK_EXCERPTS_PER_POLARITY {
                    bucket.push(truncate_chars(&turn.content, FEEDBACK_EXCERPT_CHARS));
                }
            }

            if !appreciated.is_empty() || !wanted_better.is_empty() {
                parts.push("\nFeedback insights:".to_string());
                if !appreciated.is_empty() {
                    parts.push(format!(
                        "User appreciated responses like: {}",
                        appreciated.join("; ")
                    ));
                }
                if !wanted_better.is_empty() {
                    parts.push(format!(
                        "User wanted better responses for: {}",
                        wanted_better.join("; ")
                    ));
                }
            }
        }

        parts.join("\n")
    }

    /// Fold the conversation context around the question. With history
    /// disabled (or no history yet) the question passes through unchanged.
    pub fn enhance_prompt(&self, question: &str) -> String {
        let context = self.conversation_context();
        if context.is_empty() {
            return question.to_string();
        }

        format!(
            "\n{context}\n\nCurrent question: {question}\n\n\
             Please provide a response that:\n\
             1. Takes into account the conversation history above\n\
             2. Builds upon previous responses where relevant\n\
             3. Avoids repeating information unless specifically requested\n\
             4. Incorporates lessons learned from previous feedback\n\
             5. Maintains consistency with earlier answers in this conversation\n"
        )
    }

    /// Append the disclosure suffix once the session has any negative
    /// feedback. Session-wide and binary by design of the feedback loop;
    /// see [`DISCLOSURE_SUFFIX`].
    pub fn post_process(&self, answer: &str) -> String {
        if !self.feedback_enabled {
            return answer.to_string();
        }

        let has_negative = self.turns.iter().any(|t| {
            t.feedback
                .as_ref()
                .is_some_and(|f| f.rating == Some(Rating::Negative))
        });
        if has_negative {
            format!("{answer}{DISCLOSURE_SUFFIX}")
        } else {
            answer.to_string()
        }
    }

    pub fn stats(&self) -> ChatStats {
        let question_count = self.turns.iter().filter(|t| t.role == Role::User).count();
        let feedback: Vec<&Feedback> = self
            .turns
            .iter()
            .filter_map(|t| t.feedback.as_ref())
            .collect();
        let positive = feedback
            .iter()
            .filter(|f| f.rating == Some(Rating::Positive))
            .count();

        ChatStats {
            message_count: self.turns.len(),
            question_count,
            feedback_count: feedback.len(),
            positive_feedback: positive,
            satisfaction_rate: if feedback.is_empty() {
                None
            } else {
                Some(positive as f64 / feedback.len() as f64)
            },
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let cut: String = text.chars().take(limit).collect();
        format!("{cut}...")
    }
}
