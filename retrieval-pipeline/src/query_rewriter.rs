//! Query Rewriter (C13): resolves anaphora in a follow-up turn ("what about
//! it?", "y eso?") against the preceding conversation so retrieval embeds a
//! self-contained query instead of a dangling pronoun.

use common::domain::conversation::{ConversationRole, Message};

const ANAPHORA_MARKERS: &[&str] = &[
    "it", "that", "this", "they", "those", "them", "he", "she",
    "eso", "esto", "ello", "ella", "él", "aquello", "dicho", "dicha",
];

#[derive(Debug, Clone)]
pub struct RewriteResult {
    pub original_query: String,
    pub rewritten_query: String,
    pub was_rewritten: bool,
    pub reason: Option<String>,
}

fn has_anaphora(query: &str) -> bool {
    query
        .split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .any(|w| ANAPHORA_MARKERS.contains(&w.as_str()))
}

fn last_user_message(history: &[Message]) -> Option<&Message> {
    history.iter().rev().find(|m| m.role == ConversationRole::User)
}

/// No-op when there's no history or the current turn carries no anaphora
/// marker; otherwise folds the last user turn into the query as context.
pub fn rewrite_query(current_query: &str, history: &[Message]) -> RewriteResult {
    if history.is_empty() || !has_anaphora(current_query) {
        return RewriteResult {
            original_query: current_query.to_string(),
            rewritten_query: current_query.to_string(),
            was_rewritten: false,
            reason: None,
        };
    }

    match last_user_message(history) {
        Some(previous) => RewriteResult {
            original_query: current_query.to_string(),
            rewritten_query: format!("{current_query} (contexto previo: {})", previous.content),
            was_rewritten: true,
            reason: Some("anaphora resolved against the last user turn".to_string()),
        },
        None => RewriteResult {
            original_query: current_query.to_string(),
            rewritten_query: current_query.to_string(),
            was_rewritten: false,
            reason: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: ConversationRole, content: &str) -> Message {
        Message {
            role,
            content: content.to_string(),
        }
    }

    #[test]
    fn no_history_is_a_no_op() {
        let result = rewrite_query("what about it?", &[]);
        assert!(!result.was_rewritten);
        assert_eq!(result.rewritten_query, result.original_query);
    }

    #[test]
    fn no_anaphora_is_a_no_op_even_with_history() {
        let history = vec![msg(ConversationRole::User, "how does pgvector indexing work?")];
        let result = rewrite_query("what is the default chunk size?", &history);
        assert!(!result.was_rewritten);
    }

    #[test]
    fn anaphora_pulls_in_the_last_user_turn() {
        let history = vec![
            msg(ConversationRole::User, "how does pgvector indexing work?"),
            msg(ConversationRole::Assistant, "it uses an HNSW index over embeddings."),
        ];
        let result = rewrite_query("can you explain that in more detail?", &history);
        assert!(result.was_rewritten);
        assert!(result.rewritten_query.contains("pgvector indexing"));
        assert!(result.reason.is_some());
    }

    #[test]
    fn anaphora_with_only_assistant_history_is_a_no_op() {
        let history = vec![msg(ConversationRole::Assistant, "here is some unrelated info.")];
        let result = rewrite_query("tell me more about that", &history);
        assert!(!result.was_rewritten);
    }
}
