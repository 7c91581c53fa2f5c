//! Prompt assembly.
//!
//! Builds the message list handed to the completion provider: one system
//! instruction (grounded in retrieved passages, or an ungrounded fallback),
//! the conversation history verbatim, then the new user question. Assembly
//! is a pure function of its inputs; identical inputs produce byte-identical
//! output.

use crate::core::config::PromptSettings;
use crate::llm::types::ChatMessage;
use crate::retrieval::RetrievalMatch;

pub struct PromptAssembler {
    settings: PromptSettings,
}

impl PromptAssembler {
    pub fn new(settings: PromptSettings) -> Self {
        Self { settings }
    }

    pub fn assemble(
        &self,
        history: &[ChatMessage],
        matches: &[RetrievalMatch],
        question: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_instruction(matches)));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(question));
        messages
    }

    fn system_instruction(&self, matches: &[RetrievalMatch]) -> String {
        if matches.is_empty() {
            return format!(
                "{}\n\nNo reference passages are available for this question. \
                 If you do not know the answer, say so plainly instead of guessing.",
                self.settings.persona
            );
        }

        let mut instruction = format!(
            "{}\n\nAnswer using only the reference passages below. \
             When you use a passage, mark it with its [n] label. \
             If the passages do not contain the answer, say that you do not know.\n",
            self.settings.persona
        );

        for (i, m) in matches.iter().enumerate() {
            let title = truncate_chars(&m.title, self.settings.title_chars);
            let content = truncate_chars(&m.snippet, self.settings.passage_chars);
            instruction.push_str(&format!("\n[{}] {}: {}", i + 1, title, content));
        }

        instruction
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{ROLE_SYSTEM, ROLE_USER};

    fn assembler() -> PromptAssembler {
        PromptAssembler::new(PromptSettings::default())
    }

    fn a_match(id: &str, title: &str, snippet: &str) -> RetrievalMatch {
        RetrievalMatch {
            document_id: id.to_string(),
            title: title.to_string(),
            snippet: snippet.to_string(),
            similarity: 0.8,
        }
    }

    #[test]
    fn grounded_instruction_lists_passages_and_citation_rule() {
        let matches = vec![
            a_match("d1", "Solar panels", "Panels convert sunlight."),
            a_match("d2", "Inverters", "Inverters convert DC to AC."),
        ];

        let messages = assembler().assemble(&[], &matches, "How do panels work?");

        assert_eq!(messages[0].role, ROLE_SYSTEM);
        assert!(messages[0].content.contains("[1] Solar panels: Panels convert sunlight."));
        assert!(messages[0].content.contains("[2] Inverters:"));
        assert!(messages[0].content.contains("mark it with its [n] label"));
    }

    #[test]
    fn empty_matches_fall_back_to_ungrounded_instruction() {
        let messages = assembler().assemble(&[], &[], "What is the meaning of life?");

        assert!(messages[0].content.contains("No reference passages"));
        assert!(messages[0].content.contains("say so plainly"));
        assert!(!messages[0].content.contains("[1]"));
    }

    #[test]
    fn history_is_verbatim_and_question_comes_last() {
        let history = vec![
            ChatMessage::user("first question"),
            ChatMessage::assistant("first answer"),
        ];

        let messages = assembler().assemble(&history, &[], "second question");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1], history[0]);
        assert_eq!(messages[2], history[1]);
        assert_eq!(messages[3].role, ROLE_USER);
        assert_eq!(messages[3].content, "second question");
    }

    #[test]
    fn assembly_is_deterministic() {
        let history = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        let matches = vec![a_match("d1", "Doc", "Some content.")];

        let first = assembler().assemble(&history, &matches, "again?");
        let second = assembler().assemble(&history, &matches, "again?");

        assert_eq!(first, second);
    }

    #[test]
    fn titles_and_passages_are_individually_capped() {
        let settings = PromptSettings {
            title_chars: 5,
            passage_chars: 10,
            ..PromptSettings::default()
        };
        let assembler = PromptAssembler::new(settings);

        let matches = vec![a_match("d1", "A very long title", "This content is far too long")];
        let messages = assembler.assemble(&[], &matches, "q");

        assert!(messages[0].content.contains("[1] A ver: This conte"));
    }
}
