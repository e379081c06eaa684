use rag_core::Passage;

/// Build the short-answer prompt: instruction, retrieved context, question.
pub fn build_short_answer_prompt(question: &str, passages: &[Passage]) -> String {
    let mut prompt = String::new();

    prompt.push_str("Answer questions with short answers using just a few sentences.\n\n");

    if passages.is_empty() {
        prompt.push_str("Context: (no relevant passages found)\n\n");
    } else {
        prompt.push_str("Context (may contain relevant facts):\n");
        for (i, passage) in passages.iter().enumerate() {
            prompt.push_str(&format!("[{}] {}\n", i + 1, passage.long_text));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Question: {}\n", question));
    prompt.push_str("Answer:");

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(text: &str, index: usize) -> Passage {
        Passage {
            long_text: text.to_string(),
            index,
            score: None,
        }
    }

    #[test]
    fn test_prompt_contains_context_and_question() {
        let passages = vec![passage("Our assistant runs on Rust.", 0)];
        let prompt = build_short_answer_prompt("What is it built with?", &passages);

        assert!(prompt.contains("[1] Our assistant runs on Rust."));
        assert!(prompt.contains("Question: What is it built with?"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn test_prompt_without_passages() {
        let prompt = build_short_answer_prompt("Anything?", &[]);
        assert!(prompt.contains("no relevant passages found"));
    }

    #[test]
    fn test_passages_keep_retrieval_order() {
        let passages = vec![passage("first", 0), passage("second", 1)];
        let prompt = build_short_answer_prompt("q", &passages);

        let first = prompt.find("[1] first").unwrap();
        let second = prompt.find("[2] second").unwrap();
        assert!(first < second);
    }
}
