//! Property-based tests for the tag scanner.

use np_tags::{get_tags, is_code, scan_tags, split_tag, validate, TagConfig, Tokenizer, Token};
use proptest::prelude::*;

fn template_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            "[a-z ]{0,8}",
            Just("<%".to_string()),
            Just("%>".to_string()),
            Just("<%= x %>".to_string()),
            Just("\n".to_string()),
            Just("```".to_string()),
        ],
        0..20,
    )
    .prop_map(|parts| parts.concat())
}

proptest! {
    /// Tokens cover the input exactly, in order.
    #[test]
    fn tokens_reassemble_input(input in template_strategy()) {
        let rebuilt: String = Tokenizer::new(&input)
            .map(|token| match token {
                Token::Text { text, .. } => text,
                Token::Tag(span) => span.text,
                Token::Unclosed { text, .. } => text,
            })
            .collect();
        prop_assert_eq!(rebuilt, input);
    }

    /// Every scanned tag is delimited and splittable.
    #[test]
    fn scanned_tags_are_well_formed(input in template_strategy()) {
        for span in scan_tags(&input) {
            prop_assert!(span.text.starts_with("<%"));
            prop_assert!(span.text.ends_with("%>"));
            prop_assert!(split_tag(span.text).is_some());
        }
    }

    /// Validation never panics, and valid text never loses a tag.
    #[test]
    fn validation_is_total(input in template_strategy()) {
        if validate(&input).is_ok() && !input.contains("```") {
            let opens = input.matches("<%").count();
            prop_assert_eq!(get_tags(&input).len(), opens);
        }
    }

    /// Whitespace-only tags are never code.
    #[test]
    fn blank_tags_are_not_code(ws in "[ \t\n]{0,6}") {
        let tag = format!("<%{}%>", ws);
        prop_assert!(!is_code(&tag, &TagConfig::default()));
    }
}
