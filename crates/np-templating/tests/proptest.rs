//! Property-based tests for the pre-processing stages.

use np_templating::{
    frontmatter, protect_template_literals, restore_template_literals, rewrite::process_code_tag,
    InMemorySource, RenderOptions, Templating, TemplatingConfig,
};
use proptest::prelude::*;
use serde_json::json;

fn code_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            "[a-z]{1,6}",
            Just(" ".to_string()),
            Just("(".to_string()),
            Just(")".to_string()),
            Just("`a ${b} c`".to_string()),
            Just("`plain`".to_string()),
            Just("'s'".to_string()),
            Just(";".to_string()),
        ],
        0..16,
    )
    .prop_map(|parts| parts.concat())
}

fn statement_strategy() -> impl Strategy<Value = String> {
    let head = prop_oneof![
        Just("if (x) {".to_string()),
        Just("} else {".to_string()),
        Just("for (const a of b) {".to_string()),
        Just("while (ready) {".to_string()),
        Just("switch (kind) {".to_string()),
        Just("try {".to_string()),
        Just("} catch (e) {".to_string()),
        Just("}".to_string()),
        Just("return x".to_string()),
        Just("const w = web.weather()".to_string()),
        Just("const w = await web.weather()".to_string()),
        Just("web.quote()".to_string()),
        Just("await fetch('u')".to_string()),
        Just("x = getNote('a')".to_string()),
        Just("const t = ready ? web.verse() : ''".to_string()),
        Just("const s = `q ${web.advice()}`".to_string()),
    ];
    prop::collection::vec(head, 1..5).prop_map(|parts| parts.join("; "))
}

proptest! {
    /// Protecting template literals and restoring them is lossless.
    #[test]
    fn literals_round_trip(code in code_strategy()) {
        let (protected, literals) = protect_template_literals(&code);
        prop_assert_eq!(restore_template_literals(&protected, &literals), code);
    }

    /// `await` never lands in front of a keyword and is never doubled.
    #[test]
    fn rewriter_never_awaits_keywords(statements in statement_strategy()) {
        let config = TemplatingConfig::default();
        let tag = format!("<% {} %>", statements);
        let rewritten = process_code_tag(&tag, &config);

        for keyword in ["if", "else", "for", "while", "switch", "try", "catch", "return", "}"] {
            let awaited = format!("await {}", keyword);
            prop_assert!(!rewritten.contains(&awaited), "{}", rewritten);
        }
        prop_assert!(!rewritten.contains("await await"), "{}", rewritten);
    }

    /// Rewriting an already rewritten tag changes nothing.
    #[test]
    fn rewriter_is_idempotent(statements in statement_strategy()) {
        let config = TemplatingConfig::default();
        let tag = format!("<% {} %>", statements);
        let once = process_code_tag(&tag, &config);
        prop_assert_eq!(process_code_tag(&once, &config), once);
    }

    /// Simple `key: value` frontmatter comes back as written.
    #[test]
    fn frontmatter_attributes_round_trip(
        entries in prop::collection::btree_map("k[a-z]{0,6}", "v[a-z]{0,6}", 1..6),
        body in "[a-z \n]{0,20}",
    ) {
        let block: String = entries
            .iter()
            .map(|(key, value)| format!("{}: {}\n", key, value))
            .collect();
        let text = format!("---\n{}---\n{}", block, body);

        let parsed = frontmatter::parse(&text);
        prop_assert_eq!(parsed.attributes.len(), entries.len());
        for (key, value) in &entries {
            prop_assert_eq!(parsed.attributes[key.as_str()].as_str(), Some(value.as_str()));
        }
        prop_assert_eq!(parsed.body, body);
    }

    /// Text without tags renders unchanged.
    #[test]
    fn plain_text_passes_through(text in "[a-zA-Z0-9 .,!{}#%\n]{0,40}") {
        let templating = Templating::new(InMemorySource::new());
        let out = templating
            .render(&text, &json!({}), &RenderOptions::default())
            .unwrap();
        prop_assert_eq!(out, text);
    }
}
