use np_tags::{
    classify, get_tags, ignored_blocks, scan_tags, split_tag, validate, IgnoreMarker, TagConfig,
    TagKind, TagSyntaxErrorKind,
};

const DAILY_TEMPLATE: &str = r#"## Daily note for <%- date.now("YYYY-MM-DD") %>
<%# TODO list comes from the project note %>
<%- note('Projects/Home') %>
<% const greeting = "Good morning" %>
<%= greeting %>, <%- prompt('name', 'What is your name?') %>
<%- include('footer') -%>
<% :CR: %>
"#;

#[test]
fn scans_a_realistic_template() {
    let tags = get_tags(DAILY_TEMPLATE);
    assert_eq!(tags.len(), 8);

    let config = TagConfig::default();
    let kinds: Vec<TagKind> = tags.iter().map(|t| classify(t, &config)).collect();
    assert_eq!(
        kinds,
        vec![
            TagKind::Module,
            TagKind::Comment,
            TagKind::Note,
            TagKind::Variable,
            TagKind::Output,
            TagKind::Prompt,
            TagKind::Include,
            TagKind::Return,
        ]
    );
}

#[test]
fn spans_point_back_into_source() {
    for span in scan_tags(DAILY_TEMPLATE) {
        assert_eq!(&DAILY_TEMPLATE[span.range()], span.text);
        assert!(split_tag(span.text).is_some());
    }
}

#[test]
fn realistic_template_is_valid() {
    assert!(validate(DAILY_TEMPLATE).is_ok());
}

#[test]
fn broken_template_reports_context() {
    let text = "one\ntwo\nthree <%= oops\nfour\nfive\nsix";
    let err = validate(text).unwrap_err();
    assert_eq!(err.kind, TagSyntaxErrorKind::UnclosedTag);
    assert_eq!(err.line, 3);

    let rendered = err.to_string();
    assert!(rendered.contains("  1 | one") || rendered.contains("1 | one"));
    assert!(rendered.contains("> 3 | three <%= oops"));
    assert!(rendered.contains("5 | five"));
    assert!(!rendered.contains("six"));
}

#[test]
fn ignored_blocks_of_both_kinds() {
    let text = "```js\n// ignore\n<%- keep %>\n```\ntext\n```js:ignore\n<%- drop %>\n```\n";
    let blocks = ignored_blocks(text);
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].ignore_marker(), Some(IgnoreMarker::Comment));
    assert_eq!(blocks[1].ignore_marker(), Some(IgnoreMarker::Fence));
    assert!(get_tags(text).is_empty());
}
