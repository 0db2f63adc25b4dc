#![allow(missing_docs)]
#![allow(clippy::needless_raw_string_hashes)]

use std::sync::{Arc, Mutex};

use insta::assert_snapshot;
use jsonrelay::{ParserOptions, PathMatcher, StreamingParser, display_path, produce_chunks};

const STREAM: [&str; 5] = [
    r#"{"moderation":{"decision":"al"#,
    r#"low","reason":null},"request":{"filename":"exa"#,
    r#"mple.rs","options":{"features":["serde","tok"#,
    r#"io"]}},"entities":[{"type":"function","name":"main"},"#,
    r#"{"type":"macro","name":"println"}],"matrix":[["a"]]}"#,
];

fn transcript(chunks: &[&str], patterns: &[&str], options: ParserOptions) -> String {
    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let mut matcher = PathMatcher::new();
    for pattern in patterns {
        let sink = Arc::clone(&lines);
        matcher
            .on(pattern, move |value, path| {
                sink.lock()
                    .unwrap()
                    .push(format!("{} {value}", display_path(path)));
            })
            .unwrap();
    }
    let mut parser = StreamingParser::new(matcher, options);
    for chunk in chunks {
        parser.write(chunk).unwrap();
    }
    parser.end().unwrap();
    let joined = lines.lock().unwrap().join("\n");
    joined
}

#[test]
fn tool_call_fields() {
    let out = transcript(
        &STREAM,
        &["moderation.decision", "features[*]", "name", "$.matrix[0][0]"],
        ParserOptions::default(),
    );
    assert_snapshot!(out, @r#"
    $.moderation.decision "allow"
    $.request.options.features[0] "serde"
    $.request.options.features[1] "tokio"
    $.entities[0].name "main"
    $.entities[1].name "println"
    $.matrix[0][0] "a"
    "#);
}

#[test]
fn realtime_decision_prefixes() {
    let out = transcript(
        &STREAM,
        &["moderation.decision"],
        ParserOptions {
            realtime: true,
            ..ParserOptions::default()
        },
    );
    assert_snapshot!(out, @r#"
    $.moderation.decision "a"
    $.moderation.decision "al"
    $.moderation.decision "all"
    $.moderation.decision "allo"
    $.moderation.decision "allow"
    $.moderation.decision "allow"
    "#);
}

#[test]
fn completed_containers() {
    let out = transcript(
        &STREAM,
        &["entities[*]", "$.matrix"],
        ParserOptions {
            emit_completed_containers: true,
            ..ParserOptions::default()
        },
    );
    assert_snapshot!(out, @r#"
    $.entities[0] {}
    $.entities[0] {"name":"main","type":"function"}
    $.entities[1] {}
    $.entities[1] {"name":"println","type":"macro"}
    $.matrix []
    $.matrix [["a"]]
    "#);
}

#[test]
fn transcript_ignores_chunk_boundaries() {
    let joined = STREAM.concat();
    let patterns = ["decision", "[*]", "name"];
    let expected = transcript(&[&joined], &patterns, ParserOptions::default());
    for parts in 1..=joined.len() {
        let chunks = produce_chunks(&joined, parts);
        assert_eq!(
            transcript(&chunks, &patterns, ParserOptions::default()),
            expected,
            "{parts} parts"
        );
    }
}
