//! Reacts to a tool-call response from an LLM while it is still streaming.
//!
//! The assistant answers with a JSON object whose `moderation` field comes
//! first, so the caller can abort before the expensive part arrives:
//!
//! ```text
//! {
//!   "moderation": { "decision": "allow" | "block", "reason": string | null },
//!   "filename": string,
//!   "code": string,
//!   "tags": [string]
//! }
//! ```
//!
//! The document is fed in small irregular chunks the way chat-completion
//! APIs deliver tokens. With realtime mode on, the `code` callback sees the
//! snippet grow character by character and prints only the new suffix.
//!
//! Run with
//!
//! ```bash
//! cargo run -p jsonrelay --example llm_tool_call
//! ```

#![allow(clippy::needless_raw_string_hashes)]

use std::{
    io::Write,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use jsonrelay::{ParserOptions, PathMatcher, StreamingParser, Value};

fn main() {
    let simulated_stream: [&str; 8] = [
        r#"{"moderation":{"decision":"al"#,
        r#"low","reason":null},"#,
        r#""filename":"main.rs","#,
        r#""code":"fn main() {\n"#,
        r#"    println!(\"hi\");\n"#,
        r#"}\n","tags":["de"#,
        r#"mo","rust"]"#,
        r#"}"#,
    ];

    let blocked = Arc::new(AtomicBool::new(false));
    let mut printed = 0usize;
    let mut matcher = PathMatcher::new();

    let flag = Arc::clone(&blocked);
    matcher
        .on("moderation.decision", move |value, _| {
            if value.as_str().is_some_and(|d| d.starts_with('b')) {
                flag.store(true, Ordering::SeqCst);
            }
        })
        .expect("pattern compiles");
    matcher
        .on("$.code", move |value, _| {
            if let Value::String(code) = value {
                print!("{}", &code[printed.min(code.len())..]);
                let _ = std::io::stdout().flush();
                printed = code.len();
            }
        })
        .expect("pattern compiles");
    matcher
        .on("tags[*]", |value, path| {
            println!("\ntag {} = {value}", path.last().map(ToString::to_string).unwrap_or_default());
        })
        .expect("pattern compiles");

    let mut parser = StreamingParser::new(
        matcher,
        ParserOptions {
            realtime: true,
            ..ParserOptions::default()
        },
    );

    for chunk in simulated_stream {
        if let Err(err) = parser.write(chunk) {
            eprintln!("malformed response: {err}");
            return;
        }
        if blocked.load(Ordering::SeqCst) {
            eprintln!("moderation blocked the content, aborting");
            return;
        }
    }

    match parser.end() {
        Ok(()) => println!("\nresponse complete"),
        Err(err) => eprintln!("stream ended early: {err}"),
    }
}
