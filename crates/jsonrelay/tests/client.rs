#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use common::{
    Recorder, Script, ScriptedTransport, advance, chunk, done, multiplexer, record_errors,
    recorder, settle,
};
use jsonrelay::{
    ConnectHandlers, JsonStreamClient, Multiplexer, ParserOptions, PatternError, SessionConfig,
    SessionKey, StreamError, SyntaxError, display_path,
    stream::{StreamRequest, TransportError},
};

fn request() -> StreamRequest {
    StreamRequest::post("https://example.test/generate", serde_json::json!({"topic": "rust"}))
}

fn client_logging(mux: &Multiplexer, patterns: &[&str]) -> (JsonStreamClient, Recorder<String>) {
    let log = recorder();
    let mut client = JsonStreamClient::new(mux.clone(), "doc", ParserOptions::default());
    for pattern in patterns {
        let sink = Arc::clone(&log);
        client
            .on(pattern, move |value, path| {
                sink.lock()
                    .unwrap()
                    .push(format!("{} {value}", display_path(path)));
            })
            .unwrap();
    }
    (client, log)
}

fn counting_close(count: &Recorder<()>) -> ConnectHandlers {
    let sink = Arc::clone(count);
    ConnectHandlers::new().on_close(move || sink.lock().unwrap().push(()))
}

#[tokio::test(start_paused = true)]
async fn chunked_document_dispatches_in_order() {
    let transport = ScriptedTransport::new(
        [Script::Hold(vec![
            chunk(r#"{"title":"ab"#),
            chunk(r#"c","keyPoints":["p1","#),
            chunk(r#""p2"]}"#),
            done(),
        ])],
        Script::Hold(Vec::new()),
    );
    let mux = multiplexer(&transport, SessionConfig::default());
    let (mut client, log) = client_logging(&mux, &["title", "keyPoints[*]"]);
    let closes = recorder();
    let frames = recorder::<String>();

    let sink = Arc::clone(&frames);
    client
        .connect(
            request(),
            counting_close(&closes).on_frame(move |event| {
                sink.lock().unwrap().push(event.kind().to_string());
            }),
        )
        .unwrap();
    settle().await;

    assert_eq!(
        *log.lock().unwrap(),
        [
            r#"$.title "abc""#,
            r#"$.keyPoints[0] "p1""#,
            r#"$.keyPoints[1] "p2""#,
        ]
    );
    assert_eq!(closes.lock().unwrap().len(), 1);
    assert_eq!(frames.lock().unwrap().len(), 4);
    assert_eq!(transport.requests()[0].params, Some(serde_json::json!({"topic": "rust"})));
}

#[tokio::test(start_paused = true)]
async fn parse_error_is_reported_once_per_document() {
    let transport = ScriptedTransport::new(
        [Script::Hold(vec![
            chunk(r#"{"a":1"#),
            chunk("x}"),
            chunk("still not json"),
            done(),
        ])],
        Script::Hold(Vec::new()),
    );
    let mux = multiplexer(&transport, SessionConfig::default());
    let (mut client, log) = client_logging(&mux, &["a"]);
    let errors = recorder();
    let closes = recorder();

    client
        .connect(
            request(),
            counting_close(&closes).on_error(record_errors(&errors)),
        )
        .unwrap();
    settle().await;

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(
        matches!(&errors[0], StreamError::Parse(err) if err.column == 7),
        "{errors:?}"
    );
    assert_eq!(*log.lock().unwrap(), ["$.a 1"]);
    assert_eq!(closes.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn every_open_starts_a_fresh_parser() {
    let transport = ScriptedTransport::new(
        [
            Script::Frames(vec![
                Ok(chunk(r#"{"t":"par"#)),
                Err(TransportError::Stream("cut".into())),
            ]),
            Script::Hold(vec![chunk(r#"{"t":"full"}"#), done()]),
        ],
        Script::Hold(Vec::new()),
    );
    let mux = multiplexer(&transport, SessionConfig::default());
    let (mut client, log) = client_logging(&mux, &["t"]);
    let errors = recorder();

    client
        .connect(request(), ConnectHandlers::new().on_error(record_errors(&errors)))
        .unwrap();
    advance(1_500).await;

    assert_eq!(transport.opens(), 2);
    assert_eq!(*log.lock().unwrap(), [r#"$.t "full""#]);
    assert_eq!(
        *errors.lock().unwrap(),
        [StreamError::Transport(TransportError::Stream("cut".into()))]
    );
}

#[tokio::test(start_paused = true)]
async fn chunk_after_done_starts_a_new_document() {
    let transport = ScriptedTransport::new(
        [Script::Hold(vec![chunk("1"), done(), chunk("2"), done()])],
        Script::Hold(Vec::new()),
    );
    let mux = multiplexer(&transport, SessionConfig::default());
    let (mut client, log) = client_logging(&mux, &[""]);
    let closes = recorder();

    client.connect(request(), counting_close(&closes)).unwrap();
    settle().await;

    assert_eq!(*log.lock().unwrap(), ["$ 1", "$ 2"]);
    assert_eq!(closes.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn stream_end_finishes_the_document() {
    let transport = ScriptedTransport::new(
        [Script::Frames(vec![Ok(chunk("[1,2]"))])],
        Script::Hold(Vec::new()),
    );
    let mux = multiplexer(&transport, SessionConfig::default());
    let (mut client, log) = client_logging(&mux, &["[*]"]);
    let closes = recorder();
    let errors = recorder();

    client
        .connect(
            request(),
            counting_close(&closes).on_error(record_errors(&errors)),
        )
        .unwrap();
    settle().await;

    assert_eq!(*log.lock().unwrap(), ["$[0] 1", "$[1] 2"]);
    assert_eq!(closes.lock().unwrap().len(), 1);
    assert!(errors.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn truncated_document_reports_end_of_input() {
    let transport = ScriptedTransport::new(
        [Script::Frames(vec![Ok(chunk("[1,"))])],
        Script::Hold(Vec::new()),
    );
    let mux = multiplexer(&transport, SessionConfig::default());
    let (mut client, _) = client_logging(&mux, &[]);
    let errors = recorder();

    client
        .connect(request(), ConnectHandlers::new().on_error(record_errors(&errors)))
        .unwrap();
    settle().await;

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        StreamError::Parse(err) if err.source == SyntaxError::UnexpectedEndOfInput
    ));
}

#[tokio::test(start_paused = true)]
async fn clients_on_one_key_share_the_stream() {
    let transport = ScriptedTransport::new(
        [Script::Hold(vec![chunk(r#"{"n":5}"#), done()])],
        Script::Hold(Vec::new()),
    );
    let mux = multiplexer(&transport, SessionConfig::default());
    let (mut first, first_log) = client_logging(&mux, &["n"]);
    let (mut second, second_log) = client_logging(&mux, &["$.n"]);

    first.connect(request(), ConnectHandlers::new()).unwrap();
    second.connect(request(), ConnectHandlers::new()).unwrap();
    settle().await;

    assert_eq!(transport.opens(), 1);
    assert_eq!(*first_log.lock().unwrap(), ["$.n 5"]);
    assert_eq!(*second_log.lock().unwrap(), ["$.n 5"]);

    drop(first);
    assert!(mux.session(&SessionKey::from("doc")).is_some());
    second.disconnect().unwrap();
    settle().await;
    assert!(mux.is_empty());
    assert_eq!(transport.drops(), 1);
}

#[tokio::test(start_paused = true)]
async fn connect_twice_is_rejected() {
    let transport = ScriptedTransport::holding();
    let mux = multiplexer(&transport, SessionConfig::default());
    let (mut client, _) = client_logging(&mux, &[]);

    client.connect(request(), ConnectHandlers::new()).unwrap();
    assert_eq!(
        client.connect(request(), ConnectHandlers::new()),
        Err(StreamError::AlreadyConnected)
    );
    assert!(client.is_connected());

    client.disconnect().unwrap();
    client.disconnect().unwrap();
    assert!(!client.is_connected());
    client.connect(request(), ConnectHandlers::new()).unwrap();
}

#[test]
fn invalid_pattern_is_rejected_synchronously() {
    let mux = Multiplexer::new(ScriptedTransport::holding());
    let mut client = JsonStreamClient::new(mux, "doc", ParserOptions::default());
    let err = client.on("items[x]", |_, _| {}).unwrap_err();
    assert!(matches!(err, PatternError::InvalidPatternSyntax { .. }));
}

#[test]
fn connect_requires_a_runtime() {
    let mux = Multiplexer::new(ScriptedTransport::holding());
    let mut client = JsonStreamClient::new(mux, "doc", ParserOptions::default());
    assert_eq!(
        client.connect(request(), ConnectHandlers::new()),
        Err(StreamError::NoRuntime)
    );
    assert!(!client.is_connected());
}
