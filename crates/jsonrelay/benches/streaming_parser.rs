//! Benchmark – `jsonrelay::StreamingParser`
#![allow(missing_docs)]

use std::{hint::black_box, time::Duration};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use jsonrelay::{ParserOptions, PathMatcher, StreamingParser, produce_chunks};

/// A document of `items` objects, each with a long text field, shaped like a
/// streamed list of generated records.
fn make_json_payload(items: usize) -> String {
    let mut s = String::from(r#"{"title":"benchmark","items":["#);
    for i in 0..items {
        if i > 0 {
            s.push(',');
        }
        s.push_str(&format!(
            r#"{{"id":{i},"done":{},"text":"{}"}}"#,
            i % 2 == 0,
            "lorem ipsum dolor sit amet ".repeat(4)
        ));
    }
    s.push_str("]}");
    s
}

/// Feeds `payload` in `parts` chunks and returns the number of callbacks that
/// fired.
fn run_streaming_parser(payload: &str, parts: usize, options: ParserOptions) -> usize {
    let fired = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let mut matcher = PathMatcher::new();
    let counter = std::sync::Arc::clone(&fired);
    matcher
        .on("items[*].text", move |_, _| {
            counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        })
        .expect("pattern compiles");

    let mut parser = StreamingParser::new(matcher, options);
    for chunk in produce_chunks(payload, parts) {
        parser.write(chunk).expect("valid JSON");
    }
    parser.end().expect("complete document");
    fired.load(std::sync::atomic::Ordering::Relaxed)
}

fn bench_streaming_parser(c: &mut Criterion) {
    let payload = make_json_payload(100);

    let mut group = c.benchmark_group("streaming_parser_split");

    for &parts in &[1usize, 100, 1_000] {
        for (name, realtime) in [("settled", false), ("realtime", true)] {
            let options = ParserOptions {
                realtime,
                ..ParserOptions::default()
            };
            group.bench_with_input(BenchmarkId::new(parts.to_string(), name), &options, |b, &o| {
                b.iter(|| {
                    let count = run_streaming_parser(black_box(&payload), parts, o);
                    black_box(count);
                });
            });
        }
    }
    group.finish();
}

fn criterion() -> Criterion {
    let mut c = Criterion::default();
    if cfg!(feature = "bench-fast") {
        c = c
            .warm_up_time(Duration::from_millis(10))
            .measurement_time(Duration::from_millis(100))
            .sample_size(10);
    } else {
        c = c
            .warm_up_time(Duration::from_secs(3))
            .measurement_time(Duration::from_secs(8));
    }
    c
}

criterion_group! { name = benches; config = criterion(); targets = bench_streaming_parser }
criterion_main!(benches);
