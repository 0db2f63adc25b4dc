#![no_main]
//! Feeds the same input whole and in seeded byte chunks and checks that the
//! parser reports the same matches and the same outcome both ways.

use std::{
    cell::RefCell,
    sync::{Arc, Mutex},
};

use arbitrary::{Arbitrary, Unstructured};
use jsonrelay::{ParserError, ParserOptions, PathMatcher, StreamingParser, Value, display_path};
use libfuzzer_sys::{fuzz_mutator, fuzz_target, fuzzer_mutate};
use rand::{Rng, RngCore, SeedableRng, rngs::SmallRng};

const HEADER: usize = 5;

thread_local! {
    static RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_os_rng());
}

const PATTERNS: [&str; 4] = ["", "[*]", "a", "$.b[0]"];

fn with_rng<R>(f: impl FnOnce(&mut SmallRng) -> R) -> R {
    RNG.with(|cell| f(&mut cell.borrow_mut()))
}

/// Mostly-valid JSON: a random header followed by a serialized arbitrary
/// document, so the fuzzer spends its time past the first byte.
fn mutator(data: &mut [u8], size: usize, max_size: usize, seed: u32) -> usize {
    if size >= HEADER && !seed.is_multiple_of(8) {
        return fuzzer_mutate(data, size, max_size);
    }
    if max_size < HEADER {
        return fuzzer_mutate(data, size, max_size);
    }
    data[0] = with_rng(|rng| rng.next_u32() as u8 & 0x07);
    data[1..HEADER].copy_from_slice(&with_rng(|rng| rng.next_u32().to_le_bytes()));

    let budget = max_size - HEADER;
    let raw: Vec<u8> = with_rng(|rng| {
        let n = rng.random_range(0..=budget.clamp(1, 512));
        (0..n).map(|_| rng.random::<u8>()).collect()
    });
    let Ok(doc) = ArbitraryJson::arbitrary(&mut Unstructured::new(&raw)) else {
        return fuzzer_mutate(data, size, max_size);
    };
    let Ok(text) = serde_json::to_vec(&doc.0) else {
        return fuzzer_mutate(data, size, max_size);
    };
    let len = text.len().min(budget);
    data[HEADER..HEADER + len].copy_from_slice(&text[..len]);
    HEADER + len
}

fuzz_mutator!(|data: &mut [u8], size: usize, max_size: usize, seed: u32| {
    mutator(data, size, max_size, seed)
});

struct ArbitraryJson(serde_json::Value);

impl<'a> Arbitrary<'a> for ArbitraryJson {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        use serde_json::Value as J;
        let value = match u.choose_index(16)? {
            0 => J::Null,
            1 => J::Bool(u.arbitrary()?),
            2 | 3 => {
                let n: f64 = u.arbitrary()?;
                J::Number(serde_json::Number::from_f64(n).ok_or(arbitrary::Error::IncorrectFormat)?)
            }
            4..=7 => J::String(u.arbitrary()?),
            8..=11 => {
                let items: Vec<ArbitraryJson> = u.arbitrary()?;
                J::Array(items.into_iter().map(|v| v.0).collect())
            }
            _ => {
                let entries: Vec<(String, ArbitraryJson)> = u.arbitrary()?;
                J::Object(entries.into_iter().map(|(k, v)| (k, v.0)).collect())
            }
        };
        Ok(Self(value))
    }
}

type Outcome = (Vec<String>, Option<Value>, Result<(), ParserError>);

fn run(chunks: &[&[u8]], options: ParserOptions) -> Outcome {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut matcher = PathMatcher::new();
    for pattern in PATTERNS {
        let sink = Arc::clone(&log);
        matcher
            .on(pattern, move |value, path| {
                sink.lock()
                    .unwrap()
                    .push(format!("{pattern} {} {value}", display_path(path)));
            })
            .unwrap();
    }
    let mut parser = StreamingParser::new(matcher, options);
    let mut result = Ok(());
    for chunk in chunks {
        result = parser.write_bytes(chunk);
        if result.is_err() {
            break;
        }
    }
    if result.is_ok() {
        result = parser.end();
    }
    let events = log.lock().unwrap().clone();
    (events, parser.root().cloned(), result)
}

/// Splits `bytes` at seeded offsets; chunk boundaries may fall inside a
/// UTF-8 sequence on purpose.
fn split(bytes: &[u8], seed: u64) -> Vec<&[u8]> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut chunks = Vec::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        let size = rng.random_range(1..=rest.len().min(16));
        let (head, tail) = rest.split_at(size);
        chunks.push(head);
        rest = tail;
    }
    chunks
}

fn check(data: &[u8]) {
    if data.len() < HEADER {
        return;
    }
    let flags = data[0];
    let seed = u64::from(u32::from_le_bytes([data[1], data[2], data[3], data[4]]));
    let input = &data[HEADER..];

    let options = ParserOptions {
        realtime: flags & 1 != 0,
        emit_completed_containers: flags & 2 != 0,
        allow_unicode_whitespace: flags & 4 != 0,
        panic_on_error: false,
    };

    let whole = run(&[input], options);
    let chunked = run(&split(input, seed), options);
    assert_eq!(whole, chunked, "seed {seed}");
}

fuzz_target!(|data: &[u8]| check(data));
