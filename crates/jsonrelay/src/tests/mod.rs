mod chunk_helpers;

use std::sync::{Arc, Mutex};

use crate::{Map, ParserOptions, Path, PathItem, PathMatcher, StreamingParser, Value};

/// Every `(path, value)` the parser reported, in order.
pub(crate) type Transcript = Arc<Mutex<Vec<(Path, Value)>>>;

/// A parser with a single catch-all registration feeding `transcript`.
pub(crate) fn recording_parser(options: ParserOptions) -> (StreamingParser, Transcript) {
    let transcript = Transcript::default();
    let sink = Arc::clone(&transcript);
    let mut matcher = PathMatcher::new();
    matcher
        .on("", move |value, path| {
            sink.lock().unwrap().push((path.to_vec(), value.clone()));
        })
        .unwrap();
    (StreamingParser::new(matcher, options), transcript)
}

/// Rebuilds a document from commit events. Containers arrive empty on open
/// and are filled by the primitives that follow.
pub(crate) fn reconstruct(events: &[(Path, Value)]) -> Value {
    let mut root = Value::Null;
    for (path, value) in events {
        insert_at_path(&mut root, path, value.clone());
    }
    root
}

fn insert_at_path(target: &mut Value, path: &[PathItem], val: Value) {
    let Some((last, parents)) = path.split_last() else {
        *target = val;
        return;
    };

    let mut current = target;
    for comp in parents {
        current = match (comp, current) {
            (PathItem::Key(k), Value::Object(map)) => map.entry(k.to_string()).or_default(),
            (PathItem::Index(i), Value::Array(vec)) => {
                if *i >= vec.len() {
                    vec.resize(i + 1, Value::Null);
                }
                &mut vec[*i]
            }
            (comp, other) => panic!("cannot descend into {other} with {comp}"),
        };
    }

    match (last, current) {
        (PathItem::Key(k), Value::Object(map)) => {
            map.insert(k.to_string(), val);
        }
        (PathItem::Index(i), Value::Array(vec)) => {
            if *i >= vec.len() {
                vec.resize(i + 1, Value::Null);
            }
            vec[*i] = val;
        }
        (last, other) => panic!("cannot insert into {other} at {last}"),
    }
}

#[test]
fn reconstruct_from_open_events() {
    let mut inner = Map::new();
    inner.insert("b".into(), Value::Boolean(true));
    let events = vec![
        (crate::path![], Value::Object(Map::new())),
        (crate::path!["a"], Value::Array(Vec::new())),
        (crate::path!["a", 0], Value::Object(Map::new())),
        (crate::path!["a", 0, "b"], Value::Boolean(true)),
    ];
    let mut expected = Map::new();
    expected.insert("a".into(), Value::Array(vec![Value::Object(inner)]));
    assert_eq!(reconstruct(&events), Value::Object(expected));
}
