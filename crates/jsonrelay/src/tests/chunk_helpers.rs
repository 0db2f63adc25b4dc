use crate::{produce_chunks, produce_prefixes};

#[test]
fn produce_helpers_example() {
    let payload = "[\"foo\",\"bar\"]";
    let chunks = produce_chunks(payload, 5);
    assert_eq!(chunks, vec!["[\"f", "oo\"", ",\"b", "ar\"", "]"]);
    let prefixes = produce_prefixes(payload, 5);
    assert_eq!(
        prefixes,
        vec![
            "[\"f",
            "[\"foo\"",
            "[\"foo\",\"b",
            "[\"foo\",\"bar\"",
            "[\"foo\",\"bar\"]",
        ]
    );
}

#[test]
fn produce_helpers_multibyte() {
    let payload = "[\"f😊o\",\"b🚀r\"]";
    let chunks = produce_chunks(payload, 5);
    let mut idx = 0;
    for chunk in &chunks {
        idx += chunk.len();
        assert!(payload.is_char_boundary(idx));
    }
    assert_eq!(chunks.concat(), payload);

    let prefixes = produce_prefixes(payload, 5);
    for prefix in &prefixes {
        assert_eq!(&payload[..prefix.len()], *prefix);
    }
    assert_eq!(prefixes.last(), Some(&payload));
}

#[test]
fn more_parts_than_bytes() {
    assert_eq!(produce_chunks("ab", 10), vec!["a", "b"]);
    assert!(produce_chunks("", 3).is_empty());
}
