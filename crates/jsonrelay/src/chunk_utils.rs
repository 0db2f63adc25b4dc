/// Split `payload` into approximately equal-sized chunks without breaking
/// UTF-8 code points.
///
/// Useful for replaying a recorded document into a [`StreamingParser`] the
/// way a network stream would deliver it.
///
/// [`StreamingParser`]: crate::StreamingParser
///
/// # Panics
///
/// Panics if `parts` is zero.
#[must_use]
pub fn produce_chunks(payload: &str, parts: usize) -> Vec<&str> {
    assert!(parts > 0, "parts must be non-zero");
    let len = payload.len();
    let chunk_size = len.div_ceil(parts).max(1);
    let mut chunks = Vec::with_capacity(parts);
    let mut start = 0;
    while start < len {
        let mut end = (start + chunk_size).min(len);
        while end < len && !payload.is_char_boundary(end) {
            end += 1;
        }
        chunks.push(&payload[start..end]);
        start = end;
    }
    chunks
}

/// Return a sequence of prefixes converging to `payload`.
///
/// # Panics
///
/// Panics if `parts` is zero.
#[must_use]
pub fn produce_prefixes(payload: &str, parts: usize) -> Vec<&str> {
    let mut end = 0;
    produce_chunks(payload, parts)
        .into_iter()
        .map(|chunk| {
            end += chunk.len();
            &payload[..end]
        })
        .collect()
}
