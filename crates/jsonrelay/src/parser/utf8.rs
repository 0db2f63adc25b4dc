//! Reassembly of UTF-8 sequences split across byte chunks.

use bstr::decode_utf8;

/// Holds the incomplete tail of the previous chunk.
#[derive(Debug, Default)]
pub(crate) struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    /// Decodes as much of `pending ++ bytes` as is complete, calling `emit` for
    /// every character. Invalid sequences decode to U+FFFD. A trailing prefix
    /// of a valid sequence is kept for the next call.
    pub fn decode<E>(
        &mut self,
        bytes: &[u8],
        mut emit: impl FnMut(char) -> Result<(), E>,
    ) -> Result<(), E> {
        let owned;
        let mut input: &[u8] = if self.pending.is_empty() {
            bytes
        } else {
            self.pending.extend_from_slice(bytes);
            owned = std::mem::take(&mut self.pending);
            &owned
        };

        while !input.is_empty() {
            let (ch, size) = decode_utf8(input);
            match ch {
                Some(c) => emit(c)?,
                None if size == input.len() && is_incomplete_prefix(input) => {
                    self.pending.extend_from_slice(input);
                    return Ok(());
                }
                None => emit(char::REPLACEMENT_CHARACTER)?,
            }
            input = &input[size.max(1)..];
        }
        Ok(())
    }

    /// Flushes a dangling partial sequence as U+FFFD.
    pub fn finish<E>(&mut self, mut emit: impl FnMut(char) -> Result<(), E>) -> Result<(), E> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.pending.clear();
        emit(char::REPLACEMENT_CHARACTER)
    }
}

/// Whether `bytes` is a strict prefix of some valid UTF-8 encoding.
fn is_incomplete_prefix(bytes: &[u8]) -> bool {
    let Some(&lead) = bytes.first() else {
        return false;
    };
    let need = match lead {
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => return false,
    };
    bytes.len() < need && bytes[1..].iter().all(|b| b & 0xC0 == 0x80)
}
