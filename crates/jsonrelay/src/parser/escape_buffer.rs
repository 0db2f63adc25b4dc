//! Decoding of `\uXXXX` escapes without buffering the digits.
//!
//! [`UnicodeEscapeBuffer`] accumulates exactly four hexadecimal digits into a
//! UTF-16 code unit and [`SurrogatePair`] joins a high and a low surrogate into
//! one `char`.

use super::error::SyntaxError;

/// Accumulates four hex digits into one UTF-16 code unit.
#[derive(Debug, Default)]
pub(crate) struct UnicodeEscapeBuffer {
    acc: u32,
    len: u8,
}

impl UnicodeEscapeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.acc = 0;
        self.len = 0;
    }

    #[inline]
    fn hex_val(c: char) -> Option<u32> {
        c.to_digit(16)
    }

    /// Feeds one digit. Returns `Ok(Some(unit))` on the fourth digit and resets.
    pub fn feed(&mut self, c: char) -> Result<Option<u32>, SyntaxError> {
        let d = Self::hex_val(c).ok_or(SyntaxError::InvalidUnicodeEscapeChar(c))?;
        self.acc = (self.acc << 4) | d;
        self.len += 1;
        if self.len < 4 {
            return Ok(None);
        }
        let unit = self.acc;
        self.reset();
        Ok(Some(unit))
    }
}

/// Combines decoded code units into scalar values.
#[derive(Debug, Default)]
pub(crate) struct SurrogatePair {
    high: Option<u32>,
}

impl SurrogatePair {
    pub fn is_pending(&self) -> bool {
        self.high.is_some()
    }

    /// Accepts one code unit. A high surrogate is held and `Ok(None)` returned;
    /// the following low surrogate completes it.
    pub fn push(&mut self, unit: u32) -> Result<Option<char>, SyntaxError> {
        match (self.high.take(), unit) {
            (None, 0xD800..=0xDBFF) => {
                self.high = Some(unit);
                Ok(None)
            }
            (None, 0xDC00..=0xDFFF) => Err(SyntaxError::InvalidUnicodeEscapeSequence(unit)),
            (None, _) => char::from_u32(unit)
                .map(Some)
                .ok_or(SyntaxError::InvalidUnicodeEscapeSequence(unit)),
            (Some(high), 0xDC00..=0xDFFF) => {
                let code = 0x10000 + ((high - 0xD800) << 10) + (unit - 0xDC00);
                char::from_u32(code)
                    .map(Some)
                    .ok_or(SyntaxError::InvalidUnicodeEscapeSequence(code))
            }
            (Some(high), _) => Err(SyntaxError::InvalidUnicodeEscapeSequence(high)),
        }
    }

    /// Called when something other than `\u` follows a pending high surrogate.
    pub fn interrupt(&mut self) -> Result<(), SyntaxError> {
        match self.high.take() {
            Some(high) => Err(SyntaxError::InvalidUnicodeEscapeSequence(high)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(buf: &mut UnicodeEscapeBuffer, digits: &str) -> Option<u32> {
        let mut out = None;
        for c in digits.chars() {
            out = buf.feed(c).unwrap();
        }
        out
    }

    #[test]
    fn basic_decoding() {
        let mut buf = UnicodeEscapeBuffer::new();
        assert_eq!(buf.feed('0').unwrap(), None);
        assert_eq!(buf.feed('0').unwrap(), None);
        assert_eq!(buf.feed('4').unwrap(), None);
        assert_eq!(buf.feed('1').unwrap(), Some(0x41));
    }

    #[test]
    fn mixed_case_hex() {
        let mut buf = UnicodeEscapeBuffer::new();
        assert_eq!(feed_all(&mut buf, "AbCd"), Some(0xABCD));
    }

    #[test]
    fn invalid_hex_error() {
        let mut buf = UnicodeEscapeBuffer::new();
        assert_eq!(
            buf.feed('G').unwrap_err(),
            SyntaxError::InvalidUnicodeEscapeChar('G')
        );
    }

    #[test]
    fn surrogate_pair_joins() {
        let mut pair = SurrogatePair::default();
        assert_eq!(pair.push(0xD83D).unwrap(), None);
        assert!(pair.is_pending());
        assert_eq!(pair.push(0xDE0A).unwrap(), Some('😊'));
        assert!(!pair.is_pending());
    }

    #[test]
    fn lone_surrogates_rejected() {
        let mut pair = SurrogatePair::default();
        assert!(pair.push(0xDC00).is_err());

        pair.push(0xD800).unwrap();
        assert_eq!(
            pair.push(0x41).unwrap_err(),
            SyntaxError::InvalidUnicodeEscapeSequence(0xD800)
        );

        pair.push(0xD800).unwrap();
        assert!(pair.interrupt().is_err());
        assert!(pair.interrupt().is_ok());
    }
}
