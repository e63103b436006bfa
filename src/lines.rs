//! Byte-oriented line reading shared by the cache builder and the patcher.
//!
//! Files are not required to be UTF-8. Lines are read as raw bytes so that
//! undecodable content is neither an error nor altered when copied.

use std::borrow::Cow;
use std::io::{self, BufRead};

/// Read the next line into `buf` without its `\n` or `\r\n` terminator.
/// Returns `false` at end of input.
///
/// # Errors
///
/// Returns the underlying read error.
pub fn next_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<bool> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(false);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    return Ok(true);
}

/// Text of a raw line, with invalid UTF-8 replaced by U+FFFD.
pub fn text(line: &[u8]) -> Cow<'_, str> {
    return String::from_utf8_lossy(line);
}
