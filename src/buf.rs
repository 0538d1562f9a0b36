//! Buffered pull-style input.
//!
//! [`Buffer`] maintains a fill-on-demand window over an `io::Read` source.
//! The binary body reader works on exact byte counts via [`Buffer::with_bytes`];
//! the header parser and the ascii body reader use the text helpers
//! ([`Buffer::take_line`], [`Buffer::take_word`], [`Buffer::skip_whitespace`]).

use std::cmp::{max, min};
use std::fmt;
use std::io::{self, Read};

use smallvec::SmallVec;

use crate::error::{Error, Result};

/// The initial size of the window in bytes.
const START_BUFFER_SIZE: usize = 8 * 1024;

/// The maximum size the window can grow to.
///
/// Every piece of information pulled from a PLY file at once is small: a
/// header line, a numeric token, or at most eight bytes of binary scalar.
/// An input that forces the window past this bound is malformed (e.g. a
/// multi-megabyte "line" without terminator) and is rejected.
const MAX_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Whether the header lines of a file are LF- or CRLF-terminated.
///
/// The very first line decides: `ply\r\n` makes the whole header CRLF,
/// `ply\n` makes it LF. A line terminated the other way is rejected with
/// [`Error::BadLineTerminator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
}

/// A whitespace-delimited token. Sized so ordinary numeric literals stay
/// inline.
pub type Word = SmallVec<[u8; 24]>;

fn is_whitespace(b: u8) -> bool {
    // The C locale whitespace set, which is what PLY bodies are written in.
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0b' | b'\x0c')
}

pub struct Buffer<R: Read> {
    reader: R,

    buf: Vec<u8>,

    /// First byte in `buf` holding real data. Invariants:
    /// `start <= end <= buf.len()`, and `start == 0` whenever `start == end`.
    start: usize,

    /// One past the last byte of real data.
    end: usize,
}

impl<R: Read> fmt::Debug for Buffer<R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Buffer {{ buffered: {}, .. }}", self.len())
    }
}

impl<R: Read> Buffer<R> {
    pub fn new(reader: R) -> Result<Self> {
        let mut out = Self {
            reader,
            buf: vec![0; START_BUFFER_SIZE],
            start: 0,
            end: 0,
        };

        // Read once to prefill the window.
        out.fill_once()?;

        Ok(out)
    }

    /// Number of bytes currently buffered.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    fn cap(&self) -> usize {
        self.buf.len()
    }

    /// The buffered bytes.
    pub fn raw_buf(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    /// Reads from the source once, appending to the back of the window.
    fn fill_once(&mut self) -> io::Result<usize> {
        let n = self.reader.read(&mut self.buf[self.end..])?;
        self.end += n;
        Ok(n)
    }

    /// Makes sure there is space for at least `additional` more bytes behind
    /// `end`, moving buffered data to the front or growing the window.
    fn make_room(&mut self, additional: usize) -> Result<()> {
        let space_after = self.cap() - self.end;
        if space_after >= additional {
            return Ok(());
        }

        // Move data to the front when that alone makes enough room and the
        // move is cheap (less than half a window of live data). Otherwise
        // grow, which moves the data to the front as a side effect.
        if self.start + space_after >= additional && self.len() < self.cap() / 2 {
            self.buf.copy_within(self.start..self.end, 0);
        } else {
            if self.cap() >= MAX_BUFFER_SIZE {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "parse window exceeded maximum size",
                )));
            }
            let new_len = min(
                max(self.len() + additional, self.cap() * 2),
                MAX_BUFFER_SIZE,
            );
            let mut new = Vec::with_capacity(new_len);
            new.extend_from_slice(self.raw_buf());
            new.resize(new_len, 0);
            self.buf = new;
        }

        self.end -= self.start;
        self.start = 0;
        Ok(())
    }

    /// Reads until `additional` new bytes are buffered or the source is
    /// exhausted. Returns how many bytes were actually read.
    fn fill_by(&mut self, additional: usize) -> Result<usize> {
        self.make_room(additional)?;

        let mut bytes_read = 0;
        while bytes_read < additional {
            match self.reader.read(&mut self.buf[self.end + bytes_read..]) {
                Ok(0) => break,
                Ok(n) => bytes_read += n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.end += bytes_read;
        Ok(bytes_read)
    }

    /// Makes sure at least `num_bytes` bytes are buffered. Fails with
    /// [`Error::UnexpectedEof`] if the source cannot provide them.
    pub fn prepare(&mut self, num_bytes: usize) -> Result<()> {
        if self.len() < num_bytes {
            let missing = num_bytes - self.len();
            if self.fill_by(missing)? < missing {
                return Err(Error::UnexpectedEof);
            }
        }
        Ok(())
    }

    /// Drops `num_bytes` buffered bytes from the front of the window.
    pub fn consume(&mut self, num_bytes: usize) {
        assert!(self.start + num_bytes <= self.end);

        self.start += num_bytes;
        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }

    /// Returns whether the source is exhausted and nothing is buffered.
    pub fn is_eof(&mut self) -> Result<bool> {
        if self.len() == 0 {
            self.make_room(1)?;
            return Ok(self.fill_once()? == 0);
        }
        Ok(false)
    }

    /// The next byte, without consuming it. `None` at the end of input.
    pub fn peek(&mut self) -> Result<Option<u8>> {
        if self.is_eof()? {
            return Ok(None);
        }
        Ok(Some(self.raw_buf()[0]))
    }

    /// Prepares exactly `num_bytes`, passes them to `func` and consumes them.
    pub fn with_bytes<F, T>(&mut self, num_bytes: usize, func: F) -> Result<T>
    where
        F: FnOnce(&[u8]) -> Result<T>,
    {
        self.prepare(num_bytes)?;
        let out = func(&self.raw_buf()[..num_bytes])?;
        self.consume(num_bytes);
        Ok(out)
    }

    /// Skips any run of whitespace, including line terminators. Reaching the
    /// end of input while skipping is not an error.
    pub fn skip_whitespace(&mut self) -> Result<()> {
        loop {
            if self.is_eof()? {
                return Ok(());
            }
            match self.raw_buf().iter().position(|&b| !is_whitespace(b)) {
                Some(0) => return Ok(()),
                Some(n) => {
                    self.consume(n);
                    return Ok(());
                }
                None => {
                    let n = self.len();
                    self.consume(n);
                }
            }
        }
    }

    /// Skips whitespace, then takes the maximal run of non-whitespace bytes.
    /// Fails with [`Error::UnexpectedEof`] if the input ends before any
    /// token byte is seen.
    pub fn take_word(&mut self) -> Result<Word> {
        self.skip_whitespace()?;

        let mut word = Word::new();
        loop {
            if self.is_eof()? {
                break;
            }
            let data = self.raw_buf();
            match data.iter().position(|&b| is_whitespace(b)) {
                Some(n) => {
                    word.extend_from_slice(&data[..n]);
                    self.consume(n);
                    break;
                }
                None => {
                    word.extend_from_slice(data);
                    let n = data.len();
                    self.consume(n);
                }
            }
        }

        if word.is_empty() {
            return Err(Error::UnexpectedEof);
        }
        Ok(word)
    }

    /// Finds the next occurrence of `byte` in the window, filling from the
    /// source as needed. Returns its position relative to the window start.
    fn find_in_window(&mut self, byte: u8) -> Result<usize> {
        let mut searched = 0;
        loop {
            if let Some(pos) = self.raw_buf()[searched..].iter().position(|&b| b == byte) {
                return Ok(searched + pos);
            }
            searched = self.len();
            if self.fill_by(1)? == 0 {
                return Err(Error::UnexpectedEof);
            }
        }
    }

    /// Takes one line: passes the content (excluding the terminator) to
    /// `func` and consumes content plus terminator. The terminator must
    /// match `eol`, otherwise [`Error::BadLineTerminator`] is returned.
    pub fn take_line<F, T>(&mut self, eol: LineEnding, func: F) -> Result<T>
    where
        F: FnOnce(&[u8]) -> Result<T>,
    {
        let nl = self.find_in_window(b'\n')?;
        let content_len = match eol {
            LineEnding::CrLf => {
                if nl == 0 || self.raw_buf()[nl - 1] != b'\r' {
                    return Err(Error::BadLineTerminator);
                }
                nl - 1
            }
            LineEnding::Lf => {
                if nl > 0 && self.raw_buf()[nl - 1] == b'\r' {
                    return Err(Error::BadLineTerminator);
                }
                nl
            }
        };

        let out = func(&self.raw_buf()[..content_len])?;
        self.consume(nl + 1);
        Ok(out)
    }
}
