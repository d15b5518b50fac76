#![deny(elided_lifetimes_in_paths)]
#![deny(unreachable_pub)]

use std::borrow::Cow;
use std::fmt::{self, Display, Formatter, Write};
use std::io;
use std::sync::Arc;

/// Returns the entity replacing `byte` if it is one of the five
/// HTML-significant bytes.
#[inline]
pub fn escape_byte(byte: u8) -> Option<&'static str> {
    match byte {
        b'<' => Some("&lt;"),
        b'>' => Some("&gt;"),
        b'&' => Some("&amp;"),
        b'"' => Some("&quot;"),
        b'\'' => Some("&#39;"),
        _ => None,
    }
}

/// Writes `string` to `fmt`, replacing every HTML-significant byte with
/// its entity. All other bytes pass through unchanged.
pub fn write_escaped<W>(mut fmt: W, string: &str) -> fmt::Result
where
    W: Write,
{
    let mut last = 0;
    for (index, byte) in string.bytes().enumerate() {
        if let Some(escaped) = escape_byte(byte) {
            fmt.write_str(&string[last..index])?;
            fmt.write_str(escaped)?;
            last = index + 1;
        }
    }
    fmt.write_str(&string[last..])
}

/// Escapes `string` for use in HTML text or attribute values.
///
/// Borrows the input when it holds nothing that needs escaping.
pub fn escape(string: &str) -> Cow<'_, str> {
    let first = match string.bytes().position(|b| escape_byte(b).is_some()) {
        Some(first) => first,
        None => return Cow::Borrowed(string),
    };

    // Heuristic with a conservative estimate to save on intermediate allocations
    let mut res = String::with_capacity(string.len() + string.len() / 10);
    res.push_str(&string[..first]);
    // Writing into a `String` never fails.
    let _ = write_escaped(&mut res, &string[first..]);
    Cow::Owned(res)
}

/// `Display` adapter escaping its contents on the fly.
#[derive(Debug, Clone, Copy)]
pub struct Escaped<'a> {
    string: &'a str,
}

impl<'a> Escaped<'a> {
    pub fn new(string: &'a str) -> Self {
        Self { string }
    }
}

impl Display for Escaped<'_> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write_escaped(fmt, self.string)
    }
}

/// One piece of a [`Safe`] buffer.
#[derive(Debug, Clone)]
pub enum Chunk {
    Static(&'static str),
    Shared(Arc<str>),
    Owned(String),
    /// A raw byte taken verbatim from byte-oriented input.
    Byte(u8),
    Nested(Safe),
}

/// Content that is known not to need any further HTML escaping.
///
/// A `Safe` is a tree of text pieces, raw bytes and nested buffers that is
/// only flattened when it is written out. Nothing that has been wrapped in a
/// `Safe` is ever escaped again, including when it is embedded in another
/// `Safe`.
///
/// Equality compares the flattened bytes, not the shape of the tree.
#[derive(Debug, Clone, Default)]
pub struct Safe {
    chunks: Vec<Chunk>,
}

impl Safe {
    pub const fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            chunks: Vec::with_capacity(capacity),
        }
    }

    pub fn from_static(s: &'static str) -> Self {
        let mut safe = Self::new();
        safe.push_static(s);
        safe
    }

    /// Wraps trusted markup without escaping it.
    pub fn raw(s: impl Into<String>) -> Self {
        let mut safe = Self::new();
        safe.push_raw(s.into());
        safe
    }

    /// Escapes `s` and wraps the result.
    pub fn escape(s: &str) -> Self {
        let mut safe = Self::new();
        safe.push_escaped(s);
        safe
    }

    pub fn push_static(&mut self, s: &'static str) {
        if !s.is_empty() {
            self.chunks.push(Chunk::Static(s));
        }
    }

    pub fn push_shared(&mut self, s: Arc<str>) {
        if !s.is_empty() {
            self.chunks.push(Chunk::Shared(s));
        }
    }

    /// Appends trusted text verbatim.
    pub fn push_raw(&mut self, s: String) {
        if !s.is_empty() {
            self.chunks.push(Chunk::Owned(s));
        }
    }

    pub fn push_escaped(&mut self, s: &str) {
        match escape(s) {
            Cow::Borrowed(s) => self.push_raw(s.to_owned()),
            Cow::Owned(s) => self.push_raw(s),
        }
    }

    pub fn push_byte(&mut self, byte: u8) {
        self.chunks.push(Chunk::Byte(byte));
    }

    /// Appends another safe buffer as a nested piece.
    pub fn push(&mut self, safe: Safe) {
        match safe.chunks.len() {
            0 => {}
            1 => self.chunks.extend(safe.chunks),
            _ => self.chunks.push(Chunk::Nested(safe)),
        }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Length of the flattened content in bytes.
    pub fn len(&self) -> usize {
        let mut len = 0;
        self.walk(&mut |bytes| len += bytes.len());
        len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.len());
        self.walk(&mut |bytes| buf.extend_from_slice(bytes));
        buf
    }

    pub fn write_to<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        let mut res = Ok(());
        self.walk(&mut |bytes| {
            if res.is_ok() {
                res = writer.write_all(bytes);
            }
        });
        res
    }

    /// Flattens into a `String`, replacing invalid UTF-8 from raw bytes.
    pub fn into_string(self) -> String {
        match String::from_utf8(self.to_bytes()) {
            Ok(s) => s,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        }
    }

    fn walk(&self, f: &mut dyn FnMut(&[u8])) {
        for chunk in &self.chunks {
            match chunk {
                Chunk::Static(s) => f(s.as_bytes()),
                Chunk::Shared(s) => f(s.as_bytes()),
                Chunk::Owned(s) => f(s.as_bytes()),
                Chunk::Byte(b) => f(&[*b]),
                Chunk::Nested(safe) => safe.walk(f),
            }
        }
    }

    fn has_bytes(&self) -> bool {
        self.chunks.iter().any(|chunk| match chunk {
            Chunk::Byte(_) => true,
            Chunk::Nested(safe) => safe.has_bytes(),
            _ => false,
        })
    }

    fn write_text(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        for chunk in &self.chunks {
            match chunk {
                Chunk::Static(s) => fmt.write_str(s)?,
                Chunk::Shared(s) => fmt.write_str(s)?,
                Chunk::Owned(s) => fmt.write_str(s)?,
                Chunk::Byte(_) => unreachable!("byte chunks are written lossily"),
                Chunk::Nested(safe) => safe.write_text(fmt)?,
            }
        }
        Ok(())
    }
}

impl PartialEq for Safe {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for Safe {}

impl Display for Safe {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        if self.has_bytes() {
            fmt.write_str(&String::from_utf8_lossy(&self.to_bytes()))
        } else {
            self.write_text(fmt)
        }
    }
}
