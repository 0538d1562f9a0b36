//! Reading PLY files: header parsing, callback registration and the body
//! driver.
//!
//! A [`Reader`] is created from any `io::Read` source and parses the header
//! immediately. Callbacks are then registered per (element, property) pair
//! and a single call to [`Reader::read`] streams the whole body through
//! them, one decoded value per invocation.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use log::{debug, trace};

use crate::buf::{Buffer, LineEnding};
use crate::encode;
use crate::error::{Error, Result};
use crate::scalar::ScalarType;
use crate::schema::{ElementDef, PropertyDef, PropertyType, Schema};
use crate::Encoding;

// ===========================================================================
// ===== Callback surface
// ===========================================================================

/// What a read callback tells the driver to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Keep reading.
    Continue,
    /// Halt the whole read pass. The driver reports [`Error::Aborted`].
    Abort,
}

/// The view a read callback gets for one decoded value.
///
/// Borrowed from the driver: it is only valid for the single invocation and
/// must not be retained.
#[derive(Debug)]
pub struct Argument<'a> {
    element: &'a ElementDef,
    element_index: usize,
    instance: u64,
    property: &'a PropertyDef,
    property_index: usize,
    length: u64,
    value_index: i64,
    value: f64,
}

impl<'a> Argument<'a> {
    /// The element group currently being read.
    pub fn element(&self) -> &'a ElementDef {
        self.element
    }

    pub fn element_index(&self) -> usize {
        self.element_index
    }

    /// Index of the instance within its element group.
    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// The property this value belongs to.
    pub fn property(&self) -> &'a PropertyDef {
        self.property
    }

    pub fn property_index(&self) -> usize {
        self.property_index
    }

    /// List length of the current property. `1` for scalars.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// `-1` while the length prefix of a list is delivered, the entry index
    /// (`0..length`) afterwards. `0` for scalars.
    pub fn value_index(&self) -> i64 {
        self.value_index
    }

    /// The decoded value, widened to `f64`.
    pub fn value(&self) -> f64 {
        self.value
    }
}

type ReadCb<'cb> = Box<dyn FnMut(&Argument<'_>) -> Action + 'cb>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    /// Header parsed, body not read yet.
    Pending,
    /// The body was read to completion.
    Drained,
    /// An operation failed; only dropping the reader is meaningful.
    Poisoned,
}

// ===========================================================================
// ===== Definition of `Reader`
// ===========================================================================

/// A reader for binary and ascii PLY files.
///
/// Created with [`Reader::open`] or [`Reader::new`]; both parse the header
/// of the input. The parsed declarations are available through
/// [`elements`][Reader::elements] and friends before any body data is
/// touched.
///
/// The lifetime parameter bounds the registered callbacks, which may borrow
/// from their environment.
pub struct Reader<'cb, R: io::Read> {
    buf: Buffer<R>,
    eol: LineEnding,
    encoding: Encoding,
    schema: Schema,

    /// One slot per property over all elements; the row offset of element
    /// `e` is `cb_base[e]`. Registration resolves names to a slot index, so
    /// dispatch in the driver is a single lookup.
    callbacks: Vec<Option<ReadCb<'cb>>>,
    cb_base: Vec<usize>,

    state: ReadState,
    error_hook: Option<Box<dyn FnMut(&Error) + 'cb>>,
}

impl<'cb> Reader<'cb, File> {
    /// Opens the file at `path` and parses its header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        // No `BufReader` needed, the internal window does the buffering.
        Self::new(File::open(path)?)
    }
}

impl<'cb, R: io::Read> Reader<'cb, R> {
    /// Creates a reader from the given source and parses the header.
    pub fn new(reader: R) -> Result<Self> {
        match Self::parse_header(reader) {
            Ok(out) => Ok(out),
            Err(e) => {
                // No hook can be registered before the handle exists, so
                // header errors go to the default reporter.
                log::error!("failed to parse PLY header: {}", e);
                Err(e)
            }
        }
    }

    fn parse_header(reader: R) -> Result<Self> {
        let mut buf = Buffer::new(reader)?;

        // ===== Magic line, which also fixes the line terminator ============
        buf.prepare(3)?;
        if &buf.raw_buf()[..3] != b"ply" {
            return Err(Error::UnknownKeyword(
                "file does not start with the \"ply\" magic line".into(),
            ));
        }
        buf.consume(3);
        let eol = match buf.peek()? {
            Some(b'\n') => {
                buf.consume(1);
                LineEnding::Lf
            }
            Some(b'\r') => {
                buf.prepare(2)?;
                if buf.raw_buf()[1] != b'\n' {
                    return Err(Error::BadLineTerminator);
                }
                buf.consume(2);
                LineEnding::CrLf
            }
            _ => {
                return Err(Error::UnknownKeyword(
                    "file does not start with the \"ply\" magic line".into(),
                ));
            }
        };

        // ===== Format line (strictly the second line) ======================
        let encoding = buf.take_line(eol, |line| {
            let line = header_text(line)?;
            let mut tokens = line.split_whitespace();
            if tokens.next() != Some("format") {
                return Err(Error::UnknownKeyword(format!(
                    "expected format line, found \"{}\"",
                    line.trim(),
                )));
            }
            let encoding = match tokens.next() {
                Some("ascii") => Encoding::Ascii,
                Some("binary_little_endian") => Encoding::BinaryLittleEndian,
                Some("binary_big_endian") => Encoding::BinaryBigEndian,
                Some(other) => {
                    return Err(Error::UnknownKeyword(format!(
                        "\"{}\" is not a valid storage mode",
                        other,
                    )));
                }
                None => {
                    return Err(Error::UnknownKeyword(
                        "format line is missing the storage mode".into(),
                    ));
                }
            };
            match tokens.next() {
                Some("1.0") => {}
                Some(version) => return Err(Error::UnsupportedVersion(version.into())),
                None => return Err(Error::UnsupportedVersion("<missing>".into())),
            }
            expect_line_end(tokens)?;
            Ok(encoding)
        })?;

        // ===== Comments, obj_info lines and element blocks =================
        let mut schema = Schema::new();
        loop {
            let done = buf.take_line(eol, |line| {
                let text = header_text(line)?;
                let mut tokens = text.split_whitespace();
                match tokens.next() {
                    Some("comment") => schema.add_comment(rest_after(text, "comment"))?,
                    Some("obj_info") => schema.add_obj_info(rest_after(text, "obj_info"))?,
                    Some("element") => {
                        let name = tokens
                            .next()
                            .ok_or_else(|| missing("element", "a name"))?;
                        let count = tokens
                            .next()
                            .ok_or_else(|| missing("element", "an instance count"))?;
                        let count = count.parse::<u64>().map_err(|_| {
                            Error::BadInteger(format!(
                                "\"{}\" is not a valid instance count",
                                count,
                            ))
                        })?;
                        expect_line_end(tokens)?;
                        schema.add_element(name, count)?;
                    }
                    Some("property") => {
                        let def = match tokens.next() {
                            Some("list") => {
                                let len_type = scalar_token(tokens.next(), "property list")?;
                                let scalar_type = scalar_token(tokens.next(), "property list")?;
                                let name = tokens
                                    .next()
                                    .ok_or_else(|| missing("property list", "a name"))?;
                                PropertyDef {
                                    name: name.into(),
                                    ty: PropertyType::List { len_type, scalar_type },
                                }
                            }
                            ty => {
                                let ty = scalar_token(ty, "property")?;
                                let name = tokens
                                    .next()
                                    .ok_or_else(|| missing("property", "a name"))?;
                                PropertyDef {
                                    name: name.into(),
                                    ty: PropertyType::Scalar(ty),
                                }
                            }
                        };
                        expect_line_end(tokens)?;
                        schema.add_property(def)?;
                    }
                    Some("end_header") => {
                        expect_line_end(tokens)?;
                        return Ok(true);
                    }
                    Some(keyword) => {
                        return Err(Error::UnknownKeyword(format!(
                            "\"{}\" is not a header keyword",
                            keyword,
                        )));
                    }
                    None => {
                        return Err(Error::UnknownKeyword("blank line in header".into()));
                    }
                }
                Ok(false)
            })?;
            if done {
                break;
            }
        }
        schema.check_complete()?;

        // Offsets into the flat callback table, one row per element.
        let mut cb_base = Vec::with_capacity(schema.elements().len());
        let mut total = 0;
        for elem in schema.elements() {
            cb_base.push(total);
            total += elem.property_defs.len();
        }
        let callbacks = (0..total).map(|_| None).collect();

        debug!(
            "parsed PLY header: {:?}, {} element group(s), {} comment(s)",
            encoding,
            schema.elements().len(),
            schema.comments().len(),
        );

        Ok(Self {
            buf,
            eol,
            encoding,
            schema,
            callbacks,
            cb_base,
            state: ReadState::Pending,
            error_hook: None,
        })
    }

    /// The encoding of this file's body.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Whether the header uses LF or CRLF line terminators.
    pub fn line_ending(&self) -> LineEnding {
        self.eol
    }

    /// The parsed header declarations.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The raw definitions of all elements, in file order.
    pub fn elements(&self) -> &[ElementDef] {
        self.schema.elements()
    }

    /// All comments, in the order they appear in the header.
    pub fn comments(&self) -> &[String] {
        self.schema.comments()
    }

    /// All obj_info lines, in the order they appear in the header.
    pub fn obj_infos(&self) -> &[String] {
        self.schema.obj_infos()
    }

    /// Installs a hook that receives every error before it is returned.
    /// Without a hook, errors are reported through `log::error!`.
    pub fn set_error_hook<F>(&mut self, hook: F)
    where
        F: FnMut(&Error) + 'cb,
    {
        self.error_hook = Some(Box::new(hook));
    }

    /// Registers `cb` for the given (element, property) pair and returns the
    /// element's declared instance count.
    ///
    /// Returns 0 without registering anything if no such pair is declared.
    /// Registering a pair a second time silently replaces the earlier
    /// callback. Name resolution happens here, not during the read pass.
    pub fn set_read_cb<F>(&mut self, element: &str, property: &str, cb: F) -> u64
    where
        F: FnMut(&Argument<'_>) -> Action + 'cb,
    {
        let Some(ei) = self.schema.elem_pos(element) else {
            return 0;
        };
        let elem = &self.schema.elements()[ei];
        let Some(pi) = elem.prop_pos(property) else {
            return 0;
        };
        self.callbacks[self.cb_base[ei] + pi] = Some(Box::new(cb));
        elem.count
    }

    /// Reads the whole body, dispatching every decoded value to the
    /// registered callbacks. May be called exactly once.
    ///
    /// Values of properties without a callback are decoded and discarded.
    /// Bytes after the last declared instance are ignored.
    pub fn read(&mut self) -> Result<()> {
        if self.state != ReadState::Pending {
            let e = Error::InvalidState("the body has already been read");
            self.report(&e);
            return Err(e);
        }

        // Poison up front; undone only on success.
        self.state = ReadState::Poisoned;
        let res = drive(
            &mut self.buf,
            self.encoding,
            &self.schema,
            &self.cb_base,
            &mut self.callbacks,
        );
        match res {
            Ok(()) => {
                self.state = ReadState::Drained;
                Ok(())
            }
            Err(e) => {
                self.report(&e);
                Err(e)
            }
        }
    }

    fn report(&mut self, e: &Error) {
        match &mut self.error_hook {
            Some(hook) => hook(e),
            None => log::error!("ply read failed: {}", e),
        }
    }
}

// ===========================================================================
// ===== Header line helpers
// ===========================================================================

fn header_text(line: &[u8]) -> Result<&str> {
    std::str::from_utf8(line).map_err(|_| {
        Error::UnknownKeyword(format!(
            "header line is not valid UTF-8: \"{}\"",
            String::from_utf8_lossy(line),
        ))
    })
}

/// The text after `keyword`, with leading whitespace removed. Only valid if
/// the line is known to start with `keyword` (modulo leading whitespace).
fn rest_after<'a>(line: &'a str, keyword: &str) -> &'a str {
    line.trim_start()[keyword.len()..].trim_start()
}

fn missing(line_kind: &str, what: &str) -> Error {
    Error::UnknownKeyword(format!("{} line is missing {}", line_kind, what))
}

fn scalar_token(token: Option<&str>, line_kind: &str) -> Result<ScalarType> {
    token.ok_or_else(|| missing(line_kind, "a type"))?.parse()
}

fn expect_line_end<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Result<()> {
    match tokens.next() {
        None => Ok(()),
        Some(extra) => Err(Error::UnknownKeyword(format!(
            "unexpected trailing token \"{}\"",
            extra,
        ))),
    }
}

// ===========================================================================
// ===== The body driver
// ===========================================================================

fn drive<'cb, R: Read>(
    buf: &mut Buffer<R>,
    encoding: Encoding,
    schema: &Schema,
    cb_base: &[usize],
    callbacks: &mut [Option<ReadCb<'cb>>],
) -> Result<()> {
    for (ei, elem) in schema.elements().iter().enumerate() {
        trace!("reading element group \"{}\" ({} instances)", elem.name, elem.count);

        for instance in 0..elem.count {
            for (pi, prop) in elem.property_defs.iter().enumerate() {
                let slot = &mut callbacks[cb_base[ei] + pi];
                match prop.ty {
                    PropertyType::Scalar(ty) => {
                        let value = read_value(buf, encoding, ty)?;
                        fire(slot, Argument {
                            element: elem,
                            element_index: ei,
                            instance,
                            property: prop,
                            property_index: pi,
                            length: 1,
                            value_index: 0,
                            value,
                        })?;
                    }
                    PropertyType::List { len_type, scalar_type } => {
                        let length = list_length(read_value(buf, encoding, len_type)?)?;
                        fire(slot, Argument {
                            element: elem,
                            element_index: ei,
                            instance,
                            property: prop,
                            property_index: pi,
                            length,
                            value_index: -1,
                            value: length as f64,
                        })?;
                        for i in 0..length {
                            let value = read_value(buf, encoding, scalar_type)?;
                            fire(slot, Argument {
                                element: elem,
                                element_index: ei,
                                instance,
                                property: prop,
                                property_index: pi,
                                length,
                                value_index: i as i64,
                                value,
                            })?;
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

fn read_value<R: Read>(buf: &mut Buffer<R>, encoding: Encoding, ty: ScalarType) -> Result<f64> {
    match encoding {
        Encoding::Ascii => {
            let word = buf.take_word()?;
            encode::parse_ascii(&word, ty)
        }
        Encoding::BinaryLittleEndian | Encoding::BinaryBigEndian => {
            encode::read_binary(buf, ty, encoding)
        }
    }
}

/// An on-disk list length has to be a non-negative integer, whatever the
/// declared length type was.
fn list_length(v: f64) -> Result<u64> {
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v < u64::MAX as f64 {
        Ok(v as u64)
    } else {
        Err(Error::BadInteger(format!("{} is not a valid list length", v)))
    }
}

fn fire(slot: &mut Option<ReadCb<'_>>, arg: Argument<'_>) -> Result<()> {
    if let Some(cb) = slot {
        if cb(&arg) == Action::Abort {
            return Err(Error::Aborted);
        }
    }
    Ok(())
}
