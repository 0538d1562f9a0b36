//! Writing PLY files: schema building, header emission and the
//! cursor-tracking value writer.
//!
//! A [`Writer`] starts in schema-building state. Once the schema is
//! complete, [`Writer::write_header`] emits the text preamble and locks the
//! schema; after that every call to [`Writer::write`] appends the next
//! value in declaration order. [`Writer::finish`] flushes and hands the
//! sink back.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::debug;

use crate::encode;
use crate::error::{Error, Result};
use crate::scalar::ScalarType;
use crate::schema::{PropertyDef, PropertyType, Schema};
use crate::Encoding;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    /// Accepting schema additions; nothing emitted yet.
    BuildingSchema,
    /// Header emitted; accepting values.
    WritingValues,
    /// An operation failed; only `finish` or dropping is meaningful.
    Poisoned,
}

/// Position within the declared schema while values are written.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    element: usize,
    instance: u64,
    property: usize,
    /// `Some(n)` while inside a list with `n` entries still missing;
    /// `None` when the next value is a scalar or a list length.
    list_remaining: Option<u64>,
    /// Whether the next ascii value starts a fresh line (no separator).
    at_line_start: bool,
    /// All declared values have been written.
    done: bool,
}

impl Cursor {
    fn new() -> Self {
        Self {
            element: 0,
            instance: 0,
            property: 0,
            list_remaining: None,
            at_line_start: true,
            done: false,
        }
    }
}

/// A writer producing binary or ascii PLY files.
///
/// The lifetime parameter bounds the optional error hook.
pub struct Writer<'h, W: io::Write> {
    out: BufWriter<W>,
    encoding: Encoding,
    schema: Schema,
    state: WriteState,
    cursor: Cursor,
    error_hook: Option<Box<dyn FnMut(&Error) + 'h>>,
}

impl<'h> Writer<'h, File> {
    /// Creates the file at `path` and binds a writer with the given
    /// encoding to it.
    pub fn create_file(path: impl AsRef<Path>, encoding: Encoding) -> Result<Self> {
        Ok(Self::create(File::create(path)?, encoding))
    }
}

impl<'h, W: io::Write> Writer<'h, W> {
    /// Binds a writer with the given encoding to `sink`.
    ///
    /// Use [`Encoding::binary_native`] (or [`Encoding::default`]) for the
    /// host's native byte order. An `io::Cursor<&mut [u8]>` sink writes into
    /// caller-owned memory of fixed capacity; the cursor returned by
    /// [`finish`][Writer::finish] tells how many bytes were produced.
    pub fn create(sink: W, encoding: Encoding) -> Self {
        Self {
            out: BufWriter::new(sink),
            encoding,
            schema: Schema::new(),
            state: WriteState::BuildingSchema,
            cursor: Cursor::new(),
            error_hook: None,
        }
    }

    /// The encoding this writer emits.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// The schema declared so far.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Installs a hook that receives every error before it is returned.
    /// Without a hook, errors are reported through `log::error!`.
    pub fn set_error_hook<F>(&mut self, hook: F)
    where
        F: FnMut(&Error) + 'h,
    {
        self.error_hook = Some(Box::new(hook));
    }

    // ===== Schema building =================================================

    /// Declares a new element group with the given instance count.
    pub fn add_element(&mut self, name: &str, count: u64) -> Result<()> {
        self.guard_building()?;
        self.schema
            .add_element(name, count)
            .map_err(|e| self.fail(e))
    }

    /// Declares a scalar property for the most recently added element.
    pub fn add_scalar_property(&mut self, name: &str, ty: ScalarType) -> Result<()> {
        self.guard_building()?;
        self.schema
            .add_property(PropertyDef {
                name: name.to_string(),
                ty: PropertyType::Scalar(ty),
            })
            .map_err(|e| self.fail(e))
    }

    /// Declares a list property for the most recently added element.
    ///
    /// The length prefix has to use an integer type; the grammar would
    /// permit declaring a float length, but no sensible file does and a
    /// written float length could not round-trip reliably.
    pub fn add_list_property(
        &mut self,
        name: &str,
        len_type: ScalarType,
        scalar_type: ScalarType,
    ) -> Result<()> {
        self.guard_building()?;
        if len_type.is_floating_point() {
            return Err(self.fail(Error::Schema(format!(
                "list property \"{}\" cannot use {} as length type",
                name, len_type,
            ))));
        }
        self.schema
            .add_property(PropertyDef {
                name: name.to_string(),
                ty: PropertyType::List { len_type, scalar_type },
            })
            .map_err(|e| self.fail(e))
    }

    /// Adds a comment line to the header.
    pub fn add_comment(&mut self, text: &str) -> Result<()> {
        self.guard_building()?;
        self.schema.add_comment(text).map_err(|e| self.fail(e))
    }

    /// Adds an obj_info line to the header.
    pub fn add_obj_info(&mut self, text: &str) -> Result<()> {
        self.guard_building()?;
        self.schema.add_obj_info(text).map_err(|e| self.fail(e))
    }

    // ===== Header emission =================================================

    /// Emits the header and locks the schema. Values are accepted
    /// afterwards.
    pub fn write_header(&mut self) -> Result<()> {
        self.guard_building()?;
        if let Err(e) = self.schema.check_complete() {
            return Err(self.fail(e));
        }
        if let Err(e) = self.emit_header() {
            return Err(self.fail(e));
        }

        self.cursor = Cursor::new();
        self.skip_empty_elements();
        self.state = WriteState::WritingValues;

        debug!(
            "wrote PLY header: {:?}, {} element group(s)",
            self.encoding,
            self.schema.elements().len(),
        );
        Ok(())
    }

    fn emit_header(&mut self) -> Result<()> {
        let w = &mut self.out;
        w.write_all(b"ply\n")?;
        writeln!(w, "format {} 1.0", self.encoding.name())?;
        for comment in self.schema.comments() {
            writeln!(w, "comment {}", comment)?;
        }
        for info in self.schema.obj_infos() {
            writeln!(w, "obj_info {}", info)?;
        }
        for elem in self.schema.elements() {
            writeln!(w, "element {} {}", elem.name, elem.count)?;
            for prop in &elem.property_defs {
                match prop.ty {
                    PropertyType::Scalar(ty) => {
                        writeln!(w, "property {} {}", ty, prop.name)?;
                    }
                    PropertyType::List { len_type, scalar_type } => {
                        writeln!(
                            w,
                            "property list {} {} {}",
                            len_type, scalar_type, prop.name,
                        )?;
                    }
                }
            }
        }
        w.write_all(b"end_header\n")?;
        Ok(())
    }

    // ===== The value driver ================================================

    /// Appends the next value in declaration order.
    ///
    /// The cursor through the schema decides how the value is interpreted:
    /// as the current scalar property, as a list length (truncated toward
    /// zero; negative lengths are rejected), or as the next list entry.
    pub fn write(&mut self, value: f64) -> Result<()> {
        match self.state {
            WriteState::WritingValues => {}
            WriteState::BuildingSchema => {
                return Err(self.fail(Error::InvalidState(
                    "values cannot be written before the header",
                )));
            }
            WriteState::Poisoned => {
                return Err(self.fail(Error::InvalidState("handle is poisoned")));
            }
        }
        if self.cursor.done {
            return Err(self.fail(Error::TooManyValues));
        }

        let elem = &self.schema.elements()[self.cursor.element];
        let ty = elem.property_defs[self.cursor.property].ty;
        let res = match ty {
            PropertyType::Scalar(ty) => {
                self.put(ty, value).and_then(|()| self.advance())
            }
            PropertyType::List { len_type, scalar_type } => {
                match self.cursor.list_remaining {
                    None => match write_list_length(value) {
                        Ok(len) => self.put(len_type, len as f64).and_then(|()| {
                            if len == 0 {
                                self.advance()
                            } else {
                                self.cursor.list_remaining = Some(len);
                                Ok(())
                            }
                        }),
                        Err(e) => Err(e),
                    },
                    Some(remaining) => {
                        self.put(scalar_type, value).and_then(|()| {
                            if remaining == 1 {
                                self.cursor.list_remaining = None;
                                self.advance()
                            } else {
                                self.cursor.list_remaining = Some(remaining - 1);
                                Ok(())
                            }
                        })
                    }
                }
            }
        };
        res.map_err(|e| self.fail(e))
    }

    /// Flushes and returns the sink.
    ///
    /// Fails with [`Error::Underrun`] when declared values are still
    /// missing. On a poisoned handle the sink is still flushed and
    /// returned, so partial output can be inspected.
    pub fn finish(mut self) -> Result<W> {
        match self.state {
            WriteState::Poisoned => {}
            WriteState::WritingValues if self.cursor.done => {}
            WriteState::WritingValues => {
                let e = Error::Underrun;
                self.report(&e);
                return Err(e);
            }
            WriteState::BuildingSchema => {
                let e = Error::InvalidState("finish called before the header was written");
                self.report(&e);
                return Err(e);
            }
        }

        match self.out.into_inner() {
            Ok(sink) => Ok(sink),
            Err(e) => {
                let e = Error::Io(e.into_error());
                report_through(&mut self.error_hook, &e);
                Err(e)
            }
        }
    }

    /// Writes one value of type `ty`, inserting the ascii separator if
    /// needed.
    fn put(&mut self, ty: ScalarType, v: f64) -> Result<()> {
        match self.encoding {
            Encoding::Ascii => {
                if !self.cursor.at_line_start {
                    self.out.write_all(b" ")?;
                }
                self.cursor.at_line_start = false;
                encode::write_ascii(&mut self.out, ty, v)
            }
            Encoding::BinaryLittleEndian | Encoding::BinaryBigEndian => {
                encode::write_binary(&mut self.out, ty, self.encoding, v)
            }
        }
    }

    /// Moves the cursor past a completed property, wrapping to the next
    /// instance and element as needed.
    fn advance(&mut self) -> Result<()> {
        let elems = self.schema.elements();

        self.cursor.property += 1;
        if self.cursor.property < elems[self.cursor.element].property_defs.len() {
            return Ok(());
        }
        self.cursor.property = 0;

        // One instance is complete, which ends its ascii line.
        if self.encoding == Encoding::Ascii {
            self.out.write_all(b"\n")?;
            self.cursor.at_line_start = true;
        }

        self.cursor.instance += 1;
        if self.cursor.instance < elems[self.cursor.element].count {
            return Ok(());
        }
        self.cursor.instance = 0;
        self.cursor.element += 1;
        self.skip_empty_elements();
        Ok(())
    }

    /// Skips element groups with a declared count of zero; marks the cursor
    /// done when no group is left.
    fn skip_empty_elements(&mut self) {
        let elems = self.schema.elements();
        while self.cursor.element < elems.len() && elems[self.cursor.element].count == 0 {
            self.cursor.element += 1;
        }
        if self.cursor.element >= elems.len() {
            self.cursor.done = true;
        }
    }

    fn guard_building(&mut self) -> Result<()> {
        let e = match self.state {
            WriteState::BuildingSchema => return Ok(()),
            WriteState::WritingValues => Error::SchemaLocked,
            WriteState::Poisoned => Error::InvalidState("handle is poisoned"),
        };
        Err(self.fail(e))
    }

    /// Poisons the handle and reports `e` through the hook.
    fn fail(&mut self, e: Error) -> Error {
        self.state = WriteState::Poisoned;
        self.report(&e);
        e
    }

    fn report(&mut self, e: &Error) {
        report_through(&mut self.error_hook, e);
    }
}

fn report_through(hook: &mut Option<Box<dyn FnMut(&Error) + '_>>, e: &Error) {
    match hook {
        Some(hook) => hook(e),
        None => log::error!("ply write failed: {}", e),
    }
}

/// A list length value has to be non-negative; it is truncated toward zero
/// like any other integer conversion.
fn write_list_length(v: f64) -> Result<u64> {
    if v.is_finite() && v >= 0.0 {
        Ok(v.trunc() as u64)
    } else {
        Err(Error::BadInteger(format!("{} is not a valid list length", v)))
    }
}
