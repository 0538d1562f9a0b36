//! Reading and writing PLY files.
//!
//! PLY is a popular and flexible file format often used for meshes and
//! point clouds. A file describes one object as a sequence of typed
//! *elements* (usually `vertex` and `face`, but arbitrary names are
//! allowed), where each element is composed of named *properties* holding
//! either a scalar or a variable-length list of scalars. The header is
//! always ASCII text; the body comes in three encodings under that one
//! header grammar: ASCII text, little endian binary and big endian binary.
//!
//! This crate does not interpret any of these declarations. It is the codec
//! layer only: what a `vertex` or an `x` means is up to the caller. All
//! values cross the API as `f64`, which holds every PLY scalar type up to
//! 32 bit integers losslessly.
//!
//! ### Links:
//! - ["Specification"](http://paulbourke.net/dataformats/ply/)
//! - [Wikipedia](https://en.wikipedia.org/wiki/PLY_(file_format))
//!
//!
//! # Reading and writing
//!
//! Reading: create a [`Reader`] (which parses the header), register a
//! callback per interesting (element, property) pair, then call
//! [`Reader::read`] once. The driver visits the file in declaration order
//! and hands each decoded value to the matching callback; a callback can
//! stop the pass early by returning [`Action::Abort`].
//!
//! Writing: create a [`Writer`], declare the schema, emit the header with
//! [`Writer::write_header`], then feed every value in declaration order to
//! [`Writer::write`] (for a list: its length first, then the entries) and
//! call [`Writer::finish`].
//!
//! ```
//! use plyio::{Action, Encoding, Reader, ScalarType, Writer};
//!
//! # fn main() -> plyio::Result<()> {
//! // Write two points into memory.
//! let mut writer = Writer::create(Vec::new(), Encoding::Ascii);
//! writer.add_comment("two points")?;
//! writer.add_element("vertex", 2)?;
//! writer.add_scalar_property("x", ScalarType::Float)?;
//! writer.add_scalar_property("y", ScalarType::Float)?;
//! writer.write_header()?;
//! for v in [0.0, 1.0, 2.0, 3.0] {
//!     writer.write(v)?;
//! }
//! let bytes = writer.finish()?;
//!
//! // Read them back, summing all coordinates.
//! let sum = std::cell::Cell::new(0.0);
//! let mut reader = Reader::new(&bytes[..])?;
//! for prop in ["x", "y"] {
//!     let count = reader.set_read_cb("vertex", prop, |arg| {
//!         sum.set(sum.get() + arg.value());
//!         Action::Continue
//!     });
//!     assert_eq!(count, 2);
//! }
//! reader.read()?;
//! assert_eq!(sum.get(), 6.0);
//! # Ok(())
//! # }
//! ```

mod buf;
mod encode;
mod error;
mod read;
mod scalar;
mod schema;
mod write;

pub use self::buf::LineEnding;
pub use self::error::{Error, Result};
pub use self::read::{Action, Argument, Reader};
pub use self::scalar::{ScalarLen, ScalarType};
pub use self::schema::{ElementDef, PropertyDef, PropertyType, Schema};
pub use self::write::Writer;


// ----------------------------------------------------------------------------

/// The encoding of a PLY file body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// Everything is stored as an ASCII string. You should usually not use
    /// this as this encoding is very space-inefficient.
    Ascii,

    /// Binary encoding where all numeric types are stored in big endian
    /// layout. The header is still ASCII.
    BinaryBigEndian,

    /// Binary encoding where all numeric types are stored in little endian
    /// layout. The header is still ASCII.
    BinaryLittleEndian,
}

impl Encoding {
    /// Returns the binary encoding with native endianness (little endian on
    /// x86).
    pub fn binary_native() -> Self {
        if cfg!(target_endian = "big") {
            Encoding::BinaryBigEndian
        } else {
            Encoding::BinaryLittleEndian
        }
    }

    /// The token used in the header's format line.
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Ascii => "ascii",
            Encoding::BinaryBigEndian => "binary_big_endian",
            Encoding::BinaryLittleEndian => "binary_little_endian",
        }
    }
}

/// The default encoding is binary with the host's native endianness.
impl Default for Encoding {
    fn default() -> Self {
        Self::binary_native()
    }
}
