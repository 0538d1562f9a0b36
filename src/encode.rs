//! Conversion between on-disk values and the `f64` the API exposes.
//!
//! One decode and one encode routine exists per (scalar type, encoding)
//! pair. The read path widens every value losslessly into `f64` (all
//! integer types up to 32 bit fit into the 53 bit mantissa). The write path
//! narrows: integer types truncate toward zero and saturate at the type's
//! bounds, `float` rounds to the nearest `f32` (out of range becomes
//! infinite).

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};

use crate::buf::Buffer;
use crate::error::{Error, Result};
use crate::scalar::ScalarType;
use crate::Encoding;

/// Decodes one binary value of type `ty` from `buf`.
pub fn read_binary<R: Read>(
    buf: &mut Buffer<R>,
    ty: ScalarType,
    encoding: Encoding,
) -> Result<f64> {
    buf.with_bytes(ty.len().as_usize(), |raw| {
        Ok(match encoding {
            Encoding::BinaryLittleEndian => decode::<LittleEndian>(raw, ty),
            Encoding::BinaryBigEndian => decode::<BigEndian>(raw, ty),
            Encoding::Ascii => unreachable!("ascii bodies have no binary values"),
        })
    })
}

fn decode<E: ByteOrder>(raw: &[u8], ty: ScalarType) -> f64 {
    match ty {
        ScalarType::Char => raw[0] as i8 as f64,
        ScalarType::UChar => raw[0] as f64,
        ScalarType::Short => E::read_i16(raw) as f64,
        ScalarType::UShort => E::read_u16(raw) as f64,
        ScalarType::Int => E::read_i32(raw) as f64,
        ScalarType::UInt => E::read_u32(raw) as f64,
        ScalarType::Float => E::read_f32(raw) as f64,
        ScalarType::Double => E::read_f64(raw),
    }
}

/// Encodes `v` as one binary value of type `ty`.
pub fn write_binary<W: Write>(
    w: &mut W,
    ty: ScalarType,
    encoding: Encoding,
    v: f64,
) -> Result<()> {
    match encoding {
        Encoding::BinaryLittleEndian => encode::<LittleEndian, W>(w, ty, v)?,
        Encoding::BinaryBigEndian => encode::<BigEndian, W>(w, ty, v)?,
        Encoding::Ascii => unreachable!("ascii bodies have no binary values"),
    }
    Ok(())
}

fn encode<E: ByteOrder, W: Write>(w: &mut W, ty: ScalarType, v: f64) -> io::Result<()> {
    match ty {
        ScalarType::Char => w.write_i8(v as i8),
        ScalarType::UChar => w.write_u8(v as u8),
        ScalarType::Short => w.write_i16::<E>(v as i16),
        ScalarType::UShort => w.write_u16::<E>(v as u16),
        ScalarType::Int => w.write_i32::<E>(v as i32),
        ScalarType::UInt => w.write_u32::<E>(v as u32),
        ScalarType::Float => w.write_f32::<E>(v as f32),
        ScalarType::Double => w.write_f64::<E>(v),
    }
}

/// Parses one ascii token as type `ty`.
///
/// The literal has to fit the type: range overflows and float literals in
/// integer fields are rejected. Parsing is locale independent (`FromStr`),
/// which matches the C locale the format is defined in.
pub fn parse_ascii(word: &[u8], ty: ScalarType) -> Result<f64> {
    let s = std::str::from_utf8(word)
        .map_err(|_| bad_literal(&String::from_utf8_lossy(word), ty))?;

    macro_rules! parse {
        ($t:ty) => {
            s.parse::<$t>().map(|v| v as f64).map_err(|_| bad_literal(s, ty))?
        };
    }

    Ok(match ty {
        ScalarType::Char => parse!(i8),
        ScalarType::UChar => parse!(u8),
        ScalarType::Short => parse!(i16),
        ScalarType::UShort => parse!(u16),
        ScalarType::Int => parse!(i32),
        ScalarType::UInt => parse!(u32),
        ScalarType::Float => parse!(f32),
        ScalarType::Double => parse!(f64),
    })
}

fn bad_literal(s: &str, ty: ScalarType) -> Error {
    let msg = format!("\"{}\" is not a valid {} value", s, ty);
    if ty.is_floating_point() {
        Error::BadFloat(msg)
    } else {
        Error::BadInteger(msg)
    }
}

/// Writes `v` as one ascii token of type `ty`, without any separator.
///
/// Floats use the shortest representation that round-trips, integers the
/// standard decimal form.
pub fn write_ascii<W: Write>(w: &mut W, ty: ScalarType, v: f64) -> Result<()> {
    match ty {
        ScalarType::Char => write!(w, "{}", v as i8),
        ScalarType::UChar => write!(w, "{}", v as u8),
        ScalarType::Short => write!(w, "{}", v as i16),
        ScalarType::UShort => write!(w, "{}", v as u16),
        ScalarType::Int => write!(w, "{}", v as i32),
        ScalarType::UInt => write!(w, "{}", v as u32),
        ScalarType::Float => write!(w, "{}", v as f32),
        ScalarType::Double => write!(w, "{}", v),
    }?;
    Ok(())
}
