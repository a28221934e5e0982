//! A message layout is a static table of fields. The same table drives random generation,
//! byte emission and parsing, so the bit layout of every message type can be read off the
//! table instead of being spread over encoder code.
//!
//! Computed fields (`LengthOf`, `Parity`, `Padding`) are filled in on encode unless the
//! record carries an explicit value for them, which allows hand-built frames with
//! deliberately wrong lengths.

use super::CodecError;
use super::bits::{BitReader, BitWriter};
use super::checksum::odd_parity_bit;
use crate::mutator::Mutator;
use rand::Rng;
use std::fmt::Write;

/// How a field is randomized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Any value that fits into the field
    Uniform,
    /// Always the same value (e.g. the function code of a request)
    Fixed(u64),
    /// Any value of the field width except the listed ones
    NoneOf(&'static [u64]),
}

/// What a length field counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// number of list elements
    Elements,
    /// encoded size of the list in bytes
    Bytes,
}

/// The shape of a single field
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Unsigned integer of `bits` bits
    Uint {
        /// width in bits
        bits: u8,
        /// value used by `Layout::default_record`
        default: u64,
        /// randomization policy
        policy: Policy,
    },
    /// Length of the list field `target`, computed on encode
    LengthOf {
        /// width in bits
        bits: u8,
        /// name of the list field that is measured
        target: &'static str,
        /// elements or bytes
        unit: Unit,
    },
    /// Repeated sub-records with a random count in `min..=max`
    List {
        /// layout of each element
        element: &'static [Field],
        /// minimum number of generated elements
        min: usize,
        /// maximum number of generated elements
        max: usize,
    },
    /// Single odd-parity bit over every bit written before it
    Parity,
    /// Zero bits up to the next boundary
    Padding(u8),
}

/// A named field of a layout
#[derive(Debug, Clone, Copy)]
pub struct Field {
    /// field name, unique within its layout
    pub name: &'static str,
    /// field shape
    pub kind: FieldKind,
}

impl Field {
    /// Uniformly random unsigned field with a default of 0
    #[must_use]
    pub const fn uint(name: &'static str, bits: u8) -> Self {
        Self::uint_default(name, bits, 0)
    }

    /// Uniformly random unsigned field
    #[must_use]
    pub const fn uint_default(name: &'static str, bits: u8, default: u64) -> Self {
        Self {
            name,
            kind: FieldKind::Uint {
                bits,
                default,
                policy: Policy::Uniform,
            },
        }
    }

    /// Field which always carries `value`
    #[must_use]
    pub const fn fixed(name: &'static str, bits: u8, value: u64) -> Self {
        Self {
            name,
            kind: FieldKind::Uint {
                bits,
                default: value,
                policy: Policy::Fixed(value),
            },
        }
    }

    /// Field drawn from the complement of `excluded`
    #[must_use]
    pub const fn none_of(name: &'static str, bits: u8, excluded: &'static [u64]) -> Self {
        Self {
            name,
            kind: FieldKind::Uint {
                bits,
                default: 0,
                policy: Policy::NoneOf(excluded),
            },
        }
    }

    /// Length of another list field
    #[must_use]
    pub const fn length_of(name: &'static str, bits: u8, target: &'static str, unit: Unit) -> Self {
        Self {
            name,
            kind: FieldKind::LengthOf { bits, target, unit },
        }
    }

    /// List of `element` records
    #[must_use]
    pub const fn list(name: &'static str, element: &'static [Field], min: usize, max: usize) -> Self {
        Self {
            name,
            kind: FieldKind::List { element, min, max },
        }
    }

    /// Odd parity bit
    #[must_use]
    pub const fn parity(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Parity,
        }
    }

    /// Zero padding
    #[must_use]
    pub const fn padding(name: &'static str, bits: u8) -> Self {
        Self {
            name,
            kind: FieldKind::Padding(bits),
        }
    }
}

/// Value of a field inside a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// unsigned field
    Uint(u64),
    /// list field
    List(Vec<Record>),
}

/// Field values of one message (or one list element), in layout order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(&'static str, Value)>,
}

impl Record {
    /// Empty record
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder style `set`
    #[must_use]
    pub fn with(mut self, name: &'static str, value: Value) -> Self {
        self.set(name, value);
        self
    }

    /// Sets or replaces a value
    pub fn set(&mut self, name: &'static str, value: Value) {
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    /// Raw access to a value
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Value of an unsigned field
    /// # Errors
    pub fn uint(&self, name: &'static str) -> Result<u64, CodecError> {
        match self.get(name) {
            Some(Value::Uint(v)) => Ok(*v),
            Some(Value::List(_)) => Err(CodecError::WrongType { field: name }),
            None => Err(CodecError::MissingField { field: name }),
        }
    }

    /// Elements of a list field
    /// # Errors
    pub fn list(&self, name: &'static str) -> Result<&[Record], CodecError> {
        match self.get(name) {
            Some(Value::List(items)) => Ok(items),
            Some(Value::Uint(_)) => Err(CodecError::WrongType { field: name }),
            None => Err(CodecError::MissingField { field: name }),
        }
    }
}

/// A named message type
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    /// human readable message name, used as key in the message catalogue
    pub name: &'static str,
    /// fields in wire order
    pub fields: &'static [Field],
}

impl Layout {
    /// Random instance of this layout
    pub fn generate<R: Rng>(&self, mutator: &mut Mutator<R>) -> Record {
        generate_fields(self.fields, mutator)
    }

    /// Instance built from the field defaults, lists get `min` (at least one) elements
    #[must_use]
    pub fn default_record(&self) -> Record {
        default_fields(self.fields)
    }

    /// Packs the record into bytes.
    /// # Errors
    /// Missing fields, wrongly typed values or a layout that does not end on a byte boundary.
    pub fn encode(&self, record: &Record) -> Result<Vec<u8>, CodecError> {
        let mut writer = BitWriter::new();
        encode_fields(self.fields, record, &mut writer)?;
        writer.into_bytes()
    }

    /// Parses bytes into a record. All input must be consumed.
    /// # Errors
    /// Truncated input, inconsistent length fields or trailing bytes.
    pub fn decode(&self, bytes: &[u8]) -> Result<Record, CodecError> {
        let mut reader = BitReader::new(bytes);
        let end = bytes.len() * 8;
        let record = decode_fields(self.fields, &mut reader, end)?;
        if reader.position() != end {
            return Err(CodecError::TrailingBytes {
                count: (end - reader.position()).div_ceil(8),
            });
        }
        Ok(record)
    }

    /// One line summary of a record, e.g. `<Read Coils Request func_code=0x1 ... |>`
    #[must_use]
    pub fn show(&self, record: &Record) -> String {
        let mut out = format!("<{} ", self.name);
        show_fields(self.fields, record, &mut out);
        out.push_str("|>");
        out
    }
}

fn generate_fields<R: Rng>(fields: &[Field], mutator: &mut Mutator<R>) -> Record {
    let mut record = Record::new();
    for field in fields {
        let value = match field.kind {
            FieldKind::Uint { bits, policy, .. } => Value::Uint(match policy {
                Policy::Uniform => mutator.gen_bits(bits),
                Policy::Fixed(value) => value,
                Policy::NoneOf(excluded) => mutator.gen_excluding(bits, excluded),
            }),
            FieldKind::List { element, min, max } => {
                let count = mutator.gen_range(min, max);
                Value::List(
                    (0..count)
                        .map(|_| generate_fields(element, mutator))
                        .collect(),
                )
            }
            // computed on encode
            FieldKind::LengthOf { .. } | FieldKind::Parity | FieldKind::Padding(_) => continue,
        };
        record.set(field.name, value);
    }
    record
}

fn default_fields(fields: &[Field]) -> Record {
    let mut record = Record::new();
    for field in fields {
        match field.kind {
            FieldKind::Uint { default, .. } => record.set(field.name, Value::Uint(default)),
            FieldKind::List { element, min, .. } => record.set(
                field.name,
                Value::List((0..min.max(1)).map(|_| default_fields(element)).collect()),
            ),
            FieldKind::LengthOf { .. } | FieldKind::Parity | FieldKind::Padding(_) => {}
        }
    }
    record
}

fn encode_fields(fields: &[Field], record: &Record, w: &mut BitWriter) -> Result<(), CodecError> {
    for field in fields {
        match field.kind {
            FieldKind::Uint { bits, .. } => w.write(record.uint(field.name)?, bits),
            FieldKind::LengthOf { bits, target, unit } => {
                let value = match record.get(field.name) {
                    Some(Value::Uint(value)) => *value,
                    Some(Value::List(_)) => return Err(CodecError::WrongType { field: field.name }),
                    None => measure(fields, record, target, unit)?,
                };
                // lengths wider than the field are truncated, the frame stays malformed on purpose
                w.write(value, bits);
            }
            FieldKind::List { element, .. } => {
                for item in record.list(field.name)? {
                    encode_fields(element, item, w)?;
                }
            }
            FieldKind::Parity => w.write(u64::from(odd_parity_bit(w.count_ones())), 1),
            FieldKind::Padding(bits) => w.write(0, bits),
        }
    }
    Ok(())
}

fn measure(fields: &[Field], record: &Record, target: &'static str, unit: Unit) -> Result<u64, CodecError> {
    let items = record.list(target)?;
    match unit {
        Unit::Elements => Ok(items.len() as u64),
        Unit::Bytes => {
            let element = fields
                .iter()
                .find_map(|f| match f.kind {
                    FieldKind::List { element, .. } if f.name == target => Some(element),
                    _ => None,
                })
                .ok_or(CodecError::MissingField { field: target })?;
            let mut writer = BitWriter::new();
            for item in items {
                encode_fields(element, item, &mut writer)?;
            }
            Ok((writer.bit_len() / 8) as u64)
        }
    }
}

fn read_within(
    r: &mut BitReader<'_>,
    end: usize,
    bits: u8,
    field: &'static str,
) -> Result<u64, CodecError> {
    if r.position() + usize::from(bits) > end {
        return Err(CodecError::Truncated { field });
    }
    r.read(bits, field)
}

fn decode_fields(fields: &[Field], r: &mut BitReader<'_>, end: usize) -> Result<Record, CodecError> {
    let mut record = Record::new();
    let mut lengths: Vec<(&'static str, Unit, u64)> = vec![];
    for field in fields {
        let value = match field.kind {
            FieldKind::Uint { bits, .. } | FieldKind::Padding(bits) => {
                Value::Uint(read_within(r, end, bits, field.name)?)
            }
            FieldKind::Parity => Value::Uint(read_within(r, end, 1, field.name)?),
            FieldKind::LengthOf { bits, target, unit } => {
                let value = read_within(r, end, bits, field.name)?;
                lengths.push((target, unit, value));
                Value::Uint(value)
            }
            FieldKind::List { element, .. } => {
                let announced = |unit: Unit| {
                    lengths
                        .iter()
                        .find(|(target, u, _)| *target == field.name && *u == unit)
                        .map(|(_, _, n)| *n)
                };
                let mut items = vec![];
                if let Some(bytes) = announced(Unit::Bytes) {
                    let list_end = usize::try_from(bytes)
                        .ok()
                        .and_then(|b| b.checked_mul(8))
                        .and_then(|b| b.checked_add(r.position()))
                        .filter(|list_end| *list_end <= end)
                        .ok_or(CodecError::Truncated { field: field.name })?;
                    decode_until(element, r, list_end, &mut items)?;
                    if r.position() != list_end {
                        return Err(CodecError::LengthMismatch { field: field.name });
                    }
                } else if let Some(count) = announced(Unit::Elements) {
                    for _ in 0..count {
                        items.push(decode_fields(element, r, end)?);
                    }
                } else {
                    decode_until(element, r, end, &mut items)?;
                }
                Value::List(items)
            }
        };
        record.set(field.name, value);
    }
    Ok(record)
}

fn decode_until(
    element: &[Field],
    r: &mut BitReader<'_>,
    end: usize,
    items: &mut Vec<Record>,
) -> Result<(), CodecError> {
    while r.position() < end {
        let before = r.position();
        items.push(decode_fields(element, r, end)?);
        if r.position() == before {
            break;
        }
    }
    Ok(())
}

fn show_fields(fields: &[Field], record: &Record, out: &mut String) {
    for field in fields {
        match (field.kind, record.get(field.name)) {
            (FieldKind::Padding(_), _) | (_, None) => {}
            (FieldKind::List { element, .. }, Some(Value::List(items))) => {
                let _ = write!(out, "{}=[", field.name);
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    match (element, item.fields.as_slice()) {
                        ([_], [(_, Value::Uint(v))]) => {
                            let _ = write!(out, "{v:#x}");
                        }
                        _ => {
                            out.push('<');
                            show_fields(element, item, out);
                            out.push('>');
                        }
                    }
                }
                out.push_str("] ");
            }
            (_, Some(Value::Uint(v))) => {
                let _ = write!(out, "{}={v:#x} ", field.name);
            }
            (_, Some(Value::List(items))) => {
                let _ = write!(out, "{}=[{} items] ", field.name, items.len());
            }
        }
    }
}
