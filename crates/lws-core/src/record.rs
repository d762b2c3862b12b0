//! Fixed-width binary records.
//!
//! Every persisted value has a constant encoded size. Integers are big-endian
//! so that concatenated keys sort bytewise in numeric order, which is what the
//! store relies on for per-account chain ordering.
//!
//! A [`Field`] names a byte window inside a record and decodes only that
//! window, so a reader can pull one column out of a row without materialising
//! the rest of it.
use crate::error::{ConsistencyViolation, raise};

/// A value with a constant-size binary encoding.
pub trait Record: Sized {
    /// Exact encoded length in bytes.
    const SIZE: usize;

    /// Append the encoding of `self` to `out`.
    fn write_to(&self, out: &mut Vec<u8>);

    /// Decode from the first `SIZE` bytes of `bytes`.
    ///
    /// Panics if `bytes` is shorter than `SIZE`; use [`decode_checked`] on
    /// untrusted lengths.
    fn read_from(bytes: &[u8]) -> Self;

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        self.write_to(&mut out);
        out
    }
}

/// Sequential decoder over a record's bytes.
pub struct RecordReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn read<R: Record>(&mut self) -> R {
        let value = R::read_from(&self.bytes[self.pos..self.pos + R::SIZE]);
        self.pos += R::SIZE;
        value
    }
}

impl Record for u8 {
    const SIZE: usize = 1;

    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(*self);
    }

    fn read_from(bytes: &[u8]) -> Self {
        bytes[0]
    }
}

impl Record for u32 {
    const SIZE: usize = 4;

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn read_from(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&bytes[..4]);
        u32::from_be_bytes(buf)
    }
}

impl Record for u64 {
    const SIZE: usize = 8;

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }

    fn read_from(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[..8]);
        u64::from_be_bytes(buf)
    }
}

impl<const N: usize> Record for [u8; N] {
    const SIZE: usize = N;

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }

    fn read_from(bytes: &[u8]) -> Self {
        let mut buf = [0u8; N];
        buf.copy_from_slice(&bytes[..N]);
        buf
    }
}

/// A typed byte window `[OFFSET, OFFSET + Value::SIZE)` inside `Record`.
pub trait Field {
    type Record: Record;
    type Value: Record;
    const OFFSET: usize;

    /// Decode only this field from an encoded record.
    fn read(record: &[u8]) -> Self::Value {
        Self::Value::read_from(&record[Self::OFFSET..Self::OFFSET + Self::Value::SIZE])
    }
}

/// Declare a [`Field`] projection. Fails to compile if the window does not fit
/// inside the record.
#[macro_export]
macro_rules! record_field {
    ($(#[$meta:meta])* $vis:vis $name:ident: $record:ty => $value:ty, offset = $offset:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        $vis struct $name;

        impl $crate::record::Field for $name {
            type Record = $record;
            type Value = $value;
            const OFFSET: usize = $offset;
        }

        const _: () = assert!(
            ($offset) + <$value as $crate::record::Record>::SIZE
                <= <$record as $crate::record::Record>::SIZE
        );
    };
}

/// Decode a full record, raising a consistency fault on a length mismatch.
pub fn decode_checked<R: Record>(table: &'static str, bytes: &[u8]) -> R {
    check_size::<R>(table, bytes);
    R::read_from(bytes)
}

/// Decode one field of a record, raising a consistency fault on a length mismatch.
pub fn field_checked<F: Field>(table: &'static str, bytes: &[u8]) -> F::Value {
    check_size::<F::Record>(table, bytes);
    F::read(bytes)
}

fn check_size<R: Record>(table: &'static str, bytes: &[u8]) {
    if bytes.len() != R::SIZE {
        raise(ConsistencyViolation::RecordSize { table, expected: R::SIZE, found: bytes.len() });
    }
}
