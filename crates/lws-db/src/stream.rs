//! Typed, forward-only cursor streams over a snapshot.
//!
//! A [`ValueStream`] covers every row whose key starts with a group prefix
//! (all outputs of one account, all key images of one output). Iterators
//! borrow the stream mutably: issuing a new iterator or calling
//! [`ValueStream::reset`] statically ends the previous one, and the stream
//! itself borrows the [`StorageReader`](crate::StorageReader) so it cannot
//! outlive the snapshot.
//!
//! Rows are decoded on demand. A row whose length does not match the record
//! size is a store consistency violation and aborts the read.

use std::marker::PhantomData;

use rocksdb::{DB, DBRawIteratorWithThreadMode};

use lws_core::error::{ConsistencyViolation, Expect, raise};
use lws_core::record::{Field, Record, decode_checked, field_checked};

use crate::schema::{backend, prefix_successor};

pub(crate) type RawIter<'r> = DBRawIteratorWithThreadMode<'r, DB>;

/// All values stored under one group prefix.
pub struct ValueStream<'r, V> {
    iter: RawIter<'r>,
    prefix: Vec<u8>,
    count: u64,
    table: &'static str,
    _value: PhantomData<fn() -> V>,
}

impl<'r, V: Record> ValueStream<'r, V> {
    pub(crate) fn new(
        mut iter: RawIter<'r>,
        table: &'static str,
        prefix: Vec<u8>,
        count: u64,
    ) -> Self {
        iter.seek(&prefix);
        Self { iter, prefix, count, table, _value: PhantomData }
    }

    /// Number of values under the group key, read from the snapshot's counts.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Rewind to the first value of the group.
    pub fn reset(&mut self) {
        self.iter.seek(&self.prefix);
    }

    /// Iterate full records from the cursor's current position.
    pub fn make_iterator(&mut self) -> ValueIterator<'_, 'r, V> {
        ValueIterator {
            iter: &mut self.iter,
            prefix: &self.prefix,
            table: self.table,
            _value: PhantomData,
        }
    }

    /// Iterate a single field of each record from the cursor's current position.
    pub fn make_field_iterator<F: Field<Record = V>>(&mut self) -> FieldIterator<'_, 'r, F> {
        FieldIterator { inner: self.make_iterator(), _field: PhantomData }
    }

    /// Error state of the underlying cursor, if iteration stopped on a failure.
    pub fn status(&self) -> Expect<()> {
        self.iter.status().map_err(backend)
    }
}

/// Lazy iterator over the records of a group.
pub struct ValueIterator<'s, 'r, V> {
    iter: &'s mut RawIter<'r>,
    prefix: &'s [u8],
    table: &'static str,
    _value: PhantomData<fn() -> V>,
}

impl<V: Record> ValueIterator<'_, '_, V> {
    /// True once the cursor has left the group.
    pub fn is_end(&self) -> bool {
        match self.iter.key() {
            Some(key) => !key.starts_with(self.prefix),
            None => true,
        }
    }

    /// Decode one field of the current record without advancing.
    pub fn get_value<F: Field<Record = V>>(&self) -> Option<F::Value> {
        if self.is_end() {
            return None;
        }
        self.iter.value().map(|bytes| field_checked::<F>(self.table, bytes))
    }

    /// Decode the current record without advancing.
    pub fn current(&self) -> Option<V> {
        if self.is_end() {
            return None;
        }
        self.iter.value().map(|bytes| decode_checked::<V>(self.table, bytes))
    }

    pub fn advance(&mut self) {
        if !self.is_end() {
            self.iter.next();
        }
    }
}

impl<V: Record> Iterator for ValueIterator<'_, '_, V> {
    type Item = V;

    fn next(&mut self) -> Option<V> {
        let value = self.current()?;
        self.iter.next();
        Some(value)
    }
}

/// Projection of one field out of each record of a group.
pub struct FieldIterator<'s, 'r, F: Field> {
    inner: ValueIterator<'s, 'r, F::Record>,
    _field: PhantomData<fn() -> F>,
}

impl<F: Field> Iterator for FieldIterator<'_, '_, F> {
    type Item = F::Value;

    fn next(&mut self) -> Option<F::Value> {
        let value = self.inner.get_value::<F>()?;
        self.inner.advance();
        Some(value)
    }
}

/// A table range iterated as groups of values sharing a fixed-width key `K`.
pub struct KeyStream<'r, K, V> {
    iter: RawIter<'r>,
    prefix: Vec<u8>,
    table: &'static str,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<'r, K: Record, V: Record> KeyStream<'r, K, V> {
    pub(crate) fn new(mut iter: RawIter<'r>, table: &'static str, prefix: Vec<u8>) -> Self {
        iter.seek(&prefix);
        Self { iter, prefix, table, _marker: PhantomData }
    }

    pub fn reset(&mut self) {
        self.iter.seek(&self.prefix);
    }

    /// Iterate groups from the cursor's current position.
    pub fn make_iterator(&mut self) -> KeyIterator<'_, 'r, K, V> {
        KeyIterator { stream: self, group: None }
    }

    pub fn status(&self) -> Expect<()> {
        self.iter.status().map_err(backend)
    }
}

/// Walks distinct keys of a [`KeyStream`].
pub struct KeyIterator<'s, 'r, K, V> {
    stream: &'s mut KeyStream<'r, K, V>,
    group: Option<Vec<u8>>,
}

impl<'r, K: Record, V: Record> KeyIterator<'_, 'r, K, V> {
    /// Move to the next distinct key, skipping whatever is left of the
    /// current one, and return it with an iterator over its values.
    pub fn next_group(&mut self) -> Option<(K, ValueIterator<'_, 'r, V>)> {
        if let Some(group) = self.group.take() {
            match prefix_successor(&group) {
                Some(next) => self.stream.iter.seek(&next),
                None => {
                    while self.stream.iter.key().is_some_and(|k| k.starts_with(&group)) {
                        self.stream.iter.next();
                    }
                }
            }
        }

        let key = self.stream.iter.key()?;
        if !key.starts_with(&self.stream.prefix) {
            return None;
        }
        if key.len() < K::SIZE {
            raise(ConsistencyViolation::RecordSize {
                table: self.stream.table,
                expected: K::SIZE,
                found: key.len(),
            });
        }
        let group = key[..K::SIZE].to_vec();
        let value = K::read_from(&group);
        let group: &[u8] = self.group.insert(group);

        let values = ValueIterator {
            iter: &mut self.stream.iter,
            prefix: group,
            table: self.stream.table,
            _value: PhantomData,
        };
        Some((value, values))
    }
}

