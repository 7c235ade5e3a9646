use crate::error::{OrderError, Result};
use serde::de::DeserializeOwned;
use std::io::Read;
use std::marker::PhantomData;

/// Reads seed rows (machines, users, branches) from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and yields one
/// deserialized row per record, so callers can skip bad rows and carry on.
pub struct CatalogReader<R: Read, T> {
    reader: csv::Reader<R>,
    _row: PhantomData<T>,
}

impl<R: Read, T: DeserializeOwned> CatalogReader<R, T> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self {
            reader,
            _row: PhantomData,
        }
    }

    /// Lazily deserializes the remaining rows.
    pub fn rows(self) -> impl Iterator<Item = Result<T>> {
        self.reader
            .into_deserialize()
            .map(|row| row.map_err(|e| OrderError::Storage(Box::new(e))))
    }
}
