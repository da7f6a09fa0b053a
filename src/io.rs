use std::fs::File;
use std::io::{BufReader, BufWriter};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Error;

/// Read a CBOR-encoded checkpoint from disk.
pub fn read_cbor<T: DeserializeOwned>(filename: &str) -> Result<T, Error> {
    let file = File::open(filename)?;
    Ok(serde_cbor::from_reader(BufReader::new(file))?)
}

/// Write a value as a CBOR-encoded checkpoint.
pub fn write_cbor<T: Serialize>(filename: &str, value: &T) -> Result<(), Error> {
    let file = File::create(filename)?;
    serde_cbor::to_writer(BufWriter::new(file), value)?;
    Ok(())
}
