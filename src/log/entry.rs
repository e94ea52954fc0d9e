// Copyright 2015-2020 Parity Technologies (UK) Ltd.
// This file is part of Parity.

// Parity is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Parity is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Parity.  If not, see <http://www.gnu.org/licenses/>.

// Log entry framing. Keys are never empty, so a leading key-length VLQ of
// zero is free to repurpose as a DELETE marker:
//
// PUT:    [VLQ key_len > 0] [VLQ value_len] [key bytes] [value bytes]
// DELETE: [VLQ 0]           [VLQ key_len]   [key bytes]

use crate::error::{Error, Result};
use crate::varint;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
	Put { key: Vec<u8>, value: Vec<u8> },
	Delete { key: Vec<u8> },
}

impl LogEntry {
	pub fn key(&self) -> &[u8] {
		match self {
			LogEntry::Put { key, .. } => key,
			LogEntry::Delete { key } => key,
		}
	}

	pub fn is_put(&self) -> bool {
		matches!(self, LogEntry::Put { .. })
	}

	pub fn encoded_len(&self) -> usize {
		match self {
			LogEntry::Put { key, value } => {
				varint::encoded_len(key.len() as u64)
					+ varint::encoded_len(value.len() as u64)
					+ key.len() + value.len()
			}
			LogEntry::Delete { key } => {
				varint::encoded_len(0) + varint::encoded_len(key.len() as u64) + key.len()
			}
		}
	}

	pub fn encode(&self, out: &mut Vec<u8>) {
		match self {
			LogEntry::Put { key, value } => {
				varint::encode(key.len() as u64, out);
				varint::encode(value.len() as u64, out);
				out.extend_from_slice(key);
				out.extend_from_slice(value);
			}
			LogEntry::Delete { key } => {
				varint::encode(0, out);
				varint::encode(key.len() as u64, out);
				out.extend_from_slice(key);
			}
		}
	}

	// Decodes one entry from a byte-cursor read_byte/read_bytes pair over a
	// single (already decompressed) block. Returns Ok(None) at a clean
	// block boundary (no further entries).
	pub fn decode<R: EntryReader>(r: &mut R) -> Result<Option<LogEntry>> {
		if r.at_end() {
			return Ok(None);
		}
		let first = varint::decode(|| r.read_byte())?;
		if first == 0 {
			let key_len = varint::decode(|| r.read_byte())? as usize;
			let key = r.read_bytes(key_len)?;
			Ok(Some(LogEntry::Delete { key }))
		} else {
			let key_len = first as usize;
			let value_len = varint::decode(|| r.read_byte())? as usize;
			let key = r.read_bytes(key_len)?;
			let value = r.read_bytes(value_len)?;
			Ok(Some(LogEntry::Put { key, value }))
		}
	}
}

// Minimal cursor interface LogEntry::decode needs. Implemented over a
// plain slice by SliceCursor below and over the sequential block reader
// in log::reader.
pub trait EntryReader {
	fn read_byte(&mut self) -> Result<Option<u8>>;
	fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>>;
	fn at_end(&self) -> bool;
}

pub struct SliceCursor<'a> {
	buf: &'a [u8],
	pos: usize,
}

impl<'a> SliceCursor<'a> {
	pub fn new(buf: &'a [u8]) -> SliceCursor<'a> {
		SliceCursor { buf, pos: 0 }
	}

	pub fn position(&self) -> usize {
		self.pos
	}
}

impl<'a> EntryReader for SliceCursor<'a> {
	fn read_byte(&mut self) -> Result<Option<u8>> {
		if self.pos >= self.buf.len() {
			Ok(None)
		} else {
			let b = self.buf[self.pos];
			self.pos += 1;
			Ok(Some(b))
		}
	}

	fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
		if self.pos + len > self.buf.len() {
			return Err(Error::Corruption("Log entry runs past end of block".into()));
		}
		let out = self.buf[self.pos..self.pos + len].to_vec();
		self.pos += len;
		Ok(out)
	}

	fn at_end(&self) -> bool {
		self.pos >= self.buf.len()
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn roundtrip(entry: LogEntry) {
		let mut buf = Vec::new();
		entry.encode(&mut buf);
		assert_eq!(buf.len(), entry.encoded_len());
		let mut cursor = SliceCursor::new(&buf);
		let decoded = LogEntry::decode(&mut cursor).unwrap().unwrap();
		assert_eq!(decoded, entry);
		assert!(cursor.at_end());
	}

	#[test]
	fn put_roundtrips() {
		roundtrip(LogEntry::Put { key: b"hello".to_vec(), value: b"world".to_vec() });
	}

	#[test]
	fn put_with_empty_value_roundtrips() {
		roundtrip(LogEntry::Put { key: b"k".to_vec(), value: Vec::new() });
	}

	#[test]
	fn delete_roundtrips() {
		roundtrip(LogEntry::Delete { key: b"gone".to_vec() });
	}

	#[test]
	fn empty_block_decodes_to_none() {
		let mut cursor = SliceCursor::new(&[]);
		assert_eq!(LogEntry::decode(&mut cursor).unwrap(), None);
	}

	#[test]
	fn truncated_entry_is_corruption() {
		let mut buf = Vec::new();
		LogEntry::Put { key: b"hello".to_vec(), value: b"world".to_vec() }.encode(&mut buf);
		buf.truncate(buf.len() - 2);
		let mut cursor = SliceCursor::new(&buf);
		assert!(LogEntry::decode(&mut cursor).is_err());
	}
}
