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

// Random-access view over the log file. A "logical" position is the
// physical byte offset of the block that contains it: for an uncompressed
// log that's the entry's own offset, for a compressed log it's the offset
// of the compressed block header. Seeking to a logical position plus an
// entry-in-block index lands a cursor exactly on an entry boundary, which
// is all the engine and the reader ever need.

use crate::compress::CompressionType;
use crate::error::{Error, Result};
use crate::header::LogHeader;
use memmap2::Mmap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::convert::TryInto;
use std::fs::File;
use std::path::Path;
use std::rc::Rc;

struct DecodedBlock {
	data: Vec<u8>,
}

// Shared, read-only state behind every LogView::duplicate().
struct Shared {
	mmap: Mmap,
	header: LogHeader,
	cache: RefCell<HashMap<u64, Rc<DecodedBlock>>>,
}

pub struct LogView {
	shared: Rc<Shared>,
	// Physical offset of the current block.
	block_pos: u64,
	// Byte offset within the (decompressed, for compressed logs) block.
	offset_in_block: usize,
	current: Option<Rc<DecodedBlock>>,
}

impl LogView {
	pub fn open(path: &Path, header: LogHeader) -> Result<LogView> {
		let file = File::open(path)?;
		let mmap = unsafe { Mmap::map(&file)? };
		if (mmap.len() as u64) < header.data_end {
			return Err(Error::Corruption("Log file shorter than header data_end".into()));
		}
		let shared = Rc::new(Shared { mmap, header, cache: RefCell::new(HashMap::new()) });
		Ok(LogView { shared, block_pos: crate::header::LOG_HEADER_SIZE as u64, offset_in_block: 0, current: None })
	}

	// A second, independent cursor sharing this view's mapping and cache.
	pub fn duplicate(&self) -> LogView {
		LogView { shared: self.shared.clone(), block_pos: self.block_pos, offset_in_block: self.offset_in_block, current: self.current.clone() }
	}

	pub fn close(self) {}

	// Seeks to the entry at (block_pos, entry_index), as packed into a slot
	// address.
	pub fn seek_entry(&mut self, block_pos: u64, entry_index: u64) -> Result<()> {
		if !self.shared.header.compression.is_compressed() {
			self.block_pos = block_pos;
			self.offset_in_block = 0;
			self.current = None;
			return Ok(());
		}
		let block = self.load_block(block_pos)?;
		let mut off = 0usize;
		for _ in 0..entry_index {
			off = self.skip_one_entry(&block.data, off)?;
		}
		self.block_pos = block_pos;
		self.offset_in_block = off;
		self.current = Some(block);
		Ok(())
	}

	fn skip_one_entry(&self, buf: &[u8], mut pos: usize) -> Result<usize> {
		let mut read_pos = pos;
		let first = crate::varint::decode(|| {
			if read_pos >= buf.len() {
				Ok(None)
			} else {
				let b = buf[read_pos];
				read_pos += 1;
				Ok(Some(b))
			}
		})?;
		if first == 0 {
			let key_len = crate::varint::decode(|| {
				if read_pos >= buf.len() {
					Ok(None)
				} else {
					let b = buf[read_pos];
					read_pos += 1;
					Ok(Some(b))
				}
			})? as usize;
			pos = read_pos + key_len;
		} else {
			let value_len = crate::varint::decode(|| {
				if read_pos >= buf.len() {
					Ok(None)
				} else {
					let b = buf[read_pos];
					read_pos += 1;
					Ok(Some(b))
				}
			})? as usize;
			pos = read_pos + first as usize + value_len;
		}
		if pos > buf.len() {
			return Err(Error::Corruption("Log entry runs past end of block".into()));
		}
		Ok(pos)
	}

	fn load_block(&self, block_pos: u64) -> Result<Rc<DecodedBlock>> {
		if let Some(hit) = self.shared.cache.borrow().get(&block_pos) {
			return Ok(hit.clone());
		}
		let mmap = &self.shared.mmap;
		let pos = block_pos as usize;
		if pos + 8 > mmap.len() {
			return Err(Error::Corruption("Block header runs past end of log".into()));
		}
		let compressed_len = u32::from_le_bytes(mmap[pos..pos + 4].try_into().unwrap()) as usize;
		let uncompressed_len = u32::from_le_bytes(mmap[pos + 4..pos + 8].try_into().unwrap()) as usize;
		let payload_start = pos + 8;
		let payload_end = payload_start + compressed_len;
		let crc_end = payload_end + 4;
		if crc_end > mmap.len() {
			return Err(Error::Corruption("Block payload runs past end of log".into()));
		}
		let payload = &mmap[payload_start..payload_end];
		let crc_expected = u32::from_le_bytes(mmap[payload_end..crc_end].try_into().unwrap());
		let decoded = self.shared.header.compression.decompress(payload, uncompressed_len)?;
		if crc32fast::hash(&decoded) != crc_expected {
			return Err(Error::Corruption("Log block CRC-32 mismatch".into()));
		}
		log::trace!(target: "logindex", "Decompressed block at {} ({} bytes) into the read cache", block_pos, decoded.len());
		let rc = Rc::new(DecodedBlock { data: decoded });
		self.shared.cache.borrow_mut().insert(block_pos, rc.clone());
		Ok(rc)
	}

	// Reads exactly len bytes from the current cursor position, advancing it.
	pub fn read_fully(&mut self, len: usize) -> Result<Vec<u8>> {
		if !self.shared.header.compression.is_compressed() {
			let mmap = &self.shared.mmap;
			let start = self.block_pos as usize + self.offset_in_block;
			let end = start + len;
			if end as u64 > self.shared.header.data_end {
				return Err(Error::Eof);
			}
			self.offset_in_block += len;
			return Ok(mmap[start..end].to_vec());
		}
		if self.current.is_none() {
			self.current = Some(self.load_block(self.block_pos)?);
		}
		let block = self.current.as_ref().unwrap();
		let start = self.offset_in_block;
		let end = start + len;
		if end > block.data.len() {
			return Err(Error::Corruption("Read runs past end of decompressed block".into()));
		}
		self.offset_in_block = end;
		Ok(block.data[start..end].to_vec())
	}

	pub fn read_unsigned_byte(&mut self) -> Result<u8> {
		Ok(self.read_fully(1)?[0])
	}

	pub fn skip(&mut self, len: usize) -> Result<()> {
		if !self.shared.header.compression.is_compressed() {
			self.offset_in_block += len;
			return Ok(());
		}
		if self.current.is_none() {
			self.current = Some(self.load_block(self.block_pos)?);
		}
		self.offset_in_block += len;
		Ok(())
	}

	pub fn read_varint(&mut self) -> Result<u64> {
		crate::varint::decode(|| match self.read_unsigned_byte() {
			Ok(b) => Ok(Some(b)),
			Err(Error::Eof) => Ok(None),
			Err(e) => Err(e),
		})
	}

	// Resolves the key stored at (block_pos, entry_index), per the entry
	// framing in log::entry. A leading zero VLQ marks a DELETE, whose real
	// key length follows as a second VLQ.
	pub fn read_key_at(&mut self, block_pos: u64, entry_index: u64) -> Result<Vec<u8>> {
		self.seek_entry(block_pos, entry_index)?;
		let first = self.read_varint()?;
		let key_len = if first == 0 { self.read_varint()? as usize } else { first as usize };
		if first != 0 {
			self.read_varint()?; // value_len, unused here
		}
		self.read_fully(key_len)
	}
}

impl crate::engine::KeySource for LogView {
	fn key_at(&mut self, block_pos: u64, entry_index: u64) -> Result<Vec<u8>> {
		self.read_key_at(block_pos, entry_index)
	}
}
