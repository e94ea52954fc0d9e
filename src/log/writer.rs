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

// Append-only log writer. Groups entries into blocks of at most
// max_entries_per_block; compressed blocks are framed as
// [u32 compressed_len][u32 uncompressed_len][payload][u32 crc32 of payload].
// Uncompressed logs skip block framing entirely: max_entries_per_block == 1
// so every entry is its own block and the block start is the entry start.

use crate::compress::CompressionType;
use crate::error::Result;
use crate::header::{LogHeader, LOG_HEADER_SIZE};
use crate::log::entry::LogEntry;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

pub struct LogWriter {
	file: File,
	compression: CompressionType,
	max_entries_per_block: u32,
	compression_block_size: u32,
	file_id: u64,
	max_key_len: u32,
	max_value_len: u32,
	put_count: u64,
	data_end: u64,
	pending: Vec<LogEntry>,
	pending_bytes: usize,
}

impl LogWriter {
	pub fn create(
		path: &Path,
		file_id: u64,
		compression: CompressionType,
		max_entries_per_block: u32,
		compression_block_size: u32,
	) -> Result<LogWriter> {
		let mut file = File::create(path)?;
		file.write_all(&[0u8; LOG_HEADER_SIZE])?;
		Ok(LogWriter {
			file,
			compression,
			max_entries_per_block: if compression.is_compressed() { max_entries_per_block.max(1) } else { 1 },
			compression_block_size,
			file_id,
			max_key_len: 0,
			max_value_len: 0,
			put_count: 0,
			data_end: LOG_HEADER_SIZE as u64,
			pending: Vec::new(),
			pending_bytes: 0,
		})
	}

	pub fn append(&mut self, entry: LogEntry) -> Result<()> {
		self.max_key_len = self.max_key_len.max(entry.key().len() as u32);
		if let LogEntry::Put { value, .. } = &entry {
			self.max_value_len = self.max_value_len.max(value.len() as u32);
			self.put_count += 1;
		}
		self.pending_bytes += entry.encoded_len();
		self.pending.push(entry);
		if self.pending.len() as u32 >= self.max_entries_per_block
			|| (self.compression_block_size > 0 && self.pending_bytes as u32 >= self.compression_block_size)
		{
			self.flush_block()?;
		}
		Ok(())
	}

	fn flush_block(&mut self) -> Result<()> {
		if self.pending.is_empty() {
			return Ok(());
		}
		let entry_count = self.pending.len();
		let mut raw = Vec::with_capacity(self.pending_bytes);
		for entry in self.pending.drain(..) {
			entry.encode(&mut raw);
		}
		self.pending_bytes = 0;

		self.file.seek(SeekFrom::Start(self.data_end))?;
		if self.compression.is_compressed() {
			let compressed = self.compression.compress(&raw)?;
			self.file.write_all(&(compressed.len() as u32).to_le_bytes())?;
			self.file.write_all(&(raw.len() as u32).to_le_bytes())?;
			self.file.write_all(&compressed)?;
			let crc = crc32fast::hash(&raw);
			self.file.write_all(&crc.to_le_bytes())?;
			log::trace!(
				target: "logindex",
				"Flushed compressed block at {}: {} entries, {} raw bytes -> {} compressed",
				self.data_end, entry_count, raw.len(), compressed.len(),
			);
			self.data_end += 4 + 4 + compressed.len() as u64 + 4;
		} else {
			self.file.write_all(&raw)?;
			self.data_end += raw.len() as u64;
		}
		Ok(())
	}

	// Flushes any pending block and writes the final header. Returns the
	// header actually written, for the builder to cross-check against.
	pub fn finish(mut self) -> Result<LogHeader> {
		self.flush_block()?;
		let header = LogHeader {
			file_id: self.file_id,
			data_end: self.data_end,
			max_key_len: self.max_key_len,
			max_value_len: self.max_value_len,
			put_count: self.put_count,
			max_entries_per_block: self.max_entries_per_block,
			compression: self.compression,
			compression_block_size: self.compression_block_size,
		};
		self.file.seek(SeekFrom::Start(0))?;
		self.file.write_all(&header.encode())?;
		self.file.sync_all()?;
		Ok(header)
	}
}
