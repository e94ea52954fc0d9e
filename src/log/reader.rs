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

// Sequential, forward-only log reader used by the builder. Feeds entries
// paired with the "logical" block position and entry-in-block index that
// the Robin-Hood engine packs into a slot address.

use crate::error::{Error, Result};
use crate::header::LogHeader;
use crate::log::entry::{EntryReader, LogEntry, SliceCursor};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

pub struct LogRecord {
	pub entry: LogEntry,
	pub block_position: u64,
	pub entry_index: u64,
}

enum Block {
	// Every entry is its own block; entry_index is always 0.
	Uncompressed,
	// A decompressed block buffer plus a cursor into it.
	Compressed { buf: Vec<u8>, cursor: usize, entry_index: u64 },
}

pub struct LogReader {
	file: File,
	header: LogHeader,
	pos: u64,
	block_start: u64,
	block: Block,
}

impl LogReader {
	pub fn open(path: &Path, header: LogHeader) -> Result<LogReader> {
		let mut file = File::open(path)?;
		let header_size = crate::header::LOG_HEADER_SIZE as u64;
		file.seek(SeekFrom::Start(header_size))?;
		let block = if header.compression.is_compressed() { Block::Compressed { buf: Vec::new(), cursor: 0, entry_index: 0 } } else { Block::Uncompressed };
		Ok(LogReader { file, header, pos: header_size, block_start: header_size, block })
	}

	pub fn next(&mut self) -> Result<Option<LogRecord>> {
		match &mut self.block {
			Block::Uncompressed => self.next_uncompressed(),
			Block::Compressed { .. } => self.next_compressed(),
		}
	}

	fn next_uncompressed(&mut self) -> Result<Option<LogRecord>> {
		if self.pos >= self.header.data_end {
			return Ok(None);
		}
		let start = self.pos;
		let mut reader = FileEntryReader { file: &mut self.file, pos: &mut self.pos, limit: self.header.data_end };
		let entry = LogEntry::decode(&mut reader)?.ok_or_else(|| Error::Corruption("Log ends mid-entry".into()))?;
		Ok(Some(LogRecord { entry, block_position: start, entry_index: 0 }))
	}

	fn next_compressed(&mut self) -> Result<Option<LogRecord>> {
		loop {
			if let Block::Compressed { buf, cursor, entry_index } = &mut self.block {
				if *cursor < buf.len() {
					let mut slice = SliceCursor::new(&buf[*cursor..]);
					if let Some(entry) = LogEntry::decode(&mut slice)? {
						let consumed = slice_position(&slice);
						*cursor += consumed;
						let record = LogRecord { entry, block_position: self.block_start, entry_index: *entry_index };
						*entry_index += 1;
						return Ok(Some(record));
					}
				}
			}
			if !self.load_next_block()? {
				return Ok(None);
			}
		}
	}

	fn load_next_block(&mut self) -> Result<bool> {
		if self.pos >= self.header.data_end {
			return Ok(false);
		}
		self.block_start = self.pos;
		let compressed_len = read_u32(&mut self.file)?;
		let uncompressed_len = read_u32(&mut self.file)?;
		let mut compressed = vec![0u8; compressed_len as usize];
		self.file.read_exact(&mut compressed)?;
		let crc_expected = read_u32(&mut self.file)?;
		self.pos += 4 + 4 + compressed_len as u64 + 4;

		let decompressed = self.header.compression.decompress(&compressed, uncompressed_len as usize)?;
		if crc32fast::hash(&decompressed) != crc_expected {
			return Err(Error::Corruption("Log block CRC-32 mismatch".into()));
		}
		log::trace!(target: "logindex", "Loaded block at {}: {} compressed bytes -> {} raw", self.block_start, compressed_len, decompressed.len());
		self.block = Block::Compressed { buf: decompressed, cursor: 0, entry_index: 0 };
		Ok(true)
	}
}

fn slice_position(cursor: &SliceCursor) -> usize {
	cursor.position()
}

fn read_u32(file: &mut File) -> Result<u32> {
	let mut buf = [0u8; 4];
	file.read_exact(&mut buf)?;
	Ok(u32::from_le_bytes(buf))
}

// Adapts a File (with a byte limit) to the EntryReader cursor interface,
// for the uncompressed case where blocks and entries coincide.
struct FileEntryReader<'a> {
	file: &'a mut File,
	pos: &'a mut u64,
	limit: u64,
}

impl<'a> EntryReader for FileEntryReader<'a> {
	fn read_byte(&mut self) -> Result<Option<u8>> {
		if *self.pos >= self.limit {
			return Ok(None);
		}
		let mut buf = [0u8; 1];
		self.file.read_exact(&mut buf)?;
		*self.pos += 1;
		Ok(Some(buf[0]))
	}

	fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
		if *self.pos + len as u64 > self.limit {
			return Err(Error::Corruption("Log entry runs past data_end".into()));
		}
		let mut buf = vec![0u8; len];
		self.file.read_exact(&mut buf)?;
		*self.pos += len as u64;
		Ok(buf)
	}

	fn at_end(&self) -> bool {
		*self.pos >= self.limit
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::compress::CompressionType;
	use crate::log::writer::LogWriter;
	use std::env;
	use std::fs;

	struct TempDir(std::path::PathBuf);

	impl TempDir {
		fn new(name: &str) -> TempDir {
			env_logger::try_init().ok();
			let mut path = env::temp_dir();
			path.push(format!("logindex-reader-test-{}-{}", name, std::process::id()));
			let _ = fs::remove_dir_all(&path);
			fs::create_dir_all(&path).unwrap();
			TempDir(path)
		}

		fn path(&self, name: &str) -> std::path::PathBuf {
			self.0.join(name)
		}
	}

	impl Drop for TempDir {
		fn drop(&mut self) {
			let _ = fs::remove_dir_all(&self.0);
		}
	}

	#[test]
	fn reports_block_position_and_entry_index_across_blocks() {
		let dir = TempDir::new("positions");
		let path = dir.path("log");
		let mut writer = LogWriter::create(&path, 1, CompressionType::Lz4, 2, 0).unwrap();
		for i in 0..5 {
			writer.append(LogEntry::Put { key: format!("k{}", i).into_bytes(), value: vec![i as u8] }).unwrap();
		}
		let header = writer.finish().unwrap();

		let mut reader = LogReader::open(&path, header).unwrap();
		let mut records = Vec::new();
		while let Some(r) = reader.next().unwrap() {
			records.push((r.block_position, r.entry_index));
		}
		assert_eq!(records.len(), 5);
		// Two entries per block: 0,1 share a block; 2,3 share the next; 4 is alone.
		assert_eq!(records[0].1, 0);
		assert_eq!(records[1].1, 1);
		assert_eq!(records[0].0, records[1].0);
		assert_ne!(records[1].0, records[2].0);
		assert_eq!(records[2].1, 0);
		assert_eq!(records[3].1, 1);
		assert_eq!(records[4].1, 0);
	}

	#[test]
	fn corrupt_crc_is_detected() {
		let dir = TempDir::new("corrupt");
		let path = dir.path("log");
		let mut writer = LogWriter::create(&path, 1, CompressionType::Lz4, 10, 0).unwrap();
		writer.append(LogEntry::Put { key: b"a".to_vec(), value: b"b".to_vec() }).unwrap();
		let header = writer.finish().unwrap();

		// Flip a byte inside the compressed payload region.
		let mut bytes = fs::read(&path).unwrap();
		let tail = bytes.len() - 1;
		bytes[tail] ^= 0xff; // corrupt the trailing CRC itself
		fs::write(&path, &bytes).unwrap();

		let mut reader = LogReader::open(&path, header).unwrap();
		match reader.next() {
			Err(Error::Corruption(_)) => {}
			other => panic!("expected corruption, got {:?}", other),
		}
	}
}
