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

// Read-only access to a built index plus its log. IndexReader::open
// verifies the two files actually belong together before trusting either.

use crate::engine::RobinHoodEngine;
use crate::error::{Error, Result};
use crate::hash;
use crate::header::{IndexHeader, LogHeader, INDEX_HEADER_SIZE, LOG_HEADER_SIZE};
use crate::logview::LogView;
use crate::slot::SlotCodec;
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

pub struct IndexReader {
	mmap: Mmap,
	header: IndexHeader,
	log_view: LogView,
	index_path: PathBuf,
	log_path: PathBuf,
}

impl IndexReader {
	pub fn open(index_path: &Path, log_path: &Path) -> Result<IndexReader> {
		let index_header = read_index_header(index_path)?;
		let log_header = read_log_header(log_path)?;

		if index_header.file_id != log_header.file_id {
			return Err(Error::Corruption("Index file does not match log file".into()));
		}
		if index_header.data_end > log_header.data_end {
			return Err(Error::Corruption("Index references data past the log's end".into()));
		}

		let file = File::open(index_path)?;
		let mmap = unsafe { Mmap::map(&file)? };
		let expected_len = INDEX_HEADER_SIZE + index_header.capacity as usize * SlotCodec::new(&index_header).slot_size();
		if mmap.len() != expected_len {
			return Err(Error::Corruption("Index file size does not match header + capacity * slot_size".into()));
		}

		let log_view = LogView::open(log_path, log_header)?;
		log::debug!(
			target: "logindex",
			"Opened index {} with {} entries, capacity {}",
			index_path.display(), index_header.stats.num_entries, index_header.capacity,
		);
		Ok(IndexReader { mmap, header: index_header, log_view, index_path: index_path.to_path_buf(), log_path: log_path.to_path_buf() })
	}

	pub fn header(&self) -> &IndexHeader {
		&self.header
	}

	// A second, independent reader over the same files, sharing the log's
	// block-decompression cache but not the index mapping. An Mmap cannot
	// be cloned; re-mmap-ing the same file is cheap and gives an equally
	// read-only view.
	pub fn duplicate(&self) -> Result<IndexReader> {
		let file = File::open(&self.index_path)?;
		let mmap = unsafe { Mmap::map(&file)? };
		Ok(IndexReader {
			mmap,
			header: self.header,
			log_view: self.log_view.duplicate(),
			index_path: self.index_path.clone(),
			log_path: self.log_path.clone(),
		})
	}

	pub fn close(self) {}

	pub fn get(&mut self, key: &[u8]) -> Result<Option<Entry>> {
		let hash = if self.header.hash_size == 4 {
			hash::hash32(self.header.hash_seed, key) as u64
		} else {
			hash::hash64(self.header.hash_seed, key)
		};
		let codec = SlotCodec::new(&self.header);
		let slots = &self.mmap[INDEX_HEADER_SIZE..];
		let engine: RobinHoodEngine<&[u8]> = RobinHoodEngine::new(slots, codec, self.header.capacity);
		let found = engine.lookup(&mut self.log_view, hash, key)?;
		let slot = match found {
			Some(idx) => engine.slot_at(idx),
			None => None,
		};
		match slot {
			Some((_, block_pos, entry_index)) => {
				self.log_view.seek_entry(block_pos, entry_index)?;
				let first = self.log_view.read_varint()?;
				if first == 0 {
					// An index slot only ever points at a PUT; a DELETE at the
					// addressed position means the index and log have diverged.
					return Err(Error::Corruption("Index slot references a DELETE tombstone".into()));
				}
				let key_len = first as usize;
				let value_len = self.log_view.read_varint()? as usize;
				self.log_view.skip(key_len)?;
				log::trace!(target: "logindex", "get({}): hit, value_len {}", crate::display::hex(key), value_len);
				Ok(Some(Entry { key_len, remaining: value_len }))
			}
			None => {
				log::trace!(target: "logindex", "get({}): miss", crate::display::hex(key));
				Ok(None)
			}
		}
	}

	// Reads up to buf.len() bytes of entry's value, advancing it. Reading
	// when entry.remaining() == 0 is Err(Error::Eof): a value stream never
	// silently returns zero bytes.
	pub fn read_value(&mut self, entry: &mut Entry, buf: &mut [u8]) -> Result<usize> {
		if entry.remaining == 0 {
			return Err(Error::Eof);
		}
		let n = buf.len().min(entry.remaining);
		let bytes = self.log_view.read_fully(n)?;
		buf[..n].copy_from_slice(&bytes);
		entry.remaining -= n;
		Ok(n)
	}

	// Reads the entire remaining value into one contiguous buffer. Rejects
	// values too large to allocate as a single Vec on this platform; the
	// streaming read_value remains available regardless.
	pub fn read_value_to_vec(&mut self, entry: &mut Entry) -> Result<Vec<u8>> {
		if entry.remaining > isize::MAX as usize {
			return Err(Error::Precondition("Value length exceeds the platform's maximum contiguous buffer size".into()));
		}
		let mut out = vec![0u8; entry.remaining];
		let mut read = 0;
		while read < out.len() {
			read += self.read_value(entry, &mut out[read..])?;
		}
		Ok(out)
	}
}

#[derive(Debug, Clone, Copy)]
pub struct Entry {
	key_len: usize,
	remaining: usize,
}

impl Entry {
	pub fn key_len(&self) -> usize {
		self.key_len
	}

	pub fn value_len(&self) -> usize {
		self.remaining
	}

	pub fn remaining(&self) -> usize {
		self.remaining
	}
}

fn read_index_header(index_path: &Path) -> Result<IndexHeader> {
	let mut file = File::open(index_path)?;
	let mut buf = [0u8; INDEX_HEADER_SIZE];
	file.read_exact(&mut buf)?;
	IndexHeader::decode(&buf)
}

fn read_log_header(log_path: &Path) -> Result<LogHeader> {
	let mut file = File::open(log_path)?;
	let mut buf = [0u8; LOG_HEADER_SIZE];
	file.read_exact(&mut buf)?;
	LogHeader::decode(&buf)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::builder::IndexBuilder;
	use crate::compress::CompressionType;
	use crate::engine::{KeySource, RobinHoodEngine};
	use crate::header::IndexStats;
	use crate::log::entry::LogEntry;
	use crate::log::reader::LogReader;
	use crate::log::writer::LogWriter;
	use crate::options::BuilderOptions;
	use crate::slot::SlotCodec;
	use std::env;
	use std::fs;
	use std::io::Write as _;

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
	fn round_trips_through_builder_and_reader() {
		let dir = TempDir::new("roundtrip");
		let log_path = dir.path("log");
		let index_path = dir.path("index");
		let mut writer = LogWriter::create(&log_path, 9, CompressionType::None, 1, 0).unwrap();
		writer.append(LogEntry::Put { key: b"a".to_vec(), value: b"1".to_vec() }).unwrap();
		writer.append(LogEntry::Put { key: b"b".to_vec(), value: b"22".to_vec() }).unwrap();
		writer.append(LogEntry::Put { key: b"a".to_vec(), value: b"3".to_vec() }).unwrap();
		writer.finish().unwrap();

		IndexBuilder::build(&log_path, &index_path, &BuilderOptions::default()).unwrap();
		let mut reader = IndexReader::open(&index_path, &log_path).unwrap();

		let mut a = reader.get(b"a").unwrap().unwrap();
		assert_eq!(reader.read_value_to_vec(&mut a).unwrap(), b"3");
		let mut b = reader.get(b"b").unwrap().unwrap();
		assert_eq!(reader.read_value_to_vec(&mut b).unwrap(), b"22");
		assert!(reader.get(b"missing").unwrap().is_none());
	}

	#[test]
	fn duplicate_gives_an_independent_cursor() {
		let dir = TempDir::new("duplicate");
		let log_path = dir.path("log");
		let index_path = dir.path("index");
		let mut writer = LogWriter::create(&log_path, 1, CompressionType::None, 1, 0).unwrap();
		writer.append(LogEntry::Put { key: b"a".to_vec(), value: b"1".to_vec() }).unwrap();
		writer.append(LogEntry::Put { key: b"b".to_vec(), value: b"2".to_vec() }).unwrap();
		writer.finish().unwrap();
		IndexBuilder::build(&log_path, &index_path, &BuilderOptions::default()).unwrap();

		let mut r1 = IndexReader::open(&index_path, &log_path).unwrap();
		let mut r2 = r1.duplicate().unwrap();
		let mut a = r1.get(b"a").unwrap().unwrap();
		let mut b = r2.get(b"b").unwrap().unwrap();
		assert_eq!(r1.read_value_to_vec(&mut a).unwrap(), b"1");
		assert_eq!(r2.read_value_to_vec(&mut b).unwrap(), b"2");
	}

	#[test]
	fn mismatched_file_id_is_rejected() {
		let dir = TempDir::new("mismatch");
		let log_path = dir.path("log");
		let index_path = dir.path("index");
		let mut writer = LogWriter::create(&log_path, 1, CompressionType::None, 1, 0).unwrap();
		writer.append(LogEntry::Put { key: b"a".to_vec(), value: b"1".to_vec() }).unwrap();
		writer.finish().unwrap();
		let header = IndexBuilder::build(&log_path, &index_path, &BuilderOptions::default()).unwrap();

		// Rebuild the header with a different file_id, corrupting the pairing.
		let mut tampered = header;
		tampered.file_id += 1;
		let mut bytes = fs::read(&index_path).unwrap();
		bytes[0..INDEX_HEADER_SIZE].copy_from_slice(&tampered.encode());
		fs::write(&index_path, bytes).unwrap();

		match IndexReader::open(&index_path, &log_path) {
			Err(Error::Corruption(_)) => {}
			other => panic!("expected corruption error, got {:?}", other),
		}
	}

	// A slot that (through index/log divergence, not normal operation) ends
	// up pointing at a DELETE tombstone must surface as corruption, never as
	// a silent "absent".
	#[test]
	fn slot_pointing_at_a_tombstone_is_corruption() {
		let dir = TempDir::new("tombstone");
		let log_path = dir.path("log");
		let index_path = dir.path("index");

		let mut writer = LogWriter::create(&log_path, 1, CompressionType::None, 1, 0).unwrap();
		writer.append(LogEntry::Put { key: b"a".to_vec(), value: b"1".to_vec() }).unwrap();
		writer.append(LogEntry::Delete { key: b"a".to_vec() }).unwrap();
		let log_header = writer.finish().unwrap();

		let mut log_reader = LogReader::open(&log_path, log_header).unwrap();
		let put_record = log_reader.next().unwrap().unwrap();
		let delete_record = log_reader.next().unwrap().unwrap();
		assert!(put_record.entry.is_put());
		assert!(!delete_record.entry.is_put());

		let index_header = IndexHeader {
			file_id: log_header.file_id,
			data_end: log_header.data_end,
			max_key_len: log_header.max_key_len,
			max_value_len: log_header.max_value_len,
			address_size: 4,
			hash_size: 8,
			capacity: 4,
			num_puts: log_header.put_count,
			hash_seed: 0,
			entry_block_bits: 0,
			stats: IndexStats::default(),
		};
		let codec = SlotCodec::new(&index_header);
		let mut buf = vec![0u8; codec.slot_size() * index_header.capacity as usize];

		struct NoKeys;
		impl KeySource for NoKeys {
			fn key_at(&mut self, _block_pos: u64, _entry_index: u64) -> Result<Vec<u8>> {
				Ok(Vec::new())
			}
		}
		let hash = crate::hash::hash64(index_header.hash_seed, b"a");
		let mut engine = RobinHoodEngine::new(&mut buf[..], SlotCodec::new(&index_header), index_header.capacity);
		// Point the index at the DELETE record's position instead of the PUT's.
		engine.put(&mut NoKeys, hash, b"a", delete_record.block_position, delete_record.entry_index).unwrap();

		let mut file = fs::File::create(&index_path).unwrap();
		file.write_all(&index_header.encode()).unwrap();
		file.write_all(&buf).unwrap();
		drop(file);

		let mut reader = IndexReader::open(&index_path, &log_path).unwrap();
		match reader.get(b"a") {
			Err(Error::Corruption(_)) => {}
			other => panic!("expected corruption, got {:?}", other),
		}
	}
}
