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

// Builds an index file from an existing log. The builder is the only thing
// in this crate that ever writes to the slot array; readers are strictly
// read-only.

use crate::engine::RobinHoodEngine;
use crate::error::Result;
use crate::header::{self, IndexHeader, IndexStats, LogHeader};
use crate::log::reader::LogReader;
use crate::logview::LogView;
use crate::options::{BuilderOptions, HashType};
use crate::slot::SlotCodec;
use rand::RngCore;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

pub struct IndexBuilder;

impl IndexBuilder {
	// Reads log_path's header and the log itself, builds the hash index in
	// memory, then writes it to index_path. Returns the header actually
	// written.
	pub fn build(log_path: &Path, index_path: &Path, options: &BuilderOptions) -> Result<IndexHeader> {
		let log_header = read_log_header(log_path)?;

		let entry_block_bits = header::entry_block_bits(log_header.max_entries_per_block);
		let address_size = header::address_size_for(log_header.data_end, entry_block_bits);
		let hash_size = match options.hash_type {
			HashType::Bit32 => 4,
			HashType::Bit64 => 8,
			HashType::Auto => header::hash_size_for_auto(log_header.put_count),
		};
		// Capacity must be at least ceil(num_puts * sparsity) with at least
		// one empty slot; rounding up (not down) is what actually guarantees
		// that for small put counts (a single PUT at the 1.3 floor, floor()
		// would leave capacity == put_count with no empty slot at all). The
		// low bit is forced to 1 so capacity is always odd, spreading hashes
		// more evenly across the slot array.
		let capacity = 1 | (log_header.put_count as f64 * options.sparsity()).ceil() as u64;

		let mut seed_bytes = [0u8; 4];
		rand::thread_rng().fill_bytes(&mut seed_bytes);
		let hash_seed = u32::from_le_bytes(seed_bytes);

		let mut index_header = IndexHeader {
			file_id: log_header.file_id,
			data_end: log_header.data_end,
			max_key_len: log_header.max_key_len,
			max_value_len: log_header.max_value_len,
			address_size,
			hash_size,
			capacity,
			num_puts: log_header.put_count,
			hash_seed,
			entry_block_bits,
			stats: IndexStats::default(),
		};

		log::debug!(
			target: "logindex",
			"Building index for log {}: {} puts, capacity {}, address_size {}, hash_size {}, entry_block_bits {}",
			log_header.file_id, log_header.put_count, capacity, address_size, hash_size, entry_block_bits,
		);

		let codec = SlotCodec::new(&index_header);
		let mut buf = vec![0u8; codec.slot_size() * capacity as usize];
		let mut key_bytes = 0u64;
		let mut value_bytes = 0u64;

		{
			let mut log_reader = LogReader::open(log_path, log_header)?;
			let mut keys = LogView::open(log_path, log_header)?;
			let mut engine = RobinHoodEngine::new(&mut buf[..], SlotCodec::new(&index_header), capacity);

			while let Some(record) = log_reader.next()? {
				match &record.entry {
					crate::log::LogEntry::Put { key, value } => {
						let hash = pick_hash(hash_size, hash_seed, key);
						engine.put(&mut keys, hash, key, record.block_position, record.entry_index)?;
						key_bytes += key.len() as u64;
						value_bytes += value.len() as u64;
					}
					crate::log::LogEntry::Delete { key } => {
						let hash = pick_hash(hash_size, hash_seed, key);
						engine.delete(&mut keys, hash, key)?;
					}
				}
			}

			let stats = scan_stats(&engine, capacity);
			index_header.stats = IndexStats { key_bytes, value_bytes, ..stats };
		}

		log::info!(
			target: "logindex",
			"Built index {}: {} live entries, max_displacement {}, {} hash collisions",
			index_path.display(), index_header.stats.num_entries, index_header.stats.max_displacement, index_header.stats.hash_collisions,
		);

		write_index_file(index_path, &index_header, &buf, options.fsync)?;
		Ok(index_header)
	}
}

fn pick_hash(hash_size: u8, seed: u32, key: &[u8]) -> u64 {
	if hash_size == 4 {
		crate::hash::hash32(seed, key) as u64
	} else {
		crate::hash::hash64(seed, key)
	}
}

fn read_log_header(log_path: &Path) -> Result<LogHeader> {
	let mut file = File::open(log_path)?;
	let mut buf = [0u8; crate::header::LOG_HEADER_SIZE];
	file.read_exact(&mut buf)?;
	LogHeader::decode(&buf)
}

// Single forward pass over the slot array: accumulates displacement stats,
// and counts a hash collision for each pair of adjacent non-empty slots
// sharing a hash, plus one more if the first and last slots are both
// non-empty with equal hashes (ring adjacency). This is deliberately not a
// global "how many slots share this hash" tally. Two slots that land on the
// same hash but are separated by an unrelated entry do not count.
fn scan_stats<B: AsRef<[u8]>>(engine: &RobinHoodEngine<B>, capacity: u64) -> IndexStats {
	let mut total_displacement = 0u64;
	let mut max_displacement = 0u32;
	let mut num_entries = 0u64;
	let mut hash_collisions = 0u64;
	let mut prev: Option<u64> = None;

	for index in 0..capacity {
		if let Some((hash, _, _)) = engine.slot_at(index) {
			let disp = engine.displacement(index, hash);
			total_displacement += disp;
			max_displacement = max_displacement.max(disp as u32);
			num_entries += 1;
			if prev == Some(hash) {
				hash_collisions += 1;
			}
			prev = Some(hash);
		} else {
			prev = None;
		}
	}
	if capacity > 1 {
		if let (Some((first_hash, _, _)), Some((last_hash, _, _))) = (engine.slot_at(0), engine.slot_at(capacity - 1)) {
			if first_hash == last_hash {
				hash_collisions += 1;
			}
		}
	}

	IndexStats { total_displacement, max_displacement, hash_collisions, num_entries, key_bytes: 0, value_bytes: 0 }
}

fn write_index_file(index_path: &Path, header: &IndexHeader, buf: &[u8], fsync: bool) -> Result<()> {
	let mut file = File::create(index_path)?;
	file.write_all(&header.encode())?;
	file.write_all(buf)?;
	if fsync {
		file.sync_all()?;
	}
	Ok(())
}
