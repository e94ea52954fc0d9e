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

// Fixed-size, versioned header codecs for the log file (consumed) and the
// index file (owned). Both are little-endian throughout.

use crate::compress::CompressionType;
use crate::error::{Error, Result};
use std::convert::TryInto;

const LOG_MAGIC: &[u8; 8] = b"SPKLOG01";
const INDEX_MAGIC: &[u8; 8] = b"SPKIDX01";
const INDEX_VERSION: u8 = 1;

pub const LOG_HEADER_SIZE: usize = 64;
pub const INDEX_HEADER_SIZE: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogHeader {
	pub file_id: u64,
	pub data_end: u64,
	pub max_key_len: u32,
	pub max_value_len: u32,
	pub put_count: u64,
	pub max_entries_per_block: u32,
	pub compression: CompressionType,
	pub compression_block_size: u32,
}

impl LogHeader {
	pub fn encode(&self) -> [u8; LOG_HEADER_SIZE] {
		let mut buf = [0u8; LOG_HEADER_SIZE];
		let mut o = 0;
		write_bytes(&mut buf, &mut o, LOG_MAGIC);
		write_u8(&mut buf, &mut o, 1); // version
		write_u64(&mut buf, &mut o, self.file_id);
		write_u64(&mut buf, &mut o, self.data_end);
		write_u32(&mut buf, &mut o, self.max_key_len);
		write_u32(&mut buf, &mut o, self.max_value_len);
		write_u64(&mut buf, &mut o, self.put_count);
		write_u32(&mut buf, &mut o, self.max_entries_per_block);
		write_u8(&mut buf, &mut o, self.compression.as_u8());
		write_u32(&mut buf, &mut o, self.compression_block_size);
		buf
	}

	pub fn decode(buf: &[u8]) -> Result<LogHeader> {
		if buf.len() < LOG_HEADER_SIZE {
			return Err(Error::Corruption("Log header truncated".into()));
		}
		let mut o = 0;
		let magic = read_bytes8(buf, &mut o);
		if &magic != LOG_MAGIC {
			return Err(Error::Corruption("Bad log file magic".into()));
		}
		let version = read_u8(buf, &mut o);
		if version != 1 {
			return Err(Error::Corruption(format!("Unsupported log header version {}", version)));
		}
		let file_id = read_u64(buf, &mut o);
		let data_end = read_u64(buf, &mut o);
		let max_key_len = read_u32(buf, &mut o);
		let max_value_len = read_u32(buf, &mut o);
		let put_count = read_u64(buf, &mut o);
		let max_entries_per_block = read_u32(buf, &mut o);
		let compression = CompressionType::from_u8(read_u8(buf, &mut o))?;
		let compression_block_size = read_u32(buf, &mut o);
		Ok(LogHeader {
			file_id,
			data_end,
			max_key_len,
			max_value_len,
			put_count,
			max_entries_per_block,
			compression,
			compression_block_size,
		})
	}
}

// Smallest i with 2^i >= max_entries_per_block. Zero for an empty log and
// for uncompressed logs (max_entries_per_block == 1).
pub fn entry_block_bits(max_entries_per_block: u32) -> u8 {
	if max_entries_per_block <= 1 {
		return 0;
	}
	let mut bits = 0u8;
	while (1u64 << bits) < max_entries_per_block as u64 {
		bits += 1;
	}
	bits
}

// 4 bytes if the shifted address still fits in 32 bits, else 8.
pub fn address_size_for(data_end: u64, entry_block_bits: u8) -> u8 {
	let limit = 1u64 << (30u32.saturating_sub(entry_block_bits as u32));
	if data_end <= limit {
		4
	} else {
		8
	}
}

// 32 bits below 2^23 PUTs, else 64. HashType::Auto resolves here.
pub fn hash_size_for_auto(put_count: u64) -> u8 {
	if put_count < (1u64 << 23) {
		4
	} else {
		8
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexStats {
	pub total_displacement: u64,
	pub max_displacement: u32,
	pub hash_collisions: u64,
	pub num_entries: u64,
	pub key_bytes: u64,
	pub value_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
	pub file_id: u64,
	pub data_end: u64,
	pub max_key_len: u32,
	pub max_value_len: u32,
	pub address_size: u8,
	pub hash_size: u8,
	pub capacity: u64,
	pub num_puts: u64,
	pub hash_seed: u32,
	pub entry_block_bits: u8,
	pub stats: IndexStats,
}

impl IndexHeader {
	pub fn slot_size(&self) -> usize {
		self.hash_size as usize + self.address_size as usize
	}

	pub fn entry_block_mask(&self) -> u64 {
		(1u64 << self.entry_block_bits) - 1
	}

	pub fn encode(&self) -> [u8; INDEX_HEADER_SIZE] {
		let mut buf = [0u8; INDEX_HEADER_SIZE];
		let mut o = 0;
		write_bytes(&mut buf, &mut o, INDEX_MAGIC);
		write_u8(&mut buf, &mut o, INDEX_VERSION);
		write_u64(&mut buf, &mut o, self.file_id);
		write_u64(&mut buf, &mut o, self.data_end);
		write_u32(&mut buf, &mut o, self.max_key_len);
		write_u32(&mut buf, &mut o, self.max_value_len);
		write_u8(&mut buf, &mut o, self.address_size);
		write_u8(&mut buf, &mut o, self.hash_size);
		write_u64(&mut buf, &mut o, self.capacity);
		write_u64(&mut buf, &mut o, self.num_puts);
		write_u32(&mut buf, &mut o, self.hash_seed);
		write_u8(&mut buf, &mut o, self.entry_block_bits);
		write_u64(&mut buf, &mut o, self.stats.total_displacement);
		write_u32(&mut buf, &mut o, self.stats.max_displacement);
		write_u64(&mut buf, &mut o, self.stats.hash_collisions);
		write_u64(&mut buf, &mut o, self.stats.num_entries);
		write_u64(&mut buf, &mut o, self.stats.key_bytes);
		write_u64(&mut buf, &mut o, self.stats.value_bytes);
		buf
	}

	pub fn decode(buf: &[u8]) -> Result<IndexHeader> {
		if buf.len() < INDEX_HEADER_SIZE {
			return Err(Error::Corruption("Index header truncated".into()));
		}
		let mut o = 0;
		let magic = read_bytes8(buf, &mut o);
		if &magic != INDEX_MAGIC {
			return Err(Error::Corruption("Bad index file magic".into()));
		}
		let version = read_u8(buf, &mut o);
		if version != INDEX_VERSION {
			return Err(Error::Corruption(format!("Unsupported index header version {}", version)));
		}
		let file_id = read_u64(buf, &mut o);
		let data_end = read_u64(buf, &mut o);
		let max_key_len = read_u32(buf, &mut o);
		let max_value_len = read_u32(buf, &mut o);
		let address_size = read_u8(buf, &mut o);
		let hash_size = read_u8(buf, &mut o);
		if address_size != 4 && address_size != 8 {
			return Err(Error::Corruption("Bad address size in index header".into()));
		}
		if hash_size != 4 && hash_size != 8 {
			return Err(Error::Corruption("Bad hash size in index header".into()));
		}
		let capacity = read_u64(buf, &mut o);
		let num_puts = read_u64(buf, &mut o);
		let hash_seed = read_u32(buf, &mut o);
		let entry_block_bits = read_u8(buf, &mut o);
		let stats = IndexStats {
			total_displacement: read_u64(buf, &mut o),
			max_displacement: read_u32(buf, &mut o),
			hash_collisions: read_u64(buf, &mut o),
			num_entries: read_u64(buf, &mut o),
			key_bytes: read_u64(buf, &mut o),
			value_bytes: read_u64(buf, &mut o),
		};
		Ok(IndexHeader {
			file_id,
			data_end,
			max_key_len,
			max_value_len,
			address_size,
			hash_size,
			capacity,
			num_puts,
			hash_seed,
			entry_block_bits,
			stats,
		})
	}
}

fn write_bytes(buf: &mut [u8], o: &mut usize, data: &[u8]) {
	buf[*o..*o + data.len()].copy_from_slice(data);
	*o += data.len();
}

fn write_u8(buf: &mut [u8], o: &mut usize, v: u8) {
	buf[*o] = v;
	*o += 1;
}

fn write_u32(buf: &mut [u8], o: &mut usize, v: u32) {
	buf[*o..*o + 4].copy_from_slice(&v.to_le_bytes());
	*o += 4;
}

fn write_u64(buf: &mut [u8], o: &mut usize, v: u64) {
	buf[*o..*o + 8].copy_from_slice(&v.to_le_bytes());
	*o += 8;
}

fn read_bytes8(buf: &[u8], o: &mut usize) -> [u8; 8] {
	let out = buf[*o..*o + 8].try_into().unwrap();
	*o += 8;
	out
}

fn read_u8(buf: &[u8], o: &mut usize) -> u8 {
	let v = buf[*o];
	*o += 1;
	v
}

fn read_u32(buf: &[u8], o: &mut usize) -> u32 {
	let v = u32::from_le_bytes(buf[*o..*o + 4].try_into().unwrap());
	*o += 4;
	v
}

fn read_u64(buf: &[u8], o: &mut usize) -> u64 {
	let v = u64::from_le_bytes(buf[*o..*o + 8].try_into().unwrap());
	*o += 8;
	v
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn log_header_roundtrips() {
		let h = LogHeader {
			file_id: 0xdead_beef_0000_0001,
			data_end: 123456,
			max_key_len: 64,
			max_value_len: 4096,
			put_count: 9000,
			max_entries_per_block: 32,
			compression: CompressionType::Lz4,
			compression_block_size: 65536,
		};
		let buf = h.encode();
		assert_eq!(LogHeader::decode(&buf).unwrap(), h);
	}

	#[test]
	fn index_header_roundtrips() {
		let h = IndexHeader {
			file_id: 7,
			data_end: 1000,
			max_key_len: 32,
			max_value_len: 256,
			address_size: 4,
			hash_size: 4,
			capacity: 13,
			num_puts: 10,
			hash_seed: 0x1234_5678,
			entry_block_bits: 3,
			stats: IndexStats {
				total_displacement: 5,
				max_displacement: 2,
				hash_collisions: 1,
				num_entries: 10,
				key_bytes: 320,
				value_bytes: 2560,
			},
		};
		let buf = h.encode();
		assert_eq!(IndexHeader::decode(&buf).unwrap(), h);
	}

	#[test]
	fn rejects_bad_magic() {
		let buf = [0u8; INDEX_HEADER_SIZE];
		match IndexHeader::decode(&buf) {
			Err(Error::Corruption(_)) => {}
			other => panic!("expected corruption, got {:?}", other),
		}
	}

	#[test]
	fn entry_block_bits_matches_spec_examples() {
		assert_eq!(entry_block_bits(0), 0);
		assert_eq!(entry_block_bits(1), 0);
		assert_eq!(entry_block_bits(2), 1);
		assert_eq!(entry_block_bits(3), 2);
		assert_eq!(entry_block_bits(4), 2);
		assert_eq!(entry_block_bits(32), 5);
	}

	#[test]
	fn hash_size_auto_threshold() {
		assert_eq!(hash_size_for_auto((1u64 << 23) - 1), 4);
		assert_eq!(hash_size_for_auto(1u64 << 23), 8);
	}
}
