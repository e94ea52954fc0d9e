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

// Bit-packed slot codec. A slot is hash || packed_address, widths chosen
// per index (4 or 8 bytes each) and recorded in the index header.
// packed_address == 0 is the empty-slot sentinel, which is why real log
// positions are packed as (block_offset << B) | entry_index, never as a
// raw zero-based block offset on its own. Block zero, entry zero would
// otherwise collide with "empty".

use crate::header::IndexHeader;
use std::convert::TryInto;

// A decoded slot: None for an empty slot, Some((hash, block_pos, entry_index))
// for an occupied one.
pub type Slot = Option<(u64, u64, u64)>;

pub struct SlotCodec {
	hash_size: u8,
	address_size: u8,
	entry_block_bits: u8,
}

impl SlotCodec {
	pub fn new(header: &IndexHeader) -> SlotCodec {
		SlotCodec {
			hash_size: header.hash_size,
			address_size: header.address_size,
			entry_block_bits: header.entry_block_bits,
		}
	}

	pub fn slot_size(&self) -> usize {
		self.hash_size as usize + self.address_size as usize
	}

	fn pack_address(&self, block_pos: u64, entry_index: u64) -> u64 {
		(block_pos << self.entry_block_bits) | entry_index
	}

	fn unpack_address(&self, packed: u64) -> (u64, u64) {
		let mask = (1u64 << self.entry_block_bits) - 1;
		(packed >> self.entry_block_bits, packed & mask)
	}

	// Reads the slot at buf[offset..]. buf must hold at least slot_size()
	// bytes from offset.
	pub fn read(&self, buf: &[u8], offset: usize) -> Slot {
		let hash = read_width(&buf[offset..offset + self.hash_size as usize]);
		let addr_off = offset + self.hash_size as usize;
		let packed = read_width(&buf[addr_off..addr_off + self.address_size as usize]);
		if packed == 0 {
			None
		} else {
			let (block_pos, entry_index) = self.unpack_address(packed);
			Some((hash, block_pos, entry_index))
		}
	}

	pub fn read_hash(&self, buf: &[u8], offset: usize) -> u64 {
		read_width(&buf[offset..offset + self.hash_size as usize])
	}

	pub fn is_empty(&self, buf: &[u8], offset: usize) -> bool {
		let addr_off = offset + self.hash_size as usize;
		read_width(&buf[addr_off..addr_off + self.address_size as usize]) == 0
	}

	// Writes hash and (block_pos, entry_index) into the slot at offset.
	// Passing None clears the slot (all-zero packed address).
	pub fn write(&self, buf: &mut [u8], offset: usize, slot: Slot) {
		let (hash, packed) = match slot {
			Some((hash, block_pos, entry_index)) => (hash, self.pack_address(block_pos, entry_index)),
			None => (0, 0),
		};
		write_width(&mut buf[offset..offset + self.hash_size as usize], hash);
		let addr_off = offset + self.hash_size as usize;
		write_width(&mut buf[addr_off..addr_off + self.address_size as usize], packed);
	}

	pub fn clear(&self, buf: &mut [u8], offset: usize) {
		let size = self.slot_size();
		for b in &mut buf[offset..offset + size] {
			*b = 0;
		}
	}
}

fn read_width(buf: &[u8]) -> u64 {
	match buf.len() {
		4 => u32::from_le_bytes(buf.try_into().unwrap()) as u64,
		8 => u64::from_le_bytes(buf.try_into().unwrap()),
		n => panic!("unsupported slot field width {}", n),
	}
}

fn write_width(buf: &mut [u8], value: u64) {
	match buf.len() {
		4 => buf.copy_from_slice(&(value as u32).to_le_bytes()),
		8 => buf.copy_from_slice(&value.to_le_bytes()),
		n => panic!("unsupported slot field width {}", n),
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::header::{IndexHeader, IndexStats};

	fn header(hash_size: u8, address_size: u8, entry_block_bits: u8) -> IndexHeader {
		IndexHeader {
			file_id: 1,
			data_end: 0,
			max_key_len: 0,
			max_value_len: 0,
			address_size,
			hash_size,
			capacity: 1,
			num_puts: 0,
			hash_seed: 0,
			entry_block_bits,
			stats: IndexStats::default(),
		}
	}

	#[test]
	fn empty_slot_roundtrips() {
		let codec = SlotCodec::new(&header(4, 4, 3));
		let mut buf = vec![0xffu8; codec.slot_size()];
		codec.write(&mut buf, 0, None);
		assert_eq!(codec.read(&buf, 0), None);
		assert!(codec.is_empty(&buf, 0));
	}

	#[test]
	fn occupied_slot_roundtrips_narrow() {
		let codec = SlotCodec::new(&header(4, 4, 3));
		let mut buf = vec![0u8; codec.slot_size()];
		codec.write(&mut buf, 0, Some((0x1234_5678, 900, 5)));
		assert_eq!(codec.read(&buf, 0), Some((0x1234_5678, 900, 5)));
	}

	#[test]
	fn occupied_slot_roundtrips_wide() {
		let codec = SlotCodec::new(&header(8, 8, 0));
		let mut buf = vec![0u8; codec.slot_size()];
		codec.write(&mut buf, 0, Some((u64::MAX, 1 << 40, 0)));
		assert_eq!(codec.read(&buf, 0), Some((u64::MAX, 1 << 40, 0)));
	}

	#[test]
	fn slot_size_is_sum_of_widths() {
		let codec = SlotCodec::new(&header(4, 8, 2));
		assert_eq!(codec.slot_size(), 12);
	}
}
