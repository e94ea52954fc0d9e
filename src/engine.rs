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

// Robin-Hood hash engine. Generic over the slot buffer the same way the
// on-disk entry cursor in the original value table was generic over
// AsRef/AsMut byte storage: a reader gets lookups over a read-only mmap
// slice, the builder gets the full mutating API over an owned Vec<u8>,
// and both share one probe implementation.
//
// Keys are never stored in the slot array itself, only their hash, so
// every probe that reaches a hash match has to resolve the candidate's
// actual key through the log via KeySource before it can call the slot a
// true hit.

use crate::error::{Error, Result};
use crate::slot::{Slot, SlotCodec};

// Resolves the key bytes stored at a given log position, so the engine can
// tell a genuine match from a hash collision.
pub trait KeySource {
	fn key_at(&mut self, block_pos: u64, entry_index: u64) -> Result<Vec<u8>>;
}

pub struct RobinHoodEngine<B> {
	buf: B,
	codec: SlotCodec,
	capacity: u64,
}

impl<B: AsRef<[u8]>> RobinHoodEngine<B> {
	pub fn new(buf: B, codec: SlotCodec, capacity: u64) -> RobinHoodEngine<B> {
		RobinHoodEngine { buf, codec, capacity }
	}

	pub fn capacity(&self) -> u64 {
		self.capacity
	}

	fn ideal_index(&self, hash: u64) -> u64 {
		hash % self.capacity
	}

	// How many probes past its ideal slot an entry at slot_index with hash
	// hash currently sits. Richer entries (smaller displacement) are never
	// bumped by poorer ones.
	pub fn displacement(&self, slot_index: u64, hash: u64) -> u64 {
		(slot_index + self.capacity - self.ideal_index(hash)) % self.capacity
	}

	fn offset(&self, index: u64) -> usize {
		index as usize * self.codec.slot_size()
	}

	pub fn slot_at(&self, index: u64) -> Slot {
		self.codec.read(self.buf.as_ref(), self.offset(index))
	}

	// Probes for key, resolving real keys through keys on every hash
	// match. Stops as soon as a slot's own displacement is smaller than the
	// probe distance travelled so far: no entry for this hash can live
	// further down the chain.
	pub fn lookup<K: KeySource>(&self, keys: &mut K, hash: u64, key: &[u8]) -> Result<Option<u64>> {
		let mut index = self.ideal_index(hash);
		let mut dist = 0u64;
		loop {
			match self.slot_at(index) {
				None => return Ok(None),
				Some((shash, block_pos, entry_index)) => {
					let existing_dist = self.displacement(index, shash);
					if existing_dist < dist {
						return Ok(None);
					}
					if shash == hash && keys.key_at(block_pos, entry_index)? == key {
						return Ok(Some(index));
					}
				}
			}
			index = (index + 1) % self.capacity;
			dist += 1;
			if dist > self.capacity {
				return Err(Error::Corruption("Robin-Hood probe never terminated".into()));
			}
		}
	}

	// Whether the slot array's current entry for hash is exactly the log
	// record at (block_pos, entry_index). Used by a log iterator to tell a
	// live PUT from one later overwritten or deleted. Unlike lookup, this
	// never touches the log: the candidate's own address is compared
	// directly against the caller's, so no key read is needed to disambiguate.
	pub fn is_at(&self, hash: u64, block_pos: u64, entry_index: u64) -> Result<bool> {
		let mut index = self.ideal_index(hash);
		let mut dist = 0u64;
		loop {
			match self.slot_at(index) {
				None => return Ok(false),
				Some((shash, sbp, sei)) => {
					let existing_dist = self.displacement(index, shash);
					if existing_dist < dist {
						return Ok(false);
					}
					if shash == hash && sbp == block_pos && sei == entry_index {
						return Ok(true);
					}
				}
			}
			index = (index + 1) % self.capacity;
			dist += 1;
			if dist > self.capacity {
				return Err(Error::Corruption("Robin-Hood probe never terminated".into()));
			}
		}
	}
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> RobinHoodEngine<B> {
	// Inserts or, if key is already present, updates its address in place.
	// A later PUT of the same key must not consume a second slot.
	pub fn put<K: KeySource>(&mut self, keys: &mut K, hash: u64, key: &[u8], block_pos: u64, entry_index: u64) -> Result<()> {
		if let Some(idx) = self.lookup(keys, hash, key)? {
			let off = self.offset(idx);
			self.codec.write(self.buf.as_mut(), off, Some((hash, block_pos, entry_index)));
			return Ok(());
		}
		self.insert_new(hash, block_pos, entry_index)
	}

	fn insert_new(&mut self, mut hash: u64, mut block_pos: u64, mut entry_index: u64) -> Result<()> {
		let mut index = self.ideal_index(hash);
		let mut dist = 0u64;
		loop {
			let off = self.offset(index);
			match self.codec.read(self.buf.as_ref(), off) {
				None => {
					self.codec.write(self.buf.as_mut(), off, Some((hash, block_pos, entry_index)));
					return Ok(());
				}
				Some((shash, sbp, sei)) => {
					let existing_dist = self.displacement(index, shash);
					if existing_dist < dist {
						self.codec.write(self.buf.as_mut(), off, Some((hash, block_pos, entry_index)));
						hash = shash;
						block_pos = sbp;
						entry_index = sei;
						dist = existing_dist;
					}
				}
			}
			index = (index + 1) % self.capacity;
			dist += 1;
			if dist > self.capacity {
				return Err(Error::Capacity);
			}
		}
	}

	// Removes key if present, closing the gap with a backward shift so no
	// tombstone is ever left in the slot array. Returns whether it was found.
	pub fn delete<K: KeySource>(&mut self, keys: &mut K, hash: u64, key: &[u8]) -> Result<bool> {
		let start = match self.lookup(keys, hash, key)? {
			Some(idx) => idx,
			None => return Ok(false),
		};
		let mut cur = start;
		loop {
			let next = (cur + 1) % self.capacity;
			match self.slot_at(next) {
				None => {
					self.codec.clear(self.buf.as_mut(), self.offset(cur));
					break;
				}
				Some((nhash, nbp, nei)) => {
					if self.displacement(next, nhash) == 0 {
						self.codec.clear(self.buf.as_mut(), self.offset(cur));
						break;
					}
					let off = self.offset(cur);
					self.codec.write(self.buf.as_mut(), off, Some((nhash, nbp, nei)));
					cur = next;
				}
			}
		}
		Ok(true)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::header::{IndexHeader, IndexStats};
	use std::collections::HashMap;

	struct MapKeys(HashMap<(u64, u64), Vec<u8>>);

	impl KeySource for MapKeys {
		fn key_at(&mut self, block_pos: u64, entry_index: u64) -> Result<Vec<u8>> {
			Ok(self.0.get(&(block_pos, entry_index)).cloned().unwrap_or_default())
		}
	}

	fn header(capacity: u64) -> IndexHeader {
		IndexHeader {
			file_id: 1,
			data_end: 0,
			max_key_len: 0,
			max_value_len: 0,
			address_size: 4,
			hash_size: 8,
			capacity,
			num_puts: 0,
			hash_seed: 0,
			entry_block_bits: 0,
			stats: IndexStats::default(),
		}
	}

	fn engine(capacity: u64) -> RobinHoodEngine<Vec<u8>> {
		let h = header(capacity);
		let codec = SlotCodec::new(&h);
		let buf = vec![0u8; codec.slot_size() * capacity as usize];
		RobinHoodEngine::new(buf, codec, capacity)
	}

	#[test]
	fn put_then_lookup_round_trips() {
		let mut engine = engine(11);
		let mut keys = MapKeys(HashMap::new());
		keys.0.insert((1, 0), b"alpha".to_vec());
		engine.put(&mut keys, 100, b"alpha", 1, 0).unwrap();
		let found = engine.lookup(&mut keys, 100, b"alpha").unwrap();
		assert!(found.is_some());
		assert_eq!(engine.lookup(&mut keys, 100, b"beta").unwrap(), None);
	}

	#[test]
	fn overwrite_same_key_does_not_consume_second_slot() {
		let mut engine = engine(11);
		let mut keys = MapKeys(HashMap::new());
		keys.0.insert((1, 0), b"alpha".to_vec());
		keys.0.insert((2, 0), b"alpha".to_vec());
		engine.put(&mut keys, 100, b"alpha", 1, 0).unwrap();
		engine.put(&mut keys, 100, b"alpha", 2, 0).unwrap();
		let idx = engine.lookup(&mut keys, 100, b"alpha").unwrap().unwrap();
		assert_eq!(engine.slot_at(idx), Some((100, 2, 0)));
	}

	#[test]
	fn delete_closes_gap_with_backward_shift() {
		let mut engine = engine(5);
		let mut keys = MapKeys(HashMap::new());
		// Force two keys onto the same ideal slot by giving them hashes
		// congruent mod the capacity, so the second is pushed one slot over.
		keys.0.insert((1, 0), b"a".to_vec());
		keys.0.insert((2, 0), b"b".to_vec());
		engine.put(&mut keys, 3, b"a", 1, 0).unwrap();
		engine.put(&mut keys, 3, b"b", 2, 0).unwrap();
		assert!(engine.delete(&mut keys, 3, b"a").unwrap());
		// "b" must still be reachable after the shift.
		assert!(engine.lookup(&mut keys, 3, b"b").unwrap().is_some());
		assert_eq!(engine.lookup(&mut keys, 3, b"a").unwrap(), None);
	}

	#[test]
	fn delete_missing_key_is_noop() {
		let mut engine = engine(5);
		let mut keys = MapKeys(HashMap::new());
		assert!(!engine.delete(&mut keys, 3, b"nope").unwrap());
	}

	#[test]
	fn readonly_buffer_supports_lookup_not_mutation() {
		let h = header(4);
		let codec = SlotCodec::new(&h);
		let mut owned = vec![0u8; codec.slot_size() * 4];
		{
			let mut keys = MapKeys(HashMap::new());
			keys.0.insert((1, 0), b"a".to_vec());
			let mut mutable = RobinHoodEngine::new(&mut owned[..], SlotCodec::new(&h), 4);
			mutable.put(&mut keys, 7, b"a", 1, 0).unwrap();
		}
		let mut keys = MapKeys(HashMap::new());
		keys.0.insert((1, 0), b"a".to_vec());
		let readonly: RobinHoodEngine<&[u8]> = RobinHoodEngine::new(&owned[..], codec, 4);
		assert!(readonly.lookup(&mut keys, 7, b"a").unwrap().is_some());
	}

	#[test]
	fn is_at_confirms_the_live_address_and_rejects_a_stale_one() {
		let mut engine = engine(11);
		let mut keys = MapKeys(HashMap::new());
		keys.0.insert((1, 0), b"alpha".to_vec());
		keys.0.insert((2, 0), b"alpha".to_vec());
		engine.put(&mut keys, 100, b"alpha", 1, 0).unwrap();
		assert!(engine.is_at(100, 1, 0).unwrap());
		assert!(!engine.is_at(100, 9, 0).unwrap());

		// A later overwrite moves the live address; the old one is now stale.
		engine.put(&mut keys, 100, b"alpha", 2, 0).unwrap();
		assert!(!engine.is_at(100, 1, 0).unwrap());
		assert!(engine.is_at(100, 2, 0).unwrap());
	}

	#[test]
	fn is_at_is_false_for_an_absent_hash() {
		let engine = engine(11);
		assert!(!engine.is_at(42, 0, 0).unwrap());
	}
}
