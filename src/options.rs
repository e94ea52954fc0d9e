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

// Minimum sparsity (slots per live entry) accepted by the builder. Below
// this, the Robin-Hood invariant that at least one empty slot always
// exists starts getting expensive to maintain in practice.
pub const MIN_SPARSITY: f64 = 1.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashType {
	Bit32,
	Bit64,
	// Chosen from the log's PUT count at build time: 32-bit below 2^23 puts,
	// 64-bit at or above.
	Auto,
}

#[derive(Debug, Clone, Copy)]
pub struct BuilderOptions {
	pub hash_type: HashType,
	sparsity: f64,
	pub fsync: bool,
}

impl BuilderOptions {
	pub fn new(hash_type: HashType, sparsity: f64, fsync: bool) -> BuilderOptions {
		BuilderOptions { hash_type, sparsity: sparsity.max(MIN_SPARSITY), fsync }
	}

	pub fn sparsity(&self) -> f64 {
		self.sparsity
	}
}

impl Default for BuilderOptions {
	fn default() -> BuilderOptions {
		BuilderOptions { hash_type: HashType::Auto, sparsity: MIN_SPARSITY, fsync: true }
	}
}
