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

// A read-optimized hash index over an append-only key-value log.
//
// A log (log::LogWriter) accumulates PUT and DELETE entries. A
// builder::IndexBuilder then folds the whole log once into a Robin-Hood
// open-addressed hash table (engine::RobinHoodEngine) and writes it out
// as a compact slot array (slot::SlotCodec). A reader::IndexReader
// memory-maps that slot array read-only and resolves lookups by hashing
// the query key, probing the slots, and confirming candidates against the
// log through a random-access logview::LogView.
//
// The index is immutable once built: writers append to the log and, when
// ready, rebuild the index. Nothing ever mutates a slot array that a
// reader might be looking at.

pub mod builder;
pub mod compress;
pub mod display;
pub mod engine;
pub mod error;
pub mod hash;
pub mod header;
pub mod log;
pub mod logview;
pub mod options;
pub mod reader;
pub mod slot;
pub mod varint;

pub use builder::IndexBuilder;
pub use compress::CompressionType;
pub use error::{Error, Result};
pub use log::{LogEntry, LogReader, LogWriter};
pub use options::{BuilderOptions, HashType};
pub use reader::{Entry, IndexReader};
