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

use crate::error::{Error, Result};
use std::io::{Read, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
	None,
	Lz4,
	Zstd,
	Snappy,
}

impl CompressionType {
	pub fn from_u8(v: u8) -> Result<CompressionType> {
		match v {
			0 => Ok(CompressionType::None),
			1 => Ok(CompressionType::Lz4),
			2 => Ok(CompressionType::Zstd),
			3 => Ok(CompressionType::Snappy),
			_ => Err(Error::Corruption("Unknown compression type".into())),
		}
	}

	pub fn as_u8(&self) -> u8 {
		match self {
			CompressionType::None => 0,
			CompressionType::Lz4 => 1,
			CompressionType::Zstd => 2,
			CompressionType::Snappy => 3,
		}
	}

	pub fn is_compressed(&self) -> bool {
		!matches!(self, CompressionType::None)
	}

	pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
		match self {
			CompressionType::None => Ok(data.to_vec()),
			CompressionType::Lz4 => {
				let mut encoder = lz4::EncoderBuilder::new().build(Vec::new())?;
				encoder.write_all(data)?;
				let (buf, result) = encoder.finish();
				result?;
				Ok(buf)
			}
			CompressionType::Zstd => Ok(zstd::stream::encode_all(data, 0)?),
			CompressionType::Snappy => {
				let mut encoder = snap::write::FrameEncoder::new(Vec::new());
				encoder.write_all(data)?;
				encoder
					.into_inner()
					.map_err(|e| Error::Corruption(format!("snappy encode: {}", e)))
			}
		}
	}

	pub fn decompress(&self, data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
		match self {
			CompressionType::None => Ok(data.to_vec()),
			CompressionType::Lz4 => {
				let mut decoder = lz4::Decoder::new(data)?;
				let mut out = Vec::with_capacity(expected_len);
				decoder.read_to_end(&mut out)?;
				Ok(out)
			}
			CompressionType::Zstd => {
				let mut out = Vec::with_capacity(expected_len);
				zstd::stream::copy_decode(data, &mut out)?;
				Ok(out)
			}
			CompressionType::Snappy => {
				let mut decoder = snap::read::FrameDecoder::new(data);
				let mut out = Vec::with_capacity(expected_len);
				decoder.read_to_end(&mut out)?;
				Ok(out)
			}
		}
	}
}
