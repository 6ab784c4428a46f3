// Copyright 2025 flintworks
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Segmented write-ahead log, one directory per symbol
//!
//! Segments are files named `{N}.log` with the current writable segment being
//! the largest N. Each record is a `u32` little-endian length prefix followed
//! by a bincode-encoded [`WalEntry`]; the CRC-32 (IEEE) covers the payload
//! bytes concatenated with the little-endian sequence number.
//!
//! Writes are buffered: a successful write means the record is in the
//! writer's buffer, and becomes durable at the next flush (plus fsync when
//! enabled). The background flusher bounds the durability lag to the
//! configured flush interval. Readers (replay, the downstream emitter) open
//! the segment files independently and therefore only observe flushed data.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Errors from WAL writes, flushes, and reads
#[derive(Debug, Error)]
pub enum WalError {
	#[error("wal i/o failure: {0}")]
	Io(#[from] std::io::Error),
	#[error("wal record {sequence} failed crc validation")]
	CrcMismatch { sequence: u64 },
	#[error("truncated wal frame in segment {segment}")]
	TruncatedFrame { segment: String },
	#[error("wal frame decode failed: {0}")]
	Decode(#[from] bincode::Error),
	#[error("invalid wal segment name: {0}")]
	InvalidSegmentName(String),
	#[error("invalid wal read range: {from} > {to}")]
	InvalidRange { from: u64, to: u64 },
}

/// One durable WAL record
///
/// `data` is an opaque serialized event envelope; the WAL neither inspects
/// nor interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
	pub sequence_number: u64,
	pub data: Vec<u8>,
	pub crc: u32,
}

/// Borrowed twin of [`WalEntry`] for the write path (same wire encoding).
#[derive(Serialize)]
struct WalEntryRef<'a> {
	sequence_number: u64,
	data: &'a [u8],
	crc: u32,
}

/// CRC-32 (IEEE) over `data || sequence_le_u64`.
fn entry_crc(data: &[u8], sequence: u64) -> u32 {
	let mut hasher = crc32fast::Hasher::new();
	hasher.update(data);
	hasher.update(&sequence.to_le_bytes());
	hasher.finalize()
}

struct WalWriter {
	file: BufWriter<File>,
	/// Bytes in the current segment, on disk plus buffered.
	segment_bytes: u64,
	segment_index: u64,
	next_offset: u64,
}

/// Append-only segmented log for one symbol
///
/// The writer state is guarded by a short-held mutex so the owning actor and
/// the background flusher can share the handle; readers never take the lock.
pub struct SegmentedWal {
	dir_path: PathBuf,
	symbol: String,
	max_file_size: u64,
	should_fsync: bool,
	flush_interval: Duration,
	writer: Mutex<WalWriter>,
}

impl SegmentedWal {
	/// Open (or create) the WAL directory for `symbol` under `dir`.
	///
	/// Scans the segment indices, opens the highest for append, and scans its
	/// tail to discover the last persisted sequence number; writes continue
	/// at `last + 1`. A fresh directory gets a seed segment `0.log` and
	/// sequence numbers start at 1.
	pub fn open(
		dir: impl AsRef<Path>,
		symbol: &str,
		max_file_size: u64,
		should_fsync: bool,
		flush_interval: Duration,
	) -> Result<Self, WalError> {
		let dir_path = dir.as_ref().join(symbol);
		fs::create_dir_all(&dir_path)?;

		let segments = sorted_segments(&dir_path)?;
		let segment_index = segments.last().map(|(index, _)| *index).unwrap_or(0);
		let path = dir_path.join(format!("{segment_index}.log"));
		if segments.is_empty() {
			File::create(&path)?;
			debug!(symbol, path = %path.display(), "seeded fresh wal segment");
		}

		// Crash between rotation and first append can leave the newest
		// segment empty; fall back to older segments for the tail scan.
		let mut last_sequence = 0;
		for (_, segment_path) in segments.iter().rev() {
			if let Some(sequence) = scan_last_sequence(segment_path)? {
				last_sequence = sequence;
				break;
			}
		}

		let file = OpenOptions::new().append(true).create(true).open(&path)?;
		let segment_bytes = file.metadata()?.len();

		info!(
			symbol,
			segment = segment_index,
			last_sequence,
			"opened wal"
		);

		Ok(Self {
			dir_path,
			symbol: symbol.to_string(),
			max_file_size,
			should_fsync,
			flush_interval,
			writer: Mutex::new(WalWriter {
				file: BufWriter::new(file),
				segment_bytes,
				segment_index,
				next_offset: last_sequence + 1,
			}),
		})
	}

	pub fn symbol(&self) -> &str {
		&self.symbol
	}

	/// Directory holding this symbol's segments (and its checkpoint file).
	pub fn dir(&self) -> &Path {
		&self.dir_path
	}

	/// Sequence number of the last buffered record (0 when none yet).
	pub fn last_sequence(&self) -> u64 {
		self.writer.lock().unwrap().next_offset - 1
	}

	/// Append one record and return its assigned sequence number.
	///
	/// Success means the record is buffered; durability follows the flush
	/// contract described at module level.
	pub fn write(&self, data: &[u8]) -> Result<u64, WalError> {
		let mut writer = self.writer.lock().unwrap();
		self.rotate_if_needed(&mut writer)?;

		let sequence = writer.next_offset;
		let frame = bincode::serialize(&WalEntryRef {
			sequence_number: sequence,
			data,
			crc: entry_crc(data, sequence),
		})?;

		writer.file.write_all(&(frame.len() as u32).to_le_bytes())?;
		writer.file.write_all(&frame)?;
		writer.segment_bytes += 4 + frame.len() as u64;
		writer.next_offset += 1;
		Ok(sequence)
	}

	/// Drain the write buffer to the OS, fsyncing when configured.
	pub fn flush(&self) -> Result<(), WalError> {
		let mut writer = self.writer.lock().unwrap();
		Self::flush_writer(&mut writer, self.should_fsync)
	}

	fn flush_writer(writer: &mut WalWriter, should_fsync: bool) -> Result<(), WalError> {
		writer.file.flush()?;
		if should_fsync {
			writer.file.get_ref().sync_data()?;
		}
		Ok(())
	}

	fn rotate_if_needed(&self, writer: &mut WalWriter) -> Result<(), WalError> {
		if writer.segment_bytes < self.max_file_size {
			return Ok(());
		}

		Self::flush_writer(writer, self.should_fsync)?;

		let next_index = writer.segment_index + 1;
		let path = self.dir_path.join(format!("{next_index}.log"));
		let file = OpenOptions::new().append(true).create(true).open(&path)?;

		info!(
			symbol = %self.symbol,
			segment = next_index,
			"rotated wal segment"
		);

		writer.file = BufWriter::new(file);
		writer.segment_index = next_index;
		writer.segment_bytes = 0;
		Ok(())
	}

	/// Read all records with `from <= sequence <= to`, in order, across
	/// segment boundaries. Fails on any CRC mismatch or truncated frame.
	pub fn read_range(&self, from: u64, to: u64) -> Result<Vec<WalEntry>, WalError> {
		if from > to {
			return Err(WalError::InvalidRange { from, to });
		}

		let mut results = Vec::new();
		for (_, path) in sorted_segments(&self.dir_path)? {
			let segment = path
				.file_name()
				.map(|n| n.to_string_lossy().into_owned())
				.unwrap_or_default();
			let mut reader = BufReader::new(File::open(&path)?);

			while let Some(entry) = read_frame(&mut reader, &segment)? {
				if entry.sequence_number < from {
					continue;
				}
				if entry.sequence_number > to {
					return Ok(results);
				}
				results.push(entry);
			}
		}
		Ok(results)
	}

	/// Read all records with `sequence >= from`.
	pub fn read_from(&self, from: u64) -> Result<Vec<WalEntry>, WalError> {
		self.read_range(from, u64::MAX)
	}

	/// Start the periodic flusher task. It flushes every `flush_interval`
	/// until the shutdown signal flips, then performs a final flush.
	pub fn spawn_flusher(
		self: &Arc<Self>,
		mut shutdown: watch::Receiver<bool>,
	) -> tokio::task::JoinHandle<()> {
		let wal = Arc::clone(self);
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(wal.flush_interval);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			loop {
				tokio::select! {
					_ = ticker.tick() => {
						if let Err(e) = wal.flush() {
							error!(symbol = %wal.symbol, error = %e, "periodic wal flush failed");
						}
					}
					changed = shutdown.changed() => {
						// A dropped sender counts as shutdown.
						if changed.is_err() || *shutdown.borrow() {
							if let Err(e) = wal.flush() {
								error!(symbol = %wal.symbol, error = %e, "final wal flush failed");
							}
							break;
						}
					}
				}
			}
		})
	}
}

/// Segment files in the directory, sorted by numeric index.
fn sorted_segments(dir: &Path) -> Result<Vec<(u64, PathBuf)>, WalError> {
	let mut segments = Vec::new();
	for entry in fs::read_dir(dir)? {
		let entry = entry?;
		if !entry.file_type()?.is_file() {
			continue;
		}
		let name = entry.file_name().to_string_lossy().into_owned();
		let Some(stem) = name.strip_suffix(".log") else {
			continue;
		};
		let index = stem
			.parse::<u64>()
			.map_err(|_| WalError::InvalidSegmentName(name.clone()))?;
		segments.push((index, entry.path()));
	}
	segments.sort_by_key(|(index, _)| *index);
	Ok(segments)
}

/// Last sequence number recorded in one segment, or `None` when it is empty.
fn scan_last_sequence(path: &Path) -> Result<Option<u64>, WalError> {
	let segment = path
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_default();
	let mut reader = BufReader::new(File::open(path)?);
	let mut last = None;
	while let Some(entry) = read_frame(&mut reader, &segment)? {
		last = Some(entry.sequence_number);
	}
	Ok(last)
}

/// Read one length-prefixed frame; `None` at a clean end of file.
fn read_frame(reader: &mut impl Read, segment: &str) -> Result<Option<WalEntry>, WalError> {
	let mut len_buf = [0u8; 4];
	let mut filled = 0;
	while filled < len_buf.len() {
		let n = reader.read(&mut len_buf[filled..])?;
		if n == 0 {
			if filled == 0 {
				return Ok(None);
			}
			return Err(WalError::TruncatedFrame {
				segment: segment.to_string(),
			});
		}
		filled += n;
	}

	let len = u32::from_le_bytes(len_buf) as usize;
	if len == 0 {
		return Err(WalError::TruncatedFrame {
			segment: segment.to_string(),
		});
	}

	let mut frame = vec![0u8; len];
	reader.read_exact(&mut frame).map_err(|e| {
		if e.kind() == std::io::ErrorKind::UnexpectedEof {
			WalError::TruncatedFrame {
				segment: segment.to_string(),
			}
		} else {
			WalError::Io(e)
		}
	})?;

	let entry: WalEntry = bincode::deserialize(&frame)?;
	if entry_crc(&entry.data, entry.sequence_number) != entry.crc {
		return Err(WalError::CrcMismatch {
			sequence: entry.sequence_number,
		});
	}
	Ok(Some(entry))
}
