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

//! Downstream emitter: WAL → external bus with checkpointing
//!
//! On every tick the emitter reads the next batch of WAL records past its
//! persisted checkpoint and publishes them to the external bus, keyed by
//! symbol with a per-record decimal "sequence" header. The checkpoint file
//! advances only after the publish is acknowledged, so delivery is
//! at-least-once: a crash between publish and checkpoint redelivers, and
//! consumers must deduplicate by (symbol, sequence).

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::wal::{SegmentedWal, WalError};

/// Name of the checkpoint file inside the symbol's WAL directory.
pub const CHECKPOINT_FILE: &str = "checkpoint.meta";

/// One record handed to the external bus
#[derive(Debug, Clone)]
pub struct BusRecord {
	pub sequence: u64,
	pub payload: Vec<u8>,
}

/// Publish failure reported by a bus implementation
#[derive(Debug, Error)]
#[error("bus publish failed: {0}")]
pub struct BusError(pub String);

/// External message bus boundary
///
/// `publish` must return `Ok` only once the whole batch is acknowledged; the
/// emitter checkpoints on that signal. The choice of bus is a deployment
/// concern — anything that can ship keyed byte payloads fits.
pub trait EventBus: Send + Sync {
	fn publish(&self, symbol: &str, records: &[BusRecord]) -> Result<(), BusError>;
}

/// Errors from one emit cycle; all are retried on the next tick
#[derive(Debug, Error)]
pub enum EmitError {
	#[error(transparent)]
	Wal(#[from] WalError),
	#[error(transparent)]
	Bus(#[from] BusError),
	#[error("checkpoint i/o failure: {0}")]
	Checkpoint(#[from] std::io::Error),
}

/// Periodic WAL-to-bus forwarder for one symbol
pub struct DownstreamEmitter {
	symbol: String,
	batch_size: u64,
	emit_interval: Duration,
	wal: Arc<SegmentedWal>,
	checkpoint_path: PathBuf,
	bus: Arc<dyn EventBus>,
}

impl DownstreamEmitter {
	pub fn new(
		wal: Arc<SegmentedWal>,
		bus: Arc<dyn EventBus>,
		batch_size: u64,
		emit_interval: Duration,
	) -> Self {
		Self {
			symbol: wal.symbol().to_string(),
			batch_size,
			emit_interval,
			checkpoint_path: wal.dir().join(CHECKPOINT_FILE),
			wal,
			bus,
		}
	}

	/// Highest sequence acknowledged by the bus; 0 when no checkpoint exists.
	pub fn checkpoint(&self) -> u64 {
		match std::fs::read_to_string(&self.checkpoint_path) {
			Ok(contents) => {
				let trimmed = contents.trim();
				if trimmed.is_empty() {
					return 0;
				}
				trimmed.parse().unwrap_or_else(|_| {
					warn!(
						symbol = %self.symbol,
						value = trimmed,
						"invalid checkpoint contents, restarting from 0"
					);
					0
				})
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
			Err(e) => {
				warn!(symbol = %self.symbol, error = %e, "checkpoint read failed");
				0
			}
		}
	}

	fn save_checkpoint(&self, sequence: u64) -> Result<(), EmitError> {
		let mut file = std::fs::OpenOptions::new()
			.write(true)
			.create(true)
			.truncate(true)
			.open(&self.checkpoint_path)?;
		file.write_all(sequence.to_string().as_bytes())?;
		file.sync_all()?;
		Ok(())
	}

	/// Forward one batch. Returns the number of records published; the
	/// checkpoint moves only after the bus acknowledged the whole batch.
	pub fn process_batch(&self) -> Result<usize, EmitError> {
		let start = self.checkpoint();
		let entries = self.wal.read_range(start + 1, start + self.batch_size)?;
		if entries.is_empty() {
			return Ok(0);
		}

		let last_sequence = entries.last().map(|e| e.sequence_number).unwrap_or(start);
		let records: Vec<BusRecord> = entries
			.into_iter()
			.map(|e| BusRecord {
				sequence: e.sequence_number,
				payload: e.data,
			})
			.collect();

		self.bus.publish(&self.symbol, &records)?;

		// Publish acknowledged; safe to move the checkpoint forward.
		self.save_checkpoint(last_sequence)?;
		Ok(records.len())
	}

	/// Tick until shutdown, retrying failed batches indefinitely with the
	/// checkpoint held back.
	pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
		let mut ticker = tokio::time::interval(self.emit_interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		loop {
			tokio::select! {
				_ = ticker.tick() => {
					match self.process_batch() {
						Ok(0) => {}
						Ok(published) => {
							debug!(symbol = %self.symbol, published, "emitted wal batch");
						}
						Err(e) => {
							warn!(symbol = %self.symbol, error = %e, "emit failed, will retry");
						}
					}
				}
				changed = shutdown.changed() => {
					// A dropped sender counts as shutdown.
					if changed.is_err() || *shutdown.borrow() {
						break;
					}
				}
			}
		}
	}
}

/// In-process bus for development and tests
///
/// Records every published batch; `set_failing` simulates a broker outage so
/// checkpoint hold-back and redelivery can be exercised.
#[derive(Default)]
pub struct MemoryEventBus {
	records: Mutex<Vec<(String, u64, Vec<u8>)>>,
	failing: AtomicBool,
}

impl MemoryEventBus {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::SeqCst);
	}

	/// Sequences published for a symbol, in delivery order.
	pub fn sequences(&self, symbol: &str) -> Vec<u64> {
		self.records
			.lock()
			.unwrap()
			.iter()
			.filter(|(s, _, _)| s == symbol)
			.map(|(_, sequence, _)| *sequence)
			.collect()
	}

	/// Raw payloads published for a symbol, in delivery order.
	pub fn payloads(&self, symbol: &str) -> Vec<Vec<u8>> {
		self.records
			.lock()
			.unwrap()
			.iter()
			.filter(|(s, _, _)| s == symbol)
			.map(|(_, _, payload)| payload.clone())
			.collect()
	}
}

impl EventBus for MemoryEventBus {
	fn publish(&self, symbol: &str, records: &[BusRecord]) -> Result<(), BusError> {
		if self.failing.load(Ordering::SeqCst) {
			return Err(BusError("simulated broker outage".to_string()));
		}
		let mut stored = self.records.lock().unwrap();
		for record in records {
			stored.push((symbol.to_string(), record.sequence, record.payload.clone()));
		}
		Ok(())
	}
}
