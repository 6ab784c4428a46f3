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

use serde::{Deserialize, Serialize};

/// Per-symbol engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolConfig {
	/// Symbol identifier (e.g., "BTCUSD")
	pub name: String,
	/// Seed for the last-trade price before the first execution
	pub starting_price: i64,
	/// Segment rotation threshold in bytes
	pub max_wal_file_size: u64,
	/// Root directory for WAL data; each symbol gets a subdirectory
	pub wal_dir: String,
	/// Periodic WAL flush interval
	pub wal_sync_interval_ms: u64,
	/// Whether flushes also fsync
	pub wal_should_fsync: bool,
	/// Maximum records per downstream publish
	pub emitter_batch_size: u64,
	/// Downstream emitter tick interval
	pub emitter_interval_ms: u64,
}

impl Default for SymbolConfig {
	fn default() -> Self {
		Self {
			name: "BTCUSD".to_string(),
			starting_price: 0,
			max_wal_file_size: 64 * 1024 * 1024,
			wal_dir: "./wal".to_string(),
			wal_sync_interval_ms: 200,
			wal_should_fsync: false,
			emitter_batch_size: 256,
			emitter_interval_ms: 100,
		}
	}
}

/// Matching engine service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
	/// Command inbox capacity per symbol actor
	pub inbox_capacity: usize,
	/// Symbols to bring online at startup
	pub symbols: Vec<SymbolConfig>,
}

impl Default for MatchingConfig {
	fn default() -> Self {
		Self {
			inbox_capacity: crate::actor::DEFAULT_INBOX_CAPACITY,
			symbols: vec![SymbolConfig::default()],
		}
	}
}

impl MatchingConfig {
	/// Load configuration from environment variables
	pub fn from_env() -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::Environment::with_prefix("MATCHING"))
			.build()?;

		cfg.try_deserialize()
	}

	/// Load configuration from file
	pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::File::with_name(path))
			.add_source(config::Environment::with_prefix("MATCHING"))
			.build()?;

		cfg.try_deserialize()
	}
}
