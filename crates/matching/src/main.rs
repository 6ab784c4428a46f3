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

//! Matching engine service entry point
//!
//! Loads configuration, initializes logging, recovers and starts every
//! configured symbol, then waits for ctrl-c.

use std::sync::Arc;

use anyhow::Context;
use flint_matching::{MatchingConfig, MemoryEventBus, SymbolRegistry, logging};
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	dotenv::dotenv().ok();
	logging::init_logging()?;

	let cfg = match std::env::var("MATCHING_CONFIG") {
		Ok(path) => MatchingConfig::from_file(&path)
			.with_context(|| format!("failed to load config from {path}"))?,
		Err(_) => MatchingConfig::from_env().context("failed to load config from environment")?,
	};

	// The production bus adapter is wired at deployment; the in-process bus
	// keeps the service runnable stand-alone.
	let registry = SymbolRegistry::new(Arc::new(MemoryEventBus::new()));

	for symbol in &cfg.symbols {
		registry
			.start_symbol(symbol, cfg.inbox_capacity)
			.with_context(|| format!("failed to start symbol {}", symbol.name))?;
	}
	info!(symbols = cfg.symbols.len(), "matching engine started");

	signal::ctrl_c().await?;
	info!("shutdown signal received");
	registry.shutdown().await;

	Ok(())
}
