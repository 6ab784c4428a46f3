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

//! Symbol registry and per-symbol startup
//!
//! The registry owns the symbol→actor index and is the command interface an
//! RPC adapter talks to. Starting a symbol follows a fixed order: open the
//! WAL, replay it into an empty engine, start the WAL flusher, start the
//! downstream emitter, register the actor, then start the actor loop. Replay
//! failures are fatal for that symbol.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use flint_sdk::EngineEvent;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use crate::actor::{ActorHandle, SymbolActor};
use crate::config::SymbolConfig;
use crate::emitter::{DownstreamEmitter, EventBus};
use crate::engine::{EngineError, MatchingEngine};
use crate::replay::{self, ReplayError};
use crate::types::{CancelOrderResult, ModifyOrderResult, OrderCommand, PlaceOrderResult};
use crate::wal::{SegmentedWal, WalError};

/// Errors while bringing a symbol online
#[derive(Debug, Error)]
pub enum StartupError {
	#[error(transparent)]
	Wal(#[from] WalError),
	#[error("replay failed for {symbol}: {source}")]
	Replay {
		symbol: String,
		source: ReplayError,
	},
}

/// Process-owned index of running symbol actors
///
/// All actors share one downstream bus handle and one shutdown signal; each
/// owns its engine, WAL writer, flusher, and emitter.
pub struct SymbolRegistry {
	actors: DashMap<String, ActorHandle>,
	bus: Arc<dyn EventBus>,
	shutdown: watch::Sender<bool>,
	tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SymbolRegistry {
	pub fn new(bus: Arc<dyn EventBus>) -> Self {
		let (shutdown, _) = watch::channel(false);
		Self {
			actors: DashMap::new(),
			bus,
			shutdown,
			tasks: Mutex::new(Vec::new()),
		}
	}

	/// Open, recover, and start one symbol. Must run inside a tokio runtime.
	pub fn start_symbol(
		&self,
		cfg: &SymbolConfig,
		inbox_capacity: usize,
	) -> Result<ActorHandle, StartupError> {
		let wal = Arc::new(SegmentedWal::open(
			&cfg.wal_dir,
			&cfg.name,
			cfg.max_wal_file_size,
			cfg.wal_should_fsync,
			Duration::from_millis(cfg.wal_sync_interval_ms),
		)?);

		let mut engine = MatchingEngine::new(&cfg.name, cfg.starting_price);
		let replayed = replay::replay_wal(&mut engine, &wal).map_err(|source| {
			StartupError::Replay {
				symbol: cfg.name.clone(),
				source,
			}
		})?;

		let emitter = DownstreamEmitter::new(
			wal.clone(),
			self.bus.clone(),
			cfg.emitter_batch_size,
			Duration::from_millis(cfg.emitter_interval_ms),
		);

		let (actor, handle) = SymbolActor::new(engine, wal.clone(), inbox_capacity);

		let mut tasks = self.tasks.lock().unwrap();
		tasks.push(wal.spawn_flusher(self.shutdown.subscribe()));
		tasks.push(tokio::spawn(emitter.run(self.shutdown.subscribe())));

		// Register before starting the loop so the symbol is routable the
		// moment its actor begins consuming.
		self.actors.insert(cfg.name.clone(), handle.clone());
		tasks.push(tokio::spawn(actor.run()));

		info!(symbol = %cfg.name, replayed, "symbol online");
		Ok(handle)
	}

	fn actor(&self, symbol: &str) -> Result<ActorHandle, EngineError> {
		self.actors
			.get(symbol)
			.map(|entry| entry.value().clone())
			.ok_or_else(|| EngineError::UnknownSymbol(symbol.to_string()))
	}

	// ---- command interface (consumed by any RPC adapter) ----

	pub async fn place_order(&self, order: OrderCommand) -> Result<PlaceOrderResult, EngineError> {
		self.actor(&order.symbol)?.place_order(order).await
	}

	pub async fn cancel_order(
		&self,
		order_id: &str,
		user_id: &str,
		symbol: &str,
	) -> Result<CancelOrderResult, EngineError> {
		self.actor(symbol)?.cancel_order(order_id, user_id).await
	}

	#[allow(clippy::too_many_arguments)]
	pub async fn modify_order(
		&self,
		symbol: &str,
		order_id: &str,
		user_id: &str,
		new_order_id: &str,
		new_price: Option<i64>,
		new_quantity: Option<i64>,
	) -> Result<ModifyOrderResult, EngineError> {
		self.actor(symbol)?
			.modify_order(symbol, order_id, user_id, new_order_id, new_price, new_quantity)
			.await
	}

	/// Stream every engine event for a symbol until the caller disconnects.
	pub fn subscribe(
		&self,
		symbol: &str,
		gateway_id: &str,
	) -> Result<ReceiverStream<EngineEvent>, EngineError> {
		Ok(self.actor(symbol)?.subscribe(gateway_id))
	}

	pub fn symbols(&self) -> Vec<String> {
		self.actors.iter().map(|entry| entry.key().clone()).collect()
	}

	/// Signal every background task, drop the actor handles, and join.
	pub async fn shutdown(&self) {
		info!("shutting down symbol registry");
		let _ = self.shutdown.send(true);
		self.actors.clear();

		let tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
		for task in tasks {
			let _ = task.await;
		}
	}
}
