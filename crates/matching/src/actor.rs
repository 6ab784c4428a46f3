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

//! Symbol actor: the single writer for one symbol's engine
//!
//! Each symbol runs exactly one actor task. Commands arrive through a bounded
//! inbox (enqueueing blocks the caller when the inbox is full), are dispatched
//! into the owned engine, and every resulting event is fanned out to the
//! subscriber streams and — for persistent event types — appended to the WAL.
//! The command result is sent on the caller's oneshot reply channel last.
//!
//! A WAL write failure is surfaced on the reply channel and stops fan-out for
//! that command; the actor itself keeps running.

use std::sync::{Arc, RwLock};

use flint_sdk::EngineEvent;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::engine::{EngineError, MatchingEngine};
use crate::types::{CancelOrderResult, ModifyOrderResult, OrderCommand, PlaceOrderResult};
use crate::wal::SegmentedWal;

/// Default command inbox capacity per symbol.
pub const DEFAULT_INBOX_CAPACITY: usize = 8192;

/// Per-subscriber event buffer; market data beyond this is dropped.
const SUBSCRIBER_BUFFER: usize = 1024;

/// Commands accepted by a symbol actor
///
/// Reply channels are single-use and buffered by one; a caller that abandons
/// its reply makes the actor's send a no-op.
pub enum EngineCommand {
	Place {
		order: OrderCommand,
		reply: oneshot::Sender<Result<PlaceOrderResult, EngineError>>,
	},
	Cancel {
		order_id: String,
		user_id: String,
		reply: oneshot::Sender<Result<CancelOrderResult, EngineError>>,
	},
	Modify {
		symbol: String,
		order_id: String,
		user_id: String,
		new_order_id: String,
		new_price: Option<i64>,
		new_quantity: Option<i64>,
		reply: oneshot::Sender<Result<ModifyOrderResult, EngineError>>,
	},
}

struct Subscriber {
	gateway_id: String,
	sender: mpsc::Sender<EngineEvent>,
}

type SubscriberList = Arc<RwLock<Vec<Subscriber>>>;

/// The actor task state: exclusive owner of the engine
pub struct SymbolActor {
	symbol: String,
	engine: MatchingEngine,
	wal: Arc<SegmentedWal>,
	subscribers: SubscriberList,
	inbox: mpsc::Receiver<EngineCommand>,
}

/// Cloneable handle for submitting commands and subscribing
#[derive(Clone)]
pub struct ActorHandle {
	symbol: String,
	inbox: mpsc::Sender<EngineCommand>,
	subscribers: SubscriberList,
}

impl SymbolActor {
	/// Pair an actor with its handle. The engine moves into the actor; from
	/// here on nothing else may touch it.
	pub fn new(
		engine: MatchingEngine,
		wal: Arc<SegmentedWal>,
		inbox_capacity: usize,
	) -> (Self, ActorHandle) {
		let symbol = engine.symbol().to_string();
		let (tx, rx) = mpsc::channel(inbox_capacity);
		let subscribers: SubscriberList = Arc::new(RwLock::new(Vec::new()));

		let actor = Self {
			symbol: symbol.clone(),
			engine,
			wal,
			subscribers: subscribers.clone(),
			inbox: rx,
		};
		let handle = ActorHandle {
			symbol,
			inbox: tx,
			subscribers,
		};
		(actor, handle)
	}

	/// Consume the inbox until every handle is dropped.
	pub async fn run(mut self) {
		info!(symbol = %self.symbol, "symbol actor started");

		while let Some(command) = self.inbox.recv().await {
			match command {
				EngineCommand::Place { order, reply } => {
					let outcome = match self.engine.add_order(order) {
						Ok((result, events)) => self.dispatch_events(&events).map(|_| result),
						Err(e) => Err(e),
					};
					let _ = reply.send(outcome);
				}
				EngineCommand::Cancel {
					order_id,
					user_id,
					reply,
				} => {
					let outcome = match self.engine.cancel_order(&order_id, &user_id) {
						Ok((result, events)) => self.dispatch_events(&events).map(|_| result),
						Err(e) => Err(e),
					};
					let _ = reply.send(outcome);
				}
				EngineCommand::Modify {
					symbol,
					order_id,
					user_id,
					new_order_id,
					new_price,
					new_quantity,
					reply,
				} => {
					let outcome = match self.engine.modify_order(
						&symbol,
						&order_id,
						&user_id,
						&new_order_id,
						new_price,
						new_quantity,
					) {
						Ok((result, events)) => self.dispatch_events(&events).map(|_| result),
						Err(e) => Err(e),
					};
					let _ = reply.send(outcome);
				}
			}
		}

		info!(symbol = %self.symbol, "symbol actor stopped");
	}

	/// Fan one command's events out to subscribers and the WAL, in order.
	fn dispatch_events(&self, events: &[EngineEvent]) -> Result<(), EngineError> {
		for event in events {
			self.broadcast(event);
			if event.event_type.is_persistent() {
				let bytes = event.encode()?;
				self.wal.write(&bytes)?;
			}
		}
		Ok(())
	}

	/// Best-effort delivery to every subscriber stream.
	///
	/// Market data uses drop-on-full semantics; a full buffer for a per-user
	/// event is logged. Closed streams are pruned lazily.
	fn broadcast(&self, event: &EngineEvent) {
		let senders: Vec<(String, mpsc::Sender<EngineEvent>)> = {
			let subscribers = self.subscribers.read().unwrap();
			if subscribers.is_empty() {
				return;
			}
			subscribers
				.iter()
				.map(|s| (s.gateway_id.clone(), s.sender.clone()))
				.collect()
		};

		let market_data = !event.event_type.is_persistent();
		let mut saw_closed = false;

		for (gateway_id, sender) in senders {
			match sender.try_send(event.clone()) {
				Ok(()) => {}
				Err(mpsc::error::TrySendError::Full(_)) => {
					if !market_data {
						warn!(
							symbol = %self.symbol,
							gateway_id,
							event_type = ?event.event_type,
							"subscriber buffer full, event dropped"
						);
					}
				}
				Err(mpsc::error::TrySendError::Closed(_)) => saw_closed = true,
			}
		}

		if saw_closed {
			self.prune_subscribers();
		}
	}

	fn prune_subscribers(&self) {
		let mut subscribers = self.subscribers.write().unwrap();
		subscribers.retain(|s| {
			if s.sender.is_closed() {
				info!(
					symbol = %self.symbol,
					gateway_id = %s.gateway_id,
					"subscriber stream closed, removing"
				);
				false
			} else {
				true
			}
		});
	}
}

impl ActorHandle {
	pub fn symbol(&self) -> &str {
		&self.symbol
	}

	/// Submit a PLACE command and await its result.
	///
	/// Blocks (asynchronously) while the inbox is full: that is the
	/// backpressure boundary for the symbol.
	pub async fn place_order(&self, order: OrderCommand) -> Result<PlaceOrderResult, EngineError> {
		let (reply, response) = oneshot::channel();
		self.inbox
			.send(EngineCommand::Place { order, reply })
			.await
			.map_err(|_| EngineError::Shutdown)?;
		response.await.map_err(|_| EngineError::Shutdown)?
	}

	pub async fn cancel_order(
		&self,
		order_id: &str,
		user_id: &str,
	) -> Result<CancelOrderResult, EngineError> {
		let (reply, response) = oneshot::channel();
		self.inbox
			.send(EngineCommand::Cancel {
				order_id: order_id.to_string(),
				user_id: user_id.to_string(),
				reply,
			})
			.await
			.map_err(|_| EngineError::Shutdown)?;
		response.await.map_err(|_| EngineError::Shutdown)?
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
		let (reply, response) = oneshot::channel();
		self.inbox
			.send(EngineCommand::Modify {
				symbol: symbol.to_string(),
				order_id: order_id.to_string(),
				user_id: user_id.to_string(),
				new_order_id: new_order_id.to_string(),
				new_price,
				new_quantity,
				reply,
			})
			.await
			.map_err(|_| EngineError::Shutdown)?;
		response.await.map_err(|_| EngineError::Shutdown)?
	}

	/// Open an event stream carrying every engine event for this symbol.
	///
	/// The stream ends when the caller drops it; removal from the fan-out
	/// list is eventual (detected on the next failed send).
	pub fn subscribe(&self, gateway_id: &str) -> ReceiverStream<EngineEvent> {
		let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);
		self.subscribers.write().unwrap().push(Subscriber {
			gateway_id: gateway_id.to_string(),
			sender,
		});
		info!(symbol = %self.symbol, gateway_id, "subscriber attached");
		ReceiverStream::new(receiver)
	}
}
