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

//! Deterministic WAL replay
//!
//! Rebuilds engine state by applying persisted events in sequence order to an
//! empty book. Each record is decoded exactly once: envelope first, then the
//! body keyed on the envelope's event type. Replay runs before the symbol
//! actor starts, so it owns the engine exclusively; any failure here is fatal
//! for the symbol's startup.

use flint_sdk::{EngineEvent, EventError, EventType};
use thiserror::Error;
use tracing::{info, warn};

use crate::engine::MatchingEngine;
use crate::wal::{SegmentedWal, WalError};

/// Errors during log replay; all are fatal at startup
#[derive(Debug, Error)]
pub enum ReplayError {
	#[error("trade replay: order not found: {0}")]
	OrderNotFound(String),
	#[error("replay state error: {0}")]
	State(String),
	#[error(transparent)]
	Wal(#[from] WalError),
	#[error(transparent)]
	Event(#[from] EventError),
}

/// Apply one persisted event to the engine.
pub fn apply_event(engine: &mut MatchingEngine, event: &EngineEvent) -> Result<(), ReplayError> {
	match event.event_type {
		EventType::OrderAccepted => engine.replay_accept(&event.order_status_body()?),
		EventType::TradeExecuted => engine.replay_trade(&event.trade_body()?),
		EventType::OrderCancelled => engine.replay_cancel(&event.order_status_body()?),
		EventType::OrderReduced => engine.replay_reduce(&event.order_reduced_body()?),
		EventType::OrderFilled => engine.replay_filled(&event.order_status_body()?),
		// Rejected orders never touched the book.
		EventType::OrderRejected => Ok(()),
		// Partial-fill progress is reconstructed from the trade events.
		EventType::OrderPartialFilled => Ok(()),
		EventType::Depth | EventType::Ticker => {
			// Broadcast-only market data has no business being in the log.
			warn!(
				symbol = %engine.symbol(),
				event_type = ?event.event_type,
				"skipping market-data record found in wal"
			);
			Ok(())
		}
	}
}

/// Replay the entire log into an empty engine.
///
/// Returns the number of records applied. The resulting book state matches
/// the live state at the moment of the last flush.
pub fn replay_wal(engine: &mut MatchingEngine, wal: &SegmentedWal) -> Result<u64, ReplayError> {
	let entries = wal.read_from(1)?;
	let count = entries.len() as u64;

	for entry in &entries {
		let event = EngineEvent::decode(&entry.data)?;
		apply_event(engine, &event)?;
	}

	info!(symbol = %engine.symbol(), records = count, "wal replay complete");
	Ok(count)
}

#[cfg(test)]
mod tests {
	use super::*;
	use flint_sdk::{OrderType, Side};

	use crate::types::OrderCommand;

	fn limit(id: &str, user: &str, side: Side, price: i64, qty: i64) -> OrderCommand {
		OrderCommand {
			order_id: id.to_string(),
			user_id: user.to_string(),
			symbol: "BTCUSD".to_string(),
			side,
			order_type: OrderType::Limit,
			price,
			quantity: qty,
			client_timestamp: 0,
			gateway_timestamp: 0,
		}
	}

	/// Run commands on a live engine, feed its persistent events to a fresh
	/// engine, and expect identical books.
	#[test]
	fn test_replayed_events_rebuild_the_book() {
		let mut live = MatchingEngine::new("BTCUSD", 100);
		let mut persisted = Vec::new();

		let commands = vec![
			limit("s1", "alice", Side::Sell, 101, 5),
			limit("s2", "alice", Side::Sell, 102, 7),
			limit("b1", "bob", Side::Buy, 101, 3),
			limit("b2", "carol", Side::Buy, 99, 4),
		];
		for cmd in commands {
			let (_, events) = live.add_order(cmd).unwrap();
			persisted.extend(events.into_iter().filter(|e| e.event_type.is_persistent()));
		}
		let (_, events) = live.cancel_order("b2", "carol").unwrap();
		persisted.extend(events.into_iter().filter(|e| e.event_type.is_persistent()));

		let mut recovered = MatchingEngine::new("BTCUSD", 100);
		for event in &persisted {
			apply_event(&mut recovered, event).unwrap();
		}

		let live_depth = live.depth_event(100);
		let recovered_depth = recovered.depth_event(100);
		assert_eq!(live_depth.bids, recovered_depth.bids);
		assert_eq!(live_depth.asks, recovered_depth.asks);
		assert_eq!(live.total_matches(), recovered.total_matches());
		assert_eq!(live.total_volume(), recovered.total_volume());
		assert_eq!(live.trade_sequence(), recovered.trade_sequence());
		recovered.audit().unwrap();
	}

	#[test]
	fn test_trade_replay_fails_on_missing_order() {
		let mut live = MatchingEngine::new("BTCUSD", 100);
		live.add_order(limit("s1", "alice", Side::Sell, 100, 5)).unwrap();
		let (_, events) = live.add_order(limit("b1", "bob", Side::Buy, 100, 5)).unwrap();

		let trade = events
			.iter()
			.find(|e| e.event_type == EventType::TradeExecuted)
			.unwrap()
			.clone();

		// A trade with no preceding accepts cannot be applied.
		let mut recovered = MatchingEngine::new("BTCUSD", 100);
		assert!(matches!(
			apply_event(&mut recovered, &trade),
			Err(ReplayError::OrderNotFound(_))
		));
	}
}
