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

//! Engine event envelope and bodies
//!
//! Every observable outcome of the matching engine is an [`EngineEvent`]: a
//! discriminated envelope carrying the event type, the user the event belongs
//! to (empty for market data), and the serialized body for that type.
//!
//! The envelope is encoded with bincode — it travels inside WAL records and
//! over subscriber streams as opaque bytes. Bodies are JSON so the fan-out
//! gateway can forward them to end clients without re-encoding.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{OrderStatus, OrderType, Side};

/// Errors from envelope or body encode/decode
#[derive(Debug, Error)]
pub enum EventError {
	#[error("failed to encode/decode event body: {0}")]
	Body(#[from] serde_json::Error),
	#[error("failed to encode/decode event envelope: {0}")]
	Envelope(#[from] bincode::Error),
	#[error("event type {0:?} does not carry this body")]
	WrongBody(EventType),
}

/// Discriminant for [`EngineEvent::data`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
	OrderAccepted,
	OrderPartialFilled,
	OrderFilled,
	OrderCancelled,
	OrderReduced,
	OrderRejected,
	TradeExecuted,
	Depth,
	Ticker,
}

impl EventType {
	/// Whether events of this type are written to the WAL.
	///
	/// DEPTH and TICKER are derived market data: they are streamed to
	/// subscribers but can always be recomputed from book state, so they
	/// never reach durable storage.
	pub fn is_persistent(self) -> bool {
		!matches!(self, EventType::Depth | EventType::Ticker)
	}
}

/// The discriminated event envelope
///
/// `user_id` routes per-user events at the fan-out layer; it is empty for
/// market data (DEPTH, TICKER) and for TRADE_EXECUTED, whose body names both
/// counterparties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
	pub event_type: EventType,
	pub user_id: String,
	pub data: Vec<u8>,
}

impl EngineEvent {
	pub fn new(event_type: EventType, user_id: impl Into<String>, data: Vec<u8>) -> Self {
		Self {
			event_type,
			user_id: user_id.into(),
			data,
		}
	}

	/// Encode the envelope for the wire or the WAL.
	pub fn encode(&self) -> Result<Vec<u8>, EventError> {
		Ok(bincode::serialize(self)?)
	}

	/// Decode an envelope previously produced by [`EngineEvent::encode`].
	pub fn decode(bytes: &[u8]) -> Result<Self, EventError> {
		Ok(bincode::deserialize(bytes)?)
	}

	/// Decode the body as an [`OrderStatusEvent`].
	///
	/// Valid for all ORDER_* types except ORDER_REDUCED.
	pub fn order_status_body(&self) -> Result<OrderStatusEvent, EventError> {
		match self.event_type {
			EventType::OrderAccepted
			| EventType::OrderPartialFilled
			| EventType::OrderFilled
			| EventType::OrderCancelled
			| EventType::OrderRejected => Ok(serde_json::from_slice(&self.data)?),
			other => Err(EventError::WrongBody(other)),
		}
	}

	pub fn trade_body(&self) -> Result<TradeEvent, EventError> {
		match self.event_type {
			EventType::TradeExecuted => Ok(serde_json::from_slice(&self.data)?),
			other => Err(EventError::WrongBody(other)),
		}
	}

	pub fn order_reduced_body(&self) -> Result<OrderReducedEvent, EventError> {
		match self.event_type {
			EventType::OrderReduced => Ok(serde_json::from_slice(&self.data)?),
			other => Err(EventError::WrongBody(other)),
		}
	}

	pub fn depth_body(&self) -> Result<DepthEvent, EventError> {
		match self.event_type {
			EventType::Depth => Ok(serde_json::from_slice(&self.data)?),
			other => Err(EventError::WrongBody(other)),
		}
	}

	pub fn ticker_body(&self) -> Result<TickerEvent, EventError> {
		match self.event_type {
			EventType::Ticker => Ok(serde_json::from_slice(&self.data)?),
			other => Err(EventError::WrongBody(other)),
		}
	}
}

/// Body for ORDER_ACCEPTED / ORDER_PARTIAL_FILLED / ORDER_FILLED /
/// ORDER_CANCELLED / ORDER_REJECTED
///
/// A full snapshot of the order at the moment the event was emitted. Prices
/// are integer ticks; `average_price = executed_value / filled_quantity` when
/// any quantity has filled, otherwise 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusEvent {
	pub order_id: String,
	pub user_id: String,
	pub symbol: String,
	pub status: OrderStatus,
	pub status_message: String,
	pub side: Side,
	#[serde(rename = "type")]
	pub order_type: OrderType,

	pub price: i64,
	pub executed_value: i64,
	pub average_price: i64,

	pub quantity: i64,
	pub filled_quantity: i64,
	pub remaining_quantity: i64,
	pub cancelled_quantity: i64,

	/// Unix nanoseconds; 0 when the upstream hop did not stamp the order.
	pub client_timestamp: u64,
	pub gateway_timestamp: u64,
	pub engine_timestamp: u64,
}

impl OrderStatusEvent {
	pub fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
		Ok(serde_json::to_vec(self)?)
	}
}

/// Body for TRADE_EXECUTED
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
	pub trade_id: String,
	pub symbol: String,
	pub trade_sequence: u64,
	pub price: i64,
	pub quantity: i64,

	pub buyer_id: String,
	pub seller_id: String,
	pub buy_order_id: String,
	pub sell_order_id: String,

	/// True when the resting (maker) side of the trade was the buyer.
	pub is_buyer_maker: bool,
	pub timestamp: u64,
}

impl TradeEvent {
	pub fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
		Ok(serde_json::to_vec(self)?)
	}
}

/// Body for ORDER_REDUCED
///
/// Emitted when an in-place quantity reduction leaves the order resting with
/// its time priority intact. Carries the order snapshot after the reduction
/// plus the before/after arithmetic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReducedEvent {
	pub order: OrderStatusEvent,
	pub old_quantity: i64,
	pub new_quantity: i64,
	pub old_remaining: i64,
	pub new_remaining: i64,
	pub old_cancelled: i64,
	pub new_cancelled: i64,
}

impl OrderReducedEvent {
	pub fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
		Ok(serde_json::to_vec(self)?)
	}
}

/// One side level of a DEPTH snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
	pub price: i64,
	pub order_count: u64,
	pub quantity: i64,
}

/// Body for DEPTH
///
/// Top-N levels per side in priority order (bids descending, asks ascending).
/// `sequence` increases monotonically per symbol so consumers can discard
/// stale snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthEvent {
	pub symbol: String,
	pub sequence: u64,
	pub timestamp: u64,
	pub bids: Vec<DepthLevel>,
	pub asks: Vec<DepthLevel>,
}

impl DepthEvent {
	pub fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
		Ok(serde_json::to_vec(self)?)
	}
}

/// Body for TICKER
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerEvent {
	pub symbol: String,
	pub last_price: i64,
	pub bid_price: Option<i64>,
	pub ask_price: Option<i64>,
}

impl TickerEvent {
	pub fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
		Ok(serde_json::to_vec(self)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_status() -> OrderStatusEvent {
		OrderStatusEvent {
			order_id: "o1".to_string(),
			user_id: "u1".to_string(),
			symbol: "BTCUSD".to_string(),
			status: OrderStatus::Open,
			status_message: String::new(),
			side: Side::Buy,
			order_type: OrderType::Limit,
			price: 100,
			executed_value: 0,
			average_price: 0,
			quantity: 5,
			filled_quantity: 0,
			remaining_quantity: 5,
			cancelled_quantity: 0,
			client_timestamp: 0,
			gateway_timestamp: 0,
			engine_timestamp: 1,
		}
	}

	#[test]
	fn test_envelope_round_trip() {
		let body = sample_status();
		let event = EngineEvent::new(
			EventType::OrderAccepted,
			body.user_id.clone(),
			body.to_bytes().unwrap(),
		);

		let decoded = EngineEvent::decode(&event.encode().unwrap()).unwrap();
		assert_eq!(decoded.event_type, EventType::OrderAccepted);
		assert_eq!(decoded.user_id, "u1");
		assert_eq!(decoded.order_status_body().unwrap(), body);
	}

	#[test]
	fn test_wrong_body_rejected() {
		let event = EngineEvent::new(EventType::Ticker, "", vec![]);
		assert!(matches!(
			event.trade_body(),
			Err(EventError::WrongBody(EventType::Ticker))
		));
	}

	#[test]
	fn test_market_data_is_not_persistent() {
		assert!(!EventType::Depth.is_persistent());
		assert!(!EventType::Ticker.is_persistent());
		assert!(EventType::OrderAccepted.is_persistent());
		assert!(EventType::TradeExecuted.is_persistent());
		assert!(EventType::OrderReduced.is_persistent());
	}
}
