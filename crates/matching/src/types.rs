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

use flint_sdk::{OrderStatusEvent, OrderType, Side, TradeEvent};
use serde::{Deserialize, Serialize};

/// Current wall-clock time as unix nanoseconds.
///
/// Engine timestamps, trade ids, and depth snapshots all use this clock.
pub fn now_ns() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_nanos() as u64)
		.unwrap_or_default()
}

/// Order command received from the RPC layer
///
/// This represents an incoming order request that has been validated by the
/// RPC adapter and is ready to enter the per-symbol command pipeline. The
/// client order id serves as the idempotency key: it must be unique among the
/// symbol's live orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCommand {
	/// Client-supplied order id, unique per symbol while the order is live
	pub order_id: String,
	/// Business user that owns the order
	pub user_id: String,
	/// Symbol identifier
	pub symbol: String,
	/// Order side
	pub side: Side,
	/// Order type; market orders ignore `price`
	#[serde(rename = "type")]
	pub order_type: OrderType,
	/// Limit price in integer ticks
	pub price: i64,
	/// Total quantity
	pub quantity: i64,
	/// Unix nanoseconds stamped by the client (0 if absent)
	pub client_timestamp: u64,
	/// Unix nanoseconds stamped by the gateway (0 if absent)
	pub gateway_timestamp: u64,
}

/// Result of a PLACE command
///
/// `order` is the order's state after the command completed; `trades` are the
/// executions the incoming order participated in, in execution order.
#[derive(Debug, Clone)]
pub struct PlaceOrderResult {
	pub order: OrderStatusEvent,
	pub trades: Vec<TradeEvent>,
}

/// Result of a CANCEL command
#[derive(Debug, Clone)]
pub struct CancelOrderResult {
	pub order_id: String,
	pub order: OrderStatusEvent,
}

/// Result of a MODIFY command
///
/// `old_order_id`/`new_order_id` are populated only on the cancel-replace
/// path; an in-place reduction (or a no-op modify) keeps the original id.
#[derive(Debug, Clone)]
pub struct ModifyOrderResult {
	pub order_id: String,
	pub old_order_id: Option<String>,
	pub new_order_id: Option<String>,
}
