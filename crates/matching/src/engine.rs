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

//! Per-symbol matching engine
//!
//! The engine owns both book sides and the live-order index and executes the
//! three commands (place, cancel, modify) under single-writer discipline: it
//! is owned by exactly one symbol actor and nothing else mutates it. Matching
//! applies strict price-time priority and never suspends.
//!
//! Every command returns its result together with the list of engine events
//! it produced; the event list is the authoritative description of what
//! happened and is what the actor persists and fans out.

use std::collections::HashMap;

use flint_sdk::{
	DepthEvent, EngineEvent, EventError, EventType, OrderStatus, OrderStatusEvent, OrderType,
	OrderReducedEvent, Side, TickerEvent, TradeEvent,
};
use thiserror::Error;
use tracing::debug;

use crate::book::{Book, BookError, BookOrder, OrderKey};
use crate::replay::ReplayError;
use crate::types::{CancelOrderResult, ModifyOrderResult, OrderCommand, PlaceOrderResult, now_ns};
use crate::wal::WalError;

/// Depth snapshots carry the top N levels per side.
pub const DEPTH_LEVELS: usize = 100;

/// Errors surfaced by the per-symbol command pipeline
///
/// Validation variants are returned to the caller and produce no events
/// (a market order finding no liquidity is not an error: it produces an
/// ORDER_REJECTED event instead). `Book` variants indicate an engine bug and
/// are treated as hard errors.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("duplicate order id: {0}")]
	DuplicateId(String),
	#[error("order not found: {0}")]
	OrderNotFound(String),
	#[error("unauthorized: order {0} belongs to another user")]
	Unauthorized(String),
	#[error("symbol mismatch: order {order_id} belongs to {expected}")]
	SymbolMismatch { order_id: String, expected: String },
	#[error("order not modifiable: {0}")]
	OrderNotModifiable(String),
	#[error("order already completed: {0}")]
	AlreadyCompleted(String),
	#[error("invalid quantity: {new_quantity} is below executed quantity {executed}")]
	InvalidQuantity { new_quantity: i64, executed: i64 },
	#[error("unknown symbol: {0}")]
	UnknownSymbol(String),
	#[error(transparent)]
	Book(#[from] BookError),
	#[error(transparent)]
	Wal(#[from] WalError),
	#[error(transparent)]
	Event(#[from] EventError),
	#[error("engine shut down")]
	Shutdown,
}

/// Execution state carried from a cancelled order onto its replacement
struct CarriedExecution {
	filled_quantity: i64,
	cancelled_quantity: i64,
	executed_value: i64,
	average_price: i64,
}

/// The per-symbol matching engine
pub struct MatchingEngine {
	symbol: String,
	book: Book,
	/// Live (resting) orders by client order id.
	index: HashMap<String, OrderKey>,

	trade_sequence: u64,
	total_matches: u64,
	total_volume: u64,
	last_trade_price: i64,
}

impl MatchingEngine {
	/// Create an empty engine. `starting_price` seeds the last-trade price
	/// until the first execution.
	pub fn new(symbol: impl Into<String>, starting_price: i64) -> Self {
		Self {
			symbol: symbol.into(),
			book: Book::new(),
			index: HashMap::new(),
			trade_sequence: 0,
			total_matches: 0,
			total_volume: 0,
			last_trade_price: starting_price,
		}
	}

	pub fn symbol(&self) -> &str {
		&self.symbol
	}

	// ---- commands ----

	/// PLACE: match an incoming order against the book, resting any limit
	/// remainder. Returns the result plus the full event list, ending with
	/// the derived market data (one TICKER per trade, then a DEPTH snapshot).
	pub fn add_order(
		&mut self,
		cmd: OrderCommand,
	) -> Result<(PlaceOrderResult, Vec<EngineEvent>), EngineError> {
		let (result, mut events) = self.apply_add(cmd, None)?;
		self.append_market_data(&mut events, &result.trades)?;
		Ok((result, events))
	}

	/// CANCEL: remove a live order, crediting its remainder to the cancelled
	/// quantity.
	pub fn cancel_order(
		&mut self,
		order_id: &str,
		user_id: &str,
	) -> Result<(CancelOrderResult, Vec<EngineEvent>), EngineError> {
		let (result, mut events) = self.apply_cancel(order_id, user_id, "cancelled by user")?;
		self.append_market_data(&mut events, &[])?;
		Ok((result, events))
	}

	/// MODIFY: reduce in place when only the quantity shrinks (time priority
	/// preserved), otherwise cancel-replace under a new order id (priority
	/// reset). A modify that changes nothing is a no-op with no events.
	pub fn modify_order(
		&mut self,
		symbol: &str,
		order_id: &str,
		user_id: &str,
		new_order_id: &str,
		new_price: Option<i64>,
		new_quantity: Option<i64>,
	) -> Result<(ModifyOrderResult, Vec<EngineEvent>), EngineError> {
		let key = *self
			.index
			.get(order_id)
			.ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;

		let order = self.book.order(key);
		if order.user_id != user_id {
			return Err(EngineError::Unauthorized(order_id.to_string()));
		}
		if order.symbol != symbol {
			return Err(EngineError::SymbolMismatch {
				order_id: order_id.to_string(),
				expected: order.symbol.clone(),
			});
		}
		if order.status.is_terminal() {
			return Err(EngineError::OrderNotModifiable(order_id.to_string()));
		}

		let executed = order.quantity - order.remaining_quantity;
		if let Some(new_quantity) = new_quantity
			&& new_quantity < executed
		{
			return Err(EngineError::InvalidQuantity {
				new_quantity,
				executed,
			});
		}

		let old_remaining = order.remaining_quantity;
		let new_remaining = new_quantity
			.map(|q| q - executed)
			.unwrap_or(old_remaining);
		let price_changed = new_price.is_some_and(|p| p != order.price);
		let qty_reduced = new_remaining < old_remaining && !price_changed;
		let qty_increased = new_remaining > old_remaining;

		if price_changed || qty_increased {
			let (result, mut events, trades) =
				self.replace_order(key, order_id, user_id, new_order_id, new_price, new_quantity)?;
			self.append_market_data(&mut events, &trades)?;
			return Ok((result, events));
		}

		if qty_reduced {
			let (result, mut events) = self.reduce_order(key, order_id, user_id, new_remaining)?;
			self.append_market_data(&mut events, &[])?;
			return Ok((result, events));
		}

		// Nothing to change.
		Ok((
			ModifyOrderResult {
				order_id: order_id.to_string(),
				old_order_id: None,
				new_order_id: None,
			},
			Vec::new(),
		))
	}

	// ---- place internals ----

	fn apply_add(
		&mut self,
		cmd: OrderCommand,
		carried: Option<CarriedExecution>,
	) -> Result<(PlaceOrderResult, Vec<EngineEvent>), EngineError> {
		if self.index.contains_key(&cmd.order_id) {
			return Err(EngineError::DuplicateId(cmd.order_id));
		}

		let mut order = BookOrder::from_command(&cmd, now_ns());
		if let Some(carried) = carried {
			order.filled_quantity = carried.filled_quantity;
			order.cancelled_quantity = carried.cancelled_quantity;
			order.remaining_quantity =
				order.quantity - carried.filled_quantity - carried.cancelled_quantity;
			order.executed_value = carried.executed_value;
			order.average_price = carried.average_price;
		}

		let opposite = order.side.opposite();
		if order.order_type == OrderType::Market && self.book.side_is_empty(opposite) {
			order.status = OrderStatus::Rejected;
			order.status_message = "market order rejected: no liquidity".to_string();
			let snapshot = order.status_event();
			let events = vec![order_event(EventType::OrderRejected, &snapshot)?];
			return Ok((
				PlaceOrderResult {
					order: snapshot,
					trades: Vec::new(),
				},
				events,
			));
		}

		// The accepted event records the order as it stood before matching:
		// always OPEN, with any carried execution visible in the quantities.
		// Replaying it and the trades that follow reproduces the fills.
		order.status = OrderStatus::Open;
		let accept_snapshot = order.status_event();

		let side = order.side;
		let price = order.price;
		let key = self.book.insert_order(order);
		let trades = self.match_incoming(key)?;

		let rested = {
			let order = self.book.order_mut(key);
			if order.remaining_quantity == 0 {
				order.status = OrderStatus::Filled;
				false
			} else if order.order_type == OrderType::Market {
				// A market order never rests; whatever the sweep left over
				// is cancelled.
				order.status = OrderStatus::Cancelled;
				order.status_message = "market remainder cancelled".to_string();
				order.cancelled_quantity += order.remaining_quantity;
				order.remaining_quantity = 0;
				false
			} else {
				order.status = if order.filled_quantity > 0 {
					OrderStatus::PartialFilled
				} else {
					OrderStatus::Open
				};
				true
			}
		};

		let final_snapshot = self.book.order(key).status_event();

		if rested {
			let level = self.book.get_or_create_level(side, price);
			self.book.push_order(level, key);
			self.index.insert(final_snapshot.order_id.clone(), key);
		} else {
			self.book.free_order(key);
		}

		let mut events = vec![order_event(EventType::OrderAccepted, &accept_snapshot)?];
		for trade in &trades {
			events.push(EngineEvent::new(
				EventType::TradeExecuted,
				"",
				trade.to_bytes()?,
			));
		}
		match final_snapshot.status {
			OrderStatus::Filled => {
				events.push(order_event(EventType::OrderFilled, &final_snapshot)?);
			}
			OrderStatus::Cancelled => {
				events.push(order_event(EventType::OrderCancelled, &final_snapshot)?);
			}
			_ => {}
		}

		Ok((
			PlaceOrderResult {
				order: final_snapshot,
				trades,
			},
			events,
		))
	}

	/// Sweep the opposite book while the incoming order still crosses.
	fn match_incoming(&mut self, key: OrderKey) -> Result<Vec<TradeEvent>, EngineError> {
		let (side, order_type, user_id, limit_price) = {
			let order = self.book.order(key);
			(
				order.side,
				order.order_type,
				order.user_id.clone(),
				order.price,
			)
		};
		let opposite = side.opposite();
		let mut trades = Vec::new();

		loop {
			if self.book.order(key).remaining_quantity == 0 {
				break;
			}
			let Some(best_key) = self.book.best_level_key(opposite) else {
				break;
			};
			let best_price = self.book.level(best_key).price;
			let crosses = order_type == OrderType::Market
				|| match side {
					Side::Buy => best_price <= limit_price,
					Side::Sell => best_price >= limit_price,
				};
			if !crosses {
				break;
			}

			let resting_key = self
				.book
				.level(best_key)
				.head()
				.ok_or(BookError::PriceLevelNotFound)?;

			// Self-trade prevention: stop rather than trade through an own
			// resting order.
			if self.book.order(resting_key).user_id == user_id {
				debug!(
					order_id = %self.book.order(key).order_id,
					resting = %self.book.order(resting_key).order_id,
					"self-trade prevented, stopping match"
				);
				break;
			}

			let match_quantity = self
				.book
				.order(key)
				.remaining_quantity
				.min(self.book.order(resting_key).remaining_quantity);
			let match_price = self.book.order(resting_key).price;

			let trade = self.execute_trade(key, resting_key, match_quantity, match_price);

			let resting_filled = {
				let (incoming, resting) = self.book.order_pair_mut(key, resting_key);
				apply_fill(incoming, match_quantity, match_price);
				apply_fill(resting, match_quantity, match_price);
				if resting.remaining_quantity > 0 {
					resting.status = OrderStatus::PartialFilled;
				}
				resting.remaining_quantity == 0
			};

			// The resting order's outstanding liquidity shrank in place.
			self.book.reduce_level_volume(best_key, match_quantity);

			self.total_matches += 1;
			self.total_volume += match_quantity as u64;
			self.last_trade_price = match_price;
			trades.push(trade);

			if resting_filled {
				self.book.order_mut(resting_key).status = OrderStatus::Filled;
				self.drop_order(resting_key)?;
			}
		}

		Ok(trades)
	}

	/// Build the trade record for one match and advance the trade sequence.
	fn execute_trade(
		&mut self,
		aggressor_key: OrderKey,
		resting_key: OrderKey,
		quantity: i64,
		price: i64,
	) -> TradeEvent {
		self.trade_sequence += 1;
		let timestamp = now_ns();

		let aggressor = self.book.order(aggressor_key);
		let resting = self.book.order(resting_key);

		let (buyer_id, buy_order_id, seller_id, sell_order_id) = if aggressor.side == Side::Sell {
			(
				resting.user_id.clone(),
				resting.order_id.clone(),
				aggressor.user_id.clone(),
				aggressor.order_id.clone(),
			)
		} else {
			(
				aggressor.user_id.clone(),
				aggressor.order_id.clone(),
				resting.user_id.clone(),
				resting.order_id.clone(),
			)
		};

		TradeEvent {
			trade_id: format!("{}-T{}-{}", self.symbol, timestamp, self.trade_sequence),
			symbol: self.symbol.clone(),
			trade_sequence: self.trade_sequence,
			price,
			quantity,
			buyer_id,
			seller_id,
			buy_order_id,
			sell_order_id,
			is_buyer_maker: resting.side == Side::Buy,
			timestamp,
		}
	}

	// ---- cancel internals ----

	fn apply_cancel(
		&mut self,
		order_id: &str,
		user_id: &str,
		message: &str,
	) -> Result<(CancelOrderResult, Vec<EngineEvent>), EngineError> {
		let key = *self
			.index
			.get(order_id)
			.ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;

		{
			let order = self.book.order(key);
			if order.user_id != user_id {
				return Err(EngineError::Unauthorized(order_id.to_string()));
			}
			if order.remaining_quantity == 0 {
				return Err(EngineError::AlreadyCompleted(order_id.to_string()));
			}
		}

		// Unlink first: removal subtracts the remaining quantity from the
		// level's outstanding volume.
		let mut order = self.drop_order(key)?;
		order.cancelled_quantity += order.remaining_quantity;
		order.remaining_quantity = 0;
		order.status = OrderStatus::Cancelled;
		order.status_message = message.to_string();

		let snapshot = order.status_event();
		let events = vec![order_event(EventType::OrderCancelled, &snapshot)?];

		Ok((
			CancelOrderResult {
				order_id: order_id.to_string(),
				order: snapshot,
			},
			events,
		))
	}

	// ---- modify internals ----

	fn replace_order(
		&mut self,
		key: OrderKey,
		order_id: &str,
		user_id: &str,
		new_order_id: &str,
		new_price: Option<i64>,
		new_quantity: Option<i64>,
	) -> Result<(ModifyOrderResult, Vec<EngineEvent>, Vec<TradeEvent>), EngineError> {
		if self.index.contains_key(new_order_id) {
			return Err(EngineError::DuplicateId(new_order_id.to_string()));
		}

		let (cmd, carried) = {
			let order = self.book.order(key);
			(
				OrderCommand {
					order_id: new_order_id.to_string(),
					user_id: order.user_id.clone(),
					symbol: order.symbol.clone(),
					side: order.side,
					order_type: order.order_type,
					price: new_price.unwrap_or(order.price),
					quantity: new_quantity.unwrap_or(order.quantity),
					client_timestamp: order.client_timestamp,
					gateway_timestamp: order.gateway_timestamp,
				},
				CarriedExecution {
					filled_quantity: order.filled_quantity,
					cancelled_quantity: order.cancelled_quantity,
					executed_value: order.executed_value,
					average_price: order.average_price,
				},
			)
		};

		let (_, mut events) = self.apply_cancel(order_id, user_id, "cancelled for replacement")?;

		// The replacement re-enters through the normal place path with a
		// fresh engine timestamp: queue priority is intentionally lost.
		let (add_result, add_events) = self.apply_add(cmd, Some(carried))?;
		events.extend(add_events);

		Ok((
			ModifyOrderResult {
				order_id: order_id.to_string(),
				old_order_id: Some(order_id.to_string()),
				new_order_id: Some(new_order_id.to_string()),
			},
			events,
			add_result.trades,
		))
	}

	fn reduce_order(
		&mut self,
		key: OrderKey,
		order_id: &str,
		user_id: &str,
		new_remaining: i64,
	) -> Result<(ModifyOrderResult, Vec<EngineEvent>), EngineError> {
		if new_remaining == 0 {
			let (cancel_result, events) =
				self.apply_cancel(order_id, user_id, "remaining quantity reduced to zero")?;
			return Ok((
				ModifyOrderResult {
					order_id: cancel_result.order_id,
					old_order_id: None,
					new_order_id: None,
				},
				events,
			));
		}

		let level_key = self
			.book
			.order_level(key)
			.ok_or(BookError::PriceLevelNotFound)?;

		let (old_quantity, old_remaining, old_cancelled) = {
			let order = self.book.order(key);
			(
				order.quantity,
				order.remaining_quantity,
				order.cancelled_quantity,
			)
		};
		let delta = old_remaining - new_remaining;

		let snapshot = {
			let order = self.book.order_mut(key);
			order.remaining_quantity = new_remaining;
			order.cancelled_quantity += delta;
			order.status_event()
		};
		self.book.reduce_level_volume(level_key, delta);

		let reduced = OrderReducedEvent {
			old_quantity,
			new_quantity: snapshot.quantity,
			old_remaining,
			new_remaining,
			old_cancelled,
			new_cancelled: snapshot.cancelled_quantity,
			order: snapshot,
		};
		let events = vec![EngineEvent::new(
			EventType::OrderReduced,
			reduced.order.user_id.clone(),
			reduced.to_bytes()?,
		)];

		Ok((
			ModifyOrderResult {
				order_id: order_id.to_string(),
				old_order_id: None,
				new_order_id: None,
			},
			events,
		))
	}

	// ---- shared helpers ----

	/// Remove an order from its level (and the level from the ladder when it
	/// drains), drop it from the index, and release its slot.
	fn drop_order(&mut self, key: OrderKey) -> Result<BookOrder, EngineError> {
		let side = self.book.order(key).side;
		let level = self.book.unlink_order(key)?;
		if self.book.level(level).is_empty() {
			self.book.remove_level(side, level)?;
		}
		let order = self.book.free_order(key);
		self.index.remove(&order.order_id);
		Ok(order)
	}

	/// Append the derived market data for a book-altering command: one TICKER
	/// per trade, then a DEPTH snapshot. Broadcast-only; never persisted.
	fn append_market_data(
		&self,
		events: &mut Vec<EngineEvent>,
		trades: &[TradeEvent],
	) -> Result<(), EngineError> {
		let altered = events
			.iter()
			.any(|e| e.event_type != EventType::OrderRejected);
		if !altered {
			return Ok(());
		}

		for trade in trades {
			let ticker = TickerEvent {
				symbol: self.symbol.clone(),
				last_price: trade.price,
				bid_price: self.book.best_price(Side::Buy),
				ask_price: self.book.best_price(Side::Sell),
			};
			events.push(EngineEvent::new(EventType::Ticker, "", ticker.to_bytes()?));
		}

		let depth = self.depth_event(DEPTH_LEVELS);
		events.push(EngineEvent::new(EventType::Depth, "", depth.to_bytes()?));
		Ok(())
	}

	// ---- replay hooks (crate-internal, driven by the replay module) ----

	pub(crate) fn replay_accept(&mut self, body: &OrderStatusEvent) -> Result<(), ReplayError> {
		if self.index.contains_key(&body.order_id) {
			return Err(ReplayError::State(format!(
				"accepted order {} already live",
				body.order_id
			)));
		}
		let mut order = BookOrder::from_snapshot(body);
		// Accepted snapshots are always recorded OPEN; a replacement that
		// carried fills in rests as partially filled, same as the live path.
		if order.filled_quantity > 0 {
			order.status = OrderStatus::PartialFilled;
		}
		let (side, price) = (order.side, order.price);
		let key = self.book.insert_order(order);
		let level = self.book.get_or_create_level(side, price);
		self.book.push_order(level, key);
		self.index.insert(body.order_id.clone(), key);
		Ok(())
	}

	pub(crate) fn replay_trade(&mut self, body: &TradeEvent) -> Result<(), ReplayError> {
		let buy_key = *self
			.index
			.get(&body.buy_order_id)
			.ok_or_else(|| ReplayError::OrderNotFound(body.buy_order_id.clone()))?;
		let sell_key = *self
			.index
			.get(&body.sell_order_id)
			.ok_or_else(|| ReplayError::OrderNotFound(body.sell_order_id.clone()))?;

		for key in [buy_key, sell_key] {
			let level = self
				.book
				.order_level(key)
				.ok_or_else(|| ReplayError::State("traded order not resting".to_string()))?;
			let order = self.book.order_mut(key);
			apply_fill(order, body.quantity, body.price);
			if order.remaining_quantity > 0 {
				order.status = OrderStatus::PartialFilled;
			}
			self.book.reduce_level_volume(level, body.quantity);
		}

		self.trade_sequence += 1;
		self.total_matches += 1;
		self.total_volume += body.quantity as u64;
		self.last_trade_price = body.price;

		for key in [buy_key, sell_key] {
			if self.book.order(key).remaining_quantity == 0 {
				self.book.order_mut(key).status = OrderStatus::Filled;
				self.drop_order(key)
					.map_err(|e| ReplayError::State(e.to_string()))?;
			}
		}
		Ok(())
	}

	pub(crate) fn replay_cancel(&mut self, body: &OrderStatusEvent) -> Result<(), ReplayError> {
		let key = *self
			.index
			.get(&body.order_id)
			.ok_or_else(|| ReplayError::OrderNotFound(body.order_id.clone()))?;
		let mut order = self
			.drop_order(key)
			.map_err(|e| ReplayError::State(e.to_string()))?;
		order.cancelled_quantity += order.remaining_quantity;
		order.remaining_quantity = 0;
		order.status = OrderStatus::Cancelled;
		Ok(())
	}

	pub(crate) fn replay_reduce(&mut self, body: &OrderReducedEvent) -> Result<(), ReplayError> {
		let key = *self
			.index
			.get(&body.order.order_id)
			.ok_or_else(|| ReplayError::OrderNotFound(body.order.order_id.clone()))?;

		if body.new_remaining == 0 {
			self.drop_order(key)
				.map_err(|e| ReplayError::State(e.to_string()))?;
			return Ok(());
		}

		let level = self
			.book
			.order_level(key)
			.ok_or_else(|| ReplayError::State("reduced order not resting".to_string()))?;
		let delta = body.old_remaining - body.new_remaining;
		{
			let order = self.book.order_mut(key);
			order.remaining_quantity = body.new_remaining;
			order.cancelled_quantity += delta;
		}
		self.book.reduce_level_volume(level, delta);
		Ok(())
	}

	pub(crate) fn replay_filled(&mut self, body: &OrderStatusEvent) -> Result<(), ReplayError> {
		// Terminal-state reconciliation: the fills themselves were applied by
		// the preceding trade events, so a still-present order just leaves.
		if let Some(&key) = self.index.get(&body.order_id) {
			self.drop_order(key)
				.map_err(|e| ReplayError::State(e.to_string()))?;
		}
		Ok(())
	}

	// ---- inspection ----

	pub fn best_bid(&self) -> Option<i64> {
		self.book.best_price(Side::Buy)
	}

	pub fn best_ask(&self) -> Option<i64> {
		self.book.best_price(Side::Sell)
	}

	pub fn last_price(&self) -> i64 {
		self.last_trade_price
	}

	pub fn trade_sequence(&self) -> u64 {
		self.trade_sequence
	}

	pub fn total_matches(&self) -> u64 {
		self.total_matches
	}

	pub fn total_volume(&self) -> u64 {
		self.total_volume
	}

	pub fn open_order_count(&self) -> usize {
		self.index.len()
	}

	/// Current state of a live order, if any.
	pub fn order_snapshot(&self, order_id: &str) -> Option<OrderStatusEvent> {
		self.index
			.get(order_id)
			.map(|&key| self.book.order(key).status_event())
	}

	/// Top-N depth snapshot of both sides.
	pub fn depth_event(&self, n: usize) -> DepthEvent {
		DepthEvent {
			symbol: self.symbol.clone(),
			sequence: self.trade_sequence,
			timestamp: now_ns(),
			bids: self.book.depth(Side::Buy, n),
			asks: self.book.depth(Side::Sell, n),
		}
	}

	/// Verify every book and index invariant; used by tests after commands
	/// and by recovery sanity checks.
	pub fn audit(&self) -> Result<(), String> {
		self.book.audit()?;

		let mut ladder_orders = 0u64;
		for side in [Side::Buy, Side::Sell] {
			for level in self.book.depth(side, usize::MAX) {
				ladder_orders += level.order_count;
			}
		}
		if ladder_orders != self.index.len() as u64 {
			return Err(format!(
				"index holds {} orders, ladders hold {ladder_orders}",
				self.index.len()
			));
		}

		for (order_id, &key) in &self.index {
			let order = self.book.order(key);
			if &order.order_id != order_id {
				return Err(format!("index key {order_id} points at {}", order.order_id));
			}
			if order.remaining_quantity <= 0 {
				return Err(format!("live order {order_id} has no remaining quantity"));
			}
			if order.filled_quantity + order.cancelled_quantity + order.remaining_quantity
				!= order.quantity
			{
				return Err(format!("order {order_id} quantity arithmetic broken"));
			}
			if self.book.order_level(key).is_none() {
				return Err(format!("live order {order_id} is not resting in a level"));
			}
		}
		Ok(())
	}
}

/// Apply one fill's arithmetic to an order.
fn apply_fill(order: &mut BookOrder, quantity: i64, price: i64) {
	order.remaining_quantity -= quantity;
	order.filled_quantity += quantity;
	order.executed_value += price * quantity;
	order.average_price = order.executed_value / order.filled_quantity;
}

fn order_event(
	event_type: EventType,
	snapshot: &OrderStatusEvent,
) -> Result<EngineEvent, EngineError> {
	Ok(EngineEvent::new(
		event_type,
		snapshot.user_id.clone(),
		snapshot.to_bytes()?,
	))
}
