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

//! Order book storage: price levels and side ladders
//!
//! Orders and price levels live in [`slab::Slab`] arenas owned by the
//! [`Book`]; every link (order prev/next, level head/tail, ladder prev/next,
//! the order→level back-reference) is a stable slab key instead of a pointer.
//! Keys are not owning edges, so the intrusive doubly-linked structure carries
//! no reference cycles and removal is O(1) from any queue position.
//!
//! Each side keeps a price→level map plus a best-price entry into a ladder
//! linked in priority order: bids descending, asks ascending.

use std::collections::HashMap;

use flint_sdk::{DepthLevel, OrderStatus, OrderStatusEvent, OrderType, Side};
use slab::Slab;
use thiserror::Error;

use crate::types::OrderCommand;

/// Stable arena key for an order slot
pub type OrderKey = usize;
/// Stable arena key for a price level slot
pub type LevelKey = usize;

/// Book-structure invariant violations
///
/// These indicate a bug in the engine, not a bad command: they are treated as
/// hard errors in production and fatal assertions in tests.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BookError {
	#[error("price level not found")]
	PriceLevelNotFound,
	#[error("cannot remove non-empty price level at {price}")]
	RemoveNonEmptyLevel { price: i64 },
}

/// An order resting in (or passing through) the book
///
/// Quantity arithmetic invariant: `filled + cancelled + remaining = quantity`
/// at all times, with every component non-negative.
#[derive(Debug, Clone)]
pub struct BookOrder {
	pub order_id: String,
	pub user_id: String,
	pub symbol: String,
	pub side: Side,
	pub order_type: OrderType,
	pub price: i64,

	pub quantity: i64,
	pub filled_quantity: i64,
	pub remaining_quantity: i64,
	pub cancelled_quantity: i64,
	pub executed_value: i64,
	pub average_price: i64,

	pub status: OrderStatus,
	pub status_message: String,

	pub client_timestamp: u64,
	pub gateway_timestamp: u64,
	pub engine_timestamp: u64,

	prev: Option<OrderKey>,
	next: Option<OrderKey>,
	/// Back-reference to the containing level, used only for O(1) removal.
	/// Cleared whenever the order leaves its queue.
	level: Option<LevelKey>,
}

impl BookOrder {
	/// Build a fresh order from an incoming command.
	pub fn from_command(cmd: &OrderCommand, engine_timestamp: u64) -> Self {
		Self {
			order_id: cmd.order_id.clone(),
			user_id: cmd.user_id.clone(),
			symbol: cmd.symbol.clone(),
			side: cmd.side,
			order_type: cmd.order_type,
			price: cmd.price,
			quantity: cmd.quantity,
			filled_quantity: 0,
			remaining_quantity: cmd.quantity,
			cancelled_quantity: 0,
			executed_value: 0,
			average_price: 0,
			status: OrderStatus::Open,
			status_message: String::new(),
			client_timestamp: cmd.client_timestamp,
			gateway_timestamp: cmd.gateway_timestamp,
			engine_timestamp,
			prev: None,
			next: None,
			level: None,
		}
	}

	/// Rebuild an order from a recorded status snapshot (log replay).
	pub fn from_snapshot(event: &OrderStatusEvent) -> Self {
		Self {
			order_id: event.order_id.clone(),
			user_id: event.user_id.clone(),
			symbol: event.symbol.clone(),
			side: event.side,
			order_type: event.order_type,
			price: event.price,
			quantity: event.quantity,
			filled_quantity: event.filled_quantity,
			remaining_quantity: event.remaining_quantity,
			cancelled_quantity: event.cancelled_quantity,
			executed_value: event.executed_value,
			average_price: event.average_price,
			status: event.status,
			status_message: event.status_message.clone(),
			client_timestamp: event.client_timestamp,
			gateway_timestamp: event.gateway_timestamp,
			engine_timestamp: event.engine_timestamp,
			prev: None,
			next: None,
			level: None,
		}
	}

	/// Snapshot the order into its wire representation.
	pub fn status_event(&self) -> OrderStatusEvent {
		OrderStatusEvent {
			order_id: self.order_id.clone(),
			user_id: self.user_id.clone(),
			symbol: self.symbol.clone(),
			status: self.status,
			status_message: self.status_message.clone(),
			side: self.side,
			order_type: self.order_type,
			price: self.price,
			executed_value: self.executed_value,
			average_price: self.average_price,
			quantity: self.quantity,
			filled_quantity: self.filled_quantity,
			remaining_quantity: self.remaining_quantity,
			cancelled_quantity: self.cancelled_quantity,
			client_timestamp: self.client_timestamp,
			gateway_timestamp: self.gateway_timestamp,
			engine_timestamp: self.engine_timestamp,
		}
	}
}

/// One price level: a FIFO of resting orders at a single price
///
/// `total_volume` tracks outstanding liquidity (the sum of the queued orders'
/// remaining quantities), not original order sizes. The level is empty iff
/// `order_count == 0` iff `total_volume == 0`.
#[derive(Debug)]
pub struct PriceLevel {
	pub price: i64,
	pub total_volume: i64,
	pub order_count: u64,

	head: Option<OrderKey>,
	tail: Option<OrderKey>,

	prev: Option<LevelKey>,
	next: Option<LevelKey>,
}

impl PriceLevel {
	fn new(price: i64) -> Self {
		Self {
			price,
			total_volume: 0,
			order_count: 0,
			head: None,
			tail: None,
			prev: None,
			next: None,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.head.is_none()
	}

	/// Key of the order at the front of the queue (oldest at this price).
	pub fn head(&self) -> Option<OrderKey> {
		self.head
	}
}

/// One side of the book: the price→level map plus the best-price entry
struct BookSide {
	side: Side,
	levels_by_price: HashMap<i64, LevelKey>,
	best: Option<LevelKey>,
}

impl BookSide {
	fn new(side: Side) -> Self {
		Self {
			side,
			levels_by_price: HashMap::new(),
			best: None,
		}
	}

	/// Whether `a` outranks `b` on this side.
	fn ranks_higher(&self, a: i64, b: i64) -> bool {
		match self.side {
			Side::Buy => a > b,
			Side::Sell => a < b,
		}
	}
}

/// The full two-sided book for one symbol
///
/// Owns the order and level arenas. All mutation goes through the engine,
/// which is in turn owned by exactly one symbol actor.
pub struct Book {
	orders: Slab<BookOrder>,
	levels: Slab<PriceLevel>,
	bids: BookSide,
	asks: BookSide,
}

impl Book {
	pub fn new() -> Self {
		Self {
			orders: Slab::new(),
			levels: Slab::new(),
			bids: BookSide::new(Side::Buy),
			asks: BookSide::new(Side::Sell),
		}
	}

	fn side(&self, side: Side) -> &BookSide {
		match side {
			Side::Buy => &self.bids,
			Side::Sell => &self.asks,
		}
	}

	fn side_mut(&mut self, side: Side) -> &mut BookSide {
		match side {
			Side::Buy => &mut self.bids,
			Side::Sell => &mut self.asks,
		}
	}

	// ---- order slots ----

	pub fn insert_order(&mut self, order: BookOrder) -> OrderKey {
		self.orders.insert(order)
	}

	/// Release a terminal order's slot. The order must already be unlinked.
	pub fn free_order(&mut self, key: OrderKey) -> BookOrder {
		self.orders.remove(key)
	}

	pub fn order(&self, key: OrderKey) -> &BookOrder {
		&self.orders[key]
	}

	pub fn order_mut(&mut self, key: OrderKey) -> &mut BookOrder {
		&mut self.orders[key]
	}

	/// Mutable access to two distinct orders at once (aggressor + resting).
	pub fn order_pair_mut(
		&mut self,
		a: OrderKey,
		b: OrderKey,
	) -> (&mut BookOrder, &mut BookOrder) {
		self.orders
			.get2_mut(a, b)
			.expect("order keys must be live and distinct")
	}

	// ---- levels and ladder ----

	pub fn level(&self, key: LevelKey) -> &PriceLevel {
		&self.levels[key]
	}

	pub fn best_level_key(&self, side: Side) -> Option<LevelKey> {
		self.side(side).best
	}

	pub fn best_price(&self, side: Side) -> Option<i64> {
		self.side(side).best.map(|k| self.levels[k].price)
	}

	pub fn side_is_empty(&self, side: Side) -> bool {
		self.side(side).best.is_none()
	}

	/// Look up the level at `price`, creating and linking it on a miss.
	pub fn get_or_create_level(&mut self, side: Side, price: i64) -> LevelKey {
		if let Some(&key) = self.side(side).levels_by_price.get(&price) {
			return key;
		}

		let key = self.levels.insert(PriceLevel::new(price));
		self.side_mut(side).levels_by_price.insert(price, key);
		self.link_level(side, key);
		key
	}

	/// Splice a freshly created level into the ladder at its priority rank.
	fn link_level(&mut self, side: Side, key: LevelKey) {
		let price = self.levels[key].price;

		let Some(best) = self.side(side).best else {
			self.side_mut(side).best = Some(key);
			return;
		};

		// New best: prepend and move the best entry.
		if self.side(side).ranks_higher(price, self.levels[best].price) {
			self.levels[key].next = Some(best);
			self.levels[best].prev = Some(key);
			self.side_mut(side).best = Some(key);
			return;
		}

		// Walk down the ladder to the first level the new price outranks.
		let mut current = best;
		loop {
			match self.levels[current].next {
				Some(next) if !self.side(side).ranks_higher(price, self.levels[next].price) => {
					current = next;
				}
				next => {
					self.levels[key].prev = Some(current);
					self.levels[key].next = next;
					if let Some(next) = next {
						self.levels[next].prev = Some(key);
					}
					self.levels[current].next = Some(key);
					return;
				}
			}
		}
	}

	/// Unlink an empty level from the ladder and drop it from the map.
	///
	/// The engine calls this exactly once, when a level's FIFO drains.
	/// Removing a level that still holds orders is an invariant violation.
	pub fn remove_level(&mut self, side: Side, key: LevelKey) -> Result<(), BookError> {
		let level = &self.levels[key];
		if level.order_count > 0 {
			return Err(BookError::RemoveNonEmptyLevel { price: level.price });
		}

		let (prev, next, price) = (level.prev, level.next, level.price);

		if let Some(next) = next {
			self.levels[next].prev = prev;
		}
		if let Some(prev) = prev {
			self.levels[prev].next = next;
		}
		if self.side(side).best == Some(key) {
			self.side_mut(side).best = next;
		}

		self.side_mut(side).levels_by_price.remove(&price);
		self.levels.remove(key);
		Ok(())
	}

	// ---- FIFO operations ----

	/// Append an order to the tail of a level's queue.
	pub fn push_order(&mut self, level_key: LevelKey, order_key: OrderKey) {
		let remaining = {
			let order = &mut self.orders[order_key];
			order.prev = None;
			order.next = None;
			order.level = Some(level_key);
			order.remaining_quantity
		};

		match self.levels[level_key].tail {
			None => {
				self.levels[level_key].head = Some(order_key);
				self.levels[level_key].tail = Some(order_key);
			}
			Some(tail) => {
				self.orders[tail].next = Some(order_key);
				self.orders[order_key].prev = Some(tail);
				self.levels[level_key].tail = Some(order_key);
			}
		}

		self.levels[level_key].total_volume += remaining;
		self.levels[level_key].order_count += 1;
	}

	/// Unlink an order from its level in O(1) via its prev/next keys.
	///
	/// Subtracts the order's remaining quantity at removal time and clears
	/// the level back-reference. Returns the level key so the caller can
	/// remove the level if it went empty.
	pub fn unlink_order(&mut self, order_key: OrderKey) -> Result<LevelKey, BookError> {
		let (prev, next, level_key, remaining) = {
			let order = &self.orders[order_key];
			let level_key = order.level.ok_or(BookError::PriceLevelNotFound)?;
			(order.prev, order.next, level_key, order.remaining_quantity)
		};

		match prev {
			Some(prev) => self.orders[prev].next = next,
			None => self.levels[level_key].head = next,
		}
		match next {
			Some(next) => self.orders[next].prev = prev,
			None => self.levels[level_key].tail = prev,
		}

		self.levels[level_key].total_volume -= remaining;
		self.levels[level_key].order_count -= 1;

		let order = &mut self.orders[order_key];
		order.prev = None;
		order.next = None;
		order.level = None;

		Ok(level_key)
	}

	/// Shrink a level's outstanding volume after a resting order fills or
	/// reduces in place without leaving the queue.
	pub fn reduce_level_volume(&mut self, level_key: LevelKey, delta: i64) {
		self.levels[level_key].total_volume -= delta;
	}

	/// Level key currently holding this order, if it is resting.
	pub fn order_level(&self, order_key: OrderKey) -> Option<LevelKey> {
		self.orders[order_key].level
	}

	// ---- snapshots ----

	/// Top-`n` levels of one side in priority order.
	pub fn depth(&self, side: Side, n: usize) -> Vec<DepthLevel> {
		let mut out = Vec::with_capacity(n.min(16));
		let mut current = self.side(side).best;
		while let Some(key) = current {
			if out.len() >= n {
				break;
			}
			let level = &self.levels[key];
			out.push(DepthLevel {
				price: level.price,
				order_count: level.order_count,
				quantity: level.total_volume,
			});
			current = level.next;
		}
		out
	}

	/// Walk both ladders and verify every structural invariant:
	/// strict priority ordering, map/ladder congruence, no empty levels,
	/// per-level totals equal to the FIFO sums, and link symmetry.
	pub fn audit(&self) -> Result<(), String> {
		self.audit_side(Side::Buy)?;
		self.audit_side(Side::Sell)
	}

	fn audit_side(&self, side: Side) -> Result<(), String> {
		let book_side = self.side(side);
		let mut seen = 0usize;
		let mut prev_key: Option<LevelKey> = None;
		let mut current = book_side.best;

		while let Some(key) = current {
			let level = &self.levels[key];
			if level.prev != prev_key {
				return Err(format!("{side:?} ladder prev link broken at {}", level.price));
			}
			if let Some(prev) = prev_key {
				let prev_price = self.levels[prev].price;
				if !book_side.ranks_higher(prev_price, level.price) {
					return Err(format!(
						"{side:?} ladder out of order: {prev_price} before {}",
						level.price
					));
				}
			}
			if book_side.levels_by_price.get(&level.price) != Some(&key) {
				return Err(format!("{side:?} level {} missing from price map", level.price));
			}
			if level.order_count == 0 || level.total_volume == 0 {
				return Err(format!("{side:?} empty level {} left in ladder", level.price));
			}

			// FIFO walk: totals, count, link symmetry, back-references.
			let mut volume = 0i64;
			let mut count = 0u64;
			let mut prev_order: Option<OrderKey> = None;
			let mut cursor = level.head;
			while let Some(order_key) = cursor {
				let order = &self.orders[order_key];
				if order.prev != prev_order {
					return Err(format!("order {} prev link broken", order.order_id));
				}
				if order.level != Some(key) {
					return Err(format!("order {} level back-reference broken", order.order_id));
				}
				if order.price != level.price || order.side != side {
					return Err(format!("order {} queued at wrong level", order.order_id));
				}
				volume += order.remaining_quantity;
				count += 1;
				prev_order = cursor;
				cursor = order.next;
			}
			if level.tail != prev_order {
				return Err(format!("{side:?} level {} tail link broken", level.price));
			}
			if volume != level.total_volume || count != level.order_count {
				return Err(format!(
					"{side:?} level {} totals drifted: volume {volume}/{} count {count}/{}",
					level.price, level.total_volume, level.order_count
				));
			}

			seen += 1;
			prev_key = current;
			current = level.next;
		}

		if seen != book_side.levels_by_price.len() {
			return Err(format!(
				"{side:?} price map holds {} levels, ladder holds {seen}",
				book_side.levels_by_price.len()
			));
		}
		Ok(())
	}
}

impl Default for Book {
	fn default() -> Self {
		Self::new()
	}
}
