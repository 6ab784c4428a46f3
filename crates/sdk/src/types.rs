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

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
	Buy,
	Sell,
}

impl Side {
	/// The side an order of this side matches against.
	pub fn opposite(self) -> Self {
		match self {
			Side::Buy => Side::Sell,
			Side::Sell => Side::Buy,
		}
	}
}

/// Order type
///
/// Market orders ignore their price field and sweep the opposite book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
	Limit,
	Market,
}

/// Order status over its lifecycle
///
/// `Filled`, `Cancelled`, and `Rejected` are terminal: an order in one of
/// these states has left the book and its id may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	Open,
	PartialFilled,
	Filled,
	Cancelled,
	Rejected,
}

impl OrderStatus {
	/// True once the order can no longer trade or be modified.
	pub fn is_terminal(self) -> bool {
		matches!(
			self,
			OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
		)
	}
}
