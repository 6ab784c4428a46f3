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

//! Flint SDK
//!
//! Wire-level types shared between the matching engine and its external
//! collaborators (RPC front-ends, the websocket fan-out gateway, downstream
//! consumers of the engine-events topic).
//!
//! The SDK intentionally contains no engine logic: it defines the order
//! vocabulary (side, type, status), the discriminated event envelope, the
//! event bodies, and their encode/decode helpers. Anything that can observe
//! engine output should depend on this crate and nothing else.

pub mod events;
pub mod types;

pub use events::{
	DepthEvent, DepthLevel, EngineEvent, EventError, EventType, OrderReducedEvent,
	OrderStatusEvent, TickerEvent, TradeEvent,
};
pub use types::{OrderStatus, OrderType, Side};
