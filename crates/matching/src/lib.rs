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

//! Flint Matching Engine
//!
//! A per-symbol, in-memory limit-order matching engine with a durable
//! write-ahead log, crash recovery via log replay, and asynchronous
//! downstream event fan-out.
//!
//! Architecture:
//! - Single-writer actor per symbol: all engine mutations for a symbol run on
//!   one task, consuming commands from a bounded inbox
//! - Price-time priority matching over arena-backed doubly-linked price
//!   ladders with FIFO queues per level
//! - Event-sourced durability: every persistent event is appended to a
//!   segmented, CRC-validated WAL; startup replays the log into an empty book
//! - At-least-once downstream delivery: a checkpointing emitter forwards WAL
//!   records to an external bus and never advances past unacknowledged events

pub mod actor;
pub mod book;
pub mod config;
pub mod emitter;
pub mod engine;
pub mod logging;
pub mod registry;
pub mod replay;
pub mod types;
pub mod wal;

pub use actor::{ActorHandle, DEFAULT_INBOX_CAPACITY, EngineCommand, SymbolActor};
pub use book::{Book, BookError, BookOrder};
pub use config::{MatchingConfig, SymbolConfig};
pub use emitter::{BusError, BusRecord, DownstreamEmitter, EventBus, MemoryEventBus};
pub use engine::{DEPTH_LEVELS, EngineError, MatchingEngine};
pub use registry::{StartupError, SymbolRegistry};
pub use replay::ReplayError;
pub use types::{CancelOrderResult, ModifyOrderResult, OrderCommand, PlaceOrderResult};
pub use wal::{SegmentedWal, WalEntry, WalError};
