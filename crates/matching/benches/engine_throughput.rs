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

//! Matching core throughput benchmarks
//!
//! Measures the engine alone (no actor, no WAL): a no-cross scenario that
//! only accretes the book, and a cross-heavy scenario where most orders
//! trade. The generator is counter-based so runs are reproducible.

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use flint_matching::{MatchingEngine, OrderCommand};
use flint_sdk::{OrderType, Side};

#[derive(Clone, Copy)]
enum Scenario {
	NoCross,
	CrossHeavy,
}

struct OrderGenerator {
	counter: u64,
	scenario: Scenario,
}

impl OrderGenerator {
	fn new(scenario: Scenario) -> Self {
		Self {
			counter: 0,
			scenario,
		}
	}

	fn next_order(&mut self) -> OrderCommand {
		self.counter += 1;
		let n = self.counter;
		let buy = n % 2 == 0;

		let price = match self.scenario {
			// Bids stay strictly below asks: the book only grows.
			Scenario::NoCross => {
				if buy {
					44_000 + (n % 1000) as i64
				} else {
					46_000 + (n % 1000) as i64
				}
			}
			// Both sides quote the same band: most orders trade.
			Scenario::CrossHeavy => 45_000 + (n % 10) as i64,
		};

		OrderCommand {
			order_id: format!("bench-{n}"),
			user_id: format!("user-{}", n % 64),
			symbol: "BTC-USDT".to_string(),
			side: if buy { Side::Buy } else { Side::Sell },
			order_type: OrderType::Limit,
			price,
			quantity: 1 + (n % 4) as i64,
			client_timestamp: 0,
			gateway_timestamp: 0,
		}
	}
}

fn bench_scenario(c: &mut Criterion, name: &str, scenario: Scenario) {
	const BATCH: usize = 10_000;

	let mut group = c.benchmark_group(name);
	group.throughput(criterion::Throughput::Elements(BATCH as u64));
	group.sample_size(10);

	group.bench_function(format!("{BATCH}_orders"), |b| {
		b.iter_batched(
			|| {
				let mut generator = OrderGenerator::new(scenario);
				let orders: Vec<OrderCommand> =
					(0..BATCH).map(|_| generator.next_order()).collect();
				(MatchingEngine::new("BTC-USDT", 45_000), orders)
			},
			|(mut engine, orders)| {
				for order in orders {
					engine.add_order(order).unwrap();
				}
				engine
			},
			BatchSize::LargeInput,
		)
	});

	group.finish();
}

fn engine_throughput(c: &mut Criterion) {
	bench_scenario(c, "no_cross", Scenario::NoCross);
	bench_scenario(c, "cross_heavy", Scenario::CrossHeavy);
}

criterion_group!(benches, engine_throughput);
criterion_main!(benches);
