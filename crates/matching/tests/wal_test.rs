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

//! Segmented WAL integration tests
//!
//! These exercise the on-disk format end to end: rotation across the exact
//! byte boundary, gap-free sequence numbering across segments, CRC
//! verification, and truncated-frame detection.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::time::Duration;

use flint_matching::wal::{SegmentedWal, WalError};
use flint_sdk::{EngineEvent, EventType, OrderStatus, OrderStatusEvent, OrderType, Side};

fn accepted_event(n: u64) -> Vec<u8> {
	let body = OrderStatusEvent {
		order_id: format!("order-{n}"),
		user_id: format!("user-{}", n % 7),
		symbol: "BTCUSD".to_string(),
		status: OrderStatus::Open,
		status_message: String::new(),
		side: if n % 2 == 0 { Side::Buy } else { Side::Sell },
		order_type: OrderType::Limit,
		price: 100 + (n % 50) as i64,
		executed_value: 0,
		average_price: 0,
		quantity: 1 + (n % 9) as i64,
		filled_quantity: 0,
		remaining_quantity: 1 + (n % 9) as i64,
		cancelled_quantity: 0,
		client_timestamp: 0,
		gateway_timestamp: 0,
		engine_timestamp: n,
	};
	EngineEvent::new(EventType::OrderAccepted, body.user_id.clone(), body.to_bytes().unwrap())
		.encode()
		.unwrap()
}

fn segment_files(dir: &std::path::Path) -> Vec<String> {
	let mut names: Vec<String> = std::fs::read_dir(dir.join("BTCUSD"))
		.unwrap()
		.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
		.filter(|n| n.ends_with(".log"))
		.collect();
	names.sort();
	names
}

#[test]
fn test_round_trip_across_rotation() {
	let dir = tempfile::tempdir().unwrap();
	let wal =
		SegmentedWal::open(dir.path(), "BTCUSD", 4 * 1024, false, Duration::from_millis(50))
			.unwrap();

	for n in 1..=1000u64 {
		let sequence = wal.write(&accepted_event(n)).unwrap();
		assert_eq!(sequence, n);
	}
	wal.flush().unwrap();

	assert!(
		segment_files(dir.path()).len() >= 2,
		"4 KiB segments must have rotated"
	);

	let entries = wal.read_range(1, 1000).unwrap();
	assert_eq!(entries.len(), 1000);
	for (i, entry) in entries.iter().enumerate() {
		assert_eq!(entry.sequence_number, i as u64 + 1, "sequence gap at {i}");
	}

	// Payloads survive the trip intact and still decode.
	let event = EngineEvent::decode(&entries[41].data).unwrap();
	assert_eq!(event.event_type, EventType::OrderAccepted);
	assert_eq!(event.order_status_body().unwrap().order_id, "order-42");
}

#[test]
fn test_reader_observes_total_order_across_segments() {
	let dir = tempfile::tempdir().unwrap();
	let wal =
		SegmentedWal::open(dir.path(), "BTCUSD", 2 * 1024, false, Duration::from_millis(50))
			.unwrap();
	for n in 1..=200u64 {
		wal.write(&accepted_event(n)).unwrap();
	}
	wal.flush().unwrap();

	// A range that straddles at least one segment boundary.
	let entries = wal.read_range(50, 150).unwrap();
	let sequences: Vec<u64> = entries.iter().map(|e| e.sequence_number).collect();
	assert_eq!(sequences, (50..=150).collect::<Vec<u64>>());
}

#[test]
fn test_sequence_numbering_survives_reopen_after_rotation() {
	let dir = tempfile::tempdir().unwrap();
	{
		let wal =
			SegmentedWal::open(dir.path(), "BTCUSD", 2 * 1024, false, Duration::from_millis(50))
				.unwrap();
		for n in 1..=100u64 {
			wal.write(&accepted_event(n)).unwrap();
		}
		wal.flush().unwrap();
	}

	let wal =
		SegmentedWal::open(dir.path(), "BTCUSD", 2 * 1024, false, Duration::from_millis(50))
			.unwrap();
	assert_eq!(wal.last_sequence(), 100);
	assert_eq!(wal.write(&accepted_event(101)).unwrap(), 101);
}

#[test]
fn test_corrupted_record_fails_crc() {
	let dir = tempfile::tempdir().unwrap();
	let wal =
		SegmentedWal::open(dir.path(), "BTCUSD", 1 << 20, false, Duration::from_millis(50))
			.unwrap();
	for n in 1..=3u64 {
		wal.write(&accepted_event(n)).unwrap();
	}
	wal.flush().unwrap();

	// Flip one payload byte in the middle of the segment.
	let path = dir.path().join("BTCUSD/0.log");
	let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
	file.seek(SeekFrom::Start(64)).unwrap();
	let mut byte = [0u8; 1];
	file.read_exact(&mut byte).unwrap();
	file.seek(SeekFrom::Start(64)).unwrap();
	file.write_all(&[byte[0] ^ 0xFF]).unwrap();

	assert!(matches!(
		wal.read_range(1, 3),
		Err(WalError::CrcMismatch { .. }) | Err(WalError::Decode(_))
	));
}

#[test]
fn test_truncated_tail_frame_detected() {
	let dir = tempfile::tempdir().unwrap();
	let wal =
		SegmentedWal::open(dir.path(), "BTCUSD", 1 << 20, false, Duration::from_millis(50))
			.unwrap();
	for n in 1..=3u64 {
		wal.write(&accepted_event(n)).unwrap();
	}
	wal.flush().unwrap();

	let path = dir.path().join("BTCUSD/0.log");
	let len = std::fs::metadata(&path).unwrap().len();
	let file = OpenOptions::new().write(true).open(&path).unwrap();
	file.set_len(len - 10).unwrap();

	assert!(matches!(
		wal.read_from(1),
		Err(WalError::TruncatedFrame { .. })
	));
}
