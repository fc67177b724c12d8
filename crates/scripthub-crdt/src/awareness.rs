//! Awareness set: ephemeral per-client presence state.
//!
//! Maps a numeric CRDT client id to an opaque JSON state (identity, cursor,
//! selection) plus a monotonically increasing clock. Removal of a client is
//! broadcast by transmitting its id with a bumped clock and a `null` state;
//! stale entries are reaped locally after a timeout.
//!
//! Wire format of a delta (y-protocol awareness): `varUint(count)`, then per
//! client `varUint(clientId)`, `varUint(clock)`, `varString(jsonState)` where
//! the literal string `null` marks removal. The hub applies clock rules but
//! never interprets the JSON itself.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::codec::{DecodeError, Reader, write_var_string, write_var_uint};

/// Entries not refreshed within this window are reaped locally
pub const AWARENESS_STALE_TIMEOUT: Duration = Duration::from_secs(30);

const NULL_STATE: &str = "null";

#[derive(Debug, Clone)]
struct AwarenessEntry {
	clock: u64,
	/// `None` is a removal tombstone; the clock keeps counting so late
	/// deltas with older clocks stay rejected
	state: Option<Box<str>>,
	last_seen: Instant,
}

/// Net effect of applying one awareness delta
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AwarenessChange {
	pub added: Vec<u64>,
	pub updated: Vec<u64>,
	pub removed: Vec<u64>,
	/// Every client id carried by the delta, accepted or not; connections
	/// track these to know which entries to remove on disconnect
	pub touched: Vec<u64>,
}

impl AwarenessChange {
	pub fn is_noop(&self) -> bool {
		self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
	}
}

#[derive(Debug, Default)]
pub struct AwarenessSet {
	entries: HashMap<u64, AwarenessEntry>,
}

impl AwarenessSet {
	pub fn new() -> Self {
		Self { entries: HashMap::new() }
	}

	/// Number of clients with live (non-tombstone) state
	pub fn len(&self) -> usize {
		self.entries.values().filter(|e| e.state.is_some()).count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Merge a remote delta using last-writer-wins clock rules: an entry is
	/// accepted when its clock is newer, or equal-clock `null` beats a live
	/// state (removal wins ties).
	pub fn apply_update(
		&mut self,
		payload: &[u8],
		now: Instant,
	) -> Result<AwarenessChange, DecodeError> {
		// Parse fully before mutating: a malformed delta is discarded whole
		let mut reader = Reader::new(payload);
		let count = reader.read_var_uint()?;
		let mut parsed = Vec::with_capacity(count.min(1024) as usize);
		for _ in 0..count {
			let client_id = reader.read_var_uint()?;
			let clock = reader.read_var_uint()?;
			let json = reader.read_var_string()?;
			parsed.push((client_id, clock, json));
		}

		let mut change = AwarenessChange::default();
		for (client_id, clock, json) in parsed {
			let is_null = json == NULL_STATE;
			change.touched.push(client_id);

			let accepted = match self.entries.get(&client_id) {
				Some(prev) => {
					clock > prev.clock || (clock == prev.clock && is_null && prev.state.is_some())
				}
				None => true,
			};
			if !accepted {
				continue;
			}

			let had_state =
				self.entries.get(&client_id).is_some_and(|prev| prev.state.is_some());
			let state = if is_null { None } else { Some(Box::from(json)) };

			match (had_state, state.is_some()) {
				(false, true) => change.added.push(client_id),
				(true, true) => change.updated.push(client_id),
				(true, false) => change.removed.push(client_id),
				(false, false) => {}
			}

			self.entries.insert(client_id, AwarenessEntry { clock, state, last_seen: now });
		}

		Ok(change)
	}

	/// Snapshot of every live state, for newly attached sessions
	pub fn encode_full(&self) -> Vec<u8> {
		let live: Vec<_> =
			self.entries.iter().filter(|(_, e)| e.state.is_some()).collect();
		let mut buf = Vec::new();
		write_var_uint(&mut buf, live.len() as u64);
		for (client_id, entry) in live {
			write_var_uint(&mut buf, *client_id);
			write_var_uint(&mut buf, entry.clock);
			write_var_string(&mut buf, entry.state.as_deref().unwrap_or(NULL_STATE));
		}
		buf
	}

	/// Remove the given clients, bumping their clocks, and encode the removal
	/// delta to broadcast. Unknown ids are skipped; an empty result means
	/// there is nothing to send.
	pub fn remove_clients(&mut self, client_ids: &[u64]) -> Vec<u8> {
		let mut removed: Vec<(u64, u64)> = Vec::new();
		for client_id in client_ids {
			if let Some(entry) = self.entries.get_mut(client_id) {
				if entry.state.is_some() {
					entry.clock += 1;
					entry.state = None;
					removed.push((*client_id, entry.clock));
				}
			}
		}
		if removed.is_empty() {
			return Vec::new();
		}

		let mut buf = Vec::new();
		write_var_uint(&mut buf, removed.len() as u64);
		for (client_id, clock) in removed {
			write_var_uint(&mut buf, client_id);
			write_var_uint(&mut buf, clock);
			write_var_string(&mut buf, NULL_STATE);
		}
		buf
	}

	/// Reap entries not refreshed within `timeout`. Live entries turn into a
	/// broadcastable removal delta; old tombstones are dropped silently.
	pub fn prune_stale(&mut self, timeout: Duration, now: Instant) -> Vec<u8> {
		let stale: Vec<u64> = self
			.entries
			.iter()
			.filter(|(_, e)| now.duration_since(e.last_seen) >= timeout)
			.map(|(id, _)| *id)
			.collect();

		let mut live_stale: Vec<u64> = Vec::new();
		for client_id in stale {
			match self.entries.get(&client_id) {
				Some(entry) if entry.state.is_some() => live_stale.push(client_id),
				_ => {
					self.entries.remove(&client_id);
				}
			}
		}
		self.remove_clients(&live_stale)
	}
}


// vim: ts=4
