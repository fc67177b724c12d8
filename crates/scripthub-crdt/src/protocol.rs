//! Sync protocol messages.
//!
//! Two top-level message types ride on the frame codec:
//!
//! - `messageSync (0)` - one of three sub-messages, each prefixed by its own
//!   varUint subtype: `syncStep1 (0)` carrying a state vector, `syncStep2 (1)`
//!   carrying an update, `update (2)` carrying an incremental update.
//! - `messageAwareness (1)` - an awareness delta payload.
//!
//! Payloads are opaque byte arrays; the hub never decodes them beyond the
//! message-type varUints. Unknown types decode to [`Message::Unknown`] and
//! are silently dropped by the dispatcher (forward compatibility). Since an
//! unknown body has no known framing, it consumes the rest of the frame.

use crate::codec::{DecodeError, Reader, write_var_bytes, write_var_uint};

pub const MSG_SYNC: u64 = 0;
pub const MSG_AWARENESS: u64 = 1;

pub const SYNC_STEP_1: u64 = 0;
pub const SYNC_STEP_2: u64 = 1;
pub const SYNC_UPDATE: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
	/// Sender's state vector; the receiver answers with `Step2`
	Step1(Vec<u8>),
	/// Update bringing the receiver up to date; applied, never rebroadcast
	Step2(Vec<u8>),
	/// Incremental update; applied and fanned out to the rest of the room
	Update(Vec<u8>),
	Unknown(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
	Sync(SyncMessage),
	Awareness(Vec<u8>),
	Unknown(u64),
}

impl Message {
	pub fn sync_step1(state_vector: &[u8]) -> Message {
		Message::Sync(SyncMessage::Step1(state_vector.to_vec()))
	}

	pub fn sync_step2(update: &[u8]) -> Message {
		Message::Sync(SyncMessage::Step2(update.to_vec()))
	}

	pub fn sync_update(update: &[u8]) -> Message {
		Message::Sync(SyncMessage::Update(update.to_vec()))
	}

	pub fn awareness(payload: &[u8]) -> Message {
		Message::Awareness(payload.to_vec())
	}

	pub fn encode(&self) -> Vec<u8> {
		let mut buf = Vec::new();
		match self {
			Message::Sync(sync) => {
				write_var_uint(&mut buf, MSG_SYNC);
				match sync {
					SyncMessage::Step1(payload) => {
						write_var_uint(&mut buf, SYNC_STEP_1);
						write_var_bytes(&mut buf, payload);
					}
					SyncMessage::Step2(payload) => {
						write_var_uint(&mut buf, SYNC_STEP_2);
						write_var_bytes(&mut buf, payload);
					}
					SyncMessage::Update(payload) => {
						write_var_uint(&mut buf, SYNC_UPDATE);
						write_var_bytes(&mut buf, payload);
					}
					SyncMessage::Unknown(subtype) => {
						write_var_uint(&mut buf, *subtype);
					}
				}
			}
			Message::Awareness(payload) => {
				write_var_uint(&mut buf, MSG_AWARENESS);
				write_var_bytes(&mut buf, payload);
			}
			Message::Unknown(msg_type) => {
				write_var_uint(&mut buf, *msg_type);
			}
		}
		buf
	}

	pub fn decode(reader: &mut Reader<'_>) -> Result<Message, DecodeError> {
		let msg_type = reader.read_var_uint()?;
		match msg_type {
			MSG_SYNC => {
				let subtype = reader.read_var_uint()?;
				let msg = match subtype {
					SYNC_STEP_1 => SyncMessage::Step1(reader.read_var_bytes()?.to_vec()),
					SYNC_STEP_2 => SyncMessage::Step2(reader.read_var_bytes()?.to_vec()),
					SYNC_UPDATE => SyncMessage::Update(reader.read_var_bytes()?.to_vec()),
					other => {
						reader.skip_rest();
						SyncMessage::Unknown(other)
					}
				};
				Ok(Message::Sync(msg))
			}
			MSG_AWARENESS => Ok(Message::Awareness(reader.read_var_bytes()?.to_vec())),
			other => {
				reader.skip_rest();
				Ok(Message::Unknown(other))
			}
		}
	}
}

/// Iterator over every message concatenated in one WebSocket frame.
///
/// A decode error terminates iteration after being yielded once; earlier
/// messages from the same frame are still delivered.
pub struct MessageReader<'a> {
	reader: Reader<'a>,
	failed: bool,
}

impl<'a> MessageReader<'a> {
	pub fn new(frame: &'a [u8]) -> Self {
		Self { reader: Reader::new(frame), failed: false }
	}
}

impl Iterator for MessageReader<'_> {
	type Item = Result<Message, DecodeError>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.failed || self.reader.is_empty() {
			return None;
		}
		let res = Message::decode(&mut self.reader);
		if res.is_err() {
			self.failed = true;
		}
		Some(res)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_sync_message_roundtrips() {
		let messages = [
			Message::sync_step1(&[1, 2, 3]),
			Message::sync_step2(&[0, 0]),
			Message::sync_update(&[9, 8, 7, 6]),
			Message::awareness(&[4, 5]),
		];
		for msg in messages {
			let encoded = msg.encode();
			let mut reader = Reader::new(&encoded);
			assert_eq!(Message::decode(&mut reader), Ok(msg));
			assert!(reader.is_empty());
		}
	}

	#[test]
	fn test_wire_layout() {
		// messageSync=0, syncStep1=0, varBytes([0xaa])
		assert_eq!(Message::sync_step1(&[0xaa]).encode(), vec![0, 0, 1, 0xaa]);
		// messageSync=0, update=2, varBytes([1, 2])
		assert_eq!(Message::sync_update(&[1, 2]).encode(), vec![0, 2, 2, 1, 2]);
		// messageAwareness=1, varBytes([])
		assert_eq!(Message::awareness(&[]).encode(), vec![1, 0]);
	}

	#[test]
	fn test_unknown_type_consumes_frame() {
		let mut frame = vec![];
		crate::codec::write_var_uint(&mut frame, 7);
		frame.extend_from_slice(&[1, 2, 3, 4]);

		let mut reader = Reader::new(&frame);
		assert_eq!(Message::decode(&mut reader), Ok(Message::Unknown(7)));
		assert!(reader.is_empty());
	}

	#[test]
	fn test_unknown_sync_subtype() {
		let mut frame = vec![];
		crate::codec::write_var_uint(&mut frame, MSG_SYNC);
		crate::codec::write_var_uint(&mut frame, 9);
		frame.extend_from_slice(&[1, 2, 3]);

		let mut reader = Reader::new(&frame);
		assert_eq!(Message::decode(&mut reader), Ok(Message::Sync(SyncMessage::Unknown(9))));
	}

	#[test]
	fn test_truncated_message_fails_closed() {
		// syncStep2 announcing 10 bytes but carrying 2
		let mut frame = vec![0, 1];
		crate::codec::write_var_uint(&mut frame, 10);
		frame.extend_from_slice(&[1, 2]);

		let mut reader = Reader::new(&frame);
		assert_eq!(Message::decode(&mut reader), Err(DecodeError::LengthOutOfBounds));
	}

	#[test]
	fn test_message_reader_multiple_messages() {
		let mut frame = Message::sync_update(&[1]).encode();
		frame.extend(Message::awareness(&[2, 3]).encode());

		let messages: Vec<_> = MessageReader::new(&frame).collect();
		assert_eq!(messages.len(), 2);
		assert_eq!(messages[0], Ok(Message::sync_update(&[1])));
		assert_eq!(messages[1], Ok(Message::awareness(&[2, 3])));
	}

	#[test]
	fn test_message_reader_stops_after_error() {
		let mut frame = Message::sync_update(&[1]).encode();
		frame.push(0x80); // dangling continuation byte

		let messages: Vec<_> = MessageReader::new(&frame).collect();
		assert_eq!(messages.len(), 2);
		assert!(messages[0].is_ok());
		assert!(messages[1].is_err());
	}

	#[test]
	fn test_empty_frame_yields_nothing() {
		assert_eq!(MessageReader::new(&[]).count(), 0);
	}
}

// vim: ts=4
