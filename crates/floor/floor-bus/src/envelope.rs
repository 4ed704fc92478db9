//! Slot layout on the wire: `type:i32 | ref:u64 | payload`, little-endian,
//! packed. The payload fills the rest of the slot.

use floor_events::MsgType;

pub const ENVELOPE_LEN: usize = size_of::<i32>() + size_of::<u64>();

#[inline]
pub fn encode_header(msg_type: MsgType, ref_token: u64) -> [u8; ENVELOPE_LEN] {
    let mut h = [0u8; ENVELOPE_LEN];
    h[..4].copy_from_slice(&msg_type.0.to_le_bytes());
    h[4..].copy_from_slice(&ref_token.to_le_bytes());
    h
}

/// # Panics
/// Panics if `slot` is shorter than the envelope header.
#[inline]
pub fn decode_header(slot: &[u8]) -> (MsgType, u64) {
    let mut ty = [0u8; 4];
    let mut rf = [0u8; 8];
    ty.copy_from_slice(&slot[..4]);
    rf.copy_from_slice(&slot[4..ENVELOPE_LEN]);
    (MsgType(i32::from_le_bytes(ty)), u64::from_le_bytes(rf))
}
