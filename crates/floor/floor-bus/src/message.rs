use crate::envelope::{ENVELOPE_LEN, decode_header};
use floor_events::MsgType;
use floor_icc::QPos;
use std::borrow::Cow;

/// `ref` value meaning "not assigned"; the receiving reader fills in the
/// message's own position.
pub const REF_UNSET: u64 = u64::MAX;

/// Smallest buffer a message grows to.
const MIN_CAPACITY: usize = 64;

/// A bus payload: type tag, correlation token and an owned byte buffer.
///
/// The buffer only grows, doubling each time, so a message reused in a loop
/// stops allocating once it has seen its largest payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    msg_type: MsgType,
    ref_token: u64,
    data: Vec<u8>,
}

impl Message {
    pub fn new(msg_type: MsgType) -> Self {
        Self {
            msg_type,
            ref_token: REF_UNSET,
            data: Vec::new(),
        }
    }

    pub fn with_data(msg_type: MsgType, data: &[u8]) -> Self {
        let mut m = Self::new(msg_type);
        m.copy_data(data);
        m
    }

    pub fn with_text(msg_type: MsgType, text: &str) -> Self {
        let mut m = Self::new(msg_type);
        m.copy_string(text);
        m
    }

    /// Rebuild a message from a raw slot read at `pos`.
    pub(crate) fn from_slot(slot: &[u8], pos: QPos) -> Self {
        let (msg_type, ref_token) = decode_header(slot);
        let mut m = Self::new(msg_type);
        m.ref_token = if ref_token == REF_UNSET { pos } else { ref_token };
        m.copy_data(&slot[ENVELOPE_LEN..]);
        m
    }

    #[inline]
    pub fn msg_type(&self) -> MsgType {
        self.msg_type
    }

    pub fn set_type(&mut self, msg_type: MsgType) {
        self.msg_type = msg_type;
    }

    #[inline]
    pub fn ref_token(&self) -> u64 {
        self.ref_token
    }

    pub fn set_ref(&mut self, ref_token: u64) {
        self.ref_token = ref_token;
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Replace the payload with `bytes`.
    pub fn copy_data(&mut self, bytes: &[u8]) {
        self.data.clear();
        self.grow_to(bytes.len());
        self.data.extend_from_slice(bytes);
    }

    pub fn copy_string(&mut self, text: &str) {
        self.copy_data(text.as_bytes());
    }

    /// Payload up to the first NUL, as text. Slots are zero-padded, so this
    /// recovers a string payload after a trip through the bus.
    pub fn text(&self) -> Cow<'_, str> {
        let end = self.data.iter().position(|&b| b == 0).unwrap_or(self.data.len());
        String::from_utf8_lossy(&self.data[..end])
    }

    fn grow_to(&mut self, needed: usize) {
        let mut cap = self.data.capacity();
        if cap >= needed {
            return;
        }
        cap = cap.max(MIN_CAPACITY);
        while cap < needed {
            cap *= 2;
        }
        // data is empty here, so reserve_exact(cap) yields exactly cap
        self.data.reserve_exact(cap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::encode_header;

    #[test]
    fn new_message_has_unset_ref() {
        let m = Message::with_data(MsgType::PING, b"hi");
        assert_eq!(m.ref_token(), REF_UNSET);
        assert_eq!(m.data(), b"hi");
        assert_eq!(m.size(), 2);
    }

    #[test]
    fn buffer_doubles_and_never_shrinks() {
        let mut m = Message::new(MsgType::EXEC_REPORT);
        m.copy_data(&[1u8; 10]);
        assert_eq!(m.capacity(), 64);

        m.copy_data(&[1u8; 200]);
        assert_eq!(m.capacity(), 256);

        m.copy_data(&[1u8; 3]);
        assert_eq!(m.size(), 3);
        assert_eq!(m.capacity(), 256);
    }

    #[test]
    fn text_stops_at_padding() {
        let mut m = Message::new(MsgType::USER_COMMAND_ACK);
        m.copy_data(b"Ack\0\0\0\0");
        assert_eq!(m.text(), "Ack");
        m.copy_string("no padding");
        assert_eq!(m.text(), "no padding");
    }

    #[test]
    fn unset_ref_becomes_slot_position_on_receipt() {
        let mut slot = vec![0u8; 32];
        slot[..ENVELOPE_LEN].copy_from_slice(&encode_header(MsgType::PING, REF_UNSET));
        slot[ENVELOPE_LEN..ENVELOPE_LEN + 4].copy_from_slice(b"ping");

        let m = Message::from_slot(&slot, 4096);
        assert_eq!(m.ref_token(), 4096);
        assert_eq!(m.msg_type(), MsgType::PING);
        assert_eq!(m.size(), 20);
        assert_eq!(m.text(), "ping");

        slot[..ENVELOPE_LEN].copy_from_slice(&encode_header(MsgType::PING_ACK, 77));
        assert_eq!(Message::from_slot(&slot, 4096).ref_token(), 77);
    }
}
