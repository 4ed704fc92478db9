use crate::bus::{BusQueue, Side};
use crate::envelope::{ENVELOPE_LEN, decode_header, encode_header};
use crate::error::BusError;
use crate::message::{Message, REF_UNSET};
use floor_events::MsgType;
use floor_icc::{CircularStore, FixedReader, FixedWriter, QPos, QueueError};
use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant};

/// Payload that marks a successful reply.
const ACK: &[u8] = b"Ack";

/// One endpoint of a bus: a reader on the inbound direction, a writer on the
/// outbound one, and a private subscription filter.
///
/// Publishing and synchronous requests take `&self`, so a channel can be
/// shared between threads; only [`next_message`](Self::next_message) moves
/// the channel's own read cursor.
pub struct Channel {
    side: Side,
    inbound: BusQueue,
    reader: FixedReader<dyn CircularStore>,
    writer: FixedWriter<dyn CircularStore>,
    subscriptions: HashSet<MsgType>,
    /// Padding source for the unused tail of a slot.
    zeros: Vec<u8>,
    poll_interval: Duration,
}

impl Channel {
    pub(crate) fn new(side: Side, inbound: BusQueue, outbound: BusQueue, poll_interval: Duration) -> Self {
        let zeros = vec![0u8; outbound.slot_size() - ENVELOPE_LEN];
        Self {
            side,
            reader: inbound.reader(),
            writer: outbound.writer(),
            inbound,
            subscriptions: HashSet::new(),
            zeros,
            poll_interval,
        }
    }

    pub fn server(bus: &crate::Bus) -> Self {
        bus.server_channel()
    }

    pub fn client(bus: &crate::Bus) -> Self {
        bus.client_channel()
    }

    #[inline]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Largest payload [`publish`](Self::publish) accepts.
    #[inline]
    pub fn max_payload(&self) -> usize {
        self.zeros.len()
    }

    /// Deliver messages of `msg_type` from [`next_message`](Self::next_message).
    /// While nothing is subscribed every type is delivered.
    pub fn subscribe(&mut self, msg_type: MsgType) {
        self.subscriptions.insert(msg_type);
    }

    pub fn unsubscribe(&mut self, msg_type: MsgType) {
        self.subscriptions.remove(&msg_type);
    }

    pub fn is_subscribed(&self, msg_type: MsgType) -> bool {
        self.subscriptions.is_empty() || self.subscriptions.contains(&msg_type)
    }

    /// Publish one message. `ref_token` of `None` leaves the ref unset, so
    /// receivers see the message's own position as its ref.
    ///
    /// Returns the position the message was published at.
    pub fn publish(&self, msg_type: MsgType, payload: &[u8], ref_token: Option<u64>) -> Result<QPos, BusError> {
        let max = self.max_payload();
        if payload.len() > max {
            return Err(BusError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }

        let mut claim = self.writer.claim()?;
        claim.write(0, &encode_header(msg_type, ref_token.unwrap_or(REF_UNSET)));
        claim.write(ENVELOPE_LEN, payload);
        claim.write(ENVELOPE_LEN + payload.len(), &self.zeros[payload.len()..]);
        Ok(claim.commit())
    }

    /// Publish `msg` as is, ref included.
    pub fn update(&self, msg: &Message) -> Result<QPos, BusError> {
        self.publish(msg.msg_type(), msg.data(), Some(msg.ref_token()))
    }

    /// Next inbound message this channel is subscribed to, or `None` once
    /// nothing more is ready. Other types are stepped over and never
    /// delivered to this channel.
    ///
    /// A reader that fell too far behind skips ahead to the oldest message
    /// still intact; what it skipped is lost to this channel.
    pub fn next_message(&mut self) -> Option<Message> {
        loop {
            let pos = self.reader.pos();
            match self.reader.next_slice() {
                Ok(slot) => {
                    let (msg_type, _) = decode_header(slot);
                    let wanted = self.subscriptions.is_empty() || self.subscriptions.contains(&msg_type);
                    let msg = wanted.then(|| Message::from_slot(slot, pos));
                    if self.reader.lapped() {
                        self.recover_overflow(pos);
                        continue;
                    }
                    self.reader.advance();
                    if msg.is_some() {
                        return msg;
                    }
                }
                Err(QueueError::Again) => return None,
                Err(QueueError::Overflow { pos }) => self.recover_overflow(pos),
                Err(QueueError::Malformed { pos }) => {
                    tracing::error!(pos, side = ?self.side, "unreadable slot; resyncing to top");
                    self.reader.seek_to_top();
                }
            }
        }
    }

    fn recover_overflow(&mut self, pos: QPos) {
        let skipped = self.reader.catch_up();
        tracing::warn!(pos, skipped, side = ?self.side, "channel overflowed; messages lost");
    }

    /// Publish `req` and wait for the reply that carries its position as ref.
    ///
    /// The request always goes out with its ref unset. Replies are looked
    /// for on a private reader opened just before publishing, so the
    /// channel's own cursor and subscriptions are untouched and concurrent
    /// requests on one channel never see each other's replies.
    ///
    /// A timeout too large to represent as an instant waits indefinitely.
    pub fn request(&self, req: &Message, timeout: Duration) -> Result<Message, BusError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut replies = self.inbound.reader();
        let token = self.publish(req.msg_type(), req.data(), None)?;

        loop {
            if let Some(reply) = scan_for_reply(&mut replies, token) {
                return Ok(reply);
            }
            let left = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => Duration::MAX,
            };
            if left.is_zero() {
                tracing::debug!(token, ?timeout, msg_type = ?req.msg_type(), "request timed out");
                return Err(BusError::Timeout { after: timeout });
            }
            thread::sleep(self.poll_interval.min(left));
        }
    }

    /// [`request`](Self::request), succeeding only if the reply is of
    /// `ack_type` and its payload starts with `Ack`. Any other reply is
    /// returned as [`BusError::Nack`] carrying the reply text.
    pub fn request_and_check_ack(&self, req: &Message, ack_type: MsgType, timeout: Duration) -> Result<(), BusError> {
        let reply = self.request(req, timeout)?;
        if reply.msg_type() == ack_type && reply.data().starts_with(ACK) {
            return Ok(());
        }
        Err(BusError::Nack(reply.text().into_owned()))
    }

    /// Answer `original`, echoing its ref.
    pub fn reply(&self, original: &Message, msg_type: MsgType, payload: &[u8]) -> Result<QPos, BusError> {
        self.publish(msg_type, payload, Some(original.ref_token()))
    }

    pub fn reply_ack(&self, original: &Message, ack_type: MsgType) -> Result<QPos, BusError> {
        self.reply(original, ack_type, ACK)
    }

    /// Answer `original` with a failure the requester will see as a nack.
    pub fn reply_error(&self, original: &Message, ack_type: MsgType, reason: &str) -> Result<QPos, BusError> {
        self.reply(original, ack_type, reason.as_bytes())
    }
}

/// Drain `replies` looking for a slot whose wire ref equals `token`.
///
/// The raw ref is compared, not the one filled in at receipt: an unrelated
/// message with no ref must not match just because it sits at `token` in
/// the other direction.
fn scan_for_reply(replies: &mut FixedReader<dyn CircularStore>, token: u64) -> Option<Message> {
    loop {
        let pos = replies.pos();
        match replies.next_slice() {
            Ok(slot) => {
                let (_, ref_token) = decode_header(slot);
                let found = (ref_token == token).then(|| Message::from_slot(slot, pos));
                if replies.lapped() {
                    replies.catch_up();
                    continue;
                }
                replies.advance();
                if found.is_some() {
                    return found;
                }
            }
            Err(QueueError::Again) => return None,
            Err(QueueError::Overflow { .. }) => {
                replies.catch_up();
            }
            Err(QueueError::Malformed { .. }) => replies.seek_to_top(),
        }
    }
}
