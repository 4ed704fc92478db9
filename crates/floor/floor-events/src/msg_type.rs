#![forbid(unsafe_code)]

// Type tags are stable across every process attached to a bus, so they are
// plain integers on the wire. repr(transparent) keeps MsgType laid out as i32.

/// Tag carried in every bus envelope. The set is open: subsystems may use
/// values outside the shared constants below.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MsgType(pub i32);

impl MsgType {
    pub const PING: MsgType = MsgType(1);
    pub const PING_ACK: MsgType = MsgType(2);

    pub const EXEC_REPORT: MsgType = MsgType(10);

    pub const POSITION_GET: MsgType = MsgType(20);
    pub const POSITION_SET: MsgType = MsgType(21);
    pub const POSITION_ACK: MsgType = MsgType(22);

    pub const USER_COMMAND: MsgType = MsgType(30);
    pub const USER_COMMAND_ACK: MsgType = MsgType(31);

    pub const BOOK_DELTA: MsgType = MsgType(40);

    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::PING => "Ping",
            Self::PING_ACK => "PingAck",
            Self::EXEC_REPORT => "ExecReport",
            Self::POSITION_GET => "PositionGet",
            Self::POSITION_SET => "PositionSet",
            Self::POSITION_ACK => "PositionAck",
            Self::USER_COMMAND => "UserCommand",
            Self::USER_COMMAND_ACK => "UserCommandAck",
            Self::BOOK_DELTA => "BookDelta",
            _ => return None,
        })
    }
}

impl From<i32> for MsgType {
    fn from(raw: i32) -> Self {
        MsgType(raw)
    }
}

impl From<MsgType> for i32 {
    fn from(t: MsgType) -> Self {
        t.0
    }
}
