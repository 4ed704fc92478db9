pub mod book_key;
pub mod msg_type;

pub use book_key::BookKey;
pub use msg_type::MsgType;
