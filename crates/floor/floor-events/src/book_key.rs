//! Market-data book channels: one bus per venue, symbol and book depth.

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BookKey {
    pub venue: String,
    pub symbol: String,
    /// Book depth carried on the channel (1 = top of book).
    pub level: u8,
}

impl BookKey {
    pub fn new(venue: impl Into<String>, symbol: impl Into<String>, level: u8) -> Self {
        Self {
            venue: venue.into(),
            symbol: symbol.into(),
            level,
        }
    }

    /// Name of the bus carrying this book.
    pub fn bus_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "md.{}.{}.{}", self.venue, self.symbol, self.level)
    }
}
