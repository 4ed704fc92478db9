use crate::bus::{Bus, BusOptions};
use crate::error::BusError;
use floor_events::BookKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Process-wide table of open buses, keyed by name.
///
/// Opening goes through here so that every channel in the process lands on
/// the same pair of queues for a given name, whatever the backing.
pub struct BusRegistry {
    options: BusOptions,
    buses: Mutex<HashMap<String, Arc<Bus>>>,
}

impl BusRegistry {
    pub fn new(options: BusOptions) -> Self {
        Self {
            options,
            buses: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &BusOptions {
        &self.options
    }

    /// The bus called `name`, opened on first use.
    pub fn open(&self, name: &str) -> Result<Arc<Bus>, BusError> {
        let mut buses = self.buses.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bus) = buses.get(name) {
            return Ok(Arc::clone(bus));
        }
        let bus = Arc::new(Bus::open(name, &self.options)?);
        buses.insert(name.to_string(), Arc::clone(&bus));
        Ok(bus)
    }

    /// The market-data bus for one book.
    pub fn open_book(&self, key: &BookKey) -> Result<Arc<Bus>, BusError> {
        self.open(&key.bus_name())
    }

    pub fn len(&self) -> usize {
        self.buses.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MsgType;

    fn registry() -> BusRegistry {
        BusRegistry::new(BusOptions {
            queue_len: 64 * 16,
            slot_size: 64,
            ..BusOptions::default()
        })
    }

    #[test]
    fn same_name_yields_the_same_bus() {
        let reg = registry();
        let a = reg.open("orders").unwrap();
        let b = reg.open("orders").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);

        let mut server = a.server_channel();
        b.client_channel().publish(MsgType::PING, b"hi", None).unwrap();
        assert_eq!(server.next_message().unwrap().text(), "hi");
    }

    #[test]
    fn book_buses_are_named_by_key() {
        let reg = registry();
        let key = BookKey::new("XNAS", "AAPL", 1);
        let bus = reg.open_book(&key).unwrap();
        assert_eq!(bus.name(), "md.XNAS.AAPL.1");
        assert!(!Arc::ptr_eq(&bus, &reg.open("orders").unwrap()));
        assert_eq!(reg.len(), 2);
    }
}
