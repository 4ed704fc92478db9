use crate::channel::Channel;
use crate::envelope::ENVELOPE_LEN;
use crate::error::BusError;
use floor_icc::{CircularStore, FixedQueue, HeapStore, MWQ_HEADER_LEN, MmapStore, OpenMode, QueueConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Where the two queues of a bus live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backing {
    /// Process-local memory. Only channels of the same `Bus` value see each other.
    Heap,
    /// Memory-mapped files under `dir`, shared by every process that opens
    /// the same bus name.
    Shm { dir: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusOptions {
    /// Bytes per direction.
    pub queue_len: u64,
    /// Bytes per message slot, envelope included.
    pub slot_size: usize,
    /// Sleep between unsuccessful scans of a synchronous request.
    pub poll_interval: Duration,
    pub claim_timeout: Option<Duration>,
    pub backing: Backing,
    /// How shared-memory queues are attached. `Initialize` resets both
    /// queues of the bus; only the process that owns the bus should use it,
    /// before any other process attaches. Ignored for heap buses.
    pub open_mode: OpenMode,
}

impl Default for BusOptions {
    fn default() -> Self {
        Self {
            queue_len: 1 << 20,
            slot_size: 1024,
            poll_interval: Duration::from_micros(100),
            claim_timeout: Some(Duration::from_secs(1)),
            backing: Backing::Heap,
            open_mode: OpenMode::AttachOrInitialize,
        }
    }
}

impl BusOptions {
    /// Reject geometry the queues cannot run with.
    fn validate(&self) -> Result<(), BusError> {
        let reason = if self.slot_size <= ENVELOPE_LEN {
            "slot cannot hold the message envelope"
        } else if self.slot_size as u64 > self.queue_len / 2 {
            "slot does not fit twice in the queue"
        } else {
            return Ok(());
        };
        Err(BusError::Geometry {
            queue_len: self.queue_len,
            slot_size: self.slot_size,
            reason,
        })
    }

    fn queue_config(&self) -> QueueConfig {
        QueueConfig::new(self.queue_len, self.slot_size).with_claim_timeout(self.claim_timeout)
    }
}

/// Which end of the bus a channel sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Reads client-to-server, writes server-to-client.
    Server,
    /// Reads server-to-client, writes client-to-server.
    Client,
}

pub(crate) type BusQueue = FixedQueue<dyn CircularStore>;

/// A named duplex bus: one fixed-slot queue per direction.
pub struct Bus {
    name: String,
    to_server: BusQueue,
    to_client: BusQueue,
    poll_interval: Duration,
}

impl Bus {
    /// Open (or create) the bus called `name`.
    pub fn open(name: &str, options: &BusOptions) -> Result<Self, BusError> {
        options.validate()?;
        let cfg = options.queue_config();
        let to_server = open_queue(name, "c2s", options, cfg)?;
        let to_client = open_queue(name, "s2c", options, cfg)?;
        tracing::info!(
            bus = name,
            backing = ?options.backing,
            mode = ?options.open_mode,
            slot_size = options.slot_size,
            "bus opened"
        );

        Ok(Self {
            name: name.to_string(),
            to_server,
            to_client,
            poll_interval: options.poll_interval,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slot_size(&self) -> usize {
        self.to_server.slot_size()
    }

    /// Largest payload one message can carry.
    pub fn max_payload(&self) -> usize {
        self.slot_size() - ENVELOPE_LEN
    }

    pub fn server_channel(&self) -> Channel {
        Channel::new(Side::Server, self.to_server.clone(), self.to_client.clone(), self.poll_interval)
    }

    pub fn client_channel(&self) -> Channel {
        Channel::new(Side::Client, self.to_client.clone(), self.to_server.clone(), self.poll_interval)
    }
}

fn open_queue(name: &str, direction: &str, options: &BusOptions, cfg: QueueConfig) -> Result<BusQueue, BusError> {
    let store: Arc<dyn CircularStore> = match &options.backing {
        Backing::Heap => Arc::new(HeapStore::new(MWQ_HEADER_LEN, options.queue_len)),
        Backing::Shm { dir } => {
            let path = queue_path(dir, name, direction);
            let store = MmapStore::open(&path, MWQ_HEADER_LEN, options.queue_len, options.open_mode)
                .map_err(|source| BusError::Store {
                    name: name.to_string(),
                    source,
                })?;
            Arc::new(store)
        }
    };
    Ok(FixedQueue::new(store, cfg))
}

/// `<dir>/floor_<name>.<direction>`
pub(crate) fn queue_path(dir: &Path, name: &str, direction: &str) -> PathBuf {
    dir.join(format!("floor_{name}.{direction}"))
}
