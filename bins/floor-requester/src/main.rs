//! Client side of a bus: sends pings and reports round-trip latency.
//!
//! Usage: `floor-requester [config.toml] [count]`

use anyhow::Context;
use floor_bus::{BusRegistry, Channel, Message, MsgType};
use floor_config::FloorConfig;
use std::time::{Duration, Instant};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "floor.toml".to_string());
    let count: u32 = match args.next() {
        Some(n) => n.parse().with_context(|| format!("invalid count '{n}'"))?,
        None => 1_000,
    };
    let config = FloorConfig::load(path.as_str()).with_context(|| format!("loading {path}"))?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?)
        .init();

    let registry = BusRegistry::new(config.bus_options());
    let bus = registry.open(&config.bus.name)?;
    let channel = Channel::client(&bus);
    let timeout = config.request_timeout();

    tracing::info!(bus = bus.name(), count, "sending pings");

    let ping = Message::with_text(MsgType::PING, "ping");
    let mut min = Duration::MAX;
    let mut max = Duration::ZERO;
    let mut total = Duration::ZERO;
    for _ in 0..count {
        let started = Instant::now();
        channel
            .request_and_check_ack(&ping, MsgType::PING_ACK, timeout)
            .context("ping failed")?;
        let rtt = started.elapsed();
        min = min.min(rtt);
        max = max.max(rtt);
        total += rtt;
    }

    if count > 0 {
        tracing::info!(?min, mean = ?(total / count), ?max, "round trip");
    }
    Ok(())
}
