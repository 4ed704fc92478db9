//! Server side of a bus: acknowledges pings and user commands.
//!
//! Usage: `floor-responder [config.toml]`

use anyhow::Context;
use floor_bus::{BusRegistry, Channel, MsgType};
use floor_config::FloorConfig;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const IDLE_SLEEP: Duration = Duration::from_micros(50);

fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "floor.toml".to_string());
    let config = FloorConfig::load(path.as_str()).with_context(|| format!("loading {path}"))?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?)
        .init();

    let registry = BusRegistry::new(config.owner_bus_options());
    let bus = registry.open(&config.bus.name)?;
    let mut channel = Channel::server(&bus);
    channel.subscribe(MsgType::PING);
    channel.subscribe(MsgType::USER_COMMAND);

    tracing::info!(bus = bus.name(), "responder ready");

    loop {
        let Some(msg) = channel.next_message() else {
            std::thread::sleep(IDLE_SLEEP);
            continue;
        };
        match msg.msg_type() {
            MsgType::PING => {
                channel.reply_ack(&msg, MsgType::PING_ACK)?;
            }
            MsgType::USER_COMMAND => {
                let command = msg.text();
                tracing::info!(%command, ref_token = msg.ref_token(), "user command");
                if command.is_empty() {
                    channel.reply_error(&msg, MsgType::USER_COMMAND_ACK, "empty command")?;
                } else {
                    channel.reply_ack(&msg, MsgType::USER_COMMAND_ACK)?;
                }
            }
            other => tracing::debug!(msg_type = ?other, "ignored"),
        }
    }
}
