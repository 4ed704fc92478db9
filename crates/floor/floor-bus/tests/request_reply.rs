//! Request/response over a shared bus with concurrent requesters.
//!
//! ```bash
//! cargo test -p floor-bus --test request_reply -- --nocapture
//! ```

use floor_bus::{Backing, Bus, BusError, BusOptions, Channel, Message, MsgType};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn options(backing: Backing) -> BusOptions {
    BusOptions {
        queue_len: 1 << 20,
        slot_size: 64,
        poll_interval: Duration::from_micros(50),
        backing,
        ..BusOptions::default()
    }
}

/// Echo every ping back as a `PingAck` carrying the request's own payload.
fn spawn_echo(mut server: Channel, stop: Arc<AtomicBool>) -> thread::JoinHandle<u64> {
    server.subscribe(MsgType::PING);
    thread::spawn(move || {
        let mut answered = 0;
        while !stop.load(Ordering::Acquire) {
            match server.next_message() {
                Some(req) => {
                    server.reply(&req, MsgType::PING_ACK, req.text().as_bytes()).unwrap();
                    answered += 1;
                }
                None => thread::yield_now(),
            }
        }
        answered
    })
}

/// Two requesters share one channel. Replies interleave on the reply queue,
/// but each waiter only ever gets the reply to its own request.
#[test]
fn concurrent_requests_get_their_own_replies() {
    const PER_REQUESTER: u64 = 500;

    let bus = Bus::open("p4", &options(Backing::Heap)).unwrap();
    let stop = Arc::new(AtomicBool::new(false));
    let echo = spawn_echo(bus.server_channel(), Arc::clone(&stop));
    let client = Arc::new(bus.client_channel());

    let requesters: Vec<_> = ["alpha", "beta"]
        .into_iter()
        .map(|name| {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                for i in 0..PER_REQUESTER {
                    let body = format!("{name}-{i}");
                    let req = Message::with_text(MsgType::PING, &body);
                    let reply = client.request(&req, TIMEOUT).unwrap();
                    assert_eq!(reply.msg_type(), MsgType::PING_ACK);
                    assert_eq!(reply.text(), body, "reply crossed to the wrong waiter");
                }
            })
        })
        .collect();

    for r in requesters {
        r.join().unwrap();
    }
    stop.store(true, Ordering::Release);
    assert_eq!(echo.join().unwrap(), 2 * PER_REQUESTER);
}

#[test]
fn request_reply_across_separately_opened_shm_buses() {
    let dir = tempfile::tempdir().unwrap();
    let opts = options(Backing::Shm {
        dir: dir.path().to_path_buf(),
    });

    // stands in for two processes attaching to the same bus name
    let server_side = Bus::open("shm-rr", &opts).unwrap();
    let client_side = Bus::open("shm-rr", &opts).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let echo = spawn_echo(Channel::server(&server_side), Arc::clone(&stop));
    let client = Channel::client(&client_side);

    for i in 0..50 {
        let body = format!("ping {i}");
        let reply = client.request(&Message::with_text(MsgType::PING, &body), TIMEOUT).unwrap();
        assert_eq!(reply.text(), body);
    }
    stop.store(true, Ordering::Release);
    assert_eq!(echo.join().unwrap(), 50);

    assert!(dir.path().join("floor_shm-rr.c2s").exists());
    assert!(dir.path().join("floor_shm-rr.s2c").exists());
}

#[test]
fn request_times_out_when_nobody_answers() {
    let bus = Bus::open("silent", &options(Backing::Heap)).unwrap();
    let client = bus.client_channel();
    let err = client
        .request_and_check_ack(&Message::new(MsgType::PING), MsgType::PING_ACK, Duration::from_millis(20))
        .unwrap_err();
    assert!(matches!(err, BusError::Timeout { after } if after == Duration::from_millis(20)));
}
