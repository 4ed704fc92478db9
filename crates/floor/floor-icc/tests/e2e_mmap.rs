//! Multi-process integration test for the fixed-slot multi-writer queue.
//!
//! The test executable re-spawns itself: the orchestrator initializes the
//! mapped queue file, then launches two writer processes and one reader
//! process that all attach to it and run concurrently.
//!
//! ```text
//! [Writer 1] --[attach]--[claim/commit ...]--------[done]
//! [Writer 2] --[attach]--[claim/commit ...]--------[done]
//!                              |  |  |
//!                          [mmap file]
//!                              |  |  |
//! [Reader]   --[attach]--[read in watermark order]--[done]
//! ```
//!
//! ```bash
//! cargo test -p floor-icc --test e2e_mmap -- --nocapture
//! ```

use floor_icc::{FixedQueue, MWQ_HEADER_LEN, MmapStore, OpenMode, QueueConfig, QueueError};
use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

macro_rules! log {
    ($($arg:tt)*) => {{
        let _ = writeln!(std::io::stderr(), $($arg)*);
        let _ = std::io::stderr().flush();
    }};
}

const ENV_ROLE: &str = "FLOOR_E2E_ROLE";
const ENV_PATH: &str = "FLOOR_E2E_PATH";
const ROLE_READER: &str = "reader";
const ROLE_WRITER_PREFIX: &str = "writer-";

const WRITERS: u64 = 2;
const PER_WRITER: u64 = 50_000;
const SLOT: usize = 32;

/// Holds every message, so the reader can never be lapped.
const QUEUE_LEN: u64 = 1 << 22;

fn test_path() -> String {
    let pid = std::process::id();
    format!("/tmp/floor_e2e_mwq_{pid}")
}

fn open(path: &str, mode: OpenMode) -> FixedQueue<MmapStore> {
    let store = MmapStore::open(path, MWQ_HEADER_LEN, QUEUE_LEN, mode).expect("failed to map queue");
    FixedQueue::new(Arc::new(store), QueueConfig::new(QUEUE_LEN, SLOT))
}

fn run_writer(path: &str, id: u64) {
    let queue = open(path, OpenMode::Attach);
    let writer = queue.writer();
    log!("[WRITER {id}] attached, publishing {PER_WRITER} slots");

    let start = Instant::now();
    let mut slot = [0u8; SLOT];
    for seq in 0..PER_WRITER {
        slot[..8].copy_from_slice(&id.to_le_bytes());
        slot[8..16].copy_from_slice(&seq.to_le_bytes());
        slot[16..24].copy_from_slice(&(id ^ seq).to_le_bytes());
        writer.put(&slot).expect("put failed");
    }
    log!("[WRITER {id}] done in {:?}", start.elapsed());
}

fn run_reader(path: &str) {
    let queue = open(path, OpenMode::Attach);
    let mut reader = queue.reader_at(0);
    let total = WRITERS * PER_WRITER;
    let deadline = Instant::now() + Duration::from_secs(30);

    let mut next_seq = vec![0u64; WRITERS as usize + 1];
    let mut received = 0u64;
    let mut last_pos = None;
    let mut slot = [0u8; SLOT];

    while received < total {
        assert!(Instant::now() < deadline, "[READER] timed out after {received} slots");
        match reader.copy_next(&mut slot) {
            Ok(pos) => {
                let id = u64::from_le_bytes(slot[..8].try_into().unwrap());
                let seq = u64::from_le_bytes(slot[8..16].try_into().unwrap());
                let check = u64::from_le_bytes(slot[16..24].try_into().unwrap());
                assert_eq!(check, id ^ seq, "torn slot at {pos}");
                assert_eq!(seq, next_seq[id as usize], "writer {id} reordered at {pos}");
                next_seq[id as usize] += 1;

                if let Some(prev) = last_pos {
                    assert_eq!(pos, prev + SLOT as u64, "gap in claim order");
                }
                last_pos = Some(pos);
                received += 1;
            }
            Err(QueueError::Again) => std::hint::spin_loop(),
            Err(e) => panic!("[READER] unexpected {e}"),
        }
    }
    log!("[READER] received all {received} slots in claim order");
}

#[test]
fn e2e_multi_process_fixed_queue() {
    if let Ok(role) = env::var(ENV_ROLE) {
        let path = env::var(ENV_PATH).expect("FLOOR_E2E_PATH not set");
        match role.as_str() {
            ROLE_READER => run_reader(&path),
            other => {
                let id = other
                    .strip_prefix(ROLE_WRITER_PREFIX)
                    .and_then(|id| id.parse().ok())
                    .unwrap_or_else(|| panic!("Unknown role: {other}"));
                run_writer(&path, id);
            }
        }
        return;
    }

    let path = test_path();
    let exe = env::current_exe().expect("Failed to get current executable path");

    // the orchestrator owns initialization; children only attach
    let _init = open(&path, OpenMode::Initialize);

    let spawn = |role: String| {
        Command::new(&exe)
            .arg("--exact")
            .arg("e2e_multi_process_fixed_queue")
            .env(ENV_ROLE, role)
            .env(ENV_PATH, &path)
            .stderr(Stdio::inherit())
            .spawn()
            .expect("Failed to spawn child process")
    };

    let mut children = vec![spawn(ROLE_READER.to_string())];
    for id in 1..=WRITERS {
        children.push(spawn(format!("{ROLE_WRITER_PREFIX}{id}")));
    }

    let statuses: Vec<_> = children
        .iter_mut()
        .map(|c| c.wait().expect("Failed to wait for child"))
        .collect();

    let _ = std::fs::remove_file(&path);

    for status in statuses {
        assert!(status.success(), "child process failed with status: {status}");
    }
}
