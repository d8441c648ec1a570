//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rtt_plot::channel::PORT_BLOCK_LEN;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// First port of a block of `PORT_BLOCK_LEN` ports that were all free a moment ago
pub fn free_port_block() -> u16 {
    for _ in 0..100 {
        let base = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        if base > u16::MAX - PORT_BLOCK_LEN {
            continue;
        }
        let all_free = (base..base + PORT_BLOCK_LEN)
            .map(|port| TcpListener::bind(("127.0.0.1", port)))
            .collect::<std::io::Result<Vec<_>>>()
            .is_ok();
        if all_free {
            return base;
        }
    }
    panic!("no free block of {} loopback ports", PORT_BLOCK_LEN);
}

/// Abstract socket namespace unique to this test process and call
pub fn unique_namespace(tag: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!(
        "t{}_{}_{}",
        std::process::id(),
        tag,
        COUNTER.fetch_add(1, Ordering::SeqCst)
    )
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}
