//! Interact driven by real process signals.
//!
//! Signals are process-wide, so this lives in its own test binary with a
//! single test.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use expectty::{OsSignals, SessionBuilder, WindowSize};
use nix::sys::signal::{Signal, raise};
use tokio_test::assert_ok;

#[tokio::test]
async fn test_window_change_then_interrupt_from_os() {
    let signals = OsSignals::new().unwrap();

    let mut session = SessionBuilder::new("/bin/sh")
        .args(["-c", "sleep 30"])
        .build()
        .unwrap();
    session.start().await.unwrap();

    let (input, _operator_keys) = tokio::io::duplex(1024);
    let (output, _operator_screen) = tokio::io::duplex(64 * 1024);

    let queries = Arc::new(AtomicUsize::new(0));
    let counter = queries.clone();
    let window_size = move || -> io::Result<WindowSize> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(WindowSize::new(100, 40))
    };

    let script = async {
        // Initial query happens before the controller starts listening.
        tokio::time::timeout(Duration::from_secs(5), async {
            while queries.load(Ordering::SeqCst) < 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        raise(Signal::SIGWINCH).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while queries.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        raise(Signal::SIGINT).unwrap();
    };

    let relay = tokio::time::timeout(
        Duration::from_secs(10),
        session.interact_with(input, output, signals, window_size),
    );
    let (relayed, ()) = tokio::join!(relay, script);

    assert_ok!(assert_ok!(relayed));
    assert_eq!(queries.load(Ordering::SeqCst), 2);
    assert!(session.interact_log().is_empty());
    assert!(session.is_running());

    session.close().await.unwrap();
    assert!(!session.is_running());
}
