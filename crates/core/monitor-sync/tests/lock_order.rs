//! Lock-order checking in warn mode.
//!
//! The order mode and the log sink are process-wide, so this lives in its
//! own test binary.

#![cfg(not(any(loom, shuttle)))]

use std::fmt;
use std::sync::Mutex as StdMutex;

use monitor_sync::log::{self, LogLevel};
use monitor_sync::sync::{held_locks, set_order_mode};
use monitor_sync::{LockRank, Mutex, OrderMode, SyncError};

static CAPTURED: StdMutex<Vec<(LogLevel, String)>> = StdMutex::new(Vec::new());

fn capture(level: LogLevel, args: fmt::Arguments<'_>) {
    CAPTURED.lock().unwrap().push((level, args.to_string()));
}

#[test]
fn warn_mode_logs_and_proceeds() {
    log::set_log_fn(capture);
    log::set_max_level(LogLevel::Warn);
    set_order_mode(OrderMode::Warn);

    let config = Mutex::ranked("config", LockRank(1), 0);
    let cache = Mutex::ranked("cache", LockRank(2), 0);

    // Correct order: silent.
    {
        let _c = config.lock();
        let _k = cache.lock();
        assert_eq!(held_locks().len(), 2);
    }
    assert!(CAPTURED.lock().unwrap().is_empty());

    // Inverted order: warned about, but allowed through.
    {
        let _k = cache.lock();
        let _c = config.lock();
        let names: Vec<_> = held_locks().iter().map(|h| h.name).collect();
        assert_eq!(names, ["cache", "config"]);

        // The checked variant reports instead of warning.
        let other = Mutex::ranked("other", LockRank(1), ());
        assert_eq!(
            other.lock_checked().err(),
            Some(SyncError::LockOrder {
                held: "cache",
                acquiring: "other"
            })
        );
    }
    assert!(held_locks().is_empty());

    let captured = CAPTURED.lock().unwrap();
    assert_eq!(captured.len(), 1);
    let (level, message) = &captured[0];
    assert_eq!(*level, LogLevel::Warn);
    assert!(
        message.contains("acquiring `config` while holding `cache`"),
        "{message}"
    );

    log::clear_log_fn();
    set_order_mode(OrderMode::Panic);
}
