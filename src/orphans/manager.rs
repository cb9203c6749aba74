//! Background reaper scheduling.

use super::Reaper;
use crate::config::Config;
use crate::store::Store;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Granularity of the stop-flag checks between reaper runs.
const POLL_SLICE: Duration = Duration::from_millis(50);

/// Runs the reaper on a background thread at the configured interval.
///
/// The first sweep happens immediately on start. Stopping (explicitly or by
/// drop) signals the thread and joins it; a blocked interval wait reacts
/// within one poll slice.
pub struct Manager {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Manager {
    /// Start the background reaper.
    pub fn start(store: &Store, config: &Config) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let reaper = Reaper::new(store, config);
        let interval = config.reaper_interval();

        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                if let Err(e) = reaper.run() {
                    eprintln!("Warning: orphan reap failed: {}", e);
                }
                if !sleep_until_stop(&flag, interval) {
                    break;
                }
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the thread and wait for it to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            eprintln!("Warning: reaper thread panicked");
        }
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Sleep for `interval` in small slices. Returns `false` when the stop flag
/// was raised mid-sleep.
fn sleep_until_stop(flag: &AtomicBool, interval: Duration) -> bool {
    let mut remaining = interval;
    while !remaining.is_zero() {
        if flag.load(Ordering::Relaxed) {
            return false;
        }
        let slice = POLL_SLICE.min(remaining);
        thread::sleep(slice);
        remaining -= slice;
    }
    !flag.load(Ordering::Relaxed)
}
