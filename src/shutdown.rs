//! Cooperative stop flag and the sleeps that honour it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{info, warn};
use thiserror::Error;

const SLEEP_SLICE: Duration = Duration::from_millis(250);

/// Raised once the user asks the process to stop.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Spawns a watcher thread that raises `flag` on the first Ctrl-C.
///
/// A second Ctrl-C exits immediately with status 130.
pub fn install_interrupt_handler(flag: StopFlag) {
    let spawned = thread::Builder::new()
        .name("interrupt-watcher".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    warn!("Interrupt handling unavailable: {}", err);
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                info!("Process interrupted by user. Finishing the current item.");
                flag.request_stop();
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Second interrupt received. Exiting now.");
                    std::process::exit(130);
                }
            });
        });
    if let Err(err) = spawned {
        warn!("Could not spawn interrupt watcher: {}", err);
    }
}

/// A wait that was cut short by a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Interrupted by stop request")]
pub struct Interrupted;

/// Something that can wait. Backoff and throttle delays go through this.
pub trait Sleeper {
    /// Waits for `duration`. Fails if a stop request ends the wait early.
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted>;
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        (**self).sleep(duration)
    }
}

/// Sleeps the calling thread in short slices, returning early once stopped.
#[derive(Debug, Clone, Default)]
pub struct ThreadSleeper {
    stop: StopFlag,
}

impl ThreadSleeper {
    pub fn new(stop: StopFlag) -> Self {
        Self { stop }
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.stop.is_stopped() {
                return Err(Interrupted);
            }
            let slice = remaining.min(SLEEP_SLICE);
            thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
        Ok(())
    }
}

#[cfg(test)]
pub use recording::RecordingSleeper;

#[cfg(test)]
mod recording {
    use std::cell::RefCell;
    use std::time::Duration;

    use super::{Interrupted, Sleeper};

    /// Records requested delays instead of sleeping.
    #[derive(Debug, Default)]
    pub struct RecordingSleeper {
        pub calls: RefCell<Vec<Duration>>,
    }

    impl RecordingSleeper {
        pub fn seconds(&self) -> Vec<f64> {
            self.calls
                .borrow()
                .iter()
                .map(Duration::as_secs_f64)
                .collect()
        }
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
            self.calls.borrow_mut().push(duration);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{Interrupted, Sleeper, StopFlag, ThreadSleeper};

    #[test]
    fn test_stopped_sleeper_returns_immediately_as_interrupted() {
        let flag = StopFlag::new();
        flag.request_stop();
        let sleeper = ThreadSleeper::new(flag);
        let started = Instant::now();
        assert_eq!(sleeper.sleep(Duration::from_secs(30)), Err(Interrupted));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_unstopped_sleeper_completes_short_waits() {
        let sleeper = ThreadSleeper::new(StopFlag::new());
        assert_eq!(sleeper.sleep(Duration::from_millis(5)), Ok(()));
        assert_eq!(sleeper.sleep(Duration::ZERO), Ok(()));
    }

    #[test]
    fn test_stop_flag_is_shared_between_clones() {
        let flag = StopFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_stopped());
        clone.request_stop();
        assert!(flag.is_stopped());
    }
}
