//! # Batch Ticker
//!
//! Background timer for the optional per-destination batch buffer.
//! Byte- and count-driven flushes already happen inline in
//! [`crate::destination::Destination::process`]; this ticker only exists to
//! catch the time-deadline case for a destination whose writes are too
//! sparse to ever cross the byte/count threshold on their own. Modeled on
//! the same spawned-thread-with-shutdown-flag shape as
//! [`crate::retention::RetentionSweeper`] and [`crate::compression::CompressionPool`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::RwLock;

use crate::destination::Destination;
use crate::error::ErrorHandler;

const TICK: Duration = Duration::from_millis(100);

pub struct BatchTicker {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BatchTicker {
    pub fn start(destinations: Arc<RwLock<Vec<Arc<Destination>>>>, error_handler: ErrorHandler) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let handle = std::thread::spawn(move || {
            while !shutdown_clone.load(Ordering::Relaxed) {
                std::thread::sleep(TICK);
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                for dest in destinations.read().iter() {
                    if let Err(err) = dest.flush_if_batch_due() {
                        error_handler(&err);
                    }
                }
            }
        });
        BatchTicker {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BatchTicker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatchConfig, TextFormatOptions};
    use crate::destination::Backend;
    use crate::error::{silent_error_handler, Error};
    use crate::format::TextFormatter;
    use crate::record::{Level, Record};
    use std::sync::atomic::AtomicUsize;

    struct CountingBackend(Arc<AtomicUsize>);
    impl Backend for CountingBackend {
        fn write_record(&mut self, _record: &Record, _bytes: &[u8]) -> Result<(), Error> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        fn flush(&mut self) -> Result<(), Error> {
            Ok(())
        }
        fn close(&mut self) -> Result<(), Error> {
            Ok(())
        }
    }

    #[test]
    fn ticker_flushes_stale_batch_on_deadline() {
        let counter = Arc::new(AtomicUsize::new(0));
        let dest = Arc::new(Destination::new(
            "d",
            Box::new(CountingBackend(counter.clone())),
            Box::new(TextFormatter::new(TextFormatOptions::default())),
            Arc::new(crate::metrics::Metrics::default()),
        ));
        dest.set_batch_config(BatchConfig {
            enabled: true,
            max_bytes: 1 << 20,
            max_count: 1000,
            flush_interval: Duration::from_millis(50),
        });
        dest.process(&Record::new_text(Level::Info, "m", vec![])).unwrap();
        assert_eq!(counter.load(Ordering::Relaxed), 0);

        let destinations = Arc::new(RwLock::new(vec![dest]));
        let ticker = BatchTicker::start(destinations, silent_error_handler());

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while std::time::Instant::now() < deadline && counter.load(Ordering::Relaxed) == 0 {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        ticker.shutdown();
    }
}
