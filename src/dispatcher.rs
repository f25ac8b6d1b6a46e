//! # Dispatcher
//!
//! The single consumer of the ingestion channel. Runs on its own
//! thread: spawn, own the `Receiver`, loop until the channel disconnects,
//! fanning each dequeued record out to every enabled destination.

use std::sync::Arc;
use std::thread::JoinHandle;

use arc_swap::ArcSwap;
use parking_lot::RwLock;

use crate::channel::{ChannelReceiver, Message};
use crate::destination::Destination;
use crate::error::ErrorHandler;
use crate::metrics::Metrics;
use crate::record::Record;
use crate::redact::Redactor;

/// Owns the dispatcher thread. Dropping (or calling `shutdown`) closes the
/// channel's sender side elsewhere first, then this joins the thread once
/// it has drained and exited.
pub struct Dispatcher {
    handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawns the dispatcher loop. `redactor` is swapped in by the logger on
    /// reconfiguration; an [`ArcSwap`] gives the hot dispatch path a
    /// lock-free read instead of contending a `RwLock` on every record.
    pub fn start(
        receiver: ChannelReceiver,
        destinations: Arc<RwLock<Vec<Arc<Destination>>>>,
        redactor: Arc<ArcSwap<Redactor>>,
        metrics: Arc<Metrics>,
        error_handler: ErrorHandler,
    ) -> Self {
        let handle = std::thread::spawn(move || {
            run_loop(receiver, destinations, redactor, metrics, error_handler);
        });
        Dispatcher {
            handle: Some(handle),
        }
    }

    /// Blocks until the dispatcher thread has drained the channel and
    /// exited. The caller must already have dropped every `ChannelSender`
    /// so `recv` observes disconnection.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_loop(
    receiver: ChannelReceiver,
    destinations: Arc<RwLock<Vec<Arc<Destination>>>>,
    redactor: Arc<ArcSwap<Redactor>>,
    metrics: Arc<Metrics>,
    error_handler: ErrorHandler,
) {
    loop {
        match receiver.recv() {
            Some(Message::Record(record)) => {
                dispatch_one(record, &destinations, &redactor, &metrics, &error_handler);
            }
            Some(Message::Sync(barrier)) => barrier.signal(),
            None => break,
        }
    }
    tracing::debug!("dispatcher loop exited");
}

fn dispatch_one(
    mut record: Record,
    destinations: &Arc<RwLock<Vec<Arc<Destination>>>>,
    redactor: &Arc<ArcSwap<Redactor>>,
    metrics: &Arc<Metrics>,
    error_handler: &ErrorHandler,
) {
    let redactor = redactor.load_full();
    record.fields = redactor.redact_fields(record.level, std::mem::take(&mut record.fields));
    // Structural walk above handles JSON field leaves; the
    // message string itself is neither a field nor JSON-specific, so the
    // regex pass runs on it directly here, ahead of per-destination
    // rendering, for both text and structured records.
    let redacted_message = redactor.redact_text(record.level, record.message());
    match &mut record.body {
        crate::record::RecordBody::Text(s) => *s = redacted_message,
        crate::record::RecordBody::Structured(entry) => {
            entry.message = redacted_message;
            entry.fields = record.fields.clone();
        }
        crate::record::RecordBody::Raw(_) => {}
    }

    let snapshot: Vec<Arc<Destination>> = destinations.read().iter().cloned().collect();
    for destination in &snapshot {
        if !destination.is_enabled() {
            continue;
        }
        if let Err(err) = destination.process(&record) {
            tracing::debug!(destination = %destination.name, kind = ?err.kind, "destination write failed");
            error_handler(&err);
        }
    }
    metrics.record_logged(record.level);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TextFormatOptions;
    use crate::destination::Backend;
    use crate::error::{silent_error_handler, Error};
    use crate::format::TextFormatter;
    use crate::record::Level;
    use std::sync::atomic::{AtomicUsize, Ordering};

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
    fn fans_out_to_every_enabled_destination() {
        let (tx, rx) = crate::channel::bounded(8);
        let counter_a = Arc::new(AtomicUsize::new(0));
        let counter_b = Arc::new(AtomicUsize::new(0));
        let dest_a = Arc::new(Destination::new(
            "a",
            Box::new(CountingBackend(counter_a.clone())),
            Box::new(TextFormatter::new(TextFormatOptions::default())),
            Arc::new(Metrics::default()),
        ));
        let dest_b = Arc::new(Destination::new(
            "b",
            Box::new(CountingBackend(counter_b.clone())),
            Box::new(TextFormatter::new(TextFormatOptions::default())),
            Arc::new(Metrics::default()),
        ));
        dest_b.set_enabled(false);
        let destinations = Arc::new(RwLock::new(vec![dest_a, dest_b]));
        let redactor = Arc::new(ArcSwap::new(Arc::new(
            Redactor::new(&crate::config::RedactionConfig::default()).unwrap(),
        )));
        let metrics = Arc::new(Metrics::default());

        let dispatcher = Dispatcher::start(
            rx,
            destinations,
            redactor,
            metrics.clone(),
            silent_error_handler(),
        );
        tx.try_send(Record::new_text(Level::Info, "hi", vec![])).unwrap();
        tx.sync().unwrap();
        drop(tx);
        dispatcher.join();

        assert_eq!(counter_a.load(Ordering::Relaxed), 1);
        assert_eq!(counter_b.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.snapshot().messages_logged.info, 1);
    }
}
