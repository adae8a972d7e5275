//! Timer-driven flushing
//!
//! A background thread calls [`Demultiplexer::flush_all`] at a fixed interval
//! and forwards every non-empty batch over a channel, so the delivery side
//! never has to poll the demultiplexer itself.

use crate::demux::{Demultiplexer, FlushBatch};
use crossbeam_channel::{select, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Handle returned by [`FlushScheduler::start`]
pub struct FlushHandle {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<u64>>,
    batches_sent: u64,
}

impl FlushHandle {
    /// Stop the flush thread and wait for it to finish
    ///
    /// One last flush is delivered before the thread exits.
    pub fn stop(&mut self) {
        // Dropping the sender wakes the select below
        self.stop_tx.take();
        if let Some(h) = self.thread.take() {
            match h.join() {
                Ok(sent) => self.batches_sent = sent,
                Err(_) => tracing::error!("Flush thread panicked"),
            }
        }
    }

    /// Check if the flush thread is still running
    pub fn is_alive(&self) -> bool {
        self.thread
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Batches delivered; final once the thread has stopped
    pub fn batches_sent(&self) -> u64 {
        self.batches_sent
    }
}

impl Drop for FlushHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Periodic flush driver
pub struct FlushScheduler;

impl FlushScheduler {
    /// Flush `demux` every `interval`, sending non-empty batches to `sender`
    ///
    /// The thread also exits on its own the first time a batch cannot be
    /// sent because every receiver is gone. An idle scheduler has nothing to
    /// send and keeps running until [`FlushHandle::stop`] or drop.
    pub fn start(
        demux: Arc<Demultiplexer>,
        interval: Duration,
        sender: Sender<FlushBatch>,
    ) -> FlushHandle {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);

        let thread = std::thread::Builder::new()
            .name("flush-scheduler".into())
            .spawn(move || flush_loop(demux, interval, sender, stop_rx))
            .expect("Failed to spawn flush scheduler thread");

        FlushHandle {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
            batches_sent: 0,
        }
    }
}

fn flush_loop(
    demux: Arc<Demultiplexer>,
    interval: Duration,
    sender: Sender<FlushBatch>,
    stop_rx: Receiver<()>,
) -> u64 {
    tracing::info!(interval_ms = interval.as_millis() as u64, "Flush scheduler running");

    let ticker = crossbeam_channel::tick(interval);
    let mut sent: u64 = 0;

    let deliver = |sent: &mut u64| -> bool {
        let batch = demux.flush_all();
        if batch.is_empty() {
            return true;
        }
        if sender.send(batch).is_err() {
            tracing::info!("Flush receiver dropped, stopping scheduler");
            return false;
        }
        *sent += 1;
        true
    };

    loop {
        select! {
            recv(ticker) -> _ => {
                if !deliver(&mut sent) {
                    return sent;
                }
            }
            recv(stop_rx) -> _ => break,
        }
    }

    deliver(&mut sent);
    tracing::info!(batches = sent, "Flush scheduler stopped");
    sent
}
