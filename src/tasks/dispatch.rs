use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::buffer::PixelBuffer;
use crate::config::{ProcessingOptions, WorkerFallback};
use crate::error::Error;
use crate::events::{ProcessingReply, ProcessingRequest};
use crate::processing;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<ProcessingReply>>>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchConfig {
    pub fallback: WorkerFallback,
    /// Seed for the per-request seed sequence; `None` draws from the OS.
    pub seed: Option<u64>,
}

/// Hands filter/effect work to a persistent background thread and routes
/// replies back to the awaiting caller by correlation id.
///
/// Requests are independent and may complete in any order. There is no
/// cancellation: dropping a `process` future leaves the worker to finish,
/// and its late reply is discarded.
#[derive(Debug)]
pub struct Dispatcher {
    requests: Option<Sender<ProcessingRequest>>,
    pending: Pending,
    next_id: AtomicU64,
    seeds: Mutex<StdRng>,
    fallback: WorkerFallback,
    fallback_logged: AtomicBool,
}

impl Dispatcher {
    /// Start the background worker and its reply router.
    ///
    /// If the threads cannot be spawned the dispatcher degrades to the
    /// configured fallback for every request.
    pub fn spawn(config: DispatchConfig) -> Self {
        let mut dispatcher = Self::unavailable(config);
        match spawn_threads(Arc::clone(&dispatcher.pending)) {
            Ok(requests) => dispatcher.requests = Some(requests),
            Err(err) => warn!(
                error = %err,
                fallback = ?config.fallback,
                "failed to start background worker"
            ),
        }
        dispatcher
    }

    /// A dispatcher with no background worker; every request takes the fallback path.
    pub fn unavailable(config: DispatchConfig) -> Self {
        let seeds = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            requests: None,
            pending: Arc::default(),
            next_id: AtomicU64::new(1),
            seeds: Mutex::new(seeds),
            fallback: config.fallback,
            fallback_logged: AtomicBool::new(false),
        }
    }

    /// Whether requests currently go to the background worker.
    pub fn is_background(&self) -> bool {
        self.requests.is_some()
    }

    /// Number of requests awaiting a reply.
    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Run filters and effects on a copy of `buffer`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOptions`] before queueing anything if the
    /// options are rejected, or [`Error::WorkerUnavailable`] if the worker
    /// dies while this request is in flight.
    pub async fn process(
        &self,
        buffer: &PixelBuffer,
        options: &ProcessingOptions,
    ) -> Result<PixelBuffer, Error> {
        options.validate()?;
        let seed = lock(&self.seeds).random::<u64>();
        if let Some(requests) = &self.requests {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = oneshot::channel();
            lock(&self.pending).insert(id, tx);
            let request = ProcessingRequest {
                id,
                buffer: buffer.clone(),
                options: options.clone(),
                seed,
            };
            if requests.send(request).is_ok() {
                debug!(id, "dispatched to background worker");
                let reply = rx.await.map_err(|_| Error::WorkerUnavailable)?;
                return Ok(reply.buffer);
            }
            lock(&self.pending).remove(&id);
        }
        Ok(self.run_fallback(buffer, options, seed))
    }

    fn run_fallback(
        &self,
        buffer: &PixelBuffer,
        options: &ProcessingOptions,
        seed: u64,
    ) -> PixelBuffer {
        if !self.fallback_logged.swap(true, Ordering::Relaxed) {
            warn!(fallback = ?self.fallback, "background worker unavailable");
        }
        let mut out = buffer.clone();
        match self.fallback {
            WorkerFallback::Inline => processing::apply_background(&mut out, options, seed),
            WorkerFallback::Skip => {}
        }
        out
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Closing the request channel lets the worker and router exit.
        self.requests.take();
    }
}

fn spawn_threads(pending: Pending) -> std::io::Result<Sender<ProcessingRequest>> {
    let (request_tx, request_rx) = crossbeam_channel::unbounded::<ProcessingRequest>();
    let (reply_tx, reply_rx) = crossbeam_channel::unbounded::<ProcessingReply>();
    thread::Builder::new()
        .name("pixel-worker".into())
        .spawn(move || worker_loop(request_rx, reply_tx))?;
    thread::Builder::new()
        .name("pixel-router".into())
        .spawn(move || route_replies(reply_rx, pending))?;
    Ok(request_tx)
}

fn worker_loop(requests: Receiver<ProcessingRequest>, replies: Sender<ProcessingReply>) {
    for ProcessingRequest {
        id,
        mut buffer,
        options,
        seed,
    } in requests
    {
        processing::apply_background(&mut buffer, &options, seed);
        if replies.send(ProcessingReply { id, buffer }).is_err() {
            break;
        }
    }
    debug!("background worker exiting");
}

fn route_replies(replies: Receiver<ProcessingReply>, pending: Pending) {
    for reply in replies {
        let id = reply.id;
        // Removing the entry is what detaches the per-request listener.
        let waiter = lock(&pending).remove(&id);
        match waiter {
            Some(tx) => {
                if tx.send(reply).is_err() {
                    debug!(id, "caller dropped before reply arrived");
                }
            }
            None => debug!(id, "reply for unknown request"),
        }
    }
    // Worker is gone; wake any caller still waiting so it sees an error.
    lock(&pending).clear();
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EffectOptions, FilterOptions};
    use std::time::Duration;

    fn sample() -> PixelBuffer {
        PixelBuffer::new(2, 1, vec![10, 20, 30, 255, 200, 150, 100, 40]).unwrap()
    }

    fn invert() -> ProcessingOptions {
        ProcessingOptions {
            filters: Some(FilterOptions {
                invert: true,
                ..FilterOptions::default()
            }),
            ..ProcessingOptions::default()
        }
    }

    #[tokio::test]
    async fn round_trip_through_worker() {
        let dispatcher = Dispatcher::spawn(DispatchConfig::default());
        assert!(dispatcher.is_background());
        let input = sample();
        let out = dispatcher.process(&input, &invert()).await.unwrap();
        assert_eq!(out.as_raw(), &[245, 235, 225, 255, 55, 105, 155, 40]);
        // Caller's buffer is never touched.
        assert_eq!(input, sample());
        assert_eq!(dispatcher.pending_len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_get_their_own_replies() {
        let dispatcher = Arc::new(Dispatcher::spawn(DispatchConfig::default()));
        let mut handles = Vec::new();
        for v in 0..32u8 {
            let dispatcher = Arc::clone(&dispatcher);
            handles.push(tokio::spawn(async move {
                let input = PixelBuffer::new(1, 1, vec![v, v, v, 255]).unwrap();
                let out = dispatcher.process(&input, &invert()).await.unwrap();
                (v, out)
            }));
        }
        for handle in handles {
            let (v, out) = handle.await.unwrap();
            assert_eq!(out.as_raw(), &[255 - v, 255 - v, 255 - v, 255]);
        }
        assert_eq!(dispatcher.pending_len(), 0);
    }

    #[tokio::test]
    async fn seeded_dispatchers_agree_with_inline_fallback() {
        let options = ProcessingOptions {
            effects: Some(EffectOptions {
                noise: Some(0.8),
                ..EffectOptions::default()
            }),
            ..ProcessingOptions::default()
        };
        let config = DispatchConfig {
            fallback: WorkerFallback::Inline,
            seed: Some(11),
        };
        let background = Dispatcher::spawn(config);
        let inline = Dispatcher::unavailable(config);
        let a = background.process(&sample(), &options).await.unwrap();
        let b = inline.process(&sample(), &options).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, sample());
    }

    #[tokio::test]
    async fn dropped_request_does_not_block_later_ones() {
        let dispatcher = Dispatcher::spawn(DispatchConfig {
            fallback: WorkerFallback::Inline,
            seed: Some(2),
        });
        let heavy = ProcessingOptions {
            effects: Some(EffectOptions {
                glitch: true,
                noise: Some(0.5),
                ..EffectOptions::default()
            }),
            ..ProcessingOptions::default()
        };
        let large = PixelBuffer::blank(1024, 1024);
        // Polled once, then dropped while the worker is still busy with it.
        let abandoned =
            tokio::time::timeout(Duration::ZERO, dispatcher.process(&large, &heavy)).await;
        assert!(abandoned.is_err());

        let out = dispatcher.process(&sample(), &invert()).await.unwrap();
        assert_eq!(out.as_raw(), &[245, 235, 225, 255, 55, 105, 155, 40]);
        // Replies arrive in order, so the late reply has been routed and discarded.
        assert_eq!(dispatcher.pending_len(), 0);
    }

    #[tokio::test]
    async fn rejects_invalid_options_before_queueing() {
        let dispatcher = Dispatcher::spawn(DispatchConfig::default());
        let options = ProcessingOptions {
            effects: Some(EffectOptions {
                pixelate: Some(0),
                ..EffectOptions::default()
            }),
            ..ProcessingOptions::default()
        };
        let err = dispatcher.process(&sample(), &options).await.unwrap_err();
        assert!(matches!(err, Error::InvalidOptions(_)));
        assert_eq!(dispatcher.pending_len(), 0);

        let fallback = Dispatcher::unavailable(DispatchConfig::default());
        let err = fallback.process(&sample(), &options).await.unwrap_err();
        assert!(matches!(err, Error::InvalidOptions(_)));
    }

    #[tokio::test]
    async fn skip_fallback_returns_input_every_time() {
        let dispatcher = Dispatcher::unavailable(DispatchConfig {
            fallback: WorkerFallback::Skip,
            seed: Some(1),
        });
        assert!(!dispatcher.is_background());
        for _ in 0..3 {
            let out = dispatcher.process(&sample(), &invert()).await.unwrap();
            assert_eq!(out, sample());
        }
    }
}
