//! # Sample Acquisition
//!
//! The seam between a measurement front-end and the protocol server. Producers push
//! data-only sample buffers (the PMU sections of a DATA frame without STAT) into a
//! `SampleQueue`; the server pops them, wraps them in a complete DATA frame and forwards
//! them to subscribed connections.
//!
//! ## Key Components
//!
//! - `SampleQueue`: Bounded ring buffer that drops the oldest sample when full.
//! - `SampleProducer`: Trait for anything that yields sample buffers.
//! - `SyntheticSource`: Producer generating random samples for a bound `DataCodec`.
//! - `spawn_producer`: Runs a producer on its own thread at a fixed interval.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use circular_buffer::CircularBuffer;
use log::{debug, info, warn};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Notify;

use crate::ieee_c37_118::common::ParseError;
use crate::ieee_c37_118::config::GlobalConfig;
use crate::ieee_c37_118::data_frame::DataCodec;
use crate::ieee_c37_118::random::fill_random_sample;

/// Samples retained while no subscriber drains the queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Bounded queue of data-only sample buffers shared between a producer thread and the
/// server's event loop.
#[derive(Debug)]
pub struct SampleQueue<const N: usize = DEFAULT_QUEUE_DEPTH> {
    buffer: Mutex<CircularBuffer<N, Bytes>>,
    available: Notify,
}

impl<const N: usize> Default for SampleQueue<N> {
    fn default() -> Self {
        SampleQueue {
            buffer: Mutex::new(CircularBuffer::new()),
            available: Notify::new(),
        }
    }
}

impl<const N: usize> SampleQueue<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Appends a sample and wakes a waiting consumer. Returns the evicted sample when the
    /// queue was full.
    pub fn push(&self, sample: Bytes) -> Option<Bytes> {
        let evicted = {
            let mut buffer = self.buffer.lock();
            let evicted = if buffer.is_full() { buffer.pop_front() } else { None };
            buffer.push_back(sample);
            evicted
        };
        if evicted.is_some() {
            debug!("Sample queue full, dropped oldest sample");
        }
        self.available.notify_one();
        evicted
    }

    pub fn pop(&self) -> Option<Bytes> {
        self.buffer.lock().pop_front()
    }

    /// Waits until a sample is available and removes it.
    pub async fn next(&self) -> Bytes {
        loop {
            if let Some(sample) = self.pop() {
                return sample;
            }
            self.available.notified().await;
        }
    }

    /// Removes and returns every queued sample, oldest first.
    pub fn drain(&self) -> Vec<Bytes> {
        let mut buffer = self.buffer.lock();
        let mut samples = Vec::with_capacity(buffer.len());
        while let Some(sample) = buffer.pop_front() {
            samples.push(sample);
        }
        samples
    }

    pub fn clear(&self) {
        self.buffer.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

/// A source of data-only sample buffers, e.g. an ADC front-end.
///
/// Returning `None` ends acquisition.
pub trait SampleProducer: Send + 'static {
    fn next_sample(&mut self) -> Option<Bytes>;
}

/// Producer of random but plausible samples in the layout of one configuration.
pub struct SyntheticSource {
    codec: DataCodec,
    rng: StdRng,
}

impl SyntheticSource {
    pub fn new(config: &GlobalConfig) -> Result<Self, ParseError> {
        Ok(SyntheticSource {
            codec: DataCodec::bind(config)?,
            rng: StdRng::from_os_rng(),
        })
    }

    /// Deterministic source for tests and benches.
    pub fn seeded(config: &GlobalConfig, seed: u64) -> Result<Self, ParseError> {
        Ok(SyntheticSource {
            codec: DataCodec::bind(config)?,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn sample_size(&self) -> usize {
        self.codec.data_only_size()
    }
}

impl SampleProducer for SyntheticSource {
    fn next_sample(&mut self) -> Option<Bytes> {
        let result = fill_random_sample(&mut self.codec, &mut self.rng)
            .and_then(|_| self.codec.encode(false));
        match result {
            Ok(sample) => Some(Bytes::from(sample)),
            Err(e) => {
                warn!("Synthetic source failed to build a sample: {}", e);
                None
            }
        }
    }
}

/// Handle to a producer thread started by `spawn_producer`. Dropping it stops the thread.
pub struct ProducerHandle {
    shutdown_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProducerHandle {
    /// Signals the producer thread and waits for it to exit.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs `producer` on a dedicated thread, pushing one sample into `queue` every
/// `interval` until stopped or until the producer is exhausted.
pub fn spawn_producer<P, const N: usize>(
    queue: Arc<SampleQueue<N>>,
    mut producer: P,
    interval: Duration,
) -> std::io::Result<ProducerHandle>
where
    P: SampleProducer,
{
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    let handle = thread::Builder::new()
        .name("pmu-acquisition".to_string())
        .spawn(move || {
            info!("Acquisition started, interval {:?}", interval);
            loop {
                match producer.next_sample() {
                    Some(sample) => {
                        queue.push(sample);
                    }
                    None => {
                        info!("Sample producer exhausted");
                        break;
                    }
                }
                match shutdown_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            }
            info!("Acquisition stopped");
        })?;

    Ok(ProducerHandle {
        shutdown_tx: Some(shutdown_tx),
        handle: Some(handle),
    })
}
