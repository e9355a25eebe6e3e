//! Background position sampling.
//!
//! Spawns a thread that owns the `PositionSource`, publishes every reading
//! into `SharedState` at a fixed period and mirrors it to the analog output.
//!
//! Each `Sampler` spawns exactly one thread, shut down and joined when the
//! `Sampler` is dropped.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use lever_traits::Dac;
use lever_traits::clock::Clock;

use crate::analog::AnalogMirror;
use crate::encoder::PositionSource;
use crate::shared::SharedState;

pub struct Sampler {
    /// Shutdown flag for immediate response (atomic for lock-free check)
    shutdown: Arc<AtomicBool>,
    samples: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
    /// Join handle for graceful thread cleanup
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Sampler {
    pub fn spawn<S, C>(
        mut source: S,
        period: Duration,
        clock: C,
        shared: Arc<SharedState>,
        mut analog: Option<AnalogMirror<Box<dyn Dac + Send>>>,
    ) -> Self
    where
        S: PositionSource + Send + 'static,
        C: Clock + Send + Sync + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let samples = Arc::new(AtomicU64::new(0));
        let samples_clone = samples.clone();
        let errors = Arc::new(AtomicU64::new(0));
        let errors_clone = errors.clone();
        let epoch = clock.now();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("sampler thread received shutdown signal");
                    break;
                }

                match source.read_position() {
                    Ok(pos) => {
                        shared.publish(pos, clock.ms_since(epoch));
                        samples_clone.fetch_add(1, Ordering::Relaxed);
                        if let Some(mirror) = analog.as_mut() {
                            mirror.update(pos);
                        }
                    }
                    Err(e) => {
                        // Transient: the next period reads again.
                        errors_clone.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(error = %e, "position read failed");
                    }
                }

                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(period);
            }
            tracing::trace!("sampler thread exiting cleanly");
        });

        Self {
            shutdown,
            samples,
            errors,
            join_handle: Some(join_handle),
        }
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!("sampler thread joined successfully");
                }
                Err(e) => {
                    tracing::warn!(?e, "sampler thread panicked during shutdown");
                }
            }
        }
    }
}
