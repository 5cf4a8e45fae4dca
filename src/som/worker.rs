//! Background SOM computation with generation-based supersession.
//!
//! Requests go into a single pending slot that a newer request overwrites. One named worker
//! thread takes the pending request, trains outside the lock and publishes the layout only if
//! no newer generation has been requested or published meanwhile. Readers get the latest
//! published layout without waiting for any computation.

use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::train::{assign, train};
use super::{GridPos, SomState};
use crate::config::SomConfig;
use crate::error::Result;
use crate::store::FeatureStore;
use crate::types::FrameId;

/// Observable state of the layout worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SomStatus {
    /// Nothing requested or published yet.
    Idle,
    /// A generation is queued or being trained.
    Computing { generation: u64 },
    /// The latest published generation is current.
    Ready { generation: u64 },
}

#[derive(Debug)]
struct LayoutRequest {
    generation: u64,
    frame_ids: Vec<FrameId>,
    weights: Option<Vec<f32>>,
}

#[derive(Debug, Default)]
struct Slot {
    pending: Option<LayoutRequest>,
    computing: Option<u64>,
    latest_requested: Option<u64>,
    published: Option<Arc<SomState>>,
    terminate: bool,
}

impl Slot {
    fn published_generation(&self) -> Option<u64> {
        self.published.as_ref().map(|s| s.generation)
    }
}

#[derive(Debug, Default)]
struct Shared {
    slot: Mutex<Slot>,
    work: Condvar,
    published: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A finished generation is published only if nothing newer was requested or published.
pub(crate) fn should_publish(generation: u64, latest_requested: Option<u64>, published: Option<u64>) -> bool {
    latest_requested.is_none_or(|latest| generation >= latest)
        && published.is_none_or(|current| generation > current)
}

/// Owner of the background layout worker; dropping it stops the worker.
#[derive(Debug)]
pub struct AsyncSom {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl AsyncSom {
    pub fn new(store: Arc<FeatureStore>, config: SomConfig) -> Result<Self> {
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("som-worker".to_string())
            .spawn(move || run_worker(&worker_shared, &store, &config))?;
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Queues a layout of `frame_ids` without blocking.
    ///
    /// `weights` (one per frame) bias the training samples towards highly scored frames.
    /// Returns `false` when `generation` is not newer than the last requested one.
    pub fn request_layout(&self, frame_ids: Vec<FrameId>, weights: Option<Vec<f32>>, generation: u64) -> bool {
        let mut slot = self.shared.lock();
        if slot.latest_requested.is_some_and(|latest| generation <= latest) {
            tracing::debug!(
                target = "framehunter::som",
                generation,
                latest = slot.latest_requested,
                "stale layout request ignored"
            );
            return false;
        }
        if let Some(replaced) = slot.pending.replace(LayoutRequest {
            generation,
            frame_ids,
            weights,
        }) {
            tracing::debug!(
                target = "framehunter::som",
                replaced = replaced.generation,
                generation,
                "pending layout superseded"
            );
        }
        slot.latest_requested = Some(generation);
        self.shared.work.notify_one();
        true
    }

    /// Latest published layout; may lag behind the latest request.
    #[must_use]
    pub fn current_layout(&self) -> Option<Arc<SomState>> {
        self.shared.lock().published.clone()
    }

    #[must_use]
    pub fn status(&self) -> SomStatus {
        let slot = self.shared.lock();
        if let Some(generation) = slot.pending.as_ref().map(|p| p.generation).or(slot.computing) {
            return SomStatus::Computing { generation };
        }
        match slot.published_generation() {
            Some(generation) => SomStatus::Ready { generation },
            None => SomStatus::Idle,
        }
    }

    /// Blocks until a layout of at least `generation` is published, the worker goes idle
    /// without producing one, or `timeout` elapses.
    #[must_use]
    pub fn wait_for_generation(&self, generation: u64, timeout: Duration) -> Option<Arc<SomState>> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.lock();
        loop {
            if let Some(state) = slot.published.as_ref().filter(|s| s.generation >= generation) {
                return Some(Arc::clone(state));
            }
            let busy = slot.pending.is_some() || slot.computing.is_some();
            let now = Instant::now();
            if !busy || now >= deadline {
                return None;
            }
            slot = self
                .shared
                .published
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl Drop for AsyncSom {
    fn drop(&mut self) {
        self.shared.lock().terminate = true;
        self.shared.work.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!(target = "framehunter::som", "som worker panicked");
            }
        }
    }
}

fn run_worker(shared: &Shared, store: &FeatureStore, config: &SomConfig) {
    loop {
        let request = {
            let mut slot = shared.lock();
            while slot.pending.is_none() && !slot.terminate {
                slot = shared.work.wait(slot).unwrap_or_else(PoisonError::into_inner);
            }
            if slot.terminate {
                return;
            }
            let Some(request) = slot.pending.take() else {
                continue;
            };
            slot.computing = Some(request.generation);
            request
        };

        let started = Instant::now();
        let outcome = compute_layout(store, config, &request, || shared.lock().terminate);

        let mut slot = shared.lock();
        slot.computing = None;
        match outcome {
            Ok(None) => {
                drop(slot);
                shared.published.notify_all();
                return;
            }
            Ok(Some(state)) => {
                if should_publish(state.generation, slot.latest_requested, slot.published_generation()) {
                    tracing::debug!(
                        target = "framehunter::som",
                        generation = state.generation,
                        frames = state.len(),
                        iterations = state.iterations,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "som layout published"
                    );
                    slot.published = Some(Arc::new(state));
                } else {
                    tracing::debug!(
                        target = "framehunter::som",
                        generation = state.generation,
                        latest = slot.latest_requested,
                        "superseded som layout discarded"
                    );
                }
            }
            Err(reason) => {
                tracing::warn!(
                    target = "framehunter::som",
                    generation = request.generation,
                    %reason,
                    "som layout failed; keeping previous layout"
                );
            }
        }
        drop(slot);
        shared.published.notify_all();
    }
}

fn compute_layout(
    store: &FeatureStore,
    config: &SomConfig,
    request: &LayoutRequest,
    should_stop: impl Fn() -> bool,
) -> std::result::Result<Option<SomState>, String> {
    if request.frame_ids.is_empty() {
        return Err("no frames to lay out".to_string());
    }
    let matrix = store.matrix(config.space).map_err(|err| err.to_string())?;
    if let Some(unknown) = request.frame_ids.iter().find(|id| !store.contains(**id)) {
        return Err(format!("frame {unknown} is not in the store"));
    }
    let points: Vec<&[f32]> = request
        .frame_ids
        .iter()
        .map(|id| matrix.row(*id as usize))
        .collect();
    let weights = request
        .weights
        .as_deref()
        .filter(|w| w.len() == points.len());

    let Some(codebook) = train(&points, weights, config, should_stop) else {
        return Ok(None);
    };
    let units = assign(&points, &codebook);

    let mut clusters = vec![Vec::new(); config.units()];
    let mut coordinates = BTreeMap::new();
    for (id, unit) in request.frame_ids.iter().zip(units) {
        clusters[unit].push(*id);
        coordinates.insert(
            *id,
            GridPos {
                x: (unit % config.width) as u32,
                y: (unit / config.width) as u32,
            },
        );
    }
    for cluster in &mut clusters {
        cluster.sort_unstable();
        cluster.dedup();
    }
    Ok(Some(SomState {
        generation: request.generation,
        width: config.width,
        height: config.height,
        coordinates,
        clusters,
        iterations: codebook.iterations,
        dim: codebook.dim,
        codebook: codebook.units,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_rule_never_goes_backwards() {
        assert!(should_publish(1, Some(1), None));
        assert!(!should_publish(1, Some(2), None));
        assert!(!should_publish(2, Some(2), Some(2)));
        assert!(!should_publish(1, Some(1), Some(2)));
        assert!(should_publish(3, Some(3), Some(2)));
    }
}
