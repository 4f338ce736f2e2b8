//! Marshals closures from network tasks onto the scene owner. Jobs run
//! one at a time, in submission order, inside the owner's tick.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use bevy::prelude::*;
use crossbeam_channel::{Receiver, Sender};
use tokio::sync::oneshot;

use crate::error::{BridgeError, BridgeResult};
use crate::stage::{panic_message, with_stage, Stage};

pub type SceneJob = Box<dyn FnOnce(&mut World) + Send>;

/// Consumer end of the job queue, drained by [`drain_scene_jobs`].
#[derive(Resource)]
pub struct DispatchQueue {
    receiver: Receiver<SceneJob>,
}

impl DispatchQueue {
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

/// Producer end; cheap to clone into every connection task.
#[derive(Clone)]
pub struct SceneDispatcher {
    sender: Sender<SceneJob>,
}

pub fn scene_queue() -> (SceneDispatcher, DispatchQueue) {
    let (sender, receiver) = crossbeam_channel::unbounded::<SceneJob>();
    (SceneDispatcher { sender }, DispatchQueue { receiver })
}

impl SceneDispatcher {
    /// Queues `job` for the next scene-owner tick. A panicking job
    /// resolves to `CollaboratorFailure`.
    pub fn submit<T, F>(&self, job: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut World) -> BridgeResult<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let wrapped: SceneJob = Box::new(move |world: &mut World| {
            let result = catch_unwind(AssertUnwindSafe(|| job(world))).unwrap_or_else(|payload| {
                Err(BridgeError::collaborator(panic_message(payload.as_ref())))
            });
            let _ = tx.send(result);
        });
        if self.sender.send(wrapped).is_err() {
            tracing::warn!("scene owner is gone; job dropped");
        }
        Pending { rx }
    }

    /// Queues a job that only needs the stage.
    pub fn stage<T, F>(&self, job: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Stage) -> BridgeResult<T> + Send + 'static,
    {
        self.submit(move |world: &mut World| with_stage(world, |stage, _| job(stage)))
    }
}

/// Completion of a submitted job.
pub struct Pending<T> {
    rx: oneshot::Receiver<BridgeResult<T>>,
}

impl<T> Pending<T> {
    /// Waits on the current thread. Must not be called from inside an
    /// async runtime.
    pub fn blocking(self) -> BridgeResult<T> {
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| Err(BridgeError::DispatcherClosed))
    }
}

impl<T> Future for Pending<T> {
    type Output = BridgeResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(BridgeError::DispatcherClosed)))
    }
}

/// Runs every job queued before this tick began. Jobs queued while
/// draining wait for the next tick.
pub fn drain_scene_jobs(world: &mut World) {
    let Some(receiver) = world
        .get_resource::<DispatchQueue>()
        .map(|queue| queue.receiver.clone())
    else {
        return;
    };
    let queued = receiver.len();
    for _ in 0..queued {
        match receiver.try_recv() {
            Ok(job) => job(world),
            Err(_) => break,
        }
    }
    if queued > 0 {
        tracing::trace!(jobs = queued, "scene jobs drained");
    }
}
