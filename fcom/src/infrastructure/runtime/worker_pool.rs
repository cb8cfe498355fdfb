// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Pool
//!
//! Executes independent pipelines concurrently with a bounded worker
//! count. Inside a pipeline execution stays cooperative and
//! single-threaded; the pool only decides *which* pipelines run at the
//! same time.
//!
//! ## Ownership and Parking
//!
//! A pipeline is owned by exactly one worker while it runs. When a filter
//! returns `Async`, the worker hands the boxed pipeline to the parked set
//! and frees itself; `resume(id)` re-queues it, and any worker may pick it
//! up - ownership transfers cleanly because the whole pipeline is `Send`.
//!
//! The park/resume pair is race-free by construction: a resume that
//! arrives before the worker has finished parking leaves a pending marker,
//! and parking on a pending marker re-queues immediately.
//!
//! ## Completion Monitors
//!
//! A monitor registered at submission runs on the worker thread after the
//! pipeline tears down. Monitors may submit further pipelines - the
//! multi-file gzip packer creates one subtask per input file this way and
//! resumes the parent when the last one finishes. Errors never propagate
//! across pipelines except through these monitors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use fcom_domain::value_objects::worker_count::WorkerCount;
use fcom_domain::FcomError;

use super::pipeline::{Pipeline, RunOutcome};

/// Completion callback, run on a worker thread.
pub type Monitor = Box<dyn FnOnce(&Result<(), FcomError>) + Send>;

struct Task {
    pipeline: Box<Pipeline>,
    monitor: Option<Monitor>,
}

enum ParkSlot {
    Parked(Task),
    /// A resume arrived before the worker finished parking.
    ResumePending,
}

/// Bounded pool of pipeline workers.
pub struct WorkerPool {
    tx: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    available: AtomicUsize,
    total: usize,
    parked: Mutex<HashMap<u64, ParkSlot>>,
    next_id: AtomicU64,
}

impl WorkerPool {
    /// Spawns `count` workers.
    pub fn new(count: WorkerCount) -> Result<Arc<Self>, FcomError> {
        let (tx, rx) = unbounded::<Task>();
        let pool = Arc::new(WorkerPool {
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(Vec::new()),
            available: AtomicUsize::new(count.get()),
            total: count.get(),
            parked: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        });

        for i in 0..count.get() {
            let rx: Receiver<Task> = rx.clone();
            let pool_ref = Arc::clone(&pool);
            let handle = std::thread::Builder::new()
                .name(format!("fcom-worker-{}", i))
                .spawn(move || worker_loop(pool_ref, rx))
                .map_err(|e| FcomError::Sys(format!("spawn worker: {}", e)))?;
            pool.workers.lock().push(handle);
        }

        tracing::debug!(workers = count.get(), "worker pool started");
        Ok(pool)
    }

    /// Queues a pipeline. It starts immediately when a worker is free,
    /// otherwise as soon as one frees up. Returns the pipeline id used by
    /// `resume`.
    pub fn submit(&self, mut pipeline: Box<Pipeline>, monitor: Option<Monitor>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        pipeline.command_mut().pipeline_id = id;
        self.send(Task { pipeline, monitor });
        id
    }

    /// True when at least one worker is idle right now.
    pub fn available(&self) -> bool {
        self.available.load(Ordering::SeqCst) > 0
    }

    pub fn worker_count(&self) -> usize {
        self.total
    }

    /// Re-queues a parked pipeline. Safe to call before the pipeline has
    /// actually parked; the resume is then applied the moment it does.
    pub fn resume(&self, id: u64) {
        let mut parked = self.parked.lock();
        match parked.remove(&id) {
            Some(ParkSlot::Parked(task)) => {
                drop(parked);
                self.send(task);
            }
            Some(ParkSlot::ResumePending) | None => {
                parked.insert(id, ParkSlot::ResumePending);
            }
        }
    }

    /// Stops accepting work and joins every worker. Queued pipelines
    /// finish first; parked pipelines that were never resumed are dropped.
    pub fn shutdown(&self) {
        let tx = self.tx.lock().take();
        drop(tx);
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            let _ = handle.join();
        }
    }

    fn send(&self, task: Task) {
        if let Some(tx) = &*self.tx.lock() {
            // Send fails only after shutdown; the task is dropped then.
            let _ = tx.send(task);
        }
    }

    fn park(&self, id: u64, task: Task) {
        let mut parked = self.parked.lock();
        match parked.remove(&id) {
            Some(ParkSlot::ResumePending) => {
                drop(parked);
                self.send(task);
            }
            _ => {
                parked.insert(id, ParkSlot::Parked(task));
            }
        }
    }
}

/// Tracks a family of subtask pipelines on behalf of a parked parent.
///
/// The parent registers one completion monitor per subtask, parks with
/// `Async` while `idle()` is false, and is resumed by every completion -
/// the last one finds the tracker idle. Keeping the bookkeeping here means
/// operations never touch raw atomics.
pub struct SubtaskTracker {
    pool: Arc<WorkerPool>,
    parent_id: u64,
    pending: AtomicUsize,
    failed: std::sync::atomic::AtomicBool,
}

impl SubtaskTracker {
    pub fn new(pool: Arc<WorkerPool>, parent_id: u64) -> Arc<Self> {
        Arc::new(SubtaskTracker {
            pool,
            parent_id,
            pending: AtomicUsize::new(0),
            failed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Registers one subtask and returns its completion monitor.
    pub fn monitor(self: &Arc<Self>) -> Monitor {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let tracker = Arc::clone(self);
        Box::new(move |result: &Result<(), FcomError>| {
            if result.is_err() {
                tracker.failed.store(true, Ordering::SeqCst);
            }
            tracker.pending.fetch_sub(1, Ordering::SeqCst);
            tracker.pool.resume(tracker.parent_id);
        })
    }

    /// True when every registered subtask has completed.
    pub fn idle(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }

    /// True when any subtask completed with an error.
    pub fn any_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

fn worker_loop(pool: Arc<WorkerPool>, rx: Receiver<Task>) {
    while let Ok(mut task) = rx.recv() {
        pool.available.fetch_sub(1, Ordering::SeqCst);
        let id = task.pipeline.command().pipeline_id;
        let outcome = task.pipeline.run();
        match outcome {
            RunOutcome::Complete(result) => {
                if let Some(monitor) = task.monitor.take() {
                    monitor(&result);
                }
            }
            RunOutcome::Parked(pipeline) => {
                pool.park(
                    id,
                    Task {
                        pipeline,
                        monitor: task.monitor.take(),
                    },
                );
            }
        }
        pool.available.fetch_add(1, Ordering::SeqCst);
    }
}
