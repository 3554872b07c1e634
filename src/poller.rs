use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use crate::log;
use crate::names::ServiceName;
use crate::status::ServiceStatus;
use crate::supervisor::Supervisor;
use crate::timing::Duration;

/// Decides when service statuses are checked.
///
/// The supervisor tells its poller whenever the set of supervised services
/// changes; everything else is up to the poller.
pub trait StatusPoller: Send + Sync {
    fn services_changed(&self, services: &BTreeSet<ServiceName>);
}

/// A poller that never polls.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPoller;

impl StatusPoller for NoPoller {
    fn services_changed(&self, _services: &BTreeSet<ServiceName>) {}
}

/// Checks every supervised service at a fixed interval on a background
/// thread, logging each change in status.
pub struct PeriodicPoller {
    interval: Duration,
    last_seen: Mutex<BTreeMap<ServiceName, ServiceStatus>>,
    stop_signal: AtomicBool,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl PeriodicPoller {
    pub fn new(interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            interval,
            last_seen: Mutex::new(BTreeMap::new()),
            stop_signal: AtomicBool::new(false),
            thread: Mutex::new(None),
        })
    }

    /// Starts polling the given supervisor until [`stop`](Self::stop) is called.
    pub fn start(self: &Arc<Self>, supervisor: Supervisor) {
        let poller = Arc::clone(self);
        let handle = thread::spawn(move || poller.run(&supervisor));
        *self.thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::Relaxed);
    }

    /// Blocks until the polling thread has finished.
    pub fn wait(&self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!(event = "POLL", error = "the polling thread panicked");
            }
        }
    }

    /// Queries every service once, returning those whose status differs from
    /// the previous poll.
    pub fn poll(&self, supervisor: &Supervisor) -> BTreeMap<ServiceName, ServiceStatus> {
        let statuses = supervisor.statuses();
        self.record(supervisor, statuses)
    }

    // Services removed since the statuses were queried have already been
    // forgotten by `services_changed`, and must stay forgotten.
    fn record(
        &self,
        supervisor: &Supervisor,
        statuses: BTreeMap<ServiceName, ServiceStatus>,
    ) -> BTreeMap<ServiceName, ServiceStatus> {
        let mut last_seen = self.last_seen.lock().unwrap_or_else(PoisonError::into_inner);
        let supervised = supervisor.service_names();
        let mut changed = BTreeMap::new();
        for (service, current) in statuses {
            if !supervised.contains(&service) {
                continue;
            }
            let previous = last_seen.insert(service.clone(), current);
            if previous != Some(current) {
                log::info!(event = "STATUS_CHANGED", service, previous, current);
                changed.insert(service, current);
            }
        }
        changed
    }

    pub fn last_seen(&self) -> BTreeMap<ServiceName, ServiceStatus> {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn run(&self, supervisor: &Supervisor) {
        log::debug!(event = "POLL", interval = self.interval);
        while !self.stop_requested() {
            self.poll(supervisor);
            self.pause();
        }
        log::debug!(event = "POLL", stopped = true);
    }

    fn pause(&self) {
        let interval: std::time::Duration = self.interval.into();
        let started = Instant::now();
        while !self.stop_requested() && started.elapsed() < interval {
            Duration::QUANTUM.sleep();
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop_signal.load(Ordering::Relaxed)
    }
}

impl StatusPoller for PeriodicPoller {
    fn services_changed(&self, services: &BTreeSet<ServiceName>) {
        log::debug!(event = "POLL", services);
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|service, _| services.contains(service));
    }
}
