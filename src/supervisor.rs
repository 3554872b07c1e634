use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::command::CommandRunner;
use crate::config::SupervisorConfig;
use crate::error::{SupervisorError, SupervisorResult};
use crate::handle::ServiceHandle;
use crate::init_systems::InitSystem;
use crate::log;
use crate::names::ServiceName;
use crate::poller::StatusPoller;
use crate::status::ServiceStatus;

/// Supervises a fixed set of static services plus a set of dynamic services
/// that can change at runtime, all through one init system.
///
/// Cloning is cheap; clones share the same services.
#[derive(Clone)]
pub struct Supervisor(Arc<Inner>);

struct Inner {
    init_system: InitSystem,
    runner: Arc<dyn CommandRunner>,
    poller: Arc<dyn StatusPoller>,
    disabled_services: BTreeSet<ServiceName>,
    services: Mutex<SupervisedServices>,
}

struct SupervisedServices {
    handles: BTreeMap<ServiceName, Arc<ServiceHandle>>,
    static_services: BTreeSet<ServiceName>,
    // Never overlaps with `static_services`.
    dynamic_services: BTreeSet<ServiceName>,
}

impl Supervisor {
    /// Creates a handle for every static and dynamic service that is not
    /// disabled. Nothing is started.
    pub fn new(
        config: SupervisorConfig,
        runner: Arc<dyn CommandRunner>,
        poller: Arc<dyn StatusPoller>,
    ) -> Self {
        let init_system = config.init_system;
        let disabled_services: BTreeSet<ServiceName> =
            config.disabled_services.into_iter().collect();
        let static_services: BTreeSet<ServiceName> = config
            .services
            .into_iter()
            .filter(|service| !disabled_services.contains(service))
            .collect();
        let dynamic_services: BTreeSet<ServiceName> = config
            .dynamic_services
            .into_iter()
            .filter(|service| {
                !disabled_services.contains(service) && !static_services.contains(service)
            })
            .collect();
        let handles = static_services
            .iter()
            .chain(dynamic_services.iter())
            .map(|service| {
                let handle = ServiceHandle::new(service.clone(), init_system, Arc::clone(&runner));
                (service.clone(), Arc::new(handle))
            })
            .collect();
        log::debug!(
            event = "CONFIGURE",
            init_system,
            static_services,
            dynamic_services,
            disabled_services,
        );
        Self(Arc::new(Inner {
            init_system,
            runner,
            poller,
            disabled_services,
            services: Mutex::new(SupervisedServices {
                handles,
                static_services,
                dynamic_services,
            }),
        }))
    }

    pub fn init_system(&self) -> InitSystem {
        self.0.init_system
    }

    /// Every supervised service, static and dynamic.
    pub fn service_names(&self) -> BTreeSet<ServiceName> {
        self.services().handles.keys().cloned().collect()
    }

    pub fn dynamic_services(&self) -> BTreeSet<ServiceName> {
        self.services().dynamic_services.clone()
    }

    pub fn handle(&self, name: &str) -> SupervisorResult<Arc<ServiceHandle>> {
        self.services()
            .handles
            .get(name)
            .cloned()
            .ok_or_else(|| SupervisorError::UnknownServiceName {
                name: name.to_owned(),
            })
    }

    /// Starts every service. Each one is attempted even if others fail.
    pub fn start_services(&self) -> SupervisorResult<()> {
        let handles = self.handles();
        attempt_all("START", handles.iter(), |handle| handle.start())
    }

    /// Stops every service. Each one is attempted even if others fail.
    pub fn stop_services(&self) -> SupervisorResult<()> {
        let handles = self.handles();
        attempt_all("STOP", handles.iter(), |handle| handle.stop())
    }

    pub fn start_service(&self, name: &str) -> SupervisorResult<()> {
        self.handle(name)?.start()
    }

    pub fn stop_service(&self, name: &str) -> SupervisorResult<()> {
        self.handle(name)?.stop()
    }

    /// Restarts the named services. Unknown names are reported alongside any
    /// other failures once every known service has been attempted.
    pub fn restart_services<S: AsRef<str>>(&self, names: &[S]) -> SupervisorResult<()> {
        let mut failures = Vec::new();
        let mut handles = Vec::new();
        for name in names {
            match self.handle(name.as_ref()) {
                Ok(handle) => handles.push(handle),
                Err(error) => failures.push(error),
            }
        }
        match attempt_all("RESTART", handles.iter(), |handle| handle.restart()) {
            Ok(()) => {}
            Err(SupervisorError::PartialFailure { failures: more }) => failures.extend(more),
            Err(error) => failures.push(error),
        }
        SupervisorError::from_batch(failures)
    }

    /// Queries the init system for the status of a supervised service.
    pub fn status_for(&self, name: &str) -> SupervisorResult<ServiceStatus> {
        Ok(self.handle(name)?.status())
    }

    /// Queries the init system for the status of every supervised service.
    pub fn statuses(&self) -> BTreeMap<ServiceName, ServiceStatus> {
        self.handles()
            .into_iter()
            .map(|handle| (handle.name().clone(), handle.status()))
            .collect()
    }

    /// Reconciles the dynamic services with the desired set.
    ///
    /// Services no longer desired are stopped and forgotten; newly desired
    /// services are created and started. Services in both sets are left alone,
    /// as are static services, whether or not they are listed. Disabled
    /// services are never added.
    ///
    /// The whole reconciliation happens under the supervisor's lock, so
    /// concurrent callers observe it as a single step.
    pub fn update_dynamic_services(
        &self,
        desired: impl IntoIterator<Item = ServiceName>,
    ) -> SupervisorResult<()> {
        let desired: BTreeSet<ServiceName> = desired
            .into_iter()
            .filter(|service| !self.0.disabled_services.contains(service))
            .collect();
        let mut failures = Vec::new();

        let supervised = {
            let mut services = self.services();
            let removed: Vec<ServiceName> = services
                .dynamic_services
                .difference(&desired)
                .cloned()
                .collect();
            let added: Vec<ServiceName> = desired
                .iter()
                .filter(|service| {
                    !services.dynamic_services.contains(*service)
                        && !services.static_services.contains(*service)
                })
                .cloned()
                .collect();
            log::info!(event = "RECONCILE", removed, added);

            for service in removed {
                if let Some(handle) = services.handles.get(&service) {
                    if let Err(error) = handle.stop() {
                        log::warning!(event = "STOP", error);
                        failures.push(error);
                    }
                }
                services.handles.remove(&service);
                services.dynamic_services.remove(&service);
            }

            for service in added {
                let handle = Arc::new(ServiceHandle::new(
                    service.clone(),
                    self.0.init_system,
                    Arc::clone(&self.0.runner),
                ));
                services.handles.insert(service.clone(), Arc::clone(&handle));
                services.dynamic_services.insert(service);
                if let Err(error) = handle.start() {
                    log::warning!(event = "START", error);
                    failures.push(error);
                }
            }

            services.handles.keys().cloned().collect::<BTreeSet<_>>()
        };

        self.0.poller.services_changed(&supervised);
        SupervisorError::from_batch(failures)
    }

    fn services(&self) -> MutexGuard<'_, SupervisedServices> {
        // handles are immutable, so a panic elsewhere cannot leave them inconsistent
        self.0
            .services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // Backend commands run on a snapshot, outside the lock.
    fn handles(&self) -> Vec<Arc<ServiceHandle>> {
        self.services().handles.values().cloned().collect()
    }
}

fn attempt_all<'a>(
    event: &'static str,
    handles: impl Iterator<Item = &'a Arc<ServiceHandle>>,
    operation: impl Fn(&ServiceHandle) -> SupervisorResult<()>,
) -> SupervisorResult<()> {
    let failures = handles
        .filter_map(|handle| operation(handle.as_ref()).err())
        .inspect(|error| log::warning!(event = event, error))
        .collect();
    SupervisorError::from_batch(failures)
}
