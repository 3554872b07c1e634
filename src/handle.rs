use std::sync::Arc;

use crate::command::{CommandError, CommandRunner, Invocation};
use crate::error::{SupervisorError, SupervisorResult};
use crate::init_systems::{InitSystem, InitSystemAdapter};
use crate::log;
use crate::names::ServiceName;
use crate::status::ServiceStatus;

/// Controls a single service through the init system it was created with.
///
/// Nothing about the service's state is remembered: `start` and `stop` only
/// issue commands, and `status` asks the init system every time.
pub struct ServiceHandle {
    name: ServiceName,
    adapter: &'static dyn InitSystemAdapter,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("name", &self.name)
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}

impl ServiceHandle {
    pub fn new(name: ServiceName, init_system: InitSystem, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            name,
            adapter: init_system.adapter(),
            runner,
        }
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    /// Asks the init system to start the service. Does not wait for it to
    /// become active.
    pub fn start(&self) -> SupervisorResult<()> {
        log::info!(event = "START", service = self.name);
        self.control(self.adapter.start_command(&self.name))
    }

    /// Asks the init system to stop the service.
    pub fn stop(&self) -> SupervisorResult<()> {
        log::info!(event = "STOP", service = self.name);
        self.control(self.adapter.stop_command(&self.name))
    }

    pub fn restart(&self) -> SupervisorResult<()> {
        log::info!(event = "RESTART", service = self.name);
        self.control(self.adapter.restart_command(&self.name))
    }

    /// Queries the init system for the current status.
    ///
    /// Init systems report many states through a non-zero exit, so output is
    /// interpreted whether or not the command succeeded. A failure with no
    /// output at all is `Unknown`.
    pub fn status(&self) -> ServiceStatus {
        let output = match self.runner.run(&self.adapter.status_command(&self.name)) {
            Ok(output) => output,
            Err(error) => match error.output() {
                Some(output) => {
                    log::debug!(event = "STATUS", service = self.name, error);
                    output.to_owned()
                }
                None => {
                    log::warning!(event = "STATUS", service = self.name, error);
                    return ServiceStatus::Unknown;
                }
            },
        };
        let status = self.adapter.parse_status(&self.name, &output);
        log::trace!(event = "STATUS", service = self.name, status);
        status
    }

    fn control(&self, invocation: Invocation) -> SupervisorResult<()> {
        self.runner
            .run(&invocation)
            .map(|_| ())
            .map_err(|inner: CommandError| SupervisorError::BackendInvocationError {
                service: self.name.clone(),
                inner,
            })
    }
}
