use crate::init_systems::InitSystem;
use crate::names::ServiceName;

/// Everything a [`Supervisor`](crate::Supervisor) is constructed from.
///
/// Loading this is up to the hosting agent; it can be deserialized from any
/// serde format.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct SupervisorConfig {
    /// Services supervised for the whole run.
    pub services: Vec<ServiceName>,
    pub init_system: InitSystem,
    /// Services enabled at startup which may later be removed.
    #[serde(default)]
    pub dynamic_services: Vec<ServiceName>,
    /// Services never supervised, even when listed above.
    #[serde(default)]
    pub disabled_services: Vec<ServiceName>,
}

impl SupervisorConfig {
    pub fn new(services: Vec<ServiceName>, init_system: InitSystem) -> Self {
        Self {
            services,
            init_system,
            dynamic_services: Vec::new(),
            disabled_services: Vec::new(),
        }
    }

    pub fn with_dynamic_services(mut self, dynamic_services: Vec<ServiceName>) -> Self {
        self.dynamic_services = dynamic_services;
        self
    }

    pub fn with_disabled_services(mut self, disabled_services: Vec<ServiceName>) -> Self {
        self.disabled_services = disabled_services;
        self
    }
}
