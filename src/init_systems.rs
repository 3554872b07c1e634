pub mod runit;
pub mod systemd;

pub use runit::Runit;
pub use systemd::Systemd;

use crate::command::Invocation;
use crate::error::SupervisorError;
use crate::names::ServiceName;
use crate::status::ServiceStatus;

/// Knows how to drive one family of init systems: which commands control a
/// service, and how to read the status it reports.
///
/// Parsing never fails. Output the adapter does not recognize is reported as
/// [`ServiceStatus::Unknown`].
pub trait InitSystemAdapter: std::fmt::Debug + Send + Sync {
    fn start_command(&self, service: &ServiceName) -> Invocation;

    fn stop_command(&self, service: &ServiceName) -> Invocation;

    fn restart_command(&self, service: &ServiceName) -> Invocation;

    fn status_command(&self, service: &ServiceName) -> Invocation;

    fn parse_status(&self, service: &ServiceName, output: &str) -> ServiceStatus;
}

/// Selects the init system that manages every service of a supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum InitSystem {
    Systemd,
    Runit,
}

impl InitSystem {
    pub fn adapter(self) -> &'static dyn InitSystemAdapter {
        match self {
            Self::Systemd => &Systemd,
            Self::Runit => &Runit,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Systemd => "systemd",
            Self::Runit => "runit",
        }
    }
}

impl std::fmt::Display for InitSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InitSystem {
    type Err = SupervisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "systemd" => Ok(Self::Systemd),
            "runit" => Ok(Self::Runit),
            _ => Err(SupervisorError::UnrecognizedInitSystem {
                selector: s.to_owned(),
            }),
        }
    }
}

impl TryFrom<String> for InitSystem {
    type Error = SupervisorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
