use crate::command::CommandError;
use crate::names::ServiceName;

pub type SupervisorResult<A> = std::result::Result<A, SupervisorError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize)]
#[serde(tag = "code")]
pub enum SupervisorError {
    #[error("unrecognized init system {selector:?} (expected \"systemd\" or \"runit\")")]
    UnrecognizedInitSystem { selector: String },
    #[error("no service named {name:?} is being supervised")]
    UnknownServiceName { name: String },
    #[error("could not control {service}: {inner}")]
    BackendInvocationError {
        service: ServiceName,
        inner: CommandError,
    },
    #[error("{} service(s) could not be controlled", .failures.len())]
    PartialFailure { failures: Vec<SupervisorError> },
}

impl SupervisorError {
    /// Combines the failures of a batch operation. Every service in the batch
    /// has already been attempted by the time this is called.
    pub(crate) fn from_batch(failures: Vec<SupervisorError>) -> SupervisorResult<()> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Self::PartialFailure { failures })
        }
    }
}
