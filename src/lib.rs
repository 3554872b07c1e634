pub mod command;
pub mod config;
pub mod error;
pub mod handle;
pub mod init_systems;
pub mod log;
pub mod names;
pub mod poller;
pub mod status;
pub mod supervisor;
pub mod timing;

mod test_helpers;

pub use command::{CommandRunner, SystemCommandRunner};
pub use config::SupervisorConfig;
pub use error::{SupervisorError, SupervisorResult};
pub use handle::ServiceHandle;
pub use init_systems::{InitSystem, InitSystemAdapter};
pub use names::ServiceName;
pub use poller::{NoPoller, PeriodicPoller, StatusPoller};
pub use status::ServiceStatus;
pub use supervisor::Supervisor;
