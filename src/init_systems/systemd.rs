use crate::command::Invocation;
use crate::names::ServiceName;
use crate::status::ServiceStatus;

use super::InitSystemAdapter;

const SYSTEMCTL: &str = "systemctl";

/// Controls units through `systemctl`.
///
/// `systemctl is-active` prints the unit's active state as a single word.
/// Only `active` and `failed` are told apart; every other state, including
/// `inactive`, is reported as unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct Systemd;

impl InitSystemAdapter for Systemd {
    fn start_command(&self, service: &ServiceName) -> Invocation {
        Invocation::new(SYSTEMCTL, ["start", service.as_str()])
    }

    fn stop_command(&self, service: &ServiceName) -> Invocation {
        Invocation::new(SYSTEMCTL, ["stop", service.as_str()])
    }

    fn restart_command(&self, service: &ServiceName) -> Invocation {
        Invocation::new(SYSTEMCTL, ["restart", service.as_str()])
    }

    fn status_command(&self, service: &ServiceName) -> Invocation {
        Invocation::new(SYSTEMCTL, ["is-active", service.as_str()])
    }

    fn parse_status(&self, _service: &ServiceName, output: &str) -> ServiceStatus {
        match output.trim() {
            "active" => ServiceStatus::Active,
            "failed" => ServiceStatus::Failed,
            _ => ServiceStatus::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(output: &str) -> anyhow::Result<ServiceStatus> {
        let service: ServiceName = "dummy_service".parse()?;
        Ok(Systemd.parse_status(&service, output))
    }

    #[test]
    fn test_active() -> anyhow::Result<()> {
        assert_eq!(parse("active\n")?, ServiceStatus::Active);
        assert_eq!(parse("  active  ")?, ServiceStatus::Active);
        Ok(())
    }

    #[test]
    fn test_failed() -> anyhow::Result<()> {
        assert_eq!(parse("failed\n")?, ServiceStatus::Failed);
        Ok(())
    }

    #[test]
    fn test_everything_else_is_unknown() -> anyhow::Result<()> {
        for output in [
            "",
            "\n",
            "inactive\n",
            "unknown\n",
            "activating\n",
            "deactivating\n",
            "Active\n",
            "active (running)\n",
            "active\nfailed\n",
        ] {
            assert_eq!(parse(output)?, ServiceStatus::Unknown, "{:?}", output);
        }
        Ok(())
    }

    #[test]
    fn test_commands() -> anyhow::Result<()> {
        let service: ServiceName = "magma@mme".parse()?;

        assert_eq!(
            Systemd.stop_command(&service).to_string(),
            "systemctl stop magma@mme"
        );
        assert_eq!(
            Systemd.restart_command(&service).to_string(),
            "systemctl restart magma@mme"
        );
        assert_eq!(
            Systemd.status_command(&service).to_string(),
            "systemctl is-active magma@mme"
        );
        Ok(())
    }
}
