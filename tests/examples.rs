use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::thread;

use servitor::command::{CommandError, ExitStatus, Invocation};
use servitor::*;

/// An init system that keeps its services in memory, answering the same
/// commands (and with the same output) as `systemctl` or `sv`.
struct FakeInitSystem {
    init_system: InitSystem,
    installed: BTreeSet<String>,
    running: Mutex<BTreeSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeInitSystem {
    fn new(init_system: InitSystem, installed: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            init_system,
            installed: installed.iter().map(|s| s.to_string()).collect(),
            running: Mutex::new(BTreeSet::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn is_running(&self, service: &str) -> bool {
        self.running.lock().unwrap().contains(service)
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_for(&self, service: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.ends_with(&format!(" {}", service)))
            .collect()
    }

    fn status_output(&self, service: &str) -> Result<String, CommandError> {
        let running = self.is_running(service);
        match self.init_system {
            InitSystem::Systemd if running => Ok("active\n".to_owned()),
            InitSystem::Systemd => Err(exited(3, "inactive\n")),
            InitSystem::Runit if !self.installed.contains(service) => Err(exited(
                1,
                &format!(
                    "fail: {}: unable to change to service directory: file does not exist\n",
                    service
                ),
            )),
            InitSystem::Runit if running => Ok(format!(
                "run: {}: (pid 2274) 5s; run: log: (pid 2275) 268195s\n",
                service
            )),
            InitSystem::Runit => Ok(format!(
                "down: {}: 5s, normally up; run: log: (pid 2275) 268195s\n",
                service
            )),
        }
    }
}

fn exited(code: u8, output: &str) -> CommandError {
    CommandError::ExitedAbnormally {
        command: String::new(),
        status: ExitStatus::ExitedWithCode(code),
        output: output.to_owned(),
        errors: String::new(),
    }
}

impl CommandRunner for FakeInitSystem {
    fn run(&self, invocation: &Invocation) -> Result<String, CommandError> {
        self.calls.lock().unwrap().push(invocation.to_string());
        let arguments: Vec<String> = invocation.arguments.iter().map(|a| a.to_string()).collect();
        let [action, service] = arguments.as_slice() else {
            return Err(exited(2, ""));
        };
        match action.as_str() {
            "start" | "up" | "restart" => {
                self.running.lock().unwrap().insert(service.clone());
                Ok(String::new())
            }
            "stop" | "down" => {
                self.running.lock().unwrap().remove(service);
                Ok(String::new())
            }
            "is-active" | "status" => self.status_output(service),
            _ => Err(exited(2, "")),
        }
    }
}

fn names(names: &[&str]) -> anyhow::Result<Vec<ServiceName>> {
    Ok(names
        .iter()
        .map(|name| name.parse::<ServiceName>())
        .collect::<Result<Vec<_>, _>>()?)
}

fn supervisor(
    backend: &Arc<FakeInitSystem>,
    static_services: &[&str],
    dynamic_services: &[&str],
) -> anyhow::Result<Supervisor> {
    let config = SupervisorConfig::new(names(static_services)?, backend.init_system)
        .with_dynamic_services(names(dynamic_services)?);
    Ok(Supervisor::new(
        config,
        Arc::clone(backend) as Arc<dyn CommandRunner>,
        Arc::new(NoPoller),
    ))
}

#[test]
fn systemd_services_start_and_stop_idempotently() -> anyhow::Result<()> {
    let backend = FakeInitSystem::new(InitSystem::Systemd, &["dummy1", "dummy2"]);
    let supervisor = supervisor(&backend, &["dummy1", "dummy2"], &[])?;

    supervisor.start_services()?;
    supervisor.start_services()?;
    assert_eq!(supervisor.status_for("dummy1")?, ServiceStatus::Active);

    supervisor.stop_services()?;
    supervisor.stop_services()?;
    // systemd's "inactive" is not distinguished from an unknown state
    assert_eq!(supervisor.status_for("dummy1")?, ServiceStatus::Unknown);
    assert_eq!(supervisor.status_for("dummy2")?, ServiceStatus::Unknown);
    Ok(())
}

#[test]
fn runit_reports_down_and_missing_services() -> anyhow::Result<()> {
    let backend = FakeInitSystem::new(InitSystem::Runit, &["dummy1"]);
    let supervisor = supervisor(&backend, &["dummy1", "not_installed"], &[])?;

    assert_eq!(
        supervisor.statuses(),
        BTreeMap::from([
            ("dummy1".parse::<ServiceName>()?, ServiceStatus::Inactive),
            ("not_installed".parse::<ServiceName>()?, ServiceStatus::Failed),
        ])
    );

    supervisor.start_service("dummy1")?;

    assert_eq!(supervisor.status_for("dummy1")?, ServiceStatus::Active);
    Ok(())
}

#[test]
fn reconciling_dynamic_services_leaves_unchanged_services_running() -> anyhow::Result<()> {
    let backend = FakeInitSystem::new(InitSystem::Runit, &["dummy1", "a", "b", "c"]);
    let supervisor = supervisor(&backend, &["dummy1"], &["a", "b"])?;
    supervisor.start_services()?;

    supervisor.update_dynamic_services(names(&["b", "c"])?)?;

    assert!(!backend.is_running("a"));
    assert!(backend.is_running("b"));
    assert!(backend.is_running("c"));
    assert!(backend.is_running("dummy1"));
    assert_eq!(backend.calls_for("a"), vec!["sv up a", "sv down a"]);
    assert_eq!(backend.calls_for("b"), vec!["sv up b"]);
    assert_eq!(backend.calls_for("c"), vec!["sv up c"]);
    assert_eq!(backend.calls_for("dummy1"), vec!["sv up dummy1"]);
    assert!(matches!(
        supervisor.status_for("a"),
        Err(SupervisorError::UnknownServiceName { .. })
    ));
    Ok(())
}

#[test]
fn status_queries_can_run_alongside_reconciliation() -> anyhow::Result<()> {
    let backend = FakeInitSystem::new(InitSystem::Systemd, &["dummy1", "redirectd"]);
    let supervisor = supervisor(&backend, &["dummy1"], &["redirectd"])?;
    supervisor.start_services()?;

    thread::scope(|scope| -> anyhow::Result<()> {
        let poller = scope.spawn(|| {
            for _ in 0..100 {
                let status = supervisor.status_for("dummy1");
                assert!(matches!(status, Ok(ServiceStatus::Active)));
            }
        });
        for i in 0..50 {
            let desired = if i % 2 == 0 { names(&[])? } else { names(&["redirectd"])? };
            supervisor.update_dynamic_services(desired)?;
        }
        poller
            .join()
            .map_err(|_| anyhow::anyhow!("the polling thread panicked"))
    })?;

    assert_eq!(
        supervisor.dynamic_services(),
        names(&["redirectd"])?.into_iter().collect::<BTreeSet<_>>()
    );
    assert!(backend.is_running("redirectd"));
    Ok(())
}
