use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use signal_hook::consts::signal;

use servitor::log::{self, LogFormat, Severity};
use servitor::timing::Duration;
use servitor::*;

#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
struct Arguments {
    #[command(subcommand)]
    command: Command,
    /// The init system managing the services: "systemd" or "runit".
    #[arg(long = "init-system")]
    init_system: InitSystem,
    /// Services supervised for the whole run.
    #[arg(long = "service", value_delimiter = ',')]
    services: Vec<ServiceName>,
    /// Services enabled at startup which may later be removed.
    #[arg(long = "dynamic-service", value_delimiter = ',')]
    dynamic_services: Vec<ServiceName>,
    /// Services never supervised, even when listed.
    #[arg(long = "disabled-service", value_delimiter = ',')]
    disabled_services: Vec<ServiceName>,
    /// How long to wait for each init system command, e.g. "30s".
    #[arg(long = "command-timeout", default_value_t = Duration::COMMAND_TIMEOUT)]
    command_timeout: Duration,
    /// Defaults to text on a terminal and JSON otherwise.
    #[arg(long = "log-format", value_enum)]
    log_format: Option<LogFormat>,
    #[arg(long = "log-level", value_enum, default_value_t = Severity::Info)]
    log_level: Severity,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Start every service.
    Start,
    /// Stop every service.
    Stop,
    /// Print the status of the given services, or of every service.
    Status { names: Vec<ServiceName> },
    /// Restart the given services.
    Restart {
        #[arg(required = true)]
        names: Vec<ServiceName>,
    },
    /// Poll every service until interrupted, logging status changes.
    Watch {
        #[arg(long, default_value_t = Duration::POLL_INTERVAL)]
        interval: Duration,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Arguments::parse();
    log::configure(args.log_format, args.log_level);

    let config = SupervisorConfig::new(args.services, args.init_system)
        .with_dynamic_services(args.dynamic_services)
        .with_disabled_services(args.disabled_services);
    let runner = Arc::new(SystemCommandRunner::new(args.command_timeout));

    match args.command {
        Command::Start => Supervisor::new(config, runner, Arc::new(NoPoller))
            .start_services()
            .context("Failed to start services"),
        Command::Stop => Supervisor::new(config, runner, Arc::new(NoPoller))
            .stop_services()
            .context("Failed to stop services"),
        Command::Status { names } => {
            let supervisor = Supervisor::new(config, runner, Arc::new(NoPoller));
            let names = if names.is_empty() {
                supervisor.service_names().into_iter().collect()
            } else {
                names
            };
            for name in names {
                let status = supervisor.status_for(name.as_str())?;
                println!("{}: {}", name, status);
            }
            Ok(())
        }
        Command::Restart { names } => Supervisor::new(config, runner, Arc::new(NoPoller))
            .restart_services(names.as_slice())
            .context("Failed to restart services"),
        Command::Watch { interval } => {
            let poller = PeriodicPoller::new(interval);
            let supervisor =
                Supervisor::new(config, runner, Arc::clone(&poller) as Arc<dyn StatusPoller>);
            unsafe {
                for signal in [signal::SIGINT, signal::SIGQUIT, signal::SIGTERM] {
                    let poller_for_signal = Arc::downgrade(&poller);
                    signal_hook::low_level::register(signal, move || {
                        if let Some(p) = poller_for_signal.upgrade() {
                            p.stop();
                        }
                    })?;
                }
            }
            poller.start(supervisor);
            poller.wait();
            Ok(())
        }
    }
}
