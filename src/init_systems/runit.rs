use std::path::Path;

use crate::command::Invocation;
use crate::names::ServiceName;
use crate::status::ServiceStatus;

use super::InitSystemAdapter;

const SV: &str = "sv";

/// Controls services through runit's `sv`.
///
/// `sv status` reports one record per service, shaped like
/// `run: dummy1: (pid 123) 45s`. A service with a logger gets a second record
/// for it, either on its own line or appended after a `;`:
///
/// ```text
/// down: dummy1: 12s, normally up; run: log: (pid 124) 268195s
/// ```
///
/// Only the record naming the queried service counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Runit;

impl InitSystemAdapter for Runit {
    fn start_command(&self, service: &ServiceName) -> Invocation {
        Invocation::new(SV, ["up", service.as_str()])
    }

    fn stop_command(&self, service: &ServiceName) -> Invocation {
        Invocation::new(SV, ["down", service.as_str()])
    }

    fn restart_command(&self, service: &ServiceName) -> Invocation {
        Invocation::new(SV, ["restart", service.as_str()])
    }

    fn status_command(&self, service: &ServiceName) -> Invocation {
        Invocation::new(SV, ["status", service.as_str()])
    }

    fn parse_status(&self, service: &ServiceName, output: &str) -> ServiceStatus {
        output
            .lines()
            .flat_map(records)
            .filter_map(parse_record)
            .find(|(name, _)| names_service(name, service))
            .map(|(_, status)| status)
            .unwrap_or(ServiceStatus::Unknown)
    }
}

/// A line holds one record, followed by `; `-separated records for any
/// sub-services. Only those trailing records are trimmed; the first must
/// start at the beginning of the line.
fn records(line: &str) -> impl Iterator<Item = &str> {
    let mut records = line.split(';');
    records.next().into_iter().chain(records.map(str::trim_start))
}

/// Splits `<token>: <service>: <rest>` into the service field and its status.
/// Tokens are case-sensitive; records with any other token are skipped.
fn parse_record(record: &str) -> Option<(&str, ServiceStatus)> {
    let (token, rest) = record.split_once(": ")?;
    let status = match token {
        "run" => ServiceStatus::Active,
        "down" => ServiceStatus::Inactive,
        "fail" => ServiceStatus::Failed,
        _ => return None,
    };
    let (name, _) = rest.split_once(':')?;
    Some((name, status))
}

// `sv` echoes the name as given, which may be a path to the service directory.
fn names_service(name: &str, service: &ServiceName) -> bool {
    name == service.as_str()
        || Path::new(name)
            .file_name()
            .is_some_and(|file_name| file_name == service.as_str())
}
