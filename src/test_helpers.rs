#![cfg(test)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time;

use crate::command::{CommandError, CommandRunner, Invocation};
use crate::names::ServiceName;
use crate::timing::Duration;

/// Stands in for the init system's command-line tools.
///
/// Every invocation is recorded. Each one gets the same scripted response,
/// except for invocations targeting a service marked as broken, which fail as
/// if the tool could not be run.
pub struct ScriptedRunner {
    invocations: Mutex<Vec<Invocation>>,
    response: Mutex<Result<String, CommandError>>,
    broken: Mutex<BTreeSet<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            invocations: Mutex::new(Vec::new()),
            response: Mutex::new(Ok(String::new())),
            broken: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn respond_with(&self, output: &str) {
        *self.response.lock().unwrap() = Ok(output.to_owned());
    }

    pub fn fail_with(&self, error: CommandError) {
        *self.response.lock().unwrap() = Err(error);
    }

    pub fn break_service(&self, service: &str) {
        self.broken.lock().unwrap().insert(service.to_owned());
    }

    /// The invocations so far, as command lines.
    pub fn invocations(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> Result<String, CommandError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        let target = invocation
            .arguments
            .last()
            .map(ToString::to_string)
            .unwrap_or_default();
        if self.broken.lock().unwrap().contains(&target) {
            return Err(CommandError::SpawnFailed {
                command: invocation.to_string(),
                inner: std::io::Error::new(std::io::ErrorKind::NotFound, "broken").into(),
            });
        }
        self.response.lock().unwrap().clone()
    }
}

pub fn name(name: &str) -> ServiceName {
    name.parse().expect("Invalid service name.")
}

pub fn names(names: &[&str]) -> Vec<ServiceName> {
    names.iter().map(|n| name(n)).collect()
}

pub fn eventually<A: std::fmt::Debug>(action: impl Fn() -> anyhow::Result<A>) -> anyhow::Result<A> {
    let start_time = time::Instant::now();
    loop {
        let result = action();
        match result {
            Ok(_) => {
                return result;
            }
            Err(_) => {
                // fail if we've taken too long, otherwise retry after a short delay
                if time::Instant::now() - start_time >= time::Duration::from_secs(3) {
                    return result;
                }
            }
        }
        Duration::QUANTUM.sleep();
    }
}
