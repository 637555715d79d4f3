//! Scripted executor shared by unit tests

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::ExecutionError;
use crate::executor::{CommandExecutor, CommandResult};

type Handler = dyn Fn(&[String]) -> Result<CommandResult, ExecutionError> + Send + Sync;

/// Executor that answers from a closure and records every argv it sees
pub struct ScriptedExecutor {
    handler: Box<Handler>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn new(
        handler: impl Fn(&[String]) -> Result<CommandResult, ExecutionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls whose argv contains `word`
    pub fn calls_with(&self, word: &str) -> usize {
        self.calls()
            .iter()
            .filter(|argv| argv.iter().any(|a| a == word))
            .count()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, argv: &[String], _timeout: Duration) -> Result<CommandResult, ExecutionError> {
        self.calls.lock().unwrap().push(argv.to_vec());
        (self.handler)(argv)
    }
}

pub fn output(exit_code: i32, stdout: &str) -> CommandResult {
    CommandResult {
        exit_code,
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
        duration: Duration::from_millis(1),
    }
}

pub fn timeout(program: &str) -> ExecutionError {
    ExecutionError::Timeout {
        program: program.to_string(),
        timeout: Duration::from_secs(1),
    }
}

pub fn launch_failure(program: &str) -> ExecutionError {
    ExecutionError::LaunchFailure {
        program: program.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file or directory"),
    }
}
