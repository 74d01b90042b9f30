use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner};

type ArgsMatcher = Box<dyn Fn(&[String]) -> bool + Send + Sync>;
type Responder = Box<dyn Fn(&ProcessCommand) -> ProcessOutput + Send + Sync>;

/// Scriptable [`ProcessRunner`] for tests
///
/// Expectations are matched in registration order; the first one whose
/// program and argument matcher accept a command answers it.
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    expectations: Arc<Mutex<Vec<Expectation>>>,
    calls: Arc<Mutex<Vec<ProcessCommand>>>,
}

struct Expectation {
    program: String,
    args: Option<ArgsMatcher>,
    output: ProcessOutput,
    responder: Option<Responder>,
}

impl Expectation {
    fn accepts(&self, command: &ProcessCommand) -> bool {
        self.program == command.program && self.args.as_ref().map_or(true, |m| m(&command.args))
    }

    fn answer(&self, command: &ProcessCommand) -> ProcessOutput {
        match &self.responder {
            Some(responder) => responder(command),
            None => self.output.clone(),
        }
    }
}

/// Builder returned by [`MockProcessRunner::expect_command`]; call `finish`
/// to register it
pub struct MockCommandConfig {
    runner: MockProcessRunner,
    expectation: Expectation,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_command(&self, program: &str) -> MockCommandConfig {
        MockCommandConfig {
            runner: self.clone(),
            expectation: Expectation {
                program: program.to_string(),
                args: None,
                output: ProcessOutput {
                    status: ExitStatus::Success,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: Duration::ZERO,
                },
                responder: None,
            },
        }
    }

    pub fn verify_called(&self, program: &str, times: usize) -> bool {
        self.get_call_history()
            .iter()
            .filter(|cmd| cmd.program == program)
            .count()
            == times
    }

    pub fn get_call_history(&self) -> Vec<ProcessCommand> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        self.calls.lock().unwrap().push(command.clone());

        self.expectations
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.accepts(&command))
            .map(|e| e.answer(&command))
            .ok_or_else(|| {
                ProcessError::MockExpectationNotMet(format!(
                    "no expectation for '{}'",
                    command.display()
                ))
            })
    }
}

impl MockCommandConfig {
    pub fn with_args<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.expectation.args = Some(Box::new(matcher));
        self
    }

    pub fn returns_stdout(mut self, stdout: &str) -> Self {
        self.expectation.output.stdout = stdout.to_string();
        self
    }

    pub fn returns_stderr(mut self, stderr: &str) -> Self {
        self.expectation.output.stderr = stderr.to_string();
        self
    }

    pub fn returns_exit_code(mut self, code: i32) -> Self {
        self.expectation.output.status = match code {
            0 => ExitStatus::Success,
            code => ExitStatus::Error(code),
        };
        self
    }

    /// Compute the response from the command, e.g. from its environment
    pub fn responds_with<F>(mut self, responder: F) -> Self
    where
        F: Fn(&ProcessCommand) -> ProcessOutput + Send + Sync + 'static,
    {
        self.expectation.responder = Some(Box::new(responder));
        self
    }

    pub fn finish(self) {
        self.runner.expectations.lock().unwrap().push(self.expectation);
    }
}
