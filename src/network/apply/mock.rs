//! Mock command runner for testing
//!
//! Records every command instead of executing it and can be told to fail
//! commands matching a pattern.

use super::{CommandOutput, CommandRunner};
use crate::NetApplyError;
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug)]
struct Failure {
    pattern: String,
    stderr: String,
    /// `None` fails forever
    remaining: Option<usize>,
}

/// Mock command runner
///
/// # Example
/// ```
/// use cloud_net_apply::network::apply::mock::MockRunner;
///
/// let runner = MockRunner::new().fail_times("ip link set", "Cannot find device", 2);
/// assert!(runner.command_lines().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct MockRunner {
    commands: Mutex<Vec<String>>,
    failures: Mutex<Vec<Failure>>,
    outputs: Mutex<Vec<(String, String)>>,
}

impl MockRunner {
    /// Create a runner where every command succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every command whose line contains `pattern`
    pub fn fail_on(self, pattern: &str, stderr: &str) -> Self {
        self.push_failure(pattern, stderr, None)
    }

    /// Fail the first `times` commands whose line contains `pattern`
    pub fn fail_times(self, pattern: &str, stderr: &str, times: usize) -> Self {
        self.push_failure(pattern, stderr, Some(times))
    }

    /// Print `stdout` for successful commands whose line contains `pattern`
    pub fn stdout_on(self, pattern: &str, stdout: &str) -> Self {
        if let Ok(mut outputs) = self.outputs.lock() {
            outputs.push((pattern.to_string(), stdout.to_string()));
        }
        self
    }

    fn push_failure(self, pattern: &str, stderr: &str, remaining: Option<usize>) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(Failure {
                pattern: pattern.to_string(),
                stderr: stderr.to_string(),
                remaining,
            });
        }
        self
    }

    /// Every command run so far, as `program arg1 arg2 ...`
    pub fn command_lines(&self) -> Vec<String> {
        self.commands
            .lock()
            .map(|commands| commands.clone())
            .unwrap_or_default()
    }

    /// Forget recorded commands
    pub fn clear(&self) {
        if let Ok(mut commands) = self.commands.lock() {
            commands.clear();
        }
    }

    fn stdout_for(&self, line: &str) -> String {
        self.outputs
            .lock()
            .ok()
            .and_then(|outputs| {
                outputs
                    .iter()
                    .find(|(pattern, _)| line.contains(pattern.as_str()))
                    .map(|(_, stdout)| stdout.clone())
            })
            .unwrap_or_default()
    }

    fn failure_for(&self, line: &str) -> Option<String> {
        let mut failures = self.failures.lock().ok()?;
        for failure in failures.iter_mut() {
            if !line.contains(&failure.pattern) {
                continue;
            }
            match failure.remaining {
                None => return Some(failure.stderr.clone()),
                Some(0) => continue,
                Some(n) => {
                    failure.remaining = Some(n - 1);
                    return Some(failure.stderr.clone());
                }
            }
        }
        None
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, NetApplyError> {
        let mut line = program.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }

        let failure = self.failure_for(&line);
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(line.clone());
        }

        Ok(match failure {
            Some(stderr) => CommandOutput {
                code: Some(2),
                stdout: String::new(),
                stderr,
            },
            None => CommandOutput {
                code: Some(0),
                stdout: self.stdout_for(&line),
                stderr: String::new(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_records_commands() {
        let runner = MockRunner::new();
        runner.run("ip", &args(&["link", "show"])).await.unwrap();
        runner.run("dhclient", &args(&["eth0"])).await.unwrap();
        assert_eq!(runner.command_lines(), vec!["ip link show", "dhclient eth0"]);

        runner.clear();
        assert!(runner.command_lines().is_empty());
    }

    #[tokio::test]
    async fn test_fail_times() {
        let runner = MockRunner::new().fail_times("up", "no such device", 1);

        let first = runner.run("ip", &args(&["link", "set", "up"])).await.unwrap();
        assert!(!first.success());
        assert_eq!(first.stderr, "no such device");

        let second = runner.run("ip", &args(&["link", "set", "up"])).await.unwrap();
        assert!(second.success());
    }

    #[tokio::test]
    async fn test_stdout_on() {
        let runner = MockRunner::new().stdout_on("ps", "root 1 cloud-init");
        let output = runner.run("ps", &args(&["-C", "cloud-init"])).await.unwrap();
        assert_eq!(output.stdout, "root 1 cloud-init");
        let output = runner.run("ip", &args(&["link"])).await.unwrap();
        assert!(output.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_fail_on_is_permanent() {
        let runner = MockRunner::new().fail_on("dhclient", "busy");
        for _ in 0..3 {
            let output = runner.run("dhclient", &args(&["eth0"])).await.unwrap();
            assert!(!output.success());
        }
    }
}
