use crate::config::Settings;
use crate::domain::test_result::{TestStatus, TestType};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("test run timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Output of one out-of-process test run.
#[derive(Debug, Clone)]
pub struct TestRun {
    pub test_type: TestType,
    pub output: String,
    pub return_code: i32,
}

impl TestRun {
    pub fn status(&self) -> Option<TestStatus> {
        classify_output(&self.output)
    }
}

/// Launches the external test program for a suite. Argument templates may contain `{suite}`
/// and `{base_url}` placeholders.
#[derive(Debug, Clone)]
pub struct TestRunner {
    program: String,
    args_template: Vec<String>,
    base_url: String,
    timeout: Duration,
}

impl TestRunner {
    pub fn new(
        program: impl Into<String>,
        args_template: Vec<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args_template,
            base_url: base_url.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.test_runner_program.clone(),
            settings.test_runner_args.clone(),
            settings.probe_base_url.clone(),
            settings.test_runner_timeout,
        )
    }

    fn args_for(&self, test_type: TestType) -> Vec<String> {
        self.args_template
            .iter()
            .map(|arg| {
                arg.replace("{suite}", test_type.as_str())
                    .replace("{base_url}", &self.base_url)
            })
            .collect()
    }

    /// Runs the suite to completion or until the timeout; a timed-out child is killed and
    /// never retried.
    pub async fn run(&self, test_type: TestType) -> Result<TestRun, HarnessError> {
        let args = self.args_for(test_type);
        let start = Instant::now();

        tracing::info!(program = %self.program, ?args, %test_type, "launching test run");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HarnessError::Launch {
                program: self.program.clone(),
                source,
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| HarnessError::Launch {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                tracing::warn!(%test_type, timeout_secs = self.timeout.as_secs(), "test run timed out");
                return Err(HarnessError::Timeout(self.timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let return_code = output.status.code().unwrap_or(-1);

        tracing::info!(
            %test_type,
            return_code,
            elapsed_ms = start.elapsed().as_millis(),
            "test run finished"
        );

        Ok(TestRun {
            test_type,
            output: format!("{stdout}\n{stderr}"),
            return_code,
        })
    }
}

/// Reads the verdict marker from captured output. Output carrying both markers, or neither,
/// is ambiguous and yields `None`.
pub fn classify_output(output: &str) -> Option<TestStatus> {
    match (output.contains("PASSED"), output.contains("FAILED")) {
        (true, false) => Some(TestStatus::Passed),
        (false, true) => Some(TestStatus::Failed),
        _ => None,
    }
}
