use async_trait::async_trait;
use log::{ debug, info };
use std::process::{ ExitStatus, Stdio };
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::cli::ServeArgs;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("program wrote diagnostics: {0}")]
    Diagnostics(String),

    #[error("program did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("program exited with {0}")]
    Failed(ExitStatus),

    #[error("failed to collect program output: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Failures the program itself is responsible for, as opposed to the
    /// bridge not being able to make sense of what happened.
    pub fn is_processing_failure(&self) -> bool {
        matches!(
            self,
            RunnerError::Spawn { .. } | RunnerError::Diagnostics(_) | RunnerError::TimedOut(_)
        )
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, message: &str) -> Result<String, RunnerError>;
}

/// Runs the external program once per message, passing the message as the
/// last argv element. No shell is involved.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn from_args(args: &ServeArgs) -> Self {
        let runner = Self::new(args.program.clone(), args.program_args.clone());
        match args.program_timeout_secs {
            0 => runner,
            secs => runner.with_timeout(Duration::from_secs(secs)),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl TextGenerator for ProcessRunner {
    async fn generate(&self, message: &str) -> Result<String, RunnerError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(message)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        debug!("Spawned '{}' (pid {:?})", self.program, child.id());

        // Dropping the wait future drops the child, which kills it.
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| RunnerError::TimedOut(limit))??,
            None => child.wait_with_output().await?,
        };

        if !output.stderr.is_empty() {
            return Err(
                RunnerError::Diagnostics(String::from_utf8_lossy(&output.stderr).into_owned())
            );
        }
        if !output.status.success() {
            return Err(RunnerError::Failed(output.status));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        info!("'{}' produced {} bytes of output", self.program, output.stdout.len());
        Ok(stdout.trim().to_string())
    }
}

pub fn new_generator(args: &ServeArgs) -> Arc<dyn TextGenerator> {
    let runner = ProcessRunner::from_args(args);
    info!(
        "Text generator configured: Program={}, Args={:?}, Timeout={:?}",
        runner.program(),
        runner.args(),
        runner.timeout
    );
    Arc::new(runner)
}
