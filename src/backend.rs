use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::Mutex;

use crate::error::BackendError;
use crate::settings::AgentCommand;

/// A text-generation capability the retry controller can call.
///
/// Implementations make a single call per `generate` and never retry on their
/// own. The caller bounds each call with a timeout and may drop the future to
/// cancel it.
pub trait GenerationClient: Send + Sync {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, BackendError>> + Send;
}

// Deterministic backend that replays canned responses in order. Once the script
// runs out, the last response repeats.
#[derive(Debug)]
pub struct ScriptedBackend {
    responses: Vec<Result<String, BackendError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<Result<String, BackendError>>) -> Self {
        Self {
            responses,
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn always(response: impl Into<String>) -> Self {
        Self::new(vec![Ok(response.into())])
    }

    // Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

impl GenerationClient for ScriptedBackend {
    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().await.push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.responses
            .get(call)
            .or_else(|| self.responses.last())
            .cloned()
            .unwrap_or_else(|| Err(BackendError::Unavailable("no scripted responses".to_string())))
    }
}

/// Runs an external agent-execution binary and returns what it prints.
///
/// The prompt is passed as the final argument, e.g. `adk run . --prompt <prompt>`.
/// The child process is killed if the call is dropped before it exits.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl CommandBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            envs: Vec::new(),
        }
    }

    pub fn from_settings(agent: &AgentCommand) -> Self {
        let mut backend = Self::new(agent.program.clone()).args(agent.args.clone());
        if let Some(dir) = &agent.working_dir {
            backend = backend.working_dir(dir.clone());
        }
        backend
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl GenerationClient for CommandBackend {
    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(prompt)
            .envs(self.envs.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        log::debug!("Running agent command: {} {:?}", self.program, self.args);
        let output = command.output().await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => BackendError::Unavailable(format!(
                "'{}' command not found, ensure it is installed and in your PATH",
                self.program
            )),
            _ => BackendError::Unavailable(format!("Failed to start '{}': {}", self.program, e)),
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(BackendError::Unavailable(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        if !stderr.trim().is_empty() {
            log::debug!("Agent stderr: {}", stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
