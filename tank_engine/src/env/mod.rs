mod process;

use std::path::PathBuf;

use crate::{error::Result, vfs::Blob, Limit, Verdict};

pub use self::process::ProcessEnvironment;

/// One invocation inside an environment.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub env_vars: Vec<(String, String)>,
    pub working_dir: PathBuf,
    pub stdin: Blob,
    pub limit: Limit,
}

impl RunRequest {
    pub fn new(
        executable: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
        limit: Limit,
    ) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            env_vars: Vec::new(),
            working_dir: working_dir.into(),
            stdin: Vec::new().into(),
            limit,
        }
    }
}

/// What an environment reports back. `flag` is `Accepted` unless the
/// invocation broke a limit (`TimeLimitExceeded`, `MemoryLimitExceeded`) or
/// was killed by a signal (`RuntimeError`, signal in `runtime_error`). A
/// non-zero exit code alone leaves `flag` at `Accepted`.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub flag: Verdict,
    pub exit_code: i32,
    pub time_usage_ms: u64,
    pub memory_usage_kb: u64,
    pub runtime_error: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// An isolated, resource-limited context that runs one program at a time.
pub trait Environment: Send {
    fn run(&mut self, request: &RunRequest) -> Result<RunOutcome>;
}
