use std::{
    fmt,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use log::{debug, info};
use tempfile::TempDir;

use crate::{
    env::RunRequest,
    error::{Error, Result},
    pool::Pool,
    vfs::{self, JudgeFs},
    JudgeResult, Limit, Verdict,
};

/// Placeholder in target arguments replaced by the artifact path.
pub const TARGET_PLACEHOLDER: &str = "{target}";

#[derive(Debug)]
pub enum CompilerEnvironmentStatus {
    OK { path: String },
    Missing,
}

/// A build toolchain: how to turn one staged source file into an artifact
/// and how to launch that artifact afterwards.
#[derive(Debug, Clone)]
pub struct Compiler {
    executable_path: PathBuf,
    args: Vec<String>,
    env_vars: Vec<(String, String)>,
    source_filename: String,
    target_filename: String,
    limit: Limit,
    target_executable_path: Option<PathBuf>,
    target_args: Vec<String>,
}

impl Compiler {
    pub fn new(
        executable_path: impl Into<PathBuf>,
        args: Vec<String>,
        env_vars: Vec<(String, String)>,
        source_filename: impl Into<String>,
        target_filename: impl Into<String>,
        limit: Limit,
    ) -> Self {
        Self {
            executable_path: executable_path.into(),
            args,
            env_vars,
            source_filename: source_filename.into(),
            target_filename: target_filename.into(),
            limit,
            target_executable_path: None,
            target_args: Vec::new(),
        }
    }

    /// Launch artifacts through `executable` (an interpreter, a VM) instead
    /// of executing them directly.
    pub fn with_target(mut self, executable: Option<PathBuf>, args: Vec<String>) -> Self {
        self.target_executable_path = executable;
        self.target_args = args;
        self
    }

    pub fn executable_path(&self) -> &Path {
        &self.executable_path
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env_vars(&self) -> &[(String, String)] {
        &self.env_vars
    }

    pub fn source_filename(&self) -> &str {
        &self.source_filename
    }

    pub fn target_filename(&self) -> &str {
        &self.target_filename
    }

    pub fn limit(&self) -> Limit {
        self.limit
    }

    pub fn check_environment(&self) -> CompilerEnvironmentStatus {
        match which::which(&self.executable_path) {
            Ok(path) => CompilerEnvironmentStatus::OK {
                path: path.to_string_lossy().to_string(),
            },
            Err(_) => CompilerEnvironmentStatus::Missing,
        }
    }

    pub fn compile_normal(
        &self,
        pool: &Pool,
        source_fs: &dyn JudgeFs,
        source_path: &str,
    ) -> Result<Arc<CompileResult>> {
        let dir = pool.scratch_dir()?;
        vfs::extract(source_fs, source_path, &dir.path().join(&self.source_filename))?;
        self.build(pool, dir)
    }

    /// Stages the header from `header_fs` as `header_name` next to the
    /// verifier source from `spj_fs`, then builds the verifier.
    pub fn compile_spj(
        &self,
        pool: &Pool,
        header_fs: &dyn JudgeFs,
        header_path: &str,
        header_name: &str,
        spj_fs: &dyn JudgeFs,
        spj_source_path: &str,
    ) -> Result<Arc<CompileResult>> {
        self.check_header_name(header_name)?;
        let dir = pool.scratch_dir()?;
        vfs::extract(header_fs, header_path, &dir.path().join(header_name))?;
        vfs::extract(spj_fs, spj_source_path, &dir.path().join(&self.source_filename))?;
        self.build(pool, dir)
    }

    /// The header must be a plain file name beside the verifier source.
    fn check_header_name(&self, header_name: &str) -> Result<()> {
        let mut components = Path::new(header_name).components();
        let single = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single || header_name == self.source_filename {
            return Err(Error::Argument(format!(
                "`{}` is not a usable header name",
                header_name
            )));
        }
        Ok(())
    }

    fn build(&self, pool: &Pool, dir: TempDir) -> Result<Arc<CompileResult>> {
        let mut request = RunRequest::new(&self.executable_path, dir.path(), self.limit);
        request.args = self.args.clone();
        request.env_vars = self.env_vars.clone();

        let outcome = {
            let mut env = pool.take_one()?;
            env.run(&request)?
        };

        let mut std_output = String::from_utf8_lossy(&outcome.stdout).into_owned();
        std_output.push_str(&String::from_utf8_lossy(&outcome.stderr));

        let artifact = dir.path().join(&self.target_filename);
        let launch = self.launch_command(&artifact);
        info!(
            "built {} in {}ms: {:?}, exit code {}",
            self.source_filename, outcome.time_usage_ms, outcome.flag, outcome.exit_code
        );
        debug!("build output: {}", std_output);

        Ok(Arc::new(CompileResult {
            flag: outcome.flag,
            exit_code: outcome.exit_code,
            time_usage_ms: outcome.time_usage_ms,
            memory_usage_kb: outcome.memory_usage_kb,
            runtime_error: outcome.runtime_error,
            std_output,
            artifact,
            launch,
            dir,
        }))
    }

    fn launch_command(&self, artifact: &Path) -> Launch {
        let target = artifact.to_string_lossy();
        let args = self
            .target_args
            .iter()
            .map(|arg| arg.replace(TARGET_PLACEHOLDER, &target))
            .collect();
        Launch {
            executable: self
                .target_executable_path
                .clone()
                .unwrap_or_else(|| artifact.to_path_buf()),
            args,
        }
    }
}

/// Program and arguments that start a built artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub executable: PathBuf,
    pub args: Vec<String>,
}

/// Outcome of one build. Owns the directory the build ran in; the directory
/// is removed when the last reference to the result goes away.
pub struct CompileResult {
    pub flag: Verdict,
    pub exit_code: i32,
    pub time_usage_ms: u64,
    pub memory_usage_kb: u64,
    pub runtime_error: i32,
    pub std_output: String,
    pub artifact: PathBuf,
    launch: Launch,
    dir: TempDir,
}

impl CompileResult {
    /// True when the builder kept within its limits and exited with 0.
    pub fn succeeded(&self) -> bool {
        self.flag == Verdict::Accepted && self.exit_code == 0
    }

    /// The verdict a caller sees: the builder's own violation if any,
    /// otherwise `CompileError` for a non-zero exit code.
    pub fn verdict(&self) -> Verdict {
        match self.flag {
            Verdict::Accepted if self.exit_code != 0 => Verdict::CompileError,
            flag => flag,
        }
    }

    pub fn to_judge_result(&self) -> JudgeResult {
        JudgeResult {
            flag: self.verdict(),
            time_usage_ms: self.time_usage_ms,
            memory_usage_kb: self.memory_usage_kb,
            runtime_error: self.runtime_error,
            judge_output: self.std_output.clone(),
            user_output: None,
        }
    }

    pub fn launch(&self) -> &Launch {
        &self.launch
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

impl fmt::Debug for CompileResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileResult")
            .field("flag", &self.flag)
            .field("exit_code", &self.exit_code)
            .field("time_usage_ms", &self.time_usage_ms)
            .field("memory_usage_kb", &self.memory_usage_kb)
            .field("artifact", &self.artifact)
            .finish()
    }
}
