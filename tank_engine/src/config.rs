use std::{collections::BTreeMap, fs, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{compiler::Compiler, error::Result, pool::Pool, Limit};

/// Limits as written in configuration files: time in milliseconds, memory
/// in megabytes.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename = "limitConfig")]
pub struct LimitConfig {
    #[serde(rename = "timeLimit")]
    pub time_limit: u64,
    #[serde(rename = "memoryLimit")]
    pub memory_limit: u64,
    #[serde(rename = "processLimit", default)]
    pub process_limit: u32,
    #[serde(rename = "stderrLimit", default)]
    pub stderr_limit: u64,
}

impl From<&LimitConfig> for Limit {
    fn from(config: &LimitConfig) -> Self {
        Limit {
            active_process_limit: config.process_limit,
            time_limit_ms: config.time_limit,
            memory_limit_kb: config.memory_limit * 1024,
            stderr_output_limit: config.stderr_limit,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PoolConfig {
    pub environments: usize,
    pub threads: usize,
    #[serde(rename = "scratchRoot", default)]
    pub scratch_root: Option<PathBuf>,
    #[serde(rename = "checkoutTimeoutMs", default)]
    pub checkout_timeout_ms: Option<u64>,
}

impl PoolConfig {
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("tank"))
    }

    /// Builds a pool of process environments.
    pub fn build(&self) -> Result<Pool> {
        let pool = Pool::with_process_envs(self.environments, self.threads, self.scratch_root())?;
        Ok(pool.with_checkout_timeout(self.checkout_timeout_ms.map(Duration::from_millis)))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CompilerConfig {
    pub executable: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(rename = "sourceFile")]
    pub source_file: String,
    #[serde(rename = "targetFile")]
    pub target_file: String,
    #[serde(rename = "limitConfig")]
    pub limit_config: LimitConfig,
    #[serde(rename = "targetExecutable", default)]
    pub target_executable: Option<String>,
    #[serde(rename = "targetArgs", default)]
    pub target_args: Vec<String>,
}

impl CompilerConfig {
    pub fn build(&self) -> Compiler {
        Compiler::new(
            &self.executable,
            self.args.clone(),
            self.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            &self.source_file,
            &self.target_file,
            (&self.limit_config).into(),
        )
        .with_target(
            self.target_executable.as_ref().map(PathBuf::from),
            self.target_args.clone(),
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    pub pool: PoolConfig,
    pub compiler: CompilerConfig,
}

impl EngineConfig {
    pub fn from_string(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_string(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::path::Path;

    const ENGINE: &str = r#"
pool:
  environments: 2
  threads: 4
  checkoutTimeoutMs: 5000
compiler:
  executable: /usr/bin/g++
  args: ["-O2", "-o", "main", "main.cpp"]
  env:
    PATH: /usr/bin:/bin
  sourceFile: main.cpp
  targetFile: main
  limitConfig:
    timeLimit: 10000
    memoryLimit: 512
"#;

    #[test]
    fn parse_engine_config() -> Result<()> {
        let config = EngineConfig::from_string(ENGINE)?;
        assert_eq!(config.pool.environments, 2);
        assert_eq!(config.pool.checkout_timeout_ms, Some(5000));
        assert!(config.pool.scratch_root().ends_with("tank"));

        let compiler = config.compiler.build();
        assert_eq!(compiler.executable_path(), Path::new("/usr/bin/g++"));
        assert_eq!(compiler.args().len(), 4);
        assert_eq!(
            compiler.env_vars(),
            &[("PATH".to_string(), "/usr/bin:/bin".to_string())]
        );
        assert_eq!(compiler.limit().memory_limit_kb, 512 * 1024);
        assert_eq!(compiler.limit().stderr_output_limit, 0);
        Ok(())
    }

    #[test]
    fn limit_units() {
        let limit: Limit = (&LimitConfig {
            time_limit: 1000,
            memory_limit: 256,
            process_limit: 1,
            stderr_limit: 4096,
        })
            .into();
        assert_eq!(
            limit,
            Limit {
                active_process_limit: 1,
                time_limit_ms: 1000,
                memory_limit_kb: 256 * 1024,
                stderr_output_limit: 4096,
            }
        );
    }

    #[test]
    fn missing_field_is_config_error() {
        let err = EngineConfig::from_string("pool: {environments: 1}").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn build_pool_from_config() -> Result<()> {
        let root = tempfile::tempdir()?;
        let config = PoolConfig {
            environments: 3,
            threads: 2,
            scratch_root: Some(root.path().join("scratch")),
            checkout_timeout_ms: None,
        };
        let pool = config.build()?;
        assert_eq!(pool.capacity(), 3);
        assert!(pool.scratch_root().is_dir());
        Ok(())
    }
}
