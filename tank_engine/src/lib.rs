pub mod compare;
pub mod compiler;
pub mod config;
pub mod env;
pub mod error;
pub mod pool;
pub mod probe;
pub mod problem;
pub mod testcase;
pub mod vfs;

use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

pub use crate::{
    compiler::{CompileResult, Compiler},
    pool::Pool,
    test::{Phase, StepResult, Test},
    testcase::Testcase,
};

/// Resource ceiling of one invocation. Zero in a field means no limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    pub active_process_limit: u32,
    pub time_limit_ms: u64,
    pub memory_limit_kb: u64,
    /// Bytes of stderr kept from the invocation.
    pub stderr_output_limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    RuntimeError,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    CompileError,
}

impl Verdict {
    /// Position in the severity order. Aggregation keeps the verdict with
    /// the highest severity.
    pub fn severity(self) -> u8 {
        match self {
            Verdict::Accepted => 0,
            Verdict::WrongAnswer => 1,
            Verdict::RuntimeError => 2,
            Verdict::TimeLimitExceeded => 3,
            Verdict::MemoryLimitExceeded => 4,
            Verdict::CompileError => 5,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Verdict::Accepted => "AC",
            Verdict::WrongAnswer => "WA",
            Verdict::RuntimeError => "RE",
            Verdict::TimeLimitExceeded => "TLE",
            Verdict::MemoryLimitExceeded => "MLE",
            Verdict::CompileError => "CE",
        }
    }

    pub fn worst(self, other: Verdict) -> Verdict {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl Default for Verdict {
    fn default() -> Self {
        Verdict::Accepted
    }
}

impl Ord for Verdict {
    fn cmp(&self, other: &Self) -> Ordering {
        self.severity().cmp(&other.severity())
    }
}

impl PartialOrd for Verdict {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of one compile step or one testcase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JudgeResult {
    pub flag: Verdict,
    pub time_usage_ms: u64,
    pub memory_usage_kb: u64,
    pub runtime_error: i32,
    pub judge_output: String,
    pub user_output: Option<String>,
}

impl JudgeResult {
    pub fn with_flag(flag: Verdict) -> Self {
        Self {
            flag,
            ..Default::default()
        }
    }

    /// Folds a retired testcase result into a running summary: worst flag,
    /// summed time, peak memory.
    pub fn absorb(&mut self, other: &JudgeResult) {
        self.flag = self.flag.worst(other.flag);
        self.time_usage_ms += other.time_usage_ms;
        self.memory_usage_kb = self.memory_usage_kb.max(other.memory_usage_kb);
    }
}
