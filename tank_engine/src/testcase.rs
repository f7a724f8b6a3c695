use std::{fs, sync::Arc};

use log::debug;

use crate::{
    compare::{CompareMode, Comparison},
    compiler::{CompileResult, Compiler},
    env::{Environment, RunRequest},
    error::{Error, Result},
    pool::Pool,
    vfs::{self, JudgeFs},
    JudgeResult, Limit, Verdict,
};

/// Produced output kept in a result, in bytes.
pub const USER_OUTPUT_LIMIT: usize = 4096;

/// Verifier source of a special-judge case, plus the name the candidate's
/// source is staged under next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpjSource {
    pub source_path: String,
    pub header_name: String,
}

#[derive(Clone)]
pub struct Testcase {
    data_fs: Arc<dyn JudgeFs>,
    input_path: String,
    output_path: String,
    limit: Limit,
    compare: CompareMode,
    spj: Option<SpjSource>,
}

impl Testcase {
    pub fn new(
        data_fs: Arc<dyn JudgeFs>,
        input_path: impl Into<String>,
        output_path: impl Into<String>,
        limit: Limit,
    ) -> Self {
        Self {
            data_fs,
            input_path: input_path.into(),
            output_path: output_path.into(),
            limit,
            compare: CompareMode::default(),
            spj: None,
        }
    }

    pub fn new_spj(
        data_fs: Arc<dyn JudgeFs>,
        input_path: impl Into<String>,
        output_path: impl Into<String>,
        spj_source_path: impl Into<String>,
        spj_header_name: impl Into<String>,
        limit: Limit,
    ) -> Self {
        let mut testcase = Self::new(data_fs, input_path, output_path, limit);
        testcase.spj = Some(SpjSource {
            source_path: spj_source_path.into(),
            header_name: spj_header_name.into(),
        });
        testcase
    }

    pub fn with_compare_mode(mut self, compare: CompareMode) -> Self {
        self.compare = compare;
        self
    }

    pub fn input_path(&self) -> &str {
        &self.input_path
    }

    pub fn output_path(&self) -> &str {
        &self.output_path
    }

    pub fn limit(&self) -> Limit {
        self.limit
    }

    pub fn spj(&self) -> Option<&SpjSource> {
        self.spj.as_ref()
    }

    /// Builds this case's verifier with the candidate source as its header.
    pub fn compile_spj(
        &self,
        pool: &Pool,
        compiler: &Compiler,
        source_fs: &dyn JudgeFs,
        source_path: &str,
    ) -> Result<Arc<CompileResult>> {
        let spj = self.spj.as_ref().ok_or_else(|| {
            Error::Argument(format!("case `{}` has no special judge", self.input_path))
        })?;
        compiler.compile_spj(
            pool,
            source_fs,
            source_path,
            &spj.header_name,
            self.data_fs.as_ref(),
            &spj.source_path,
        )
    }

    /// Runs the built artifact once on this case's input and judges what it
    /// printed.
    pub fn run(&self, env: &mut dyn Environment, compiled: &CompileResult) -> Result<JudgeResult> {
        let input = vfs::load(self.data_fs.as_ref(), &self.input_path)?;
        let answer = vfs::load(self.data_fs.as_ref(), &self.output_path)?;

        let run_dir = tempfile::Builder::new()
            .prefix("run-")
            .tempdir_in(compiled.dir())?;
        if self.spj.is_some() {
            fs::write(run_dir.path().join("input"), &input)?;
            fs::write(run_dir.path().join("answer"), &answer)?;
        }

        let launch = compiled.launch();
        let mut request = RunRequest::new(&launch.executable, run_dir.path(), self.limit);
        request.args = launch.args.clone();
        request.stdin = input;
        let outcome = env.run(&request)?;

        let mut result = JudgeResult {
            flag: outcome.flag,
            time_usage_ms: outcome.time_usage_ms,
            memory_usage_kb: outcome.memory_usage_kb,
            runtime_error: outcome.runtime_error,
            judge_output: String::from_utf8_lossy(&outcome.stderr).into_owned(),
            user_output: Some(truncate_output(&outcome.stdout)),
        };

        if result.flag == Verdict::Accepted && outcome.exit_code != 0 {
            result.flag = Verdict::RuntimeError;
            result.runtime_error = outcome.exit_code;
        }
        if result.flag == Verdict::Accepted {
            let comparison = self.compare.compare(&answer, &outcome.stdout);
            if comparison == Comparison::PatternDifferent && result.judge_output.is_empty() {
                result.judge_output = "output differs only in layout".to_string();
            }
            result.flag = comparison.into();
        }

        debug!(
            "case `{}`: {} in {}ms, {}kb",
            self.input_path, result.flag, result.time_usage_ms, result.memory_usage_kb
        );
        Ok(result)
    }
}

/// At most `USER_OUTPUT_LIMIT` bytes of text, cut on a character boundary.
fn truncate_output(output: &[u8]) -> String {
    let mut end = output.len().min(USER_OUTPUT_LIMIT);
    if let Err(e) = std::str::from_utf8(&output[..end]) {
        // a character split by the cut is dropped whole
        if e.error_len().is_none() {
            end = e.valid_up_to();
        }
    }
    let text = String::from_utf8_lossy(&output[..end]);
    let mut cut = text.len().min(USER_OUTPUT_LIMIT);
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text[..cut].to_owned()
}
