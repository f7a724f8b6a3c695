#![allow(dead_code)]

use std::{
    ffi::OsStr,
    fs,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use rand::Rng;
use tank_engine::{
    env::{Environment, RunOutcome, RunRequest},
    error::{Error, Result},
    pool::Pool,
    vfs::RamFs,
    Compiler, Limit, Verdict,
};
use tempfile::TempDir;

pub const FAKE_CC: &str = "fake-cc";
pub const BUILD_TIME_MS: u64 = 5;

/// Pretends to be both a compiler and the programs it builds.
///
/// Invoked as `fake-cc` it "compiles" `main.cpp` into `main` by copying it:
/// a source containing `#error` exits with 1, `#hang` breaks the time limit,
/// and every `#include "x"` must name a file staged next to the source.
///
/// Invoked as anything else it runs a built artifact, scripted by
/// whitespace-separated tokens on stdin: `time=`, `mem=`, `out=`, `exit=`,
/// `verdict=`, `delay=`, `needs=` (a file in the run directory), `panic`
/// and `fail`.
pub struct ScriptedEnvironment;

impl Environment for ScriptedEnvironment {
    fn run(&mut self, request: &RunRequest) -> Result<RunOutcome> {
        if request.executable.file_name() == Some(OsStr::new(FAKE_CC)) {
            build(request)
        } else {
            execute(request)
        }
    }
}

fn build(request: &RunRequest) -> Result<RunOutcome> {
    let dir = &request.working_dir;
    let source = fs::read_to_string(dir.join("main.cpp"))?;
    let mut outcome = RunOutcome {
        time_usage_ms: BUILD_TIME_MS,
        memory_usage_kb: 1000,
        ..Default::default()
    };
    if source.contains("#hang") {
        outcome.flag = Verdict::TimeLimitExceeded;
        return Ok(outcome);
    }
    if source.contains("#error") {
        outcome.exit_code = 1;
        outcome.stderr = b"main.cpp:1:1: error: expected ';'".to_vec();
        return Ok(outcome);
    }
    for line in source.lines() {
        if let Some(rest) = line.strip_prefix("#include \"") {
            let header = rest.trim_end_matches('"');
            if !dir.join(header).exists() {
                outcome.exit_code = 1;
                outcome.stderr = format!("fatal error: {}: No such file", header).into_bytes();
                return Ok(outcome);
            }
        }
    }
    fs::write(dir.join("main"), &source)?;
    outcome.stdout = b"ok\n".to_vec();
    Ok(outcome)
}

fn execute(request: &RunRequest) -> Result<RunOutcome> {
    if !request.executable.exists() {
        return Err(Error::SandboxFailure(format!(
            "{} does not exist",
            request.executable.display()
        )));
    }
    let script = String::from_utf8_lossy(&request.stdin).into_owned();
    let mut outcome = RunOutcome::default();
    let mut delay = 0;
    for token in script.split_whitespace() {
        let (key, value) = match token.find('=') {
            Some(at) => (&token[..at], &token[at + 1..]),
            None => (token, ""),
        };
        match key {
            "time" => outcome.time_usage_ms = value.parse().unwrap_or(0),
            "mem" => outcome.memory_usage_kb = value.parse().unwrap_or(0),
            "out" => outcome.stdout = format!("{}\n", value).into_bytes(),
            "exit" => outcome.exit_code = value.parse().unwrap_or(0),
            "delay" => delay = value.parse().unwrap_or(0),
            "needs" => {
                if !request.working_dir.join(value).exists() {
                    outcome.exit_code = 2;
                }
            }
            "verdict" => {
                outcome.flag = match value {
                    "TLE" => Verdict::TimeLimitExceeded,
                    "MLE" => Verdict::MemoryLimitExceeded,
                    "RE" => {
                        outcome.runtime_error = 11;
                        Verdict::RuntimeError
                    }
                    _ => Verdict::Accepted,
                }
            }
            "panic" => panic!("scripted panic"),
            "fail" => return Err(Error::SandboxFailure("scripted failure".into())),
            _ => {}
        }
    }
    let jitter = rand::thread_rng().gen_range(0..3);
    thread::sleep(Duration::from_millis(delay + jitter));
    Ok(outcome)
}

pub fn pool(envs: usize, threads: usize) -> (Arc<Pool>, TempDir) {
    let root = tempfile::tempdir().unwrap();
    let pool = Pool::new(threads, root.path()).unwrap();
    for _ in 0..envs {
        pool.add_env(Box::new(ScriptedEnvironment));
    }
    (Arc::new(pool), root)
}

pub fn compiler() -> Arc<Compiler> {
    Arc::new(Compiler::new(
        FAKE_CC,
        Vec::new(),
        Vec::new(),
        "main.cpp",
        "main",
        Limit::default(),
    ))
}

pub fn source(text: &str) -> Arc<RamFs> {
    let store = RamFs::new();
    store.set("source", text);
    Arc::new(store)
}

/// Waits until `checkins` environments have come back and the shelf is full.
pub fn wait_checkins(pool: &Pool, checkins: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let stats = pool.stats();
        if stats.checkins >= checkins && stats.idle == stats.capacity {
            return;
        }
        assert!(Instant::now() < deadline, "environments were not returned: {:?}", stats);
        thread::sleep(Duration::from_millis(5));
    }
}
