use std::{
    io::{self, Read, Write},
    os::unix::process::CommandExt,
    path::Path,
    process::{Command, Stdio},
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::RecvTimeoutError;
use log::debug;

use super::{Environment, RunOutcome, RunRequest};
use crate::{
    error::{Error, Result},
    probe::ProcessProbe,
    Limit, Verdict,
};

/// Runs programs as child processes under rlimits, with a wall-clock
/// watchdog and `wait4` accounting. No seccomp or namespace isolation.
#[derive(Debug)]
pub struct ProcessEnvironment {
    id: usize,
}

impl ProcessEnvironment {
    pub fn new(id: usize) -> Result<Self> {
        if !Path::new("/proc/self").exists() {
            return Err(Error::Environment(
                "process accounting requires a mounted /proc".into(),
            ));
        }
        Ok(Self { id })
    }
}

impl Environment for ProcessEnvironment {
    fn run(&mut self, request: &RunRequest) -> Result<RunOutcome> {
        let limit = request.limit;
        let mut command = Command::new(&request.executable);
        command
            .args(&request.args)
            .current_dir(&request.working_dir)
            .env_clear()
            .envs(request.env_vars.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        unsafe {
            command.pre_exec(move || apply_limits(&limit));
        }

        let mut child = command.spawn().map_err(|e| {
            Error::SandboxFailure(format!(
                "failed to spawn {}: {}",
                request.executable.display(),
                e
            ))
        })?;
        let probe = ProcessProbe::new(child.id())?;
        let pid = probe.pid() as libc::pid_t;

        let stdin = child.stdin.take();
        let input = request.stdin.clone();
        let feeder = thread::spawn(move || {
            if let Some(mut pipe) = stdin {
                // the program may exit without reading its input
                let _ = pipe.write_all(&input);
            }
        });
        let stdout = child.stdout.take();
        let stdout_reader = thread::spawn(move || read_pipe(stdout, 0));
        let stderr = child.stderr.take();
        let stderr_cap = limit.stderr_output_limit;
        let stderr_reader = thread::spawn(move || read_pipe(stderr, stderr_cap));

        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
        let watchdog = wall_clock(&limit).map(|wall| {
            thread::spawn(move || match done_rx.recv_timeout(wall) {
                Err(RecvTimeoutError::Timeout) => {
                    kill_group(pid);
                    true
                }
                _ => false,
            })
        });

        let exited = probe.wait_exit();
        drop(done_tx);
        let timed_out = match watchdog {
            Some(handle) => handle.join().unwrap_or(false),
            None => false,
        };
        // the leader is not reaped yet, so the group id still belongs to it;
        // leftovers of the group would keep the pipes open
        kill_group(pid);
        exited?;
        let bio = probe.watching()?;

        let stdout = join_reader(stdout_reader)?;
        let stderr = join_reader(stderr_reader)?;
        let _ = feeder.join();

        let time_usage_ms = bio.get_time_usage();
        let memory_usage_kb = bio.get_peak_memory();
        let signal = bio.signal();
        let flag = classify(
            &limit,
            &Usage {
                timed_out,
                signal,
                exit_code: bio.exit_code(),
                time_usage_ms,
                memory_usage_kb,
            },
            &stderr,
        );

        debug!(
            "env #{} ran {}: {:?}, exit {}, {}ms, {}kb",
            self.id,
            request.executable.display(),
            flag,
            bio.exit_code(),
            time_usage_ms,
            memory_usage_kb
        );

        Ok(RunOutcome {
            flag,
            exit_code: bio.exit_code(),
            time_usage_ms,
            memory_usage_kb,
            runtime_error: signal.unwrap_or(0),
            stdout,
            stderr,
        })
    }
}

struct Usage {
    timed_out: bool,
    signal: Option<i32>,
    exit_code: i32,
    time_usage_ms: u64,
    memory_usage_kb: u64,
}

/// Time beats memory beats signals. A plain non-zero exit is not a violation.
fn classify(limit: &Limit, usage: &Usage, stderr: &[u8]) -> Verdict {
    let crashed = usage.signal.is_some() || usage.exit_code != 0;
    if usage.timed_out
        || usage.signal == Some(libc::SIGXCPU)
        || exceeds(usage.time_usage_ms, limit.time_limit_ms)
    {
        Verdict::TimeLimitExceeded
    } else if exceeds(usage.memory_usage_kb, limit.memory_limit_kb)
        || (limit.memory_limit_kb > 0 && crashed && contains(stderr, b"bad_alloc"))
    {
        // fix: struct like vector which does not allocate memory gradually
        // may touch the wall when memory is still below the limit
        Verdict::MemoryLimitExceeded
    } else if usage.signal.is_some() {
        Verdict::RuntimeError
    } else {
        Verdict::Accepted
    }
}

macro_rules! set_rlimit {
    ($resource:expr, $value:expr) => {{
        let value = $value as libc::rlim_t;
        let lim = libc::rlimit {
            rlim_cur: value,
            rlim_max: value,
        };
        if unsafe { libc::setrlimit($resource, &lim) } != 0 {
            return Err(io::Error::last_os_error());
        }
    }};
}

/// Runs in the forked child before exec.
fn apply_limits(limit: &Limit) -> io::Result<()> {
    if unsafe { libc::setpgid(0, 0) } != 0 {
        return Err(io::Error::last_os_error());
    }
    if limit.time_limit_ms > 0 {
        set_rlimit!(libc::RLIMIT_CPU, (limit.time_limit_ms + 1000) / 1000);
    }
    if limit.memory_limit_kb > 0 {
        // twice the limit, the peak is checked after the run
        set_rlimit!(libc::RLIMIT_AS, limit.memory_limit_kb << 10 << 1);
    }
    if limit.active_process_limit > 0 {
        set_rlimit!(libc::RLIMIT_NPROC, limit.active_process_limit);
    }
    Ok(())
}

fn wall_clock(limit: &Limit) -> Option<Duration> {
    if limit.time_limit_ms == 0 {
        None
    } else {
        Some(Duration::from_millis(limit.time_limit_ms * 2 + 1000))
    }
}

fn exceeds(used: u64, limit: u64) -> bool {
    limit > 0 && used > limit
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn kill_group(pid: libc::pid_t) {
    unsafe {
        libc::kill(-pid, libc::SIGKILL);
    }
}

fn read_pipe<R: Read>(pipe: Option<R>, cap: u64) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if cap == 0 {
            pipe.read_to_end(&mut buf)?;
        } else {
            (&mut pipe).take(cap).read_to_end(&mut buf)?;
            io::copy(&mut pipe, &mut io::sink())?;
        }
    }
    Ok(buf)
}

fn join_reader(handle: JoinHandle<io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
    handle
        .join()
        .map_err(|_| Error::SandboxFailure("pipe reader panicked".into()))?
        .map_err(Into::into)
}
