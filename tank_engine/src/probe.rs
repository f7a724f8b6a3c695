use std::{io, path::Path};

use crate::error::{Error, Result};

/// Waits on a spawned child and collects its resource usage.
pub struct ProcessProbe {
    pid: u32,
}

impl ProcessProbe {
    pub fn new(pid: u32) -> Result<Self> {
        let proc_path = format!("/proc/{}", pid);
        if !Path::new(&proc_path).exists() {
            return Err(Error::SandboxFailure(format!(
                "process {} does not exist",
                pid
            )));
        }
        Ok(Self { pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Blocks until the process has exited without reaping it, so its pid
    /// and process group stay reserved.
    pub fn wait_exit(&self) -> Result<()> {
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        loop {
            let ret = unsafe {
                libc::waitid(
                    libc::P_PID,
                    self.pid as libc::id_t,
                    &mut info,
                    libc::WEXITED | libc::WNOWAIT,
                )
            };
            if ret == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(Error::SandboxFailure(format!(
                    "waitid on process {} failed: {}",
                    self.pid, err
                )));
            }
        }
    }

    /// Wait the process to stop and get whole usage status
    pub fn watching(&self) -> Result<ProcessBio> {
        let mut status: libc::c_int = 0;
        let mut ru: libc::rusage = unsafe { std::mem::zeroed() };
        loop {
            let ret = unsafe { libc::wait4(self.pid as libc::pid_t, &mut status, 0, &mut ru) };
            if ret >= 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(Error::SandboxFailure(format!(
                    "wait4 on process {} failed: {}",
                    self.pid, err
                )));
            }
        }
        Ok(ProcessBio {
            status,
            utime: (ru.ru_utime.tv_sec * 1000 + ru.ru_utime.tv_usec / 1000) as u64,
            stime: (ru.ru_stime.tv_sec * 1000 + ru.ru_stime.tv_usec / 1000) as u64,
            maxrss: ru.ru_maxrss as u64,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessBio {
    status: i32,
    utime: u64,
    stime: u64,
    maxrss: u64,
}

impl ProcessBio {
    /// Get time usage(ms).
    pub fn get_time_usage(&self) -> u64 {
        self.utime + self.stime
    }

    /// Peak resident set size in KB.
    pub fn get_peak_memory(&self) -> u64 {
        self.maxrss
    }

    /// Exit status, or `128 + signal` when the process was killed.
    pub fn exit_code(&self) -> i32 {
        if libc::WIFEXITED(self.status) {
            libc::WEXITSTATUS(self.status)
        } else if libc::WIFSIGNALED(self.status) {
            128 + libc::WTERMSIG(self.status)
        } else {
            0
        }
    }

    pub fn signal(&self) -> Option<i32> {
        if libc::WIFSIGNALED(self.status) {
            Some(libc::WTERMSIG(self.status))
        } else {
            None
        }
    }
}
