//! Isolate meta file parser
//!
//! Parses the meta file written by isolate to extract raw execution results.
//! No verdict interpretation happens here.

/// Raw execution status from isolate
#[derive(Debug, Clone, PartialEq)]
pub enum IsolateStatus {
    /// Program exited normally
    Ok,
    /// Wall-clock or CPU time limit exceeded
    TimeOut,
    /// Killed by signal (crash)
    Signal(i32),
    /// Runtime error (non-zero exit)
    RuntimeError,
    /// Internal error in isolate itself
    InternalError,
}

/// Parsed isolate meta file contents
#[derive(Debug, Clone)]
pub struct IsolateMeta {
    /// CPU time used in milliseconds
    pub time_ms: u32,
    /// Wall clock time in milliseconds
    pub wall_time_ms: u32,
    /// Memory used in KB (cg-mem)
    pub memory_kb: u32,
    /// Exit code of the process
    pub exit_code: i32,
    /// Whether the cgroup OOM killer fired
    pub oom_killed: bool,
    /// Isolate status
    pub status: IsolateStatus,
}

impl Default for IsolateMeta {
    fn default() -> Self {
        Self {
            time_ms: 0,
            wall_time_ms: 0,
            memory_kb: 0,
            exit_code: 0,
            oom_killed: false,
            status: IsolateStatus::Ok,
        }
    }
}

/// Parse isolate meta file content
pub fn parse_meta(content: &str) -> IsolateMeta {
    let mut meta = IsolateMeta::default();
    let mut status_str = String::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.splitn(2, ':').collect();
        if parts.len() != 2 {
            continue;
        }

        let key = parts[0].trim();
        let value = parts[1].trim();

        match key {
            "time" => {
                if let Ok(t) = value.parse::<f64>() {
                    meta.time_ms = (t * 1000.0) as u32;
                }
            }
            "time-wall" => {
                if let Ok(t) = value.parse::<f64>() {
                    meta.wall_time_ms = (t * 1000.0) as u32;
                }
            }
            "cg-mem" | "max-rss" => {
                // cg-mem with cgroups, max-rss without (both in KB)
                if let Ok(m) = value.parse::<u32>() {
                    if m > meta.memory_kb {
                        meta.memory_kb = m;
                    }
                }
            }
            "cg-oom-killed" => {
                meta.oom_killed = value == "1";
            }
            "status" => {
                status_str = value.to_string();
            }
            "exitcode" => {
                meta.exit_code = value.parse().unwrap_or(0);
            }
            "exitsig" => {
                if let Ok(sig) = value.parse::<i32>() {
                    meta.status = IsolateStatus::Signal(sig);
                }
            }
            _ => {}
        }
    }

    // The status string wins only when no signal was recorded
    if meta.status == IsolateStatus::Ok {
        meta.status = match status_str.as_str() {
            "TO" => IsolateStatus::TimeOut,
            "SG" => IsolateStatus::Signal(0),
            "RE" => IsolateStatus::RuntimeError,
            "XX" => IsolateStatus::InternalError,
            "" if meta.exit_code == 0 => IsolateStatus::Ok,
            _ => IsolateStatus::RuntimeError,
        };
    }

    meta
}
