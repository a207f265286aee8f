//! Best-effort process introspection.
//!
//! Used to answer "what is running in the terminal right now" and "where is
//! it". Every lookup returns `None` on failure rather than an error; callers
//! treat the answer as a hint.

use std::collections::HashMap;
use std::path::PathBuf;

use nix::sys::signal::kill;
use nix::unistd::Pid;

/// A process found in the session's tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

/// One row of the process table.
#[derive(Debug, Clone)]
struct ProcEntry {
    pid: u32,
    ppid: u32,
    name: String,
}

/// Whether `pid` still refers to a live process.
pub fn is_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    kill(Pid::from_raw(raw), None).is_ok()
}

/// The deepest live descendant of `root`, or `root` itself.
pub fn foreground_process(root: u32) -> Option<ProcessInfo> {
    if !is_alive(root) {
        return None;
    }
    let table = process_table()?;
    let by_pid: HashMap<u32, &ProcEntry> = table.iter().map(|e| (e.pid, e)).collect();
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for entry in &table {
        children.entry(entry.ppid).or_default().push(entry.pid);
    }

    let pid = deepest_descendant(root, |pid| {
        children
            .get(&pid)
            .map(|kids| kids.iter().copied().filter(|&k| is_alive(k)).collect())
            .unwrap_or_default()
    });
    let name = by_pid.get(&pid)?.name.clone();
    Some(ProcessInfo { pid, name })
}

/// Follow the newest child at each level until a leaf is reached.
///
/// When a process has several children the highest pid wins, which is
/// usually the most recently started one.
pub fn deepest_descendant<F>(root: u32, mut children_of: F) -> u32
where
    F: FnMut(u32) -> Vec<u32>,
{
    let mut current = root;
    // A pid cycle should not exist, but the table is read non-atomically.
    for _ in 0..64 {
        match children_of(current).into_iter().max() {
            Some(child) if child != current => current = child,
            _ => break,
        }
    }
    current
}

/// Working directory of `pid`.
pub fn process_cwd(pid: u32) -> Option<PathBuf> {
    platform::cwd(pid)
}

fn process_table() -> Option<Vec<ProcEntry>> {
    platform::table()
}

#[cfg(target_os = "linux")]
mod platform {
    use super::ProcEntry;
    use std::fs;
    use std::path::PathBuf;

    pub fn table() -> Option<Vec<ProcEntry>> {
        let entries = fs::read_dir("/proc").ok()?;
        let table = entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
            .filter_map(|pid| {
                let stat = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
                parse_stat(pid, &stat)
            })
            .collect();
        Some(table)
    }

    /// Parse `/proc/<pid>/stat`; the name is in parentheses and may itself
    /// contain spaces or parentheses, so fields are counted after the last `)`.
    pub fn parse_stat(pid: u32, stat: &str) -> Option<ProcEntry> {
        let open = stat.find('(')?;
        let close = stat.rfind(')')?;
        let name = stat.get(open + 1..close)?.to_string();
        let mut fields = stat.get(close + 1..)?.split_whitespace();
        let _state = fields.next()?;
        let ppid = fields.next()?.parse().ok()?;
        Some(ProcEntry { pid, ppid, name })
    }

    pub fn cwd(pid: u32) -> Option<PathBuf> {
        fs::read_link(format!("/proc/{pid}/cwd")).ok()
    }
}

#[cfg(not(target_os = "linux"))]
mod platform {
    use super::ProcEntry;
    use std::path::PathBuf;
    use std::process::Command;

    pub fn table() -> Option<Vec<ProcEntry>> {
        let output = Command::new("ps")
            .args(["-A", "-o", "pid=,ppid=,comm="])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Some(
            text.lines()
                .filter_map(|line| {
                    let mut parts = line.split_whitespace();
                    let pid = parts.next()?.parse().ok()?;
                    let ppid = parts.next()?.parse().ok()?;
                    let name = parts.collect::<Vec<_>>().join(" ");
                    let name = name.rsplit('/').next().unwrap_or(&name).to_string();
                    Some(ProcEntry { pid, ppid, name })
                })
                .collect(),
        )
    }

    pub fn cwd(pid: u32) -> Option<PathBuf> {
        let output = Command::new("lsof")
            .args(["-a", "-d", "cwd", "-p", &pid.to_string(), "-Fn"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .find_map(|line| line.strip_prefix('n'))
            .map(PathBuf::from)
    }
}
