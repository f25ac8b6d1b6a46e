//! Process-wide identity cache: hostname, PID, and
//! process name, captured once and immutable for the rest of the process
//! lifetime. This is the only process-wide state the engine keeps — no
//! singleton logger instance is mandated anywhere else.

use once_cell::sync::Lazy;

pub struct ProcessInfo {
    pub hostname: String,
    pub pid: u32,
    pub process_name: String,
}

static PROCESS_INFO: Lazy<ProcessInfo> = Lazy::new(|| ProcessInfo {
    hostname: resolve_hostname(),
    pid: std::process::id(),
    process_name: resolve_process_name(),
});

pub fn get() -> &'static ProcessInfo {
    &PROCESS_INFO
}

fn resolve_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::process::Command::new("hostname")
                .output()
                .ok()
                .and_then(|o| String::from_utf8(o.stdout).ok())
                .map(|s| s.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string())
}

fn resolve_process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_stable_across_calls() {
        let a = get();
        let b = get();
        assert_eq!(a.pid, b.pid);
        assert_eq!(a.hostname, b.hostname);
        assert_eq!(a.process_name, b.process_name);
    }

    #[test]
    fn hostname_never_empty() {
        assert!(!get().hostname.is_empty());
    }
}
