//! Advisory "is the application running" check.

use sysinfo::System;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0} appears to be running; close it and try again")]
pub struct RunningConflict(pub String);

/// Point-in-time scan of the process table for the given name.
///
/// Advisory only, not a lock: a matching process can start right after this
/// returns false. The current process is excluded so the manager binary
/// never trips over its own name.
pub fn is_running(name: &str) -> bool {
    let current = sysinfo::get_current_pid().ok();
    let sys = System::new_all();
    sys.processes_by_name(name)
        .any(|process| Some(process.pid()) != current)
}
