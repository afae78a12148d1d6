//! Host process accounting over sysinfo.

use async_trait::async_trait;
use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::application::ports::ProcessInspector;

pub struct SysinfoProcessInspector;

#[async_trait]
impl ProcessInspector for SysinfoProcessInspector {
    async fn resident_memory(&self, pid: u32) -> Option<u64> {
        tokio::task::spawn_blocking(move || resident_memory_of(pid))
            .await
            .ok()
            .flatten()
    }
}

fn resident_memory_of(pid: u32) -> Option<u64> {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        false,
        ProcessRefreshKind::nothing().with_memory(),
    );
    system.process(pid).map(Process::memory)
}
