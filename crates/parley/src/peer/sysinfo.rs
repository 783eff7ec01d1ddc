use async_trait::async_trait;
use serde_json::{json, Value};
use sysinfo::{Disks, System};

use super::{PeerError, ToolPeer};
use crate::models::tool::ToolDescriptor;

/// An in-process peer exposing host diagnostics, so the shell works without
/// an external tool server.
pub struct SysinfoPeer;

impl SysinfoPeer {
    pub fn new() -> Self {
        SysinfoPeer
    }

    fn descriptors() -> Vec<ToolDescriptor> {
        vec![ToolDescriptor::new(
            "get_sysinfo",
            "Get the current system information: host details, CPU core counts, \
             memory totals and utilization, and disk space per mount point.",
            json!({"type": "object", "properties": {}, "required": []}),
        )]
    }

    fn report() -> String {
        let mut sys = System::new_all();
        sys.refresh_all();

        let mut output = Vec::new();

        output.push("System Information:".to_string());
        output.push(format!(
            "System: {}",
            System::name().unwrap_or_else(|| "unknown".into())
        ));
        output.push(format!(
            "Node Name: {}",
            System::host_name().unwrap_or_else(|| "unknown".into())
        ));
        output.push(format!(
            "Release: {}",
            System::kernel_version().unwrap_or_else(|| "unknown".into())
        ));
        output.push(format!(
            "Version: {}",
            System::os_version().unwrap_or_else(|| "unknown".into())
        ));
        output.push(format!(
            "Machine: {}",
            System::cpu_arch().unwrap_or_else(|| "unknown".into())
        ));

        output.push(String::new());
        output.push("CPU Information:".to_string());
        if let Some(cpu) = sys.cpus().first() {
            output.push(format!("Processor: {}", cpu.brand()));
        }
        if let Some(physical) = sys.physical_core_count() {
            output.push(format!("Physical Cores: {physical}"));
        }
        output.push(format!("Logical Cores: {}", sys.cpus().len()));

        let total = sys.total_memory();
        let available = sys.available_memory();
        let used = sys.used_memory();
        let utilization = if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        output.push(String::new());
        output.push("Memory Information:".to_string());
        output.push(format!("Total Memory: {total} bytes"));
        output.push(format!("Available Memory: {available} bytes"));
        output.push(format!("Used Memory: {used} bytes"));
        output.push(format!("Memory Utilization: {utilization:.1}%"));

        output.push(String::new());
        output.push("Disk Information:".to_string());
        for disk in Disks::new_with_refreshed_list().list() {
            let total = disk.total_space();
            let free = disk.available_space();
            let used = total.saturating_sub(free);
            let utilization = if total > 0 {
                used as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            output.push(format!(
                "{}: {total} bytes total, {used} bytes used, {free} bytes free ({utilization:.1}%)",
                disk.mount_point().display(),
            ));
        }

        output.join("\n")
    }
}

impl Default for SysinfoPeer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolPeer for SysinfoPeer {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, PeerError> {
        Ok(Self::descriptors())
    }

    async fn call_tool(&self, name: &str, _arguments: Value) -> Result<Value, PeerError> {
        match name {
            "get_sysinfo" => Ok(Value::String(Self::report())),
            other => Err(PeerError::Rpc {
                code: -32601,
                message: format!("unknown tool '{other}'"),
            }),
        }
    }
}
