//! Liveness and resource checks.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate};

use super::AppState;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Usage {
    /// Percent, rounded to two decimals.
    pub used: f64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub version: &'static str,
    pub cpu: Usage,
    pub memory: Usage,
}

pub async fn status() -> Json<bool> {
    Json(true)
}

pub async fn version() -> Json<VersionResponse> {
    Json(VersionResponse { version: VERSION })
}

/// CPU and memory used by this process.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (cpu, memory) = {
        let mut system = state.system.lock();
        process_usage(&mut system)
    };
    Json(HealthResponse {
        version: VERSION,
        cpu: Usage { used: round2(cpu) },
        memory: Usage { used: round2(memory) },
    })
}

fn process_usage(system: &mut sysinfo::System) -> (f64, f64) {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return (0.0, 0.0);
    };
    system.refresh_memory();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_cpu().with_memory(),
    );
    let Some(process) = system.process(pid) else {
        return (0.0, 0.0);
    };

    let cores = std::thread::available_parallelism().map_or(1, |n| n.get()) as f64;
    let cpu = f64::from(process.cpu_usage()) / cores;
    let total = system.total_memory();
    let memory = if total == 0 {
        0.0
    } else {
        process.memory() as f64 / total as f64 * 100.0
    };
    (cpu, memory)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round2(12.3456), 12.35);
        assert_eq!(round2(0.0), 0.0);
    }
}
