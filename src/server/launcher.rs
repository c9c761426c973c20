use crate::config::LaunchDelays;
use crate::error::Result;
use crate::server::{BuildInfo, BuildStatus, ProcessHandle, ServiceConfig};
use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Builds, launches and terminates development server processes.
///
/// The lifecycle manager drives servers exclusively through this trait, so a
/// real process supervisor can replace the simulation without touching the
/// state machine.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Run the bundler build for a bundled framework.
    async fn build(&self, config: &ServiceConfig) -> Result<BuildInfo>;

    /// Start the server process. Returns once it is listening.
    async fn launch(&self, config: &ServiceConfig) -> Result<ProcessHandle>;

    /// Stop a process started by [`Launcher::launch`].
    async fn terminate(&self, handle: ProcessHandle) -> Result<()>;
}

/// Launcher that never spawns an OS process.
///
/// Each step suspends for the configured delay so logs get plausible timing;
/// with [`LaunchDelays::none`] everything completes immediately.
#[derive(Debug)]
pub struct SimulatedLauncher {
    delays: LaunchDelays,
    next_pid: AtomicU32,
}

impl SimulatedLauncher {
    pub fn new(delays: LaunchDelays) -> Self {
        Self {
            delays,
            next_pid: AtomicU32::new(40_000),
        }
    }

    pub fn delays(&self) -> LaunchDelays {
        self.delays
    }
}

impl Default for SimulatedLauncher {
    fn default() -> Self {
        Self::new(LaunchDelays::default())
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl Launcher for SimulatedLauncher {
    async fn build(&self, config: &ServiceConfig) -> Result<BuildInfo> {
        let base_kb = config.framework.typical_bundle_kb();
        let jitter = rand::thread_rng().gen_range(0.9..1.1);
        let factor = if config.build_optimization { 0.6 } else { 1.0 };
        let output_size_bytes = (base_kb as f64 * 1024.0 * factor * jitter) as u64;

        let mut warnings = Vec::new();
        if !config.build_optimization {
            warnings.push("Development build: output is not minified".to_string());
        }

        pause(self.delays.build()).await;

        Ok(BuildInfo {
            status: BuildStatus::Success,
            duration_ms: self.delays.build_ms,
            warnings,
            errors: Vec::new(),
            output_size_bytes,
        })
    }

    async fn launch(&self, config: &ServiceConfig) -> Result<ProcessHandle> {
        pause(self.delays.startup()).await;
        let pid = self.next_pid.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(pid, command = %config.command_line(), "Simulated process launched");
        Ok(ProcessHandle::new(pid, config.command_line()))
    }

    async fn terminate(&self, handle: ProcessHandle) -> Result<()> {
        pause(self.delays.shutdown()).await;
        tracing::debug!(pid = handle.pid, "Simulated process terminated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerRequest;
    use crate::framework::Framework;

    #[tokio::test]
    async fn test_optimized_build_is_smaller() {
        let launcher = SimulatedLauncher::new(LaunchDelays::none());
        let mut request = ServerRequest::new("app", Framework::Angular);

        let dev = launcher
            .build(&Framework::Angular.service_config(4200, &request))
            .await
            .unwrap();
        request.build_optimization = true;
        let prod = launcher
            .build(&Framework::Angular.service_config(4200, &request))
            .await
            .unwrap();

        assert_eq!(dev.status, BuildStatus::Success);
        assert!(prod.output_size_bytes < dev.output_size_bytes);
        assert!(prod.warnings.is_empty());
        assert_eq!(dev.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_pids_are_unique() {
        let launcher = SimulatedLauncher::new(LaunchDelays::none());
        let config = Framework::Static.service_config(8080, &ServerRequest::new("site", Framework::Static));

        let a = launcher.launch(&config).await.unwrap();
        let b = launcher.launch(&config).await.unwrap();

        assert_ne!(a.pid, b.pid);
        launcher.terminate(a).await.unwrap();
    }
}
