//! 정리 스크립트 가드
//!
//! 트라이얼마다 정확히 한 번 정리 스크립트를 실행합니다. [`CleanupGuard::run`]이
//! 가드를 소비하므로 두 번 실행할 수 없고, 실행하지 않은 채 버려지면 경고를 남깁니다.

use std::process::Stdio;
use std::time::Duration;

use faultline_core::metrics as m;
use tracing::{debug, warn};

use crate::driver::{DriverEnv, ScriptCommand};

/// 정리 스크립트 가드
#[derive(Debug)]
pub struct CleanupGuard {
    script: Option<ScriptCommand>,
    env: DriverEnv,
    timeout: Duration,
    done: bool,
}

impl CleanupGuard {
    /// 정리 스크립트가 없으면 `script`를 `None`으로 둡니다.
    pub fn new(script: Option<ScriptCommand>, env: DriverEnv, timeout: Duration) -> Self {
        Self {
            script,
            env,
            timeout,
            done: false,
        }
    }

    /// 트라이얼 진행 중 확정된 실행 환경으로 바꿉니다.
    pub fn with_env(mut self, env: DriverEnv) -> Self {
        self.env = env;
        self
    }

    /// 정리 스크립트를 실행합니다.
    ///
    /// 실패는 판정을 바꾸지 않으므로 에러 대신 경고 문자열을 반환합니다.
    pub async fn run(mut self) -> Option<String> {
        self.done = true;
        let script = self.script.take()?;

        let mut command = script.command();
        command
            .envs(self.env.vars())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let warning = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                debug!(script = %script, "cleanup finished");
                None
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Some(format!(
                    "cleanup {script} exited with {}: {}",
                    output.status,
                    stderr.trim()
                ))
            }
            Ok(Err(e)) => Some(format!("cleanup {script} could not start: {e}")),
            Err(_) => Some(format!(
                "cleanup {script} timed out after {}s",
                self.timeout.as_secs()
            )),
        };

        if let Some(reason) = &warning {
            metrics::counter!(m::TRIAL_CLEANUP_WARNINGS_TOTAL).increment(1);
            warn!(trial_id = %self.env.trial_id, reason = %reason, "cleanup reported a problem");
        }
        warning
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.done && self.script.is_some() {
            warn!(trial_id = %self.env.trial_id, "cleanup guard dropped without running");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> DriverEnv {
        DriverEnv {
            channel_addr: "127.0.0.1:0".to_owned(),
            trial_id: "t-cleanup".to_owned(),
            invariant: "a".to_owned(),
            stage: "INJECTION".to_owned(),
            plan_id: "p".to_owned(),
        }
    }

    #[tokio::test]
    async fn missing_script_is_not_a_warning() {
        let guard = CleanupGuard::new(None, env(), Duration::from_secs(1));
        assert!(guard.run().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_script_sees_trial_env() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("cleaned");
        let script = ScriptCommand::shell(format!(
            "echo \"$FAULTLINE_TRIAL_ID\" > {}",
            marker.display()
        ));
        let guard = CleanupGuard::new(Some(script), env(), Duration::from_secs(5));
        assert!(guard.run().await.is_none());
        assert_eq!(std::fs::read_to_string(&marker).unwrap().trim(), "t-cleanup");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_script_becomes_warning() {
        let script = ScriptCommand::shell("echo boom >&2; exit 4");
        let guard = CleanupGuard::new(Some(script), env(), Duration::from_secs(5));
        let warning = guard.run().await.unwrap();
        assert!(warning.contains("boom"), "{warning}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_script_times_out() {
        let script = ScriptCommand::shell("sleep 10");
        let guard = CleanupGuard::new(Some(script), env(), Duration::from_millis(100));
        let warning = guard.run().await.unwrap();
        assert!(warning.contains("timed out"));
    }
}
