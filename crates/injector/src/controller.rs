//! 대상 제어 추상화
//!
//! [`TargetController`] trait은 OS 수준의 장애 적용을 추상화합니다.
//! 프로덕션은 [`ProcessController`]를, 테스트는 `MockTargetController`를 사용합니다.
//!
//! ```text
//! ┌───────────────┐
//! │ FaultInjector │
//! └───────┬───────┘
//!         ▼
//! ┌──────────────────┐
//! │ TargetController │ (trait)
//! └──────────────────┘
//!      │         │
//!      ▼         ▼
//!  ┌───────┐ ┌──────┐
//!  │Process│ │ Mock │
//!  └───┬───┘ └──────┘
//!      ▼
//!  kill(2), /proc, sh -c <template>
//! ```

use std::future::Future;

use tracing::debug;

use crate::error::InjectorError;
use crate::registry::Endpoint;

/// 대상에 보낼 시그널
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSignal {
    /// SIGKILL
    Kill,
    /// SIGSTOP
    Stop,
    /// SIGCONT
    Continue,
}

impl TargetSignal {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Kill => "SIGKILL",
            Self::Stop => "SIGSTOP",
            Self::Continue => "SIGCONT",
        }
    }
}

/// 대상 제어 trait
///
/// `Send + Sync + 'static`이므로 비동기 컨텍스트에서 공유할 수 있습니다.
pub trait TargetController: Send + Sync + 'static {
    /// 프로세스에 시그널을 보냅니다.
    ///
    /// # Errors
    /// - `InjectorError::ProcessGone`: 프로세스가 없음
    /// - `InjectorError::ActionFailed`: 그 외 실패 (권한 등)
    fn signal(
        &self,
        pid: u32,
        signal: TargetSignal,
    ) -> impl Future<Output = Result<(), InjectorError>> + Send;

    /// 프로세스가 살아 있는지 확인합니다. 좀비는 죽은 것으로 봅니다.
    fn is_alive(&self, pid: u32) -> impl Future<Output = bool> + Send;

    /// 대상과 피어 사이의 트래픽을 차단합니다.
    fn partition(
        &self,
        target: &Endpoint,
        peer: &Endpoint,
    ) -> impl Future<Output = Result<(), InjectorError>> + Send;

    /// [`partition`](Self::partition)으로 만든 차단을 제거합니다.
    fn heal_partition(
        &self,
        target: &Endpoint,
        peer: &Endpoint,
    ) -> impl Future<Output = Result<(), InjectorError>> + Send;
}

/// 프로덕션 대상 제어기
///
/// 시그널은 `kill(2)`, 생존 확인은 `kill(pid, 0)`과 `/proc/<pid>/stat`,
/// 네트워크 차단은 설정된 명령 템플릿을 `sh -c`로 실행합니다.
///
/// 템플릿 자리표시자: `{target}`, `{peer}`, `{target_host}`, `{target_port}`,
/// `{peer_host}`, `{peer_port}`
pub struct ProcessController {
    partition_command: String,
    heal_command: String,
}

impl ProcessController {
    /// 새 제어기를 생성합니다.
    pub fn new(partition_command: impl Into<String>, heal_command: impl Into<String>) -> Self {
        Self {
            partition_command: partition_command.into(),
            heal_command: heal_command.into(),
        }
    }

    async fn run_template(
        &self,
        template: &str,
        action: &str,
        target: &Endpoint,
        peer: &Endpoint,
    ) -> Result<(), InjectorError> {
        let command = render_template(template, target, peer);
        debug!(command = %command, action, "running network command");

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| InjectorError::ActionFailed {
                target: target.name.clone(),
                action: action.to_owned(),
                reason: format!("failed to spawn '{command}': {e}"),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(InjectorError::ActionFailed {
                target: target.name.clone(),
                action: action.to_owned(),
                reason: format!(
                    "'{command}' exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        }
    }
}

/// 명령 템플릿의 자리표시자를 채웁니다.
pub fn render_template(template: &str, target: &Endpoint, peer: &Endpoint) -> String {
    template
        .replace("{target_host}", &target.host)
        .replace("{target_port}", &target.port.to_string())
        .replace("{peer_host}", &peer.host)
        .replace("{peer_port}", &peer.port.to_string())
        .replace("{target}", &target.name)
        .replace("{peer}", &peer.name)
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: TargetSignal) -> Result<(), InjectorError> {
    let raw_pid = libc::pid_t::try_from(pid).map_err(|_| InjectorError::ProcessGone { pid })?;
    if raw_pid <= 0 {
        // 0과 음수는 프로세스 그룹을 뜻하므로 허용하지 않음
        return Err(InjectorError::ProcessGone { pid });
    }
    let sig = match signal {
        TargetSignal::Kill => libc::SIGKILL,
        TargetSignal::Stop => libc::SIGSTOP,
        TargetSignal::Continue => libc::SIGCONT,
    };
    // SAFETY: kill(2)은 메모리를 다루지 않으며 pid는 양수로 검증됨
    let rc = unsafe { libc::kill(raw_pid, sig) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Err(InjectorError::ProcessGone { pid })
    } else {
        Err(InjectorError::ActionFailed {
            target: format!("pid {pid}"),
            action: signal.name().to_owned(),
            reason: err.to_string(),
        })
    }
}

#[cfg(not(unix))]
fn send_signal(pid: u32, signal: TargetSignal) -> Result<(), InjectorError> {
    Err(InjectorError::ActionFailed {
        target: format!("pid {pid}"),
        action: signal.name().to_owned(),
        reason: "process signals are only supported on unix".to_owned(),
    })
}

#[cfg(unix)]
async fn process_alive(pid: u32) -> bool {
    let Ok(raw_pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if raw_pid <= 0 {
        return false;
    }
    // SAFETY: 시그널 0은 존재 여부만 확인함
    let rc = unsafe { libc::kill(raw_pid, 0) };
    if rc != 0 && std::io::Error::last_os_error().raw_os_error() != Some(libc::EPERM) {
        return false;
    }
    // 회수되지 않은 좀비는 kill(pid, 0)에 성공하므로 /proc에서 상태를 확인
    match tokio::fs::read_to_string(format!("/proc/{pid}/stat")).await {
        Ok(stat) => !is_zombie_stat(&stat),
        Err(_) => true,
    }
}

#[cfg(not(unix))]
async fn process_alive(_pid: u32) -> bool {
    false
}

/// `/proc/<pid>/stat`의 상태 필드가 좀비(`Z`) 또는 종료(`X`)인지 확인합니다.
///
/// comm 필드에 공백과 괄호가 들어갈 수 있으므로 마지막 `)` 뒤를 봅니다.
fn is_zombie_stat(stat: &str) -> bool {
    stat.rfind(')')
        .and_then(|idx| stat[idx + 1..].split_whitespace().next())
        .is_some_and(|state| state == "Z" || state == "X")
}

impl TargetController for ProcessController {
    async fn signal(&self, pid: u32, signal: TargetSignal) -> Result<(), InjectorError> {
        debug!(pid, signal = signal.name(), "sending signal");
        send_signal(pid, signal)
    }

    async fn is_alive(&self, pid: u32) -> bool {
        process_alive(pid).await
    }

    async fn partition(&self, target: &Endpoint, peer: &Endpoint) -> Result<(), InjectorError> {
        self.run_template(&self.partition_command, "partition", target, peer)
            .await
    }

    async fn heal_partition(
        &self,
        target: &Endpoint,
        peer: &Endpoint,
    ) -> Result<(), InjectorError> {
        self.run_template(&self.heal_command, "heal_partition", target, peer)
            .await
    }
}

/// 테스트용 Mock 대상 제어기
///
/// 호출을 기록하고, 설정에 따라 실패나 무응답을 흉내 냅니다.
#[cfg(any(test, feature = "test-util"))]
#[derive(Default)]
pub struct MockTargetController {
    state: std::sync::Mutex<MockState>,
    /// 모든 액션을 실패시킬지 여부
    pub fail_actions: bool,
    /// SIGKILL을 받아도 죽지 않는 PID
    pub unresponsive: std::collections::HashSet<u32>,
}

#[cfg(any(test, feature = "test-util"))]
#[derive(Default)]
struct MockState {
    alive: std::collections::HashSet<u32>,
    calls: Vec<String>,
    transient_failures: u32,
}

#[cfg(any(test, feature = "test-util"))]
impl MockTargetController {
    /// 빈 mock 제어기를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 살아 있는 프로세스를 설정합니다.
    pub fn with_processes(self, pids: impl IntoIterator<Item = u32>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.alive.extend(pids);
        }
        self
    }

    /// 액션 호출 시 실패하도록 설정합니다.
    pub fn with_failing_actions(mut self) -> Self {
        self.fail_actions = true;
        self
    }

    /// 처음 `n`번의 액션만 실패하도록 설정합니다 (재시도 검증용).
    pub fn with_transient_failures(self, n: u32) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.transient_failures = n;
        }
        self
    }

    /// SIGKILL에도 죽지 않는 PID를 설정합니다.
    pub fn with_unresponsive(mut self, pid: u32) -> Self {
        self.unresponsive.insert(pid);
        self
    }

    /// 지금까지의 호출 기록 (`"SIGSTOP 10"`, `"partition a b"` 형식)
    pub fn calls(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: String) -> Result<(), InjectorError> {
        let mut state = self.state.lock().map_err(|_| InjectorError::ActionFailed {
            target: "mock".to_owned(),
            action: "lock".to_owned(),
            reason: "mock state poisoned".to_owned(),
        })?;
        state.calls.push(call.clone());
        if self.fail_actions {
            return Err(InjectorError::ActionFailed {
                target: "mock".to_owned(),
                action: call,
                reason: "mock failure".to_owned(),
            });
        }
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(InjectorError::ActionFailed {
                target: "mock".to_owned(),
                action: call,
                reason: "transient mock failure".to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-util"))]
impl TargetController for MockTargetController {
    async fn signal(&self, pid: u32, signal: TargetSignal) -> Result<(), InjectorError> {
        let alive = self
            .state
            .lock()
            .map(|s| s.alive.contains(&pid))
            .unwrap_or(false);
        if !alive {
            return Err(InjectorError::ProcessGone { pid });
        }
        self.record(format!("{} {pid}", signal.name()))?;
        if signal == TargetSignal::Kill && !self.unresponsive.contains(&pid) {
            if let Ok(mut state) = self.state.lock() {
                state.alive.remove(&pid);
            }
        }
        Ok(())
    }

    async fn is_alive(&self, pid: u32) -> bool {
        self.state
            .lock()
            .map(|s| s.alive.contains(&pid))
            .unwrap_or(false)
    }

    async fn partition(&self, target: &Endpoint, peer: &Endpoint) -> Result<(), InjectorError> {
        self.record(format!("partition {} {}", target.name, peer.name))
    }

    async fn heal_partition(
        &self,
        target: &Endpoint,
        peer: &Endpoint,
    ) -> Result<(), InjectorError> {
        self.record(format!("heal {} {}", target.name, peer.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(name: &str, host: &str, port: u16) -> Endpoint {
        Endpoint {
            name: name.to_owned(),
            host: host.to_owned(),
            port,
        }
    }

    #[test]
    fn template_placeholders_are_filled() {
        let cmd = render_template(
            "block {peer}({peer_host}:{peer_port}) -> {target}({target_host}:{target_port})",
            &ep("leader", "10.0.0.1", 7000),
            &ep("follower", "10.0.0.2", 7001),
        );
        assert_eq!(
            cmd,
            "block follower(10.0.0.2:7001) -> leader(10.0.0.1:7000)"
        );
    }

    #[test]
    fn zombie_detection_handles_parenthesised_comm() {
        assert!(is_zombie_stat("1234 (weird) name) Z 1 1234"));
        assert!(!is_zombie_stat("1234 (java) S 1 1234"));
        assert!(!is_zombie_stat("garbage"));
    }

    #[test]
    fn controller_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProcessController>();
        assert_send_sync::<MockTargetController>();
    }

    #[tokio::test]
    async fn mock_kill_removes_process() {
        let mock = MockTargetController::new().with_processes([10]);
        assert!(mock.is_alive(10).await);
        mock.signal(10, TargetSignal::Kill).await.unwrap();
        assert!(!mock.is_alive(10).await);
        assert!(matches!(
            mock.signal(10, TargetSignal::Kill).await,
            Err(InjectorError::ProcessGone { pid: 10 })
        ));
    }

    #[tokio::test]
    async fn mock_unresponsive_survives_kill() {
        let mock = MockTargetController::new()
            .with_processes([10])
            .with_unresponsive(10);
        mock.signal(10, TargetSignal::Kill).await.unwrap();
        assert!(mock.is_alive(10).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_controller_signals_real_child() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        let controller = ProcessController::new("true", "true");

        assert!(controller.is_alive(pid).await);
        controller.signal(pid, TargetSignal::Stop).await.unwrap();
        controller.signal(pid, TargetSignal::Continue).await.unwrap();
        controller.signal(pid, TargetSignal::Kill).await.unwrap();
        child.wait().await.unwrap();
        assert!(!controller.is_alive(pid).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_controller_reports_failed_template() {
        let controller = ProcessController::new("exit 3", "true");
        let err = controller
            .partition(&ep("a", "127.0.0.1", 1), &ep("b", "127.0.0.1", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, InjectorError::ActionFailed { ref action, .. } if action == "partition"));
        controller
            .heal_partition(&ep("a", "127.0.0.1", 1), &ep("b", "127.0.0.1", 2))
            .await
            .unwrap();
    }
}
