//! 계측 채널 -- 드라이버의 체크포인트 보고와 엔진의 해제 신호
//!
//! 드라이버는 체크포인트에 도달하면 보고하고, 엔진이 해제할 때까지 기다립니다.
//! 엔진 쪽에서는 보고가 [`ChannelMessage`]로 bounded mpsc 채널을 통해 들어오고,
//! 해제는 보고에 딸린 oneshot으로 돌려보냅니다.
//!
//! ```text
//! driver ──checkpoint 2──▶ connection task ──CheckpointReported──▶ engine
//!        ◀──proceed────── connection task ◀──ReleaseGranted────── engine
//! ```
//!
//! # TCP 줄 프로토콜
//!
//! | 요청 | 응답 |
//! |------|------|
//! | `checkpoint <id>` | 해제되면 `proceed` |
//! | `state <variable> <value...>` | `ok` |
//! | `target <name> <pid>` | `ok` |
//! | `ping` | `pong` |
//! | 그 외 | `error <reason>` |

use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use faultline_core::error::ChannelError;
use faultline_core::metrics as m;
use faultline_core::types::CheckpointId;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ChannelSettings;
use crate::driver::DriverExit;

/// 해제 신호
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseGranted;

/// 드라이버 쪽에서 엔진으로 가는 메시지
#[derive(Debug)]
pub enum ChannelMessage {
    /// 체크포인트 도달. 엔진은 `reply`로 해제합니다.
    CheckpointReported {
        id: CheckpointId,
        reply: oneshot::Sender<ReleaseGranted>,
    },
    /// 상태 변수 보고
    StateReported { variable: String, value: String },
    /// 장애 대상 PID 등록
    TargetRegistered { name: String, pid: u32 },
}

/// 트라이얼 러너가 기다리는 다음 사건
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// 드라이버가 체크포인트를 보고함
    Checkpoint(CheckpointId),
    /// 드라이버 프로세스가 종료됨
    DriverExited(DriverExit),
}

/// 체크포인트 외의 보고 (상태 변수, 대상 등록)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelReports {
    /// 보고 순서대로의 상태 변수
    pub state: Vec<(String, String)>,
    /// 보고 순서대로의 대상 등록
    pub targets: Vec<(String, u32)>,
}

impl ChannelReports {
    pub fn is_empty(&self) -> bool {
        self.state.is_empty() && self.targets.is_empty()
    }
}

/// 계측 채널 trait
pub trait InstrumentationChannel: Send {
    /// 다음 체크포인트 보고를 기다립니다.
    ///
    /// 취소해도 안전합니다 (받은 보고는 잃지 않음).
    ///
    /// # Errors
    /// - `ChannelError::Timeout`: 시간 안에 보고가 없음
    /// - `ChannelError::Closed`: 더 이상 보고할 수 있는 쪽이 없음
    fn await_checkpoint(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<CheckpointId, ChannelError>> + Send;

    /// 대기 중인 체크포인트 보고를 해제합니다.
    fn release(&mut self, checkpoint: &CheckpointId) -> Result<(), ChannelError>;

    /// 지금까지 받은 상태 / 대상 보고를 가져갑니다.
    fn drain_reports(&mut self) -> ChannelReports;

    /// 채널을 닫습니다. 대기 중인 보고는 모두 해제됩니다.
    fn shutdown(&mut self) -> impl Future<Output = ()> + Send;
}

// ─── 공용 수신함 ────────────────────────────────────────────────────

/// 두 구현이 공유하는 엔진 쪽 수신함
#[derive(Debug)]
struct Inbox {
    rx: mpsc::Receiver<ChannelMessage>,
    pending: VecDeque<(CheckpointId, oneshot::Sender<ReleaseGranted>)>,
    reports: ChannelReports,
}

impl Inbox {
    fn new(rx: mpsc::Receiver<ChannelMessage>) -> Self {
        Self {
            rx,
            pending: VecDeque::new(),
            reports: ChannelReports::default(),
        }
    }

    async fn next_checkpoint(&mut self, timeout: Duration) -> Result<CheckpointId, ChannelError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let message = match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    return Err(ChannelError::Closed(
                        "all reporters have disconnected".to_owned(),
                    ));
                }
                Err(_) => {
                    return Err(ChannelError::Timeout {
                        waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    });
                }
            };

            match message {
                ChannelMessage::CheckpointReported { id, reply } => {
                    metrics::counter!(m::CHANNEL_CHECKPOINTS_TOTAL).increment(1);
                    debug!(checkpoint = %id, "checkpoint reported");
                    self.pending.push_back((id.clone(), reply));
                    return Ok(id);
                }
                ChannelMessage::StateReported { variable, value } => {
                    debug!(variable = %variable, value = %value, "state reported");
                    self.reports.state.push((variable, value));
                }
                ChannelMessage::TargetRegistered { name, pid } => {
                    debug!(target_name = %name, pid, "target registered");
                    self.reports.targets.push((name, pid));
                }
            }
        }
    }

    fn release(&mut self, checkpoint: &CheckpointId) -> Result<(), ChannelError> {
        let index = self
            .pending
            .iter()
            .position(|(id, _)| id == checkpoint)
            .ok_or_else(|| {
                ChannelError::Protocol(format!("checkpoint {checkpoint} has no pending report"))
            })?;
        if let Some((_, reply)) = self.pending.remove(index) {
            if reply.send(ReleaseGranted).is_err() {
                debug!(checkpoint = %checkpoint, "reporter went away before release");
            }
        }
        Ok(())
    }

    fn drain_reports(&mut self) -> ChannelReports {
        std::mem::take(&mut self.reports)
    }

    fn release_all(&mut self) {
        for (_, reply) in self.pending.drain(..) {
            let _ = reply.send(ReleaseGranted);
        }
        self.rx.close();
    }
}

// ─── TCP 채널 ──────────────────────────────────────────────────────

/// TCP 줄 프로토콜 채널
///
/// 각 연결은 별도의 tokio 태스크에서 처리되며, 한 연결로 여러 명령을 보낼 수 있습니다.
pub struct TcpChannel {
    inbox: Inbox,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    accept_task: Option<JoinHandle<()>>,
}

impl TcpChannel {
    /// 리스너를 바인드하고 연결 수락 태스크를 시작합니다.
    pub async fn bind(settings: &ChannelSettings) -> Result<Self, ChannelError> {
        let listener = TcpListener::bind(&settings.bind_addr)
            .await
            .map_err(|e| ChannelError::Bind {
                addr: settings.bind_addr.clone(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| ChannelError::Bind {
            addr: settings.bind_addr.clone(),
            reason: e.to_string(),
        })?;
        info!(addr = %local_addr, "instrumentation channel listening");

        let (tx, rx) = mpsc::channel(settings.queue_capacity);
        let cancel = CancellationToken::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            tx,
            settings.max_connections,
            settings.max_line_bytes,
            cancel.clone(),
        ));

        Ok(Self {
            inbox: Inbox::new(rx),
            local_addr,
            cancel,
            accept_task: Some(accept_task),
        })
    }

    /// 실제로 바인드된 주소 (포트 0으로 바인드한 경우 확인용)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl InstrumentationChannel for TcpChannel {
    async fn await_checkpoint(&mut self, timeout: Duration) -> Result<CheckpointId, ChannelError> {
        self.inbox.next_checkpoint(timeout).await
    }

    fn release(&mut self, checkpoint: &CheckpointId) -> Result<(), ChannelError> {
        self.inbox.release(checkpoint)
    }

    fn drain_reports(&mut self) -> ChannelReports {
        self.inbox.drain_reports()
    }

    async fn shutdown(&mut self) {
        self.cancel.cancel();
        self.inbox.release_all();
        // 다음 트라이얼이 같은 주소에 바인드할 수 있도록 리스너가 닫힐 때까지 기다림
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "channel accept task ended abnormally");
            }
        }
        debug!(addr = %self.local_addr, "instrumentation channel closed");
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    tx: mpsc::Sender<ChannelMessage>,
    max_connections: usize,
    max_line_bytes: usize,
    cancel: CancellationToken,
) {
    // 연결 수 제한을 위한 세마포어
    let semaphore = Arc::new(Semaphore::new(max_connections));

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "failed to accept channel connection");
                        continue;
                    }
                };

                let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                    metrics::counter!(m::CHANNEL_CONNECTIONS_REJECTED_TOTAL).increment(1);
                    warn!(peer = %peer, max_connections, "max connections reached, rejecting");
                    tokio::spawn(reject(stream));
                    continue;
                };

                debug!(peer = %peer, "accepted channel connection");
                let tx = tx.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, tx, max_line_bytes, cancel).await {
                        debug!(peer = %peer, error = %e, "channel connection ended with error");
                    }
                    drop(permit); // 연결 종료 시 세마포어 반환
                });
            }
            () = cancel.cancelled() => {
                debug!("channel accept loop received shutdown signal");
                break;
            }
        }
    }
}

async fn reject(mut stream: TcpStream) {
    let _ = stream.write_all(b"error too many connections\n").await;
}

/// 채널 명령
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Checkpoint(CheckpointId),
    State { variable: String, value: String },
    Target { name: String, pid: u32 },
    Ping,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb.to_ascii_lowercase().as_str() {
        "checkpoint" => {
            if rest.is_empty() {
                return Err("usage: checkpoint <id>".to_owned());
            }
            Ok(Command::Checkpoint(CheckpointId::new(rest)))
        }
        "state" => {
            let (variable, value) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "usage: state <variable> <value>".to_owned())?;
            Ok(Command::State {
                variable: variable.to_owned(),
                value: value.trim().to_owned(),
            })
        }
        "target" => {
            let mut parts = rest.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(name), Some(pid), None) => {
                    let pid = pid
                        .parse::<u32>()
                        .ok()
                        .filter(|p| *p > 0)
                        .ok_or_else(|| format!("invalid pid '{pid}'"))?;
                    Ok(Command::Target {
                        name: name.to_owned(),
                        pid,
                    })
                }
                _ => Err("usage: target <name> <pid>".to_owned()),
            }
        }
        "ping" => Ok(Command::Ping),
        other => Err(format!("unknown command '{other}'")),
    }
}

async fn handle_connection(
    stream: TcpStream,
    tx: mpsc::Sender<ChannelMessage>,
    max_line_bytes: usize,
    cancel: CancellationToken,
) -> Result<(), ChannelError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    let limit = u64::try_from(max_line_bytes).unwrap_or(u64::MAX).saturating_add(1);

    loop {
        line.clear();
        let mut limited = (&mut reader).take(limit);
        let read = tokio::select! {
            result = limited.read_line(&mut line) => result,
            () = cancel.cancelled() => break,
        };

        let bytes_read = read.map_err(|e| ChannelError::Protocol(format!("read error: {e}")))?;
        if bytes_read == 0 {
            break; // EOF
        }
        if line.len() > max_line_bytes {
            let _ = write_half.write_all(b"error line too long\n").await;
            return Err(ChannelError::Protocol(format!(
                "line exceeds {max_line_bytes} bytes"
            )));
        }

        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        let reply = match parse_command(text) {
            Ok(Command::Checkpoint(id)) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                forward(&tx, ChannelMessage::CheckpointReported { id, reply: reply_tx }).await?;
                // 종료 시 해제와 취소가 함께 도착하면 해제를 먼저 전달
                tokio::select! {
                    biased;
                    released = reply_rx => match released {
                        Ok(ReleaseGranted) => "proceed".to_owned(),
                        Err(_) => {
                            return Err(ChannelError::Closed(
                                "engine dropped the checkpoint".to_owned(),
                            ));
                        }
                    },
                    () = cancel.cancelled() => break,
                }
            }
            Ok(Command::State { variable, value }) => {
                forward(&tx, ChannelMessage::StateReported { variable, value }).await?;
                "ok".to_owned()
            }
            Ok(Command::Target { name, pid }) => {
                forward(&tx, ChannelMessage::TargetRegistered { name, pid }).await?;
                "ok".to_owned()
            }
            Ok(Command::Ping) => "pong".to_owned(),
            Err(reason) => format!("error {reason}"),
        };

        write_half
            .write_all(format!("{reply}\n").as_bytes())
            .await
            .map_err(|e| ChannelError::Protocol(format!("write error: {e}")))?;
    }

    Ok(())
}

async fn forward(
    tx: &mpsc::Sender<ChannelMessage>,
    message: ChannelMessage,
) -> Result<(), ChannelError> {
    tx.send(message)
        .await
        .map_err(|_| ChannelError::Closed("engine is no longer listening".to_owned()))
}

// ─── 메모리 채널 ────────────────────────────────────────────────────

/// 프로세스 내부 채널
///
/// 드라이버를 Rust 코드로 구현할 때나 테스트에서 사용합니다.
pub struct MemoryChannel {
    inbox: Inbox,
}

/// [`MemoryChannel`]의 드라이버 쪽 핸들
#[derive(Debug, Clone)]
pub struct MemoryDriverHandle {
    tx: mpsc::Sender<ChannelMessage>,
}

impl MemoryChannel {
    /// 채널과 드라이버 핸들을 생성합니다.
    pub fn new(capacity: usize) -> (Self, MemoryDriverHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                inbox: Inbox::new(rx),
            },
            MemoryDriverHandle { tx },
        )
    }
}

impl InstrumentationChannel for MemoryChannel {
    async fn await_checkpoint(&mut self, timeout: Duration) -> Result<CheckpointId, ChannelError> {
        self.inbox.next_checkpoint(timeout).await
    }

    fn release(&mut self, checkpoint: &CheckpointId) -> Result<(), ChannelError> {
        self.inbox.release(checkpoint)
    }

    fn drain_reports(&mut self) -> ChannelReports {
        self.inbox.drain_reports()
    }

    async fn shutdown(&mut self) {
        self.inbox.release_all();
    }
}

impl MemoryDriverHandle {
    /// 체크포인트를 보고하고 해제될 때까지 기다립니다.
    pub async fn checkpoint(&self, id: impl Into<CheckpointId>) -> Result<(), ChannelError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        forward(
            &self.tx,
            ChannelMessage::CheckpointReported {
                id: id.into(),
                reply: reply_tx,
            },
        )
        .await?;
        reply_rx
            .await
            .map(|ReleaseGranted| ())
            .map_err(|_| ChannelError::Closed("engine dropped the checkpoint".to_owned()))
    }

    /// 상태 변수를 보고합니다.
    pub async fn state(
        &self,
        variable: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ChannelError> {
        forward(
            &self.tx,
            ChannelMessage::StateReported {
                variable: variable.into(),
                value: value.into(),
            },
        )
        .await
    }

    /// 장애 대상 PID를 등록합니다.
    pub async fn target(&self, name: impl Into<String>, pid: u32) -> Result<(), ChannelError> {
        forward(
            &self.tx,
            ChannelMessage::TargetRegistered {
                name: name.into(),
                pid,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ChannelSettings {
        ChannelSettings {
            bind_addr: "127.0.0.1:0".to_owned(),
            max_connections: 2,
            max_line_bytes: 64,
            ..Default::default()
        }
    }

    struct Client {
        reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
        writer: tokio::net::tcp::OwnedWriteHalf,
    }

    impl Client {
        async fn connect(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (r, w) = stream.into_split();
            Self {
                reader: BufReader::new(r),
                writer: w,
            }
        }

        async fn send(&mut self, line: &str) {
            self.writer
                .write_all(format!("{line}\n").as_bytes())
                .await
                .unwrap();
        }

        async fn recv(&mut self) -> String {
            let mut reply = String::new();
            self.reader.read_line(&mut reply).await.unwrap();
            reply.trim_end().to_owned()
        }
    }

    #[test]
    fn command_parsing() {
        assert_eq!(
            parse_command("checkpoint 2").unwrap(),
            Command::Checkpoint(CheckpointId::new("2"))
        );
        assert_eq!(
            parse_command("STATE rows 100 rows").unwrap(),
            Command::State {
                variable: "rows".to_owned(),
                value: "100 rows".to_owned()
            }
        );
        assert_eq!(
            parse_command("target leader 4242").unwrap(),
            Command::Target {
                name: "leader".to_owned(),
                pid: 4242
            }
        );
        assert_eq!(parse_command("ping").unwrap(), Command::Ping);
        assert!(parse_command("checkpoint").is_err());
        assert!(parse_command("state rows").is_err());
        assert!(parse_command("target leader 0").is_err());
        assert!(parse_command("target leader x").is_err());
        assert!(parse_command("launch missiles").is_err());
    }

    #[tokio::test]
    async fn tcp_checkpoint_waits_for_release() {
        let mut channel = TcpChannel::bind(&settings()).await.unwrap();
        let mut client = Client::connect(channel.local_addr()).await;

        client.send("state rows 100").await;
        assert_eq!(client.recv().await, "ok");
        client.send("target leader 77").await;
        assert_eq!(client.recv().await, "ok");
        client.send("checkpoint 1").await;

        let cp = channel
            .await_checkpoint(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(cp.as_str(), "1");
        let reports = channel.drain_reports();
        assert_eq!(reports.state, vec![("rows".to_owned(), "100".to_owned())]);
        assert_eq!(reports.targets, vec![("leader".to_owned(), 77)]);

        channel.release(&cp).unwrap();
        assert_eq!(client.recv().await, "proceed");

        client.send("ping").await;
        assert_eq!(client.recv().await, "pong");
        client.send("bogus").await;
        assert!(client.recv().await.starts_with("error unknown command"));

        channel.shutdown().await;
    }

    #[tokio::test]
    async fn tcp_over_long_line_is_rejected() {
        let mut channel = TcpChannel::bind(&settings()).await.unwrap();
        let mut client = Client::connect(channel.local_addr()).await;
        client.send(&format!("checkpoint {}", "x".repeat(200))).await;
        assert_eq!(client.recv().await, "error line too long");
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn tcp_connection_limit_rejects_extra_clients() {
        let mut channel = TcpChannel::bind(&settings()).await.unwrap();
        let addr = channel.local_addr();
        let mut a = Client::connect(addr).await;
        let mut b = Client::connect(addr).await;
        a.send("ping").await;
        assert_eq!(a.recv().await, "pong");
        b.send("ping").await;
        assert_eq!(b.recv().await, "pong");

        let mut c = Client::connect(addr).await;
        assert_eq!(c.recv().await, "error too many connections");
        channel.shutdown().await;
    }

    #[tokio::test]
    async fn tcp_rebind_after_shutdown() {
        let mut first = TcpChannel::bind(&settings()).await.unwrap();
        let addr = first.local_addr();
        first.shutdown().await;

        let again = ChannelSettings {
            bind_addr: addr.to_string(),
            ..settings()
        };
        let mut second = TcpChannel::bind(&again).await.unwrap();
        second.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_releases_pending_reports() {
        let mut channel = TcpChannel::bind(&settings()).await.unwrap();
        let mut client = Client::connect(channel.local_addr()).await;
        client.send("checkpoint 9").await;
        channel
            .await_checkpoint(Duration::from_secs(5))
            .await
            .unwrap();
        channel.shutdown().await;
        assert_eq!(client.recv().await, "proceed");
    }

    #[tokio::test(start_paused = true)]
    async fn await_checkpoint_times_out() {
        let (mut channel, _handle) = MemoryChannel::new(4);
        let err = channel
            .await_checkpoint(Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Timeout { waited_ms: 60_000 }));
    }

    #[tokio::test]
    async fn memory_channel_roundtrip() {
        let (mut channel, handle) = MemoryChannel::new(4);
        let driver = tokio::spawn(async move {
            handle.state("n1.role", "leader").await.unwrap();
            handle.checkpoint("1").await.unwrap();
            handle.checkpoint("2").await.unwrap();
        });

        for expected in ["1", "2"] {
            let cp = channel
                .await_checkpoint(Duration::from_secs(5))
                .await
                .unwrap();
            assert_eq!(cp.as_str(), expected);
            channel.release(&cp).unwrap();
        }
        driver.await.unwrap();

        assert_eq!(channel.drain_reports().state.len(), 1);
        assert!(channel.drain_reports().is_empty());
        assert!(matches!(
            channel.await_checkpoint(Duration::from_secs(5)).await,
            Err(ChannelError::Closed(_))
        ));
    }

    #[tokio::test]
    async fn releasing_unknown_checkpoint_is_protocol_error() {
        let (mut channel, _handle) = MemoryChannel::new(1);
        assert!(matches!(
            channel.release(&CheckpointId::new("7")),
            Err(ChannelError::Protocol(_))
        ));
    }
}
