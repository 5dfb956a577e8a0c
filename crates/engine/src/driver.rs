//! SUT 드라이버 프로세스
//!
//! 드라이버는 외부 실행 파일입니다. 엔진은 실행 환경(채널 주소, 트라이얼 ID,
//! 불변식, 단계)을 환경변수로 넘기고, stdout / stderr를 줄 단위로 읽어
//! 마지막 부분과 감시 마커 일치 줄을 보관합니다.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use faultline_core::error::FaultlineError;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 실행할 스크립트와 인자
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ScriptCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// `sh -c <script>`로 실행하는 명령
    pub fn shell(script: impl Into<String>) -> Self {
        Self {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_owned(), script.into()],
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// 경로로 지정된 프로그램이 존재하는지 확인합니다.
    ///
    /// 경로 구분자가 없는 이름은 `PATH`에서 찾으므로 확인하지 않습니다.
    pub fn verify(&self) -> Result<(), FaultlineError> {
        if self.program.components().count() > 1 && !self.program.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("script not found: {}", self.program.display()),
            )
            .into());
        }
        Ok(())
    }

    pub(crate) fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl std::fmt::Display for ScriptCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// 드라이버에 넘기는 실행 환경
#[derive(Debug, Clone)]
pub struct DriverEnv {
    pub channel_addr: String,
    pub trial_id: String,
    pub invariant: String,
    pub stage: String,
    pub plan_id: String,
}

impl DriverEnv {
    /// 환경변수 목록
    pub fn vars(&self) -> Vec<(&'static str, String)> {
        let (host, port) = self
            .channel_addr
            .rsplit_once(':')
            .map(|(h, p)| (h.trim_start_matches('[').trim_end_matches(']'), p))
            .unwrap_or((self.channel_addr.as_str(), ""));
        vec![
            ("FAULTLINE_CHANNEL_ADDR", self.channel_addr.clone()),
            ("FAULTLINE_CHANNEL_HOST", host.to_owned()),
            ("FAULTLINE_CHANNEL_PORT", port.to_owned()),
            ("FAULTLINE_TRIAL_ID", self.trial_id.clone()),
            ("FAULTLINE_INVARIANT", self.invariant.clone()),
            ("FAULTLINE_STAGE", self.stage.clone()),
            ("FAULTLINE_PLAN_ID", self.plan_id.clone()),
        ]
    }
}

/// 드라이버 출력 보관
#[derive(Debug, Clone, Default)]
pub struct OutputCapture {
    limit: usize,
    tail: VecDeque<String>,
    watched: Vec<String>,
    hits: BTreeMap<String, String>,
    total_lines: u64,
}

impl OutputCapture {
    pub fn new(limit: usize, watched: Vec<String>) -> Self {
        Self {
            limit: limit.max(1),
            watched,
            ..Self::default()
        }
    }

    /// 한 줄을 기록합니다.
    pub fn push(&mut self, line: String) {
        self.total_lines += 1;
        for marker in &self.watched {
            if !self.hits.contains_key(marker) && line.contains(marker.as_str()) {
                self.hits.insert(marker.clone(), line.clone());
            }
        }
        if self.tail.len() == self.limit {
            self.tail.pop_front();
        }
        self.tail.push_back(line);
    }

    /// 마지막 부분
    pub fn tail(&self) -> Vec<String> {
        self.tail.iter().cloned().collect()
    }

    /// 감시 마커 → 처음 일치한 줄
    pub fn marker_hits(&self) -> &BTreeMap<String, String> {
        &self.hits
    }

    pub fn total_lines(&self) -> u64 {
        self.total_lines
    }
}

/// 드라이버 종료 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverExit {
    /// 종료 코드 (시그널 종료면 `None`)
    pub code: Option<i32>,
    /// 시그널로 종료되었는지 여부
    pub signaled: bool,
}

impl DriverExit {
    fn from_status(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            signaled: status.code().is_none(),
        }
    }
}

/// 실행 중인 드라이버 프로세스
pub struct DriverProcess {
    child: Child,
    pid: Option<u32>,
    output: Arc<Mutex<OutputCapture>>,
    readers: Vec<JoinHandle<()>>,
    exit: Option<DriverExit>,
}

impl DriverProcess {
    /// 드라이버를 시작합니다.
    ///
    /// # Errors
    /// 프로세스를 시작할 수 없으면 I/O 에러를 반환합니다.
    pub fn spawn(
        script: &ScriptCommand,
        env: &DriverEnv,
        capture: OutputCapture,
    ) -> Result<Self, FaultlineError> {
        let mut command = script.command();
        command
            .envs(env.vars())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            std::io::Error::new(e.kind(), format!("failed to start driver {script}: {e}"))
        })?;
        let pid = child.id();
        debug!(driver = %script, pid = ?pid, "driver launched");

        let output = Arc::new(Mutex::new(capture));
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(read_lines(stdout, Arc::clone(&output))));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(read_lines(stderr, Arc::clone(&output))));
        }

        Ok(Self {
            child,
            pid,
            output,
            readers,
            exit: None,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// 종료를 기다립니다. 취소해도 안전합니다.
    pub async fn wait(&mut self) -> std::io::Result<DriverExit> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        let status = self.child.wait().await?;
        let exit = DriverExit::from_status(status);
        self.exit = Some(exit);
        Ok(exit)
    }

    /// 드라이버를 강제 종료하고 회수합니다.
    pub async fn terminate(&mut self) -> Option<DriverExit> {
        if self.exit.is_some() {
            return self.exit;
        }
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "driver already gone");
        }
        match self.wait().await {
            Ok(exit) => Some(exit),
            Err(e) => {
                warn!(error = %e, "failed to reap driver");
                None
            }
        }
    }

    /// 출력 읽기가 끝날 때까지 기다리고 보관한 출력을 돌려줍니다.
    ///
    /// 드라이버가 남긴 자식 프로세스가 파이프를 잡고 있을 수 있으므로
    /// 읽기 태스크는 `grace`만큼만 기다린 뒤 중단합니다.
    pub async fn finish_output(mut self, grace: std::time::Duration) -> OutputCapture {
        for reader in self.readers.drain(..) {
            let abort = reader.abort_handle();
            if tokio::time::timeout(grace, reader).await.is_err() {
                abort.abort();
            }
        }
        self.output
            .lock()
            .map(|capture| capture.clone())
            .unwrap_or_default()
    }
}

async fn read_lines<R: AsyncRead + Unpin>(stream: R, output: Arc<Mutex<OutputCapture>>) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(target: "faultline::driver", "{line}");
                if let Ok(mut capture) = output.lock() {
                    capture.push(line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "stopped reading driver output");
                break;
            }
        }
    }
}

/// 스크립트 경로를 사람이 읽을 이름으로 바꿉니다.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
