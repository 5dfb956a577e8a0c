//! 대상 레지스트리 -- 계획의 대상 이름을 PID와 주소로 해석합니다.
//!
//! PID 해석 순서:
//! 1. 계측 채널로 런타임에 등록된 PID
//! 2. 설정의 고정 `pid`
//! 3. 설정의 `pid_file` 내용

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::InjectorError;

/// 대상 명세
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// 계획에서 쓰이는 대상 이름
    pub name: String,
    /// 고정 PID
    pub pid: Option<u32>,
    /// PID 파일
    pub pid_file: Option<PathBuf>,
    /// 네트워크 주소 (host:port)
    pub address: Option<String>,
    /// 데이터 디렉토리
    pub data_dir: Option<PathBuf>,
}

impl TargetSpec {
    /// 이름만 있는 대상 명세를 생성합니다.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// core 설정에서 변환합니다. 빈 문자열 경로는 없는 것으로 봅니다.
    pub fn from_core(core: &faultline_core::config::TargetConfig) -> Self {
        let non_empty = |s: &Option<String>| s.as_ref().filter(|v| !v.is_empty()).cloned();
        Self {
            name: core.name.clone(),
            pid: core.pid,
            pid_file: non_empty(&core.pid_file).map(PathBuf::from),
            address: non_empty(&core.address),
            data_dir: non_empty(&core.data_dir).map(PathBuf::from),
        }
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }
}

/// 네트워크 차단 명령에 쓰이는 대상 주소
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    /// 대상 이름
    pub name: String,
    /// 호스트
    pub host: String,
    /// 포트
    pub port: u16,
}

impl Endpoint {
    /// `host:port` 문자열을 파싱합니다.
    pub fn parse(name: &str, address: &str) -> Result<Self, InjectorError> {
        let invalid = || InjectorError::Config {
            field: format!("targets.{name}.address"),
            reason: format!("'{address}' is not host:port"),
        };
        let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            name: name.to_owned(),
            host: host.to_owned(),
            port,
        })
    }
}

/// 대상 레지스트리
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    specs: HashMap<String, TargetSpec>,
    runtime: HashMap<String, u32>,
}

impl TargetRegistry {
    /// 정적 대상 목록으로 레지스트리를 생성합니다.
    pub fn new(specs: impl IntoIterator<Item = TargetSpec>) -> Self {
        Self {
            specs: specs.into_iter().map(|s| (s.name.clone(), s)).collect(),
            runtime: HashMap::new(),
        }
    }

    /// 런타임 PID를 등록합니다. 같은 이름의 이전 등록을 덮어씁니다.
    pub fn register(&mut self, name: impl Into<String>, pid: u32) {
        let name = name.into();
        debug!(target_name = %name, pid, "registered runtime target");
        self.runtime.insert(name, pid);
    }

    /// 런타임 등록을 모두 지웁니다 (트라이얼 사이).
    pub fn clear_runtime(&mut self) {
        self.runtime.clear();
    }

    /// 알려진 대상인지 여부
    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name) || self.runtime.contains_key(name)
    }

    /// 대상의 PID를 해석합니다.
    pub async fn resolve_pid(&self, name: &str) -> Result<u32, InjectorError> {
        if let Some(pid) = self.runtime.get(name) {
            return Ok(*pid);
        }
        let spec = self
            .specs
            .get(name)
            .ok_or_else(|| InjectorError::TargetNotFound(name.to_owned()))?;
        if let Some(pid) = spec.pid {
            return Ok(pid);
        }
        match &spec.pid_file {
            Some(path) => read_pid_file(name, path).await,
            None => Err(InjectorError::TargetNotFound(format!(
                "{name} (no pid, pid_file or runtime registration)"
            ))),
        }
    }

    /// 대상의 네트워크 주소를 해석합니다.
    pub fn endpoint(&self, name: &str) -> Result<Endpoint, InjectorError> {
        let spec = self
            .specs
            .get(name)
            .ok_or_else(|| InjectorError::TargetNotFound(name.to_owned()))?;
        let address = spec.address.as_deref().ok_or_else(|| InjectorError::Config {
            field: format!("targets.{name}.address"),
            reason: "partition needs an address for every involved target".to_owned(),
        })?;
        Endpoint::parse(name, address)
    }

    /// 손상 대상 경로를 해석합니다. 상대 경로는 대상의 데이터 디렉토리 기준입니다.
    pub fn resolve_path(&self, name: &str, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.specs.get(name).and_then(|s| s.data_dir.as_ref()) {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        }
    }
}

async fn read_pid_file(name: &str, path: &Path) -> Result<u32, InjectorError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        InjectorError::TargetNotFound(format!("{name} (pid file {}: {e})", path.display()))
    })?;
    content.trim().parse::<u32>().map_err(|_| {
        InjectorError::TargetNotFound(format!(
            "{name} (pid file {} does not hold a pid)",
            path.display()
        ))
    })
}
