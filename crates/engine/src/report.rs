//! 결과 기록 -- JSON Lines 결과 로그와 재현 가능한 위반 기록
//!
//! 기록 실패는 트라이얼 판정을 바꾸지 않으므로 경고만 남깁니다.

use std::path::{Path, PathBuf};

use faultline_core::invariant::InvariantReference;
use faultline_core::plan::FailurePlan;
use faultline_core::result::TrialResult;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// 결과 기록기
#[derive(Debug, Clone, Default)]
pub struct ResultRecorder {
    result_log: Option<PathBuf>,
    violations_dir: Option<PathBuf>,
}

impl ResultRecorder {
    pub fn new(result_log: Option<PathBuf>, violations_dir: Option<PathBuf>) -> Self {
        Self {
            result_log,
            violations_dir,
        }
    }

    /// 결과를 기록합니다.
    ///
    /// 위반이고 계획이 있으면 위반 기록 파일을 만들고 그 경로를 반환합니다.
    pub async fn record(
        &self,
        result: &TrialResult,
        plan: Option<&FailurePlan>,
        invariant: Option<&InvariantReference>,
    ) -> Option<PathBuf> {
        if let Some(path) = &self.result_log {
            if let Err(e) = append_json_line(path, result).await {
                warn!(path = %path.display(), error = %e, "failed to append trial result");
            }
        }

        if !result.outcome.is_violation() {
            return None;
        }
        let (dir, plan) = match (&self.violations_dir, plan) {
            (Some(dir), Some(plan)) => (dir, plan),
            _ => return None,
        };
        let plan = match invariant {
            Some(invariant) => plan.with_invariant(invariant.clone()),
            None => plan.clone(),
        };
        match write_violation(dir, &plan, result).await {
            Ok(path) => {
                info!(path = %path.display(), trial_id = %result.trial_id, "violation recorded");
                Some(path)
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to record violation");
                None
            }
        }
    }
}

async fn append_json_line(path: &Path, result: &TrialResult) -> std::io::Result<()> {
    let mut line = serde_json::to_string(result).map_err(std::io::Error::other)?;
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

/// 계획 텍스트, 빈 줄, 드라이버 출력 순으로 씁니다. 그대로 재실행할 수 있습니다.
async fn write_violation(
    dir: &Path,
    plan: &FailurePlan,
    result: &TrialResult,
) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let name = format!(
        "{}-{}-{}.plan",
        slug(&plan.id),
        slug(&plan.invariant.name),
        result.trial_id
    );
    let path = dir.join(name);

    let mut content = plan.to_plan_text();
    content.push('\n');
    content.push_str(&format!("# {}\n", result.outcome));
    for line in &result.diagnostics.output_tail {
        content.push_str(line);
        content.push('\n');
    }
    tokio::fs::write(&path, content).await?;
    Ok(path)
}

/// 파일 이름에 쓸 수 있는 문자만 남깁니다.
fn slug(text: &str) -> String {
    let slug: String = text
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    if slug.is_empty() {
        "unnamed".to_owned()
    } else {
        slug
    }
}
