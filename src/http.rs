//! 모델 백엔드 HTTP 공통 처리
//!
//! JSON POST + 재시도(지수 백오프) 루프입니다.
//! 429와 5xx, 연결/타임아웃 오류만 재시도하고 나머지는 즉시 실패합니다.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Serialize;

/// 최대 재시도 횟수
pub(crate) const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 1000;

/// 타임아웃이 설정된 HTTP 클라이언트 생성
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("pagerag/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// JSON 요청을 보내고 성공 응답 본문을 문자열로 반환
///
/// `bearer`가 있으면 Authorization 헤더로 전송합니다.
pub(crate) async fn post_json<T: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &T,
) -> Result<String> {
    let mut last_error: Option<anyhow::Error> = None;

    for attempt in 0..=MAX_RETRIES {
        let mut request = client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token.trim());
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                let text = response
                    .text()
                    .await
                    .context("Failed to read response body")?;

                if status.is_success() {
                    return Ok(text);
                }

                if !should_retry(status) {
                    anyhow::bail!("{} returned {}: {}", url, status, text);
                }
                last_error = Some(anyhow::anyhow!("{} returned {}: {}", url, status, text));
            }
            Err(e) => {
                if !(e.is_timeout() || e.is_connect() || e.is_request()) {
                    return Err(anyhow::Error::new(e).context(format!("Request to {} failed", url)));
                }
                last_error = Some(anyhow::Error::new(e).context(format!("Request to {} failed", url)));
            }
        }

        if attempt < MAX_RETRIES {
            let backoff = retry_backoff(attempt);
            tracing::warn!(
                "Request to {} failed, retrying in {:?} (attempt {}/{})",
                url,
                backoff,
                attempt + 1,
                MAX_RETRIES
            );
            tokio::time::sleep(backoff).await;
        }
    }

    Err(last_error
        .unwrap_or_else(|| anyhow::anyhow!("Request failed after {} retries", MAX_RETRIES)))
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt.min(5)))
}
