//! Gateway-backed platform adapter
//!
//! The chat-platform connection itself lives in a gateway sidecar. This
//! adapter implements [`Platform`] by calling the sidecar's HTTP API:
//!
//! | call | request |
//! | --- | --- |
//! | connect voice | `POST /workspaces/{ws}/voice` `{channel}` → `{connection_id}` |
//! | play / pause / resume / stop | `POST /voice/{conn}/{op}` |
//! | disconnect | `DELETE /voice/{conn}` |
//! | notice | `POST /workspaces/{ws}/messages` `{title, body}` |
//! | ban / unban | `PUT` / `DELETE /workspaces/{ws}/bans/{subject}` |
//! | kick | `POST /workspaces/{ws}/kicks/{subject}` `{reason}` |
//! | workspaces | `GET /workspaces` → `[id, ...]` |
//!
//! Status mapping: 404 → `NotFound`, 403 → `Forbidden`, 429 → `RateLimited`
//! (with `Retry-After`), 410 on a voice call → `ConnectionLost`, anything
//! else non-2xx → `Transport`.

use crate::error::PlatformError;
use crate::platform::{Notice, Platform, PlatformResult, VoiceConnection};
use crate::playback::Track;
use async_trait::async_trait;
use beabot_common::config::GatewayConfig;
use beabot_common::{ChannelId, SubjectId, WorkspaceId};
use reqwest::{Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const USER_AGENT: &str = concat!("beabot/", env!("CARGO_PKG_VERSION"));

#[derive(Serialize)]
struct ConnectRequest {
    channel: ChannelId,
}

#[derive(Deserialize)]
struct ConnectResponse {
    connection_id: String,
}

#[derive(Serialize)]
struct PlayRequest<'a> {
    track_id: Uuid,
    file_path: &'a str,
    title: &'a str,
}

#[derive(Serialize)]
struct ReasonRequest<'a> {
    reason: &'a str,
}

/// HTTP client for the gateway sidecar
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> PlatformResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> PlatformResult<Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "Gateway request");

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        check_status(response).await
    }
}

#[async_trait]
impl Platform for HttpGateway {
    async fn connect_voice(
        &self,
        workspace: WorkspaceId,
        channel: ChannelId,
    ) -> PlatformResult<Box<dyn VoiceConnection>> {
        let response = self
            .call(
                Method::POST,
                &format!("/workspaces/{}/voice", workspace),
                Some(&ConnectRequest { channel }),
            )
            .await?;
        let body: ConnectResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Transport(format!("bad connect response: {}", e)))?;

        Ok(Box::new(GatewayVoice {
            gateway: self.clone(),
            connection_id: body.connection_id,
            channel,
        }))
    }

    async fn send(&self, workspace: WorkspaceId, notice: Notice) -> PlatformResult<()> {
        self.call(
            Method::POST,
            &format!("/workspaces/{}/messages", workspace),
            Some(&notice),
        )
        .await?;
        Ok(())
    }

    async fn ban(&self, subject: SubjectId, workspace: WorkspaceId, reason: &str) -> PlatformResult<()> {
        self.call(
            Method::PUT,
            &format!("/workspaces/{}/bans/{}", workspace, subject),
            Some(&ReasonRequest { reason }),
        )
        .await?;
        Ok(())
    }

    async fn unban(&self, subject: SubjectId, workspace: WorkspaceId) -> PlatformResult<()> {
        self.call::<()>(
            Method::DELETE,
            &format!("/workspaces/{}/bans/{}", workspace, subject),
            None,
        )
        .await?;
        Ok(())
    }

    async fn kick(&self, subject: SubjectId, workspace: WorkspaceId, reason: &str) -> PlatformResult<()> {
        self.call(
            Method::POST,
            &format!("/workspaces/{}/kicks/{}", workspace, subject),
            Some(&ReasonRequest { reason }),
        )
        .await?;
        Ok(())
    }

    async fn workspaces(&self) -> PlatformResult<Vec<WorkspaceId>> {
        let response = self.call::<()>(Method::GET, "/workspaces", None).await?;
        response
            .json()
            .await
            .map_err(|e| PlatformError::Transport(format!("bad workspace list: {}", e)))
    }
}

/// Voice connection held open by the gateway
struct GatewayVoice {
    gateway: HttpGateway,
    connection_id: String,
    channel: ChannelId,
}

impl GatewayVoice {
    async fn op(&self, op: &str) -> PlatformResult<()> {
        self.gateway
            .call::<()>(
                Method::POST,
                &format!("/voice/{}/{}", self.connection_id, op),
                None,
            )
            .await
            .map_err(voice_error)?;
        Ok(())
    }
}

#[async_trait]
impl VoiceConnection for GatewayVoice {
    fn channel(&self) -> ChannelId {
        self.channel
    }

    async fn play(&mut self, track: &Track) -> PlatformResult<()> {
        let file_path = track.file_path.to_string_lossy();
        self.gateway
            .call(
                Method::POST,
                &format!("/voice/{}/play", self.connection_id),
                Some(&PlayRequest {
                    track_id: track.id,
                    file_path: &file_path,
                    title: &track.title,
                }),
            )
            .await
            .map_err(voice_error)?;
        Ok(())
    }

    async fn pause(&mut self) -> PlatformResult<()> {
        self.op("pause").await
    }

    async fn resume(&mut self) -> PlatformResult<()> {
        self.op("resume").await
    }

    async fn stop(&mut self) -> PlatformResult<()> {
        self.op("stop").await
    }

    async fn disconnect(&mut self) -> PlatformResult<()> {
        match self
            .gateway
            .call::<()>(
                Method::DELETE,
                &format!("/voice/{}", self.connection_id),
                None,
            )
            .await
        {
            // Already gone
            Err(PlatformError::NotFound(_)) => Ok(()),
            other => other.map(|_| ()),
        }
    }
}

/// A voice connection the gateway no longer knows about was dropped
fn voice_error(err: PlatformError) -> PlatformError {
    match err {
        PlatformError::NotFound(msg) => PlatformError::ConnectionLost(msg),
        other => other,
    }
}

async fn check_status(response: Response) -> PlatformResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();
    Err(map_status(status, retry_after, body))
}

/// Translate a non-success gateway status into a platform error
pub fn map_status(status: StatusCode, retry_after: Option<Duration>, body: String) -> PlatformError {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        body
    };
    match status {
        StatusCode::NOT_FOUND => PlatformError::NotFound(detail),
        StatusCode::FORBIDDEN => PlatformError::Forbidden(detail),
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimited { retry_after },
        StatusCode::GONE => PlatformError::ConnectionLost(detail),
        _ => PlatformError::Transport(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_status() {
        assert_eq!(
            map_status(StatusCode::NOT_FOUND, None, "unknown ban".into()),
            PlatformError::NotFound("unknown ban".into())
        );
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, None, String::new()),
            PlatformError::Forbidden(_)
        ));
        assert_eq!(
            map_status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(3)), String::new()),
            PlatformError::RateLimited {
                retry_after: Some(Duration::from_secs(3))
            }
        );
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY, None, String::new()),
            PlatformError::Transport(_)
        ));
    }

    #[test]
    fn test_voice_not_found_means_connection_lost() {
        assert!(matches!(
            voice_error(PlatformError::NotFound("conn".into())),
            PlatformError::ConnectionLost(_)
        ));
        assert!(matches!(
            voice_error(PlatformError::Forbidden("x".into())),
            PlatformError::Forbidden(_)
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = GatewayConfig {
            base_url: "http://localhost:9000/".to_string(),
            ..Default::default()
        };
        let gateway = HttpGateway::new(&config).unwrap();
        assert_eq!(gateway.base_url(), "http://localhost:9000");
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_transport_error() {
        let config = GatewayConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            request_timeout_secs: 2,
        };
        let gateway = HttpGateway::new(&config).unwrap();
        assert!(matches!(
            gateway.workspaces().await,
            Err(PlatformError::Transport(_))
        ));
    }
}
