use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::RcrainfoConfig;
use crate::error::{Result, SyncError};
use crate::search::SearchQuery;

/// Status and decoded body of an RCRAInfo call
#[derive(Clone, Debug)]
pub struct RcraResponse {
    pub status: u16,
    pub body: Value,
}

impl RcraResponse {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The two RCRAInfo e-Manifest operations synchronization depends on
#[async_trait]
pub trait RcrainfoPort: Send + Sync {
    async fn get_manifest(&self, mtn: &str) -> Result<RcraResponse>;
    async fn search_manifests(&self, query: &SearchQuery) -> Result<RcraResponse>;
}

pub struct ReqwestRcrainfo {
    client: reqwest::Client,
    base_url: String,
    api_id: Option<String>,
    api_key: Option<String>,
    token: Mutex<Option<String>>,
}

impl std::fmt::Debug for ReqwestRcrainfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRcrainfo")
            .field("base_url", &self.base_url)
            .field("api_id", &self.api_id)
            .finish()
    }
}

impl ReqwestRcrainfo {
    pub fn new(config: &RcrainfoConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_id: config.api_id.clone(),
            api_key: config.api_key.clone(),
            token: Mutex::new(None),
        })
    }

    /// Session token for the configured API credentials, fetched once.
    /// Without credentials requests go out unauthenticated.
    async fn token(&self) -> Result<Option<String>> {
        let (Some(api_id), Some(api_key)) = (&self.api_id, &self.api_key) else {
            return Ok(None);
        };
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(Some(token.clone()));
        }

        let url = format!("{}/v1/auth/{}/{}", self.base_url, api_id, api_key);
        let response = into_response(self.client.get(&url).send().await?).await?;
        if !response.is_ok() {
            return Err(SyncError::Auth(format!(
                "status {}: {}",
                response.status, response.body
            )));
        }
        let token = response
            .body
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::Auth("response carried no token".to_string()))?
            .to_string();
        debug!("obtained RCRAInfo session token for {}", api_id);
        *cached = Some(token.clone());
        Ok(Some(token))
    }

    async fn authorized(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        Ok(match self.token().await? {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        })
    }

    /// Send the request built by `build`. RCRAInfo session tokens expire, so
    /// a 401 on an authenticated call drops the cached token and the request
    /// is sent once more with a fresh one.
    async fn send(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder + Send + Sync,
    ) -> Result<RcraResponse> {
        let response = into_response(self.authorized(build()).await?.send().await?).await?;
        let rejected = response.status == StatusCode::UNAUTHORIZED.as_u16();
        if !rejected || self.token.lock().await.take().is_none() {
            return Ok(response);
        }

        warn!("RCRAInfo rejected the session token, authenticating again");
        into_response(self.authorized(build()).await?.send().await?).await
    }
}

#[async_trait]
impl RcrainfoPort for ReqwestRcrainfo {
    async fn get_manifest(&self, mtn: &str) -> Result<RcraResponse> {
        let url = format!("{}/v1/emanifest/manifest/{}", self.base_url, mtn);
        self.send(|| self.client.get(&url)).await
    }

    async fn search_manifests(&self, query: &SearchQuery) -> Result<RcraResponse> {
        let url = format!("{}/v1/emanifest/search", self.base_url);
        self.send(|| self.client.post(&url).json(query)).await
    }
}

async fn into_response(resp: reqwest::Response) -> Result<RcraResponse> {
    let status = resp.status().as_u16();
    let bytes = resp.bytes().await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    Ok(RcraResponse { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer one connection per reply, in order. The handle yields the
    /// request line and authorization header of every request served.
    async fn scripted_server(replies: Vec<(u16, Value)>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for (status, body) in replies {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                let text = String::from_utf8_lossy(&request).into_owned();
                let line = text.lines().next().unwrap_or_default().to_string();
                let auth = text
                    .lines()
                    .find(|l| l.to_ascii_lowercase().starts_with("authorization:"))
                    .unwrap_or_default()
                    .to_string();
                seen.push(format!("{} | {}", line, auth));

                let body = body.to_string();
                let reply = format!(
                    "HTTP/1.1 {} Scripted\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(reply.as_bytes()).await.unwrap();
                stream.shutdown().await.unwrap();
            }
            seen
        });
        (base_url, handle)
    }

    fn credentials(base_url: String) -> RcrainfoConfig {
        RcrainfoConfig {
            base_url,
            api_id: Some("id".to_string()),
            api_key: Some("key".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn expired_token_is_renewed_once() {
        let (base_url, server) = scripted_server(vec![
            (200, json!({ "token": "first" })),
            (401, json!({ "message": "token expired" })),
            (200, json!({ "token": "second" })),
            (200, json!({ "manifestTrackingNumber": "123456789ELC" })),
        ])
        .await;
        let client = ReqwestRcrainfo::new(&credentials(base_url)).unwrap();

        let response = client.get_manifest("123456789ELC").await.unwrap();
        assert!(response.is_ok());
        assert_eq!(response.body["manifestTrackingNumber"], "123456789ELC");

        let seen = server.await.unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen[0].starts_with("GET /v1/auth/id/key "));
        assert!(seen[1].starts_with("GET /v1/emanifest/manifest/123456789ELC "));
        assert!(seen[1].contains("Bearer first"));
        assert!(seen[2].starts_with("GET /v1/auth/id/key "));
        assert!(seen[3].contains("Bearer second"));
        assert_eq!(client.token().await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn unauthenticated_401_is_returned_as_is() {
        let (base_url, server) =
            scripted_server(vec![(401, json!({ "message": "no token" }))]).await;
        let config = RcrainfoConfig {
            base_url,
            ..Default::default()
        };
        let client = ReqwestRcrainfo::new(&config).unwrap();

        let response = client.get_manifest("123456789ELC").await.unwrap();
        assert_eq!(response.status, 401);
        assert_eq!(server.await.unwrap().len(), 1);
    }

    #[test]
    fn only_2xx_is_ok() {
        let response = |status| RcraResponse {
            status,
            body: Value::Null,
        };
        assert!(response(200).is_ok());
        assert!(response(204).is_ok());
        assert!(!response(404).is_ok());
        assert!(!response(500).is_ok());
    }

    #[test]
    fn base_url_is_normalized() {
        let config = RcrainfoConfig {
            base_url: "https://example.test/rest/".to_string(),
            ..Default::default()
        };
        let client = ReqwestRcrainfo::new(&config).unwrap();
        assert_eq!(client.base_url, "https://example.test/rest");
    }

    #[tokio::test]
    async fn no_credentials_means_no_token() {
        let client = ReqwestRcrainfo::new(&RcrainfoConfig::default()).unwrap();
        assert_eq!(client.token().await.unwrap(), None);
    }
}
