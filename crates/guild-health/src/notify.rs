//! Alarm notification channels.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use bytes::Bytes;
use http_body_util::Full;
use serde::Serialize;
use tracing::{debug, warn};

use guild_state::AlarmState;

/// Payload delivered to every notifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmEvent {
    pub alarm: String,
    pub state: AlarmState,
    pub value: f64,
    pub threshold: f64,
    pub environment: String,
}

/// Callback invoked when an alarm trips.
pub type AlarmCallback = Arc<dyn Fn(AlarmEvent) -> BoxFuture + Send + Sync>;

pub type BoxFuture = std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>>;

/// Notifier that writes the event to the log.
pub fn log_notifier() -> AlarmCallback {
    Arc::new(|event: AlarmEvent| -> BoxFuture {
        warn!(
            alarm = %event.alarm,
            state = %event.state,
            value = event.value,
            threshold = event.threshold,
            environment = %event.environment,
            "ALARM notification"
        );
        Box::pin(async { Ok::<_, anyhow::Error>(()) })
    })
}

/// Notifier that POSTs the event as JSON to a plain-HTTP webhook.
pub fn webhook_notifier(url: &str, timeout: Duration) -> anyhow::Result<AlarmCallback> {
    let uri: http::Uri = url.parse().with_context(|| format!("invalid webhook url {url}"))?;
    if uri.scheme_str() != Some("http") {
        bail!("webhook url must use http: {url}");
    }
    if uri.host().is_none() {
        bail!("webhook url has no host: {url}");
    }

    Ok(Arc::new(move |event: AlarmEvent| -> BoxFuture {
        let uri = uri.clone();
        Box::pin(async move {
            let body = serde_json::to_vec(&event)?;
            tokio::time::timeout(timeout, post_json(&uri, body))
                .await
                .with_context(|| format!("webhook {uri} timed out"))?
        })
    }))
}

async fn post_json(uri: &http::Uri, body: Vec<u8>) -> anyhow::Result<()> {
    let host = uri.host().context("webhook url has no host")?;
    let port = uri.port_u16().unwrap_or(80);
    let address = format!("{host}:{port}");

    let stream = tokio::net::TcpStream::connect(&address)
        .await
        .with_context(|| format!("connecting to webhook {address}"))?;
    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let req = http::Request::builder()
        .method("POST")
        .uri(path)
        .header("host", address.as_str())
        .header("content-type", "application/json")
        .header("user-agent", "guild-health/0.1")
        .body(Full::new(Bytes::from(body)))?;

    let resp = sender.send_request(req).await?;
    if !resp.status().is_success() {
        bail!("webhook {uri} returned {}", resp.status());
    }
    debug!(%uri, status = %resp.status(), "webhook delivered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn event() -> AlarmEvent {
        AlarmEvent {
            alarm: "errors".to_string(),
            state: AlarmState::Alarm,
            value: 6.0,
            threshold: 5.0,
            environment: "test".to_string(),
        }
    }

    /// Accept one request, reply with `status_line`, and return the body.
    async fn one_shot_server(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hooks/alarm", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some((head, body)) = text.split_once("\r\n\r\n") {
                    let len = head
                        .lines()
                        .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length: ").map(str::to_string))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if body.len() >= len {
                        let reply = format!("{status_line}\r\ncontent-length: 0\r\n\r\n");
                        socket.write_all(reply.as_bytes()).await.unwrap();
                        return format!("{}\n{body}", head.lines().next().unwrap_or_default());
                    }
                }
                if n == 0 {
                    return text;
                }
            }
        });
        (url, handle)
    }

    #[tokio::test]
    async fn log_notifier_succeeds() {
        log_notifier()(event()).await.unwrap();
    }

    #[tokio::test]
    async fn webhook_posts_json_payload() {
        let (url, server) = one_shot_server("HTTP/1.1 204 No Content").await;
        let notifier = webhook_notifier(&url, Duration::from_secs(5)).unwrap();

        notifier(event()).await.unwrap();

        let received = server.await.unwrap();
        let (request_line, body) = received.split_once('\n').unwrap();
        assert_eq!(request_line, "POST /hooks/alarm HTTP/1.1");
        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(json["alarm"], "errors");
        assert_eq!(json["state"], "ALARM");
        assert_eq!(json["value"], 6.0);
        assert_eq!(json["threshold"], 5.0);
        assert_eq!(json["environment"], "test");
    }

    #[tokio::test]
    async fn webhook_non_2xx_is_an_error() {
        let (url, _server) = one_shot_server("HTTP/1.1 500 Internal Server Error").await;
        let notifier = webhook_notifier(&url, Duration::from_secs(5)).unwrap();
        assert!(notifier(event()).await.is_err());
    }

    #[tokio::test]
    async fn webhook_connection_refused_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let notifier = webhook_notifier(&format!("http://{addr}/"), Duration::from_secs(2)).unwrap();
        assert!(notifier(event()).await.is_err());
    }

    #[test]
    fn webhook_rejects_unsupported_urls() {
        assert!(webhook_notifier("https://alerts.example.com/hook", Duration::from_secs(1)).is_err());
        assert!(webhook_notifier("not a url", Duration::from_secs(1)).is_err());
        assert!(webhook_notifier("/relative/only", Duration::from_secs(1)).is_err());
    }
}
