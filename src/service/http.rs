//! HTTP client for the onboarding-status endpoint
use async_trait::async_trait;
use log::debug;
use url::Url;

use super::StatusService;
use crate::config::ServiceSettings;
use crate::error::ServiceError;
use crate::models::DeviceStatus;

pub struct HttpStatusService {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpStatusService {
    pub fn new(settings: &ServiceSettings) -> Result<Self, ServiceError> {
        let base_url = Url::parse(&settings.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::NotABase(settings.base_url.clone()));
        }

        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;

        Ok(HttpStatusService { client, base_url })
    }

    /// `{base}/device/check?device_id={id}`
    pub fn check_url(&self, device_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("device").push("check");
        }
        url.query_pairs_mut().clear().append_pair("device_id", device_id);
        url
    }
}

#[async_trait]
impl StatusService for HttpStatusService {
    async fn check_device(&self, device_id: &str) -> Result<DeviceStatus, ServiceError> {
        let url = self.check_url(device_id);
        debug!("GET {}", url);

        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        debug!("Device check response: {}", body);

        DeviceStatus::from_json(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn settings(base_url: &str) -> ServiceSettings {
        ServiceSettings {
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Serve exactly one canned HTTP response and hand back the request line
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();

            request.lines().next().unwrap_or_default().to_string()
        });

        (format!("http://{}/api/fast", addr), handle)
    }

    #[test]
    fn check_url_appends_path_and_query() {
        let service = HttpStatusService::new(&settings("http://localhost/api/fast")).unwrap();
        assert_eq!(
            service.check_url("HELMET001").as_str(),
            "http://localhost/api/fast/device/check?device_id=HELMET001"
        );

        let service = HttpStatusService::new(&settings("http://localhost/api/fast/")).unwrap();
        assert_eq!(
            service.check_url("A B").as_str(),
            "http://localhost/api/fast/device/check?device_id=A+B"
        );
    }

    #[test]
    fn rejects_non_base_url() {
        assert!(matches!(
            HttpStatusService::new(&settings("mailto:ops@example.com")),
            Err(ServiceError::NotABase(_))
        ));
        assert!(HttpStatusService::new(&settings("not a url")).is_err());
    }

    #[tokio::test]
    async fn queries_device_status() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"exists":true,"onboarded":true,"baseline_metrics":{"mean_hr":70.0,"sdnn":50.0}}"#,
        )
        .await;

        let service = HttpStatusService::new(&settings(&base)).unwrap();
        let status = service.check_device("HELMET001").await.unwrap();

        assert!(status.onboarded);
        assert_eq!(status.baseline.unwrap().sdnn, 50.0);
        assert_eq!(
            server.await.unwrap(),
            "GET /api/fast/device/check?device_id=HELMET001 HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let (base, _server) = serve_once("500 Internal Server Error", "{}").await;

        let service = HttpStatusService::new(&settings(&base)).unwrap();
        assert!(matches!(
            service.check_device("HELMET001").await,
            Err(ServiceError::Http(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_service_fails() {
        // Bind then drop to get a port nobody listens on
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let service = HttpStatusService::new(&settings(&format!("http://{}", addr))).unwrap();

        assert!(matches!(
            service.check_device("HELMET001").await,
            Err(ServiceError::Http(_))
        ));
    }
}
