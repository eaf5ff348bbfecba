//! HTTP-backed implementations of the discovery traits.
//!
//! Both domains are fronted by a small discovery gateway speaking JSON
//! over HTTP; one client per domain wraps a shared [`reqwest::Client`]
//! and maps transport and status failures into [`DiscoveryError`].

use async_trait::async_trait;
use serde::Deserialize;

use crate::discovery::{
    DiscoveryError, DomainAIntrospect, DomainBIntrospect, ServiceEndpoint, SystemState,
    TopicEndpoint,
};

/// Domain A gateway client.
pub struct HttpDomainA {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDomainA {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: trim_base(base_url.into()),
        }
    }
}

#[derive(Deserialize)]
struct ServiceAddress {
    host: String,
    port: u16,
}

#[async_trait]
impl DomainAIntrospect for HttpDomainA {
    async fn system_state(&self, caller: &str) -> Result<SystemState, DiscoveryError> {
        let state = self
            .client
            .get(format!("{}/system_state", self.base_url))
            .query(&[("caller", caller)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(state)
    }

    async fn topic_types(&self) -> Result<Vec<(String, String)>, DiscoveryError> {
        let types = self
            .client
            .get(format!("{}/topic_types", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(types)
    }

    async fn lookup_service(&self, name: &str) -> Result<(String, u16), DiscoveryError> {
        let response = self
            .client
            .get(format!("{}/lookup_service", self.base_url))
            .query(&[("name", name)])
            .send()
            .await?;

        // The naming service answers 404 for names it has no record of.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DiscoveryError::UnknownService {
                name: name.to_string(),
            });
        }

        let address: ServiceAddress = response.error_for_status()?.json().await?;
        Ok((address.host, address.port))
    }
}

/// Domain B gateway client.
pub struct HttpDomainB {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDomainB {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: trim_base(base_url.into()),
        }
    }
}

#[async_trait]
impl DomainBIntrospect for HttpDomainB {
    async fn topic_endpoints(&self) -> Result<Vec<TopicEndpoint>, DiscoveryError> {
        let topics = self
            .client
            .get(format!("{}/topics", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(topics)
    }

    async fn service_endpoints(&self) -> Result<Vec<ServiceEndpoint>, DiscoveryError> {
        let services = self
            .client
            .get(format!("{}/services", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(services)
    }
}

fn trim_base(mut base: String) -> String {
    while base.ends_with('/') {
        base.pop();
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a loopback port.
    async fn serve_json_once(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = stream.read(&mut request).await.unwrap();

            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        });

        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_topic_endpoints_deserialized() {
        let base = serve_json_once(
            r#"[{"name":"/scan","types":["sensors/LaserScan"],"publisher_count":1,"subscriber_count":2}]"#,
        )
        .await;

        let client = HttpDomainB::new(reqwest::Client::new(), base);
        let topics = client.topic_endpoints().await.unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].name, "/scan");
        assert_eq!(topics[0].subscriber_count, 2);
    }

    #[tokio::test]
    async fn test_lookup_service_maps_not_found() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = stream.read(&mut request).await.unwrap();
            stream
                .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
        });

        let client = HttpDomainA::new(reqwest::Client::new(), format!("http://{addr}"));
        let err = client.lookup_service("/ghost").await.unwrap_err();
        assert!(matches!(err, DiscoveryError::UnknownService { .. }));
    }

    #[test]
    fn test_trailing_slash_trimmed_from_base_url() {
        let client = HttpDomainA::new(reqwest::Client::new(), "http://localhost:8000/");
        assert_eq!(client.base_url, "http://localhost:8000");
    }
}
