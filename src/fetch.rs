// src/fetch.rs
// =============================================================================
// The shared HTTP client for one session.
//
// reqwest already pools and reuses connections, but it has no ceiling on how
// many connections it opens. We wrap it with two gates:
// - a global gate (default 50 connections across all hosts)
// - one gate per host (default 10), so a single origin is never flooded
//
// A caller gets back the response together with its connection permits. The
// permits must stay alive while the body is being read, so they travel with
// the response and are released when both are dropped.
//
// Rust concepts:
// - DashMap: a HashMap that many tasks can use at once
// - Clone on Client: cheap, it is an Arc internally
// =============================================================================

use std::sync::Arc;

use dashmap::DashMap;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;
use url::Url;

use crate::config::SessionConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[error("connection gate closed")]
    PoolClosed,
}

/// Connection-limited HTTP client. Cheap to clone; clones share the gates.
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    connections: Arc<Semaphore>,
    max_connections: usize,
    per_host: Arc<DashMap<String, Arc<Semaphore>>>,
    max_per_host: usize,
}

// Held for as long as the response (and its body) is in use.
#[derive(Debug)]
pub struct ConnectionPermits {
    _host: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
}

#[derive(Debug)]
pub struct FetchResponse {
    pub response: Response,
    pub permits: ConnectionPermits,
}

impl FetchClient {
    // Builds the pooled client from the session configuration.
    //
    // Timeouts: connect and read are independent, there is no total timeout
    // so large videos are not cut off as long as bytes keep flowing.
    pub fn new(config: &SessionConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.max_connections_per_host)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            connections: Arc::new(Semaphore::new(config.max_connections.max(1))),
            max_connections: config.max_connections.max(1),
            per_host: Arc::new(DashMap::new()),
            max_per_host: config.max_connections_per_host.max(1),
        })
    }

    // Sends a GET request once a connection slot is free for the URL's host.
    //
    // The host gate is taken first so a task waiting on a busy host does not
    // sit on a global slot other hosts could use.
    pub async fn get(&self, url: &Url, headers: HeaderMap) -> Result<FetchResponse, FetchError> {
        let host_gate = self.host_gate(url);
        let host = host_gate
            .acquire_owned()
            .await
            .map_err(|_| FetchError::PoolClosed)?;
        let global = Arc::clone(&self.connections)
            .acquire_owned()
            .await
            .map_err(|_| FetchError::PoolClosed)?;

        trace!(url = %url, "sending GET");
        let response = self
            .client
            .get(url.clone())
            .headers(headers)
            .send()
            .await?;

        Ok(FetchResponse {
            response,
            permits: ConnectionPermits {
                _host: host,
                _global: global,
            },
        })
    }

    /// Connections currently checked out across all hosts.
    pub fn connections_in_use(&self) -> usize {
        self.max_connections - self.connections.available_permits()
    }

    fn host_gate(&self, url: &Url) -> Arc<Semaphore> {
        // Don't hold the map entry across an await
        let entry = self
            .per_host
            .entry(host_key(url))
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_host)));
        Arc::clone(entry.value())
    }
}

// "host:port", with the scheme's default port filled in so that
// http://a.test and http://a.test:80 share one gate.
fn host_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port_or_known_default() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_host_key_fills_default_port() {
        let a = Url::parse("http://a.test/x.jpg").unwrap();
        let b = Url::parse("http://a.test:80/y.jpg").unwrap();
        let c = Url::parse("https://a.test/z.jpg").unwrap();
        assert_eq!(host_key(&a), "a.test:80");
        assert_eq!(host_key(&a), host_key(&b));
        assert_eq!(host_key(&c), "a.test:443");
    }

    #[tokio::test]
    async fn test_permits_follow_response_lifetime() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg"))
            .mount(&server)
            .await;

        let client = FetchClient::new(&SessionConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/a.jpg", server.uri())).unwrap();

        let fetched = client.get(&url, HeaderMap::new()).await.unwrap();
        assert_eq!(fetched.response.status().as_u16(), 200);
        assert_eq!(client.connections_in_use(), 1);

        drop(fetched);
        assert_eq!(client.connections_in_use(), 0);
    }

    #[tokio::test]
    async fn test_keep_alive_reuses_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);

        // Answers every request on a connection until the client hangs up
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut pending = Vec::new();
                    let mut buf = [0u8; 1024];
                    loop {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => pending.extend_from_slice(&buf[..n]),
                        }
                        while let Some(end) = pending.windows(4).position(|w| w == b"\r\n\r\n") {
                            pending.drain(..end + 4);
                            let reply = "HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\njpeg";
                            if socket.write_all(reply.as_bytes()).await.is_err() {
                                return;
                            }
                        }
                    }
                });
            }
        });

        let client = FetchClient::new(&SessionConfig::default()).unwrap();
        let url = Url::parse(&format!("http://{}/a.jpg", addr)).unwrap();

        for _ in 0..2 {
            let fetched = client.get(&url, HeaderMap::new()).await.unwrap();
            assert_eq!(&fetched.response.bytes().await.unwrap()[..], b"jpeg");
            // Give the finished connection time to go back to the pool
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        assert_eq!(accepted.load(Ordering::SeqCst), 1);
        assert_eq!(client.connections_in_use(), 0);
    }

    #[tokio::test]
    async fn test_per_host_gate_is_shared() {
        let config = SessionConfig {
            max_connections_per_host: 1,
            ..SessionConfig::default()
        };
        let client = FetchClient::new(&config).unwrap();
        let url = Url::parse("http://a.test/x.jpg").unwrap();

        let gate = client.host_gate(&url);
        let _held = gate.clone().acquire_owned().await.unwrap();

        assert_eq!(client.host_gate(&url).available_permits(), 0);
    }
}
