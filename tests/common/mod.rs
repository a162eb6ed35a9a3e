//! Test utilities and mocks for S2S
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use s2s::config::{Config, Credentials};
use s2s::{RelayContext, RelayServer, Resolve};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

pub const USERNAME: &str = "user";
pub const PASSWORD: &str = "pass";

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// DNS answers fixed up front
#[derive(Debug, Default)]
pub struct StaticResolver {
    records: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, host: &str, ips: &[&str]) -> Self {
        self.records.insert(
            host.to_string(),
            ips.iter().map(|ip| ip.parse().unwrap()).collect(),
        );
        self
    }
}

#[async_trait]
impl Resolve for StaticResolver {
    async fn lookup(&self, host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
        self.records
            .get(host)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "NXDOMAIN"))
    }
}

/// One CONNECT received by the fake upstream
#[derive(Debug)]
pub struct UpstreamRequest {
    /// Raw address bytes: ATYP, address and port
    pub addr: Vec<u8>,
    /// The tunnel toward the "destination"
    pub stream: TcpStream,
}

/// Unauthenticated upstream SOCKS5 proxy
///
/// Answers every CONNECT with `reply` and hands successful tunnels to the
/// test through [`FakeUpstream::next`].
pub struct FakeUpstream {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    tunnels: mpsc::Receiver<UpstreamRequest>,
}

impl FakeUpstream {
    pub async fn start(reply: u8) -> Self {
        let (listener, addr) = create_test_listener().await;
        let accepted = Arc::new(AtomicUsize::new(0));
        let (tx, tunnels) = mpsc::channel(16);

        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Ok(request) = serve_connect(stream, reply).await {
                        let _ = tx.send(request).await;
                    }
                });
            }
        });

        FakeUpstream {
            addr,
            accepted,
            tunnels,
        }
    }

    /// Number of TCP connections the upstream has accepted
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Next established tunnel
    pub async fn next(&mut self) -> UpstreamRequest {
        tokio::time::timeout(Duration::from_secs(5), self.tunnels.recv())
            .await
            .expect("timed out waiting for upstream CONNECT")
            .expect("upstream stopped")
    }
}

async fn serve_connect(mut stream: TcpStream, reply: u8) -> io::Result<UpstreamRequest> {
    let mut head = [0u8; 2];
    stream.read_exact(&mut head).await?;
    let mut methods = vec![0u8; head[1] as usize];
    stream.read_exact(&mut methods).await?;
    assert!(methods.contains(&0x00), "upstream must be offered no-auth");
    stream.write_all(&[0x05, 0x00]).await?;

    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    assert_eq!(header[1], 0x01, "expected CONNECT");

    let addr_len = match header[3] {
        0x01 => 4,
        0x04 => 16,
        other => panic!("upstream expects literal addresses, got ATYP {}", other),
    };
    let mut addr = vec![header[3]];
    let mut rest = vec![0u8; addr_len + 2];
    stream.read_exact(&mut rest).await?;
    addr.extend_from_slice(&rest);

    stream
        .write_all(&[0x05, reply, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
        .await?;

    if reply != 0x00 {
        return Err(io::Error::new(io::ErrorKind::Other, "refused"));
    }
    Ok(UpstreamRequest { addr, stream })
}

/// Relay configuration pointing at `upstream` with the given allow-list
pub fn test_config(upstream: SocketAddr, ranges: &[&str]) -> Config {
    let mut config = Config {
        auth: Credentials {
            username: USERNAME.to_string(),
            password: PASSWORD.to_string(),
        },
        ..Default::default()
    };
    config.server.bind_addr = "127.0.0.1".to_string();
    config.upstream.host = upstream.ip().to_string();
    config.upstream.port = upstream.port();
    config.allow_list.ranges = ranges.iter().map(|r| r.to_string()).collect();
    config
}

/// Running relay plus the handle that stops it
pub struct TestRelay {
    pub addr: SocketAddr,
    shutdown_tx: broadcast::Sender<bool>,
}

impl TestRelay {
    pub async fn start(config: &Config, dns: StaticResolver) -> Self {
        let ctx = RelayContext::from_config(config)
            .unwrap()
            .with_dns(Arc::new(dns));
        let server = RelayServer::bind_with_context("127.0.0.1:0".parse().unwrap(), 128, ctx)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(server.run(shutdown_rx));

        TestRelay { addr, shutdown_tx }
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Client greeting offering the given methods
pub fn greeting(methods: &[u8]) -> Vec<u8> {
    let mut data = vec![0x05, methods.len() as u8];
    data.extend_from_slice(methods);
    data
}

/// RFC 1929 username/password request
pub fn user_pass(username: &str, password: &str) -> Vec<u8> {
    let mut data = vec![0x01, username.len() as u8];
    data.extend_from_slice(username.as_bytes());
    data.push(password.len() as u8);
    data.extend_from_slice(password.as_bytes());
    data
}

/// CONNECT request for a literal address
pub fn connect_addr(addr: SocketAddr) -> Vec<u8> {
    let mut data = vec![0x05, 0x01, 0x00];
    match addr.ip() {
        IpAddr::V4(ip) => {
            data.push(0x01);
            data.extend_from_slice(&ip.octets());
        }
        IpAddr::V6(ip) => {
            data.push(0x04);
            data.extend_from_slice(&ip.octets());
        }
    }
    data.extend_from_slice(&addr.port().to_be_bytes());
    data
}

/// CONNECT request for a domain name
pub fn connect_domain(host: &str, port: u16) -> Vec<u8> {
    let mut data = vec![0x05, 0x01, 0x00, 0x03, host.len() as u8];
    data.extend_from_slice(host.as_bytes());
    data.extend_from_slice(&port.to_be_bytes());
    data
}

/// Open a client connection and complete greeting plus authentication
pub async fn authenticated_client(relay: SocketAddr) -> TcpStream {
    let mut client = TcpStream::connect(relay).await.unwrap();

    client.write_all(&greeting(&[0x02])).await.unwrap();
    let mut method = [0u8; 2];
    client.read_exact(&mut method).await.unwrap();
    assert_eq!(method, [0x05, 0x02]);

    client
        .write_all(&user_pass(USERNAME, PASSWORD))
        .await
        .unwrap();
    let mut status = [0u8; 2];
    client.read_exact(&mut status).await.unwrap();
    assert_eq!(status, [0x01, 0x00]);

    client
}

/// Read the 10-byte CONNECT reply
pub async fn read_reply(client: &mut TcpStream) -> [u8; 10] {
    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    reply
}

/// Read until EOF, failing if it takes too long
pub async fn expect_eof(stream: &mut TcpStream) {
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest))
        .await
        .expect("stream was not closed")
        .unwrap();
    assert!(rest.is_empty(), "unexpected trailing bytes: {:?}", rest);
}
