//! Real loopback integration tests for the DNS server.
//!
//! These tests start `DnsServer::run()` on 127.0.0.1 with ephemeral ports
//! and send real UDP and TCP queries to it. No privileges are required.

mod common;

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::RecordType;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use vpnkit_bridge::{DnsServer, NetworkStack};

use common::*;

// =========================================================================
// Infrastructure
// =========================================================================

/// Network stack binding ephemeral loopback ports and remembering them.
#[derive(Default)]
struct EphemeralNetwork {
    udp: Mutex<Option<SocketAddr>>,
    tcp: Mutex<Option<SocketAddr>>,
}

#[async_trait]
impl NetworkStack for EphemeralNetwork {
    async fn listen_tcp(&self, _addr: SocketAddr) -> io::Result<TcpListener> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        *self.tcp.lock().unwrap() = Some(listener.local_addr()?);
        Ok(listener)
    }

    async fn dial_udp(&self, _addr: SocketAddr) -> io::Result<UdpSocket> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        *self.udp.lock().unwrap() = Some(socket.local_addr()?);
        Ok(socket)
    }
}

/// A test DNS server running on ephemeral ports.
struct TestServer {
    udp: SocketAddr,
    tcp: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), vpnkit_bridge::Error>>,
}

impl TestServer {
    async fn start() -> Self {
        let server = DnsServer::with_resolver(test_dns_config(), Arc::new(test_resolver()))
            .expect("failed to create DnsServer");
        let network = Arc::new(EphemeralNetwork::default());
        let shutdown = CancellationToken::new();

        let task = {
            let network = network.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { server.run(network.as_ref(), shutdown).await })
        };

        // Wait for both sockets to be bound.
        let (udp, tcp) = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let udp = *network.udp.lock().unwrap();
                let tcp = *network.tcp.lock().unwrap();
                if let (Some(udp), Some(tcp)) = (udp, tcp) {
                    return (udp, tcp);
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("server did not bind");

        // Give the server a moment to start accepting packets.
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            udp,
            tcp,
            shutdown,
            task,
        }
    }

    async fn stop(self) {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
            .expect("server returned an error");
    }
}

/// Send a DNS query over UDP and return the parsed response.
async fn query_udp(server: SocketAddr, name: &str, record_type: RecordType, id: u16) -> Message {
    let sock = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("failed to bind client socket");
    let query_bytes = build_query_bytes(&[(name, record_type)], id);

    sock.send_to(&query_bytes, server)
        .await
        .expect("failed to send query");

    let mut buf = vec![0u8; 4096];
    let len = tokio::time::timeout(Duration::from_secs(5), sock.recv(&mut buf))
        .await
        .expect("query timed out")
        .expect("failed to recv response");

    Message::from_vec(&buf[..len]).expect("failed to parse DNS response")
}

/// Send a DNS query over TCP (two-byte big-endian length prefix).
async fn query_tcp(server: SocketAddr, name: &str, record_type: RecordType, id: u16) -> Message {
    let mut stream = TcpStream::connect(server)
        .await
        .expect("failed to connect");
    let query_bytes = build_query_bytes(&[(name, record_type)], id);

    stream
        .write_all(&(query_bytes.len() as u16).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(&query_bytes).await.unwrap();

    let response = tokio::time::timeout(Duration::from_secs(5), async {
        let len = stream.read_u16().await?;
        let mut buf = vec![0u8; len as usize];
        stream.read_exact(&mut buf).await?;
        io::Result::Ok(buf)
    })
    .await
    .expect("query timed out")
    .expect("failed to read response");

    Message::from_vec(&response).expect("failed to parse DNS response")
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn loopback_udp_zone_answer() {
    let server = TestServer::start().await;

    let msg = query_udp(server.udp, "host.internal.", RecordType::A, 1).await;
    assert_eq!(msg.id(), 1);
    assert_a_response(&msg, &["192.168.1.1"]);

    server.stop().await;
}

#[tokio::test]
async fn loopback_udp_delegated_and_failed() {
    let server = TestServer::start().await;

    let msg = query_udp(server.udp, "example.com.", RecordType::A, 2).await;
    assert_a_response(&msg, &["123.123.123.123"]);

    let msg = query_udp(server.udp, "test.com.", RecordType::A, 3).await;
    assert_response_code(&msg, ResponseCode::NXDomain);

    server.stop().await;
}

#[tokio::test]
async fn loopback_tcp_zone_answer() {
    let server = TestServer::start().await;

    let msg = query_tcp(server.tcp, "anything.docker.", RecordType::A, 4).await;
    assert_eq!(msg.id(), 4);
    assert_a_response(&msg, &["192.168.127.254"]);

    server.stop().await;
}
