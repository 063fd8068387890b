//! Shared test infrastructure for DNS integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{MessageRequest, MessageResponse};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

use vpnkit_bridge::config::RecordConfig;
use vpnkit_bridge::{DelegateResolver, DnsConfig, DnsHandler, ResolveError, ZoneConfig};

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
///
/// The response is serialized via `MessageResponse::destructive_emit()` and
/// stored as raw wire-format bytes, which can then be parsed with
/// `Message::from_vec()`.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(info)
    }
}

// --- FailingResponseHandler ---

/// Fails every send, as a client that went away would.
#[derive(Clone, Copy)]
pub struct FailingResponseHandler;

#[async_trait]
impl ResponseHandler for FailingResponseHandler {
    async fn send_response<'a>(
        &mut self,
        _response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
    }
}

// --- StaticResolver ---

/// Delegate answering from fixed tables. Unknown names fail.
#[derive(Default)]
pub struct StaticResolver {
    addresses: HashMap<String, Vec<IpAddr>>,
    name_servers: HashMap<String, Vec<Name>>,
    calls: Mutex<Vec<String>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_addresses(mut self, name: &str, addrs: &[&str]) -> Self {
        self.addresses.insert(
            name.to_string(),
            addrs.iter().map(|a| a.parse().unwrap()).collect(),
        );
        self
    }

    pub fn with_name_servers(mut self, name: &str, hosts: &[&str]) -> Self {
        self.name_servers.insert(
            name.to_string(),
            hosts.iter().map(|h| Name::from_ascii(h).unwrap()).collect(),
        );
        self
    }

    /// Names looked up so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DelegateResolver for StaticResolver {
    async fn lookup_addresses(&self, name: &Name) -> Result<Vec<IpAddr>, ResolveError> {
        let key = name.to_ascii();
        self.calls.lock().unwrap().push(key.clone());
        self.addresses
            .get(&key)
            .cloned()
            .ok_or_else(|| ResolveError::new(key, "no such host"))
    }

    async fn lookup_name_servers(&self, name: &Name) -> Result<Vec<Name>, ResolveError> {
        let key = name.to_ascii();
        self.calls.lock().unwrap().push(key.clone());
        self.name_servers
            .get(&key)
            .cloned()
            .ok_or_else(|| ResolveError::new(key, "no such host"))
    }
}

/// Delegate table used across the DNS tests.
pub fn test_resolver() -> StaticResolver {
    StaticResolver::new()
        .with_addresses("example.com.", &["123.123.123.123"])
        .with_addresses("ipv6.com.", &["2001:db8::1"])
        .with_addresses("dual.com.", &["2001:db8::1", "10.0.0.7"])
        .with_name_servers("example.com.", &["a.iana-servers.net."])
}

// --- Config builders ---

pub fn exact(name: &str, ip: &str) -> RecordConfig {
    RecordConfig {
        name: Some(name.to_string()),
        regexp: None,
        ip: ip.parse().unwrap(),
    }
}

pub fn pattern(regexp: &str, ip: &str) -> RecordConfig {
    RecordConfig {
        name: None,
        regexp: Some(regexp.to_string()),
        ip: ip.parse().unwrap(),
    }
}

pub fn zone(name: &str, default_ip: Option<&str>, records: Vec<RecordConfig>) -> ZoneConfig {
    ZoneConfig {
        name: name.to_string(),
        default_ip: default_ip.map(|ip| ip.parse().unwrap()),
        records,
    }
}

/// Zones used across the DNS tests: one with a catch-all address, one without.
pub fn test_dns_config() -> DnsConfig {
    DnsConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        zones: vec![
            zone(
                "internal.",
                None,
                vec![exact("host", "192.168.1.1"), pattern("^web-\\d+$", "192.168.1.10")],
            ),
            zone("docker.", Some("192.168.127.254"), vec![]),
        ],
        ..DnsConfig::default()
    }
}

pub fn build_handler(config: &DnsConfig, resolver: Arc<dyn DelegateResolver>) -> DnsHandler {
    let zones = config.compile_zones().expect("failed to compile zones");
    DnsHandler::new(zones, resolver)
}

// --- Query/Request construction ---

/// Build wire-format bytes for a DNS message with one question per entry.
pub fn build_query_bytes(questions: &[(&str, RecordType)], id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    for (name, record_type) in questions {
        let mut query = Query::new();
        query.set_name(Name::from_ascii(name).unwrap());
        query.set_query_type(*record_type);
        query.set_query_class(DNSClass::IN);
        msg.add_query(query);
    }
    msg.to_vec().unwrap()
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

/// Build a full `Request` from a guest address.
pub fn build_request(questions: &[(&str, RecordType)], id: u16) -> Request {
    let bytes = build_query_bytes(questions, id);
    let msg = parse_message_request(&bytes);
    let src: SocketAddr = "192.168.127.2:40000".parse().unwrap();
    Request::new(msg, src, Protocol::Udp)
}

// --- Response helpers ---

/// Execute a message through the handler and return the parsed response.
pub async fn execute_query(
    handler: &DnsHandler,
    questions: &[(&str, RecordType)],
    id: u16,
) -> Message {
    let request = build_request(questions, id);
    let response_handle = TestResponseHandler::new();
    handler.handle_request(&request, response_handle.clone()).await;
    response_handle.into_message()
}

/// Extract A addresses from a response, in answer order.
pub fn extract_a_ips(msg: &Message) -> Vec<Ipv4Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(Ipv4Addr::from(*a)),
            _ => None,
        })
        .collect()
}

/// Extract NS hosts from a response.
pub fn extract_ns_hosts(msg: &Message) -> Vec<String> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::NS(ns) => Some(ns.0.to_ascii()),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}

/// Assert response is successful with exactly the expected A addresses.
pub fn assert_a_response(msg: &Message, expected_ips: &[&str]) {
    assert_response_code(msg, ResponseCode::NoError);
    let actual = extract_a_ips(msg);
    let expected: Vec<Ipv4Addr> = expected_ips.iter().map(|ip| ip.parse().unwrap()).collect();
    assert_eq!(
        actual, expected,
        "A records mismatch.\nactual:   {:?}\nexpected: {:?}",
        actual, expected
    );
}
