//! DNS responder: zones first, delegate resolver for everything else.

use async_trait::async_trait;
use hickory_proto::op::{Header, LowerQuery, ResponseCode};
use hickory_proto::rr::rdata::{A, NS};
use hickory_proto::rr::{DNSClass, LowerName, Name, RData, Record, RecordType};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tracing::{debug, error, trace};

use crate::metrics::{self, QueryResult, Timer};
use crate::resolver::DelegateResolver;
use crate::zone::{self, MatchResult, Zone};

/// TTL of every synthesized record; clients should not cache.
const ANSWER_TTL: u32 = 0;

/// Answers and response code for one message.
#[derive(Debug, Clone)]
pub struct Response {
    /// Answers for every question, in question order.
    pub answers: Vec<Record>,
    /// `NXDomain` if any question failed, else `NoError`.
    pub response_code: ResponseCode,
}

/// DNS request handler over static zones and a delegate resolver.
///
/// Zones are read-only after construction, so queries never contend.
#[derive(Clone)]
pub struct DnsHandler {
    zones: Arc<[Zone]>,
    resolver: Arc<dyn DelegateResolver>,
}

impl DnsHandler {
    /// Create a handler serving `zones` in order.
    pub fn new(zones: Vec<Zone>, resolver: Arc<dyn DelegateResolver>) -> Self {
        Self {
            zones: zones.into(),
            resolver,
        }
    }

    /// Configured zones.
    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Answer every query of a message.
    ///
    /// Answers accumulate across queries. The response code is per message:
    /// once a query fails, later successes do not reset it.
    pub async fn respond(&self, queries: &[LowerQuery]) -> Response {
        let mut response = Response {
            answers: Vec::new(),
            response_code: ResponseCode::NoError,
        };

        for query in queries {
            if let Err(code) = self
                .answer(query.name(), query.query_type(), &mut response.answers)
                .await
            {
                response.response_code = code;
            }
        }

        response
    }

    async fn answer(
        &self,
        name: &LowerName,
        rtype: RecordType,
        answers: &mut Vec<Record>,
    ) -> Result<(), ResponseCode> {
        let timer = Timer::start();
        let rtype_str = rtype.to_string();
        let owner = Name::from(name.clone());
        let name_str = name.to_string();

        trace!(name = %name_str, rtype = %rtype_str, "DNS query");

        match zone::match_zones(&self.zones, &name_str) {
            MatchResult::NoZoneMatch => {}
            _ if rtype != RecordType::A => {
                debug!(name = %name_str, rtype = %rtype_str, "zone query for unsupported type");
                metrics::record_query(&rtype_str, QueryResult::Ignored, timer.elapsed());
                return Ok(());
            }
            MatchResult::RecordHit(ip) | MatchResult::DefaultHit(ip) => {
                debug!(name = %name_str, %ip, "zone answer");
                answers.push(a_record(owner, ip));
                metrics::record_query(&rtype_str, QueryResult::Zone, timer.elapsed());
                return Ok(());
            }
            MatchResult::NameError => {
                debug!(name = %name_str, "zone name error");
                metrics::record_query(&rtype_str, QueryResult::NxDomain, timer.elapsed());
                return Err(ResponseCode::NXDomain);
            }
        }

        match rtype {
            RecordType::NS => match self.resolver.lookup_name_servers(&owner).await {
                Ok(hosts) => {
                    debug!(name = %name_str, count = hosts.len(), "delegated NS answer");
                    answers.extend(hosts.into_iter().map(|host| ns_record(owner.clone(), host)));
                    metrics::record_query(&rtype_str, QueryResult::Delegated, timer.elapsed());
                    Ok(())
                }
                Err(e) => {
                    debug!(error = %e, "delegated NS lookup failed");
                    metrics::record_delegate_error(&rtype_str);
                    metrics::record_query(&rtype_str, QueryResult::NxDomain, timer.elapsed());
                    Err(ResponseCode::NXDomain)
                }
            },
            RecordType::A => match self.resolver.lookup_addresses(&owner).await {
                Ok(addrs) => {
                    let before = answers.len();
                    answers.extend(addrs.into_iter().filter_map(|addr| match addr {
                        IpAddr::V4(ip) => Some(a_record(owner.clone(), ip)),
                        IpAddr::V6(_) => None,
                    }));
                    debug!(name = %name_str, count = answers.len() - before, "delegated A answer");
                    metrics::record_query(&rtype_str, QueryResult::Delegated, timer.elapsed());
                    Ok(())
                }
                Err(e) => {
                    debug!(error = %e, "delegated A lookup failed");
                    metrics::record_delegate_error(&rtype_str);
                    metrics::record_query(&rtype_str, QueryResult::NxDomain, timer.elapsed());
                    Err(ResponseCode::NXDomain)
                }
            },
            _ => {
                trace!(name = %name_str, rtype = %rtype_str, "unsupported record type");
                metrics::record_query(&rtype_str, QueryResult::Ignored, timer.elapsed());
                Ok(())
            }
        }
    }
}

fn a_record(name: Name, ip: Ipv4Addr) -> Record {
    let mut record = Record::from_rdata(name, ANSWER_TTL, RData::A(A::from(ip)));
    record.set_dns_class(DNSClass::IN);
    record
}

fn ns_record(name: Name, host: Name) -> Record {
    let mut record = Record::from_rdata(name, ANSWER_TTL, RData::NS(NS(host)));
    record.set_dns_class(DNSClass::IN);
    record
}

#[async_trait]
impl RequestHandler for DnsHandler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        let response = self.respond(request.queries()).await;

        let mut header = Header::response_from_request(request.header());
        header.set_recursion_available(true);
        header.set_response_code(response.response_code);

        let message = MessageResponseBuilder::from_message_request(request).build(
            header,
            response.answers.iter(),
            &[],
            &[],
            &[],
        );

        match response_handle.send_response(message).await {
            Ok(info) => info,
            Err(e) => {
                error!(src = %request.src(), error = %e, "failed to send DNS response");
                header.into()
            }
        }
    }
}
