//! DNS protocol implementation.
//!
//! This module builds DNS questions, parses the answer section of responses
//! and performs the exchange with an upstream server over UDP, falling back to
//! TCP when the UDP answer comes back truncated.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

use crate::errors::ExchangeError;
use crate::utils::{encode_dns_name, read_name, read_u16, read_u32, skip_name};

/// Record type A.
pub const TYPE_A: u16 = 1;

/// Record type CNAME.
pub const TYPE_CNAME: u16 = 5;

/// Class IN.
pub const CLASS_IN: u16 = 1;

/// Largest UDP response we accept.
pub const MAX_UDP_RESPONSE: usize = 4096;

const HEADER_LEN: usize = 12;

/// Decoded RDATA of an answer record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    /// Target of a CNAME record, dot-terminated.
    Cname(String),
    /// Address of an A record.
    A(Ipv4Addr),
    /// Any other record type, kept only so callers can skip it.
    Other,
}

/// A resource record from the answer section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Owner name, dot-terminated.
    pub name: String,
    /// Record type.
    pub rtype: u16,
    /// Time-to-live in seconds.
    pub ttl: u32,
    /// Decoded record data.
    pub data: RecordData,
}

/// The parts of a DNS response the resolver cares about.
#[derive(Debug, Clone)]
pub struct Response {
    /// Transaction ID.
    pub id: u16,
    /// Whether the TC bit was set.
    pub truncated: bool,
    /// Response code from the header.
    pub rcode: u8,
    /// Answer section in wire order.
    pub answers: Vec<Answer>,
}

impl Response {
    /// Returns the first CNAME record of the answer section with its TTL.
    pub fn first_cname(&self) -> Option<(&str, u32)> {
        self.answers.iter().find_map(|answer| match &answer.data {
            RecordData::Cname(target) => Some((target.as_str(), answer.ttl)),
            _ => None,
        })
    }

    /// Returns the first A record address of the answer section.
    pub fn first_a(&self) -> Option<Ipv4Addr> {
        self.answers.iter().find_map(|answer| match answer.data {
            RecordData::A(addr) => Some(addr),
            _ => None,
        })
    }
}

/// Build a recursive query for `name`.
///
/// # Arguments
/// * `id` - The transaction ID.
/// * `name` - The name to ask for, with or without trailing dot.
/// * `qtype` - The query type.
///
/// # Returns
/// A `Result` containing the encoded query or an error if `name` is not a
/// valid DNS name.
pub fn build_query(id: u16, name: &str, qtype: u16) -> Result<Vec<u8>, ExchangeError> {
    let qname = encode_dns_name(name)
        .ok_or_else(|| ExchangeError::Malformed(format!("invalid query name: {name}")))?;

    let mut query = Vec::with_capacity(HEADER_LEN + qname.len() + 4);
    query.extend_from_slice(&id.to_be_bytes());
    query.extend_from_slice(&[0x01, 0x00]); // RD set
    query.extend_from_slice(&[0x00, 0x01]); // QDCOUNT
    query.extend_from_slice(&[0x00, 0x00]); // ANCOUNT
    query.extend_from_slice(&[0x00, 0x00]); // NSCOUNT
    query.extend_from_slice(&[0x00, 0x00]); // ARCOUNT
    query.extend_from_slice(&qname);
    query.extend_from_slice(&qtype.to_be_bytes());
    query.extend_from_slice(&CLASS_IN.to_be_bytes());
    Ok(query)
}

/// Parse the header and answer section of a DNS response.
///
/// Authority and additional sections are not read.
pub fn parse_response(packet: &[u8]) -> Result<Response, ExchangeError> {
    let malformed = |what: &str| ExchangeError::Malformed(what.to_string());

    if packet.len() < HEADER_LEN {
        return Err(malformed("short header"));
    }
    if packet[2] & 0x80 == 0 {
        return Err(malformed("QR bit not set"));
    }

    let id = u16::from_be_bytes([packet[0], packet[1]]);
    let truncated = packet[2] & 0x02 != 0;
    let rcode = packet[3] & 0x0F;
    let qdcount = read_u16(packet, 4).unwrap_or(0);
    let ancount = read_u16(packet, 6).unwrap_or(0);

    let mut pos = HEADER_LEN;
    for _ in 0..qdcount {
        pos = skip_name(packet, pos).ok_or_else(|| malformed("truncated question"))? + 4;
    }

    let mut answers = Vec::with_capacity(ancount as usize);
    for _ in 0..ancount {
        // A truncated response may announce more records than it carries
        if pos >= packet.len() && truncated {
            break;
        }
        let name = read_name(packet, pos).ok_or_else(|| malformed("bad owner name"))?;
        pos = skip_name(packet, pos).ok_or_else(|| malformed("bad owner name"))?;

        let rtype = read_u16(packet, pos).ok_or_else(|| malformed("truncated record"))?;
        let ttl = read_u32(packet, pos + 4).ok_or_else(|| malformed("truncated record"))?;
        let rdlength = read_u16(packet, pos + 8).ok_or_else(|| malformed("truncated record"))? as usize;
        let rdata_start = pos + 10;
        let rdata_end = rdata_start + rdlength;
        if rdata_end > packet.len() {
            return Err(malformed("truncated rdata"));
        }

        let data = match rtype {
            TYPE_CNAME => RecordData::Cname(
                read_name(packet, rdata_start).ok_or_else(|| malformed("bad CNAME target"))?,
            ),
            TYPE_A if rdlength == 4 => RecordData::A(Ipv4Addr::new(
                packet[rdata_start],
                packet[rdata_start + 1],
                packet[rdata_start + 2],
                packet[rdata_start + 3],
            )),
            _ => RecordData::Other,
        };

        answers.push(Answer { name, rtype, ttl, data });
        pos = rdata_end;
    }

    Ok(Response { id, truncated, rcode, answers })
}

/// Send a query over UDP and wait for the matching response.
///
/// Datagrams with a different transaction ID are dropped.
pub async fn exchange_udp(
    server: SocketAddr,
    query: &[u8],
    wait: Duration,
) -> Result<Vec<u8>, ExchangeError> {
    let bind_addr: SocketAddr = if server.is_ipv4() {
        ([0u8; 4], 0).into()
    } else {
        ([0u16; 8], 0).into()
    };

    let exchange = async {
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(server).await?;
        socket.send(query).await?;

        let mut buf = vec![0u8; MAX_UDP_RESPONSE];
        loop {
            let size = socket.recv(&mut buf).await?;
            if size >= 2 && buf[..2] == query[..2] {
                return Ok::<_, ExchangeError>(buf[..size].to_vec());
            }
            debug!("Dropping stray datagram from {}", server);
        }
    };

    timeout(wait, exchange)
        .await
        .map_err(|_| ExchangeError::Timeout(wait))?
}

/// Send a query over TCP with the two-byte length prefix.
pub async fn exchange_tcp(
    server: SocketAddr,
    query: &[u8],
    wait: Duration,
) -> Result<Vec<u8>, ExchangeError> {
    let exchange = async {
        let mut stream = TcpStream::connect(server).await?;
        stream.write_all(&(query.len() as u16).to_be_bytes()).await?;
        stream.write_all(query).await?;

        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await?;
        let mut response = vec![0u8; u16::from_be_bytes(len_buf) as usize];
        stream.read_exact(&mut response).await?;
        Ok::<_, ExchangeError>(response)
    };

    timeout(wait, exchange)
        .await
        .map_err(|_| ExchangeError::Timeout(wait))?
}

/// Ask `server` for `name`/`qtype` and parse the answer.
///
/// A single attempt: any failure is returned to the caller. A truncated UDP
/// answer is asked again over TCP to the same server.
pub async fn query(
    server: SocketAddr,
    name: &str,
    qtype: u16,
    wait: Duration,
) -> Result<Response, ExchangeError> {
    let id: u16 = rand::random();
    let query = build_query(id, name, qtype)?;

    let mut response = checked(parse_response(&exchange_udp(server, &query, wait).await?)?, id)?;
    if response.truncated {
        debug!("Truncated UDP answer for {} from {}, asking over TCP", name, server);
        response = checked(parse_response(&exchange_tcp(server, &query, wait).await?)?, id)?;
    }

    debug!(
        "Upstream {} answered {} with rcode {} and {} records",
        server,
        name,
        response.rcode,
        response.answers.len()
    );
    Ok(response)
}

fn checked(response: Response, id: u16) -> Result<Response, ExchangeError> {
    if response.id != id {
        return Err(ExchangeError::Malformed(format!(
            "transaction ID mismatch: sent {id}, got {}",
            response.id
        )));
    }
    Ok(response)
}
