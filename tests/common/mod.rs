#![allow(dead_code)]
//! A fake upstream DNS server for integration tests.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cname_redirect::dns::{CLASS_IN, TYPE_A, TYPE_CNAME};
use cname_redirect::handlers::AppState;
use cname_redirect::utils::{encode_dns_name, read_name};
use cname_redirect::{RedirectDomainTable, RedirectStatus, Resolver, ResolverConfig, StaticPage};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;

/// One record of a fake answer.
#[derive(Debug, Clone)]
pub enum Record {
    Cname(String, u32),
    A(Ipv4Addr, u32),
}

/// How the fake answers a name.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Answer with these records.
    Answer(Vec<Record>),
    /// Answer over UDP with the TC bit and no records; the full answer is
    /// only available over TCP.
    Truncated(Vec<Record>),
    /// Never answer.
    Silent,
}

impl Reply {
    pub fn cname(target: &str, ttl: u32) -> Self {
        Reply::Answer(vec![Record::Cname(target.to_string(), ttl)])
    }
}

/// Upstream DNS server answering from a table, counting the queries it gets.
pub struct FakeUpstream {
    pub addr: SocketAddr,
    replies: Arc<Mutex<HashMap<String, Reply>>>,
    udp_queries: Arc<AtomicUsize>,
    tcp_queries: Arc<AtomicUsize>,
    tasks: Vec<JoinHandle<()>>,
}

impl FakeUpstream {
    pub async fn start() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let listener = TcpListener::bind(addr).await.unwrap();

        let replies: Arc<Mutex<HashMap<String, Reply>>> = Arc::default();
        let udp_queries = Arc::new(AtomicUsize::new(0));
        let tcp_queries = Arc::new(AtomicUsize::new(0));

        let udp_task = {
            let replies = replies.clone();
            let udp_queries = udp_queries.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 512];
                loop {
                    let Ok((len, src)) = socket.recv_from(&mut buf).await else {
                        continue;
                    };
                    let query = buf[..len].to_vec();
                    udp_queries.fetch_add(1, Ordering::SeqCst);
                    let reply = reply_for(&replies, &query);
                    let response = match reply {
                        Reply::Silent => continue,
                        Reply::Truncated(_) => build_response(&query, &[], true),
                        Reply::Answer(records) => build_response(&query, &records, false),
                    };
                    let _ = socket.send_to(&response, src).await;
                }
            })
        };

        let tcp_task = {
            let replies = replies.clone();
            let tcp_queries = tcp_queries.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((mut stream, _)) = listener.accept().await else {
                        continue;
                    };
                    let mut len_buf = [0u8; 2];
                    if stream.read_exact(&mut len_buf).await.is_err() {
                        continue;
                    }
                    let mut query = vec![0u8; u16::from_be_bytes(len_buf) as usize];
                    if stream.read_exact(&mut query).await.is_err() {
                        continue;
                    }
                    tcp_queries.fetch_add(1, Ordering::SeqCst);
                    let records = match reply_for(&replies, &query) {
                        Reply::Answer(records) | Reply::Truncated(records) => records,
                        Reply::Silent => continue,
                    };
                    let response = build_response(&query, &records, false);
                    let _ = stream.write_all(&(response.len() as u16).to_be_bytes()).await;
                    let _ = stream.write_all(&response).await;
                }
            })
        };

        Self {
            addr,
            replies,
            udp_queries,
            tcp_queries,
            tasks: vec![udp_task, tcp_task],
        }
    }

    pub fn set(&self, name: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(name.to_string(), reply);
    }

    pub fn udp_queries(&self) -> usize {
        self.udp_queries.load(Ordering::SeqCst)
    }

    pub fn tcp_queries(&self) -> usize {
        self.tcp_queries.load(Ordering::SeqCst)
    }

    /// Resolver settings pointing at this server.
    pub fn resolver_config(&self, use_cache: bool) -> ResolverConfig {
        let mut config = ResolverConfig::new(vec![self.addr]);
        config.use_cache = use_cache;
        config.timeout = Duration::from_millis(500);
        config
    }

    pub fn resolver(&self, use_cache: bool) -> Resolver {
        Resolver::new(&self.resolver_config(use_cache))
    }
}

impl Drop for FakeUpstream {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn reply_for(replies: &Mutex<HashMap<String, Reply>>, query: &[u8]) -> Reply {
    let name = read_name(query, 12)
        .map(|name| name.trim_end_matches('.').to_string())
        .unwrap_or_default();
    replies
        .lock()
        .unwrap()
        .get(&name)
        .cloned()
        .unwrap_or(Reply::Answer(Vec::new()))
}

/// Answer `query`, naming the question through a compression pointer.
fn build_response(query: &[u8], records: &[Record], truncated: bool) -> Vec<u8> {
    let mut response = Vec::with_capacity(512);
    response.extend_from_slice(&query[..2]);
    response.push(0x80 | (query[2] & 0x01) | if truncated { 0x02 } else { 0x00 });
    response.push(0x80);
    response.extend_from_slice(&[0x00, 0x01]);
    response.extend_from_slice(&(records.len() as u16).to_be_bytes());
    response.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    response.extend_from_slice(&query[12..]);

    for record in records {
        response.extend_from_slice(&[0xC0, 0x0C]);
        let (rtype, ttl, rdata) = match record {
            Record::Cname(target, ttl) => (TYPE_CNAME, *ttl, encode_dns_name(target).unwrap()),
            Record::A(addr, ttl) => (TYPE_A, *ttl, addr.octets().to_vec()),
        };
        response.extend_from_slice(&rtype.to_be_bytes());
        response.extend_from_slice(&CLASS_IN.to_be_bytes());
        response.extend_from_slice(&ttl.to_be_bytes());
        response.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        response.extend_from_slice(&rdata);
    }
    response
}

/// Table `{301 -> r1.io, 302 -> r2.io}`.
pub fn redirect_table() -> RedirectDomainTable {
    RedirectDomainTable::new([
        ("r1.io", RedirectStatus::MovedPermanently),
        ("r2.io", RedirectStatus::Found),
    ])
    .unwrap()
}

/// Handler state backed by `upstream`, caching enabled.
pub fn app_state(upstream: &FakeUpstream, table: RedirectDomainTable) -> AppState {
    let static_page = StaticPage::new("<h1>{{redirect_domain}}</h1>", Ipv4Addr::new(192, 0, 2, 10), &table);
    AppState {
        resolver: Arc::new(upstream.resolver(true)),
        redirect_domains: Arc::new(table),
        static_page: Arc::new(static_page),
    }
}
