//! Scripted in-process node used by unit tests.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{Value, json};

use super::client::{Connector, RpcClient};
use super::error::RpcError;
use super::http::RpcTransport;
use super::types::{RpcErrorObject, RpcRequest, RpcResponse};

/// What the fake node answers for a method.
#[derive(Clone, Debug)]
pub enum Reply {
    Result(Value),
    Error { code: i64, message: String },
    Transport(String),
}

type Handler = Arc<dyn Fn(&[Value]) -> Reply + Send + Sync>;

#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
    pub timeout: Option<Duration>,
}

#[derive(Default)]
struct State {
    handlers: HashMap<String, Handler>,
    calls: Vec<RecordedCall>,
}

/// Node double: per-method scripted replies plus a log of every call.
/// Unscripted methods answer with JSON-RPC "Method not found".
#[derive(Clone, Default)]
pub struct FakeNode {
    state: Arc<Mutex<State>>,
    open: Arc<AtomicUsize>,
    connects: Arc<AtomicUsize>,
}

impl FakeNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// A node answering every RPC the collector issues with plausible data.
    pub fn healthy() -> Self {
        let node = Self::new();
        node.respond(
            "getdifficulty",
            json!({"proof-of-work": 1.52e-8, "proof-of-stake": 2_441_406.25}),
        );
        node.handle("getnetworkhashps", |params| {
            let window = params.first().and_then(Value::as_i64).unwrap_or(120);
            Reply::Result(json!(1000.0 * window as f64))
        });
        node.respond(
            "getmemoryinfo",
            json!({"locked": {
                "used": 65_760, "free": 196_384, "total": 262_144,
                "locked": 262_144, "chunks_used": 2055, "chunks_free": 3
            }}),
        );
        node.respond(
            "getblockchaininfo",
            json!({
                "chain": "test",
                "blocks": 2_912_345,
                "size_on_disk": 10_737_418_240u64,
                "verificationprogress": 0.9999,
                "bestblockhash": "00aa11bb"
            }),
        );
        node.respond(
            "getblockstats",
            json!({
                "total_size": 1834, "txs": 3, "height": 2_912_345,
                "total_weight": 7000, "ins": 4, "outs": 7,
                "total_out": 12_345_678_900i64, "totalfee": 90_000
            }),
        );
        node.respond(
            "listbanned",
            json!([{
                "address": "192.0.2.7/32",
                "ban_created": 1_700_000_000,
                "banned_until": 1_700_086_400
            }]),
        );
        node.respond(
            "getnetworkinfo",
            json!({
                "version": 240_200, "protocolversion": 70_020, "warnings": "",
                "connections": 10, "connections_in": 2, "connections_out": 8
            }),
        );
        node.respond("getchaintxstats", json!({"txcount": 5_432_100}));
        node.respond(
            "getmempoolinfo",
            json!({"size": 12, "bytes": 4096, "usage": 16_384, "unbroadcastcount": 1}),
        );
        node.respond(
            "getchaintips",
            json!([
                {"height": 2_912_345, "hash": "00aa11bb", "branchlen": 0, "status": "active"},
                {"height": 2_900_001, "hash": "00cc22dd", "branchlen": 1, "status": "valid-fork"}
            ]),
        );
        node.handle("estimatesmartfee", |params| {
            let window = params.first().and_then(Value::as_i64).unwrap_or(0);
            Reply::Result(json!({"feerate": 0.004 / window as f64, "blocks": window}))
        });
        node.respond(
            "getnettotals",
            json!({"totalbytesrecv": 1_000_000, "totalbytessent": 2_000_000, "timemillis": 1}),
        );
        node.respond("uptime", json!(86_400));
        node
    }

    pub fn respond(&self, method: &str, result: Value) -> &Self {
        self.reply(method, Reply::Result(result))
    }

    pub fn reply(&self, method: &str, reply: Reply) -> &Self {
        self.handle(method, move |_| reply.clone())
    }

    pub fn handle<F>(&self, method: &str, f: F) -> &Self
    where
        F: Fn(&[Value]) -> Reply + Send + Sync + 'static,
    {
        self.state
            .lock()
            .expect("fake node lock")
            .handlers
            .insert(method.to_string(), Arc::new(f));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().expect("fake node lock").calls.clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.method).collect()
    }

    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

/// Transport handed out by [`FakeNode::connect`]; tracks open connections.
pub struct FakeTransport {
    node: FakeNode,
}

impl Drop for FakeTransport {
    fn drop(&mut self) {
        self.node.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RpcTransport for FakeTransport {
    fn send(
        &self,
        request: &RpcRequest<'_>,
        timeout: Option<Duration>,
    ) -> Result<RpcResponse, RpcError> {
        let handler = {
            let mut state = self.node.state.lock().expect("fake node lock");
            state.calls.push(RecordedCall {
                id: request.id,
                method: request.method.to_string(),
                params: request.params.to_vec(),
                timeout,
            });
            state.handlers.get(request.method).cloned()
        };

        let reply = match handler {
            Some(handler) => handler(request.params),
            None => Reply::Error {
                code: -32601,
                message: "Method not found".to_string(),
            },
        };

        match reply {
            Reply::Result(result) => Ok(RpcResponse {
                result,
                error: None,
                id: Value::from(request.id),
            }),
            Reply::Error { code, message } => Ok(RpcResponse {
                result: Value::Null,
                error: Some(RpcErrorObject { code, message }),
                id: Value::from(request.id),
            }),
            Reply::Transport(msg) => Err(RpcError::Transport(msg)),
        }
    }
}

impl Connector for FakeNode {
    type Transport = FakeTransport;

    fn connect(&self) -> Result<RpcClient<FakeTransport>, RpcError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(RpcClient::new(
            FakeTransport { node: self.clone() },
            Duration::from_secs(15),
        ))
    }
}

// One-shot HTTP servers on a loopback port.

/// Reads one HTTP/1.1 request (headers plus `content-length` body).
fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).expect("read request");
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map(|v| v.trim().parse::<usize>().expect("content-length"))
                .unwrap_or(0);
            if buf.len() >= pos + 4 + len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Serves a single canned response and hands back the raw request.
pub fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let raw = read_request(&mut stream);
        let reply = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(reply.as_bytes()).expect("write response");
        raw
    });
    (format!("http://{addr}"), handle)
}

/// Accepts one connection and holds it open without answering.
pub fn silent_server(hold: Duration) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let holder = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        thread::sleep(hold);
        drop(stream);
    });
    (format!("http://{addr}"), holder)
}
