use edgeloop_core::metrics::LoopMetrics;
use edgeloop_core::{Server, ServerResult, ShutdownHandle};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddrV4, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct TestServer {
    addr: SocketAddrV4,
    handle: ShutdownHandle,
    metrics: Arc<LoopMetrics>,
    join: Option<JoinHandle<ServerResult<()>>>,
}

impl TestServer {
    fn start() -> Self {
        let mut event_loop = Server::bind(0).build().unwrap();
        let addr = event_loop.local_addr().unwrap();
        let handle = event_loop.shutdown_handle();
        let metrics = event_loop.metrics();
        let join = thread::spawn(move || event_loop.run());
        Self {
            addr,
            handle,
            metrics,
            join: Some(join),
        }
    }

    fn exchange(&self, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(self.addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream.write_all(request).unwrap();
        let mut res = String::new();
        stream.read_to_string(&mut res).unwrap();
        res
    }

    fn wait_for(&self, what: &str, cond: impl Fn(&LoopMetrics) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond(&self.metrics) {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.shutdown();
        if let Some(join) = self.join.take() {
            join.join().unwrap().unwrap();
        }
    }
}

fn header<'a>(res: &'a str, name: &str) -> Option<&'a str> {
    res.split("\r\n\r\n")
        .next()?
        .lines()
        .find_map(|line| line.strip_prefix(name)?.strip_prefix(": "))
}

fn body(res: &str) -> &str {
    res.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or("")
}

#[test]
fn get_root_serves_html() {
    let server = TestServer::start();
    let res = server.exchange(b"GET / HTTP/1.1\r\n\r\n");

    assert!(res.starts_with("HTTP/1.1 200 OK\r\n"), "{res}");
    assert_eq!(header(&res, "Content-Type"), Some("text/html"));
    assert_eq!(header(&res, "Connection"), Some("close"));
    assert_eq!(body(&res), "<html><h4>Hello World!!</h4></html>");
    assert_eq!(header(&res, "Content-Length"), Some("35"));
}

#[test]
fn get_index_html_matches_root() {
    let server = TestServer::start();
    let root = server.exchange(b"GET / HTTP/1.1\r\n\r\n");
    let index = server.exchange(b"GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert_eq!(root, index);
}

#[test]
fn get_data_json() {
    let server = TestServer::start();
    let res = server.exchange(b"GET /data.json HTTP/1.1\r\n\r\n");

    assert!(res.starts_with("HTTP/1.1 200 OK\r\n"), "{res}");
    assert_eq!(header(&res, "Content-Type"), Some("application/json"));
    assert_eq!(body(&res), r#"{"message": "Hello World!!!"}"#);
    assert_eq!(
        header(&res, "Content-Length"),
        Some(body(&res).len().to_string().as_str())
    );
}

#[test]
fn unknown_path_is_404() {
    let server = TestServer::start();
    let res = server.exchange(b"GET /missing.txt HTTP/1.1\r\n\r\n");

    assert!(res.starts_with("HTTP/1.1 404 Not Found\r\n"), "{res}");
    assert_eq!(header(&res, "Content-Type"), Some("text/plain"));
    assert_eq!(body(&res), "File not found!");
}

#[test]
fn post_is_405() {
    let server = TestServer::start();
    let res = server.exchange(b"POST / HTTP/1.1\r\n\r\n");

    assert!(res.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"), "{res}");
    assert_eq!(header(&res, "Content-Type"), Some("text/plain"));
    assert_eq!(body(&res), "Only GET supported");
}

#[test]
fn malformed_request_line_gets_400_and_loop_survives() {
    let server = TestServer::start();
    let res = server.exchange(b"GARBAGE\r\n\r\n");
    assert!(res.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{res}");
    assert_eq!(body(&res), "Malformed request");

    let res = server.exchange(b"GET / HTTP/1.1\r\n\r\n");
    assert!(res.starts_with("HTTP/1.1 200 OK\r\n"), "{res}");
}

#[test]
fn silent_client_that_disconnects_gets_no_response() {
    let server = TestServer::start();
    {
        let stream = TcpStream::connect(server.addr).unwrap();
        server.wait_for("accept", |m| m.snapshot().accepted == 1);
        stream.shutdown(Shutdown::Both).unwrap();
    }
    server.wait_for("close", |m| m.snapshot().active_conns == 0);

    let stats = server.metrics.snapshot();
    assert_eq!(stats.req_count, 0);
    assert_eq!(stats.bytes_sent, 0);

    // The loop is still serving.
    let res = server.exchange(b"GET /data.json HTTP/1.1\r\n\r\n");
    assert!(res.starts_with("HTTP/1.1 200 OK\r\n"), "{res}");
}

#[test]
fn request_split_across_segments_is_reassembled() {
    let server = TestServer::start();
    let mut stream = TcpStream::connect(server.addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    stream.write_all(b"GET /data").unwrap();
    stream.flush().unwrap();
    thread::sleep(Duration::from_millis(50));
    stream.write_all(b".json HTTP/1.1\r\n\r\n").unwrap();

    let mut res = String::new();
    stream.read_to_string(&mut res).unwrap();
    assert!(res.starts_with("HTTP/1.1 200 OK\r\n"), "{res}");
    assert_eq!(body(&res), r#"{"message": "Hello World!!!"}"#);
}

#[test]
fn half_closed_partial_line_is_still_answered() {
    let server = TestServer::start();
    let mut stream = TcpStream::connect(server.addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    stream.write_all(b"GET /index.html").unwrap();
    stream.shutdown(Shutdown::Write).unwrap();

    let mut res = String::new();
    stream.read_to_string(&mut res).unwrap();
    assert!(res.starts_with("HTTP/1.1 200 OK\r\n"), "{res}");
}

#[test]
fn every_connection_is_released_after_one_exchange() {
    let server = TestServer::start();

    let clients: Vec<_> = (0..32)
        .map(|i| {
            let addr = server.addr;
            thread::spawn(move || {
                let path = if i % 2 == 0 { "/" } else { "/nope" };
                let mut stream = TcpStream::connect(addr).unwrap();
                stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
                write!(stream, "GET {path} HTTP/1.1\r\n\r\n").unwrap();
                let mut res = String::new();
                stream.read_to_string(&mut res).unwrap();
                res
            })
        })
        .collect();

    for (i, client) in clients.into_iter().enumerate() {
        let res = client.join().unwrap();
        let expected = if i % 2 == 0 { "HTTP/1.1 200" } else { "HTTP/1.1 404" };
        assert!(res.starts_with(expected), "{res}");
    }

    server.wait_for("all closed", |m| m.snapshot().active_conns == 0);
    let stats = server.metrics.snapshot();
    assert_eq!(stats.accepted, 32);
    assert_eq!(stats.req_count, 32);
}

#[test]
fn shutdown_stops_a_blocked_loop() {
    let mut event_loop = Server::bind(0).build().unwrap();
    let handle = event_loop.shutdown_handle();
    let join = thread::spawn(move || event_loop.run());

    thread::sleep(Duration::from_millis(50));
    handle.shutdown();
    assert!(handle.is_shutdown());
    join.join().unwrap().unwrap();
}
