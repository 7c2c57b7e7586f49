use engine_io::metrics::{init_metrics, serve_metrics, TICKS_EXECUTED};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

fn free_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    format!("127.0.0.1:{}", addr.port())
}

/// Status code of a GET, retrying the connect until the server is up.
fn get_status(addr: &str, path: &str) -> u16 {
    let start = Instant::now();
    let mut stream = loop {
        match TcpStream::connect(addr) {
            Ok(stream) => break stream,
            Err(e) if start.elapsed() > Duration::from_secs(5) => {
                panic!("metrics server not reachable: {e}")
            }
            Err(_) => thread::sleep(Duration::from_millis(50)),
        }
    };
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    write!(
        stream,
        "GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n"
    )
    .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("HTTP status line")
}

#[test]
fn ready_only_after_first_tick() {
    init_metrics();
    let addr = free_addr();
    let _server = serve_metrics(addr.clone());

    assert_eq!(get_status(&addr, "/health"), 200);
    assert_eq!(get_status(&addr, "/ready"), 503);

    TICKS_EXECUTED.inc();
    assert_eq!(get_status(&addr, "/ready"), 200);
    assert_eq!(get_status(&addr, "/metrics"), 200);
    assert_eq!(get_status(&addr, "/nope"), 404);
}
