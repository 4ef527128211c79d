//! Loopback HTTP server for adapter tests.
//!
//! Serves one canned response per accepted connection, in order, and hands
//! back the request heads it read.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener};
use std::thread::{self, JoinHandle};

pub struct CannedServer {
    addr: SocketAddr,
    handle: JoinHandle<Vec<String>>,
}

impl CannedServer {
    pub fn serve(responses: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let handle = thread::spawn(move || {
            let mut heads = Vec::new();
            for response in responses {
                let (stream, _) = listener.accept().expect("accept");
                let mut reader = BufReader::new(stream);
                let mut head = String::new();
                loop {
                    let mut line = String::new();
                    let read = reader.read_line(&mut line).expect("read request");
                    if read == 0 || line == "\r\n" {
                        break;
                    }
                    head.push_str(&line);
                }
                let mut stream = reader.into_inner();
                stream
                    .write_all(response.as_bytes())
                    .expect("write response");
                stream.flush().expect("flush");
                heads.push(head);
            }
            heads
        });
        Self { addr, handle }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Request heads, lowercased, once every response has been served.
    pub fn finish(self) -> Vec<String> {
        self.handle
            .join()
            .expect("server thread")
            .into_iter()
            .map(|head| head.to_lowercase())
            .collect()
    }
}

/// A complete HTTP/1.1 response that closes the connection.
pub fn response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut out = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n",
        body.len()
    );
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");
    out.push_str(body);
    out
}

/// An address nothing is listening on.
pub fn refused_url(path: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}{path}")
}
