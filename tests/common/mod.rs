#![allow(dead_code)]

use serde_json::Value;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

/// What the fake service does with the next request on a connection.
pub enum Step {
    /// Reads one request and answers with this JSON object.
    Reply(Value),
    /// Reads one request and answers with raw bytes (terminator included).
    Raw(Vec<u8>),
    /// Reads one request and closes the connection without answering.
    Hangup,
    /// Reads one request, never answers, and holds the connection until the
    /// client closes it.
    Silent,
}

/// A request as seen by the fake service.
#[derive(Debug, Clone)]
pub struct Seen {
    pub connection: usize,
    pub body: Value,
}

impl Seen {
    pub fn cmd(&self) -> &str {
        self.body["cmd"].as_str().unwrap_or("")
    }
}

/// Single-threaded stand-in for the socket service. Each inner script is
/// played on its own accepted connection, in order.
pub struct ScriptedServer {
    pub port: u16,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl ScriptedServer {
    pub fn start(connections: Vec<Vec<Step>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        thread::spawn(move || {
            for (index, script) in connections.into_iter().enumerate() {
                let (stream, _) = match listener.accept() {
                    Ok(pair) => pair,
                    Err(_) => return,
                };
                serve(index, stream, script, &log);
            }
        });

        Self { port, seen }
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.seen().iter().map(|s| s.cmd().to_string()).collect()
    }
}

fn serve(index: usize, stream: TcpStream, script: Vec<Step>, log: &Arc<Mutex<Vec<Seen>>>) {
    let mut writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(_) => return,
    };
    let mut reader = BufReader::new(stream);

    for step in script {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let body = line
            .strip_suffix(b"\r\n")
            .and_then(|bytes| serde_json::from_slice(bytes).ok())
            .unwrap_or(Value::Null);
        log.lock().unwrap().push(Seen {
            connection: index,
            body,
        });

        let reply = match step {
            Step::Reply(value) => {
                let mut bytes = serde_json::to_vec(&value).unwrap();
                bytes.extend_from_slice(b"\r\n");
                bytes
            }
            Step::Raw(bytes) => bytes,
            Step::Hangup => return,
            Step::Silent => {
                let _ = io::copy(&mut reader, &mut io::sink());
                return;
            }
        };
        if writer.write_all(&reply).is_err() {
            return;
        }
    }
}
