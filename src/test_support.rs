//! Local HTTP fixture for download tests.
//!
//! Serves canned responses over a raw `TcpListener` so tests can produce
//! truncated bodies, bogus `Content-Length` headers and never-ending
//! transfers, none of which a well-behaved server library would emit.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Canned response for one path
#[derive(Debug, Clone)]
pub enum Reply {
    /// Status line plus a complete body
    Full { status: u16, body: Vec<u8> },
    /// Declares `declared` bytes, sends `body`, then closes the connection
    Truncated { declared: u64, body: Vec<u8> },
    /// Declares `declared` bytes, sends `body`, then stalls forever
    Hang { declared: u64, body: Vec<u8> },
}

impl Reply {
    pub fn ok(body: Vec<u8>) -> Self {
        Reply::Full { status: 200, body }
    }

    pub fn status(status: u16) -> Self {
        Reply::Full { status, body: Vec::new() }
    }
}

pub struct TestServer {
    addr: SocketAddr,
    hits: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(routes: Vec<(&str, Reply)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
        let addr = listener.local_addr().expect("test server addr");
        let routes: Arc<HashMap<String, Reply>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, reply)| (path.to_string(), reply))
                .collect(),
        );
        let hits = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let hits = Arc::clone(&hits);
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    tokio::spawn(serve(socket, Arc::clone(&routes), Arc::clone(&hits)));
                }
            })
        };

        Self { addr, hits, task }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Paths requested so far, in arrival order
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut socket: TcpStream,
    routes: Arc<HashMap<String, Reply>>,
    hits: Arc<Mutex<Vec<String>>>,
) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }

    let head = String::from_utf8_lossy(&request);
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    hits.lock().unwrap().push(path.clone());

    let (status, declared, body, hang) = match routes.get(&path) {
        None => (404, 0, Vec::new(), false),
        Some(Reply::Full { status, body }) => (*status, body.len() as u64, body.clone(), false),
        Some(Reply::Truncated { declared, body }) => (200, *declared, body.clone(), false),
        Some(Reply::Hang { declared, body }) => (200, *declared, body.clone(), true),
    };

    let header = format!(
        "HTTP/1.1 {} Test\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status, declared
    );
    if socket.write_all(header.as_bytes()).await.is_err() {
        return;
    }
    let _ = socket.write_all(&body).await;
    let _ = socket.flush().await;

    if hang {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
    let _ = socket.shutdown().await;
}

/// Build a zip archive in memory from (name, contents) pairs
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data).unwrap();
            }
        }
        zip.finish().unwrap();
    }
    cursor.into_inner()
}

/// Minimal healthy game folder: required folders, executable of `exe_size` bytes, one data marker
pub fn fake_game_with_exe(root: &std::path::Path, exe_size: usize) {
    use crate::game_finder::GAME_EXECUTABLE;

    std::fs::create_dir_all(root.join("Game/Bin")).unwrap();
    std::fs::create_dir_all(root.join("Data/Client")).unwrap();
    std::fs::write(root.join(GAME_EXECUTABLE), vec![0u8; exe_size]).unwrap();
    std::fs::write(root.join("Data/Client/ClientFullBuild0.package"), b"DBPF").unwrap();
}

pub fn fake_game(root: &std::path::Path) {
    fake_game_with_exe(root, 2);
}
