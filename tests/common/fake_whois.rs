//! Fake WHOIS server on 127.0.0.1 (one port for both hops).
//!
//! The first time a domain is queried the server answers like IANA, with a
//! `refer:` line pointing back at itself; the second time it answers like the
//! registry with the configured record. Unknown domains get "No match".

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

#[derive(Default)]
struct WhoisState {
    records: HashMap<String, String>,
    seen: HashMap<String, usize>,
}

pub struct FakeWhois {
    port: u16,
    state: Arc<Mutex<WhoisState>>,
    connections: Arc<AtomicUsize>,
}

impl FakeWhois {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state: Arc<Mutex<WhoisState>> = Arc::default();
        let connections = Arc::new(AtomicUsize::new(0));

        let (task_state, task_connections) = (state.clone(), connections.clone());
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                task_connections.fetch_add(1, Ordering::SeqCst);
                let state = task_state.clone();
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut line = String::new();
                    if BufReader::new(read).read_line(&mut line).await.is_err() {
                        return;
                    }
                    let reply = answer(&state, line.trim());
                    let _ = write.write_all(reply.as_bytes()).await;
                    let _ = write.shutdown().await;
                });
            }
        });

        Self {
            port,
            state,
            connections,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn add_record(&self, domain: &str, record: &str) {
        self.state
            .lock()
            .unwrap()
            .records
            .insert(domain.to_string(), record.to_string());
    }

    /// TCP connections accepted so far (two per uncached lookup).
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

fn answer(state: &Mutex<WhoisState>, query: &str) -> String {
    let mut state = state.lock().unwrap();
    let seen = state.seen.entry(query.to_string()).or_default();
    *seen += 1;
    if *seen % 2 == 1 {
        return format!("% IANA WHOIS server\r\n\r\nrefer:        127.0.0.1\r\n\r\ndomain:       {query}\r\n");
    }
    state
        .records
        .get(query)
        .cloned()
        .unwrap_or_else(|| format!("No match for \"{}\".\r\n", query.to_uppercase()))
}
