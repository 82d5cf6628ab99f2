//! In-process NNTP server speaking just enough of RFC 3977 for slurp:
//! greeting, `AUTHINFO USER/PASS`, `GROUP`, `BODY` and `QUIT`.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Default)]
pub struct FakeNntpServerBuilder {
    groups: HashSet<String>,
    articles: HashMap<(String, String), Vec<u8>>,
    credentials: Option<(String, String)>,
    body_delay: Duration,
}

impl FakeNntpServerBuilder {
    /// Carry `body` in `group` under `message_id` (without angle brackets)
    pub fn article(mut self, group: &str, message_id: &str, body: Vec<u8>) -> Self {
        self.groups.insert(group.to_string());
        self.articles
            .insert((group.to_string(), message_id.to_string()), body);
        self
    }

    /// Known group without the article in question
    pub fn group(mut self, group: &str) -> Self {
        self.groups.insert(group.to_string());
        self
    }

    /// Require `AUTHINFO` before `GROUP`/`BODY`
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    /// Hold every `BODY` reply for `delay`
    pub fn body_delay(mut self, delay: Duration) -> Self {
        self.body_delay = delay;
        self
    }

    pub async fn start(self) -> FakeNntpServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(State {
            groups: self.groups,
            articles: self.articles,
            credentials: self.credentials,
            body_delay: self.body_delay,
            connections: AtomicUsize::new(0),
            bodies_in_flight: AtomicUsize::new(0),
            max_bodies_in_flight: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
        });

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_state.connections.fetch_add(1, Ordering::SeqCst);
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, state).await;
                });
            }
        });

        FakeNntpServer { addr, state, task }
    }
}

struct State {
    groups: HashSet<String>,
    articles: HashMap<(String, String), Vec<u8>>,
    credentials: Option<(String, String)>,
    body_delay: Duration,
    connections: AtomicUsize,
    bodies_in_flight: AtomicUsize,
    max_bodies_in_flight: AtomicUsize,
    commands: Mutex<Vec<String>>,
}

pub struct FakeNntpServer {
    addr: SocketAddr,
    state: Arc<State>,
    task: JoinHandle<()>,
}

impl FakeNntpServer {
    pub fn builder() -> FakeNntpServerBuilder {
        FakeNntpServerBuilder::default()
    }

    /// `127.0.0.1:<port>`
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Connections accepted so far
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Highest number of `BODY` replies that were being served together
    pub fn max_bodies_in_flight(&self) -> usize {
        self.state.max_bodies_in_flight.load(Ordering::SeqCst)
    }

    /// Every command line received, across all connections
    pub fn commands(&self) -> Vec<String> {
        self.state.commands.lock().unwrap().clone()
    }

    /// Commands starting with `prefix`
    pub fn commands_starting_with(&self, prefix: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }
}

impl Drop for FakeNntpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Dot-stuff `body` for transmission (lines starting with `.` get a second one)
fn dot_stuff(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 16);
    for line in body.split_inclusive(|&b| b == b'\n') {
        if line.starts_with(b".") {
            out.push(b'.');
        }
        out.extend_from_slice(line);
    }
    if !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out
}

async fn serve(stream: TcpStream, state: Arc<State>) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    write.write_all(b"200 fake news server ready\r\n").await?;

    let mut authenticated = state.credentials.is_none();
    let mut user: Option<String> = None;
    let mut current_group: Option<String> = None;

    while let Some(line) = lines.next_line().await? {
        state.commands.lock().unwrap().push(line.clone());
        let (command, argument) = line.split_once(' ').unwrap_or((line.as_str(), ""));

        match command.to_ascii_uppercase().as_str() {
            "AUTHINFO" => {
                let (kind, value) = argument.split_once(' ').unwrap_or((argument, ""));
                match kind.to_ascii_uppercase().as_str() {
                    "USER" => {
                        user = Some(value.to_string());
                        write.write_all(b"381 password required\r\n").await?;
                    }
                    "PASS" => {
                        let accepted = match (&state.credentials, &user) {
                            (Some((u, p)), Some(given)) => u == given && p == value,
                            (None, _) => true,
                            _ => false,
                        };
                        if accepted {
                            authenticated = true;
                            write.write_all(b"281 authentication accepted\r\n").await?;
                        } else {
                            write.write_all(b"481 authentication failed\r\n").await?;
                        }
                    }
                    _ => write.write_all(b"501 syntax error\r\n").await?,
                }
            }
            "GROUP" | "BODY" if !authenticated => {
                write.write_all(b"480 authentication required\r\n").await?;
            }
            "GROUP" => {
                if state.groups.contains(argument) {
                    current_group = Some(argument.to_string());
                    write
                        .write_all(format!("211 1 1 1 {argument}\r\n").as_bytes())
                        .await?;
                } else {
                    write.write_all(b"411 no such newsgroup\r\n").await?;
                }
            }
            "BODY" => {
                let Some(group) = &current_group else {
                    write.write_all(b"412 no newsgroup selected\r\n").await?;
                    continue;
                };
                let id = argument.trim_start_matches('<').trim_end_matches('>');
                match state.articles.get(&(group.clone(), id.to_string())) {
                    Some(body) => {
                        let now = state.bodies_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        state.max_bodies_in_flight.fetch_max(now, Ordering::SeqCst);
                        if !state.body_delay.is_zero() {
                            tokio::time::sleep(state.body_delay).await;
                        }
                        write
                            .write_all(format!("222 0 {argument} body follows\r\n").as_bytes())
                            .await?;
                        write.write_all(&dot_stuff(body)).await?;
                        // Leave the count before the terminator so the client
                        // cannot finish while still counted
                        state.bodies_in_flight.fetch_sub(1, Ordering::SeqCst);
                        write.write_all(b".\r\n").await?;
                    }
                    None => write.write_all(b"430 no such article\r\n").await?,
                }
            }
            "QUIT" => {
                write.write_all(b"205 closing connection\r\n").await?;
                break;
            }
            _ => write.write_all(b"500 unknown command\r\n").await?,
        }
    }

    write.shutdown().await
}
