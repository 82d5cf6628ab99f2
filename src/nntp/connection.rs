//! A single NNTP session over plain TCP or implicit TLS.

use super::response::{self, StatusLine, codes};
use crate::config::{ServerConfig, TimeoutConfig};
use crate::error::NntpError;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Byte stream a session runs over (plain TCP or TLS-wrapped TCP)
trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Wrap a message-id in angle brackets unless it already is.
///
/// Ids with inner whitespace or control characters are rejected: a CR or LF
/// would end the `BODY` line early and the rest would run as another command.
pub fn normalize_message_id(message_id: &str) -> Result<String, NntpError> {
    let id = message_id.trim();
    if id.is_empty() || id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(NntpError::InvalidMessageId(message_id.to_string()));
    }
    if id.starts_with('<') && id.ends_with('>') {
        Ok(id.to_string())
    } else {
        Ok(format!("<{id}>"))
    }
}

/// An open NNTP session
pub struct NntpConnection {
    stream: BufStream<Box<dyn Transport>>,
    address: String,
    read_timeout: Duration,
    current_group: Option<String>,
}

impl std::fmt::Debug for NntpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NntpConnection")
            .field("address", &self.address)
            .field("current_group", &self.current_group)
            .finish_non_exhaustive()
    }
}

impl NntpConnection {
    /// Dial the server, perform the TLS handshake if configured and read the greeting.
    ///
    /// The whole sequence is bounded by `timeouts.connect`.
    pub async fn connect(server: &ServerConfig, timeouts: &TimeoutConfig) -> Result<Self, NntpError> {
        let address = server.address();

        let established = tokio::time::timeout(timeouts.connect, async {
            let tcp = TcpStream::connect(&address)
                .await
                .map_err(|source| NntpError::Connect {
                    address: address.clone(),
                    source,
                })?;
            // Commands are small and latency-bound
            let _ = tcp.set_nodelay(true);

            let transport: Box<dyn Transport> = if server.tls {
                let connector = tokio_native_tls::native_tls::TlsConnector::new().map_err(|e| {
                    NntpError::Tls {
                        host: server.host.clone(),
                        reason: e.to_string(),
                    }
                })?;
                let connector = tokio_native_tls::TlsConnector::from(connector);
                let tls = connector
                    .connect(&server.host, tcp)
                    .await
                    .map_err(|e| NntpError::Tls {
                        host: server.host.clone(),
                        reason: e.to_string(),
                    })?;
                Box::new(tls)
            } else {
                Box::new(tcp)
            };

            let mut conn = NntpConnection {
                stream: BufStream::new(transport),
                address: address.clone(),
                read_timeout: timeouts.read,
                current_group: None,
            };

            let greeting = conn.read_status().await?;
            match greeting.code {
                codes::READY_POSTING | codes::READY_NO_POSTING => {}
                _ => return Err(response::classify_greeting_failure(greeting)),
            }
            debug!(address = %address, tls = server.tls, "connected to news server");
            Ok::<_, NntpError>(conn)
        })
        .await;

        match established {
            Ok(result) => result,
            Err(_) => Err(NntpError::Connect {
                address,
                source: std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no greeting within {:?}", timeouts.connect),
                ),
            }),
        }
    }

    /// Log in with `AUTHINFO USER/PASS`. An empty username skips authentication.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), NntpError> {
        if username.is_empty() {
            return Ok(());
        }

        let reply = self
            .command(&format!("AUTHINFO USER {username}"), "AUTHINFO USER")
            .await?;
        let reply = match reply.code {
            codes::AUTH_ACCEPTED => return Ok(()),
            codes::PASSWORD_REQUIRED => {
                self.command(&format!("AUTHINFO PASS {password}"), "AUTHINFO PASS ****")
                    .await?
            }
            _ => reply,
        };

        if reply.code == codes::AUTH_ACCEPTED {
            debug!(address = %self.address, "authenticated");
            Ok(())
        } else {
            Err(NntpError::Auth {
                code: reply.code,
                message: reply.message,
            })
        }
    }

    /// Select a newsgroup. Re-selecting the current group is a no-op.
    pub async fn select_group(&mut self, group: &str) -> Result<(), NntpError> {
        if self.current_group.as_deref() == Some(group) {
            return Ok(());
        }

        let line = format!("GROUP {group}");
        let reply = self.command(&line, &line).await?;
        if reply.code != codes::GROUP_SELECTED {
            return Err(response::classify_group_failure(reply, group));
        }
        self.current_group = Some(group.to_string());
        Ok(())
    }

    /// Fetch the raw (still encoded) body of an article
    pub async fn fetch_body(&mut self, message_id: &str) -> Result<Vec<u8>, NntpError> {
        let line = format!("BODY {}", normalize_message_id(message_id)?);
        let reply = self.command(&line, &line).await?;
        if reply.code != codes::BODY_FOLLOWS {
            return Err(response::classify_body_failure(reply, message_id));
        }

        let body = tokio::time::timeout(self.read_timeout, response::read_dot_block(&mut self.stream))
            .await
            .map_err(|_| NntpError::Timeout(format!("reading body of {message_id}")))??;
        trace!(message_id, bytes = body.len(), "received body");
        Ok(body)
    }

    /// Send `QUIT` and shut the stream down. Failures are ignored.
    pub async fn close(mut self) {
        match self.command("QUIT", "QUIT").await {
            Ok(reply) if reply.code != codes::CLOSING => {
                trace!(code = reply.code, "unexpected reply to QUIT");
            }
            _ => {}
        }
        let _ = self.stream.shutdown().await;
    }

    async fn command(&mut self, line: &str, loggable: &str) -> Result<StatusLine, NntpError> {
        trace!(address = %self.address, command = loggable, "sending command");
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        self.read_status().await
    }

    async fn read_status(&mut self) -> Result<StatusLine, NntpError> {
        let mut line = Vec::with_capacity(128);
        let n = tokio::time::timeout(self.read_timeout, self.stream.read_until(b'\n', &mut line))
            .await
            .map_err(|_| NntpError::Timeout("waiting for server response".to_string()))??;
        if n == 0 {
            return Err(NntpError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            )));
        }
        response::parse_status_line(&line)
    }
}
