//! Inbound mailbox access (IMAP)

use super::parse::{parse_email, FetchedEmail};
use super::transport::ConnectionCheck;
use anfrage_common::{Error, Result};
use anfrage_storage::models::MailSettings;
use async_trait::async_trait;
use native_tls::{TlsConnector, TlsStream};
use serde::Serialize;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};

type ImapSessionHandle = imap::Session<imap::Connection>;

/// Message that was fetched but could not be turned into an email
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedMessage {
    pub uid: u32,
    pub reason: String,
}

/// Unseen messages from one fetch
#[derive(Debug, Default)]
pub struct FetchBatch {
    pub emails: Vec<FetchedEmail>,
    pub skipped: Vec<SkippedMessage>,
}

/// Mailbox provider; one session is opened per worker pass
#[async_trait]
pub trait InboundMailbox: Send + Sync {
    async fn open(&self, settings: &MailSettings) -> Result<Box<dyn MailboxSession>>;

    async fn test_connection(&self, settings: &MailSettings) -> ConnectionCheck;
}

/// Open mailbox session
#[async_trait]
pub trait MailboxSession: Send {
    /// Fetch up to `limit` unseen messages, oldest first, without flagging them
    async fn fetch_unseen(&mut self, limit: usize) -> Result<FetchBatch>;

    /// Flag a message as seen
    async fn mark_seen(&mut self, uid: u32) -> Result<()>;

    /// Log out; errors are only logged
    async fn close(self: Box<Self>);
}

/// IMAP mailbox.
///
/// The `imap` client is blocking, so every exchange runs on the blocking
/// pool and is bounded by the configured timeout. The same timeout is set on
/// the socket, so a stalled server also releases the blocking thread.
#[derive(Debug, Clone)]
pub struct ImapMailbox {
    timeout: Duration,
    default_mailbox: String,
}

impl ImapMailbox {
    pub fn new(timeout: Duration, default_mailbox: impl Into<String>) -> Self {
        Self {
            timeout,
            default_mailbox: default_mailbox.into(),
        }
    }

    fn folder(&self, settings: &MailSettings) -> String {
        if settings.imap_mailbox.trim().is_empty() {
            self.default_mailbox.clone()
        } else {
            settings.imap_mailbox.clone()
        }
    }
}

async fn blocking<T, F>(timeout: Duration, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(Error::Internal(format!("IMAP task failed: {}", e))),
        Err(_) => Err(Error::Transport(format!(
            "IMAP operation timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

fn imap_error(context: &str, e: impl std::fmt::Display) -> Error {
    Error::Transport(format!("IMAP {}: {}", context, e))
}

fn open_socket(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| imap_error("resolve", e))?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(tcp) => {
                tcp.set_read_timeout(Some(timeout))
                    .and_then(|()| tcp.set_write_timeout(Some(timeout)))
                    .map_err(|e| imap_error("connect", e))?;
                return Ok(tcp);
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(match last_error {
        Some(e) => imap_error("connect", e),
        None => imap_error("resolve", format!("no address for {}", host)),
    })
}

fn tls_handshake(host: &str, tcp: TcpStream) -> Result<TlsStream<TcpStream>> {
    let connector = TlsConnector::new().map_err(|e| imap_error("tls", e))?;
    connector
        .connect(host, tcp)
        .map_err(|e| imap_error("tls", e))
}

/// Log in over TLS: implicit on 993, STARTTLS on any other port. Plaintext
/// sessions are never used.
fn connect(
    host: &str,
    port: u16,
    user: &str,
    password: &str,
    timeout: Duration,
) -> Result<ImapSessionHandle> {
    let tcp = open_socket(host, port, timeout)?;

    let client = if port == 993 {
        let stream: imap::Connection = Box::new(tls_handshake(host, tcp)?);
        let mut client = imap::Client::new(stream);
        client
            .read_greeting()
            .map_err(|e| imap_error("greeting", e))?;
        client
    } else {
        let mut plain = imap::Client::new(tcp);
        plain
            .read_greeting()
            .map_err(|e| imap_error("greeting", e))?;
        plain
            .run_command_and_check_ok("STARTTLS")
            .map_err(|e| imap_error("starttls", e))?;
        let tcp = plain.into_inner().map_err(|e| imap_error("starttls", e))?;
        let stream: imap::Connection = Box::new(tls_handshake(host, tcp)?);
        let mut client = imap::Client::new(stream);
        // The greeting was consumed before the upgrade
        client.greeting_read = true;
        client
    };

    client
        .login(user, password)
        .map_err(|e| imap_error("login", e.0))
}

#[async_trait]
impl InboundMailbox for ImapMailbox {
    async fn open(&self, settings: &MailSettings) -> Result<Box<dyn MailboxSession>> {
        if !settings.has_imap() {
            return Err(Error::Validation("IMAP is not configured".to_string()));
        }

        let host = settings.imap_host.clone();
        let port = settings.imap_port;
        let user = settings.imap_user.clone();
        let password = settings.imap_password.clone();
        let folder = self.folder(settings);
        let timeout = self.timeout;

        debug!(host = %host, port, folder = %folder, "Opening IMAP session");

        let session = blocking(self.timeout, move || {
            let mut session = connect(&host, port, &user, &password, timeout)?;
            session
                .select(&folder)
                .map_err(|e| imap_error("select", e))?;
            Ok(session)
        })
        .await?;

        Ok(Box::new(ImapSession {
            session: Some(session),
            timeout: self.timeout,
        }))
    }

    async fn test_connection(&self, settings: &MailSettings) -> ConnectionCheck {
        match self.open(settings).await {
            Ok(session) => {
                session.close().await;
                ConnectionCheck::ok()
            }
            Err(e) => ConnectionCheck::failed(e.to_string()),
        }
    }
}

/// Session over a selected IMAP folder
pub struct ImapSession {
    /// Taken while an exchange is running; lost if that exchange times out
    session: Option<ImapSessionHandle>,
    timeout: Duration,
}

impl ImapSession {
    async fn exchange<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ImapSessionHandle) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut session = self
            .session
            .take()
            .ok_or_else(|| Error::Transport("IMAP session is no longer usable".to_string()))?;

        let (session, result) = blocking(self.timeout, move || {
            let result = f(&mut session);
            Ok((session, result))
        })
        .await?;

        self.session = Some(session);
        result
    }
}

fn uid_list(uids: &[u32]) -> String {
    uids.iter()
        .map(|uid| uid.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl MailboxSession for ImapSession {
    async fn fetch_unseen(&mut self, limit: usize) -> Result<FetchBatch> {
        let raw = self
            .exchange(move |session| {
                let mut uids: Vec<u32> = session
                    .uid_search("UNSEEN")
                    .map_err(|e| imap_error("search", e))?
                    .into_iter()
                    .collect();
                uids.sort_unstable();
                uids.truncate(limit);
                if uids.is_empty() {
                    return Ok(Vec::new());
                }

                let fetches = session
                    .uid_fetch(uid_list(&uids), "(UID BODY.PEEK[])")
                    .map_err(|e| imap_error("fetch", e))?;

                let mut raw: Vec<(u32, Option<Vec<u8>>)> = fetches
                    .iter()
                    .filter_map(|f| f.uid.map(|uid| (uid, f.body().map(|b| b.to_vec()))))
                    .collect();
                raw.sort_by_key(|(uid, _)| *uid);
                Ok(raw)
            })
            .await?;

        let mut batch = FetchBatch::default();
        for (uid, body) in raw {
            let parsed = match body {
                Some(body) => parse_email(uid, &body),
                None => Err(Error::Parse(format!("UID {}: empty body", uid))),
            };
            match parsed {
                Ok(email) => batch.emails.push(email),
                Err(e) => {
                    warn!(uid, error = %e, "Skipping malformed message");
                    batch.skipped.push(SkippedMessage {
                        uid,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            emails = batch.emails.len(),
            skipped = batch.skipped.len(),
            "Fetched unseen messages"
        );
        Ok(batch)
    }

    async fn mark_seen(&mut self, uid: u32) -> Result<()> {
        self.exchange(move |session| {
            session
                .uid_store(uid.to_string(), "+FLAGS (\\Seen)")
                .map_err(|e| imap_error("store", e))?;
            Ok(())
        })
        .await
    }

    async fn close(mut self: Box<Self>) {
        if self.session.is_none() {
            return;
        }
        if let Err(e) = self
            .exchange(|session| session.logout().map_err(|e| imap_error("logout", e)))
            .await
        {
            debug!(error = %e, "IMAP logout failed");
        }
    }
}
