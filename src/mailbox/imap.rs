//! IMAP (inbound) + SMTP via lettre (outbound) mailbox.
//!
//! IMAP is spoken directly over a rustls stream. All socket work is blocking and
//! runs on tokio's blocking pool; each call opens its own short session.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Message as MimeMessage;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport};
use rustls_pki_types::ServerName;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::config::{EnvLookup, parse_or, required};
use crate::error::{ConfigError, MailboxError};
use crate::mailbox::parse::parse_raw;
use crate::mailbox::{MailboxClient, Message, OutgoingMail};

/// Socket read timeout for IMAP sessions.
const IMAP_READ_TIMEOUT: Duration = Duration::from_secs(30);

// ── Configuration ───────────────────────────────────────────────────

/// Mailbox configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl MailboxConfig {
    /// Build config from a variable lookup. `EMAIL_IMAP_HOST` is required.
    pub fn from_vars(vars: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let imap_host = required(vars, "EMAIL_IMAP_HOST")?;
        let smtp_host = vars("EMAIL_SMTP_HOST").unwrap_or_else(|| imap_host.replace("imap", "smtp"));
        let username = vars("EMAIL_USERNAME").unwrap_or_default();
        let password = SecretString::from(vars("EMAIL_PASSWORD").unwrap_or_default());
        let from_address = vars("EMAIL_FROM_ADDRESS").unwrap_or_else(|| username.clone());

        Ok(Self {
            imap_port: parse_or(vars, "EMAIL_IMAP_PORT", 993)?,
            smtp_port: parse_or(vars, "EMAIL_SMTP_PORT", 587)?,
            imap_host,
            smtp_host,
            username,
            password,
            from_address,
        })
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Production mailbox: IMAP over TLS for the inbox, SMTP for replies.
pub struct ImapMailbox {
    config: MailboxConfig,
}

impl ImapMailbox {
    pub fn new(config: MailboxConfig) -> Self {
        Self { config }
    }

    pub fn from_address(&self) -> &str {
        &self.config.from_address
    }
}

#[async_trait]
impl MailboxClient for ImapMailbox {
    async fn list_unread(&self) -> Result<Vec<Message>, MailboxError> {
        let cfg = self.config.clone();
        let messages = run_blocking(move || fetch_unread(&cfg)).await?;
        debug!(count = messages.len(), "Listed unread messages");
        Ok(messages)
    }

    async fn mark_read(&self, id: &str) -> Result<(), MailboxError> {
        let cfg = self.config.clone();
        let uid = id.to_string();
        run_blocking(move || mark_seen(&cfg, &uid)).await
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailboxError> {
        let cfg = self.config.clone();
        let mail = mail.clone();
        run_blocking(move || send_smtp(&cfg, &mail)).await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, MailboxError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, MailboxError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MailboxError::unavailable(format!("mailbox task panicked: {e}")))?
}

// ── IMAP session ────────────────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// A logged-in IMAP session with INBOX selected.
struct ImapSession {
    tls: TlsStream,
    next_tag: u32,
}

impl ImapSession {
    fn open(config: &MailboxConfig) -> Result<Self, MailboxError> {
        let io = |e: std::io::Error| MailboxError::unavailable(format!("IMAP I/O: {e}"));

        let tcp = TcpStream::connect((&*config.imap_host, config.imap_port)).map_err(io)?;
        tcp.set_read_timeout(Some(IMAP_READ_TIMEOUT)).map_err(io)?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = ServerName::try_from(config.imap_host.clone())
            .map_err(|e| MailboxError::unavailable(format!("invalid IMAP host: {e}")))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailboxError::unavailable(format!("TLS setup failed: {e}")))?;

        let mut session = Self {
            tls: rustls::StreamOwned::new(conn, tcp),
            next_tag: 1,
        };

        let _greeting = read_line(&mut session.tls)?;

        let login = session.command(&format!(
            "LOGIN {} {}",
            quoted(&config.username),
            quoted(config.password.expose_secret())
        ))?;
        if !tagged_ok(&login) {
            return Err(MailboxError::unavailable("IMAP login failed"));
        }

        let select = session.command("SELECT \"INBOX\"")?;
        if !tagged_ok(&select) {
            return Err(MailboxError::unavailable("IMAP SELECT INBOX failed"));
        }

        Ok(session)
    }

    /// Send a tagged command and collect every line up to its tagged completion.
    fn command(&mut self, cmd: &str) -> Result<Vec<ResponseLine>, MailboxError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        let full = format!("{tag} {cmd}\r\n");
        self.tls
            .write_all(full.as_bytes())
            .and_then(|()| self.tls.flush())
            .map_err(|e| MailboxError::unavailable(format!("IMAP write: {e}")))?;

        read_response(&mut self.tls, &tag)
    }

    fn logout(mut self) {
        if let Err(e) = self.command("LOGOUT") {
            debug!("IMAP logout failed: {e}");
        }
    }
}

/// One logical response line. Literals announced with `{n}` are kept as raw
/// bytes; `text` holds the line with the literals cut out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ResponseLine {
    text: String,
    literals: Vec<Vec<u8>>,
}

/// Quote a string for IMAP (RFC 3501 quoted string).
fn quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Size announced by a trailing `{n}` on a raw line.
fn literal_len(raw: &[u8]) -> Option<usize> {
    let line = raw.strip_suffix(b"\r\n").unwrap_or(raw);
    let inner = line.strip_suffix(b"}")?;
    let open = inner.iter().rposition(|&b| b == b'{')?;
    std::str::from_utf8(&inner[open + 1..]).ok()?.parse().ok()
}

/// Read bytes up to and including CRLF.
fn read_raw_line<R: Read>(reader: &mut R) -> Result<Vec<u8>, MailboxError> {
    let mut buf = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        match reader.read(&mut byte) {
            Ok(0) => return Err(MailboxError::unavailable("IMAP connection closed")),
            Ok(_) => {
                buf.push(byte[0]);
                if buf.ends_with(b"\r\n") {
                    return Ok(buf);
                }
            }
            Err(e) => return Err(MailboxError::unavailable(format!("IMAP read: {e}"))),
        }
    }
}

/// Read one logical line, pulling in every literal it announces.
fn read_line<R: Read>(reader: &mut R) -> Result<ResponseLine, MailboxError> {
    let mut line = ResponseLine::default();
    loop {
        let raw = read_raw_line(reader)?;
        line.text.push_str(&String::from_utf8_lossy(&raw));
        let Some(len) = literal_len(&raw) else {
            return Ok(line);
        };
        let mut literal = vec![0u8; len];
        reader
            .read_exact(&mut literal)
            .map_err(|e| MailboxError::unavailable(format!("IMAP literal read: {e}")))?;
        line.literals.push(literal);
        // The line continues after the literal.
        if line.text.ends_with("\r\n") {
            line.text.truncate(line.text.len() - 2);
        }
    }
}

/// Read lines until the tagged completion for `tag`.
fn read_response<R: Read>(reader: &mut R, tag: &str) -> Result<Vec<ResponseLine>, MailboxError> {
    let prefix = format!("{tag} ");
    let mut lines = Vec::new();
    loop {
        let line = read_line(reader)?;
        let done = line.text.starts_with(&prefix);
        lines.push(line);
        if done {
            return Ok(lines);
        }
    }
}

/// Whether the final (tagged) line of a response reports OK.
fn tagged_ok(lines: &[ResponseLine]) -> bool {
    lines
        .last()
        .and_then(|l| l.text.split_whitespace().nth(1))
        .is_some_and(|status| status.eq_ignore_ascii_case("OK"))
}

/// Parse UIDs out of `* SEARCH` responses, preserving server order.
fn parse_search_uids(lines: &[ResponseLine]) -> Vec<String> {
    lines
        .iter()
        .filter(|l| l.text.starts_with("* SEARCH"))
        .flat_map(|l| l.text.split_whitespace().skip(2).map(str::to_string))
        .collect()
}

/// Whether a line is an untagged FETCH response (`* <n> FETCH ...`).
fn is_fetch(line: &ResponseLine) -> bool {
    let mut words = line.text.split_whitespace();
    words.next() == Some("*")
        && words.next().is_some_and(|n| n.bytes().all(|b| b.is_ascii_digit()))
        && words.next().is_some_and(|w| w.eq_ignore_ascii_case("FETCH"))
}

/// The message bytes of a single-message FETCH response.
fn fetch_literal(lines: &[ResponseLine]) -> Option<&[u8]> {
    lines
        .iter()
        .filter(|l| is_fetch(l))
        .find_map(|l| l.literals.first())
        .map(Vec::as_slice)
}

/// List unread messages without setting `\Seen` (BODY.PEEK).
fn fetch_unread(config: &MailboxConfig) -> Result<Vec<Message>, MailboxError> {
    let mut session = ImapSession::open(config)?;

    let search = session.command("UID SEARCH UNSEEN")?;
    if !tagged_ok(&search) {
        return Err(MailboxError::unavailable("IMAP SEARCH failed"));
    }
    let uids = parse_search_uids(&search);

    let mut messages = Vec::with_capacity(uids.len());
    for uid in &uids {
        let fetch = session.command(&format!("UID FETCH {uid} BODY.PEEK[]"))?;
        if !tagged_ok(&fetch) {
            warn!(uid = %uid, "IMAP FETCH failed, skipping this cycle");
            continue;
        }
        match fetch_literal(&fetch).and_then(|raw| parse_raw(uid, raw)) {
            Some(msg) => messages.push(msg),
            None => warn!(uid = %uid, "Unreadable message, skipping this cycle"),
        }
    }

    session.logout();
    Ok(messages)
}

/// Set `\Seen` on one UID. A UID that no longer exists yields `NotFound`.
fn mark_seen(config: &MailboxConfig, uid: &str) -> Result<(), MailboxError> {
    let mut session = ImapSession::open(config)?;

    let store = session.command(&format!("UID STORE {uid} +FLAGS (\\Seen)"))?;
    session.logout();

    if !tagged_ok(&store) {
        return Err(MailboxError::unavailable(format!("IMAP STORE failed for {uid}")));
    }
    // The server answers with an untagged FETCH per message it touched.
    if !store.iter().any(is_fetch) {
        return Err(MailboxError::NotFound { id: uid.to_string() });
    }

    debug!(uid = %uid, "Marked message as read");
    Ok(())
}

// ── SMTP ────────────────────────────────────────────────────────────

/// Build the MIME message for a reply.
fn build_mime(from: &str, mail: &OutgoingMail) -> Result<MimeMessage, MailboxError> {
    let failed = |reason: String| MailboxError::SendFailed {
        to: mail.to.clone(),
        reason,
    };

    let mut builder = MimeMessage::builder()
        .from(from.parse().map_err(|e| failed(format!("invalid from address: {e}")))?)
        .to(mail.to.parse().map_err(|e| failed(format!("invalid to address: {e}")))?)
        .subject(mail.subject.as_str());

    if let Some(ref id) = mail.in_reply_to {
        builder = builder.in_reply_to(id.clone()).references(id.clone());
    }

    builder
        .body(mail.body.clone())
        .map_err(|e| failed(format!("failed to build email: {e}")))
}

fn send_smtp(config: &MailboxConfig, mail: &OutgoingMail) -> Result<(), MailboxError> {
    let email = build_mime(&config.from_address, mail)?;

    let creds = Credentials::new(
        config.username.clone(),
        config.password.expose_secret().to_string(),
    );
    // 465 is implicit TLS; anything else upgrades with STARTTLS.
    let relay = if config.smtp_port == 465 {
        SmtpTransport::relay(&config.smtp_host)
    } else {
        SmtpTransport::starttls_relay(&config.smtp_host)
    };
    let transport = relay
        .map_err(|e| MailboxError::unavailable(format!("SMTP relay error: {e}")))?
        .port(config.smtp_port)
        .credentials(creds)
        .build();

    transport
        .send(&email)
        .map_err(|e| MailboxError::unavailable(format!("SMTP send failed: {e}")))?;

    info!(to = %mail.to, "Reply sent");
    Ok(())
}
