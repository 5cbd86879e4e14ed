//! Mailbox access: the unread-message work queue and reply transport.
//!
//! The orchestrator only sees the [`MailboxClient`] trait. [`ImapMailbox`] is the
//! production implementation (IMAP for reading, SMTP for replies).

pub mod imap;
pub mod parse;

pub use imap::{ImapMailbox, MailboxConfig};

use async_trait::async_trait;

use crate::error::MailboxError;

/// Read state of a mailbox item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    Unread,
    Read,
}

/// An inbound email as listed by the mailbox.
#[derive(Debug, Clone)]
pub struct Message {
    /// Stable mailbox identifier (IMAP UID).
    pub id: String,
    /// Sender address.
    pub sender: String,
    pub subject: String,
    /// Readable body text, quotes stripped.
    pub body: String,
    pub read_state: ReadState,
    /// RFC 5322 `Message-ID`, angle brackets included.
    pub message_id: Option<String>,
}

impl Message {
    /// Build an unread message with no `Message-ID` header.
    pub fn unread(
        id: impl Into<String>,
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            subject: subject.into(),
            body: body.into(),
            read_state: ReadState::Unread,
            message_id: None,
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }
}

/// An outbound plain-text reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// `Message-ID` of the message being answered, for threading.
    pub in_reply_to: Option<String>,
}

/// Mailbox operations consumed by the orchestrator.
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// List unread messages in arrival order. Must not change read state.
    async fn list_unread(&self) -> Result<Vec<Message>, MailboxError>;

    /// Mark one message read.
    async fn mark_read(&self, id: &str) -> Result<(), MailboxError>;

    /// Send a reply.
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailboxError>;
}
