//! Recording collaborators for orchestrator tests (no network, no real sleeps).

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use appointment_desk::calendar::{CalendarClient, Slot, TimeRange, booking_link};
use appointment_desk::classifier::{AppointmentType, ClassificationResult, ClassifierAgent};
use appointment_desk::config::LoopConfig;
use appointment_desk::error::{AgentError, CalendarError, LlmError, MailboxError};
use appointment_desk::mailbox::{MailboxClient, Message, OutgoingMail};
use appointment_desk::orchestrator::{Clock, Orchestrator, Sleeper};

pub const POLL: Duration = Duration::from_secs(300);
pub const BACKOFF: Duration = Duration::from_secs(60);

/// Everything the collaborators were asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ListUnread,
    Classify(String),
    CheckAvailability,
    MakeLink(AppointmentType),
    Send(OutgoingMail),
    MarkRead(String),
    Sleep(Duration),
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub fn events(log: &EventLog) -> Vec<Event> {
    log.lock().unwrap().clone()
}

pub fn sends(log: &EventLog) -> Vec<OutgoingMail> {
    events(log)
        .into_iter()
        .filter_map(|e| match e {
            Event::Send(mail) => Some(mail),
            _ => None,
        })
        .collect()
}

pub fn marked_read(log: &EventLog) -> Vec<String> {
    events(log)
        .into_iter()
        .filter_map(|e| match e {
            Event::MarkRead(id) => Some(id),
            _ => None,
        })
        .collect()
}

pub fn count(log: &EventLog, pred: impl Fn(&Event) -> bool) -> usize {
    events(log).iter().filter(|e| pred(e)).count()
}

// ── Mailbox ─────────────────────────────────────────────────────────

/// In-memory inbox. `mark_read` removes the message from the unread set.
pub struct FakeMailbox {
    log: EventLog,
    unread: Mutex<Vec<Message>>,
    list_failures: Mutex<u32>,
    fail_send: Mutex<bool>,
    fail_mark_read: Mutex<bool>,
    vanish_on_mark: Mutex<HashSet<String>>,
}

impl FakeMailbox {
    pub fn new(log: &EventLog, unread: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::clone(log),
            unread: Mutex::new(unread),
            list_failures: Mutex::new(0),
            fail_send: Mutex::new(false),
            fail_mark_read: Mutex::new(false),
            vanish_on_mark: Mutex::new(HashSet::new()),
        })
    }

    /// Make the next `n` listings fail.
    pub fn fail_listing(&self, n: u32) {
        *self.list_failures.lock().unwrap() = n;
    }

    pub fn fail_sends(&self, fail: bool) {
        *self.fail_send.lock().unwrap() = fail;
    }

    pub fn fail_mark_read(&self, fail: bool) {
        *self.fail_mark_read.lock().unwrap() = fail;
    }

    /// Simulate the message disappearing between list and mark.
    pub fn vanish_before_mark(&self, id: &str) {
        self.vanish_on_mark.lock().unwrap().insert(id.to_string());
    }

    pub fn unread_ids(&self) -> Vec<String> {
        self.unread.lock().unwrap().iter().map(|m| m.id.clone()).collect()
    }
}

#[async_trait]
impl MailboxClient for FakeMailbox {
    async fn list_unread(&self) -> Result<Vec<Message>, MailboxError> {
        self.log.lock().unwrap().push(Event::ListUnread);
        let mut failures = self.list_failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(MailboxError::unavailable("IMAP login failed"));
        }
        Ok(self.unread.lock().unwrap().clone())
    }

    async fn mark_read(&self, id: &str) -> Result<(), MailboxError> {
        self.log.lock().unwrap().push(Event::MarkRead(id.to_string()));
        if *self.fail_mark_read.lock().unwrap() {
            return Err(MailboxError::unavailable("IMAP STORE failed"));
        }
        let mut unread = self.unread.lock().unwrap();
        if self.vanish_on_mark.lock().unwrap().contains(id) {
            unread.retain(|m| m.id != id);
        }
        let before = unread.len();
        unread.retain(|m| m.id != id);
        if unread.len() == before {
            return Err(MailboxError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailboxError> {
        if *self.fail_send.lock().unwrap() {
            return Err(MailboxError::unavailable("SMTP send failed"));
        }
        self.log.lock().unwrap().push(Event::Send(mail.clone()));
        Ok(())
    }
}

// ── Classifier ──────────────────────────────────────────────────────

type Rule = Box<dyn Fn(&str) -> Result<ClassificationResult, AgentError> + Send + Sync>;

/// Classifier driven by a closure over the message text.
pub struct ScriptedClassifier {
    log: EventLog,
    rule: Rule,
}

impl ScriptedClassifier {
    pub fn new(
        log: &EventLog,
        rule: impl Fn(&str) -> Result<ClassificationResult, AgentError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::clone(log),
            rule: Box::new(rule),
        })
    }

    /// Appointment iff the text mentions "appointment".
    pub fn by_keyword(log: &EventLog) -> Arc<Self> {
        Self::new(log, |text| {
            Ok(if text.contains("appointment") {
                ClassificationResult::appointment(AppointmentType::General)
            } else {
                ClassificationResult::not_relevant()
            })
        })
    }
}

#[async_trait]
impl ClassifierAgent for ScriptedClassifier {
    async fn classify(&self, text: &str) -> Result<ClassificationResult, AgentError> {
        self.log.lock().unwrap().push(Event::Classify(text.to_string()));
        (self.rule)(text)
    }
}

/// Classifier that never answers.
pub struct HangingClassifier;

#[async_trait]
impl ClassifierAgent for HangingClassifier {
    async fn classify(&self, _text: &str) -> Result<ClassificationResult, AgentError> {
        std::future::pending().await
    }
}

pub fn malformed() -> AgentError {
    AgentError::MalformedResponse {
        reason: "JSON parse error: expected value".into(),
    }
}

pub fn agent_down() -> AgentError {
    AgentError::Unavailable(LlmError::RequestFailed {
        provider: "mock".into(),
        reason: "503".into(),
    })
}

// ── Calendar ────────────────────────────────────────────────────────

pub fn slot_at(hour: u32) -> Slot {
    let start = Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap();
    Slot {
        start,
        end: start + chrono::Duration::hours(1),
    }
}

pub struct FakeCalendar {
    log: EventLog,
    slots: Mutex<Vec<Slot>>,
    fail_availability: Mutex<bool>,
    fail_links: Mutex<bool>,
}

impl FakeCalendar {
    pub fn new(log: &EventLog, slots: Vec<Slot>) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::clone(log),
            slots: Mutex::new(slots),
            fail_availability: Mutex::new(false),
            fail_links: Mutex::new(false),
        })
    }

    pub fn fail_availability(&self, fail: bool) {
        *self.fail_availability.lock().unwrap() = fail;
    }

    pub fn fail_links(&self, fail: bool) {
        *self.fail_links.lock().unwrap() = fail;
    }
}

#[async_trait]
impl CalendarClient for FakeCalendar {
    async fn check_availability(&self, _range: Option<TimeRange>) -> Result<Vec<Slot>, CalendarError> {
        self.log.lock().unwrap().push(Event::CheckAvailability);
        if *self.fail_availability.lock().unwrap() {
            return Err(CalendarError::unavailable("free/busy returned 503"));
        }
        Ok(self.slots.lock().unwrap().clone())
    }

    async fn make_booking_link(
        &self,
        slot: Option<&Slot>,
        kind: AppointmentType,
    ) -> Result<String, CalendarError> {
        self.log.lock().unwrap().push(Event::MakeLink(kind));
        if *self.fail_links.lock().unwrap() {
            return Err(CalendarError::InvalidUrl("booking base unset".into()));
        }
        booking_link("https://clinic.test/book", slot, kind)
    }
}

// ── Time ────────────────────────────────────────────────────────────

pub struct RecordingSleeper {
    log: EventLog,
}

impl RecordingSleeper {
    pub fn new(log: &EventLog) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::clone(log),
        })
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.log.lock().unwrap().push(Event::Sleep(duration));
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
}

// ── Wiring ──────────────────────────────────────────────────────────

pub fn loop_config() -> LoopConfig {
    LoopConfig {
        poll_interval: POLL,
        backoff_interval: BACKOFF,
        self_address: Some("desk@clinic.test".into()),
        ..LoopConfig::default()
    }
}

pub fn orchestrator(
    log: &EventLog,
    mailbox: Arc<FakeMailbox>,
    calendar: Arc<FakeCalendar>,
    classifier: Arc<dyn ClassifierAgent>,
    config: LoopConfig,
) -> Orchestrator {
    Orchestrator::new(mailbox, calendar, classifier, config)
        .with_clock(Arc::new(FixedClock(fixed_now())))
        .with_sleeper(RecordingSleeper::new(log))
}

pub fn appointment(id: &str, sender: &str) -> Message {
    Message::unread(id, sender, "Booking", "Hi, I'd like to make an appointment next week.")
        .with_message_id(format!("<{id}@mail.test>"))
}

pub fn spam(id: &str) -> Message {
    Message::unread(id, "promo@deals.test", "Huge savings", "Buy three, get one free!")
}
