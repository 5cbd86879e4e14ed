//! The poll loop: list unread mail, classify, book, mark read, sleep.
//!
//! Flow per cycle:
//! 1. `MailboxClient::list_unread()`. A failure here aborts the cycle and
//!    triggers the backoff sleep
//! 2. For each message, in listing order: classify → (book + reply) → mark read.
//!    A failure in any step leaves that message unread and moves on
//! 3. Sleep the poll interval
//!
//! **Invariant:** a message is marked read only after its processing completed.

pub mod clock;
pub mod reply;
pub mod state;

pub use clock::{Clock, Sleeper, SystemClock, TokioSleeper};
pub use state::{CycleReport, LoopState, MessageOutcome};

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::calendar::{BookingAction, CalendarClient};
use crate::classifier::{ClassificationResult, ClassifierAgent};
use crate::config::{LoopConfig, MalformedPolicy, NoAvailabilityPolicy};
use crate::error::{AgentError, Error};
use crate::mailbox::{MailboxClient, Message};

/// Drives the mailbox → classifier → calendar pipeline.
pub struct Orchestrator {
    mailbox: Arc<dyn MailboxClient>,
    calendar: Arc<dyn CalendarClient>,
    classifier: Arc<dyn ClassifierAgent>,
    config: LoopConfig,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl Orchestrator {
    /// Create an orchestrator on the wall clock and tokio timer.
    pub fn new(
        mailbox: Arc<dyn MailboxClient>,
        calendar: Arc<dyn CalendarClient>,
        classifier: Arc<dyn ClassifierAgent>,
        config: LoopConfig,
    ) -> Self {
        Self {
            mailbox,
            calendar,
            classifier,
            config,
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Run cycles until the process is stopped. Never returns on its own.
    pub async fn run_forever(&self) {
        info!(
            poll_secs = self.config.poll_interval.as_secs(),
            backoff_secs = self.config.backoff_interval.as_secs(),
            "Orchestrator started"
        );

        let mut state = LoopState::new();
        loop {
            state = self.tick(state).await;
        }
    }

    /// Run one cycle and the sleep that follows it.
    pub async fn tick(&self, state: LoopState) -> LoopState {
        let started = self.clock.now();
        let cycle = state.cycles + 1;

        match self.run_cycle().await {
            Ok(report) => {
                if !report.is_empty() {
                    info!(
                        cycle,
                        total = report.outcomes.len(),
                        booked = report.count(MessageOutcome::Booked),
                        failed = report.count(MessageOutcome::Failed),
                        "Cycle complete"
                    );
                }
                let state = state.succeeded(started);
                self.sleeper.sleep(self.config.poll_interval).await;
                state
            }
            Err(e) => {
                let state = state.failed(started);
                error!(
                    cycle,
                    consecutive_failures = state.consecutive_failures,
                    kind = e.kind(),
                    error = %e,
                    "Cycle failed, backing off"
                );
                self.sleeper.sleep(self.config.backoff_interval).await;
                state
            }
        }
    }

    /// One pass over the currently unread messages.
    ///
    /// Only a failure to list the mailbox is returned; per-message failures are
    /// logged and reported as [`MessageOutcome::Failed`].
    pub async fn run_cycle(&self) -> Result<CycleReport, Error> {
        let messages = self.call("list_unread", self.mailbox.list_unread()).await?;

        let mut report = CycleReport::default();
        if messages.is_empty() {
            debug!("No unread messages");
            return Ok(report);
        }

        info!(count = messages.len(), "Processing unread messages");

        for message in &messages {
            let outcome = match self.process_message(message).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        id = %message.id,
                        sender = %message.sender,
                        kind = e.kind(),
                        error = %e,
                        "Message processing failed, leaving unread"
                    );
                    MessageOutcome::Failed
                }
            };
            debug!(id = %message.id, outcome = outcome.label(), "Message done");
            report.record(&message.id, outcome);
        }

        Ok(report)
    }

    /// Classify one message, act on it, and mark it read once done.
    async fn process_message(&self, message: &Message) -> Result<MessageOutcome, Error> {
        if self.is_self_sent(message) {
            debug!(id = %message.id, "Skipping self-sent email");
            self.mark_read(message).await?;
            return Ok(MessageOutcome::NotRelevant);
        }

        let text = format!(
            "From: {}\nSubject: {}\n\n{}",
            message.sender, message.subject, message.body
        );
        let classification = match self.call("classify", self.classifier.classify(&text)).await {
            Ok(c) => c,
            Err(Error::Agent(AgentError::MalformedResponse { reason }))
                if self.config.malformed_policy == MalformedPolicy::Drop =>
            {
                warn!(id = %message.id, reason = %reason, "Malformed classification, dropping message");
                self.mark_read(message).await?;
                return Ok(MessageOutcome::Dropped);
            }
            Err(e) => return Err(e),
        };

        if !classification.is_appointment_request {
            debug!(id = %message.id, sender = %message.sender, "Not an appointment request");
            self.mark_read(message).await?;
            return Ok(MessageOutcome::NotRelevant);
        }

        let outcome = self.book(message, &classification).await?;
        if outcome.marked_read() {
            self.mark_read(message).await?;
        }
        Ok(outcome)
    }

    /// Check availability and reply with a booking link (or a no-slot notice).
    async fn book(
        &self,
        message: &Message,
        classification: &ClassificationResult,
    ) -> Result<MessageOutcome, Error> {
        let kind = classification.appointment_type;
        info!(
            id = %message.id,
            sender = %message.sender,
            kind = kind.as_str(),
            "Appointment request, checking availability"
        );

        let slots = self
            .call("check_availability", self.calendar.check_availability(None))
            .await?;

        let Some(slot) = slots.first().copied() else {
            return match self.config.no_availability_policy {
                NoAvailabilityPolicy::Defer => {
                    info!(id = %message.id, "No availability, deferring to a later cycle");
                    Ok(MessageOutcome::Deferred)
                }
                NoAvailabilityPolicy::Notify => {
                    let notice = reply::no_availability_reply(message, kind);
                    self.call("send", self.mailbox.send(&notice)).await?;
                    info!(id = %message.id, to = %notice.to, "No availability, notice sent");
                    Ok(MessageOutcome::NoAvailabilityNotified)
                }
            };
        };

        let link = self
            .call("make_booking_link", self.calendar.make_booking_link(Some(&slot), kind))
            .await?;
        let action = BookingAction {
            recipient: message.sender.clone(),
            link,
            slot: Some(slot),
        };

        let mail = reply::booking_reply(message, &action, kind);
        self.call("send", self.mailbox.send(&mail)).await?;
        info!(id = %message.id, to = %action.recipient, link = %action.link, "Booking link sent");

        Ok(MessageOutcome::Booked)
    }

    async fn mark_read(&self, message: &Message) -> Result<(), Error> {
        self.call("mark_read", self.mailbox.mark_read(&message.id)).await
    }

    fn is_self_sent(&self, message: &Message) -> bool {
        self.config
            .self_address
            .as_deref()
            .is_some_and(|me| me.eq_ignore_ascii_case(&message.sender))
    }

    /// Await an external call, applying the optional per-call timeout.
    async fn call<T, E, F>(&self, operation: &str, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<Error>,
    {
        match self.config.call_timeout {
            None => fut.await.map_err(Into::into),
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(Error::timed_out(operation, limit)),
            },
        }
    }
}
