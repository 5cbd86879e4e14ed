//! Appointment Desk: answers appointment-request emails with booking links.

pub mod calendar;
pub mod classifier;
pub mod config;
pub mod error;
pub mod llm;
pub mod mailbox;
pub mod orchestrator;
