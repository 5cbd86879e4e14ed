//! Reply composition. Plain text only.

use crate::calendar::BookingAction;
use crate::classifier::AppointmentType;
use crate::mailbox::{Message, OutgoingMail};

/// `Re: <subject>`, without stacking prefixes.
pub fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    if trimmed.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("re:")) {
        trimmed.to_string()
    } else if trimmed.is_empty() {
        "Re: Your appointment request".to_string()
    } else {
        format!("Re: {trimmed}")
    }
}

fn request_noun(kind: AppointmentType) -> &'static str {
    match kind {
        AppointmentType::General => "appointment",
        AppointmentType::FollowUp => "follow-up appointment",
        AppointmentType::Consultation => "consultation",
    }
}

/// Reply carrying the booking link.
pub fn booking_reply(original: &Message, action: &BookingAction, kind: AppointmentType) -> OutgoingMail {
    let mut body = format!(
        "Thank you for requesting a {}.\n\nPlease use this link to schedule it:\n{}\n",
        request_noun(kind),
        action.link
    );
    if let Some(slot) = action.slot {
        body.push_str(&format!(
            "\nThe earliest opening is {}.\n",
            slot.start.format("%A %B %-d, %H:%M UTC")
        ));
    }
    body.push_str("\nIf you have any questions, just reply to this email.\n");

    OutgoingMail {
        to: action.recipient.clone(),
        subject: reply_subject(&original.subject),
        body,
        in_reply_to: original.message_id.clone(),
    }
}

/// Reply sent when no slot is free.
pub fn no_availability_reply(original: &Message, kind: AppointmentType) -> OutgoingMail {
    OutgoingMail {
        to: original.sender.clone(),
        subject: reply_subject(&original.subject),
        body: format!(
            "Thank you for requesting a {}.\n\nUnfortunately there are no open slots at the moment. \
             We will be in touch as soon as one becomes available.\n",
            request_noun(kind)
        ),
        in_reply_to: original.message_id.clone(),
    }
}
