//! Saved email messages (`.eml`).
//!
//! MIME decoding is left to `mail-parser`. The body is the first inline
//! `text/plain` part, or the first HTML part when there is none.

use super::DocumentMeta;
use chrono::{DateTime, Utc};
use mail_parser::{Addr, MessageParser};

pub(super) struct Message {
    pub meta: DocumentMeta,
    pub body: String,
    pub is_html: bool,
}

pub(super) fn parse(raw: &[u8]) -> Message {
    let Some(parsed) = MessageParser::default().parse(raw) else {
        return Message {
            meta: DocumentMeta::default(),
            body: String::from_utf8_lossy(raw).into_owned(),
            is_html: false,
        };
    };

    let subject = parsed
        .subject()
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty());
    let sender = parsed
        .from()
        .and_then(|from| from.first())
        .and_then(format_addr);
    let received = parsed
        .date()
        .filter(|date| date.is_valid())
        .and_then(|date| DateTime::<Utc>::from_timestamp(date.to_timestamp(), 0));

    // html-only messages list their HTML part among the text bodies too
    let plain = parsed
        .text_bodies()
        .find(|part| part.is_text() && !part.is_text_html())
        .and_then(|part| part.text_contents());

    let (body, is_html) = match plain {
        Some(text) => (text.replace("\r\n", "\n"), false),
        None => match parsed.body_html(0) {
            Some(html) => (html.into_owned(), true),
            None => (String::new(), false),
        },
    };

    Message {
        meta: DocumentMeta {
            subject,
            sender,
            received,
        },
        body,
        is_html,
    }
}

fn format_addr(addr: &Addr<'_>) -> Option<String> {
    let address = addr.address().filter(|a| !a.is_empty());
    let name = addr.name().map(str::trim).filter(|n| !n.is_empty());
    match (name, address) {
        (Some(name), Some(address)) => Some(format!("{name} <{address}>")),
        (None, Some(address)) => Some(address.to_string()),
        (Some(name), None) => Some(name.to_string()),
        (None, None) => None,
    }
}
