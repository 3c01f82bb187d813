//! MIME decoding of raw messages.
//!
//! Splits a raw message into its text and HTML bodies and three groups of
//! remaining parts: attachments, inlines and others.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use mail_parser::{Address, Message, MessageParser, MessagePart, MimeHeaders, PartType};
use serde::Serialize;

use crate::model::EmailContent;
use crate::{Error, Result};

/// Group of non-body parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// `Content-Disposition: attachment`, or a named part without disposition.
    Attachments,
    /// `Content-Disposition: inline`.
    Inlines,
    /// Everything else.
    Others,
}

impl Disposition {
    /// Returns the disposition as a request parameter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Attachments => "attachments",
            Self::Inlines => "inlines",
            Self::Others => "others",
        }
    }

    fn of(part: &MessagePart<'_>) -> Self {
        match part.content_disposition() {
            Some(d) if d.is_attachment() => Self::Attachments,
            Some(d) if d.is_inline() => Self::Inlines,
            _ if part.attachment_name().is_some() => Self::Attachments,
            _ => Self::Others,
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Disposition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "attachments" => Ok(Self::Attachments),
            "inlines" => Ok(Self::Inlines),
            "others" => Ok(Self::Others),
            _ => Err(Error::InvalidInput(format!("invalid disposition: {s:?}"))),
        }
    }
}

/// Metadata of one non-body part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartInfo {
    /// `Content-ID` without angle brackets.
    #[serde(rename = "contentID")]
    pub content_id: String,
    /// `type/subtype`.
    pub content_type: String,
    /// Declared file name.
    pub filename: String,
}

/// Decoded bodies and part listing of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    /// Plain text body.
    pub text: String,
    /// HTML body.
    pub html: String,
    /// Attachment parts.
    pub attachments: Vec<PartInfo>,
    /// Inline parts.
    pub inlines: Vec<PartInfo>,
    /// Remaining parts.
    pub other_parts: Vec<PartInfo>,
}

/// One part with its decoded content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Part metadata.
    pub info: PartInfo,
    /// Decoded bytes.
    pub content: Vec<u8>,
}

/// Header fields of a raw message, for ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMessage {
    /// `Message-ID` without angle brackets.
    pub message_id: Option<String>,
    /// Parsed `Date` header.
    pub date: Option<DateTime<Utc>>,
    /// Record payload derived from the headers and bodies.
    pub content: EmailContent,
}

fn parse(raw: &[u8]) -> Result<Message<'_>> {
    MessageParser::default()
        .parse(raw)
        .ok_or_else(|| Error::Mime("message could not be parsed".to_string()))
}

fn strip_brackets(id: &str) -> &str {
    let id = id.trim();
    id.strip_prefix('<')
        .and_then(|id| id.strip_suffix('>'))
        .unwrap_or(id)
}

fn part_info(part: &MessagePart<'_>) -> PartInfo {
    PartInfo {
        content_id: part.content_id().map(strip_brackets).unwrap_or_default().to_string(),
        content_type: part
            .content_type()
            .map(|ct| match ct.subtype() {
                Some(subtype) => format!("{}/{subtype}", ct.ctype()),
                None => ct.ctype().to_string(),
            })
            .unwrap_or_default(),
        filename: part.attachment_name().unwrap_or_default().to_string(),
    }
}

/// Text and HTML parts that are bodies rather than attachments.
fn is_body(part: &MessagePart<'_>) -> bool {
    matches!(part.body, PartType::Text(_) | PartType::Html(_))
        && part.content_disposition().is_none_or(|d| !d.is_attachment())
        && part.attachment_name().is_none()
        && part.content_id().is_none()
}

fn non_body_parts<'a, 'x>(message: &'a Message<'x>) -> impl Iterator<Item = &'a MessagePart<'x>> {
    message
        .parts
        .iter()
        .filter(|part| !matches!(part.body, PartType::Multipart(_)) && !is_body(part))
}

fn text_body(message: &Message<'_>) -> String {
    message
        .text_bodies()
        .find_map(|part| match &part.body {
            PartType::Text(text) => Some(text.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

fn html_body(message: &Message<'_>) -> String {
    message
        .html_bodies()
        .find_map(|part| match &part.body {
            PartType::Html(html) => Some(html.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

fn addresses(address: Option<&Address<'_>>) -> Vec<String> {
    address
        .map(|addrs| {
            addrs
                .iter()
                .filter_map(|addr| addr.address())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Decodes bodies and lists parts.
///
/// # Errors
///
/// Returns `Mime` if the bytes are not a message.
pub fn parse_body(raw: &[u8]) -> Result<Body> {
    let message = parse(raw)?;
    let mut body = Body {
        text: text_body(&message),
        html: html_body(&message),
        ..Body::default()
    };

    for part in non_body_parts(&message) {
        let info = part_info(part);
        match Disposition::of(part) {
            Disposition::Attachments => body.attachments.push(info),
            Disposition::Inlines => body.inlines.push(info),
            Disposition::Others => body.other_parts.push(info),
        }
    }
    Ok(body)
}

/// Finds the part of `disposition` whose `Content-ID` is `content_id`.
///
/// # Errors
///
/// Returns `Mime` if the bytes are not a message and `NotFound` if no part
/// matches.
pub fn find_part(raw: &[u8], disposition: Disposition, content_id: &str) -> Result<Part> {
    let wanted = strip_brackets(content_id);
    let message = parse(raw)?;
    non_body_parts(&message)
        .filter(|part| Disposition::of(part) == disposition)
        .find(|part| part.content_id().map(strip_brackets) == Some(wanted))
        .map(|part| Part {
            info: part_info(part),
            content: part.contents().to_vec(),
        })
        .ok_or(Error::NotFound)
}

/// Reads the headers and bodies that make up a record's payload.
///
/// # Errors
///
/// Returns `Mime` if the bytes are not a message.
pub fn parse_message(raw: &[u8]) -> Result<ParsedMessage> {
    let message = parse(raw)?;

    let from = addresses(message.from());
    let to = addresses(message.to());
    let mut destination = to.clone();
    destination.extend(addresses(message.cc()));
    destination.extend(addresses(message.bcc()));

    let content = EmailContent {
        subject: message.subject().unwrap_or_default().to_string(),
        date_sent: message
            .header_raw("Date")
            .map(str::trim)
            .unwrap_or_default()
            .to_string(),
        source: from.first().cloned().unwrap_or_default(),
        destination,
        return_path: message
            .header_raw("Return-Path")
            .map(strip_brackets)
            .unwrap_or_default()
            .to_string(),
        text: text_body(&message),
        html: html_body(&message),
        from,
        to,
    };

    Ok(ParsedMessage {
        message_id: message.message_id().map(|id| strip_brackets(id).to_string()),
        date: message
            .date()
            .and_then(|date| DateTime::from_timestamp(date.to_timestamp(), 0)),
        content,
    })
}
