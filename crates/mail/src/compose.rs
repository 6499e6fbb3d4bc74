//! Reply composition
//!
//! Turns an HTML reply template and the original message into the text and
//! HTML bodies of a reply that quotes the original below an attribution
//! line.

use chrono::Local;
use log::warn;

use crate::error::{Error, Result};
use crate::models::Message;

/// Wrap width for HTML converted to plain text
const TEXT_WIDTH: usize = 80;

/// Bodies of a composed reply
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedReply {
    pub text_body: String,
    pub html_body: Option<String>,
}

/// Builds reply bodies from a template and the quoted original
pub trait ReplyComposer: Send + Sync {
    fn compose(
        &self,
        template: &str,
        quoted_text: Option<&str>,
        quoted_html: Option<&str>,
        attribution: Option<&str>,
    ) -> Result<ComposedReply>;
}

/// Composer that quotes the original message below the template
///
/// The text body quotes with `> ` prefixes; the HTML body wraps the
/// original in a `<blockquote type="cite">`.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotingComposer;

impl ReplyComposer for QuotingComposer {
    fn compose(
        &self,
        template: &str,
        quoted_text: Option<&str>,
        quoted_html: Option<&str>,
        attribution: Option<&str>,
    ) -> Result<ComposedReply> {
        let content = html_to_text(template);
        let content = content.trim_end();
        if content.trim().is_empty() {
            return Err(Error::configuration("Reply content is empty"));
        }

        let original = match (quoted_text, quoted_html) {
            (Some(text), _) if !text.trim().is_empty() => Some(text.to_string()),
            (_, Some(html)) => Some(html_to_text(html)),
            _ => None,
        };

        let mut text_body = content.to_string();
        let mut html_body = template.trim_end().to_string();

        if let Some(original) = original {
            text_body.push_str("\n\n");
            html_body.push('\n');
            if let Some(line) = attribution {
                text_body.push_str(line);
                text_body.push('\n');
                html_body.push_str(&format!("<p>{}</p>\n", escape_html(line)));
            }
            text_body.push_str(&quote_text(&original));

            let quoted = match quoted_html {
                Some(html) => html.to_string(),
                None => escape_html(&original).replace('\n', "<br>\n"),
            };
            html_body.push_str(&format!(
                "<blockquote type=\"cite\">\n{}\n</blockquote>\n",
                quoted.trim_end()
            ));
        }

        Ok(ComposedReply {
            text_body,
            html_body: Some(html_body),
        })
    }
}

/// `On <date>, <Name> <address> wrote:` for a message, when it has a sender
/// and a received time
pub fn attribution_line(message: &Message) -> Option<String> {
    let sender = message.sender()?;
    let received_at = message.received_at?;
    let who = format!(
        "{} <{}>",
        sender.name.as_deref().unwrap_or_default(),
        sender.email
    );
    let when = received_at
        .with_timezone(&Local)
        .format("%a %b %-d %Y %H:%M %Z");
    Some(format!("On {}, {} wrote:", when, who.trim()))
}

/// Value of the `User-Agent` header on sent replies
pub fn user_agent() -> String {
    format!("responder/{}", env!("CARGO_PKG_VERSION"))
}

fn html_to_text(html: &str) -> String {
    html2text::config::plain()
        .string_from_read(html.as_bytes(), TEXT_WIDTH)
        .unwrap_or_else(|e| {
            warn!("Could not convert HTML to text: {}", e);
            html.to_string()
        })
}

fn quote_text(text: &str) -> String {
    text.trim_end()
        .lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
