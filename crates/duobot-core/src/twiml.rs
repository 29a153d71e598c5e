//! TwiML messaging responses.
//!
//! The gateway expects a synchronous webhook reply in the shape
//! `<Response><Message>text</Message></Response>` served as `text/xml`.

pub const CONTENT_TYPE: &str = "text/xml";

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Builder for a `<Response>` document.
#[derive(Debug, Default, Clone)]
pub struct MessagingResponse {
    messages: Vec<String>,
}

impl MessagingResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `<Message>` element.
    pub fn message(mut self, body: impl Into<String>) -> Self {
        self.messages.push(body.into());
        self
    }

    pub fn render(&self) -> String {
        if self.messages.is_empty() {
            return format!("{XML_DECLARATION}<Response/>");
        }
        let mut out = String::from(XML_DECLARATION);
        out.push_str("<Response>");
        for body in &self.messages {
            out.push_str("<Message>");
            out.push_str(&escape_xml(body));
            out.push_str("</Message>");
        }
        out.push_str("</Response>");
        out
    }
}

impl std::fmt::Display for MessagingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// Escape text for use as XML character data.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
