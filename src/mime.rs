//! Message text assembly
//!
//! Builds the plain-text block sent for summarization from a displayed
//! message: `From`, `Subject`, `Date`, and `Content` lines. Messages can be
//! described field by field ([`MessageView`]) or parsed from RFC822 source
//! with `mailparse`; HTML-only bodies are flattened with `html2text`.
//!
//! [`MessageView::from_rfc822`] is the entry point for embedders that hold
//! raw message source; [`crate::panel::PanelRuntime::select_raw_message`] uses it.

use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::errors::{ServiceError, ServiceResult};

/// Assembled text shorter than this is not worth summarizing
pub const MIN_MESSAGE_DATA_CHARS: usize = 10;

/// Wrap width used when flattening HTML bodies
const HTML_TEXT_WIDTH: usize = 120;

/// A message as displayed to the user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageView {
    /// Stable content hash, preferred message identifier
    pub hash: Option<String>,
    /// Folder holding the message
    pub folder: Option<String>,
    /// UID within the folder
    pub uid: Option<u32>,
    /// Sender, display form
    pub from: String,
    /// Subject line
    pub subject: String,
    /// Display date
    pub date: String,
    /// Plain text body
    pub body_text: Option<String>,
    /// HTML body, used only when no plain text body exists
    pub body_html: Option<String>,
    /// Other messages known to be in the same conversation
    pub thread_siblings: usize,
    /// `In-Reply-To` value, if any
    pub in_reply_to: Option<String>,
}

impl MessageView {
    /// Stable identifier for caching
    ///
    /// The content hash when present, otherwise `folder_uid`, otherwise
    /// empty (which disables caching for the message).
    pub fn message_id(&self) -> String {
        if let Some(hash) = self.hash.as_deref().filter(|h| !h.is_empty()) {
            return hash.to_owned();
        }
        match (self.folder.as_deref(), self.uid) {
            (Some(folder), Some(uid)) if !folder.is_empty() && uid > 0 => {
                format!("{folder}_{uid}")
            }
            _ => String::new(),
        }
    }

    /// Best-effort conversation size, at least 1
    ///
    /// Known siblings plus this message; a reply with no known siblings
    /// counts as two.
    pub fn thread_count(&self) -> u32 {
        if self.thread_siblings > 0 {
            u32::try_from(self.thread_siblings)
                .unwrap_or(u32::MAX - 1)
                .saturating_add(1)
        } else if self.in_reply_to.as_deref().is_some_and(|r| !r.trim().is_empty()) {
            2
        } else {
            1
        }
    }

    /// Body as plain text, falling back to the flattened HTML body
    pub fn body(&self) -> String {
        if let Some(text) = self.body_text.as_deref().filter(|t| !t.trim().is_empty()) {
            return text.to_owned();
        }
        self.body_html
            .as_deref()
            .map(html_to_text)
            .unwrap_or_default()
    }

    /// Text block sent to the summarization webhook
    pub fn assemble(&self) -> String {
        format!(
            "From: {}\nSubject: {}\nDate: {}\nContent: {}",
            self.from,
            self.subject,
            self.date,
            self.body()
        )
    }

    /// Assemble and check there is enough to summarize
    ///
    /// # Errors
    ///
    /// Returns `NoInput` if the assembled text is shorter than
    /// [`MIN_MESSAGE_DATA_CHARS`].
    pub fn assemble_checked(&self) -> ServiceResult<String> {
        let text = self.assemble();
        ensure_enough_text(&text)?;
        Ok(text)
    }

    /// Build a view from RFC822 source
    ///
    /// The content hash is a SHA-256 of the raw bytes. Conversation size is
    /// taken from the `References` header.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `mailparse` cannot parse the message.
    pub fn from_rfc822(raw: &[u8], folder: Option<&str>, uid: Option<u32>) -> ServiceResult<Self> {
        let parsed = mailparse::parse_mail(raw)
            .map_err(|e| ServiceError::invalid(format!("failed to parse RFC822 message: {e}")))?;

        let mut body_text = None;
        let mut body_html = None;
        walk_parts(&parsed, &mut body_text, &mut body_html);

        let headers = &parsed.headers;
        let header = |key: &str| headers.get_first_value(key).unwrap_or_default();
        let references = header("References");

        Ok(Self {
            hash: Some(format!("{:x}", Sha256::digest(raw))),
            folder: folder.map(str::to_owned),
            uid,
            from: header("From"),
            subject: header("Subject"),
            date: header("Date"),
            body_text,
            body_html,
            thread_siblings: references.split_whitespace().count(),
            in_reply_to: headers.get_first_value("In-Reply-To"),
        })
    }
}

/// Reject message text too short to summarize
///
/// # Errors
///
/// Returns `NoInput` below [`MIN_MESSAGE_DATA_CHARS`] characters.
pub fn ensure_enough_text(text: &str) -> ServiceResult<()> {
    if text.trim().chars().count() < MIN_MESSAGE_DATA_CHARS {
        return Err(ServiceError::NoInput);
    }
    Ok(())
}

/// Walk MIME part tree recursively
///
/// Keeps the first inline text/plain and text/html bodies; attachments are
/// skipped.
fn walk_parts(part: &ParsedMail<'_>, body_text: &mut Option<String>, body_html: &mut Option<String>) {
    if part.subparts.is_empty() {
        let ctype = part.ctype.mimetype.to_ascii_lowercase();
        let disp = part.get_content_disposition();
        let is_attachment = disp.disposition == DispositionType::Attachment
            || disp.params.contains_key("filename");
        if is_attachment {
            return;
        }

        if ctype == "text/plain"
            && body_text.is_none()
            && let Ok(text) = part.get_body()
        {
            *body_text = Some(text);
        }

        if ctype == "text/html"
            && body_html.is_none()
            && let Ok(html) = part.get_body()
        {
            *body_html = Some(html);
        }
        return;
    }

    for sub in &part.subparts {
        walk_parts(sub, body_text, body_html);
    }
}

/// Flatten HTML to plain text
///
/// Conversion failures are logged and yield an empty body.
pub fn html_to_text(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), HTML_TEXT_WIDTH) {
        Ok(text) => text.trim().to_owned(),
        Err(e) => {
            warn!(error = %e, "failed to convert HTML body to text");
            String::new()
        }
    }
}
