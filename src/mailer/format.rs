//! Subject line writer and plain text → HTML conversion.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

const SUBJECT_INSTRUCTIONS: &str = "\
You are an email subject line writer.

Given an email body, write a compelling subject line that:
- Is 40-60 characters long
- Creates curiosity or urgency
- Is relevant to the email content
- Avoids spam trigger words (free, guarantee, act now, $$$)

Return ONLY the subject line text, nothing else.";

const SUBJECT_MAX_TOKENS: u32 = 64;
const SUBJECT_TEMPERATURE: f32 = 0.4;

/// Hard cap on what we accept back as a subject.
const SUBJECT_MAX_CHARS: usize = 120;

/// Writes subject lines with one completion call.
pub struct EmailFormatter {
    llm: Arc<dyn LlmProvider>,
    call_timeout: Duration,
}

impl EmailFormatter {
    pub fn new(llm: Arc<dyn LlmProvider>, call_timeout: Duration) -> Self {
        Self { llm, call_timeout }
    }

    /// Subject line for `body`. Falls back to a fixed line on any failure.
    pub async fn subject_line(&self, body: &str, sender_name: &str) -> String {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(SUBJECT_INSTRUCTIONS),
            ChatMessage::user(body),
        ])
        .with_temperature(SUBJECT_TEMPERATURE)
        .with_max_tokens(SUBJECT_MAX_TOKENS);

        let raw = match tokio::time::timeout(self.call_timeout, self.llm.complete(request)).await {
            Ok(Ok(response)) => response.content,
            Ok(Err(e)) => {
                warn!(error = %e, "Subject line call failed, using fallback");
                return fallback_subject(sender_name);
            }
            Err(_) => {
                warn!(timeout = ?self.call_timeout, "Subject line call timed out, using fallback");
                return fallback_subject(sender_name);
            }
        };

        match clean_subject(&raw) {
            Some(subject) => {
                debug!(subject = %subject, "Subject line written");
                subject
            }
            None => fallback_subject(sender_name),
        }
    }
}

pub fn fallback_subject(sender_name: &str) -> String {
    format!("A quick note from {sender_name}")
}

/// First non-empty line, without a `Subject:` prefix or wrapping quotes.
fn clean_subject(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .strip_prefix("Subject:")
        .or_else(|| line.strip_prefix("subject:"))
        .unwrap_or(line)
        .trim();
    let line = line.trim_matches(|c| c == '"' || c == '\'' || c == '*' || c == '`').trim();
    if line.is_empty() {
        return None;
    }
    Some(line.chars().take(SUBJECT_MAX_CHARS).collect())
}

/// Convert a plain-text body to simple HTML.
///
/// Blank lines separate paragraphs; single newlines become `<br>`.
pub fn to_html(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in normalized.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs
        .iter()
        .map(|lines| {
            let inner = lines
                .iter()
                .map(|l| escape_html(l))
                .collect::<Vec<_>>()
                .join("<br>\n");
            format!("<p>{inner}</p>")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::provider::CompletionResponse;

    struct FixedLlm(Result<&'static str, ()>);

    #[async_trait]
    impl LlmProvider for FixedLlm {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            assert!(request.system_prompt().unwrap().contains("subject line writer"));
            match self.0 {
                Ok(text) => Ok(CompletionResponse::text(text)),
                Err(()) => Err(LlmError::RateLimited {
                    provider: "fixed".into(),
                }),
            }
        }
    }

    fn formatter(reply: Result<&'static str, ()>) -> EmailFormatter {
        EmailFormatter::new(Arc::new(FixedLlm(reply)), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn subject_is_cleaned() {
        let subject = formatter(Ok("Subject: \"Cut your CRM busywork in half this quarter\"\n"))
            .subject_line("body", "Alex")
            .await;
        assert_eq!(subject, "Cut your CRM busywork in half this quarter");
    }

    #[tokio::test]
    async fn subject_falls_back_on_error_or_blank() {
        assert_eq!(
            formatter(Err(())).subject_line("body", "Alex").await,
            "A quick note from Alex"
        );
        assert_eq!(
            formatter(Ok("  \n\"\"\n")).subject_line("body", "Alex").await,
            "A quick note from Alex"
        );
    }

    #[test]
    fn html_paragraphs_and_breaks() {
        let html = to_html("Hi Bo,\n\nLine one\nLine two\n\n\nThanks,\nAlex");
        assert_eq!(
            html,
            "<p>Hi Bo,</p>\n<p>Line one<br>\nLine two</p>\n<p>Thanks,<br>\nAlex</p>"
        );
    }

    #[test]
    fn html_is_escaped() {
        assert_eq!(
            to_html("Tom & Jerry <script>\"x\"</script>"),
            "<p>Tom &amp; Jerry &lt;script&gt;&quot;x&quot;&lt;/script&gt;</p>"
        );
    }

    #[test]
    fn html_handles_crlf_and_empty() {
        assert_eq!(to_html("a\r\n\r\nb"), "<p>a</p>\n<p>b</p>");
        assert_eq!(to_html("  \n "), "");
    }
}
