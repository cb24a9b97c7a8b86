//! One drafting strategy: a persona bound to the completion service.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::drafting::persona::Persona;
use crate::error::DraftError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::{Candidate, Request};

/// Temperature for drafting. Personas should actually sound different.
const DRAFT_TEMPERATURE: f32 = 0.7;

const DRAFT_MAX_TOKENS: u32 = 1024;

/// Default per-call timeout.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(45);

pub struct DraftingStrategy {
    persona: Persona,
    llm: Arc<dyn LlmProvider>,
    call_timeout: Duration,
}

impl DraftingStrategy {
    pub fn new(persona: Persona, llm: Arc<dyn LlmProvider>, call_timeout: Duration) -> Self {
        Self {
            persona,
            llm,
            call_timeout,
        }
    }

    pub fn id(&self) -> &str {
        &self.persona.id
    }

    /// Ask the completion service for one draft.
    ///
    /// Timeouts, provider errors and empty completions all come back as
    /// `StrategyUnavailable`.
    pub async fn draft(&self, request: &Request) -> Result<Candidate, DraftError> {
        let mut completion = CompletionRequest::new(vec![
            ChatMessage::system(&self.persona.instructions),
            ChatMessage::user(build_draft_prompt(request)),
        ])
        .with_temperature(DRAFT_TEMPERATURE)
        .with_max_tokens(DRAFT_MAX_TOKENS);
        if let Some(model) = &self.persona.model {
            completion = completion.with_model(model);
        }

        debug!(strategy = %self.persona.id, "Requesting draft");
        let started = Instant::now();

        let response = match tokio::time::timeout(self.call_timeout, self.llm.complete(completion))
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.unavailable(e.to_string())),
            Err(_) => {
                return Err(self.unavailable(format!("timed out after {:?}", self.call_timeout)));
            }
        };

        let text = response.content.trim();
        if text.is_empty() {
            return Err(self.unavailable("empty completion".into()));
        }

        info!(
            strategy = %self.persona.id,
            chars = text.len(),
            output_tokens = response.output_tokens,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Draft ready"
        );
        Ok(Candidate::unscored(&self.persona.id, text))
    }

    fn unavailable(&self, reason: String) -> DraftError {
        warn!(strategy = %self.persona.id, reason = %reason, "Strategy unavailable");
        DraftError::StrategyUnavailable {
            strategy_id: self.persona.id.clone(),
            reason,
        }
    }
}

fn build_draft_prompt(request: &Request) -> String {
    format!(
        "Sales request: {}\n\
         Sender: {}\n\n\
         Write the email now. Greet the recipient as [Recipient name] and sign off as [Your name].",
        request.raw_text.trim(),
        request.sender_name
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::provider::CompletionResponse;

    enum Behaviour {
        Reply(&'static str),
        Fail,
        Hang,
    }

    struct MockLlm {
        behaviour: Behaviour,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl MockLlm {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlm {
        fn model_name(&self) -> &str {
            "mock"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(request);
            match self.behaviour {
                Behaviour::Reply(text) => Ok(CompletionResponse::text(text)),
                Behaviour::Fail => Err(LlmError::RequestFailed {
                    provider: "mock".into(),
                    reason: "connection refused".into(),
                }),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(CompletionResponse::text("too late"))
                }
            }
        }
    }

    fn request() -> Request {
        Request::new("Write a sales email about our CRM", "Alex", vec![]).unwrap()
    }

    fn strategy(llm: Arc<MockLlm>) -> DraftingStrategy {
        let persona = Persona::new("concise", "Concise", "Be brief.").with_model("qwen2.5:3b");
        DraftingStrategy::new(persona, llm, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn draft_returns_trimmed_candidate() {
        let llm = MockLlm::new(Behaviour::Reply("  Hi [Recipient name],\n\nBuy now.\n\n[Your name]  "));
        let candidate = strategy(llm.clone()).draft(&request()).await.unwrap();
        assert_eq!(candidate.strategy_id, "concise");
        assert!(candidate.text.starts_with("Hi [Recipient name]"));
        assert!(candidate.text.ends_with("[Your name]"));
        assert_eq!(candidate.score, 0.0);

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen[0].system_prompt(), Some("Be brief."));
        assert_eq!(seen[0].model.as_deref(), Some("qwen2.5:3b"));
        assert!(seen[0].messages[1].content.contains("our CRM"));
        assert!(seen[0].messages[1].content.contains("Sender: Alex"));
    }

    #[tokio::test]
    async fn provider_error_is_unavailable() {
        let err = strategy(MockLlm::new(Behaviour::Fail))
            .draft(&request())
            .await
            .unwrap_err();
        let DraftError::StrategyUnavailable { strategy_id, reason } = err;
        assert_eq!(strategy_id, "concise");
        assert!(reason.contains("connection refused"));
    }

    #[tokio::test]
    async fn timeout_is_unavailable() {
        let err = strategy(MockLlm::new(Behaviour::Hang))
            .draft(&request())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn blank_completion_is_unavailable() {
        let err = strategy(MockLlm::new(Behaviour::Reply("   \n ")))
            .draft(&request())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty completion"));
    }
}
