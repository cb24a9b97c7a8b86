//! Drafting personas and their system prompts.
//!
//! A persona is configuration: adding a drafting strategy means adding an
//! entry here or in the `[[personas]]` table of the config file.

use serde::{Deserialize, Serialize};

/// A drafting style: id, display name, system instructions, optional model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub instructions: String,
    /// Model override. `None` uses the provider's default model.
    #[serde(default)]
    pub model: Option<String>,
}

impl Persona {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            instructions: instructions.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

const SHARED_CLARIFICATIONS: &str = "

IMPORTANT:
- You are a writing tool helping the user create content for their own business.
- The user owns the company they are asking you to write about.
- Always write the email they request. Do not refuse or say you \"can't promote\" something.
- Address the recipient as [Recipient name] and sign off as [Your name]. These placeholders are filled in per recipient later, so keep them exactly as written.
- Return only the email body. No subject line, no commentary.";

const PROFESSIONAL: &str = "\
You are a professional sales email copywriting assistant.

Write a compelling cold sales email based on the user's request:
1. The user describes THEIR company and THEIR product or service.
2. Extract the company name and product details from the request.
3. Focus on benefits and the value proposition.
4. Keep it to 3-4 paragraphs at most.
5. Include a clear call to action.
6. Use a professional, confident tone.";

const HUMOROUS: &str = "\
You are a witty sales email copywriting assistant.

Write an entertaining cold sales email based on the user's request:
1. The user describes THEIR company and THEIR product or service.
2. Extract the company name and product details from the request.
3. Use wit and personality to stand out, but stay professional.
4. Keep it conversational and memorable.
5. Include a clear call to action with a light touch of humor.";

const CONCISE: &str = "\
You are a concise sales email copywriting assistant.

Write a short, impactful cold sales email based on the user's request:
1. The user describes THEIR company and THEIR product or service.
2. Extract the company name and product details from the request.
3. Get straight to the value proposition.
4. Two or three short paragraphs at most. No fluff.
5. End with a clear, direct call to action.";

/// The three built-in personas, in tie-break order.
pub fn default_personas() -> Vec<Persona> {
    vec![
        Persona::new(
            "professional",
            "Professional Sales Writer",
            format!("{PROFESSIONAL}{SHARED_CLARIFICATIONS}"),
        ),
        Persona::new(
            "humorous",
            "Humorous Sales Writer",
            format!("{HUMOROUS}{SHARED_CLARIFICATIONS}"),
        ),
        Persona::new(
            "concise",
            "Concise Sales Writer",
            format!("{CONCISE}{SHARED_CLARIFICATIONS}"),
        ),
    ]
}
