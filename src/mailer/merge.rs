//! Per-recipient placeholder substitution.

use crate::pipeline::types::Contact;

pub const RECIPIENT_NAME: &str = "[Recipient name]";
pub const SENDER_NAME: &str = "[Your name]";

/// Expands an approved template once per recipient.
///
/// Only the two fixed placeholders are replaced. Any other bracketed token is
/// left as written, and names are inserted verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct MailMergeEngine;

impl MailMergeEngine {
    pub fn expand(&self, template: &str, sender_name: &str, contact: &Contact) -> String {
        // Single pass, so a name that itself contains a placeholder is not
        // expanded again.
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        loop {
            let next = [
                (rest.find(RECIPIENT_NAME), RECIPIENT_NAME, contact.name.as_str()),
                (rest.find(SENDER_NAME), SENDER_NAME, sender_name),
            ]
            .into_iter()
            .filter_map(|(pos, token, value)| pos.map(|p| (p, token, value)))
            .min_by_key(|(p, _, _)| *p);

            match next {
                Some((pos, token, value)) => {
                    out.push_str(&rest[..pos]);
                    out.push_str(value);
                    rest = &rest[pos + token.len()..];
                }
                None => {
                    out.push_str(rest);
                    return out;
                }
            }
        }
    }

    /// Expand for every contact, keeping contact order.
    pub fn expand_all(
        &self,
        template: &str,
        sender_name: &str,
        contacts: &[Contact],
    ) -> Vec<(Contact, String)> {
        contacts
            .iter()
            .map(|c| (c.clone(), self.expand(template, sender_name, c)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bo() -> Contact {
        Contact::new("Bo", "bo@x.com").unwrap()
    }

    #[test]
    fn replaces_both_placeholders_everywhere() {
        let t = "Hi [Recipient name],\n\n[Recipient name], meet our CRM.\n\n[Your name]";
        assert_eq!(
            MailMergeEngine.expand(t, "Alex", &bo()),
            "Hi Bo,\n\nBo, meet our CRM.\n\nAlex"
        );
    }

    #[test]
    fn text_without_placeholders_is_unchanged() {
        for t in [
            "",
            "Plain text with no tokens.",
            "Brackets [Company] and [recipient name] differ in case.",
            "Half [Recipient name and [Your",
        ] {
            assert_eq!(MailMergeEngine.expand(t, "Alex", &bo()), t);
        }
    }

    #[test]
    fn unknown_tokens_survive() {
        let out = MailMergeEngine.expand("Dear [Recipient name] at [Company]", "Alex", &bo());
        assert_eq!(out, "Dear Bo at [Company]");
    }

    #[test]
    fn values_are_inserted_verbatim_and_not_re_expanded() {
        let odd = Contact::new("<b>[Your name]</b>", "odd@x.com").unwrap();
        let out = MailMergeEngine.expand("Hi [Recipient name] from [Your name]", "A & B", &odd);
        assert_eq!(out, "Hi <b>[Your name]</b> from A & B");
    }

    #[test]
    fn expand_all_keeps_order() {
        let contacts = vec![bo(), Contact::new("Cy", "cy@x.com").unwrap()];
        let merged = MailMergeEngine.expand_all("Hi [Recipient name]", "Alex", &contacts);
        assert_eq!(merged[0].1, "Hi Bo");
        assert_eq!(merged[1].1, "Hi Cy");
        assert_eq!(merged[1].0.email, "cy@x.com");
    }
}
