//! Everything that happens after approval: subject line, mail merge,
//! HTML conversion and delivery.

pub mod contacts;
pub mod delivery;
pub mod format;
pub mod merge;
pub mod sendgrid;
pub mod smtp;

pub use contacts::{ContactList, RejectedRow, load_contacts, parse_contacts};
pub use delivery::{DeliveryAdapter, EmailProvider, OutboundEmail, SendOutcome};
pub use format::{EmailFormatter, to_html};
pub use merge::MailMergeEngine;
pub use sendgrid::SendGridProvider;
pub use smtp::{SmtpConfig, SmtpProvider};
