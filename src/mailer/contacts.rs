//! Contact table ingestion.
//!
//! Accepts a two-column `name,email` table with a header row, comma or tab
//! separated, with optional double quotes. Bad rows are rejected one by one
//! so a single typo does not discard the whole list.

use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ConfigError, ContactError};
use crate::pipeline::types::Contact;

/// A row that was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    /// 1-based line number in the source table.
    pub line: usize,
    pub reason: String,
}

/// Parsed contact table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContactList {
    pub contacts: Vec<Contact>,
    pub rejected: Vec<RejectedRow>,
}

/// Parse a contact table.
pub fn parse_contacts(table: &str) -> Result<ContactList, ContactError> {
    let mut lines = table
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim_end_matches('\r')))
        .filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = lines.next().ok_or(ContactError::MissingHeader)?;
    let delimiter = if header.contains('\t') { '\t' } else { ',' };
    let columns: Vec<String> = split_row(header, delimiter)
        .into_iter()
        .map(|c| c.to_lowercase())
        .collect();

    let name_idx = columns
        .iter()
        .position(|c| c == "name")
        .ok_or(ContactError::MissingColumn("name"))?;
    let email_idx = columns
        .iter()
        .position(|c| c == "email" || c == "e-mail")
        .ok_or(ContactError::MissingColumn("email"))?;

    let mut list = ContactList::default();
    for (line, row) in lines {
        let fields = split_row(row, delimiter);
        let name = fields.get(name_idx).map(String::as_str).unwrap_or("");
        let email = fields.get(email_idx).map(String::as_str).unwrap_or("");

        if email.is_empty() {
            list.rejected.push(RejectedRow {
                line,
                reason: "missing email".into(),
            });
            continue;
        }
        match Contact::new(name, email) {
            Ok(contact) => list.contacts.push(contact),
            Err(e) => list.rejected.push(RejectedRow {
                line,
                reason: e.to_string(),
            }),
        }
    }

    for r in &list.rejected {
        warn!(line = r.line, reason = %r.reason, "Rejected contact row");
    }
    info!(
        accepted = list.contacts.len(),
        rejected = list.rejected.len(),
        "Contact table parsed"
    );
    Ok(list)
}

/// Read and parse a contact table from disk.
pub fn load_contacts(path: &Path) -> Result<ContactList, ConfigError> {
    let table = std::fs::read_to_string(path)?;
    parse_contacts(&table).map_err(|e| ConfigError::InvalidValue {
        key: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Split one row, honouring double quotes (`""` is a literal quote).
fn split_row(row: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = row.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => {
                fields.push(field.trim().to_string());
                field.clear();
            }
            c => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_comma_table() {
        let list = parse_contacts("name,email\nBo,bo@x.com\nCy,cy@x.com\n").unwrap();
        assert_eq!(list.contacts.len(), 2);
        assert_eq!(list.contacts[0].name, "Bo");
        assert_eq!(list.contacts[1].email, "cy@x.com");
        assert!(list.rejected.is_empty());
    }

    #[test]
    fn parses_tab_table_with_reordered_columns() {
        let list = parse_contacts("Email\tName\nbo@x.com\tBo\n").unwrap();
        assert_eq!(list.contacts, vec![Contact::new("Bo", "bo@x.com").unwrap()]);
    }

    #[test]
    fn quoted_fields_may_contain_commas() {
        let list = parse_contacts("name,email\n\"Lee, Cy \"\"CJ\"\"\",cy@x.com\n").unwrap();
        assert_eq!(list.contacts[0].name, "Lee, Cy \"CJ\"");
    }

    #[test]
    fn bad_rows_are_rejected_individually() {
        let table = "name,email\r\nBo,bo@x.com\r\nNo Email,\r\nCy,not-an-address\r\n,dee@x.com\r\nEd,ed@x.com";
        let list = parse_contacts(table).unwrap();

        let names: Vec<_> = list.contacts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Bo", "Ed"]);

        let lines: Vec<_> = list.rejected.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![3, 4, 5]);
        assert_eq!(list.rejected[0].reason, "missing email");
        assert!(list.rejected[1].reason.contains("Invalid email"));
        assert!(list.rejected[2].reason.contains("name"));
    }

    #[test]
    fn duplicates_are_kept() {
        let list = parse_contacts("name,email\nBo,bo@x.com\nBo,bo@x.com\n").unwrap();
        assert_eq!(list.contacts.len(), 2);
    }

    #[test]
    fn missing_header_or_column_is_an_error() {
        assert!(matches!(parse_contacts("  \n"), Err(ContactError::MissingHeader)));
        assert!(matches!(
            parse_contacts("name,phone\nBo,555"),
            Err(ContactError::MissingColumn("email"))
        ));
        assert!(matches!(
            parse_contacts("bo@x.com\n"),
            Err(ContactError::MissingColumn("name"))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name,email\nBo,bo@x.com").unwrap();
        let list = load_contacts(file.path()).unwrap();
        assert_eq!(list.contacts.len(), 1);
    }
}
