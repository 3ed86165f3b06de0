//! Recipient list parsing.

use crate::{JobError, Result};
use std::fmt;

/// One recipient as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    /// Text shown in the `To:` header, e.g. `Jane Doe <jane@example.com>`
    pub display: String,
    /// Address used for `RCPT TO`
    pub address: String,
}

/// Ordered list of recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientList {
    recipients: Vec<Recipient>,
}

impl RecipientList {
    /// Parses a `,` or `;` separated list. Separators inside quotes or angle
    /// brackets do not split. `Name <address>` entries keep their display
    /// form and use the bracketed address.
    pub fn parse(input: &str) -> Result<Self> {
        let recipients = split_entries(input)
            .into_iter()
            .map(|entry| parse_entry(&entry))
            .collect::<Result<Vec<_>>>()?;

        if recipients.is_empty() {
            return Err(JobError::InvalidRecipients(
                "no recipient given".to_string(),
            ));
        }
        Ok(Self { recipients })
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Recipient> {
        self.recipients.iter()
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.recipients.iter().map(|r| r.address.as_str())
    }

    /// Value of the `To:` header.
    pub fn display(&self) -> String {
        self.recipients
            .iter()
            .map(|r| r.display.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for RecipientList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl std::str::FromStr for RecipientList {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn split_entries(input: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut escaped = false;

    for c in input.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => {
                escaped = true;
                current.push(c);
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '<' if !in_quotes => {
                in_brackets = true;
                current.push(c);
            }
            '>' if !in_quotes => {
                in_brackets = false;
                current.push(c);
            }
            ',' | ';' if !in_quotes && !in_brackets => {
                entries.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    entries.push(current);

    entries
        .into_iter()
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect()
}

fn parse_entry(entry: &str) -> Result<Recipient> {
    if entry.chars().any(|c| c.is_control()) {
        return Err(JobError::InvalidRecipients(format!(
            "'{}' contains control characters",
            entry.escape_debug()
        )));
    }

    let address = match (entry.rfind('<'), entry.rfind('>')) {
        (Some(open), Some(close)) if open < close => entry[open + 1..close].trim(),
        (None, None) => entry,
        _ => {
            return Err(JobError::InvalidRecipients(format!(
                "unbalanced angle brackets in '{}'",
                entry
            )))
        }
    };

    if !is_plausible_address(address) {
        return Err(JobError::InvalidRecipients(format!(
            "'{}' is not an e-mail address",
            entry
        )));
    }

    Ok(Recipient {
        display: entry.to_string(),
        address: address.to_string(),
    })
}

fn is_plausible_address(address: &str) -> bool {
    match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !address.chars().any(|c| c.is_whitespace() || c == '<' || c == '>')
        }
        None => false,
    }
}
