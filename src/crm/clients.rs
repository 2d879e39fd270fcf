use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Account {
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: String,
    pub program: Option<String>,
    pub value: f64,
    pub holdings_summary: Option<String>,
    pub total_tax_365: bool,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Goal {
    pub name: String,
    pub current_progress: f64,
    pub target: f64,
    pub timeline: String,
    pub on_track: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Personal {
    pub family: Vec<String>,
    pub career: Option<String>,
    pub life_events: Vec<String>,
    pub interests: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PastConversation {
    pub date: String,
    pub summary: String,
    pub action_items: Vec<String>,
}

/// A client household record, consumed read-only
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientRecord {
    pub id: String,
    pub name: String,
    pub primary_contact: String,
    pub client_tier: String,
    pub total_aum: f64,
    pub risk_profile: String,
    pub next_review_due: String,
    pub compliance_notes: Option<String>,
    pub accounts: Vec<Account>,
    #[serde(alias = "gps_goals")]
    pub goals: Vec<Goal>,
    pub personal: Personal,
    pub past_conversations: Vec<PastConversation>,
}

/// Search result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSummary {
    pub id: String,
    pub name: String,
    pub primary_contact: String,
    pub client_tier: String,
    pub total_aum: f64,
    pub next_review_due: String,
}

impl From<&ClientRecord> for ClientSummary {
    fn from(c: &ClientRecord) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
            primary_contact: c.primary_contact.clone(),
            client_tier: c.client_tier.clone(),
            total_aum: c.total_aum,
            next_review_due: c.next_review_due.clone(),
        }
    }
}

/// Format a dollar amount with thousands separators: `$1,250,000`
pub fn format_usd(amount: f64) -> String {
    let whole = amount.round().abs() as u64;
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    if amount < 0.0 && whole > 0 {
        out.push('-');
    }
    out.push('$');
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

impl ClientRecord {
    /// Context block prefixed to the transcript in generative requests
    pub fn context_prompt(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== CLIENT CONTEXT ===");
        let _ = writeln!(
            out,
            "Client: {} | Tier: {} | AUM: {} | Risk: {}",
            self.name,
            self.client_tier,
            format_usd(self.total_aum),
            self.risk_profile
        );
        let _ = writeln!(
            out,
            "Compliance: {}\n",
            self.compliance_notes.as_deref().unwrap_or("N/A")
        );

        let _ = writeln!(out, "ACCOUNTS:");
        for acct in &self.accounts {
            let _ = write!(
                out,
                "  - {} ({}, {}): {} - {}",
                acct.name,
                acct.account_type,
                acct.program.as_deref().unwrap_or("N/A"),
                format_usd(acct.value),
                acct.holdings_summary.as_deref().unwrap_or("N/A")
            );
            if acct.total_tax_365 {
                out.push_str(" [Total Tax 365 enrolled]");
            }
            if !acct.flags.is_empty() {
                let _ = write!(out, " FLAGS: {}", acct.flags.join(", "));
            }
            out.push('\n');
        }

        let _ = writeln!(out, "\nGOALS:");
        for goal in &self.goals {
            let _ = writeln!(
                out,
                "  - {}: {}% toward {} by {} [{}]",
                goal.name,
                goal.current_progress,
                format_usd(goal.target),
                goal.timeline,
                if goal.on_track { "ON TRACK" } else { "BEHIND" }
            );
        }

        let _ = writeln!(out, "\nPERSONAL DETAILS:");
        let personal = &self.personal;
        if !personal.family.is_empty() {
            let _ = writeln!(out, "  Family: {}", personal.family.join("; "));
        }
        if let Some(career) = &personal.career {
            let _ = writeln!(out, "  Career: {}", career);
        }
        if !personal.life_events.is_empty() {
            let _ = writeln!(out, "  Life Events: {}", personal.life_events.join("; "));
        }
        if !personal.interests.is_empty() {
            let _ = writeln!(out, "  Interests: {}", personal.interests.join("; "));
        }

        let _ = writeln!(out, "\nRECENT CONVERSATIONS:");
        for conv in self.past_conversations.iter().take(2) {
            let _ = writeln!(out, "  [{}] {}", conv.date, conv.summary);
            if !conv.action_items.is_empty() {
                let _ = writeln!(out, "    Action items: {}", conv.action_items.join(", "));
            }
        }
        let _ = writeln!(out, "=== END CLIENT CONTEXT ===");

        out
    }
}

/// Read-only client lookup backed by a JSON file
#[derive(Debug, Default, Clone)]
pub struct ClientDirectory {
    records: Vec<ClientRecord>,
    by_id: HashMap<String, usize>,
}

impl ClientDirectory {
    pub fn from_records(records: Vec<ClientRecord>) -> Self {
        let by_id = records
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        Self { records, by_id }
    }

    /// Load a JSON array of client records.
    ///
    /// A missing file yields an empty directory; a malformed one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Client data not found at {:?}, starting with no clients", path);
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read client data: {:?}", path))?;
        let records: Vec<ClientRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse client data: {:?}", path))?;

        info!("Loaded {} client records from {:?}", records.len(), path);
        Ok(Self::from_records(records))
    }

    pub fn get(&self, id: &str) -> Option<&ClientRecord> {
        self.by_id.get(id).map(|&i| &self.records[i])
    }

    /// Case-insensitive substring search over name, id and primary contact
    pub fn search(&self, query: &str) -> Vec<ClientSummary> {
        let q = query.trim().to_lowercase();
        self.records
            .iter()
            .filter(|c| {
                q.is_empty()
                    || c.name.to_lowercase().contains(&q)
                    || c.id.to_lowercase().contains(&q)
                    || c.primary_contact.to_lowercase().contains(&q)
            })
            .map(ClientSummary::from)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
