// Structured results returned by the generation backend
//
// Every field defaults so a partially filled response still parses; the
// backend is free to omit sections it has nothing for.

use serde::{Deserialize, Deserializer, Serialize};

/// Relationship intelligence extracted from the conversation so far
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntelligenceReport {
    pub family: Vec<String>,
    pub life_events: Vec<String>,
    pub interests: Vec<String>,
    pub career: Vec<String>,
    pub key_concerns: Vec<String>,
    pub referral_opportunities: Vec<String>,
    pub product_signals: Vec<String>,
    pub document_triggers: Vec<String>,
    pub client_tier: Option<String>,
    pub sentiment: Option<String>,
    pub sentiment_detail: Option<String>,
    pub risk_profile: Option<String>,
    pub risk_detail: Option<String>,
}

impl IntelligenceReport {
    /// Whether the report says anything worth showing
    pub fn has_content(&self) -> bool {
        let has_profile = !self.family.is_empty()
            || !self.life_events.is_empty()
            || !self.interests.is_empty()
            || !self.career.is_empty();
        let has_signal = self.sentiment.as_deref().is_some_and(|s| !s.is_empty())
            || !self.key_concerns.is_empty();
        has_profile || has_signal
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Warning,
    Critical,
}

impl Severity {
    /// Case-insensitive; anything other than "critical" is a warning
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("critical") {
            Severity::Critical
        } else {
            Severity::Warning
        }
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(raw.as_str().map(Severity::parse).unwrap_or_default())
    }
}

/// A potential compliance issue in the advisor's statements
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceFlag {
    pub severity: Severity,
    pub issue: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceScan {
    pub flags: Vec<ComplianceFlag>,
}

/// Word cloud entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Topic {
    pub text: String,
    /// Relative prominence, nominally 1 to 10
    #[serde(deserialize_with = "lenient_weight")]
    pub weight: f32,
    pub tone: String,
}

/// Any JSON number (or numeric string) clamped to 0..=10; anything else is 0
fn lenient_weight<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    let raw = serde_json::Value::deserialize(deserializer)?;
    let weight = match &raw {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or_default(),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0.0,
    };
    Ok(weight.clamp(0.0, 10.0) as f32)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordCloud {
    pub topics: Vec<Topic>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TodoList {
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointList {
    pub points: Vec<String>,
}

/// Multi-section post-call report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostCallReport {
    pub summary: String,
    pub follow_up_email: String,
    pub action_items: Vec<String>,
    pub client_insights: Vec<String>,
    pub next_meeting_topics: Vec<String>,
    pub compliance_notes: Vec<String>,
    /// CRM-ready fields, passed through untouched
    pub crm_activity_log: serde_json::Value,
}

impl PostCallReport {
    pub fn is_empty(&self) -> bool {
        self.summary.trim().is_empty()
            && self.action_items.is_empty()
            && self.follow_up_email.trim().is_empty()
    }
}

/// Parse a JSON object out of a model response.
///
/// Models sometimes wrap JSON in a code fence or add a preamble; only the
/// outermost `{...}` span is parsed.
pub fn parse_json_response<T: serde::de::DeserializeOwned>(raw: &str) -> Option<T> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}
