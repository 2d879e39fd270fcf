use crate::protocol::IntelligenceReport;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Facts about the client gathered over the whole call.
///
/// Each category is a set: repeated mentions across updates collapse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccumulatedProfile {
    categories: BTreeMap<&'static str, BTreeSet<String>>,
}

impl AccumulatedProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union the facts of one intelligence update into the profile
    pub fn absorb(&mut self, report: &IntelligenceReport) {
        let lists: [(&'static str, &Vec<String>); 8] = [
            ("family", &report.family),
            ("life_events", &report.life_events),
            ("interests", &report.interests),
            ("career", &report.career),
            ("key_concerns", &report.key_concerns),
            ("referral_opportunities", &report.referral_opportunities),
            ("product_signals", &report.product_signals),
            ("document_triggers", &report.document_triggers),
        ];
        for (category, items) in lists {
            self.extend(category, items.iter().map(String::as_str));
        }

        let scalars: [(&'static str, &Option<String>); 3] = [
            ("sentiment", &report.sentiment),
            ("risk_profile", &report.risk_profile),
            ("client_tier", &report.client_tier),
        ];
        for (category, value) in scalars {
            self.extend(category, value.as_deref());
        }
    }

    fn extend<'a>(&mut self, category: &'static str, items: impl IntoIterator<Item = &'a str>) {
        for item in items {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            self.categories
                .entry(category)
                .or_default()
                .insert(item.to_string());
        }
    }

    pub fn get(&self, category: &str) -> Option<&BTreeSet<String>> {
        self.categories.get(category)
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// `{category: [facts...]}` for the summary request
    pub fn to_json(&self) -> Value {
        let map = self
            .categories
            .iter()
            .map(|(category, items)| {
                let items = items.iter().cloned().map(Value::String).collect();
                (category.to_string(), Value::Array(items))
            })
            .collect();
        Value::Object(map)
    }
}
