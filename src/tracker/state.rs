use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Coverage of a discussion point. Ordered: a point only ever moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointStatus {
    #[default]
    Pending,
    InProgress,
    Discussed,
}

impl PointStatus {
    /// Lenient parse of a backend-supplied status
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "pending" | "not_started" => Some(PointStatus::Pending),
            "in_progress" | "started" | "partial" => Some(PointStatus::InProgress),
            "discussed" | "done" | "covered" | "complete" => Some(PointStatus::Discussed),
            _ => None,
        }
    }
}

/// Where the current point list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointOrigin {
    Manual,
    AutoSuggested,
    Seeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionPoint {
    pub text: String,
    pub status: PointStatus,
    #[serde(default)]
    pub note: String,
}

impl DiscussionPoint {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status: PointStatus::Pending,
            note: String::new(),
        }
    }
}

/// One point as judged by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointAssessment {
    pub text: String,
    pub status: String,
    pub note: String,
}

/// Backend response for a tracker evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerAssessment {
    pub points: Vec<PointAssessment>,
    pub nudge: String,
}

/// Result of applying an assessment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerChange {
    /// Points whose status moved forward
    pub advanced: usize,
    /// Backward transitions the backend asked for and that were refused
    pub refused: usize,
    /// Points whose note changed
    pub noted: usize,
    pub nudge: String,
    pub nudge_changed: bool,
}

impl TrackerChange {
    /// Whether the client's view of the tracker differs after this change
    pub fn is_visible(&self) -> bool {
        self.advanced > 0 || self.noted > 0 || self.nudge_changed
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Tracks which planned discussion points the call has covered
#[derive(Debug, Clone, Default)]
pub struct DiscussionTracker {
    points: Vec<DiscussionPoint>,
    origin: Option<PointOrigin>,
    nudge: String,
}

impl DiscussionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the point list; blank and duplicate entries are dropped
    pub fn set_points<I, S>(&mut self, texts: I, origin: PointOrigin)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        self.points = texts
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty() && seen.insert(normalize(t)))
            .map(DiscussionPoint::new)
            .collect();
        self.origin = Some(origin);
        self.nudge.clear();

        info!("Discussion tracker set: {} points ({:?})", self.points.len(), origin);
    }

    pub fn is_active(&self) -> bool {
        !self.points.is_empty()
    }

    pub fn points(&self) -> &[DiscussionPoint] {
        &self.points
    }

    pub fn origin(&self) -> Option<PointOrigin> {
        self.origin
    }

    pub fn nudge(&self) -> &str {
        &self.nudge
    }

    pub fn discussed_count(&self) -> usize {
        self.points
            .iter()
            .filter(|p| p.status == PointStatus::Discussed)
            .count()
    }

    /// Apply a backend assessment, moving statuses forward only.
    ///
    /// Points are matched by text (whitespace and case insensitive). When the
    /// backend returns exactly one entry per point, unmatched entries fall back
    /// to matching by position. Entries for unknown points are ignored.
    pub fn apply(&mut self, assessment: &TrackerAssessment) -> TrackerChange {
        let mut change = TrackerChange::default();
        let positional = assessment.points.len() == self.points.len();

        for (index, assessed) in assessment.points.iter().enumerate() {
            let key = normalize(&assessed.text);
            let target = self
                .points
                .iter()
                .position(|p| normalize(&p.text) == key)
                .or(positional.then_some(index));

            let Some(target) = target else {
                debug!("Ignoring assessment for unknown point: {}", assessed.text);
                continue;
            };
            let Some(status) = PointStatus::parse(&assessed.status) else {
                continue;
            };

            let point = &mut self.points[target];
            if status > point.status {
                point.status = status;
                change.advanced += 1;
            } else if status < point.status {
                change.refused += 1;
            }

            let note = assessed.note.trim();
            if !note.is_empty() && point.note != note {
                point.note = note.to_string();
                change.noted += 1;
            }
        }

        let nudge = assessment.nudge.trim();
        change.nudge_changed = self.nudge != nudge;
        self.nudge = nudge.to_string();
        change.nudge = self.nudge.clone();

        if change.advanced > 0 || change.refused > 0 {
            info!(
                "Discussion tracker: {}/{} discussed ({} advanced, {} regressions refused)",
                self.discussed_count(),
                self.points.len(),
                change.advanced,
                change.refused
            );
        }

        change
    }
}
