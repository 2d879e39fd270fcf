//! Discussion point tracking
//!
//! Points come from a manual list, an auto-suggested list, or pre-call
//! seeding. Their status only moves `Pending → InProgress → Discussed`; a
//! backend suggesting a step back is ignored.

mod state;

pub use state::{
    DiscussionPoint, DiscussionTracker, PointAssessment, PointOrigin, PointStatus,
    TrackerAssessment, TrackerChange,
};
