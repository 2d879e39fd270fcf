//! Session wire protocol
//!
//! One full-duplex WebSocket carries both directions:
//! - Binary frames: `[source tag][little-endian i16 PCM]`
//! - Text frames: JSON objects discriminated by `type`

pub mod frame;
pub mod messages;
pub mod reports;

pub use frame::{encode_frame, AudioPacket, AudioSource, FrameError};
pub use messages::{ClientMessage, ServerEvent, SessionMode};
pub use reports::{
    parse_json_response, ComplianceFlag, ComplianceScan, IntelligenceReport, PointList,
    PostCallReport, Severity, TodoList, Topic, WordCloud,
};
