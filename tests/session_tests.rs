// Integration tests for the advisor session
//
// These drive a full session over in-memory transport with scripted
// transcription and generation backends.

mod common;

use anyhow::Result;
use callpilot::crm::NotesStore;
use callpilot::gate::GatePolicy;
use callpilot::generation::{GenerationError, TaskKind};
use callpilot::protocol::{encode_frame, AudioSource, ServerEvent, Severity};
use callpilot::session::SessionState;
use callpilot::tracker::{DiscussionPoint, PointStatus};
use common::{quiet_settings, settle, Harness, Reply, ScriptedGenerator, ScriptedStt, SttStep};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Notify;

fn mic_frame() -> Vec<u8> {
    encode_frame(AudioSource::Mic, &[120, -340, 560, -780])
}

fn room_frame() -> Vec<u8> {
    encode_frame(AudioSource::Room, &[15, -25, 35, -45])
}

#[tokio::test]
async fn test_ping_pong() -> Result<()> {
    let mut h = Harness::start(ScriptedStt::new(), ScriptedGenerator::new(), quiet_settings());

    h.send_text(json!({"type": "ping"}));
    assert_eq!(h.next_event().await, Some(ServerEvent::Pong));

    Ok(())
}

#[tokio::test]
async fn test_dual_source_frames_are_labeled_by_speaker() -> Result<()> {
    let stt = ScriptedStt::new()
        .script(AudioSource::Mic, vec![SttStep::Say("Good morning")])
        .script(AudioSource::Room, vec![SttStep::Say("Morning, thanks for calling")]);
    let generator = ScriptedGenerator::new().reply(
        TaskKind::Summary,
        Reply::Chunks(vec![r#"{"summary": "Short check-in", "action_items": ["Send agenda"]}"#]),
    );
    let mut h = Harness::start(stt, generator, quiet_settings());

    h.send_text(json!({"type": "config", "sampleRate": 16000, "sources": ["mic", "room"]}));
    h.next_of("status").await;
    h.next_of("status").await;

    h.send_audio(mic_frame());
    assert_eq!(
        h.next_final_transcript().await,
        ("Advisor".to_string(), "Good morning".to_string())
    );

    h.send_audio(room_frame());
    assert_eq!(
        h.next_final_transcript().await,
        ("Client".to_string(), "Morning, thanks for calling".to_string())
    );

    // Both subscriptions were opened at the negotiated rate
    let opened = h.stt.opened();
    assert_eq!(opened.len(), 2);
    assert!(opened.iter().all(|r| r.sample_rate == 16000));

    h.send_text(json!({"type": "generate_summary"}));
    match h.next_of("post_call_summary").await {
        ServerEvent::PostCallSummary { report, error } => {
            assert!(error.is_none());
            let report = report.expect("summary report");
            assert_eq!(report.summary, "Short check-in");
            assert_eq!(report.action_items, vec!["Send agenda"]);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let requests = h.generator.requests_for(TaskKind::Summary);
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].context["transcript"],
        "Advisor: Good morning\nClient: Morning, thanks for calling"
    );

    let stats = h.session.await?;
    assert_eq!(stats.state, SessionState::Closed);
    assert_eq!(stats.committed_lines, 2);

    let stored = h.notes.get("summary-test-session").await?;
    assert!(stored.unwrap().contains("Short check-in"));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_summary_timeout_reports_once_and_closes() -> Result<()> {
    let stt = ScriptedStt::new().script(AudioSource::Mic, vec![SttStep::Say("Let's wrap up")]);
    let generator = ScriptedGenerator::new().reply(TaskKind::Summary, Reply::Hang);
    let mut h = Harness::start(stt, generator, quiet_settings());

    h.send_text(json!({"type": "config", "sources": ["mic"]}));
    h.send_audio(mic_frame());
    h.next_final_transcript().await;

    h.send_text(json!({"type": "generate_summary"}));
    // A second request while summarizing is ignored
    h.send_text(json!({"type": "generate_summary"}));

    let events = h.drain().await;
    let summaries: Vec<_> = events
        .iter()
        .filter(|e| e.kind() == "post_call_summary")
        .collect();
    assert_eq!(summaries.len(), 1);
    assert_eq!(*summaries[0], ServerEvent::summary_failed("timeout"));

    let stats = h.session.await?;
    assert_eq!(stats.state, SessionState::Closed);

    Ok(())
}

#[tokio::test]
async fn test_room_failure_keeps_mic_flowing() -> Result<()> {
    let stt = ScriptedStt::new()
        .script(
            AudioSource::Mic,
            vec![SttStep::Say("Are you still there?"), SttStep::Say("Great, let's continue")],
        )
        .script(AudioSource::Room, vec![SttStep::Fail]);
    let mut h = Harness::start(stt, ScriptedGenerator::new(), quiet_settings());

    h.send_text(json!({"type": "config", "sources": ["mic", "room"]}));

    h.send_audio(room_frame());
    loop {
        if let Some(ServerEvent::Status { message }) = h.next_event().await {
            if message == "Client transcription disconnected" {
                break;
            }
        }
    }

    h.send_audio(mic_frame());
    assert_eq!(h.next_final_transcript().await.1, "Are you still there?");

    // Room frames after the failure are dropped quietly
    h.send_audio(room_frame());
    h.send_audio(mic_frame());
    assert_eq!(h.next_final_transcript().await.1, "Great, let's continue");

    h.close();
    let events = h.drain().await;
    assert!(events.iter().all(|e| e.kind() != "error"));

    Ok(())
}

#[tokio::test]
async fn test_unavailable_source_degrades_to_status() -> Result<()> {
    let stt = ScriptedStt::new()
        .script(AudioSource::Mic, vec![SttStep::Say("Hello")])
        .unavailable(AudioSource::Room);
    let mut h = Harness::start(stt, ScriptedGenerator::new(), quiet_settings());

    h.send_text(json!({"type": "config", "sources": ["mic", "room"]}));
    let mut statuses = Vec::new();
    for _ in 0..2 {
        if let ServerEvent::Status { message } = h.next_of("status").await {
            statuses.push(message);
        }
    }
    assert!(statuses.contains(&"Advisor transcription connected".to_string()));
    assert!(statuses.contains(&"Client transcription unavailable".to_string()));

    h.send_audio(mic_frame());
    assert_eq!(h.next_final_transcript().await.1, "Hello");

    Ok(())
}

#[tokio::test]
async fn test_empty_summary_keeps_session_active() -> Result<()> {
    let mut h = Harness::start(ScriptedStt::new(), ScriptedGenerator::new(), quiet_settings());

    h.send_text(json!({"type": "config", "sources": ["mic"]}));
    h.send_text(json!({"type": "generate_summary"}));
    assert_eq!(
        h.next_of("post_call_summary").await,
        ServerEvent::summary_failed("No transcript to summarize")
    );

    h.send_text(json!({"type": "ping"}));
    assert_eq!(h.next_of("pong").await, ServerEvent::Pong);
    assert!(h.generator.requests_for(TaskKind::Summary).is_empty());

    Ok(())
}

#[tokio::test]
async fn test_malformed_control_message_is_ignored() -> Result<()> {
    let mut h = Harness::start(ScriptedStt::new(), ScriptedGenerator::new(), quiet_settings());

    h.inbound
        .unbounded_send(callpilot::Inbound::Text("{not json".to_string()))?;
    h.send_text(json!({"type": "teleport"}));
    h.send_text(json!({"type": "ping"}));

    assert_eq!(h.next_event().await, Some(ServerEvent::Pong));

    Ok(())
}

#[tokio::test]
async fn test_suggestion_streams_between_start_and_done() -> Result<()> {
    let stt = ScriptedStt::new().script(
        AudioSource::Room,
        vec![SttStep::Say("We are worried about paying for our daughter's college")],
    );
    let generator = ScriptedGenerator::new().reply(
        TaskKind::Suggestion,
        Reply::Chunks(vec!["Ask about ", "the 529 plan."]),
    );
    let mut settings = quiet_settings();
    settings.gates.suggestion = callpilot::gate::GatePolicy::new(6_000, 20);
    let mut h = Harness::start(stt, generator, settings);

    h.send_text(json!({"type": "config", "sources": ["room"]}));
    h.send_text(json!({"type": "coaching_mode", "enabled": true}));
    h.send_audio(room_frame());

    let ServerEvent::SuggestionStart { id } = h.next_of("suggestion_start").await else {
        unreachable!()
    };

    let mut streamed = String::new();
    loop {
        match h.next_event().await {
            Some(ServerEvent::SuggestionChunk { id: chunk_id, text }) => {
                assert_eq!(chunk_id, id);
                streamed.push_str(&text);
            }
            Some(ServerEvent::SuggestionDone { id: done_id, had_suggestion }) => {
                assert_eq!(done_id, id);
                assert!(had_suggestion);
                break;
            }
            Some(_) => {}
            None => panic!("session ended early"),
        }
    }
    assert_eq!(streamed, "Ask about the 529 plan.");

    let request = &h.generator.requests_for(TaskKind::Suggestion)[0];
    assert_eq!(request.context["coaching_mode"], true);

    Ok(())
}

#[tokio::test]
async fn test_no_suggestion_is_never_streamed() -> Result<()> {
    let stt = ScriptedStt::new().script(
        AudioSource::Mic,
        vec![SttStep::Say("Let me pull up your latest statements")],
    );
    let generator = ScriptedGenerator::new().reply(
        TaskKind::Suggestion,
        Reply::Chunks(vec!["NO_", "SUGGESTION"]),
    );
    let mut settings = quiet_settings();
    settings.gates.suggestion = callpilot::gate::GatePolicy::new(6_000, 20);
    let mut h = Harness::start(stt, generator, settings);

    h.send_text(json!({"type": "config", "sources": ["mic"]}));
    h.send_audio(mic_frame());

    h.next_of("suggestion_start").await;
    match h.next_event().await {
        Some(ServerEvent::SuggestionDone { had_suggestion, .. }) => assert!(!had_suggestion),
        other => panic!("expected suggestion_done, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_tracker_updates_from_assessment() -> Result<()> {
    let stt = ScriptedStt::new().script(
        AudioSource::Room,
        vec![SttStep::Say("Yes, we funded the 529 last month")],
    );
    let generator = ScriptedGenerator::new().reply(
        TaskKind::DiscussionTracker,
        Reply::Chunks(vec![
            r#"{"points": [{"text": "Review 529 funding", "status": "discussed", "note": "Funded"}],"#,
            r#" "nudge": "Ask about the RMD"}"#,
        ]),
    );
    let mut h = Harness::start(stt, generator, quiet_settings());

    h.send_text(json!({"type": "config", "sources": ["room"]}));
    h.send_text(json!({
        "type": "client_context",
        "client_id": "client-chen",
        "discussion_points": ["Review 529 funding", "Plan RMD"]
    }));

    match h.next_of("discussion_tracker_update").await {
        ServerEvent::DiscussionTrackerUpdate { points, .. } => {
            assert_eq!(points.len(), 2);
            assert!(points.iter().all(|p| p.status == PointStatus::Pending));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    h.send_audio(room_frame());
    match h.next_of("discussion_tracker_update").await {
        ServerEvent::DiscussionTrackerUpdate { points, nudge } => {
            assert_eq!(points[0].status, PointStatus::Discussed);
            assert_eq!(points[0].note, "Funded");
            assert_eq!(points[1].status, PointStatus::Pending);
            assert_eq!(nudge, "Ask about the RMD");
        }
        other => panic!("unexpected event: {:?}", other),
    }

    // The tracker saw the client context and only the new slice
    let request = &h.generator.requests_for(TaskKind::DiscussionTracker)[0];
    assert_eq!(
        request.context["transcript_slice"],
        "Client: Yes, we funded the 529 last month"
    );
    assert!(request.context["client_context"]
        .as_str()
        .unwrap()
        .contains("Chen Household"));

    Ok(())
}

#[tokio::test]
async fn test_simulation_alternates_speakers() -> Result<()> {
    let stt = ScriptedStt::new().script(
        AudioSource::Room,
        vec![SttStep::Say("How are the markets?"), SttStep::Say("Volatile, but we're diversified")],
    );
    let mut h = Harness::start(stt, ScriptedGenerator::new(), quiet_settings());

    h.send_text(json!({"type": "config", "sources": ["mic", "room"], "mode": "simulation"}));
    h.send_audio(room_frame());
    assert_eq!(h.next_final_transcript().await.0, "Advisor");
    h.send_audio(room_frame());
    assert_eq!(h.next_final_transcript().await.0, "Client");

    // Only the room source is connected in simulation
    assert_eq!(h.stt.opened().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_summary_persisted_after_client_disconnects() -> Result<()> {
    let stt = ScriptedStt::new().script(AudioSource::Mic, vec![SttStep::Say("Thanks, talk soon")]);
    let generator = ScriptedGenerator::new().reply(
        TaskKind::Summary,
        Reply::Fail(GenerationError::Backend("model unavailable".to_string())),
    );
    let mut h = Harness::start(stt, generator, quiet_settings());

    h.send_text(json!({"type": "config", "sources": ["mic"]}));
    h.send_text(json!({"type": "client_context", "client_id": "client-chen"}));
    h.send_audio(mic_frame());
    h.next_final_transcript().await;

    h.send_text(json!({"type": "generate_summary"}));
    h.close();

    let stats = h.session.await?;
    assert_eq!(stats.state, SessionState::Closed);

    let by_session = h.notes.get("summary-test-session").await?.unwrap();
    assert!(by_session.contains("model unavailable"));
    assert!(h.notes.get("summary-client-chen").await?.is_some());

    Ok(())
}

fn tracker_points(event: ServerEvent) -> Vec<DiscussionPoint> {
    match event {
        ServerEvent::DiscussionTrackerUpdate { points, .. } => points,
        other => panic!("unexpected event: {:?}", other),
    }
}

fn statuses(points: &[DiscussionPoint]) -> Vec<(&str, PointStatus)> {
    points.iter().map(|p| (p.text.as_str(), p.status)).collect()
}

#[tokio::test]
async fn test_tracker_result_for_replaced_points_is_discarded() -> Result<()> {
    let stt = ScriptedStt::new().script(
        AudioSource::Room,
        vec![
            SttStep::Say("We topped up the 529 and sorted the RMD"),
            SttStep::Say("Next we should cover the estate plan"),
        ],
    );
    let release = Arc::new(Notify::new());
    let generator = ScriptedGenerator::new()
        .reply(
            TaskKind::DiscussionTracker,
            Reply::Held(
                release.clone(),
                vec![
                    r#"{"points": [{"text": "Review 529", "status": "discussed"},"#,
                    r#" {"text": "Plan RMD", "status": "discussed"}]}"#,
                ],
            ),
        )
        .reply(
            TaskKind::DiscussionTracker,
            Reply::Chunks(vec![
                r#"{"points": [{"text": "Estate plan", "status": "in_progress"}]}"#,
            ]),
        );
    let mut h = Harness::start(stt, generator, quiet_settings());

    h.send_text(json!({"type": "config", "sources": ["room"]}));
    h.send_text(json!({"type": "set_discussion_points", "discussion_points": ["Review 529", "Plan RMD"]}));
    h.next_of("discussion_tracker_update").await;

    // Fires a tracker run whose reply is held back
    h.send_audio(room_frame());
    h.next_final_transcript().await;

    h.send_text(json!({
        "type": "set_discussion_points",
        "discussion_points": ["Estate plan", "Insurance review"]
    }));
    let points = tracker_points(h.next_of("discussion_tracker_update").await);
    assert_eq!(
        statuses(&points),
        vec![
            ("Estate plan", PointStatus::Pending),
            ("Insurance review", PointStatus::Pending)
        ]
    );

    // The old run completes against a list it never saw
    release.notify_one();
    settle().await;

    h.send_audio(room_frame());
    let points = tracker_points(h.next_of("discussion_tracker_update").await);
    assert_eq!(
        statuses(&points),
        vec![
            ("Estate plan", PointStatus::InProgress),
            ("Insurance review", PointStatus::Pending)
        ]
    );

    // The new list is judged against the whole call
    let requests = h.generator.requests_for(TaskKind::DiscussionTracker);
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[1].context["transcript_slice"],
        "Client: We topped up the 529 and sorted the RMD\nClient: Next we should cover the estate plan"
    );
    assert_eq!(requests[1].context["points"][0]["text"], "Estate plan");

    Ok(())
}

#[tokio::test]
async fn test_failed_tracker_run_slice_is_retried() -> Result<()> {
    let stt = ScriptedStt::new().script(
        AudioSource::Room,
        vec![
            SttStep::Say("We funded the 529 already"),
            SttStep::Say("Okay"),
            SttStep::Say("What about the RMD"),
        ],
    );
    let generator = ScriptedGenerator::new()
        .reply(
            TaskKind::DiscussionTracker,
            Reply::Fail(GenerationError::Backend("rate limited".to_string())),
        )
        .reply(
            TaskKind::DiscussionTracker,
            Reply::Chunks(vec![
                r#"{"points": [{"text": "Review 529 funding", "status": "discussed"}]}"#,
            ]),
        );
    let mut h = Harness::start(stt, generator, quiet_settings());

    h.send_text(json!({"type": "config", "sources": ["room"]}));
    h.send_text(json!({
        "type": "set_discussion_points",
        "discussion_points": ["Review 529 funding", "Plan RMD"]
    }));
    h.next_of("discussion_tracker_update").await;

    h.send_audio(room_frame());
    h.next_final_transcript().await;
    settle().await;

    h.send_audio(room_frame());
    let points = tracker_points(h.next_of("discussion_tracker_update").await);
    assert_eq!(points[0].status, PointStatus::Discussed);

    // Same assessment on the next slice: nothing new to show
    h.send_audio(room_frame());
    h.next_final_transcript().await;
    settle().await;

    let requests = h.generator.requests_for(TaskKind::DiscussionTracker);
    assert_eq!(requests.len(), 3);
    assert_eq!(
        requests[1].context["transcript_slice"],
        "Client: We funded the 529 already\nClient: Okay"
    );
    assert_eq!(requests[2].context["transcript_slice"], "Client: What about the RMD");

    h.close();
    let rest = h.drain().await;
    assert!(rest.iter().all(|e| e.kind() != "discussion_tracker_update"));

    Ok(())
}

#[tokio::test]
async fn test_compliance_alerts_dedup_and_critical_escalates() -> Result<()> {
    let stt = ScriptedStt::new().script(
        AudioSource::Mic,
        vec![
            SttStep::Say("I can guarantee you twelve percent a year"),
            SttStep::Say("Honestly this fund never loses money"),
        ],
    );
    let generator = ScriptedGenerator::new()
        .reply(
            TaskKind::Compliance,
            Reply::Chunks(vec![
                r#"{"flags": [{"severity": "Critical", "issue": "Guaranteed returns", "recommendation": "Returns are never guaranteed"},"#,
                r#" {"severity": "warning", "issue": "Missing risk disclosure", "recommendation": "Mention market risk"}]}"#,
            ]),
        )
        .reply(
            TaskKind::Compliance,
            Reply::Chunks(vec![
                r#"{"flags": [{"severity": "critical", "issue": "guaranteed  RETURNS", "recommendation": "Retract"},"#,
                r#" {"severity": "high", "issue": "Implied no-loss claim", "recommendation": "Correct it"}]}"#,
            ]),
        );
    let mut settings = quiet_settings();
    // The clock never moves, so only escalation can beat this cooldown
    settings.gates.compliance = GatePolicy::new(60_000, 10);
    let mut h = Harness::start(stt, generator, settings);

    h.send_text(json!({"type": "config", "sources": ["mic"]}));
    h.send_audio(mic_frame());

    let mut first = Vec::new();
    for _ in 0..2 {
        match h.next_of("compliance_alert").await {
            ServerEvent::ComplianceAlert(flag) => first.push((flag.issue, flag.severity)),
            other => panic!("unexpected event: {:?}", other),
        }
    }
    assert_eq!(
        first,
        vec![
            ("Guaranteed returns".to_string(), Severity::Critical),
            ("Missing risk disclosure".to_string(), Severity::Warning)
        ]
    );

    h.send_audio(mic_frame());
    match h.next_of("compliance_alert").await {
        ServerEvent::ComplianceAlert(flag) => {
            assert_eq!(flag.issue, "Implied no-loss claim");
            assert_eq!(flag.severity, Severity::Warning);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let requests = h.generator.requests_for(TaskKind::Compliance);
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[1].context["prior_issues"],
        json!(["Guaranteed returns", "Missing risk disclosure"])
    );

    h.close();
    let rest = h.drain().await;
    assert!(rest.iter().all(|e| e.kind() != "compliance_alert"));

    Ok(())
}

#[tokio::test]
async fn test_todo_updates_carry_only_new_items() -> Result<()> {
    let stt = ScriptedStt::new().script(
        AudioSource::Mic,
        vec![
            SttStep::Say("I'll send the 529 forms and you call your CPA"),
            SttStep::Say("So forms from me and the CPA call from you"),
            SttStep::Say("And let's book the annual review"),
        ],
    );
    let generator = ScriptedGenerator::new()
        .reply(
            TaskKind::Todo,
            Reply::Chunks(vec![r#"{"items": ["Send 529 forms", "Call CPA"]}"#]),
        )
        .reply(
            TaskKind::Todo,
            Reply::Chunks(vec![r#"{"items": ["send 529  forms", " Call CPA "]}"#]),
        )
        .reply(
            TaskKind::Todo,
            Reply::Chunks(vec![r#"{"items": ["Call CPA", "Book annual review"]}"#]),
        );
    let mut settings = quiet_settings();
    settings.gates.todo = GatePolicy::new(0, 1);
    let mut h = Harness::start(stt, generator, settings);

    h.send_text(json!({"type": "config", "sources": ["mic"]}));

    h.send_audio(mic_frame());
    assert_eq!(
        h.next_of("todo_update").await,
        ServerEvent::TodoUpdate {
            items: vec!["Send 529 forms".to_string(), "Call CPA".to_string()]
        }
    );

    // Nothing new: no event
    h.send_audio(mic_frame());
    h.next_final_transcript().await;
    settle().await;

    h.send_audio(mic_frame());
    assert_eq!(
        h.next_of("todo_update").await,
        ServerEvent::TodoUpdate {
            items: vec!["Book annual review".to_string()]
        }
    );

    let requests = h.generator.requests_for(TaskKind::Todo);
    assert_eq!(requests.len(), 3);
    assert_eq!(
        requests[2].context["known_todos"],
        json!(["Send 529 forms", "Call CPA"])
    );

    Ok(())
}

#[tokio::test]
async fn test_intelligence_updates_build_summary_profile() -> Result<()> {
    let stt = ScriptedStt::new().script(
        AudioSource::Room,
        vec![
            SttStep::Say("Thanks for having us"),
            SttStep::Say("Mia is seventeen and college is on our minds"),
            SttStep::Say("Leo is twelve and we both love sailing"),
        ],
    );
    let generator = ScriptedGenerator::new()
        .reply(
            TaskKind::Intelligence,
            Reply::Chunks(vec![r#"{"family": [], "sentiment": ""}"#]),
        )
        .reply(
            TaskKind::Intelligence,
            Reply::Chunks(vec![
                r#"{"family": ["Daughter Mia, 17"], "key_concerns": ["College costs"], "sentiment": "anxious"}"#,
            ]),
        )
        .reply(
            TaskKind::Intelligence,
            Reply::Chunks(vec![
                r#"{"family": ["Daughter Mia, 17", "Son Leo, 12"], "interests": ["Sailing"]}"#,
            ]),
        )
        .reply(
            TaskKind::Summary,
            Reply::Chunks(vec![r#"{"summary": "Covered college funding"}"#]),
        );
    let mut settings = quiet_settings();
    settings.gates.intelligence = GatePolicy::new(0, 1);
    let mut h = Harness::start(stt, generator, settings);

    h.send_text(json!({"type": "config", "sources": ["room"]}));

    // An update with nothing in it is not shown
    h.send_audio(room_frame());
    h.next_final_transcript().await;
    settle().await;

    h.send_audio(room_frame());
    match h.next_of("intelligence_update").await {
        ServerEvent::IntelligenceUpdate(report) => {
            assert_eq!(report.family, vec!["Daughter Mia, 17"]);
            assert_eq!(report.sentiment.as_deref(), Some("anxious"));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    h.send_audio(room_frame());
    match h.next_of("intelligence_update").await {
        ServerEvent::IntelligenceUpdate(report) => {
            assert_eq!(report.interests, vec!["Sailing"]);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    h.send_text(json!({"type": "generate_summary"}));
    h.next_of("post_call_summary").await;

    let request = &h.generator.requests_for(TaskKind::Summary)[0];
    assert_eq!(
        request.context["profile"],
        json!({
            "family": ["Daughter Mia, 17", "Son Leo, 12"],
            "interests": ["Sailing"],
            "key_concerns": ["College costs"],
            "sentiment": ["anxious"]
        })
    );

    Ok(())
}

#[tokio::test]
async fn test_requested_discussion_suggestions_replace_points() -> Result<()> {
    let generator = ScriptedGenerator::new().reply(
        TaskKind::DiscussionSuggestions,
        Reply::Chunks(vec![
            r#"{"points": ["Review 529 funding", "Beneficiary update", " "]}"#,
        ]),
    );
    let mut h = Harness::start(ScriptedStt::new(), generator, quiet_settings());

    h.send_text(json!({"type": "config", "sources": ["room"]}));
    h.send_text(json!({"type": "client_context", "client_id": "client-chen"}));
    h.send_text(json!({"type": "request_discussion_suggestions"}));

    assert_eq!(
        h.next_of("discussion_suggestions").await,
        ServerEvent::DiscussionSuggestions {
            points: vec![
                "Review 529 funding".to_string(),
                "Beneficiary update".to_string()
            ]
        }
    );
    let points = tracker_points(h.next_of("discussion_tracker_update").await);
    assert_eq!(
        statuses(&points),
        vec![
            ("Review 529 funding", PointStatus::Pending),
            ("Beneficiary update", PointStatus::Pending)
        ]
    );

    let request = &h.generator.requests_for(TaskKind::DiscussionSuggestions)[0];
    assert!(request.context["client_context"]
        .as_str()
        .unwrap()
        .contains("Chen Household"));

    Ok(())
}

#[tokio::test]
async fn test_failed_discussion_suggestions_report_error() -> Result<()> {
    let generator = ScriptedGenerator::new().reply(
        TaskKind::DiscussionSuggestions,
        Reply::Fail(GenerationError::Backend("rate limited".to_string())),
    );
    let mut h = Harness::start(ScriptedStt::new(), generator, quiet_settings());

    h.send_text(json!({"type": "request_discussion_suggestions"}));
    match h.next_of("error").await {
        ServerEvent::Error { message } => assert!(message.contains("rate limited")),
        other => panic!("unexpected event: {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_unknown_and_unconfigured_frames_are_dropped() -> Result<()> {
    let stt = ScriptedStt::new().script(AudioSource::Mic, vec![SttStep::Say("Hello there")]);
    let mut h = Harness::start(stt, ScriptedGenerator::new(), quiet_settings());

    h.send_text(json!({"type": "config", "sources": ["mic"]}));
    h.send_audio(vec![0x07, 0x10, 0x00, 0x20, 0x00]);
    h.send_audio(vec![0x01]);
    h.send_audio(room_frame());
    h.send_audio(mic_frame());

    assert_eq!(
        h.next_final_transcript().await,
        ("Advisor".to_string(), "Hello there".to_string())
    );

    h.close();
    let rest = h.drain().await;
    assert!(rest.iter().all(|e| e.kind() != "error"));

    let stats = h.session.await?;
    assert_eq!(stats.committed_lines, 1);
    assert_eq!(h.stt.opened().len(), 1);

    Ok(())
}
