mod support;

use std::time::Duration;

use chat_backend::{BackendError, ChatBackend, Conversation, Language, Message};
use chat_backend_mock::MockStream;
use notebook_stream::{SendError, SessionEvent, SessionOutcome};
use pretty_assertions::assert_eq;

use support::{harness, plain_options, wait_until, WAIT};

fn conversation(id: &str) -> Conversation {
    Conversation {
        id: id.to_string(),
        title: id.to_string(),
        created_at: None,
        updated_at: None,
    }
}

#[test]
fn fragmented_stream_reconstructs_transcript_and_finishes() {
    let h = harness(plain_options());
    h.backend.push_stream(
        MockStream::from_events(&[
            r#"[USER_MESSAGE:{"id":"u1","content":"hi","originalLanguage":"en","translatedContent":""}]"#,
            "[PHASE:RESPONDING]",
            "[ASSISTANT_MESSAGE_ID:\"a1\"]",
            r#"{"content":"He"}"#,
            r#"{"content":"llo"}"#,
            "[DONE]",
        ])
        .fragmented(7),
    );

    let handle = h
        .controller
        .send(Some("t1"), "hi", None)
        .expect("send should start");
    let session_id = handle.session_id();
    assert_eq!(handle.wait(), SessionOutcome::Completed);

    assert_eq!(
        h.controller.snapshot("t1"),
        vec![
            Message::user("u1", "hi").with_original_language(Language::Target),
            Message::assistant("a1", "Hello"),
        ]
    );
    assert!(!h.controller.is_generating("t1"));

    let events = h.log.for_session(session_id);
    assert_eq!(
        events.first(),
        Some(&SessionEvent::Started {
            session_id,
            conversation_id: "t1".to_string(),
        })
    );
    assert_eq!(
        events.last(),
        Some(&SessionEvent::Finished {
            session_id,
            conversation_id: "t1".to_string(),
            refresh_conversations: true,
        })
    );
    assert!(events
        .iter()
        .any(|event| matches!(event, SessionEvent::TranscriptChanged { .. })));
}

#[test]
fn request_carries_options_and_model_fallback() {
    let h = harness(plain_options().with_default_model("gpt-4o"));
    h.backend.push_stream(MockStream::from_events(&["[DONE]"]));
    h.backend.push_stream(MockStream::from_events(&["[DONE]"]));

    h.controller
        .send(Some("t1"), "hi", None)
        .expect("send")
        .wait();
    h.controller
        .send(Some("t1"), "hi", Some("gpt-4o-mini"))
        .expect("send")
        .wait();

    let requests = h.backend.requests();
    assert_eq!(requests[0].model, "gpt-4o");
    assert_eq!(requests[1].model, "gpt-4o-mini");
    assert!(!requests[0].translate_to_english);
    assert!(!requests[0].auto_translate_responses);
}

#[test]
fn cancel_keeps_partial_messages_and_clears_generating() {
    let h = harness(plain_options());
    h.backend.push_stream(
        MockStream::from_events(&[
            r#"[USER_MESSAGE:{"id":"u1","content":"hi"}]"#,
            "[ASSISTANT_MESSAGE_ID:a1]",
            "[PHASE:RESPONDING]",
            r#"{"content":"Partial"}"#,
        ])
        .then_hold(),
    );

    let handle = h
        .controller
        .send(Some("t1"), "hi", None)
        .expect("send should start");
    assert!(wait_until(WAIT, || {
        h.controller
            .snapshot("t1")
            .iter()
            .any(|message| message.id == "a1")
    }));
    assert!(h.controller.is_generating("t1"));

    h.controller.cancel(&handle);
    assert!(!h.controller.is_generating("t1"));

    let session_id = handle.session_id();
    assert_eq!(handle.wait(), SessionOutcome::Cancelled);
    assert_eq!(
        h.controller.snapshot("t1"),
        vec![Message::user("u1", "hi"), Message::assistant("a1", "Partial")]
    );
    assert!(matches!(
        h.log.for_session(session_id).last(),
        Some(SessionEvent::Cancelled { .. })
    ));
}

#[test]
fn cancel_is_reported_as_cancelled_even_when_transport_errors() {
    let h = harness(plain_options());
    h.backend.push_stream(
        MockStream::from_events(&[
            "[ASSISTANT_MESSAGE_ID:a1]",
            "[PHASE:RESPONDING]",
            r#"{"content":"part"}"#,
        ])
        .then_abort_on_cancel(BackendError::Transport("connection aborted".to_string())),
    );

    let handle = h.controller.send(Some("t1"), "hi", None).expect("send");
    assert!(wait_until(WAIT, || !h.controller.snapshot("t1").is_empty()));

    h.controller.cancel(&handle);
    let session_id = handle.session_id();
    assert_eq!(handle.wait(), SessionOutcome::Cancelled);

    assert_eq!(
        h.controller.snapshot("t1"),
        vec![Message::assistant("a1", "part")]
    );
    let events = h.log.for_session(session_id);
    assert!(matches!(events.last(), Some(SessionEvent::Cancelled { .. })));
    assert!(!events
        .iter()
        .any(|event| matches!(event, SessionEvent::Failed { .. })));
}

#[test]
fn second_send_supersedes_first_for_same_conversation() {
    let h = harness(plain_options());
    h.backend.push_stream(
        MockStream::from_events(&[
            r#"[USER_MESSAGE:{"id":"u1","content":"first"}]"#,
            "[ASSISTANT_MESSAGE_ID:a1]",
            "[PHASE:RESPONDING]",
            r#"{"content":"one"}"#,
        ])
        .then_hold(),
    );
    h.backend.push_stream(MockStream::from_events(&[
        r#"[USER_MESSAGE:{"id":"u2","content":"second"}]"#,
        "[ASSISTANT_MESSAGE_ID:a2]",
        "[PHASE:RESPONDING]",
        r#"{"content":"two"}"#,
        "[DONE]",
    ]));

    let first = h
        .controller
        .send(Some("t1"), "first", None)
        .expect("first send");
    assert!(wait_until(WAIT, || h.controller.snapshot("t1").len() == 2));

    let second = h
        .controller
        .send(Some("t1"), "second", None)
        .expect("second send");
    assert!(first.is_cancelled());
    assert_eq!(h.controller.active_session("t1"), Some(second.session_id()));

    let first_id = first.session_id();
    let second_id = second.session_id();
    assert_eq!(first.wait(), SessionOutcome::Cancelled);
    assert_eq!(second.wait(), SessionOutcome::Completed);

    assert_eq!(
        h.controller.snapshot("t1"),
        vec![
            Message::user("u1", "first"),
            Message::assistant("a1", "one"),
            Message::user("u2", "second"),
            Message::assistant("a2", "two"),
        ]
    );
    assert!(!h.controller.is_generating("t1"));

    let events = h.log.events();
    let first_terminal = events
        .iter()
        .position(|event| event.session_id() == first_id && event.is_terminal());
    assert!(matches!(
        first_terminal.map(|index| &events[index]),
        Some(SessionEvent::Cancelled { .. })
    ));
    assert!(h
        .log
        .for_session(second_id)
        .iter()
        .any(|event| matches!(event, SessionEvent::Finished { .. })));
}

#[test]
fn superseded_session_never_mutates_after_successor_starts() {
    let h = harness(plain_options());
    h.backend.push_stream(
        MockStream::from_events(&[
            "[ASSISTANT_MESSAGE_ID:a1]",
            "[PHASE:RESPONDING]",
            r#"{"content":"a"}"#,
            r#"{"content":"b"}"#,
            r#"{"content":"c"}"#,
            r#"{"content":"d"}"#,
        ])
        .with_chunk_delay(Duration::from_millis(20))
        .then_hold(),
    );
    h.backend.push_stream(MockStream::from_events(&["[DONE]"]).then_hold());

    let first = h.controller.send(Some("t1"), "one", None).expect("first");
    assert!(wait_until(WAIT, || !h.controller.snapshot("t1").is_empty()));

    let second = h.controller.send(Some("t1"), "two", None).expect("second");
    let frozen = h.controller.snapshot("t1");
    assert_eq!(first.wait(), SessionOutcome::Cancelled);
    assert_eq!(h.controller.snapshot("t1"), frozen);

    h.controller.cancel(&second);
    assert_eq!(second.wait(), SessionOutcome::Cancelled);
}

#[test]
fn sessions_for_different_conversations_run_independently() {
    let h = harness(plain_options());
    h.backend.push_stream(
        MockStream::from_events(&["[ASSISTANT_MESSAGE_ID:a1]", "[PHASE:RESPONDING]"]).then_hold(),
    );
    h.backend.push_stream(MockStream::from_events(&[
        "[ASSISTANT_MESSAGE_ID:b1]",
        "[PHASE:RESPONDING]",
        r#"{"content":"done"}"#,
    ]));

    let held = h.controller.send(Some("t1"), "one", None).expect("first");
    assert!(wait_until(WAIT, || h.backend.requests().len() == 1));
    let quick = h.controller.send(Some("t2"), "two", None).expect("second");

    assert_eq!(quick.wait(), SessionOutcome::Completed);
    assert!(h.controller.is_generating("t1"));
    assert!(!held.is_cancelled());
    assert_eq!(
        h.controller.snapshot("t2"),
        vec![Message::assistant("b1", "done")]
    );

    assert!(h.controller.cancel_conversation("t1"));
    assert_eq!(held.wait(), SessionOutcome::Cancelled);
}

#[test]
fn transport_failure_is_surfaced_without_retry() {
    let h = harness(plain_options());
    h.backend
        .push_stream(MockStream::refused(BackendError::Status {
            status: 500,
            message: "Internal Server Error".to_string(),
        }));

    let handle = h.controller.send(Some("t1"), "hi", None).expect("send");
    let session_id = handle.session_id();
    let outcome = handle.wait();

    assert_eq!(
        outcome,
        SessionOutcome::Failed("request failed with status 500: Internal Server Error".to_string())
    );
    assert_eq!(h.backend.requests().len(), 1);
    assert!(h.controller.snapshot("t1").is_empty());
    assert!(!h.controller.is_generating("t1"));
    assert!(matches!(
        h.log.for_session(session_id).last(),
        Some(SessionEvent::Failed { error, .. }) if error.contains("500")
    ));
}

#[test]
fn read_error_mid_stream_keeps_committed_messages() {
    let h = harness(plain_options());
    h.backend.push_stream(
        MockStream::from_events(&[
            r#"[USER_MESSAGE:{"id":"u1","content":"hi"}]"#,
            "[ASSISTANT_MESSAGE_ID:a1]",
            "[PHASE:RESPONDING]",
            r#"{"content":"Hal"}"#,
        ])
        .then_fail(BackendError::Transport("connection reset".to_string())),
    );

    let outcome = h.controller.send(Some("t1"), "hi", None).expect("send").wait();

    assert!(matches!(outcome, SessionOutcome::Failed(error) if error.contains("connection reset")));
    assert_eq!(
        h.controller.snapshot("t1"),
        vec![Message::user("u1", "hi"), Message::assistant("a1", "Hal")]
    );
}

#[test]
fn server_error_frame_fails_the_session() {
    let h = harness(plain_options());
    h.backend.push_stream(MockStream::from_events(&[
        r#"[USER_MESSAGE:{"id":"u1","content":"hi"}]"#,
        r#"{"error": "Unauthorized access to this thread"}"#,
        "[ASSISTANT_MESSAGE_ID:a1]",
        "[PHASE:RESPONDING]",
        r#"{"content":"ignored"}"#,
    ]));

    let outcome = h.controller.send(Some("t1"), "hi", None).expect("send").wait();

    assert_eq!(
        outcome,
        SessionOutcome::Failed("Unauthorized access to this thread".to_string())
    );
    assert_eq!(h.controller.snapshot("t1"), vec![Message::user("u1", "hi")]);
}

#[test]
fn send_without_conversation_creates_one_first() {
    let h = harness(plain_options());

    let handle = h
        .controller
        .send(None, "What is the difference between affect and effect?", None)
        .expect("send");
    let conversation_id = handle.conversation_id().to_string();
    assert_eq!(handle.wait(), SessionOutcome::Completed);

    let conversations = h.backend.list_conversations().expect("list");
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].id, conversation_id);
    assert_eq!(conversations[0].title, "What is the difference between...");
    assert_eq!(h.backend.requests()[0].conversation_id, conversation_id);

    let transcript = h.controller.snapshot(&conversation_id);
    assert_eq!(transcript.len(), 2);
    assert_eq!(
        transcript[1].content,
        "You said: What is the difference between affect and effect?"
    );
}

#[test]
fn create_failure_aborts_before_streaming() {
    let h = harness(plain_options());
    h.backend.fail_next_create(BackendError::Status {
        status: 503,
        message: "unavailable".to_string(),
    });

    let error = h
        .controller
        .send(None, "hello", None)
        .expect_err("create failure should abort send");

    assert!(matches!(error, SendError::CreateConversation(BackendError::Status { status: 503, .. })));
    assert!(h.backend.requests().is_empty());
    assert!(h.log.events().is_empty());
}

#[test]
fn blank_message_is_rejected() {
    let h = harness(plain_options());

    let error = h
        .controller
        .send(Some("t1"), "   \n", None)
        .expect_err("blank message should be rejected");

    assert!(matches!(error, SendError::EmptyMessage));
    assert!(h.backend.requests().is_empty());
}

#[test]
fn translated_round_trip_patches_both_translations() {
    let h = harness(Default::default());
    let conversation = h.backend.create_conversation("t").expect("create");

    let outcome = h
        .controller
        .send(Some(&conversation.id), "안녕 세상", None)
        .expect("send")
        .wait();
    assert_eq!(outcome, SessionOutcome::Completed);

    let streamed = h.controller.snapshot(&conversation.id);
    assert_eq!(streamed.len(), 2);
    assert_eq!(streamed[0].original_language, Some(Language::Source));
    assert_eq!(streamed[0].translated_content.as_deref(), Some("(en) 안녕 세상"));
    assert_eq!(streamed[1].content, "You said: 안녕 세상");
    assert_eq!(
        streamed[1].translated_content.as_deref(),
        Some("(ko) You said: 안녕 세상")
    );

    let stored = h
        .controller
        .load_conversation(&conversation.id)
        .expect("load");
    let ids = |messages: &[Message]| -> Vec<String> {
        messages.iter().map(|message| message.id.clone()).collect()
    };
    assert_eq!(ids(&stored), ids(&streamed));
    assert_eq!(stored[1].translated_content, streamed[1].translated_content);
}

#[test]
fn load_translate_and_delete_conversation() {
    let h = harness(plain_options());
    h.backend.insert_conversation(
        conversation("t1"),
        vec![
            Message::user("u1", "hello").with_original_language(Language::Target),
            Message::assistant("a1", "hi").with_original_language(Language::Target),
        ],
    );

    let loaded = h.controller.load_conversation("t1").expect("load");
    assert_eq!(loaded.len(), 2);

    let translated = h
        .controller
        .translate_message("t1", "a1")
        .expect("translate");
    assert_eq!(translated[1].translated_content.as_deref(), Some("(ko) hi"));
    assert_eq!(h.controller.snapshot("t1"), translated);

    h.controller.delete_conversation("t1").expect("delete");
    assert!(h.controller.snapshot("t1").is_empty());
    assert!(h.backend.list_conversations().expect("list").is_empty());
    assert!(matches!(
        h.controller.load_conversation("t1"),
        Err(BackendError::NotFound { .. })
    ));
}
