//! Unit Tests for the Wire Protocol
//!
//! JSON shapes of inbound and outbound events as the browser client sends
//! and expects them.

use runterm::protocol::STOP_ACK;
use runterm::{ClientEvent, Error, EventSink, ServerEvent, TerminalStatus};
use serde_json::{json, Value};

#[test]
fn test_parse_run_with_language() {
    let event =
        ClientEvent::from_json(r#"{"event":"run_code_v2","data":{"code":"print(1)","lang":"python"}}"#)
            .unwrap();
    assert_eq!(
        event,
        ClientEvent::RunCode {
            code: "print(1)".to_string(),
            lang: Some("python".to_string()),
        }
    );
}

#[test]
fn test_parse_run_without_language() {
    let event = ClientEvent::from_json(r#"{"event":"run_code_v2","data":{"code":"int main(){}"}}"#)
        .unwrap();
    match event {
        ClientEvent::RunCode { lang, .. } => assert!(lang.is_none()),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[test]
fn test_parse_input_and_stop() {
    assert_eq!(
        ClientEvent::from_json(r#"{"event":"send_input","data":{"input":"42"}}"#).unwrap(),
        ClientEvent::SendInput {
            input: "42".to_string()
        }
    );
    assert_eq!(
        ClientEvent::from_json(r#"{"event":"stop_code"}"#).unwrap(),
        ClientEvent::StopCode
    );
}

#[test]
fn test_malformed_messages_are_errors() {
    for text in [
        "not json",
        r#"{"event":"launch_missiles"}"#,
        r#"{"event":"run_code_v2","data":{}}"#,
        r#"{"event":"send_input","data":{"text":"x"}}"#,
    ] {
        assert!(ClientEvent::from_json(text).is_err(), "accepted {}", text);
    }
}

#[test]
fn test_output_event_shape() {
    let text = ServerEvent::output("hi\n").to_json().unwrap();
    let value: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value, json!({"event": "program_output", "data": {"data": "hi\n"}}));
}

#[test]
fn test_status_event_shape() {
    let finished: Value =
        serde_json::from_str(&ServerEvent::status(TerminalStatus::Finished).to_json().unwrap())
            .unwrap();
    assert_eq!(
        finished,
        json!({"event": "program_status", "data": {"status": "finished"}})
    );

    let error: Value =
        serde_json::from_str(&ServerEvent::status(TerminalStatus::Error).to_json().unwrap())
            .unwrap();
    assert_eq!(error["data"]["status"], "error");
}

#[test]
fn test_sink_reports_failures_in_order() {
    let (sink, mut rx) = EventSink::channel();
    sink.fail(&Error::UnsupportedLanguage {
        lang: "cobol".to_string(),
    });

    assert_eq!(
        rx.try_recv().unwrap(),
        ServerEvent::output("❌ Unsupported language: 'cobol'\n")
    );
    assert_eq!(
        rx.try_recv().unwrap(),
        ServerEvent::status(TerminalStatus::Error)
    );
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_stop_ack_text() {
    assert_eq!(STOP_ACK, "\n[program stopped]\n");
}
