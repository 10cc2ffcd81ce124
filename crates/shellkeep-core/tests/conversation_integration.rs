#![allow(clippy::unwrap_used, clippy::expect_used)] // Integration tests use unwrap for brevity

//! Tool loop driven by a scripted model against a real shell session.

use std::collections::VecDeque;
use std::time::Duration;

use shellkeep_core::tool::{ChatModel, Conversation};
use shellkeep_core::{Error, Result, SessionOptions, ShellSession};

/// Replies from a fixed script and records every message it was sent.
struct ScriptedModel {
    replies: VecDeque<String>,
    received: Vec<String>,
}

impl ScriptedModel {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: replies.iter().map(|r| (*r).to_string()).collect(),
            received: Vec::new(),
        }
    }
}

impl ChatModel for ScriptedModel {
    async fn send(&mut self, message: &str) -> Result<String> {
        self.received.push(message.to_string());
        self.replies
            .pop_front()
            .ok_or_else(|| Error::Model("script exhausted".into()))
    }
}

async fn session_in(dir: &std::path::Path) -> ShellSession {
    ShellSession::start(SessionOptions::new(dir).with_default_timeout(Duration::from_secs(10)))
        .await
        .expect("bash session should start")
}

#[tokio::test]
async fn runs_tools_and_feeds_results_back() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut session = session_in(dir.path()).await;
    let mut model = ScriptedModel::new(&[
        "<THINK>make a file</THINK><TOOL>echo hi > note.txt</TOOL><TOOL>cat note.txt</TOOL>",
        "<TOOL>cat missing.txt</TOOL>",
        "<RESULT>done</RESULT>",
    ]);

    let summary = Conversation::default()
        .drive(&mut model, &mut session, "please create note.txt")
        .await
        .unwrap();

    assert_eq!(summary.rounds, 3);
    assert_eq!(summary.commands_run, 3);
    assert_eq!(summary.last_response, "<RESULT>done</RESULT>");
    assert!(!summary.hit_round_limit);

    assert_eq!(model.received[0], "please create note.txt");
    // First command was silent, so only the second is reported, under index 2.
    assert_eq!(model.received[1], "<TOOL RES 2>hi\n</TOOL RES>");
    assert!(model.received[2].starts_with("<TOOL RES 1 ERROR_CODE=1>\n--error_msg--\n"));
    assert!(model.received[2].contains("missing.txt"));

    session.close().await;
}

#[tokio::test]
async fn silent_round_ends_turn() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut session = session_in(dir.path()).await;
    let mut model = ScriptedModel::new(&["<TOOL>cd /tmp</TOOL>", "never sent"]);

    let summary = Conversation::default()
        .drive(&mut model, &mut session, "go to tmp")
        .await
        .unwrap();
    assert_eq!(summary.rounds, 1);
    assert_eq!(model.received.len(), 1);

    // Shell state from the loop persists in the session.
    assert_eq!(session.run("pwd", None).await.unwrap().stdout, "/tmp");
    session.close().await;
}

#[tokio::test]
async fn round_limit_stops_runaway_model() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut session = session_in(dir.path()).await;
    let mut model = ScriptedModel::new(&["<TOOL>echo 1</TOOL>"; 10]);

    let summary = Conversation::default()
        .with_max_rounds(3)
        .drive(&mut model, &mut session, "loop")
        .await
        .unwrap();
    assert_eq!(summary.rounds, 3);
    assert!(summary.hit_round_limit);
    session.close().await;
}

#[tokio::test]
async fn windows_paths_in_user_message_are_converted() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut session = session_in(dir.path()).await;
    let mut model = ScriptedModel::new(&["ok"]);

    Conversation::default()
        .drive(&mut model, &mut session, r"look at C:\Users\me\file.txt")
        .await
        .unwrap();
    assert_eq!(model.received[0], "look at /c/Users/me/file.txt");
    session.close().await;
}

#[tokio::test]
async fn command_timeout_ends_the_turn() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut session = session_in(dir.path()).await;
    let mut model = ScriptedModel::new(&["<TOOL>sleep 5</TOOL>"]);

    let err = Conversation::default()
        .with_command_timeout(Duration::from_millis(200))
        .drive(&mut model, &mut session, "wait")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CommandTimeout { .. }));
    assert!(session.is_desynchronized());
    session.close().await;
}
