//! Contract Tests for the Pseudo-Terminal Lifecycle
//!
//! Launching a program on a terminal, reading its output, writing input,
//! signalling its process group and releasing the terminal.

use runterm::config::{PtyConfig, ToolchainConfig, WorkspaceConfig};
use runterm::pty::{ReadEvent, RunCommand, SignalDelivery, TerminalReader, TerminalSession};
use runterm::workspace::Workspace;
use runterm::Language;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const CHUNK: usize = 1024;

fn script_workspace(scratch: &TempDir, source: &str) -> Workspace {
    let workspace = WorkspaceConfig {
        scratch_root: scratch.path().to_path_buf(),
        ..WorkspaceConfig::default()
    };
    Workspace::materialize(
        source,
        Language::InterpretedScripting,
        &workspace,
        &ToolchainConfig::default(),
    )
    .unwrap()
}

fn sh(script: &str) -> RunCommand {
    RunCommand::new("/bin/sh", vec!["-c".to_string(), script.to_string()])
}

/// Read until the stream closes or `limit` passes
async fn read_all(reader: &mut TerminalReader, limit: Duration) -> String {
    let deadline = Instant::now() + limit;
    let mut bytes = Vec::new();
    while Instant::now() < deadline {
        match reader.read_with_timeout(Duration::from_millis(50)).await {
            ReadEvent::Data(chunk) => bytes.extend(chunk),
            ReadEvent::Closed => break,
            ReadEvent::Idle => {
                if matches!(reader.try_wait(), Ok(Some(_))) {
                    while let ReadEvent::Data(chunk) = reader.read_with_timeout(Duration::from_millis(50)).await {
                        bytes.extend(chunk);
                    }
                    break;
                }
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[tokio::test]
async fn test_launch_reports_pid_and_command() {
    let scratch = TempDir::new().unwrap();
    let workspace = script_workspace(&scratch, "");
    let session =
        TerminalSession::launch(&workspace, &sh("exit 0"), &PtyConfig::default(), CHUNK).unwrap();

    assert!(session.pid() > 0);
    assert_eq!(session.command(), "/bin/sh -c exit 0");
    // The program leads its own process group
    assert_eq!(session.process_group().id() as u32, session.pid());
}

#[tokio::test]
async fn test_output_is_relayed_without_carriage_returns() {
    let scratch = TempDir::new().unwrap();
    let workspace = script_workspace(&scratch, "");
    let session =
        TerminalSession::launch(&workspace, &sh("echo hello"), &PtyConfig::default(), CHUNK)
            .unwrap();
    let (mut reader, _control) = session.split();

    let output = read_all(&mut reader, Duration::from_secs(10)).await;
    assert_eq!(output, "hello\n");
}

#[tokio::test]
async fn test_newline_translation_when_enabled() {
    let scratch = TempDir::new().unwrap();
    let workspace = script_workspace(&scratch, "");
    let pty = PtyConfig {
        translate_newlines: true,
        ..PtyConfig::default()
    };
    let session = TerminalSession::launch(&workspace, &sh("echo hello"), &pty, CHUNK).unwrap();
    let (mut reader, _control) = session.split();

    let output = read_all(&mut reader, Duration::from_secs(10)).await;
    assert_eq!(output, "hello\r\n");
}

#[tokio::test]
async fn test_working_directory_is_scratch_root() {
    let scratch = TempDir::new().unwrap();
    let workspace = script_workspace(&scratch, "");
    let session =
        TerminalSession::launch(&workspace, &sh("pwd"), &PtyConfig::default(), CHUNK).unwrap();
    let (mut reader, _control) = session.split();

    let output = read_all(&mut reader, Duration::from_secs(10)).await;
    let expected = scratch.path().canonicalize().unwrap();
    assert_eq!(
        std::path::Path::new(output.trim()).canonicalize().unwrap(),
        expected
    );
}

#[tokio::test]
async fn test_environment_is_applied() {
    let scratch = TempDir::new().unwrap();
    let workspace = script_workspace(&scratch, "");
    let mut pty = PtyConfig::default();
    pty.environment
        .insert("RUNTERM_TEST_VALUE".to_string(), "marker".to_string());
    let session = TerminalSession::launch(
        &workspace,
        &sh("echo $RUNTERM_TEST_VALUE"),
        &pty,
        CHUNK,
    )
    .unwrap();
    let (mut reader, _control) = session.split();

    assert_eq!(read_all(&mut reader, Duration::from_secs(10)).await, "marker\n");
}

#[tokio::test]
async fn test_input_reaches_program_without_echo() {
    let scratch = TempDir::new().unwrap();
    let workspace = script_workspace(&scratch, "");
    let session = TerminalSession::launch(
        &workspace,
        &sh("read line; echo \"got $line\""),
        &PtyConfig::default(),
        CHUNK,
    )
    .unwrap();
    let (mut reader, control) = session.split();

    control.write_line("abc").unwrap();
    let output = read_all(&mut reader, Duration::from_secs(10)).await;
    assert_eq!(output, "got abc\n");
}

#[tokio::test]
async fn test_terminate_ends_program() {
    let scratch = TempDir::new().unwrap();
    let workspace = script_workspace(&scratch, "");
    let session =
        TerminalSession::launch(&workspace, &sh("sleep 60"), &PtyConfig::default(), CHUNK)
            .unwrap();
    let (mut reader, control) = session.split();

    assert_eq!(control.terminate().unwrap(), SignalDelivery::Delivered);

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut exited = false;
    while Instant::now() < deadline {
        if let Ok(Some(_)) = reader.try_wait() {
            exited = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(exited, "program should exit after SIGTERM");
    assert!(reader.release().is_some());
}

#[tokio::test]
async fn test_signal_after_exit_is_already_gone() {
    let scratch = TempDir::new().unwrap();
    let workspace = script_workspace(&scratch, "");
    let session =
        TerminalSession::launch(&workspace, &sh("exit 3"), &PtyConfig::default(), CHUNK).unwrap();
    let (mut reader, control) = session.split();

    read_all(&mut reader, Duration::from_secs(10)).await;
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline && !matches!(reader.try_wait(), Ok(Some(_))) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let status = reader.release().expect("exit observed");
    assert_eq!(status.exit_code(), 3);

    assert_eq!(control.kill().unwrap(), SignalDelivery::AlreadyGone);
    assert!(!control.process_group().is_alive());
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let scratch = TempDir::new().unwrap();
    let workspace = script_workspace(&scratch, "");
    let session =
        TerminalSession::launch(&workspace, &sh("sleep 60"), &PtyConfig::default(), CHUNK)
            .unwrap();
    let (mut reader, control) = session.split();

    reader.close();
    assert!(reader.is_closed());
    // Closing again is harmless
    reader.close();

    assert!(control.kill().is_ok());
    drop(reader.release());
}

#[tokio::test]
async fn test_launch_failure_for_missing_program() {
    let scratch = TempDir::new().unwrap();
    let workspace = script_workspace(&scratch, "");
    let result = TerminalSession::launch(
        &workspace,
        &RunCommand::new("/nonexistent/runterm-program", vec![]),
        &PtyConfig::default(),
        CHUNK,
    );
    assert!(result.is_err());
}

#[test]
fn test_run_command_for_script_workspace() {
    let scratch = TempDir::new().unwrap();
    let workspace = script_workspace(&scratch, "print(1)");
    let command = RunCommand::for_workspace(&workspace, &ToolchainConfig::default()).unwrap();

    assert_eq!(command.program, "python3");
    assert_eq!(command.args[0], "-u");
    assert_eq!(command.args[1], workspace.source_path().to_string_lossy());
}

#[tokio::test]
async fn test_release_kills_descendants_of_exited_program() {
    let scratch = TempDir::new().unwrap();
    let workspace = script_workspace(&scratch, "");
    let session = TerminalSession::launch(
        &workspace,
        &sh("sleep 60 & echo $!"),
        &PtyConfig::default(),
        CHUNK,
    )
    .unwrap();
    let (mut reader, _control) = session.split();

    // The background sleep keeps the terminal open, so wait for the line
    // and the leader's exit instead of end of stream
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut bytes = Vec::new();
    while !bytes.contains(&b'\n') && Instant::now() < deadline {
        if let ReadEvent::Data(chunk) = reader.read_with_timeout(Duration::from_millis(50)).await {
            bytes.extend(chunk);
        }
    }
    let straggler: u32 = String::from_utf8_lossy(&bytes).trim().parse().expect("pid printed");
    while Instant::now() < deadline && !matches!(reader.try_wait(), Ok(Some(_))) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(reader.release().is_some());

    tokio::time::sleep(Duration::from_millis(300)).await;
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", straggler));
    let running = stat.map(|s| !s.contains(") Z ")).unwrap_or(false);
    assert!(!running, "background pid {} survived release", straggler);
}
