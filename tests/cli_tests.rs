use std::path::Path;
use std::process::Command;

use heapbridge::worker::{DebuggerEvent, FinalResult, FrameWriter, StartupPayload, WorkerMessage};

fn run_cli(args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_heapbridge"))
        .args(args)
        .output()
        .expect("failed to execute heapbridge");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn write_stream(path: &Path, frames: &[Vec<u8>]) {
    let mut writer = FrameWriter::new(Vec::new());
    for frame in frames {
        writer.write_frame(frame).unwrap();
    }
    std::fs::write(path, writer.into_inner()).unwrap();
}

fn sample_stream() -> Vec<Vec<u8>> {
    vec![
        WorkerMessage::Stdout("hello".to_string()).encode(),
        WorkerMessage::Debugger(DebuggerEvent {
            offset: 4,
            function: "main".to_string(),
            file: "main.py".to_string(),
            line: 2,
            opcode: 83,
        })
        .encode(),
        WorkerMessage::FsSynced.encode(),
        WorkerMessage::Result(FinalResult::Int(42)).encode(),
    ]
}

#[test]
fn test_decode_human() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stream.bin");
    write_stream(&path, &sample_stream());

    let (stdout, stderr, success) = run_cli(&["decode", path.to_str().unwrap()]);
    assert!(success, "stderr:\n{}", stderr);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            "O \"hello\"",
            "d main.py:2 in main (offset 4, opcode 83)",
            "F",
            "x 42",
        ]
    );
}

#[test]
fn test_decode_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stream.bin");
    write_stream(&path, &sample_stream());

    let (stdout, stderr, success) = run_cli(&["decode", "--json", path.to_str().unwrap()]);
    assert!(success, "stderr:\n{}", stderr);
    let values: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(values.len(), 4);
    assert_eq!(values[0]["type"], "stdout");
    assert_eq!(values[0]["text"], "hello");
    assert_eq!(values[1]["event"]["line"], 2);
    assert_eq!(values[3]["value"], 42);
}

#[test]
fn test_decode_reports_malformed_frames() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stream.bin");
    write_stream(
        &path,
        &[b"Zbogus".to_vec(), WorkerMessage::Result(FinalResult::None).encode()],
    );

    let (stdout, stderr, success) = run_cli(&["decode", path.to_str().unwrap()]);
    assert!(!success);
    assert_eq!(stdout.trim(), "x None");
    assert!(stderr.contains("frame 0"), "stderr:\n{}", stderr);
    assert!(stderr.contains("1 malformed message(s)"));
}

#[test]
fn test_decode_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.bin");
    let (_, stderr, success) = run_cli(&["decode", path.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.starts_with("error:"));
}

#[test]
fn test_payload_written() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("payload.bin");
    let (_, stderr, success) = run_cli(&[
        "payload",
        "--cwd",
        "/srv/app",
        "--flags",
        "interactive-mode",
        "--script",
        "main.py",
        "-o",
        output.to_str().unwrap(),
    ]);
    assert!(success, "stderr:\n{}", stderr);

    let bytes = std::fs::read(&output).unwrap();
    assert_eq!(bytes, b"/srv/app\0interactive-mode\0main.py");
    let payload = StartupPayload::decode(&bytes).unwrap();
    assert!(payload.flags.interactive);
    assert!(!payload.flags.single_step);
}
