use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use heapbridge::worker::{FinalResult, FrameReader, StartupPayload, WorkerFlags, WorkerMessage};

#[derive(Parser)]
#[command(name = "heapbridge")]
#[command(about = "Inspect heapbridge worker traffic", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a recorded worker message stream
    Decode {
        /// File of length-prefixed frames
        file: PathBuf,

        /// Print one JSON object per message
        #[arg(long)]
        json: bool,
    },
    /// Write a worker startup payload
    Payload {
        /// Working directory the script runs in
        #[arg(long, default_value = "/")]
        cwd: PathBuf,

        /// Comma or space separated flags (single-step-mode, interactive-mode)
        #[arg(long, default_value = "")]
        flags: String,

        /// Script path or source text
        #[arg(long)]
        script: String,

        /// Output file
        #[arg(short = 'o', long)]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Decode { file, json } => match decode_file(&file, json) {
            Ok(0) => {}
            Ok(malformed) => {
                eprintln!("{} malformed message(s)", malformed);
                return ExitCode::FAILURE;
            }
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        Commands::Payload {
            cwd,
            flags,
            script,
            output,
        } => {
            let payload = StartupPayload::new(cwd, WorkerFlags::parse(&flags), script);
            let bytes = match payload.encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    eprintln!("error: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            if let Err(e) = std::fs::write(&output, bytes) {
                eprintln!("error: {}: {}", output.display(), e);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

/// Print every frame of `path`. Returns the number of frames that did not
/// decode as worker messages.
fn decode_file(path: &Path, json: bool) -> Result<usize, String> {
    let file = File::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let mut malformed = 0;
    for (index, frame) in FrameReader::new(BufReader::new(file)).enumerate() {
        let frame = frame.map_err(|e| format!("frame {}: {}", index, e))?;
        match WorkerMessage::decode(&frame) {
            Ok(message) if json => println!("{}", message_json(&message)),
            Ok(message) => println!("{}", describe(&message)),
            Err(e) => {
                eprintln!("frame {}: {}", index, e);
                malformed += 1;
            }
        }
    }
    Ok(malformed)
}

fn describe(message: &WorkerMessage) -> String {
    let tag = message.tag() as char;
    match message {
        WorkerMessage::Result(result) => format!("{} {}", tag, result),
        WorkerMessage::Stdout(line) | WorkerMessage::Stderr(line) => format!("{} {:?}", tag, line),
        WorkerMessage::FsSynced => tag.to_string(),
        WorkerMessage::Debugger(event) => format!(
            "{} {}:{} in {} (offset {}, opcode {})",
            tag, event.file, event.line, event.function, event.offset, event.opcode
        ),
        WorkerMessage::Input(prompt) => format!("{} {:?}", tag, prompt),
    }
}

fn message_json(message: &WorkerMessage) -> serde_json::Value {
    use serde_json::json;

    match message {
        WorkerMessage::Result(FinalResult::Str(s)) => json!({"type": "result", "value": s}),
        WorkerMessage::Result(FinalResult::Int(n)) => json!({"type": "result", "value": n}),
        WorkerMessage::Result(FinalResult::None) => json!({"type": "result", "value": null}),
        WorkerMessage::Stdout(line) => json!({"type": "stdout", "text": line}),
        WorkerMessage::Stderr(line) => json!({"type": "stderr", "text": line}),
        WorkerMessage::FsSynced => json!({"type": "fs-synced"}),
        WorkerMessage::Debugger(event) => json!({"type": "debugger", "event": event}),
        WorkerMessage::Input(prompt) => json!({"type": "input", "prompt": prompt}),
    }
}
