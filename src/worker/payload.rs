//! Startup payload handed to a worker.
//!
//! Layout: working directory, NUL, flags, NUL, then the script path or
//! source as raw bytes to the end of the buffer.

use std::fmt;
use std::path::PathBuf;

use super::message::WorkerProtocolError;

/// Options recognised in the flags string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerFlags {
    /// `single-step-mode`: break before every instruction
    pub single_step: bool,
    /// `interactive-mode`: the script may request input
    pub interactive: bool,
}

impl WorkerFlags {
    /// Parse a comma or space separated flags string. The `-mode` suffix is
    /// optional. Unknown flags are ignored.
    pub fn parse(s: &str) -> Self {
        let mut flags = Self::default();
        for flag in s.split([',', ' ']).filter(|f| !f.is_empty()) {
            match flag {
                "single-step-mode" | "single-step" => flags.single_step = true,
                "interactive-mode" | "interactive" => flags.interactive = true,
                other => log::warn!("ignoring unknown worker flag '{}'", other),
            }
        }
        flags
    }
}

impl fmt::Display for WorkerFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.single_step {
            names.push("single-step-mode");
        }
        if self.interactive {
            names.push("interactive-mode");
        }
        f.write_str(&names.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupPayload {
    /// Directory the script runs in; must be UTF-8 without NUL bytes
    pub working_dir: PathBuf,
    pub flags: WorkerFlags,
    /// Script path or source text, passed through untouched
    pub script: Vec<u8>,
}

impl StartupPayload {
    pub fn new(working_dir: impl Into<PathBuf>, flags: WorkerFlags, script: impl Into<Vec<u8>>) -> Self {
        Self {
            working_dir: working_dir.into(),
            flags,
            script: script.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, WorkerProtocolError> {
        let dir = self
            .working_dir
            .to_str()
            .ok_or(WorkerProtocolError::NonUtf8Path("working directory"))?;
        if dir.contains('\0') {
            return Err(WorkerProtocolError::EmbeddedNul("working directory"));
        }
        let flags = self.flags.to_string();
        let mut out = Vec::with_capacity(dir.len() + flags.len() + self.script.len() + 2);
        out.extend_from_slice(dir.as_bytes());
        out.push(0);
        out.extend_from_slice(flags.as_bytes());
        out.push(0);
        out.extend_from_slice(&self.script);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WorkerProtocolError> {
        let mut parts = bytes.splitn(3, |&b| b == 0);
        let dir = parts.next().unwrap_or_default();
        let flags = parts
            .next()
            .ok_or(WorkerProtocolError::TruncatedPayload("working directory terminator"))?;
        let script = parts
            .next()
            .ok_or(WorkerProtocolError::TruncatedPayload("flags terminator"))?;
        // Tolerate a C string terminator after the script
        let script = script.strip_suffix(&[0]).unwrap_or(script);
        Ok(Self {
            working_dir: PathBuf::from(std::str::from_utf8(dir)?),
            flags: WorkerFlags::parse(std::str::from_utf8(flags)?),
            script: script.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        assert_eq!(WorkerFlags::parse(""), WorkerFlags::default());
        let flags = WorkerFlags::parse("single-step, interactive");
        assert!(flags.single_step && flags.interactive);
        assert_eq!(flags.to_string(), "single-step-mode,interactive-mode");
        assert_eq!(WorkerFlags::parse("verbose interactive").to_string(), "interactive-mode");
    }

    #[test]
    fn test_layout() {
        let payload = StartupPayload::new(
            "/home/user",
            WorkerFlags {
                single_step: true,
                interactive: false,
            },
            "print(1)",
        );
        let bytes = payload.encode().unwrap();
        assert_eq!(bytes, b"/home/user\0single-step-mode\0print(1)");
        assert_eq!(StartupPayload::decode(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_script_keeps_inner_nuls() {
        let bytes = b"/\0\0a\0b\0";
        let payload = StartupPayload::decode(bytes).unwrap();
        assert_eq!(payload.script, b"a\0b");
        assert_eq!(payload.flags, WorkerFlags::default());
    }

    #[test]
    fn test_truncated() {
        assert!(matches!(
            StartupPayload::decode(b"/tmp"),
            Err(WorkerProtocolError::TruncatedPayload(_))
        ));
        assert!(matches!(
            StartupPayload::decode(b"/tmp\0interactive"),
            Err(WorkerProtocolError::TruncatedPayload(_))
        ));
    }

    #[test]
    fn test_working_dir_must_round_trip() {
        let payload = StartupPayload::new("/tmp\0x", WorkerFlags::default(), "s");
        assert!(matches!(
            payload.encode(),
            Err(WorkerProtocolError::EmbeddedNul("working directory"))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_working_dir_rejected() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = PathBuf::from(OsStr::from_bytes(b"/home/\xff"));
        let payload = StartupPayload::new(dir, WorkerFlags::default(), "s");
        assert!(matches!(
            payload.encode(),
            Err(WorkerProtocolError::NonUtf8Path("working directory"))
        ));
    }
}
