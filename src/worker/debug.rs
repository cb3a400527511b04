//! Debugger events and directives.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A debugger stop reported by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebuggerEvent {
    /// Instruction offset within the function
    pub offset: u32,
    /// Name of the function being executed
    pub function: String,
    /// Source file of that function
    pub file: String,
    /// 1-based source line
    pub line: u32,
    /// Raw instruction byte
    pub opcode: u8,
}

impl DebuggerEvent {
    /// Build an event, resolving the line from `lines`. Offsets before the
    /// first entry report line 1.
    pub fn at(
        lines: &LineTable,
        offset: u32,
        function: impl Into<String>,
        file: impl Into<String>,
        opcode: u8,
    ) -> Self {
        Self {
            offset,
            function: function.into(),
            file: file.into(),
            line: lines.line_for(offset).unwrap_or(1),
            opcode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineEntry {
    offset: u32,
    line: u32,
}

/// Maps instruction offsets to source lines.
#[derive(Debug, Clone, Default)]
pub struct LineTable {
    /// Sorted by offset
    entries: Vec<LineEntry>,
}

impl LineTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that code from `offset` onwards belongs to `line`.
    pub fn add(&mut self, offset: u32, line: u32) {
        let at = self.entries.partition_point(|e| e.offset <= offset);
        if at > 0 && self.entries[at - 1].offset == offset {
            self.entries[at - 1].line = line;
        } else {
            self.entries.insert(at, LineEntry { offset, line });
        }
    }

    /// Line of the entry with the largest offset not past `offset`.
    pub fn line_for(&self, offset: u32) -> Option<u32> {
        let at = self.entries.partition_point(|e| e.offset <= offset);
        at.checked_sub(1).map(|i| self.entries[i].line)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Controller's answer to a debugger stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Continue,
    Raise,
    Step,
    Quit,
}

/// What the stepper does after a stop that did not quit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Continue,
    /// Stop again at the next instruction
    Step,
    /// Raise an exception at the stop location
    Raise,
}

impl Directive {
    /// Stepper action for this directive; `None` for quit.
    pub fn step_action(self) -> Option<StepAction> {
        match self {
            Directive::Continue => Some(StepAction::Continue),
            Directive::Step => Some(StepAction::Step),
            Directive::Raise => Some(StepAction::Raise),
            Directive::Quit => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Directive::Continue => "continue",
            Directive::Raise => "raise",
            Directive::Step => "step",
            Directive::Quit => "quit",
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Directive {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "continue" | "c" => Ok(Directive::Continue),
            "raise" => Ok(Directive::Raise),
            "step" | "s" => Ok(Directive::Step),
            "quit" | "q" => Ok(Directive::Quit),
            other => Err(format!("unknown directive '{}'", other)),
        }
    }
}
