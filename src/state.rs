//! Per-parse mutable state: the input text, the rule table, the auxiliary
//! stacks with their reversible histories, and the farthest-match cursor.
//!
//! The histories are the authoritative record for backtracking: a
//! checkpoint snapshots only the history lengths, and restoring replays
//! each history tail backwards. The live stacks are a derived view.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use miette::SourceSpan;

use crate::diagnostics::{ErrorKind, GramaryeError, SourceContext};
use crate::rule::Rule;
use crate::tree::Position;

static NEXT_STATE_ID: AtomicU64 = AtomicU64::new(0);

/// The grammar's rule table, shared immutably across a parse.
pub type RuleTable = BTreeMap<String, Rule>;

/// Receives `message(...)` action output. Production parses write to
/// stdout; tests capture into a buffer.
pub trait MessageSink {
    fn emit(&mut self, text: &str);
}

/// Default sink for CLI and library use.
pub struct StdoutSink;

impl MessageSink for StdoutSink {
    fn emit(&mut self, text: &str) {
        println!("{text}");
    }
}

/// Collects messages for inspection in tests.
#[derive(Default)]
pub struct BufferSink {
    pub messages: Vec<String>,
}

impl MessageSink for BufferSink {
    fn emit(&mut self, text: &str) {
        self.messages.push(text.to_string());
    }
}

/// One reversible stack operation, as recorded in a history.
#[derive(Debug, Clone, PartialEq)]
pub enum StackOp {
    Push(String),
    Pop(String),
}

/// Snapshot of every stack history's length. Restoring unwinds each
/// history back to the recorded length; a stack created after the
/// checkpoint was taken unwinds to empty.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    history_lens: BTreeMap<String, usize>,
}

pub struct ParseState<'g> {
    text: &'g str,
    filename: &'g str,
    rules: &'g RuleTable,
    stacks: BTreeMap<String, Vec<String>>,
    histories: BTreeMap<String, Vec<StackOp>>,
    newline_indices: Vec<usize>,
    farthest_match_index: usize,
    tree_id: u64,
    sink: &'g mut dyn MessageSink,
}

impl<'g> ParseState<'g> {
    pub fn new(
        text: &'g str,
        filename: &'g str,
        rules: &'g RuleTable,
        sink: &'g mut dyn MessageSink,
    ) -> Self {
        let newline_indices = text
            .bytes()
            .enumerate()
            .filter(|(_, b)| *b == b'\n')
            .map(|(i, _)| i)
            .collect();
        Self {
            text,
            filename,
            rules,
            stacks: BTreeMap::new(),
            histories: BTreeMap::new(),
            newline_indices,
            farthest_match_index: 0,
            tree_id: NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed) + 1,
            sink,
        }
    }

    pub fn text(&self) -> &'g str {
        self.text
    }

    pub fn filename(&self) -> &'g str {
        self.filename
    }

    pub fn eof(&self, index: usize) -> bool {
        index >= self.text.len()
    }

    /// Byte-indexed slice as text. Slices that land inside a multi-byte
    /// character are recovered lossily; the engine is byte-oriented and
    /// performs no Unicode segmentation.
    pub fn slice(&self, begin: usize, end: usize) -> String {
        let end = end.min(self.text.len());
        let begin = begin.min(end);
        String::from_utf8_lossy(&self.text.as_bytes()[begin..end]).into_owned()
    }

    pub fn starts_with(&self, needle: &str, index: usize) -> bool {
        self.text.as_bytes()[index.min(self.text.len())..].starts_with(needle.as_bytes())
    }

    pub fn get_rule(&self, name: &str) -> Option<&'g Rule> {
        self.rules.get(name)
    }

    // ------------------------------------------------------------------
    // Positions
    // ------------------------------------------------------------------

    /// Line and column for a byte index, via binary search over the
    /// precomputed newline table. Both are 1-based.
    pub fn position_at(&self, index: usize) -> Position {
        let line = self.newline_indices.partition_point(|&n| n < index) + 1;
        let prev_newline = if line >= 2 {
            self.newline_indices[line - 2] as isize
        } else {
            -1
        };
        let column = (index as isize - prev_newline) as usize;
        Position::new(self.tree_id, index, line, column)
    }

    /// `filename:line:column` for diagnostics and action messages.
    pub fn position_string(&self, index: usize) -> String {
        let pos = self.position_at(index);
        format!("{}:{}:{}", self.filename, pos.line, pos.column)
    }

    // ------------------------------------------------------------------
    // Stacks and histories
    // ------------------------------------------------------------------

    /// The `offset`-from-top entry of a stack, or the empty string when the
    /// stack is missing or shorter than `offset`.
    pub fn stack_value(&self, name: &str, offset: usize) -> String {
        match self.stacks.get(name) {
            Some(stack) if offset < stack.len() => stack[stack.len() - offset - 1].clone(),
            _ => String::new(),
        }
    }

    pub fn push_value(&mut self, name: &str, value: String) {
        self.stacks
            .entry(name.to_string())
            .or_default()
            .push(value.clone());
        self.histories
            .entry(name.to_string())
            .or_default()
            .push(StackOp::Push(value));
    }

    pub fn pop_value(&mut self, name: &str, index: usize) -> Result<String, GramaryeError> {
        let stack = self.stacks.entry(name.to_string()).or_default();
        let Some(value) = stack.pop() else {
            return Err(self.error_at(
                ErrorKind::EmptyStackPop {
                    stack: name.to_string(),
                },
                index,
            ));
        };
        self.histories
            .entry(name.to_string())
            .or_default()
            .push(StackOp::Pop(value.clone()));
        Ok(value)
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            history_lens: self
                .histories
                .iter()
                .map(|(name, history)| (name.clone(), history.len()))
                .collect(),
        }
    }

    /// Replays history tails backwards until every history is back at its
    /// checkpointed length. A `Push` is undone by popping the stack; a
    /// `Pop` is undone by pushing the recorded value back.
    pub fn restore(&mut self, checkpoint: &Checkpoint) {
        for (name, history) in self.histories.iter_mut() {
            let target = checkpoint.history_lens.get(name).copied().unwrap_or(0);
            let stack = self.stacks.entry(name.clone()).or_default();
            while history.len() > target {
                match history.pop() {
                    Some(StackOp::Push(_)) => {
                        stack.pop();
                    }
                    Some(StackOp::Pop(value)) => stack.push(value),
                    None => break,
                }
            }
        }
    }

    pub fn stacks_are_empty(&self) -> bool {
        self.stacks.values().all(|stack| stack.is_empty())
    }

    /// Human-readable dump of all non-empty stacks, for the post-condition
    /// failure after a successful parse.
    pub fn stack_dump(&self) -> String {
        let mut out = String::new();
        for (name, stack) in &self.stacks {
            if stack.is_empty() {
                continue;
            }
            out.push_str(&format!("  Stack '{name}':\n"));
            for item in stack {
                out.push_str(&format!("    -> {item} <-\n"));
            }
        }
        out
    }

    /// Snapshot of one stack, top last. Used by tests.
    pub fn stack_contents(&self, name: &str) -> Vec<String> {
        self.stacks.get(name).cloned().unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Farthest-match cursor
    // ------------------------------------------------------------------

    pub fn farthest_match_index(&self) -> usize {
        self.farthest_match_index
    }

    /// Monotonically advances the farthest-match cursor.
    pub fn bump_farthest(&mut self, index: usize) {
        if self.farthest_match_index < index {
            self.farthest_match_index = index;
        }
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    pub fn message(&mut self, text: &str, index: usize) {
        let line = format!("{}: MSG: {}", self.position_string(index), text);
        self.sink.emit(&line);
    }

    /// An error anchored at a byte index of the current input.
    pub fn error_at(&self, kind: ErrorKind, index: usize) -> GramaryeError {
        let source = SourceContext::from_file(self.filename, self.text);
        let end = (index + 1).min(self.text.len()).max(index);
        GramaryeError::new(kind, &source, SourceSpan::from(index..end), "parse")
    }
}
