// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Compiler — lowers a [`Rule`] forest into the binary automaton format.
//!
//! The compiler is a pure function of its input: it interns every key,
//! value, and command byte string exactly once (first-occurrence order),
//! flattens the nested rule structure depth-first into indexed arenas, and
//! serialises the arenas into the layout described in [`crate::blob`].
//! Identical input documents produce byte-identical blobs; nothing in the
//! pipeline iterates a hash map while emitting output.
//!
//! # Examples
//!
//! ```rust
//! use reflex_core::compile::compile_json;
//!
//! let blob = compile_json(
//!     r#"[ { "when": { "foo": "baz" }, "run": [ "m2" ] } ]"#,
//! ).unwrap();
//! assert_eq!(&blob[0..4], b"RFXA");
//! ```

use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;

use crate::blob::{push_u32, CMD_ENTRY, HEADER_LEN, MAGIC, NONE, RULE_ENTRY, SET_ENTRY, STRING_ENTRY, VERSION};
use crate::model::Rule;

// ---------------------------------------------------------------------------
// CompileError
// ---------------------------------------------------------------------------

/// Errors surfaced by [`compile`] and [`compile_json`].
///
/// Compilation aborts on the first error; no partially-valid blob is ever
/// produced.
#[derive(Debug)]
pub enum CompileError {
    /// The JSON rule document could not be parsed into the rule tree model.
    Document(serde_json::Error),
    /// An arena outgrew `u32` addressing (strings, rule sets, rules, or
    /// command slots), or the finished blob would exceed a `u32` length.
    CapacityExceeded { what: &'static str },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Document(source) =>
                write!(f, "malformed rule document: {source}"),
            CompileError::CapacityExceeded { what } =>
                write!(f, "rule document too large: {what} exceed u32 addressing"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Document(source) => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Compiler
// ---------------------------------------------------------------------------

/// Flattened rule entry, mirroring the on-disk rule table record.
struct RuleSlot {
    key: u32,
    value: u32,
    cmd_start: u32,
    cmd_count: u32,
    nested: u32,
}

/// Arena builder: interned strings plus the flattened set/rule/command
/// tables, filled by a depth-first walk of the rule tree.
#[derive(Default)]
struct Compiler {
    strings: Vec<Vec<u8>>,
    interned: HashMap<Vec<u8>, u32>,
    sets: Vec<(u32, u32)>,
    rules: Vec<RuleSlot>,
    cmds: Vec<u32>,
}

impl Compiler {
    /// Intern `bytes`, returning the existing index on byte-for-byte equality.
    fn intern(&mut self, bytes: &[u8]) -> Result<u32, CompileError> {
        if let Some(&ix) = self.interned.get(bytes) {
            return Ok(ix);
        }
        let ix = index_of("strings", self.strings.len())?;
        self.strings.push(bytes.to_vec());
        self.interned.insert(bytes.to_vec(), ix);
        Ok(ix)
    }

    /// Lower one rule set and, recursively, everything nested beneath it.
    /// Returns the set's arena index.
    ///
    /// The set's own rule slots are allocated contiguously before any child
    /// set is visited, so `(first_rule, rule_count)` ranges never interleave.
    fn lower_set(&mut self, rules: &[Rule]) -> Result<u32, CompileError> {
        let set_ix = index_of("rule sets", self.sets.len())?;
        self.sets.push((0, 0));

        let first = index_of("rules", self.rules.len())?;
        for rule in rules {
            let (key, value) = match &rule.condition {
                Some((key, value)) => (self.intern(key)?, self.intern(value)?),
                None => (NONE, NONE),
            };
            let cmd_start = index_of("command slots", self.cmds.len())?;
            for command in &rule.commands {
                let ix = self.intern(command)?;
                self.cmds.push(ix);
            }
            self.rules.push(RuleSlot {
                key,
                value,
                cmd_start,
                cmd_count: rule.commands.len() as u32,
                nested: NONE,
            });
        }
        self.sets[set_ix as usize] = (first, rules.len() as u32);

        // Children last: the parent's slots already exist, so nested indices
        // can be patched in as each child set is lowered.
        for (slot, rule) in rules.iter().enumerate() {
            if !rule.nested.is_empty() {
                let child = self.lower_set(&rule.nested)?;
                self.rules[first as usize + slot].nested = child;
            }
        }
        Ok(set_ix)
    }

    /// Serialise the arenas into the final blob.
    fn emit(self, root: u32) -> Result<Vec<u8>, CompileError> {
        let string_bytes: usize = self.strings.iter().map(Vec::len).sum();
        let strings_off = HEADER_LEN;
        let sets_off = strings_off + self.strings.len() * STRING_ENTRY + string_bytes;
        let rules_off = sets_off + self.sets.len() * SET_ENTRY;
        let cmds_off = rules_off + self.rules.len() * RULE_ENTRY;
        let total = cmds_off + self.cmds.len() * CMD_ENTRY;
        let blob_len = offset_of("blob length", total)?;

        let mut blob = Vec::with_capacity(total);
        blob.extend_from_slice(&MAGIC);
        push_u32(&mut blob, VERSION);
        push_u32(&mut blob, blob_len);
        push_u32(&mut blob, self.strings.len() as u32);
        push_u32(&mut blob, offset_of("string table", strings_off)?);
        push_u32(&mut blob, self.sets.len() as u32);
        push_u32(&mut blob, offset_of("rule-set table", sets_off)?);
        push_u32(&mut blob, self.rules.len() as u32);
        push_u32(&mut blob, offset_of("rule table", rules_off)?);
        push_u32(&mut blob, self.cmds.len() as u32);
        push_u32(&mut blob, offset_of("command area", cmds_off)?);
        push_u32(&mut blob, root);

        // String entries, then the raw bytes they point at.
        let mut cursor = strings_off + self.strings.len() * STRING_ENTRY;
        for string in &self.strings {
            push_u32(&mut blob, offset_of("string payload", cursor)?);
            push_u32(&mut blob, offset_of("string length", string.len())?);
            cursor += string.len();
        }
        for string in &self.strings {
            blob.extend_from_slice(string);
        }

        for &(first, count) in &self.sets {
            push_u32(&mut blob, first);
            push_u32(&mut blob, count);
        }
        for rule in &self.rules {
            push_u32(&mut blob, rule.key);
            push_u32(&mut blob, rule.value);
            push_u32(&mut blob, rule.cmd_start);
            push_u32(&mut blob, rule.cmd_count);
            push_u32(&mut blob, rule.nested);
        }
        for &cmd in &self.cmds {
            push_u32(&mut blob, cmd);
        }

        debug_assert_eq!(blob.len(), total);
        Ok(blob)
    }
}

/// Convert an arena position to a `u32` index, keeping [`NONE`] reserved.
fn index_of(what: &'static str, position: usize) -> Result<u32, CompileError> {
    match u32::try_from(position) {
        Ok(ix) if ix != NONE => Ok(ix),
        _ => Err(CompileError::CapacityExceeded { what }),
    }
}

/// Convert a byte offset or length to `u32`.
fn offset_of(what: &'static str, value: usize) -> Result<u32, CompileError> {
    u32::try_from(value).map_err(|_| CompileError::CapacityExceeded { what })
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Compile a rule forest into a binary automaton blob.
///
/// Deterministic: the same input always yields a byte-identical blob.
///
/// # Errors
///
/// Returns a [`CompileError`] if any arena outgrows `u32` addressing.
pub fn compile(rules: &[Rule]) -> Result<Vec<u8>, CompileError> {
    let mut compiler = Compiler::default();
    let root = compiler.lower_set(rules)?;
    compiler.emit(root)
}

/// Parse a JSON rule document and compile it in one step.
///
/// # Errors
///
/// Returns [`CompileError::Document`] for a malformed document — invalid
/// JSON, duplicate or unknown fields, or a `when` that is not a single
/// string-valued entry — and never produces a partial blob.
pub fn compile_json(document: &str) -> Result<Vec<u8>, CompileError> {
    let rules: Vec<Rule> = serde_json::from_str(document).map_err(CompileError::Document)?;
    compile(&rules)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
