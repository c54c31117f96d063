// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Binary automaton format — the compact, immutable representation produced
//! by the compiler and consumed by the runtime engine.
//!
//! ## Layout (little-endian, version 1)
//!
//! ```text
//! offset  field
//! 0       magic "RFXA"
//! 4       format version (u32)
//! 8       total blob length (u32)
//! 12..20  string table   (count u32, offset u32)
//! 20..28  rule-set table (count u32, offset u32)
//! 28..36  rule table     (count u32, offset u32)
//! 36..44  command area   (count u32, offset u32)
//! 44      root rule-set index (u32)
//! ```
//!
//! * **String table** — `count × (offset u32, len u32)` entries followed by
//!   the raw bytes. Retrieval by index is O(1) and returns a slice into the
//!   blob, so comparison against runtime byte strings never copies.
//! * **Rule-set table** — `count × (first_rule u32, rule_count u32)`.
//!   Rule sets are addressed by index; a parent rule refers to its nested
//!   set with a single `u32`.
//! * **Rule table** — `count × (key u32, value u32, cmd_start u32,
//!   cmd_count u32, nested u32)`. `key == u32::MAX` marks an unconditional
//!   rule; `nested == u32::MAX` marks "no nested set".
//! * **Command area** — flat `u32` string-table indices; each rule's command
//!   list is the range `cmd_start .. cmd_start + cmd_count`.
//!
//! [`Automaton::parse`] performs a single linear validation pass over the
//! tables — there is no recursive deserialization of the nested structure.
//! Nested rule sets are dereferenced lazily, at activation time, by
//! following the stored index.

use alloc::vec::Vec;
use core::fmt;

/// Magic bytes at offset 0 of every blob.
pub const MAGIC: [u8; 4] = *b"RFXA";

/// Current (and only) format version.
pub const VERSION: u32 = 1;

/// Sentinel index: "no string" (unconditional rule) / "no nested set".
pub(crate) const NONE: u32 = u32::MAX;

/// Header length in bytes.
pub(crate) const HEADER_LEN: usize = 48;

pub(crate) const STRING_ENTRY: usize = 8;
pub(crate) const SET_ENTRY: usize = 8;
pub(crate) const RULE_ENTRY: usize = 20;
pub(crate) const CMD_ENTRY: usize = 4;

/// Append a `u32` to a byte buffer in the blob's endianness.
pub(crate) fn push_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

// ---------------------------------------------------------------------------
// LoadError
// ---------------------------------------------------------------------------

/// Errors surfaced by [`Automaton::parse`].
///
/// The automaton is never constructed in a partially-initialized state: any
/// of these aborts the load before the value exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The buffer is shorter than the fixed-size header.
    Truncated { len: usize },
    /// The first four bytes are not the expected magic.
    BadMagic { found: [u8; 4] },
    /// The header declares a format version this build does not read.
    UnsupportedVersion { found: u32, supported: u32 },
    /// The header's recorded blob length disagrees with the buffer length.
    LengthMismatch { header: u32, actual: usize },
    /// A table entry points outside the blob or outside a sibling table.
    Corrupt { section: &'static str, index: usize },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Truncated { len } =>
                write!(f, "blob too short for header: {len} bytes"),
            LoadError::BadMagic { found } =>
                write!(f, "bad magic {found:?}, expected {MAGIC:?}"),
            LoadError::UnsupportedVersion { found, supported } =>
                write!(f, "unsupported format version {found}, this build reads version {supported}"),
            LoadError::LengthMismatch { header, actual } =>
                write!(f, "header records {header} bytes but buffer holds {actual}"),
            LoadError::Corrupt { section, index } =>
                write!(f, "corrupt blob: {section} entry {index} out of bounds"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LoadError {}

// ---------------------------------------------------------------------------
// Automaton
// ---------------------------------------------------------------------------

/// One rule entry, decoded from the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RuleEntry {
    /// String index of the condition key, or [`NONE`] for an unconditional rule.
    pub key: u32,
    /// String index of the condition value ([`NONE`] when `key` is [`NONE`]).
    pub value: u32,
    /// First command slot in the command area.
    pub cmd_start: u32,
    /// Number of commands.
    pub cmd_count: u32,
    /// Nested rule-set index, or [`NONE`].
    pub nested: u32,
}

/// A loaded, validated, immutable automaton blob.
///
/// The value owns its bytes; share it between engine instances by wrapping
/// it in an `Arc` — the runtime engine never mutates it.
///
/// # Examples
///
/// ```rust
/// use reflex_core::{blob::Automaton, compile::compile_json};
///
/// let blob = compile_json(r#"[ { "when": { "foo": "bar" } } ]"#).unwrap();
/// let automaton = Automaton::parse(blob).unwrap();
/// assert_eq!(automaton.root(), 0);
/// ```
pub struct Automaton {
    data: Vec<u8>,
    string_count: usize,
    strings_off: usize,
    set_count: usize,
    sets_off: usize,
    rules_off: usize,
    cmds_off: usize,
    root: u32,
    /// String ids ordered by byte content, for O(log n) zero-copy lookup of
    /// runtime keys and values.
    by_content: Vec<u32>,
}

/// Bounds-checked `u32` read used only during the validation pass.
fn read_u32(data: &[u8], off: usize) -> Option<u32> {
    let bytes = data.get(off..off.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Check that a table of `count` entries of `entry_len` bytes fits at `off`.
fn table_in_bounds(len: usize, off: u32, count: u32, entry_len: usize) -> bool {
    (count as usize)
        .checked_mul(entry_len)
        .and_then(|table| (off as usize).checked_add(table))
        .is_some_and(|end| end <= len)
}

impl Automaton {
    /// Validate and take ownership of a compiled blob.
    ///
    /// The pass is a single linear read: header, then every table entry once.
    /// After it succeeds, all indices stored in the blob are known to be in
    /// bounds, so the runtime accessors can index directly.
    ///
    /// # Errors
    ///
    /// Returns a [`LoadError`] describing the first inconsistency found; no
    /// automaton value exists on failure.
    pub fn parse(data: Vec<u8>) -> Result<Self, LoadError> {
        if data.len() < HEADER_LEN {
            return Err(LoadError::Truncated { len: data.len() });
        }
        let magic = [data[0], data[1], data[2], data[3]];
        if magic != MAGIC {
            return Err(LoadError::BadMagic { found: magic });
        }
        // Every header field is within the first HEADER_LEN bytes, already
        // known to be present.
        let word = |off: usize| read_u32(&data, off).unwrap_or(0);
        let version = word(4);
        if version != VERSION {
            return Err(LoadError::UnsupportedVersion { found: version, supported: VERSION });
        }
        let declared = word(8);
        if declared as usize != data.len() {
            return Err(LoadError::LengthMismatch { header: declared, actual: data.len() });
        }

        let string_count = word(12);
        let strings_off = word(16);
        let set_count = word(20);
        let sets_off = word(24);
        let rule_count = word(28);
        let rules_off = word(32);
        let cmd_count = word(36);
        let cmds_off = word(40);
        let root = word(44);

        let len = data.len();
        if !table_in_bounds(len, strings_off, string_count, STRING_ENTRY) {
            return Err(LoadError::Corrupt { section: "string table", index: 0 });
        }
        if !table_in_bounds(len, sets_off, set_count, SET_ENTRY) {
            return Err(LoadError::Corrupt { section: "rule-set table", index: 0 });
        }
        if !table_in_bounds(len, rules_off, rule_count, RULE_ENTRY) {
            return Err(LoadError::Corrupt { section: "rule table", index: 0 });
        }
        if !table_in_bounds(len, cmds_off, cmd_count, CMD_ENTRY) {
            return Err(LoadError::Corrupt { section: "command area", index: 0 });
        }
        if set_count == 0 || root >= set_count {
            return Err(LoadError::Corrupt { section: "root rule set", index: root as usize });
        }

        // String entries: payload must lie inside the blob.
        for index in 0..string_count as usize {
            let entry = strings_off as usize + index * STRING_ENTRY;
            let off = word(entry) as usize;
            let slen = word(entry + 4) as usize;
            if off.checked_add(slen).map(|end| end > len).unwrap_or(true) {
                return Err(LoadError::Corrupt { section: "string table", index });
            }
        }

        // Rule-set entries: rule ranges must lie inside the rule table.
        for index in 0..set_count as usize {
            let entry = sets_off as usize + index * SET_ENTRY;
            let first = word(entry);
            let count = word(entry + 4);
            if first.checked_add(count).map(|end| end > rule_count).unwrap_or(true) {
                return Err(LoadError::Corrupt { section: "rule-set table", index });
            }
        }

        // Rule entries: string, command, and nested-set indices must resolve.
        for index in 0..rule_count as usize {
            let entry = rules_off as usize + index * RULE_ENTRY;
            let key = word(entry);
            let value = word(entry + 4);
            let cmd_start = word(entry + 8);
            let cmd_len = word(entry + 12);
            let nested = word(entry + 16);
            let condition_ok = match key {
                NONE => value == NONE,
                _ => key < string_count && value < string_count,
            };
            let commands_ok = cmd_start
                .checked_add(cmd_len)
                .map(|end| end <= cmd_count)
                .unwrap_or(false);
            if !condition_ok || !commands_ok || (nested != NONE && nested >= set_count) {
                return Err(LoadError::Corrupt { section: "rule table", index });
            }
        }

        // Command slots: each is a string index.
        for index in 0..cmd_count as usize {
            if word(cmds_off as usize + index * CMD_ENTRY) >= string_count {
                return Err(LoadError::Corrupt { section: "command area", index });
            }
        }

        let mut by_content: Vec<u32> = (0..string_count).collect();
        by_content.sort_unstable_by(|&a, &b| {
            string_at(&data, strings_off as usize, a).cmp(string_at(&data, strings_off as usize, b))
        });

        Ok(Automaton {
            data,
            string_count: string_count as usize,
            strings_off: strings_off as usize,
            set_count: set_count as usize,
            sets_off: sets_off as usize,
            rules_off: rules_off as usize,
            cmds_off: cmds_off as usize,
            root,
            by_content,
        })
    }

    /// Index of the root rule set.
    pub fn root(&self) -> u32 {
        self.root
    }

    /// Number of interned strings.
    pub fn string_count(&self) -> usize {
        self.string_count
    }

    /// Number of rule sets in the arena.
    pub fn set_count(&self) -> usize {
        self.set_count
    }

    /// The interned string with index `ix`, as a slice into the blob.
    pub(crate) fn string(&self, ix: u32) -> &[u8] {
        string_at(&self.data, self.strings_off, ix)
    }

    /// Resolve a runtime byte string to its interned index, if present.
    /// O(log n) with no copying; a miss means no rule can ever refer to it.
    pub(crate) fn find(&self, bytes: &[u8]) -> Option<u32> {
        self.by_content
            .binary_search_by(|&ix| self.string(ix).cmp(bytes))
            .ok()
            .map(|pos| self.by_content[pos])
    }

    fn word(&self, off: usize) -> u32 {
        let b = &self.data[off..off + 4];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    /// Rule-index range `(first, count)` of rule set `set`.
    pub(crate) fn set_rules(&self, set: u32) -> (u32, u32) {
        let entry = self.sets_off + set as usize * SET_ENTRY;
        (self.word(entry), self.word(entry + 4))
    }

    /// Decode rule entry `ix`.
    pub(crate) fn rule(&self, ix: u32) -> RuleEntry {
        let entry = self.rules_off + ix as usize * RULE_ENTRY;
        RuleEntry {
            key: self.word(entry),
            value: self.word(entry + 4),
            cmd_start: self.word(entry + 8),
            cmd_count: self.word(entry + 12),
            nested: self.word(entry + 16),
        }
    }

    /// The command payloads of a rule, in declaration order.
    pub(crate) fn commands(&self, rule: RuleEntry) -> impl Iterator<Item = &[u8]> + '_ {
        let start = rule.cmd_start as usize;
        let end = start + rule.cmd_count as usize;
        (start..end).map(move |slot| {
            let ix = self.word(self.cmds_off + slot * CMD_ENTRY);
            self.string(ix)
        })
    }
}

/// Shared slice accessor so `parse` can sort `by_content` while the
/// `Automaton` is partially borrowed.
fn string_at(data: &[u8], strings_off: usize, ix: u32) -> &[u8] {
    let entry = strings_off + ix as usize * STRING_ENTRY;
    let b = &data[entry..entry + 8];
    let off = u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize;
    let len = u32::from_le_bytes([b[4], b[5], b[6], b[7]]) as usize;
    &data[off..off + len]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
