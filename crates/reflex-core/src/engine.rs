// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Runtime engine — executes a loaded automaton against a live key/value
//! store.
//!
//! ## State
//!
//! * **Config store** — `key → value` bytes, last-write-wins. Authoritative:
//!   every [`Engine::set`] writes it, whether or not any rule matches.
//! * **Active rule index** — for each key, the rule set currently reachable
//!   for that key. Initially the root set; a matched rule with a nested set
//!   re-points the keys that set conditions on.
//! * **Command callback** — supplied at construction, invoked synchronously
//!   and in-line, once per emitted command, in declaration order.
//!
//! ## Scoping semantics
//!
//! Activating a nested set from a rule conditioned on key `K`:
//!
//! 1. Activations previously owned by `K` are retired first, so a later
//!    match on `K` with a different value shadows the whole earlier branch.
//!    Retirement happens once per `set` call — sibling rules matched by the
//!    same call fan out and compose instead of shadowing each other.
//! 2. The set's rules are walked in declaration order: unconditional rules
//!    fire immediately (their own nested sets activate in turn);
//!    conditional rules install the set as active for their key, replacing
//!    any prior activation for that exact key. Conditional children are not
//!    pre-activated — they wait for their own key to be set.
//!
//! Rule sets rooted at other keys are never disturbed: independent-key
//! scopes compose, same-key scopes shadow.
//!
//! ## Threading
//!
//! Single-threaded, synchronous, non-blocking. The [`Automaton`] is
//! immutable and may be shared across engines via `Arc`; the store and the
//! active index belong to one engine instance. Concurrent access to a
//! single instance requires external synchronisation.

use alloc::sync::Arc;
use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::blob::{Automaton, LoadError, NONE};

/// One entry of the active rule index.
#[derive(Debug, Clone, Copy)]
struct Activation {
    /// Rule-set arena index now reachable for the key.
    set: u32,
    /// String index of the conditioning key whose match installed this
    /// entry, or [`NONE`] for entries installed by the root walk.
    owner: u32,
}

/// A reactive configuration automaton instance.
///
/// Generic over the command callback so hosts pay no dispatch cost; use
/// `Engine<Box<dyn FnMut(&[u8])>>` when a trait object is more convenient.
///
/// # Examples
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use std::sync::Arc;
/// use reflex_core::{blob::Automaton, compile::compile_json, engine::Engine};
///
/// let blob = compile_json(
///     r#"[ { "when": { "foo": "baz" }, "run": [ "m2" ],
///           "then": [ { "run": [ "m3", "m4" ] } ] } ]"#,
/// ).unwrap();
/// let automaton = Arc::new(Automaton::parse(blob).unwrap());
///
/// let emitted = Rc::new(RefCell::new(Vec::new()));
/// let sink = Rc::clone(&emitted);
/// let mut engine = Engine::new(automaton, move |cmd: &[u8]| {
///     sink.borrow_mut().push(cmd.to_vec());
/// });
///
/// engine.set(b"foo", b"baz");
/// assert_eq!(engine.get(b"foo"), Some(&b"baz"[..]));
/// assert_eq!(*emitted.borrow(), vec![b"m2".to_vec(), b"m3".to_vec(), b"m4".to_vec()]);
/// ```
pub struct Engine<F: FnMut(&[u8])> {
    automaton: Arc<Automaton>,
    store: HashMap<Vec<u8>, Vec<u8>>,
    active: HashMap<u32, Activation>,
    on_command: F,
}

impl<F: FnMut(&[u8])> Engine<F> {
    /// Construct an engine over a shared automaton.
    ///
    /// The root rule set is activated immediately: its unconditional rules
    /// fire (in declaration order) before `new` returns.
    pub fn new(automaton: Arc<Automaton>, on_command: F) -> Self {
        let mut engine = Engine {
            automaton: Arc::clone(&automaton),
            store: HashMap::new(),
            active: HashMap::new(),
            on_command,
        };
        let root = automaton.root();
        engine.enter(&automaton, NONE, root);
        engine
    }

    /// Validate a raw blob and construct an engine over it in one step.
    ///
    /// # Errors
    ///
    /// Returns the [`LoadError`] from [`Automaton::parse`]; no engine exists
    /// on failure.
    pub fn load(blob: Vec<u8>, on_command: F) -> Result<Self, LoadError> {
        Ok(Engine::new(Arc::new(Automaton::parse(blob)?), on_command))
    }

    /// The automaton this engine executes, for sharing with more instances.
    pub fn automaton(&self) -> &Arc<Automaton> {
        &self.automaton
    }

    /// Look up `key` in the config store. Pure; no rule evaluation.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.store.get(key).map(Vec::as_slice)
    }

    /// Assign `key → value` and fire every currently-reachable matching rule.
    ///
    /// The store write is unconditional. Matching rules (all of them — a
    /// duplicate `(key, value)` condition fans out rather than
    /// first-match-wins) emit their commands to the callback in declaration
    /// order, then activate their nested sets. A `set` that matches nothing
    /// is silent but the write still happened.
    ///
    /// Never fails and never blocks. If the host's callback feeds commands
    /// back into `set`, that recursion is the host's to bound — the engine
    /// imposes no depth guard.
    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        self.store.insert(key.to_vec(), value.to_vec());

        let automaton = Arc::clone(&self.automaton);
        // A key or value absent from the string table cannot appear in any
        // condition, so interning doubles as the match fast path.
        let Some(key_ix) = automaton.find(key) else { return };
        let Some(value_ix) = automaton.find(value) else { return };

        let set_ix = match self.active.get(&key_ix) {
            Some(activation) => activation.set,
            None => automaton.root(),
        };

        let (first, count) = automaton.set_rules(set_ix);
        let mut retired = false;
        for ix in first..first + count {
            let rule = automaton.rule(ix);
            if rule.key != key_ix || rule.value != value_ix {
                continue;
            }
            for command in automaton.commands(rule) {
                (self.on_command)(command);
            }
            if rule.nested != NONE {
                if !retired {
                    self.retire_children(key_ix);
                    retired = true;
                }
                self.enter(&automaton, key_ix, rule.nested);
            }
        }
    }

    /// Activate rule set `set`: fire its unconditional rules and install it
    /// as the active set for every key it conditions on.
    fn enter(&mut self, automaton: &Arc<Automaton>, owner: u32, set: u32) {
        let (first, count) = automaton.set_rules(set);
        for ix in first..first + count {
            let rule = automaton.rule(ix);
            if rule.key == NONE {
                for command in automaton.commands(rule) {
                    (self.on_command)(command);
                }
                if rule.nested != NONE {
                    self.enter(automaton, owner, rule.nested);
                }
            } else {
                self.active.insert(rule.key, Activation { set, owner });
            }
        }
    }

    /// Drop every activation installed by an earlier match on `owner`.
    fn retire_children(&mut self, owner: u32) {
        self.active.retain(|_, activation| activation.owner != owner);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile_json;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<Vec<u8>>>>;

    fn engine_for(doc: &str) -> (Engine<impl FnMut(&[u8])>, Log) {
        let automaton = Arc::new(Automaton::parse(compile_json(doc).unwrap()).unwrap());
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let engine = Engine::new(automaton, move |cmd: &[u8]| {
            sink.borrow_mut().push(cmd.to_vec());
        });
        (engine, log)
    }

    fn drain(log: &Log) -> Vec<Vec<u8>> {
        log.borrow_mut().drain(..).collect()
    }

    #[test]
    fn test_store_round_trip_without_rules() {
        let (mut engine, log) = engine_for("[]");
        engine.set(b"some_key", b"some_value");
        assert_eq!(engine.get(b"some_key"), Some(&b"some_value"[..]));
        assert!(drain(&log).is_empty());
    }

    #[test]
    fn test_overwrite_is_last_write_wins() {
        let (mut engine, _log) = engine_for("[]");
        engine.set(b"k", b"v1");
        engine.set(b"k", b"v2");
        assert_eq!(engine.get(b"k"), Some(&b"v2"[..]));
    }

    #[test]
    fn test_absent_key_is_none() {
        let (engine, _log) = engine_for("[]");
        assert_eq!(engine.get(b"never_set"), None);
    }

    #[test]
    fn test_unmatched_value_still_writes_store() {
        let (mut engine, log) = engine_for(r#"[ { "when": { "foo": "bar" }, "run": [ "m1" ] } ]"#);
        engine.set(b"foo", b"other");
        assert_eq!(engine.get(b"foo"), Some(&b"other"[..]));
        assert!(drain(&log).is_empty());
    }

    #[test]
    fn test_immediate_fan_out_through_unconditional_nested_rules() {
        let (mut engine, log) = engine_for(
            r#"[ { "when": { "foo": "baz" }, "run": [ "m2" ],
                  "then": [ { "run": [ "m3", "m4" ] } ] } ]"#,
        );
        engine.set(b"foo", b"baz");
        assert_eq!(drain(&log), vec![b"m2".to_vec(), b"m3".to_vec(), b"m4".to_vec()]);
    }

    #[test]
    fn test_duplicate_conditions_all_fire_in_declaration_order() {
        let (mut engine, log) = engine_for(
            r#"[
                { "when": { "k": "v" }, "run": [ "first" ] },
                { "when": { "k": "v" }, "run": [ "second" ] }
            ]"#,
        );
        engine.set(b"k", b"v");
        assert_eq!(drain(&log), vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn test_matched_rules_refire_on_repeat() {
        let (mut engine, log) = engine_for(r#"[ { "when": { "k": "v" }, "run": [ "m" ] } ]"#);
        engine.set(b"k", b"v");
        engine.set(b"k", b"v");
        assert_eq!(drain(&log).len(), 2);
    }

    #[test]
    fn test_root_unconditional_rules_fire_at_construction() {
        let (_engine, log) = engine_for(r#"[ { "run": [ "boot" ] } ]"#);
        assert_eq!(drain(&log), vec![b"boot".to_vec()]);
    }

    #[test]
    fn test_nested_rules_unreachable_until_parent_matches() {
        let doc = r#"[
            { "when": { "foo": "baz" },
              "then": [ { "when": { "qux": "ahoy" }, "run": [ "m4" ] } ] }
        ]"#;
        let (mut engine, log) = engine_for(doc);
        engine.set(b"qux", b"ahoy");
        assert!(drain(&log).is_empty());
        engine.set(b"foo", b"baz");
        engine.set(b"qux", b"ahoy");
        assert_eq!(drain(&log), vec![b"m4".to_vec()]);
    }

    #[test]
    fn test_unconditional_rule_activates_its_nested_set() {
        let doc = r#"[
            { "when": { "k": "v" },
              "then": [ { "run": [ "boot" ],
                          "then": [ { "when": { "p": "x" }, "run": [ "deep" ] } ] } ] }
        ]"#;
        let (mut engine, log) = engine_for(doc);
        engine.set(b"p", b"x");
        assert!(drain(&log).is_empty());
        // Matching "k" fires the unconditional child and, through it,
        // installs the conditional grandchild.
        engine.set(b"k", b"v");
        assert_eq!(drain(&log), vec![b"boot".to_vec()]);
        engine.set(b"p", b"x");
        assert_eq!(drain(&log), vec![b"deep".to_vec()]);
        // The grandchild activation is owned by "k": a re-match retires and
        // reinstalls it, so "p" stays reachable.
        engine.set(b"k", b"v");
        assert_eq!(drain(&log), vec![b"boot".to_vec()]);
        engine.set(b"p", b"x");
        assert_eq!(drain(&log), vec![b"deep".to_vec()]);
    }

    #[test]
    fn test_context_sensitive_activation() {
        let doc = r#"[
            { "when": { "recipe": "pizza" },
              "then": [ { "when": { "process": "dough" }, "run": [ "dry" ] } ] },
            { "when": { "recipe": "dumpling" },
              "then": [ { "when": { "process": "dough" }, "run": [ "wet" ] } ] }
        ]"#;

        let (mut engine, log) = engine_for(doc);
        engine.set(b"recipe", b"pizza");
        engine.set(b"process", b"dough");
        assert_eq!(drain(&log), vec![b"dry".to_vec()]);

        let (mut engine, log) = engine_for(doc);
        engine.set(b"recipe", b"dumpling");
        engine.set(b"process", b"dough");
        assert_eq!(drain(&log), vec![b"wet".to_vec()]);
    }

    #[test]
    fn test_independent_key_scopes_compose() {
        let doc = r#"[
            { "when": { "recipe": "pizza" },
              "then": [
                  { "when": { "process": "dough" },
                    "then": [ { "when": { "step": "knead" }, "run": [ "k" ] } ] },
                  { "when": { "oven": "on" }, "run": [ "heat" ] }
              ] }
        ]"#;
        let (mut engine, log) = engine_for(doc);
        engine.set(b"recipe", b"pizza");
        engine.set(b"process", b"dough");
        // Activating the "step" scope must not retire the sibling "oven" rule.
        engine.set(b"oven", b"on");
        assert_eq!(drain(&log), vec![b"heat".to_vec()]);
        engine.set(b"step", b"knead");
        assert_eq!(drain(&log), vec![b"k".to_vec()]);
    }

    #[test]
    fn test_reactivation_shadows_previous_branch() {
        let doc = r#"[
            { "when": { "k": "v1" },
              "then": [
                  { "when": { "a": "x" }, "run": [ "a-old" ] },
                  { "when": { "b": "x" }, "run": [ "b-old" ] }
              ] },
            { "when": { "k": "v2" },
              "then": [
                  { "when": { "b": "x" }, "run": [ "b-new" ] },
                  { "when": { "c": "x" }, "run": [ "c-new" ] }
              ] }
        ]"#;
        let (mut engine, log) = engine_for(doc);
        engine.set(b"k", b"v1");
        engine.set(b"k", b"v2");
        // "a" was controlled only by the v1 branch; it must be unreachable now.
        engine.set(b"a", b"x");
        assert!(drain(&log).is_empty());
        engine.set(b"b", b"x");
        assert_eq!(drain(&log), vec![b"b-new".to_vec()]);
        engine.set(b"c", b"x");
        assert_eq!(drain(&log), vec![b"c-new".to_vec()]);
    }

    #[test]
    fn test_sibling_fan_out_activations_compose_within_one_set() {
        let doc = r#"[
            { "when": { "k": "v" },
              "then": [ { "when": { "p": "x" }, "run": [ "from-first" ] } ] },
            { "when": { "k": "v" },
              "then": [ { "when": { "q": "x" }, "run": [ "from-second" ] } ] }
        ]"#;
        let (mut engine, log) = engine_for(doc);
        engine.set(b"k", b"v");
        engine.set(b"p", b"x");
        engine.set(b"q", b"x");
        assert_eq!(drain(&log), vec![b"from-first".to_vec(), b"from-second".to_vec()]);
    }

    #[test]
    fn test_engines_share_blob_but_not_state() {
        let automaton = Arc::new(
            Automaton::parse(
                compile_json(r#"[ { "when": { "k": "v" }, "run": [ "m" ] } ]"#).unwrap(),
            )
            .unwrap(),
        );
        let first_log: Log = Rc::new(RefCell::new(Vec::new()));
        let second_log: Log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&first_log);
        let mut first = Engine::new(Arc::clone(&automaton), move |cmd: &[u8]| {
            sink.borrow_mut().push(cmd.to_vec());
        });
        let sink = Rc::clone(&second_log);
        // The accessor hands out the blob for spawning further instances.
        let second = Engine::new(Arc::clone(first.automaton()), move |cmd: &[u8]| {
            sink.borrow_mut().push(cmd.to_vec());
        });
        assert!(Arc::ptr_eq(first.automaton(), second.automaton()));

        first.set(b"k", b"v");
        assert_eq!(first_log.borrow().len(), 1);
        assert!(second_log.borrow().is_empty());
        assert_eq!(first.get(b"k"), Some(&b"v"[..]));
        assert_eq!(second.get(b"k"), None);
    }
}
