// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Host-side command conventions.
//!
//! The engine treats command payloads as opaque bytes; it never inspects
//! them. A widely used *host* convention formats commands as
//! `set <key> <value>` and feeds them back into [`Engine::set`], letting
//! config state drive itself. This module holds the decoding half of that
//! convention so hosts do not re-implement it — it is plumbing around the
//! engine, not engine behavior.
//!
//! Because the callback runs while the engine is borrowed, a host that
//! re-feeds commands queues them first and drains the queue after `set`
//! returns:
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::collections::VecDeque;
//! use std::rc::Rc;
//! use reflex_core::{engine::Engine, host::parse_set_command};
//!
//! # let blob = reflex_core::compile::compile_json(
//! #     r#"[ { "when": { "recipe": "pizza" }, "run": [ "set dough_type dry" ] },
//! #          { "when": { "dough_type": "dry" }, "run": [ "set flour_type 0" ] } ]"#,
//! # ).unwrap();
//! let queue: Rc<RefCell<VecDeque<Vec<u8>>>> = Rc::new(RefCell::new(VecDeque::new()));
//! let sink = Rc::clone(&queue);
//! let mut engine = Engine::load(blob, move |cmd: &[u8]| {
//!     sink.borrow_mut().push_back(cmd.to_vec());
//! }).unwrap();
//!
//! engine.set(b"recipe", b"pizza");
//! loop {
//!     let Some(command) = queue.borrow_mut().pop_front() else { break };
//!     if let Some((key, value)) = parse_set_command(&command) {
//!         engine.set(key, value);
//!     }
//! }
//! assert_eq!(engine.get(b"flour_type"), Some(&b"0"[..]));
//! ```
//!
//! The engine imposes no recursion or iteration guard; a rule graph whose
//! `set` commands form a cycle will spin this loop forever. Bounding the
//! drain (by iteration count or by deduplicating seen assignments) is the
//! host's responsibility.

/// Decode a `set <key> <value>` command payload.
///
/// The key is the first space-delimited token after the `set ` prefix; the
/// value is everything after the following space (it may itself contain
/// spaces, e.g. `set bake_time 10 minutes`). A command with no value part
/// decodes to an empty value. Returns `None` for any payload that does not
/// carry the prefix — such commands belong to some other host convention.
///
/// # Examples
///
/// ```rust
/// use reflex_core::host::parse_set_command;
///
/// assert_eq!(
///     parse_set_command(b"set bake_time 10 minutes"),
///     Some((&b"bake_time"[..], &b"10 minutes"[..])),
/// );
/// assert_eq!(parse_set_command(b"amount flour 350 g"), None);
/// ```
pub fn parse_set_command(command: &[u8]) -> Option<(&[u8], &[u8])> {
    let rest = command.strip_prefix(b"set ")?;
    match rest.iter().position(|&byte| byte == b' ') {
        Some(split) => Some((&rest[..split], &rest[split + 1..])),
        None => Some((rest, &[])),
    }
}
