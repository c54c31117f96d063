// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! # reflex-core
//!
//! Reactive configuration automaton: a declarative rule tree, keyed on
//! `(attribute, value)` pairs, compiled into a compact binary blob and
//! executed at runtime against a live key/value store.
//!
//! This crate is `no_std`-compatible (requires `alloc`).  Enable the `std`
//! feature (on by default) to lift that restriction and gain access to
//! standard-library conveniences.
//!
//! ## Architecture
//!
//! ```text
//! JSON rule document
//!   └── model::Rule          — rule tree, alive only during compilation
//!         └── compile::compile — interning + depth-first flattening
//!               └── blob::Automaton — validated, immutable, Arc-shared
//!                     └── engine::Engine — config store + active rule index
//!                           └── host callback — receives opaque commands
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use reflex_core::{compile::compile_json, engine::Engine};
//!
//! let blob = compile_json(
//!     r#"[ { "when": { "foo": "baz" }, "run": [ "m2" ],
//!           "then": [ { "run": [ "m3", "m4" ] } ] } ]"#,
//! ).unwrap();
//!
//! let emitted = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&emitted);
//! let mut engine = Engine::load(blob, move |cmd: &[u8]| {
//!     sink.borrow_mut().push(cmd.to_vec());
//! }).unwrap();
//!
//! engine.set(b"foo", b"baz");
//! assert_eq!(*emitted.borrow(), vec![b"m2".to_vec(), b"m3".to_vec(), b"m4".to_vec()]);
//! assert_eq!(engine.get(b"foo"), Some(&b"baz"[..]));
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod blob;
pub mod compile;
pub mod engine;
pub mod host;
pub mod model;

// Re-export the most commonly used items at the crate root so consumers can
// write `use reflex_core::Engine;` instead of the fully qualified path.
pub use blob::{Automaton, LoadError};
pub use compile::{compile, compile_json, CompileError};
pub use engine::Engine;
pub use model::Rule;
