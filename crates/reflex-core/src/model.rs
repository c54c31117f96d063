// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Rule tree model — the in-memory representation of a declarative rule
//! document, existing only between parsing and compilation.
//!
//! A rule document is a JSON array of rule objects:
//!
//! ```json
//! [
//!   {
//!     "when": { "recipe": "pizza" },
//!     "run":  [ "set bake_temperature 200" ],
//!     "then": [
//!       { "when": { "process": "dough" }, "run": [ "set dough_type dry" ] }
//!     ]
//!   }
//! ]
//! ```
//!
//! * `when` — optional; an object with **exactly one** string-valued entry.
//!   A rule without `when` is unconditional: its commands fire the moment the
//!   rule set containing it is activated.
//! * `run` — optional ordered list of command strings, delivered verbatim
//!   (as bytes) to the host callback when the rule fires.
//! * `then` — optional nested rule document, reachable only after this rule
//!   has matched.
//!
//! The array form deliberately permits several rules with the same
//! `(key, value)` condition; all of them fire, in declaration order.
//!
//! [`Rule`] implements [`serde::Deserialize`] through a hand-written map
//! visitor so that malformed documents are rejected with field-level
//! messages (duplicate fields, unknown fields, a `when` that is not a
//! single-entry string map) instead of a generic type error.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use serde::de::{Deserialize, Deserializer, Error, MapAccess, Visitor};
use serde_json::Value;

/// A single conditional rule: an optional `(key, value)` condition, an
/// ordered command list, and an optional nested rule set.
///
/// # Examples
///
/// ```rust
/// use reflex_core::model::Rule;
///
/// let rules: Vec<Rule> = serde_json::from_str(
///     r#"[ { "when": { "foo": "baz" }, "run": [ "m2" ] } ]"#,
/// ).unwrap();
///
/// assert_eq!(rules[0].condition.as_ref().unwrap().0, b"foo");
/// assert_eq!(rules[0].commands, vec![b"m2".to_vec()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// `(key, value)` the rule matches on, or `None` for an unconditional
    /// rule that fires when its rule set is activated.
    pub condition: Option<(Vec<u8>, Vec<u8>)>,
    /// Commands emitted, in declaration order, when the rule fires.
    /// Opaque byte strings; the engine never interprets them.
    pub commands: Vec<Vec<u8>>,
    /// Rules that become reachable only once this rule has matched.
    pub nested: Vec<Rule>,
}

impl Rule {
    /// Construct a conditional rule without commands or nested rules.
    pub fn when(key: &[u8], value: &[u8]) -> Self {
        Rule {
            condition: Some((key.to_vec(), value.to_vec())),
            commands: Vec::new(),
            nested: Vec::new(),
        }
    }

    /// Construct an unconditional rule carrying only commands.
    pub fn always<I: IntoIterator<Item = Vec<u8>>>(commands: I) -> Self {
        Rule {
            condition: None,
            commands: commands.into_iter().collect(),
            nested: Vec::new(),
        }
    }

    /// Append a command. Builder-style, used mainly by tests and benches.
    pub fn run(mut self, command: &[u8]) -> Self {
        self.commands.push(command.to_vec());
        self
    }

    /// Attach a nested rule. Builder-style.
    pub fn then(mut self, rule: Rule) -> Self {
        self.nested.push(rule);
        self
    }
}

/// The decoded `when` field: exactly one `key: value` string entry.
///
/// Deserialized through its own map visitor rather than via
/// `serde_json::Value`, so a second entry — including a duplicate of the
/// first key, which `Value`'s map would silently collapse last-wins — is a
/// hard error.
struct When {
    key: String,
    value: String,
}

struct WhenVisitor;

impl<'de> Visitor<'de> for WhenVisitor {
    type Value = When;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("\"when\" must be an object of one key-value pair")
    }

    fn visit_map<V>(self, mut map: V) -> Result<Self::Value, V::Error>
    where
        V: MapAccess<'de>,
    {
        let Some(key) = map.next_key::<String>()? else {
            return Err(Error::custom(
                "\"when\" must contain exactly one key; split multi-key conditions into separate rules",
            ));
        };
        let value = match map.next_value::<Value>()? {
            Value::String(value) => value,
            _ => return Err(Error::custom("\"when\" values must be strings")),
        };
        if map.next_key::<String>()?.is_some() {
            return Err(Error::custom(
                "\"when\" must contain exactly one key; split multi-key conditions into separate rules",
            ));
        }
        Ok(When { key, value })
    }
}

impl<'de> Deserialize<'de> for When {
    fn deserialize<D>(deserializer: D) -> Result<When, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(WhenVisitor)
    }
}

struct RuleVisitor;

impl<'de> Visitor<'de> for RuleVisitor {
    type Value = Rule;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a rule object with optional \"when\", \"run\", \"then\" fields")
    }

    fn visit_map<V>(self, mut map: V) -> Result<Self::Value, V::Error>
    where
        V: MapAccess<'de>,
    {
        let mut when: Option<When> = None;
        let mut run: Option<Vec<String>> = None;
        let mut then: Option<Vec<Rule>> = None;
        let mut seen_when = false;

        while let Some(field) = map.next_key::<String>()? {
            match field.as_str() {
                "when" => {
                    if seen_when {
                        return Err(Error::duplicate_field("when"));
                    }
                    seen_when = true;
                    when = Some(map.next_value()?);
                }
                "run" => {
                    if run.is_some() {
                        return Err(Error::duplicate_field("run"));
                    }
                    run = Some(map.next_value()?);
                }
                "then" => {
                    if then.is_some() {
                        return Err(Error::duplicate_field("then"));
                    }
                    then = Some(map.next_value()?);
                }
                other => {
                    return Err(Error::unknown_field(other, &["when", "run", "then"]));
                }
            }
        }

        Ok(Rule {
            condition: when.map(|when| (when.key.into_bytes(), when.value.into_bytes())),
            commands: run
                .unwrap_or_default()
                .into_iter()
                .map(String::into_bytes)
                .collect(),
            nested: then.unwrap_or_default(),
        })
    }
}

impl<'de> Deserialize<'de> for Rule {
    fn deserialize<D>(deserializer: D) -> Result<Rule, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(RuleVisitor)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
