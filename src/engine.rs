//! Settings evaluation engine.
//!
//! This module is the *core* of the crate: it turns a flat list of declarative
//! setting descriptors into a live, self-consistent projection of which
//! settings are visible, what their effective values are, and whether they are
//! in error.
//!
//! ## How the parts work together
//!
//! ```text
//! Payload.sections ──┐
//!                    │  Registry::build                (registry.rs)
//!                    └───────────────┬──────────────
//!                                    │  (type, id) -> SettingId, $parent env
//!                                    v
//!                     Condition::parse                 (condition.rs)
//!                       - `requires` strings
//!                       - contingent_default clauses
//!                                    │
//!                                    v
//!                     SettingsForm                     (form.rs)
//!                       - raw values + widgets
//!                       - cascading resets on write
//!                                    │
//!             ┌──────────────────────┼──────────────────────┐
//!             v                      v                      v
//!   derived reads (graph.rs)   sections.rs            serialize.rs
//!   enabled / computeDefault   notEmpty /             valueToSave ->
//!   visibleValue / visible     reallyCollapse         SaveDocument
//! ```
//!
//! ## Evaluation model
//!
//! Every derived attribute is a pure function of the raw values, the running
//! application version and the viewer's flags. Reads are lazy and memoised
//! per setting; the memo is keyed by a revision counter that every write bumps,
//! so a read after a write never sees stale state.
//!
//! The only side-effecting propagation is the *cascading reset*: when a raw
//! value changes, every setting whose `contingent_default` references it gets
//! its raw value replaced by its freshly computed default. That happens inside
//! the write, before it returns.
//!
//! ## Responsibilities by module
//!
//! - `registry.rs`: builds the flat `(type, id)` index and the `$parent`
//!   environment from section descriptors.
//! - `condition.rs`: parses the `{type.id}='value'||...` micro-language into an
//!   explicit clause list and evaluates it.
//! - `version.rs`: the version gate collaborator and its dotted-version default.
//! - `form.rs`: owns the mutable state and implements writes and cascades.
//! - `graph.rs`: the memoised derived reads.
//! - `sections.rs`, `serialize.rs`: section roll-ups and the save document.
//! - `metrics.rs`: memo and cascade counters.
//!
//! ## Debugging
//!
//! Memo misses and cascade steps are traced at `debug` level; run the CLI with
//! `TRELLIS_LOG=trellis=debug` to see them.

#[path = "engine/condition.rs"]
mod condition;
#[path = "engine/form.rs"]
mod form;
#[path = "engine/graph.rs"]
mod graph;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/registry.rs"]
mod registry;
#[path = "engine/sections.rs"]
mod sections;
#[path = "engine/serialize.rs"]
mod serialize;
#[path = "engine/version.rs"]
mod version;

pub use condition::{Clause, Condition, Reference, ValueSource};
pub use form::SettingsForm;
pub use graph::{HiddenBy, RequiredVersion};
pub use metrics::EvalMetrics;
pub use registry::{ParentEnv, Registry, Section, Setting};
pub use serialize::SaveDocument;
pub use version::{AppVersion, FLOOR_VERSION, VersionGate};
pub(crate) use version::major as version_major;
