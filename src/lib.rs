//! # taskboard
//!
//! A multi-user task board with optimistic concurrency control.
//!
//! Every task carries a `version` that starts at 0 and grows by exactly one
//! per accepted update. Writers must name the version they last saw; the
//! store applies an update only if that version is still current, so
//! concurrent edits never silently overwrite each other.
//!
//! ## Layout
//!
//! - [`domain`]: tasks, projects, users and the partial-update patch type
//! - [`infrastructure`]: repository traits with in-memory and `PostgreSQL`
//!   implementations, the repository factory and demo seed data
//! - [`api`]: the axum router, bearer-token auth and JSON wire types
//! - [`client`]: an HTTP gateway and a controller that caches tasks,
//!   applies edits locally and commits them with version fencing

pub mod api;
pub mod client;
pub mod domain;
pub mod infrastructure;
