//! Configuration resolution and experiment assignment for a Prebid.js wrapper.
//!
//! # Overview
//!
//! For every ad request the serving layer needs to know which wrapper configuration to send to
//! the page: which bidders to call, with which timeout, price granularity, and so on. Publishers
//! author several configs per website, target them at requests with [rules](models::TargetingRule),
//! and run nested A/B tests on top of them.
//!
//! The crate revolves around a [`Resolver`] that turns a [`RequestContext`] into a
//! [`Resolution`]:
//!
//! 1. the winning config is [selected](selector::select) among the website's and the
//!    publisher's configs by targeting rules, falling back to a default config;
//! 2. the request is [bucketed](bucketer::assign) into variants of the live
//!    [experiments](experiments::resolve_experiments) running on that config;
//! 3. publisher defaults, the selected config, and variant overrides are
//!    [merged](merge::merge) into a [`ResolvedConfig`].
//!
//! Resolution is a pure function of an immutable [`Snapshot`] and the request: no state is kept
//! per visitor, and the same inputs always produce the same output. [`resolve()`] exposes it
//! directly for callers that manage their own snapshot and clock.
//!
//! A [`ServeLogger`] should be provided to persist serve events, facilitating tracking of which
//! request received which config and experiment variants.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. Resolution fails only when the experiment tree
//! is inconsistent ([`ConfigError`]). Smaller data problems are recovered deterministically and
//! reported as [`DataIntegrityWarning`]s in the audit trail.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging
//! messages under the `prebid` target. Consider integrating a `log`-compatible logger
//! implementation for better visibility into resolution.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

pub mod bucketer;
mod config;
mod configuration_store;
mod context;
mod error;
mod events;
pub mod experiments;
pub mod merge;
pub mod models;
mod resolve;
mod resolver;
pub mod selector;
mod sharder;
mod snapshot;
mod targeting;

pub use config::ResolverConfig;
pub use configuration_store::ConfigurationStore;
pub use context::{AttributeValue, Attributes, RequestContext};
pub use error::{ConfigError, DataIntegrityWarning, Error, Result};
pub use events::{ServeEvent, ServeLogger};
pub use merge::{AuditTrail, ExperimentAssignment, ResolvedConfig};
pub use resolve::{resolve, BlockedConfig, Resolution};
pub use resolver::Resolver;
pub use snapshot::Snapshot;
pub use targeting::MalformedCondition;
