//! # opsgate-core
//!
//! The gate-first run pipeline for opsgate.
//!
//! This crate provides:
//! - The trust-boundary traits (`PolicyEngine`, `Transport`, `Verifier`,
//!   `AuditWriter`, plus the read-only `AuditLookup`/`HealthProbe` views)
//! - The `TransportSelector` that routes a request to the primary channel
//!   and, for allowlisted actions, to the fallback channel
//! - The `Executor` that wires them together in the correct trust order
//! - Report mapping, including the suggested `next_cmd`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use opsgate_core::{Executor, selector::{FallbackPolicy, TransportSelector}};
//!
//! let selector = TransportSelector::new(primary, Some(fallback), FallbackPolicy::new(allow, forced));
//! let executor = Executor::new(policy, selector, verifier, audit);
//! let report = executor.run(&plan, "site: up demo6", safety)?;
//! ```

pub mod executor;
pub mod healthcheck;
pub mod report;
pub mod selector;
pub mod traits;

pub use executor::{Executor, DEFAULT_MAX_INLINE_OUTPUT};
pub use healthcheck::PostApplyHealthcheck;
pub use selector::{FallbackPolicy, TransportSelector, DEFAULT_FALLBACK_ALLOWLIST, DEFAULT_FORCED_FALLBACK};
