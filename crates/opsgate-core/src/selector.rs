//! Transport selection: primary webhook first, allowlisted fallback second.
//!
//! Per request the selector runs a small state machine:
//!
//! ```text
//!   TryPrimary ──ok──> Done
//!     ├─ fail, allowlisted ──> TryFallback ──ok──> Done
//!     │                            └─ fail ──> Fail
//!     └─ fail, not allowlisted ──> Fail
//! ```
//!
//! Forced-fallback actions start at `TryFallback`.
//!
//! A primary failure for an action outside the allowlist is terminal for the
//! step. It is never silently skipped.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use opsgate_contracts::{
    error::{TransportError, TransportErrorKind},
    execution::{AuditOutcome, Channel, DispatchRequest, ExecutionResult},
};

use crate::traits::{Transport, Verifier};

/// Actions that may retry over the fallback channel unless configured otherwise.
pub const DEFAULT_FALLBACK_ALLOWLIST: &[&str] = &[
    "docker_status",
    "healthz",
    "caddy_logs",
    "backup_now",
    "restart_n8n",
    "site_up",
    "site_block",
    "site_unblock",
];

/// Actions that always go over the fallback channel.
pub const DEFAULT_FORCED_FALLBACK: &[&str] = &["restart_n8n"];

/// Which actions may use the fallback channel, and which must.
///
/// Constructed once from configuration and never changed during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackPolicy {
    allowlist: BTreeSet<String>,
    forced: BTreeSet<String>,
}

impl FallbackPolicy {
    /// Build a policy. Forced-fallback actions are implicitly allowlisted.
    pub fn new<A, F>(allowlist: A, forced: F) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        let forced: BTreeSet<String> = forced.into_iter().map(Into::into).collect();
        let mut allowlist: BTreeSet<String> = allowlist.into_iter().map(Into::into).collect();
        allowlist.extend(forced.iter().cloned());
        Self { allowlist, forced }
    }

    /// The default allowlist and forced set.
    pub fn standard() -> Self {
        Self::new(
            DEFAULT_FALLBACK_ALLOWLIST.iter().copied(),
            DEFAULT_FORCED_FALLBACK.iter().copied(),
        )
    }

    /// A policy that never uses the fallback channel.
    pub fn primary_only() -> Self {
        Self::default()
    }

    pub fn allows(&self, action: &str) -> bool {
        self.allowlist.contains(action)
    }

    pub fn is_forced(&self, action: &str) -> bool {
        self.forced.contains(action)
    }
}

/// One attempt on one channel, as recorded in the audit journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub channel: Channel,
    pub outcome: AuditOutcome,
}

/// The outcome of dispatching one request through the selector.
#[derive(Debug)]
pub struct Dispatch {
    pub result: Result<ExecutionResult, TransportError>,
    /// Every channel that was actually contacted, in order.
    pub attempts: Vec<Attempt>,
}

enum Route {
    TryPrimary,
    TryFallback { primary_error: Option<TransportError> },
    Fail(TransportError),
}

pub struct TransportSelector {
    primary: Box<dyn Transport>,
    fallback: Option<Box<dyn Transport>>,
    policy: FallbackPolicy,
}

impl TransportSelector {
    pub fn new(
        primary: Box<dyn Transport>,
        fallback: Option<Box<dyn Transport>>,
        policy: FallbackPolicy,
    ) -> Self {
        Self { primary, fallback, policy }
    }

    pub fn policy(&self) -> &FallbackPolicy {
        &self.policy
    }

    /// Send `request` over the channel the policy selects, retrying once via
    /// fallback when the primary fails and the action is allowlisted.
    pub fn dispatch(&self, request: &DispatchRequest, verifier: &dyn Verifier) -> Dispatch {
        let action = request.params.action.as_str();
        let mut attempts = Vec::new();

        let mut route = if self.policy.is_forced(action) {
            debug!(action, request_id = %request.request_id, "forced-fallback action, skipping primary");
            Route::TryFallback { primary_error: None }
        } else {
            Route::TryPrimary
        };

        loop {
            route = match route {
                Route::TryPrimary => {
                    match attempt(self.primary.as_ref(), request, verifier, &mut attempts) {
                        Ok(result) => return Dispatch { result: Ok(result), attempts },
                        Err(err) if self.policy.allows(action) && self.fallback.is_some() => {
                            warn!(
                                action,
                                request_id = %request.request_id,
                                error = %err,
                                "primary channel failed, retrying via fallback"
                            );
                            Route::TryFallback { primary_error: Some(err) }
                        }
                        Err(err) => {
                            warn!(
                                action,
                                request_id = %request.request_id,
                                error = %err,
                                "primary channel failed and action is not fallback-eligible"
                            );
                            Route::Fail(err)
                        }
                    }
                }

                Route::TryFallback { primary_error } => match self.fallback.as_deref() {
                    None => Route::Fail(TransportError::new(
                        Channel::Fallback,
                        TransportErrorKind::NotConfigured,
                        format!("action '{action}' requires the fallback channel"),
                    )),
                    Some(fallback) => match attempt(fallback, request, verifier, &mut attempts) {
                        Ok(mut result) => {
                            if let Some(primary_error) = primary_error {
                                result
                                    .meta
                                    .warnings
                                    .push(format!("served by fallback after: {primary_error}"));
                            }
                            info!(action, request_id = %request.request_id, "dispatched via fallback");
                            return Dispatch { result: Ok(result), attempts };
                        }
                        Err(err) => match primary_error {
                            Some(primary_error) => Route::Fail(TransportError::new(
                                err.channel,
                                err.kind,
                                format!("{}; after {primary_error}", err.detail),
                            )),
                            None => Route::Fail(err),
                        },
                    },
                },

                Route::Fail(err) => return Dispatch { result: Err(err), attempts },
            };
        }
    }
}

/// Send once on `transport`, normalize, and record the attempt.
fn attempt(
    transport: &dyn Transport,
    request: &DispatchRequest,
    verifier: &dyn Verifier,
    attempts: &mut Vec<Attempt>,
) -> Result<ExecutionResult, TransportError> {
    let channel = transport.channel();
    let outcome = transport
        .send(request)
        .and_then(|body| verifier.normalize(request, channel, &body));

    let audit_outcome = match &outcome {
        Ok(result) if result.ok => AuditOutcome::Ok,
        Ok(_) => AuditOutcome::RemoteFailure,
        Err(_) => AuditOutcome::TransportFailure,
    };
    attempts.push(Attempt { channel, outcome: audit_outcome });

    outcome.map(|mut result| {
        result.channel = Some(channel);
        result
    })
}

// ── Tests ────────────────────────────────────────────────────────────────────
