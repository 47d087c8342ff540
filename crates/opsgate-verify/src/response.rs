//! Dispatcher response verifier.
//!
//! `ResponseVerifier` implements the `Verifier` trait from `opsgate-core`.
//! Normalization runs in three phases:
//!
//! 1. **Structural**: the raw body is validated against `response_schema()`
//!    with the `jsonschema` crate. All violations are collected.
//! 2. **Decode**: the body is deserialized into an `ExecutionResult`.
//! 3. **Contract**: the response must echo the request's action and mode,
//!    its `exit_code` must agree with `ok`, and any echoed `request_id` must
//!    be the one that was sent.
//!
//! Any failure is a `Malformed` transport error on the channel that returned
//! the body, so the selector treats it like any other channel failure.

use serde_json::{json, Value};
use tracing::warn;

use opsgate_contracts::{
    error::{OpsError, OpsResult, TransportError},
    execution::{Channel, DispatchRequest, ExecutionResult},
};
use opsgate_core::traits::Verifier;

use crate::fingerprint::sha256_hex;

/// JSON Schema of a dispatcher response.
pub fn response_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["ok", "exit_code", "action", "mode"],
        "properties": {
            "ok": { "type": "boolean" },
            "exit_code": { "type": "integer", "enum": [0, 1] },
            "action": { "type": "string", "minLength": 1 },
            "mode": { "enum": ["check", "plan", "apply"] },
            "stdout": { "type": "string" },
            "stderr": { "type": "string" },
            "artifacts": { "type": "array", "items": { "type": "string" } },
            "meta": {
                "type": "object",
                "properties": {
                    "changed": { "type": "boolean" },
                    "warnings": { "type": "array", "items": { "type": "string" } }
                }
            },
            "request_id": { "type": "string" }
        }
    })
}

pub struct ResponseVerifier {
    validator: jsonschema::Validator,
}

impl ResponseVerifier {
    pub fn new() -> OpsResult<Self> {
        let validator =
            jsonschema::validator_for(&response_schema()).map_err(|e| OpsError::ConfigError {
                reason: format!("invalid response schema: {e}"),
            })?;
        Ok(Self { validator })
    }
}

impl Verifier for ResponseVerifier {
    fn normalize(
        &self,
        request: &DispatchRequest,
        channel: Channel,
        body: &Value,
    ) -> Result<ExecutionResult, TransportError> {
        let malformed = |detail: String| {
            warn!(
                request_id = %request.request_id,
                channel = %channel,
                %detail,
                "malformed dispatcher response"
            );
            TransportError::malformed(channel, detail)
        };

        // ── Phase 1: JSON Schema structural validation ────────────────────────
        let violations: Vec<String> = self
            .validator
            .iter_errors(body)
            .map(|error| format!("at '{}': {error}", error.instance_path))
            .collect();
        if !violations.is_empty() {
            return Err(malformed(format!(
                "response violates schema: {}",
                violations.join("; ")
            )));
        }

        // ── Phase 2: Decode ──────────────────────────────────────────────────
        let mut result: ExecutionResult = serde_json::from_value(body.clone())
            .map_err(|e| malformed(format!("response does not decode: {e}")))?;

        // ── Phase 3: Contract checks ─────────────────────────────────────────
        if result.action != request.params.action {
            return Err(malformed(format!(
                "response is for action '{}', request was '{}'",
                result.action, request.params.action
            )));
        }
        if result.mode != request.params.mode {
            return Err(malformed(format!(
                "response is for mode '{}', request was '{}'",
                result.mode, request.params.mode
            )));
        }
        if result.ok != (result.exit_code == 0) {
            return Err(malformed(format!(
                "ok={} contradicts exit_code={}",
                result.ok, result.exit_code
            )));
        }
        if let Some(echoed) = &result.request_id {
            if echoed != &request.request_id {
                return Err(malformed(format!(
                    "response echoes request_id {echoed}, request was {}",
                    request.request_id
                )));
            }
        }

        result.request_id = None;
        result.channel = Some(channel);
        Ok(result)
    }

    fn fingerprint(&self, content: &str) -> String {
        sha256_hex(content)
    }
}
