//! # opsgate-transport
//!
//! The two execution channels to the target dispatcher.
//!
//! - [`WebhookTransport`]: the primary channel, a blocking HTTP `POST` to the
//!   workflow-automation endpoint.
//! - [`SshTransport`]: the fallback channel, an administrative session that
//!   runs the on-host dispatcher directly. The same session kind backs
//!   [`SshAuditLookup`], which greps the target's audit log.
//!
//! Every call is bounded by a timeout; an elapsed timeout is a
//! `TransportErrorKind::Timeout`, never a hang.

mod session;
pub mod ssh;
pub mod webhook;

pub use ssh::{SessionSpec, SshAuditLookup, SshTransport};
pub use webhook::{WebhookTransport, API_KEY_HEADER};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use serde_json::{json, Value};
    use tiny_http::{Response, Server};

    use opsgate_contracts::{
        action::{ActionArgs, Mode},
        error::TransportErrorKind,
        execution::{Channel, DispatchRequest, RequestId},
        plan::Invocation,
    };
    use opsgate_core::traits::{AuditLookup, Transport};

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn request() -> DispatchRequest {
        let invocation = Invocation {
            action: "site_block".into(),
            mode: Mode::Apply,
            args: ActionArgs::Site { name: "demo6".into() },
            confirm_token: Some("BLOCK_DEMO6".into()),
        };
        DispatchRequest::for_invocation(&invocation, RequestId::new())
    }

    struct Captured {
        body: String,
        api_key: Option<String>,
    }

    /// Serve one request, reply with `status` and `reply`, and hand back what
    /// the client sent.
    fn serve_once(status: u16, reply: &'static str, delay: Duration) -> (String, mpsc::Receiver<Captured>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            if let Ok(mut request) = server.recv() {
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let api_key = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv(API_KEY_HEADER))
                    .map(|h| h.value.as_str().to_string());
                let _ = tx.send(Captured { body, api_key });
                thread::sleep(delay);
                let _ = request.respond(Response::from_string(reply).with_status_code(status));
            }
        });
        (format!("http://{addr}/webhook/agent-exec"), rx)
    }

    fn webhook(url: &str, timeout: Duration) -> WebhookTransport {
        WebhookTransport::new(url, Some("secret".into()), timeout).unwrap()
    }

    fn shell(script: &str, timeout: Duration) -> SessionSpec {
        SessionSpec {
            program: "sh".into(),
            options: vec!["-c".into(), script.into(), "fake-ssh".into()],
            host: "ops@target".into(),
            timeout,
        }
    }

    // ── 1. webhook ────────────────────────────────────────────────────────────

    #[test]
    fn test_webhook_posts_request_and_returns_body() {
        let (url, rx) = serve_once(200, r#"{"ok":true,"exit_code":0}"#, Duration::ZERO);
        let req = request();

        let body = webhook(&url, Duration::from_secs(5)).send(&req).unwrap();

        assert_eq!(body, json!({ "ok": true, "exit_code": 0 }));
        let captured = rx.recv().unwrap();
        assert_eq!(captured.api_key.as_deref(), Some("secret"));
        let sent: Value = serde_json::from_str(&captured.body).unwrap();
        assert_eq!(sent["params"]["args"], json!({ "name": "demo6" }));
        assert_eq!(sent["params"]["confirm"], "BLOCK_DEMO6");
        assert_eq!(sent["request_id"], req.request_id.as_str());
    }

    #[test]
    fn test_webhook_unwraps_single_item_array() {
        let (url, _rx) = serve_once(200, r#"[{"ok":true}]"#, Duration::ZERO);
        let body = webhook(&url, Duration::from_secs(5)).send(&request()).unwrap();
        assert_eq!(body, json!({ "ok": true }));
    }

    #[test]
    fn test_webhook_error_classes() {
        let (url, _rx) = serve_once(502, "bad gateway", Duration::ZERO);
        let err = webhook(&url, Duration::from_secs(5)).send(&request()).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Status);
        assert!(err.detail.contains("HTTP 502"));
        assert_eq!(err.channel, Channel::Primary);

        let (url, _rx) = serve_once(200, "<html>not json</html>", Duration::ZERO);
        let err = webhook(&url, Duration::from_secs(5)).send(&request()).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Malformed);

        let err = webhook("http://127.0.0.1:9/webhook", Duration::from_secs(2)).send(&request()).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Network);
    }

    #[test]
    fn test_webhook_times_out() {
        let (url, _rx) = serve_once(200, "{}", Duration::from_secs(3));
        let err = webhook(&url, Duration::from_millis(300)).send(&request()).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Timeout);
    }

    // ── 2. administrative session ─────────────────────────────────────────────

    #[test]
    fn test_session_feeds_request_on_stdin() {
        // `cat` echoes the request back, so the reply is the request itself.
        let transport = SshTransport::new(shell("cat", Duration::from_secs(5)), "dispatch");
        let req = request();

        let body = transport.send(&req).unwrap();

        assert_eq!(transport.channel(), Channel::Fallback);
        assert_eq!(body, serde_json::to_value(&req).unwrap());
    }

    #[test]
    fn test_session_passes_host_and_remote_command() {
        let transport = SshTransport::new(
            shell(r#"cat >/dev/null; printf '{"host":"%s","cmd":"%s"}' "$1" "$2""#, Duration::from_secs(5)),
            "sudo /usr/local/sbin/iibot dispatch",
        );

        let body = transport.send(&request()).unwrap();

        assert_eq!(body["host"], "ops@target");
        assert_eq!(body["cmd"], "sudo /usr/local/sbin/iibot dispatch");
    }

    #[test]
    fn test_failed_action_reply_wins_over_exit_status() {
        let transport = SshTransport::new(
            shell(r#"cat >/dev/null; echo '{"ok":false,"exit_code":1}'; exit 1"#, Duration::from_secs(5)),
            "dispatch",
        );
        assert_eq!(transport.send(&request()).unwrap()["ok"], false);
    }

    #[test]
    fn test_session_error_classes() {
        let refused = SshTransport::new(
            shell("echo 'Permission denied (publickey)' >&2; exit 255", Duration::from_secs(5)),
            "dispatch",
        );
        let err = refused.send(&request()).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Network);
        assert!(err.detail.contains("Permission denied"));

        let garbage = SshTransport::new(shell("echo hello", Duration::from_secs(5)), "dispatch");
        assert_eq!(garbage.send(&request()).unwrap_err().kind, TransportErrorKind::Malformed);

        let missing = SshTransport::new(
            SessionSpec { program: "/nonexistent/ssh".into(), ..shell("", Duration::from_secs(1)) },
            "dispatch",
        );
        assert_eq!(missing.send(&request()).unwrap_err().kind, TransportErrorKind::Network);
    }

    #[test]
    fn test_session_times_out() {
        let slow = SshTransport::new(shell("exec sleep 5", Duration::from_millis(300)), "dispatch");
        let err = slow.send(&request()).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Timeout);
    }

    // ── 3. audit lookup ───────────────────────────────────────────────────────

    #[test]
    fn test_audit_lookup_greps_remote_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("audit.jsonl");
        let known = RequestId::new();
        std::fs::write(&log, format!("{{\"request_id\":\"{known}\",\"outcome\":\"ok\"}}\n")).unwrap();

        // Drop the host and run the remote command locally.
        let lookup = SshAuditLookup::new(shell(r#"shift; exec "$@""#, Duration::from_secs(5)), log.display().to_string());

        assert!(lookup.find(&known).unwrap());
        assert!(!lookup.find(&RequestId::new()).unwrap());

        let broken = SshAuditLookup::new(shell(r#"shift; exec "$@""#, Duration::from_secs(5)), "/nonexistent/audit.jsonl");
        assert!(broken.find(&known).is_err());
    }
}
