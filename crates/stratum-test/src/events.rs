//! Sample event payloads and metadata.
//!
//! The shapes follow what common serverless platforms deliver, trimmed to
//! the fields middleware usually inspects.

use serde_json::{json, Value};
use stratum_core::InvocationMetadata;

/// Function name used by [`metadata`].
pub const FUNCTION_NAME: &str = "stratum-test-fn";

/// An HTTP event as delivered by an API gateway.
///
/// A JSON `body` is serialized to a string, as gateways do.
#[must_use]
pub fn api_gateway(method: &str, path: &str, body: Option<Value>) -> Value {
    json!({
        "httpMethod": method,
        "path": path,
        "headers": {
            "content-type": "application/json",
            "user-agent": "stratum-test"
        },
        "queryStringParameters": null,
        "body": body.map(|b| b.to_string()),
        "isBase64Encoded": false,
        "requestContext": {
            "requestId": "test-request",
            "stage": "test"
        }
    })
}

/// A scheduled (cron) event.
#[must_use]
pub fn scheduled() -> Value {
    json!({
        "version": "0",
        "source": "aws.events",
        "detail-type": "Scheduled Event",
        "detail": {}
    })
}

/// A keep-warm ping.
#[must_use]
pub fn warmup() -> Value {
    json!({ "source": "serverless-plugin-warmup" })
}

/// Metadata for [`FUNCTION_NAME`] with a fixed request ID.
#[must_use]
pub fn metadata() -> InvocationMetadata {
    InvocationMetadata::new(FUNCTION_NAME)
        .with_request_id("00000000-0000-0000-0000-000000000000")
        .with_version("$LATEST")
}
