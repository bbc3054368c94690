//! Webhook ingress: signature verification and delivery parsing.
//!
//! Deliveries are authenticated with an HMAC-SHA256 over a canonical
//! request string. The sender names which headers it signed in
//! `x-contentful-signed-headers`; the canonical request is
//!
//! ```text
//! METHOD \n PATH \n name:value;name:value;... \n RAW_BODY
//! ```
//!
//! with the signed headers serialized in the order the sender listed them.
//! The signed timestamp header gives replay protection: deliveries older
//! than the TTL are rejected even with a valid signature.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed delivery before it is rejected as a replay.
pub const SIGNATURE_TTL_SECS: u64 = 30;

const SIGNATURE_HEADER: &str = "x-contentful-signature";
const SIGNED_HEADERS_HEADER: &str = "x-contentful-signed-headers";
const TIMESTAMP_HEADER: &str = "x-contentful-timestamp";
const TOPIC_HEADER: &str = "x-contentful-topic";

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Serialize the canonical request string the signature covers.
pub fn build_canonical_request(
    method: &str,
    path: &str,
    headers: &[(String, String)],
    body: &str,
) -> Result<String, SignatureError> {
    let signed_names =
        header_value(headers, SIGNED_HEADERS_HEADER).ok_or(SignatureError::Missing)?;

    let canonical_headers = signed_names
        .split(',')
        .map(|name| {
            let name = name.trim();
            let value = header_value(headers, name).unwrap_or("");
            format!("{}:{}", name.to_ascii_lowercase(), value)
        })
        .collect::<Vec<_>>()
        .join(";");

    Ok([method.to_uppercase().as_str(), path, &canonical_headers, body].join("\n"))
}

/// Hex HMAC-SHA256 of a canonical request. What a well-behaved sender puts
/// in the signature header.
pub fn sign_canonical(secret: &str, canonical: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a delivery's signature and freshness.
///
/// `now_ms` is the verifier's clock in Unix milliseconds, injected so the
/// TTL check is testable. Header names are matched case-insensitively.
pub fn verify_signature(
    secret: &str,
    method: &str,
    path: &str,
    headers: &[(String, String)],
    body: &str,
    now_ms: u64,
) -> Result<(), SignatureError> {
    let signature = header_value(headers, SIGNATURE_HEADER).ok_or(SignatureError::Missing)?;
    let timestamp: u64 = header_value(headers, TIMESTAMP_HEADER)
        .ok_or(SignatureError::Missing)?
        .parse()
        .map_err(|_| SignatureError::Mismatch)?;

    if now_ms.saturating_sub(timestamp) > SIGNATURE_TTL_SECS * 1000 {
        return Err(SignatureError::Stale(SIGNATURE_TTL_SECS));
    }

    let canonical = build_canonical_request(method, path, headers, body)?;
    let signature_bytes = hex::decode(signature).map_err(|_| SignatureError::Mismatch)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(canonical.as_bytes());
    mac.verify_slice(&signature_bytes)
        .map_err(|_| SignatureError::Mismatch)
}

/// A webhook delivery reduced to what the sync pipeline acts on.
#[derive(Debug, PartialEq)]
pub enum WebhookEvent {
    /// An article was published or republished; re-sync the listed locales.
    Publish { article_id: String, locales: Vec<String> },
    /// An article was unpublished or deleted.
    Removal { article_id: String },
    /// A delivery this pipeline does not act on. The reason is reported
    /// back in the response body.
    Ignored { reason: String },
}

/// Content type this pipeline indexes; other entry types are ignored.
const ARTICLE_CONTENT_TYPE: &str = "pageBlogPost";

/// Map a delivery (topic header plus JSON payload) to a [`WebhookEvent`].
pub fn parse_event(topic: &str, payload: &Value, default_locale: &str) -> WebhookEvent {
    let action = match topic.rsplit('.').next() {
        Some(action) => action,
        None => return WebhookEvent::Ignored { reason: format!("unrecognized topic: {topic}") },
    };

    if !topic.contains(".Entry.") {
        return WebhookEvent::Ignored { reason: format!("not an entry event: {topic}") };
    }

    let article_id = match payload.pointer("/sys/id").and_then(|v| v.as_str()) {
        Some(id) => id.to_string(),
        None => return WebhookEvent::Ignored { reason: "payload missing sys.id".to_string() },
    };

    let content_type = payload
        .pointer("/sys/contentType/sys/id")
        .and_then(|v| v.as_str());

    match action {
        // Autosave fires on every keystroke in the CMS editor; acting on it
        // would re-embed articles continuously.
        "auto_save" | "autosave" => {
            WebhookEvent::Ignored { reason: "autosave events are not indexed".to_string() }
        }
        "publish" | "save" => {
            if content_type != Some(ARTICLE_CONTENT_TYPE) {
                return WebhookEvent::Ignored {
                    reason: format!(
                        "content type {} is not indexed",
                        content_type.unwrap_or("unknown")
                    ),
                };
            }
            WebhookEvent::Publish {
                article_id,
                locales: payload_locales(payload, default_locale),
            }
        }
        // Unpublish/delete payloads are DeletedEntry objects without
        // fields, and often without a content type; act on them anyway
        // since deleting unknown ids is a no-op.
        "unpublish" | "delete" => WebhookEvent::Removal { article_id },
        other => WebhookEvent::Ignored { reason: format!("unhandled action: {other}") },
    }
}

/// Locales present on the entry, read from the localized `fields.title`
/// map. Falls back to the default locale when fields are absent.
fn payload_locales(payload: &Value, default_locale: &str) -> Vec<String> {
    let locales: Vec<String> = payload
        .pointer("/fields/title")
        .and_then(|t| t.as_object())
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();

    if locales.is_empty() {
        vec![default_locale.to_string()]
    } else {
        locales
    }
}

/// Read the topic header from a delivery's headers.
pub fn topic_from_headers(headers: &[(String, String)]) -> Option<String> {
    header_value(headers, TOPIC_HEADER).map(String::from)
}
