//! Signed-URL construction for the Spark WebSocket endpoint.
//!
//! The endpoint authenticates the connection itself rather than individual
//! frames: the client signs a canonical `host`/`date`/`request-line` string
//! with HMAC-SHA256 and carries the result in the query string.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Builds the authenticated WebSocket URL for `chat_url`, stamped with the
/// current time in RFC 1123 form.
pub fn auth_url(chat_url: &str, api_key: &str, api_secret: &str) -> Result<String, String> {
    let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    signed_url(chat_url, api_key, api_secret, &date)
}

fn signed_url(
    chat_url: &str,
    api_key: &str,
    api_secret: &str,
    date: &str,
) -> Result<String, String> {
    let (host, path) = split_ws_url(chat_url)?;
    let origin = format!("host: {host}\ndate: {date}\nGET {path} HTTP/1.1");

    let mut mac = HmacSha256::new_from_slice(api_secret.as_bytes())
        .map_err(|err| format!("invalid API secret: {err}"))?;
    mac.update(origin.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());

    let authorization_origin = format!(
        "api_key=\"{api_key}\", algorithm=\"hmac-sha256\", \
         headers=\"host date request-line\", signature=\"{signature}\""
    );
    let authorization = BASE64.encode(authorization_origin.as_bytes());

    Ok(format!(
        "{chat_url}?authorization={}&date={}&host={}",
        percent_encode(&authorization),
        percent_encode(date),
        percent_encode(&host)
    ))
}

/// Splits a `ws://` or `wss://` URL into host and request path.
fn split_ws_url(url: &str) -> Result<(String, String), String> {
    let rest = url
        .strip_prefix("wss://")
        .or_else(|| url.strip_prefix("ws://"))
        .ok_or_else(|| format!("chat URL must use ws:// or wss://: {url}"))?;
    match rest.split_once('/') {
        Some((host, path)) if !host.is_empty() => Ok((host.to_string(), format!("/{path}"))),
        Some(_) => Err(format!("chat URL has no host: {url}")),
        None if rest.is_empty() => Err(format!("chat URL has no host: {url}")),
        None => Ok((rest.to_string(), "/".to_string())),
    }
}

fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
