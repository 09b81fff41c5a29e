//! Request signing.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Mutex;

use http::header;
use http::HeaderValue;
use http::Request;
use log::debug;
use percent_encoding::percent_encode;

use crate::constants::URI_ENCODE_SET;
use crate::credential::Credential;
use crate::error::{Error, ErrorKind, Result};
use crate::hash::{hex_hmac_sha256, hex_sha256};
use crate::payload::{Body, Payload};
use crate::time::{format_date, format_iso8601, format_rfc1123, now, parse_rfc1123};

/// Signer produces the `Authorization` header for outgoing requests.
///
/// The credential is shared by every call and guarded by a mutex. It is
/// written at most once per UTC day, when the scope date rolls over under
/// an installed refresh hook.
pub struct Signer {
    credential: Mutex<Credential>,
}

impl Signer {
    /// Create a signer around the credential.
    pub fn new(credential: Credential) -> Self {
        Signer {
            credential: Mutex::new(credential),
        }
    }

    /// Sign the request, obtaining the body digest per the payload's
    /// variant.
    ///
    /// Side effects: a `Date` header in RFC 1123 form is inserted when
    /// absent, the `Authorization` header is appended, and the request
    /// body is replaced when the payload produces one. A pre-existing
    /// `Authorization` header is left in place.
    pub fn sign(&self, req: &mut Request<Body>, payload: Payload) -> Result<()> {
        let (access, scope, signing_key) = {
            let mut cred = self.credential.lock().expect("lock poisoned");
            cred.rollover(&format_date(now()));
            cred.check()?;
            (cred.access().to_string(), cred.scope(), *cred.signing_key())
        };

        // Ensure a Date header and extract the signing timestamp from it.
        let timestamp = match req.headers().get(header::DATE) {
            Some(value) => {
                let value = value.to_str().map_err(|e| {
                    Error::new(ErrorKind::Encoding, "Date header is not valid UTF-8")
                        .with_operation("sign")
                        .set_source(e)
                })?;
                parse_rfc1123(value)?
            }
            None => {
                let now = now();
                let date = HeaderValue::from_str(&format_rfc1123(now)).map_err(|e| {
                    Error::new(ErrorKind::Encoding, "formatted date is not a valid header")
                        .with_operation("sign")
                        .set_source(e)
                })?;
                req.headers_mut().insert(header::DATE, date);
                now
            }
        };

        let (body, digest) = payload.prepare()?;
        if let Some(body) = body {
            *req.body_mut() = body;
        }

        let (creq, signed_headers) = canonical_request_string(req, &hex::encode(digest))?;
        debug!("calculated canonical request: {creq}");

        // StringToSign:
        //
        // AWS4-HMAC-SHA256
        // 20110909T233600Z
        // 20110909/<region>/<service>/aws4_request
        // <hashed_canonical_request>
        let string_to_sign = {
            let mut f = String::new();
            writeln!(f, "AWS4-HMAC-SHA256")?;
            writeln!(f, "{}", format_iso8601(timestamp))?;
            writeln!(f, "{}", &scope)?;
            write!(f, "{}", hex_sha256(creq.as_bytes()))?;
            f
        };
        debug!("calculated string to sign: {string_to_sign}");

        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let mut authorization = HeaderValue::from_str(&format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            access,
            scope,
            signed_headers.join(";"),
            signature
        ))
        .map_err(|e| {
            Error::new(ErrorKind::Encoding, "authorization is not a valid header")
                .with_operation("sign")
                .set_source(e)
        })?;
        authorization.set_sensitive(true);

        req.headers_mut().append(header::AUTHORIZATION, authorization);

        Ok(())
    }
}

fn canonical_request_string(
    req: &Request<Body>,
    payload_hex: &str,
) -> Result<(String, Vec<String>)> {
    // 256 is specially chosen to avoid reallocation for most requests.
    let mut f = String::with_capacity(256);

    // Insert method
    writeln!(f, "{}", req.method().as_str())?;
    // Insert encoded path
    writeln!(f, "{}", canonical_path(req.uri().path())?)?;
    // Insert query
    writeln!(
        f,
        "{}",
        canonical_query(req.uri().query().unwrap_or_default())?
    )?;

    // Lowercased header names to values; multiple values for one name are
    // sorted, then joined with ",".
    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in req.headers() {
        let value = value.to_str().map_err(|e| {
            Error::new(ErrorKind::Encoding, "header value is not valid UTF-8")
                .with_operation("sign")
                .set_source(e)
        })?;
        headers
            .entry(name.as_str().to_lowercase())
            .or_default()
            .push(value.trim().to_string());
    }
    if !headers.contains_key("host") {
        let host = req
            .uri()
            .authority()
            .map(|a| a.as_str().to_string())
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::Encoding,
                    "request without authority cannot be signed",
                )
                .with_operation("sign")
            })?;
        headers.insert("host".to_string(), vec![host]);
    }
    for (name, values) in headers.iter_mut() {
        values.sort();
        writeln!(f, "{}:{}", name, values.join(","))?;
    }
    writeln!(f)?;

    // Insert signed headers
    let signed_headers: Vec<String> = headers.into_keys().collect();
    writeln!(f, "{}", signed_headers.join(";"))?;
    // Insert payload hash
    write!(f, "{payload_hex}")?;

    Ok((f, signed_headers))
}

/// URI encode a string. Bytes that are not in the RFC 3986 unreserved set
/// are replaced with their hex encoding preceded by a '%' character.
pub(crate) fn uri_encode(s: &[u8]) -> String {
    percent_encode(s, &URI_ENCODE_SET).to_string()
}

// Lexically clean the decoded path (collapse "." / ".." / empty
// segments), then percent-encode each segment exactly once.
fn canonical_path(raw: &str) -> Result<String> {
    let decoded = decode_component(raw, false)?;
    let decoded = String::from_utf8(decoded).map_err(|e| {
        Error::new(ErrorKind::Encoding, "request path is not valid UTF-8")
            .with_operation("sign::canonical_path")
            .set_source(e)
    })?;

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut path = String::from("/");
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            path.push('/');
        }
        path.push_str(&uri_encode(segment.as_bytes()));
    }
    Ok(path)
}

// Parse the raw query, sort parameter names and values ascending by byte
// value, and emit each pair encoded exactly once. Empty values sort
// first, as empty strings.
fn canonical_query(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Ok(String::new());
    }

    let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    for component in raw.split('&') {
        if component.is_empty() {
            continue;
        }
        let (key, value) = component.split_once('=').unwrap_or((component, ""));
        pairs.push((decode_component(key, true)?, decode_component(value, true)?));
    }
    pairs.sort();

    let encoded: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect();
    Ok(encoded.join("&"))
}

// Percent-decode with escape validation; a '%' not followed by two hex
// digits fails the whole canonicalization.
fn decode_component(s: &str, plus_as_space: bool) -> Result<Vec<u8>> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());

    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let escape = bytes
                    .get(i + 1)
                    .and_then(|b| hex_digit(*b))
                    .zip(bytes.get(i + 2).and_then(|b| hex_digit(*b)));
                let Some((hi, lo)) = escape else {
                    return Err(Error::new(
                        ErrorKind::Encoding,
                        "invalid percent escape in request target",
                    )
                    .with_operation("sign::decode_component"));
                };
                out.push(hi << 4 | lo);
                i += 3;
            }
            b'+' if plus_as_space => {
                out.push(b' ');
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(out)
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|v| v as u8)
}
