//! Connection facade over the archival service.

use http::HeaderValue;
use http::Request;
use log::debug;
use serde::de::DeserializeOwned;

use crate::constants::{GLACIER_VERSION, SERVICE, X_AMZ_GLACIER_VERSION};
use crate::credential::Credential;
use crate::error::{Error, ErrorKind, Result, ServiceError};
use crate::payload::{Body, Payload};
use crate::region::Region;
use crate::sign::Signer;

/// A Connection specifies the means and parameters of accessing the
/// archival service.
///
/// Calls are blocking and synchronous; a call occupies the invoking
/// thread until the HTTP exchange completes. The connection itself holds
/// no background tasks and may be shared across threads.
pub struct Connection {
    agent: ureq::Agent,
    region: &'static Region,
    signer: Signer,
}

impl Connection {
    /// Returns a Connection with an initialized signer based on the
    /// provided access credentials and region.
    pub fn new(secret: &str, access: &str, region: &'static Region) -> Connection {
        Connection::with_credential(Credential::new(secret, access, region, SERVICE))
    }

    /// Returns a Connection around an existing credential, e.g. one
    /// carrying a [refresh hook](Credential::with_refresh).
    pub fn with_credential(credential: Credential) -> Connection {
        Connection {
            agent: ureq::agent(),
            region: credential.region(),
            signer: Signer::new(credential),
        }
    }

    /// Replace the HTTP agent the connection performs its exchanges
    /// through. Timeouts, proxies and TLS configuration all live on the
    /// agent.
    pub fn with_agent(mut self, agent: ureq::Agent) -> Self {
        self.agent = agent;
        self
    }

    /// The region this connection targets.
    pub fn region(&self) -> &'static Region {
        self.region
    }

    // URL prefix of the named vault, without a trailing slash.
    pub(crate) fn vault_url(&self, vault: &str) -> String {
        format!("https://{}/-/vaults/{}", self.region.endpoint, vault)
    }

    // URL prefix of the named policy, without a trailing slash.
    pub(crate) fn policy_url(&self, policy: &str) -> String {
        format!("https://{}/-/policies/{}", self.region.endpoint, policy)
    }

    pub(crate) fn request(&self, method: &str, url: &str) -> Result<Request<Body>> {
        Request::builder()
            .method(method)
            .uri(url)
            .header(X_AMZ_GLACIER_VERSION, GLACIER_VERSION)
            .body(Body::Empty)
            .map_err(|e| {
                Error::new(ErrorKind::Config, "building request failed")
                    .with_operation("connection::request")
                    .set_source(e)
            })
    }

    pub(crate) fn sign(&self, req: &mut Request<Body>, payload: Payload) -> Result<()> {
        self.signer.sign(req, payload)
    }

    /// Hand the signed request to the transport. Responses with a status
    /// not in `expected` are converted into a typed error after their
    /// body has been read in full.
    pub(crate) fn execute(
        &self,
        req: Request<Body>,
        expected: &[u16],
    ) -> Result<ureq::Response> {
        let (parts, body) = req.into_parts();
        debug!("sending {} {}", parts.method, parts.uri);

        let mut call = self.agent.request(parts.method.as_str(), &parts.uri.to_string());
        for (name, value) in parts.headers.iter() {
            let value = value.to_str().map_err(|e| {
                Error::new(ErrorKind::Encoding, "header value is not valid UTF-8")
                    .with_operation("connection::execute")
                    .set_source(e)
            })?;
            call = call.set(name.as_str(), value);
        }

        let result = match body {
            Body::Empty => call.call(),
            Body::Bytes(bytes) => call.send_bytes(&bytes),
            Body::Reader(reader) => call.send(reader),
        };

        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(err) => {
                return Err(Error::new(ErrorKind::Transport, "sending request failed")
                    .with_operation("connection::execute")
                    .set_source(err))
            }
        };

        if expected.contains(&response.status()) {
            return Ok(response);
        }
        Err(parse_service_error(response))
    }
}

// Non-success bodies are always read fully so the structured error can be
// parsed, then dropped.
fn parse_service_error(response: ureq::Response) -> Error {
    let status = response.status();
    let body = match response.into_string() {
        Ok(body) => body,
        Err(err) => {
            return Error::new(
                ErrorKind::Transport,
                &format!("reading error response with status {status} failed"),
            )
            .with_operation("connection::execute")
            .set_source(err)
        }
    };

    match serde_json::from_str::<ServiceError>(&body) {
        Ok(service) => Error::new(
            ErrorKind::Service,
            &format!("service returned status {status}"),
        )
        .with_operation("connection::execute")
        .set_source(service),
        Err(err) => Error::new(
            ErrorKind::Service,
            &format!("service returned status {status}: {body}"),
        )
        .with_operation("connection::execute")
        .set_source(err),
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(response: ureq::Response) -> Result<T> {
    let body = response.into_string().map_err(|e| {
        Error::new(ErrorKind::Transport, "reading response body failed")
            .with_operation("connection::read_json")
            .set_source(e)
    })?;

    serde_json::from_str(&body).map_err(|e| {
        Error::new(ErrorKind::Service, "decoding response body failed")
            .with_operation("connection::read_json")
            .set_source(e)
    })
}

pub(crate) fn required_header(response: &ureq::Response, name: &str) -> Result<String> {
    response.header(name).map(str::to_string).ok_or_else(|| {
        Error::new(
            ErrorKind::Service,
            &format!("response is missing the {name} header"),
        )
        .with_operation("connection::required_header")
    })
}

pub(crate) fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| {
        Error::new(ErrorKind::Config, "header value contains invalid characters")
            .with_operation("connection::header_value")
            .set_source(e)
    })
}

pub(crate) fn check_limit(limit: u32) -> Result<()> {
    if !(1..=1000).contains(&limit) {
        return Err(
            Error::new(ErrorKind::Config, "limit must be between 1 and 1000")
                .with_operation("connection::check_limit"),
        );
    }
    Ok(())
}

/// Query-string builder that adds the leading "?" when non-empty.
#[derive(Default)]
pub(crate) struct Parameters(Vec<(String, String)>);

impl Parameters {
    /// Add the key value pair.
    pub(crate) fn add(&mut self, key: &str, value: &str) {
        self.0.push((key.to_string(), value.to_string()));
    }

    /// Encode the values into "URL encoded" form ("?bar=baz&foo=quux").
    pub(crate) fn encode(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }

        let mut out = String::from("?");
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push('&');
            }
            out.push_str(&crate::sign::uri_encode(key.as_bytes()));
            out.push('=');
            out.push_str(&crate::sign::uri_encode(value.as_bytes()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::US_WEST_2;

    #[test]
    fn test_urls() {
        let connection = Connection::new("secret", "access", &US_WEST_2);
        assert_eq!(
            connection.vault_url("backups"),
            "https://glacier.us-west-2.amazonaws.com/-/vaults/backups"
        );
        assert_eq!(
            connection.policy_url("data-retrieval"),
            "https://glacier.us-west-2.amazonaws.com/-/policies/data-retrieval"
        );
    }

    #[test]
    fn test_request_carries_version_header() {
        let connection = Connection::new("secret", "access", &US_WEST_2);
        let req = connection
            .request("GET", &connection.vault_url("backups"))
            .expect("request must build");
        assert_eq!(
            req.headers()
                .get(X_AMZ_GLACIER_VERSION)
                .expect("version header must be set"),
            GLACIER_VERSION
        );
    }

    #[test]
    fn test_check_limit() {
        assert!(check_limit(1).is_ok());
        assert!(check_limit(1000).is_ok());
        assert_eq!(
            check_limit(0).expect_err("must fail").kind(),
            ErrorKind::Config
        );
        assert_eq!(
            check_limit(1001).expect_err("must fail").kind(),
            ErrorKind::Config
        );
    }

    #[test]
    fn test_parameters_encode() {
        let mut params = Parameters::default();
        assert_eq!(params.encode(), "");

        params.add("limit", "10");
        params.add("marker", "arn:aws:glacier/vault one");
        assert_eq!(
            params.encode(),
            "?limit=10&marker=arn%3Aaws%3Aglacier%2Fvault%20one"
        );
    }
}
