use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;

use super::{Method, Request, Response, Transport, TransportError};

/// Blocking HTTP(S) transport backed by reqwest.
///
/// Any status code is returned as a [`Response`]; only connection, TLS and
/// timeout failures become errors.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let resp = builder.body(request.body.clone()).send()?;
        let status = resp.status().as_u16();
        let body = resp.text()?;
        debug!(
            "{} {} -> {} ({} bytes)",
            request.method.as_str(),
            request.url,
            status,
            body.len()
        );

        Ok(Response { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn posts_body_and_headers() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v3/lk/documents/create")
                .header("authorization", "Bearer t0k3n")
                .header("content-type", "application/json")
                .body(r#"{"doc_id":"1"}"#);
            then.status(200).body(r#"{"value":"accepted"}"#);
        });

        let transport = HttpTransport::new(Duration::from_secs(5), "regpush-test").unwrap();
        let request = Request::post(
            server.url("/api/v3/lk/documents/create"),
            br#"{"doc_id":"1"}"#.to_vec(),
        )
        .with_header("Content-Type", "application/json")
        .with_header("Authorization", "Bearer t0k3n");

        let resp = transport.send(&request).unwrap();
        mock.assert();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, r#"{"value":"accepted"}"#);
        assert!(resp.is_success());
    }

    #[test]
    fn error_status_is_a_response() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/create");
            then.status(503).body("busy");
        });

        let transport = HttpTransport::new(Duration::from_secs(5), "regpush-test").unwrap();
        let resp = transport
            .send(&Request::post(server.url("/create"), Vec::new()))
            .unwrap();
        assert_eq!(resp.status, 503);
        assert!(!resp.is_success());
    }

    #[test]
    fn unreachable_host_is_a_transport_error() {
        let transport = HttpTransport::new(Duration::from_millis(500), "regpush-test").unwrap();
        // Port 9 on loopback: nothing listens there in a test sandbox.
        let err = transport
            .send(&Request::post("http://127.0.0.1:9/create", Vec::new()))
            .unwrap_err();
        assert!(matches!(err, TransportError::Http(_)));
    }
}
