use crate::{Error, Result};
use reqwest::blocking::{Client, Response};
use std::time::Duration;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Blocking HTTP client shared by every getter in a chain
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// GET `url`, turning connection failures and non-2xx statuses into
    /// [`Error::Transport`] carrying the URL
    pub fn get(&self, url: &str) -> Result<Response> {
        tracing::debug!(url, "GET");

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport {
                url: url.to_string(),
                reason: status.to_string(),
            });
        }

        Ok(response)
    }

    /// GET `url` and read the whole body
    ///
    /// A connection dropped or timed out mid-body is a [`Error::Transport`]
    /// for `url`, just like a failed request.
    pub fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let body = self
            .get(url)?
            .bytes()
            .map_err(|e| transport_error(url, e))?;
        tracing::debug!(url, bytes = body.len(), "downloaded");
        Ok(body.to_vec())
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> Error {
    let reason = if e.is_connect() {
        format!("cannot connect: {}", e)
    } else if e.is_timeout() {
        "request timed out".to_string()
    } else {
        e.to_string()
    };
    Error::Transport {
        url: url.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    /// Server promising a long body, then hanging up after a few bytes
    fn truncating_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                while reader.read_line(&mut line).unwrap_or(0) > 2 {
                    line.clear();
                }
                let _ = stream.write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Length: 5000\r\nConnection: close\r\n\r\nabc",
                );
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_non_success_status_is_transport_error() {
        let mut server = mockito::Server::new();
        let mock = server.mock("GET", "/missing").with_status(404).create();

        let client = HttpClient::new(None).unwrap();
        let url = format!("{}/missing", server.url());
        let err = client.get(&url).unwrap_err();

        mock.assert();
        match &err {
            Error::Transport { url: failed, reason } => {
                assert_eq!(failed, &url);
                assert!(reason.contains("404"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_unreachable_host_is_transport_error() {
        let client = HttpClient::new(Some(Duration::from_secs(5))).unwrap();
        let err = client.get("http://127.0.0.1:1/index.json").unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }

    #[test]
    fn test_success_returns_body() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/ok").with_body("hello").create();

        let client = HttpClient::new(None).unwrap();
        let body = client.get(&format!("{}/ok", server.url())).unwrap().text().unwrap();
        assert_eq!(body, "hello");
    }

    #[test]
    fn test_get_bytes_reads_body() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/ok").with_body("hello").create();

        let client = HttpClient::new(None).unwrap();
        let body = client.get_bytes(&format!("{}/ok", server.url())).unwrap();
        assert_eq!(body, b"hello");
    }

    #[test]
    fn test_truncated_body_is_transport_error() {
        let url = format!("{}/SHA256SUMS", truncating_server());

        let client = HttpClient::new(Some(Duration::from_secs(5))).unwrap();
        let err = client.get_bytes(&url).unwrap_err();

        match &err {
            Error::Transport { url: failed, .. } => assert_eq!(failed, &url),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.is_recoverable());
    }
}
