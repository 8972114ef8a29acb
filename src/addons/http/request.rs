use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::plugin::PluginOptions;

/// Outbound HTTP restrictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpOptions {
    /// Hosts (`host` or `host:port`) requests may target. `*` allows any.
    pub trusted_domains: Vec<String>,

    pub timeout_secs: u64,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            trusted_domains: Vec::new(),
            timeout_secs: 30,
        }
    }
}

impl HttpOptions {
    /// Whether `authority` (or its host part) is a trusted domain.
    pub fn is_trusted(&self, authority: &str) -> bool {
        let host = authority
            .rsplit_once(':')
            .map_or(authority, |(host, _)| host);

        self.trusted_domains
            .iter()
            .any(|domain| domain == "*" || domain == authority || domain == host)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl From<&PluginOptions> for HttpOptions {
    fn from(options: &PluginOptions) -> Self {
        Self {
            trusted_domains: options.trusted_domains.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExecuteStatus {
    Pending = 0,
    Success = 1,
    Failed = -1,
}

#[derive(Debug, Default)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Host-side state of one script request object.
#[derive(Debug)]
pub struct Request {
    id: String,
    pub method: String,
    pub url: String,
    pub proxy: String,
    pub body: Vec<u8>,
    pub headers: HeaderMap,
    finished_at: i64,
    status: ExecuteStatus,
    response: Response,
}

impl Request {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method: method.into(),
            url: url.into(),
            proxy: String::new(),
            body: Vec::new(),
            headers: HeaderMap::new(),
            finished_at: 0,
            status: ExecuteStatus::Pending,
            response: Response::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Unix seconds when the last execution finished, 0 before that.
    pub fn finished_at(&self) -> i64 {
        self.finished_at
    }

    pub fn status(&self) -> ExecuteStatus {
        self.status
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.headers.insert(header_name(name)?, header_value(value)?);
        Ok(())
    }

    pub fn add_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.headers.append(header_name(name)?, header_value(value)?);
        Ok(())
    }

    pub fn del_header(&mut self, name: &str) {
        self.headers.remove(name);
    }

    /// Perform the request, recording the response on success.
    pub fn execute(&mut self, options: &HttpOptions) -> Result<()> {
        let url = Url::parse(&self.url)?;
        let target = authority(&url);

        if !options.is_trusted(&target) {
            return Err(Error::host(format!("domain {target} is not trusted")));
        }

        let method = match self.method.trim() {
            "" => Method::GET,
            method => Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|_| Error::host(format!("invalid method {method}")))?,
        };

        tracing::debug!(id = %self.id, %method, %url, "Executing http request");

        let result = self.send(options, method, url);
        self.finished_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs() as i64);

        match result {
            Ok(response) => {
                self.response = response;
                self.status = ExecuteStatus::Success;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(id = %self.id, error = %err, "Http request failed");
                self.status = ExecuteStatus::Failed;
                Err(err.into())
            }
        }
    }

    fn send(
        &self,
        options: &HttpOptions,
        method: Method,
        url: Url,
    ) -> std::result::Result<Response, reqwest::Error> {
        let mut client = reqwest::blocking::Client::builder().timeout(options.timeout());
        client = if self.proxy.is_empty() {
            client.no_proxy()
        } else {
            client.proxy(reqwest::Proxy::all(self.proxy.as_str())?)
        };

        let response = client
            .build()?
            .request(method, url)
            .headers(self.headers.clone())
            .body(self.body.clone())
            .send()?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes()?.to_vec();

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

/// First value of `name`, or an empty string.
pub fn header(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .unwrap_or_default()
}

pub fn header_values(headers: &HeaderMap, name: &str) -> Vec<String> {
    headers
        .get_all(name)
        .iter()
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .collect()
}

pub fn header_fields(headers: &HeaderMap) -> Vec<String> {
    headers.keys().map(|name| name.as_str().to_string()).collect()
}

/// `host` or `host:port` when the port is explicit.
pub(crate) fn authority(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}

fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| Error::host(format!("invalid header name {name:?}")))
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| Error::host(format!("invalid header value {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trusted_domains() {
        let mut options = HttpOptions {
            trusted_domains: vec!["127.0.0.1".to_string(), "api.local:8080".to_string()],
            ..HttpOptions::default()
        };

        assert!(options.is_trusted("127.0.0.1:3000"));
        assert!(options.is_trusted("api.local:8080"));
        assert!(!options.is_trusted("api.local:9090"));
        assert!(!options.is_trusted("example.com"));

        options.trusted_domains.push("*".to_string());
        assert!(options.is_trusted("example.com"));
    }

    #[test]
    fn test_headers() {
        let mut request = Request::new("GET", "http://127.0.0.1/");
        request.set_header("X-Trace", "a").unwrap();
        request.add_header("X-Trace", "b").unwrap();
        request.set_header("Accept", "text/plain").unwrap();

        assert_eq!(header(&request.headers, "x-trace"), "a");
        assert_eq!(header_values(&request.headers, "X-Trace"), vec!["a", "b"]);
        assert_eq!(header_fields(&request.headers).len(), 2);

        request.del_header("x-trace");
        assert_eq!(header(&request.headers, "X-Trace"), "");
        assert!(request.set_header("bad header", "x").is_err());
    }

    #[test]
    fn test_untrusted_domain_is_rejected() {
        let mut request = Request::new("GET", "http://example.com/");
        let err = request.execute(&HttpOptions::default()).unwrap_err();

        assert!(err.to_string().contains("not trusted"), "{err}");
        assert_eq!(request.status(), ExecuteStatus::Pending);
        assert_eq!(request.finished_at(), 0);
    }
}
