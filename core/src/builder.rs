//! Fluent request builder and single-shot executor.
//!
//! # Design
//! `RequestBuilder` collects configuration through chained setters, then
//! `execute()` resolves it into one option batch for the transport, performs
//! the request, records the outcome, and resets itself. Setters that can
//! reject their input return `Result<&mut Self>` and leave state untouched on
//! error, so a chain short-circuits with `?` at the first bad value.
//!
//! The builder owns one transport handle at a time. The handle is closed at
//! the end of every execution, whatever the outcome; the next `execute()`
//! acquires a new one.
//!
//! After execution the URL is kept, while method, data, headers and options
//! are cleared. The last error and diagnostics survive until the next
//! execution replaces them; the last response only changes on success.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::debug::render;
use crate::error::{Error, Result};
use crate::http::{HttpMethod, RequestData};
use crate::options::{
    resolve_auth_scheme, OptionId, OptionKey, OptionNamespace, OptionValue, TransportOptions,
};
use crate::transport::{Diagnostics, Transport, TransportFailure};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const MAX_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_PROXY_PORT: u16 = 80;

/// Peer and host verification policy for TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    pub verify_peer: bool,
    /// 0 disables host name checks, 2 requires a match.
    pub verify_host: u8,
    /// PEM bundle used as the trust anchor instead of the default store.
    pub ca_path: Option<PathBuf>,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            verify_peer: true,
            verify_host: 2,
            ca_path: None,
        }
    }
}

impl TlsSettings {
    pub fn insecure() -> Self {
        Self {
            verify_peer: false,
            ..Self::default()
        }
    }

    pub fn with_ca_path(path: impl Into<PathBuf>) -> Self {
        Self {
            ca_path: Some(path.into()),
            ..Self::default()
        }
    }
}

/// Builds and runs one HTTP request at a time over a `Transport`.
///
/// Not reentrant: every method takes `&mut self`.
pub struct RequestBuilder<T: Transport> {
    transport: T,
    handle: Option<T::Handle>,
    url: Option<String>,
    method: Option<HttpMethod>,
    data: Option<RequestData>,
    headers: Vec<String>,
    options: TransportOptions,
    timeout_secs: u64,
    last_response: Vec<u8>,
    last_error: Option<TransportFailure>,
    last_diagnostics: Diagnostics,
}

impl<T: Transport> RequestBuilder<T> {
    /// Acquire a handle from `transport`. Fails with
    /// `Error::CapabilityUnavailable` if the transport cannot provide one.
    pub fn new(transport: T) -> Result<Self> {
        let handle = transport.create_handle()?;
        debug!("transport handle acquired");
        Ok(Self {
            transport,
            handle: Some(handle),
            url: None,
            method: None,
            data: None,
            headers: Vec::new(),
            options: TransportOptions::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            last_response: Vec::new(),
            last_error: None,
            last_diagnostics: Diagnostics::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Set the target URL. Rejects anything that is not an absolute URL with
    /// a host; a rejected value leaves the previous URL in place.
    pub fn set_url(&mut self, url: &str) -> Result<&mut Self> {
        validate_url(url)?;
        self.url = Some(url.to_string());
        Ok(self)
    }

    /// Set the method from its name, case-insensitively.
    pub fn set_method(&mut self, method: &str) -> Result<&mut Self> {
        let method = method.parse::<HttpMethod>()?;
        Ok(self.set_http_method(method))
    }

    pub fn set_http_method(&mut self, method: HttpMethod) -> &mut Self {
        self.method = Some(method);
        self.options.set(OptionId::CUSTOMREQUEST, method.as_str());
        self
    }

    /// Store the payload. Used as the query string for GET and as the body
    /// for every other method.
    pub fn set_data(&mut self, data: impl Into<RequestData>) -> Result<&mut Self> {
        let data = data.into();
        if data.is_empty() {
            return Err(Error::invalid("no data found for request"));
        }
        self.data = Some(data);
        Ok(self)
    }

    /// Set a transport option by identifier or by `opt`-namespace name.
    pub fn set_option(
        &mut self,
        key: impl Into<OptionKey>,
        value: impl Into<OptionValue>,
    ) -> Result<&mut Self> {
        self.set_option_in(OptionNamespace::Opt, key, value)
    }

    /// Set a transport option, resolving names against `namespace`.
    pub fn set_option_in(
        &mut self,
        namespace: OptionNamespace,
        key: impl Into<OptionKey>,
        value: impl Into<OptionValue>,
    ) -> Result<&mut Self> {
        let id = key.into().resolve(namespace)?;
        self.options.set(id, value);
        Ok(self)
    }

    /// Set several options at once. Stops at the first unresolvable name;
    /// options before it stay applied.
    pub fn set_options<K, V, I>(&mut self, options: I) -> Result<&mut Self>
    where
        K: Into<OptionKey>,
        V: Into<OptionValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in options {
            self.set_option(key, value)?;
        }
        Ok(self)
    }

    /// Applies to both the connect and the total timeout. Accepts
    /// `0..=MAX_TIMEOUT_SECS`.
    pub fn set_timeout(&mut self, secs: u64) -> Result<&mut Self> {
        if secs > MAX_TIMEOUT_SECS {
            return Err(Error::invalid(format!(
                "request timeout {secs}s exceeds {MAX_TIMEOUT_SECS}s"
            )));
        }
        self.timeout_secs = secs;
        Ok(self)
    }

    pub fn set_cookies(&mut self, cookies: impl Into<RequestData>) -> Result<&mut Self> {
        let cookies = cookies.into();
        if cookies.is_empty() {
            return Err(Error::invalid("invalid cookie parameters"));
        }
        self.options.set(OptionId::COOKIE, cookies.encode());
        Ok(self)
    }

    /// Append `name: value`. Headers go out in the order they were added.
    pub fn add_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.push(format!("{name}: {value}"));
        self
    }

    /// Append a pre-formatted header line verbatim.
    pub fn add_header_line(&mut self, line: impl Into<String>) -> &mut Self {
        self.headers.push(line.into());
        self
    }

    /// `scheme` names an auth scheme such as `any`, `basic` or `digest`.
    pub fn set_basic_auth(
        &mut self,
        username: &str,
        password: &str,
        scheme: &str,
    ) -> Result<&mut Self> {
        let mask = resolve_auth_scheme(scheme)
            .ok_or_else(|| Error::invalid(format!("unknown auth scheme `{scheme}`")))?;
        self.options.set(OptionId::HTTPAUTH, mask);
        self.options
            .set(OptionId::USERPWD, format!("{username}:{password}"));
        Ok(self)
    }

    pub fn set_proxy(&mut self, url: &str, port: u16) -> &mut Self {
        self.options.set(OptionId::HTTPPROXYTUNNEL, true);
        self.options.set(OptionId::PROXY, format!("{url}:{port}"));
        self
    }

    pub fn set_proxy_default_port(&mut self, url: &str) -> &mut Self {
        self.set_proxy(url, DEFAULT_PROXY_PORT)
    }

    pub fn set_proxy_auth(&mut self, username: &str, password: &str) -> &mut Self {
        self.options
            .set(OptionId::PROXYUSERPWD, format!("{username}:{password}"));
        self
    }

    /// Disabling peer verification still records `verify_host` as given.
    pub fn set_tls(&mut self, tls: TlsSettings) -> Result<&mut Self> {
        if tls.verify_host > 2 {
            return Err(Error::invalid(format!(
                "host verification level {} is not 0, 1 or 2",
                tls.verify_host
            )));
        }
        let ca_path = match (&tls.ca_path, tls.verify_peer) {
            (Some(path), true) => Some(path.canonicalize().map_err(|e| {
                Error::invalid(format!("certificate path {}: {e}", path.display()))
            })?),
            _ => None,
        };
        self.options.set(OptionId::SSL_VERIFYPEER, tls.verify_peer);
        self.options
            .set(OptionId::SSL_VERIFYHOST, i64::from(tls.verify_host));
        if let Some(path) = ca_path {
            self.options
                .set(OptionId::CAINFO, path.to_string_lossy().into_owned());
        }
        Ok(self)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn method(&self) -> Option<HttpMethod> {
        self.method
    }

    pub fn data(&self) -> Option<&RequestData> {
        self.data.as_ref()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    pub fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn last_response(&self) -> &[u8] {
        &self.last_response
    }

    pub fn last_response_text(&self) -> String {
        String::from_utf8_lossy(&self.last_response).into_owned()
    }

    pub fn last_error(&self) -> Option<&TransportFailure> {
        self.last_error.as_ref()
    }

    pub fn last_diagnostics(&self) -> &Diagnostics {
        &self.last_diagnostics
    }

    /// Human-readable report of the last execution.
    pub fn debug_report(&self) -> String {
        render(
            &self.last_response,
            self.last_error.as_ref(),
            &self.last_diagnostics,
        )
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Run the configured request and return the response body.
    ///
    /// Fails with `Error::Precondition` if no URL is set (nothing is reset in
    /// that case) and with `Error::Transport` if the transport reports a
    /// failure. On both success and transport failure the handle is closed,
    /// diagnostics are captured and the configuration is cleared. A failed
    /// run leaves the body of the last successful one in `last_response`.
    pub fn execute(&mut self) -> Result<Vec<u8>> {
        let url = self
            .url
            .clone()
            .ok_or_else(|| Error::Precondition("no URL set for request".into()))?;
        let mut handle = match self.handle.take() {
            Some(handle) => handle,
            None => {
                debug!("re-acquiring transport handle");
                self.transport.create_handle()?
            }
        };

        let timeout = i64::try_from(self.timeout_secs).unwrap_or(i64::MAX);
        self.options.set(OptionId::TIMEOUT, timeout);
        self.options.set(OptionId::CONNECTTIMEOUT, timeout);
        self.options.set_default(OptionId::RETURNTRANSFER, true);
        self.options.set_default(OptionId::FAILONERROR, true);
        if !self.transport.restricted_mode() {
            self.options.set_default(OptionId::FOLLOWLOCATION, true);
        }

        let method = self.method.unwrap_or_default();
        let final_url = self.encode_request(method, url);
        self.options.set(OptionId::URL, final_url);
        if !self.headers.is_empty() {
            let headers = std::mem::take(&mut self.headers);
            self.options.set(OptionId::HTTPHEADER, headers);
        }

        debug!(
            method = %method,
            url = self.options.text(OptionId::URL).unwrap_or_default(),
            options = self.options.len(),
            "executing request"
        );
        self.transport.apply_options(&mut handle, &self.options);
        let outcome = self.transport.perform(&mut handle);
        self.last_diagnostics = self.transport.diagnostics(&handle);

        let result = match outcome {
            Some(body) => {
                debug!(bytes = body.len(), "request completed");
                self.last_error = None;
                self.last_response = body.clone();
                Ok(body)
            }
            None => {
                let failure = TransportFailure::new(
                    self.transport.last_error_code(&handle),
                    self.transport.last_error_message(&handle),
                );
                warn!(code = failure.code, message = %failure.message, "request failed");
                self.last_error = Some(failure.clone());
                Err(failure.into())
            }
        };

        self.transport.close_handle(handle);
        debug!("transport handle released");
        self.reset();
        result
    }

    /// Resolve method-specific URL, body and headers. Returns the final URL.
    fn encode_request(&mut self, method: HttpMethod, url: String) -> String {
        let payload = self.data.take().map(|data| data.encode());
        match method {
            HttpMethod::Get => match payload {
                Some(query) => {
                    let separator = if url.contains('?') { '&' } else { '?' };
                    format!("{url}{separator}{query}")
                }
                None => url,
            },
            HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch | HttpMethod::Delete => {
                self.options.set(OptionId::CUSTOMREQUEST, method.as_str());
                if method == HttpMethod::Post {
                    self.options.set(OptionId::POST, true);
                }
                if let Some(body) = payload {
                    self.options.set(OptionId::POSTFIELDS, body);
                }
                if let Some(header) = method.override_header() {
                    self.headers.push(header);
                }
                url
            }
        }
    }

    fn reset(&mut self) {
        self.method = None;
        self.data = None;
        self.headers.clear();
        self.options.clear();
    }
}

fn validate_url(url: &str) -> Result<()> {
    let parsed =
        url::Url::parse(url).map_err(|e| Error::invalid(format!("invalid URL `{url}`: {e}")))?;
    if parsed.cannot_be_a_base() || !parsed.has_host() {
        return Err(Error::invalid(format!("invalid URL `{url}`: missing host")));
    }
    Ok(())
}

impl<T: Transport> std::fmt::Debug for RequestBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("data", &self.data)
            .field("headers", &self.headers)
            .field("options", &self.options)
            .field("timeout_secs", &self.timeout_secs)
            .field("has_handle", &self.handle.is_some())
            .field("last_error", &self.last_error)
            .finish()
    }
}
