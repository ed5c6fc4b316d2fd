//! `Transport` implementation backed by ureq.
//!
//! # Design
//! Each handle carries its own option bag. `perform` builds a fresh
//! `ureq::Agent` from that bag, so nothing leaks between executions and no
//! connection is reused. Failures are reported with libcurl error numbers
//! (see [`code`]) so callers can match on the same values regardless of the
//! transport underneath.
//!
//! Interpreted options: URL, CUSTOMREQUEST, POST, NOBODY, POSTFIELDS,
//! HTTPHEADER, COOKIE, REFERER, USERAGENT, USERPWD/HTTPAUTH (basic),
//! XOAUTH2_BEARER, TIMEOUT(_MS), CONNECTTIMEOUT(_MS), FAILONERROR,
//! FOLLOWLOCATION, MAXREDIRS, PROXY, PROXYUSERPWD, SSL_VERIFYPEER,
//! SSL_VERIFYHOST, CAINFO. Anything else is accepted and ignored.

use std::io::Read;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::{debug, trace};
use ureq::ResponseExt;

use crate::error::Result;
use crate::options::{auth, OptionId, OptionValue, TransportOptions};
use crate::transport::{info, Diagnostics, Transport, TransportFailure};

/// libcurl error numbers used in `TransportFailure::code`.
pub mod code {
    pub const URL_MALFORMAT: i64 = 3;
    pub const NOT_BUILT_IN: i64 = 4;
    pub const COULDNT_RESOLVE_PROXY: i64 = 5;
    pub const COULDNT_RESOLVE_HOST: i64 = 6;
    pub const COULDNT_CONNECT: i64 = 7;
    pub const HTTP_RETURNED_ERROR: i64 = 22;
    pub const OPERATION_TIMEDOUT: i64 = 28;
    pub const SSL_CONNECT_ERROR: i64 = 35;
    pub const BAD_FUNCTION_ARGUMENT: i64 = 43;
    pub const TOO_MANY_REDIRECTS: i64 = 47;
    pub const RECV_ERROR: i64 = 56;
    pub const SSL_CACERT_BADFILE: i64 = 77;
}

const DEFAULT_MAX_REDIRECTS: u32 = 20;

/// Blocking transport over ureq.
#[derive(Debug, Clone, Default)]
pub struct UreqTransport {
    restricted: bool,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report restricted mode, which stops the builder from turning on
    /// redirect following by default.
    pub fn with_restricted_mode(mut self, restricted: bool) -> Self {
        self.restricted = restricted;
        self
    }
}

#[derive(Debug, Default)]
pub struct UreqHandle {
    options: TransportOptions,
    failure: Option<TransportFailure>,
    diagnostics: Diagnostics,
}

impl Transport for UreqTransport {
    type Handle = UreqHandle;

    fn create_handle(&self) -> Result<UreqHandle> {
        Ok(UreqHandle::default())
    }

    fn apply_options(&self, handle: &mut UreqHandle, options: &TransportOptions) {
        for (id, value) in options.iter() {
            handle.options.set(id, value.clone());
        }
    }

    fn perform(&self, handle: &mut UreqHandle) -> Option<Vec<u8>> {
        handle.failure = None;
        handle.diagnostics = Diagnostics::new();

        let started = Instant::now();
        let outcome = run(&handle.options, &mut handle.diagnostics);
        handle
            .diagnostics
            .insert(info::TOTAL_TIME, started.elapsed().as_secs_f64());

        match outcome {
            Ok(body) => {
                handle.diagnostics.insert(info::SIZE_DOWNLOAD, body.len() as u64);
                Some(body)
            }
            Err(failure) => {
                debug!(code = failure.code, message = %failure.message, "ureq request failed");
                handle.failure = Some(failure);
                None
            }
        }
    }

    fn last_error_code(&self, handle: &UreqHandle) -> i64 {
        handle.failure.as_ref().map_or(0, |f| f.code)
    }

    fn last_error_message(&self, handle: &UreqHandle) -> String {
        handle
            .failure
            .as_ref()
            .map(|f| f.message.clone())
            .unwrap_or_default()
    }

    fn diagnostics(&self, handle: &UreqHandle) -> Diagnostics {
        handle.diagnostics.clone()
    }

    fn close_handle(&self, handle: UreqHandle) {
        trace!(options = handle.options.len(), "closing ureq handle");
    }

    fn restricted_mode(&self) -> bool {
        self.restricted
    }
}

fn run(
    options: &TransportOptions,
    diagnostics: &mut Diagnostics,
) -> std::result::Result<Vec<u8>, TransportFailure> {
    let url = options
        .text(OptionId::URL)
        .ok_or_else(|| TransportFailure::new(code::URL_MALFORMAT, "No URL set"))?;
    diagnostics.insert(info::EFFECTIVE_URL, url);

    let agent = build_agent(options)?;
    let method = request_method(options);

    let mut builder = ureq::http::Request::builder()
        .method(method.as_str())
        .uri(url);
    for (name, value) in request_headers(options)? {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let invalid = |e: ureq::http::Error| {
        TransportFailure::new(code::BAD_FUNCTION_ARGUMENT, format!("Invalid request: {e}"))
    };

    trace!(%method, url, "sending request");
    // Without POSTFIELDS only methods that require a body get an empty one;
    // the rest go out with no body framing at all.
    let sent = match options.text(OptionId::POSTFIELDS) {
        Some(fields) => agent.run(builder.body(fields.as_bytes().to_vec()).map_err(invalid)?),
        None if method_requires_body(&method) => {
            agent.run(builder.body(Vec::new()).map_err(invalid)?)
        }
        None => agent.run(builder.body(()).map_err(invalid)?),
    };
    let mut response = sent.map_err(|e| {
        if let ureq::Error::StatusCode(status) = e {
            diagnostics.insert(info::HTTP_CODE, status);
        }
        failure_from_ureq(&e)
    })?;

    diagnostics.insert(info::HTTP_CODE, response.status().as_u16());
    diagnostics.insert(info::EFFECTIVE_URL, response.get_uri().to_string());
    if let Some(content_type) = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
    {
        diagnostics.insert(info::CONTENT_TYPE, content_type);
    }

    let mut collected = Vec::new();
    response
        .body_mut()
        .as_reader()
        .read_to_end(&mut collected)
        .map_err(|e| failure_from_io(&e))?;
    Ok(collected)
}

fn request_method(options: &TransportOptions) -> String {
    if let Some(verb) = options.text(OptionId::CUSTOMREQUEST) {
        return verb.to_ascii_uppercase();
    }
    if options.flag(OptionId::POST) || options.contains(OptionId::POSTFIELDS) {
        "POST".to_string()
    } else if options.flag(OptionId::NOBODY) {
        "HEAD".to_string()
    } else {
        "GET".to_string()
    }
}

fn method_requires_body(method: &str) -> bool {
    matches!(method, "POST" | "PUT" | "PATCH")
}

fn build_agent(options: &TransportOptions) -> std::result::Result<ureq::Agent, TransportFailure> {
    let max_redirects = if options.flag(OptionId::FOLLOWLOCATION) {
        match options.int(OptionId::MAXREDIRS) {
            Some(n) if n >= 0 => u32::try_from(n).unwrap_or(u32::MAX),
            Some(_) => u32::MAX,
            None => DEFAULT_MAX_REDIRECTS,
        }
    } else {
        0
    };

    let mut config = ureq::Agent::config_builder()
        .http_status_as_error(options.flag(OptionId::FAILONERROR))
        .max_redirects(max_redirects)
        .tls_config(tls_config(options)?)
        .proxy(proxy(options)?);
    if let Some(timeout) = timeout(options, OptionId::TIMEOUT, OptionId::TIMEOUT_MS) {
        config = config.timeout_global(Some(timeout));
    }
    if let Some(timeout) = timeout(options, OptionId::CONNECTTIMEOUT, OptionId::CONNECTTIMEOUT_MS) {
        config = config.timeout_connect(Some(timeout));
    }
    if let Some(user_agent) = options.text(OptionId::USERAGENT) {
        config = config.user_agent(user_agent);
    }
    Ok(config.build().new_agent())
}

/// Zero means "no timeout". The millisecond variant wins when both are set.
fn timeout(options: &TransportOptions, secs: OptionId, millis: OptionId) -> Option<Duration> {
    let positive = |id| {
        options
            .int(id)
            .filter(|n| *n > 0)
            .and_then(|n| u64::try_from(n).ok())
    };
    positive(millis)
        .map(Duration::from_millis)
        .or_else(|| positive(secs).map(Duration::from_secs))
}

fn request_headers(
    options: &TransportOptions,
) -> std::result::Result<Vec<(String, String)>, TransportFailure> {
    let mut headers: Vec<(String, String)> = Vec::new();
    for line in options.list(OptionId::HTTPHEADER).unwrap_or_default() {
        headers.push(header_line(line)?);
    }

    if let Some(cookie) = options.text(OptionId::COOKIE) {
        headers.push(("Cookie".to_string(), cookie.to_string()));
    }
    if let Some(referer) = options.text(OptionId::REFERER) {
        headers.push(("Referer".to_string(), referer.to_string()));
    }
    if options.contains(OptionId::POSTFIELDS) && !has_header(&headers, "content-type") {
        headers.push((
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        ));
    }
    if let Some(authorization) = authorization(options)? {
        headers.push(("Authorization".to_string(), authorization));
    }
    Ok(headers)
}

/// Split a raw header line. `Name: value` sends the value; `Name;` sends the
/// header with an empty value. Anything else is rejected.
fn header_line(line: &str) -> std::result::Result<(String, String), TransportFailure> {
    let parsed = match line.split_once(':') {
        Some((name, value)) => Some((name.trim(), value.trim())),
        None => line.trim().strip_suffix(';').map(|name| (name.trim(), "")),
    };
    match parsed {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(TransportFailure::new(
            code::BAD_FUNCTION_ARGUMENT,
            format!("Malformed header line `{line}`"),
        )),
    }
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
}

fn authorization(
    options: &TransportOptions,
) -> std::result::Result<Option<String>, TransportFailure> {
    let scheme = options.int(OptionId::HTTPAUTH);
    if let Some(token) = options.text(OptionId::XOAUTH2_BEARER) {
        if scheme.is_some_and(|mask| mask & auth::BEARER != 0) {
            return Ok(Some(format!("Bearer {token}")));
        }
    }
    let Some(credentials) = options.text(OptionId::USERPWD) else {
        return Ok(None);
    };
    if scheme.unwrap_or(auth::BASIC) & auth::BASIC == 0 {
        return Err(TransportFailure::new(
            code::NOT_BUILT_IN,
            "Requested authentication scheme is not supported; only basic is available",
        ));
    }
    Ok(Some(format!("Basic {}", STANDARD.encode(credentials))))
}

fn proxy(options: &TransportOptions) -> std::result::Result<Option<ureq::Proxy>, TransportFailure> {
    let Some(target) = options.text(OptionId::PROXY) else {
        return Ok(None);
    };
    if options.flag(OptionId::HTTPPROXYTUNNEL) {
        trace!("proxy tunnelling is decided by ureq per scheme");
    }
    let (scheme, rest) = target.split_once("://").unwrap_or(("http", target));
    let authority = match options.text(OptionId::PROXYUSERPWD) {
        Some(credentials) => format!("{credentials}@{rest}"),
        None => rest.to_string(),
    };
    ureq::Proxy::new(&format!("{scheme}://{authority}"))
        .map(Some)
        .map_err(|e| {
            TransportFailure::new(
                code::COULDNT_RESOLVE_PROXY,
                format!("Invalid proxy `{target}`: {e}"),
            )
        })
}

fn tls_config(
    options: &TransportOptions,
) -> std::result::Result<ureq::tls::TlsConfig, TransportFailure> {
    let verify_peer = options
        .get(OptionId::SSL_VERIFYPEER)
        .map_or(true, OptionValue::as_bool);
    let verify_host = options.int(OptionId::SSL_VERIFYHOST).unwrap_or(2);

    let mut builder = ureq::tls::TlsConfig::builder();
    // rustls cannot skip host name checks on their own, so either switch
    // turns all verification off.
    if !verify_peer || verify_host == 0 {
        debug!(verify_peer, verify_host, "TLS verification disabled");
        builder = builder.disable_verification(true);
    }

    if let Some(path) = options.text(OptionId::CAINFO) {
        let bad_file = |detail: String| {
            TransportFailure::new(
                code::SSL_CACERT_BADFILE,
                format!("error setting certificate file {path}: {detail}"),
            )
        };
        let pem = std::fs::read(path).map_err(|e| bad_file(e.to_string()))?;
        let mut roots = Vec::new();
        for item in ureq::tls::parse_pem(&pem) {
            if let ureq::tls::PemItem::Certificate(certificate) =
                item.map_err(|e| bad_file(e.to_string()))?
            {
                roots.push(certificate);
            }
        }
        if roots.is_empty() {
            return Err(bad_file("no certificates found".to_string()));
        }
        builder = builder.root_certs(ureq::tls::RootCerts::new_with_certs(&roots));
    }
    Ok(builder.build())
}

fn failure_from_ureq(error: &ureq::Error) -> TransportFailure {
    let (code, message) = match error {
        ureq::Error::StatusCode(status) => (
            code::HTTP_RETURNED_ERROR,
            format!("The requested URL returned error: {status}"),
        ),
        ureq::Error::Timeout(_) => (
            code::OPERATION_TIMEDOUT,
            format!("Operation timed out ({error})"),
        ),
        ureq::Error::HostNotFound => (
            code::COULDNT_RESOLVE_HOST,
            "Could not resolve host".to_string(),
        ),
        ureq::Error::ConnectionFailed => (
            code::COULDNT_CONNECT,
            "Failed to connect to host".to_string(),
        ),
        ureq::Error::TooManyRedirects => (
            code::TOO_MANY_REDIRECTS,
            "Maximum redirects followed".to_string(),
        ),
        ureq::Error::BadUri(detail) => (code::URL_MALFORMAT, format!("URL rejected: {detail}")),
        ureq::Error::Tls(detail) => (code::SSL_CONNECT_ERROR, format!("TLS error: {detail}")),
        ureq::Error::ConnectProxyFailed(detail) => {
            (code::RECV_ERROR, format!("Proxy CONNECT failed: {detail}"))
        }
        ureq::Error::Io(source) => return failure_from_io(source),
        other => (code::RECV_ERROR, other.to_string()),
    };
    TransportFailure::new(code, message)
}

fn failure_from_io(error: &std::io::Error) -> TransportFailure {
    if let Some(inner) = error
        .get_ref()
        .and_then(|source| source.downcast_ref::<ureq::Error>())
    {
        return failure_from_ureq(inner);
    }
    let code = match error.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => code::OPERATION_TIMEDOUT,
        std::io::ErrorKind::NotFound => code::COULDNT_RESOLVE_HOST,
        std::io::ErrorKind::ConnectionRefused
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::AddrNotAvailable => code::COULDNT_CONNECT,
        _ => code::RECV_ERROR,
    };
    TransportFailure::new(code, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(entries: &[(OptionId, OptionValue)]) -> TransportOptions {
        let mut options = TransportOptions::new();
        for (id, value) in entries {
            options.set(*id, value.clone());
        }
        options
    }

    #[test]
    fn method_selection() {
        assert_eq!(request_method(&TransportOptions::new()), "GET");
        assert_eq!(
            request_method(&options(&[(OptionId::POSTFIELDS, "a=1".into())])),
            "POST"
        );
        assert_eq!(
            request_method(&options(&[
                (OptionId::POSTFIELDS, "a=1".into()),
                (OptionId::CUSTOMREQUEST, "put".into()),
            ])),
            "PUT"
        );
        assert_eq!(request_method(&options(&[(OptionId::NOBODY, true.into())])), "HEAD");
    }

    #[test]
    fn only_body_methods_get_an_empty_body() {
        assert!(method_requires_body("PATCH"));
        assert!(method_requires_body("POST"));
        assert!(!method_requires_body("GET"));
        assert!(!method_requires_body("DELETE"));
    }

    #[test]
    fn header_lines_are_split_and_extras_appended() {
        let opts = options(&[
            (
                OptionId::HTTPHEADER,
                vec!["Accept: text/plain".to_string(), "X-Empty;".to_string()].into(),
            ),
            (OptionId::COOKIE, "a=1".into()),
            (OptionId::POSTFIELDS, "x=1".into()),
            (OptionId::USERPWD, "u:p".into()),
        ]);
        let headers = request_headers(&opts).unwrap();
        assert_eq!(
            headers,
            vec![
                ("Accept".to_string(), "text/plain".to_string()),
                ("X-Empty".to_string(), String::new()),
                ("Cookie".to_string(), "a=1".to_string()),
                (
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded".to_string()
                ),
                ("Authorization".to_string(), "Basic dTpw".to_string()),
            ]
        );
    }

    #[test]
    fn header_line_forms() {
        assert_eq!(
            header_line("X-Empty;").unwrap(),
            ("X-Empty".to_string(), String::new())
        );
        assert_eq!(
            header_line("X-Time: 12:30").unwrap(),
            ("X-Time".to_string(), "12:30".to_string())
        );
        assert_eq!(
            header_line("Broken").unwrap_err().code,
            code::BAD_FUNCTION_ARGUMENT
        );
        assert_eq!(header_line(";").unwrap_err().code, code::BAD_FUNCTION_ARGUMENT);
    }

    #[test]
    fn malformed_header_line_fails_the_request() {
        let opts = options(&[(
            OptionId::HTTPHEADER,
            vec!["X-Ok: 1".to_string(), "Broken".to_string()].into(),
        )]);
        assert_eq!(
            request_headers(&opts).unwrap_err().code,
            code::BAD_FUNCTION_ARGUMENT
        );
    }

    #[test]
    fn caller_content_type_is_not_overridden() {
        let opts = options(&[
            (
                OptionId::HTTPHEADER,
                vec!["content-type: application/json".to_string()].into(),
            ),
            (OptionId::POSTFIELDS, "{}".into()),
        ]);
        let headers = request_headers(&opts).unwrap();
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn digest_only_auth_is_not_supported() {
        let opts = options(&[
            (OptionId::USERPWD, "u:p".into()),
            (OptionId::HTTPAUTH, auth::DIGEST.into()),
        ]);
        let failure = request_headers(&opts).unwrap_err();
        assert_eq!(failure.code, code::NOT_BUILT_IN);
    }

    #[test]
    fn any_auth_falls_back_to_basic() {
        let opts = options(&[
            (OptionId::USERPWD, "u:p".into()),
            (OptionId::HTTPAUTH, auth::ANY.into()),
        ]);
        assert_eq!(authorization(&opts).unwrap().as_deref(), Some("Basic dTpw"));
    }

    #[test]
    fn bearer_token_needs_bearer_scheme() {
        let opts = options(&[
            (OptionId::XOAUTH2_BEARER, "tok".into()),
            (OptionId::HTTPAUTH, auth::BEARER.into()),
        ]);
        assert_eq!(authorization(&opts).unwrap().as_deref(), Some("Bearer tok"));
        let opts = options(&[(OptionId::XOAUTH2_BEARER, "tok".into())]);
        assert_eq!(authorization(&opts).unwrap(), None);
    }

    #[test]
    fn timeouts_prefer_milliseconds_and_ignore_zero() {
        let opts = options(&[
            (OptionId::TIMEOUT, 5.into()),
            (OptionId::TIMEOUT_MS, 250.into()),
            (OptionId::CONNECTTIMEOUT, 0.into()),
        ]);
        assert_eq!(
            timeout(&opts, OptionId::TIMEOUT, OptionId::TIMEOUT_MS),
            Some(Duration::from_millis(250))
        );
        assert_eq!(
            timeout(&opts, OptionId::CONNECTTIMEOUT, OptionId::CONNECTTIMEOUT_MS),
            None
        );
    }

    #[test]
    fn missing_ca_file_is_reported() {
        let opts = options(&[(OptionId::CAINFO, "/no/such/bundle.pem".into())]);
        let failure = tls_config(&opts).unwrap_err();
        assert_eq!(failure.code, code::SSL_CACERT_BADFILE);
    }

    #[test]
    fn ca_file_without_certificates_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let pem = dir.path().join("empty.pem");
        std::fs::write(&pem, "nothing to see here\n").unwrap();
        let opts = options(&[(OptionId::CAINFO, pem.to_string_lossy().into_owned().into())]);
        let failure = tls_config(&opts).unwrap_err();
        assert_eq!(failure.code, code::SSL_CACERT_BADFILE);
    }

    #[test]
    fn status_errors_map_to_http_returned_error() {
        let failure = failure_from_ureq(&ureq::Error::StatusCode(503));
        assert_eq!(failure.code, code::HTTP_RETURNED_ERROR);
        assert_eq!(failure.message, "The requested URL returned error: 503");
        assert_eq!(
            failure_from_ureq(&ureq::Error::HostNotFound).code,
            code::COULDNT_RESOLVE_HOST
        );
    }

    #[test]
    fn io_errors_map_by_kind() {
        let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        assert_eq!(failure_from_io(&refused).code, code::COULDNT_CONNECT);
        let timed_out = std::io::Error::from(std::io::ErrorKind::TimedOut);
        assert_eq!(failure_from_io(&timed_out).code, code::OPERATION_TIMEDOUT);
    }

    #[test]
    fn perform_without_url_fails_cleanly() {
        let transport = UreqTransport::new();
        let mut handle = transport.create_handle().unwrap();
        assert!(transport.perform(&mut handle).is_none());
        assert_eq!(transport.last_error_code(&handle), code::URL_MALFORMAT);
        assert_eq!(transport.last_error_message(&handle), "No URL set");
        assert!(transport.diagnostics(&handle).total_time().is_some());
    }
}
