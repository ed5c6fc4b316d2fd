//! Transport option identifiers, values, and the option bag.
//!
//! # Design
//! Identifiers are opaque numbers that follow libcurl's numbering, so a raw
//! number copied from curl documentation means the same thing here. Symbolic
//! names resolve through a static, namespaced table: `opt` holds request
//! options (`CURLOPT_*`), `auth` holds auth-scheme bitmasks (`CURLAUTH_*`).
//! There is no runtime symbol lookup.
//!
//! `TransportOptions` is a plain map with last-write-wins semantics. The
//! builder fills it during configuration and hands it to the transport in one
//! batch at execution time.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};

/// Opaque transport option identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OptionId(pub i64);

impl OptionId {
    pub const PORT: OptionId = OptionId(3);
    pub const TIMEOUT: OptionId = OptionId(13);
    pub const VERBOSE: OptionId = OptionId(41);
    pub const HEADER: OptionId = OptionId(42);
    pub const NOPROGRESS: OptionId = OptionId(43);
    pub const NOBODY: OptionId = OptionId(44);
    pub const FAILONERROR: OptionId = OptionId(45);
    pub const UPLOAD: OptionId = OptionId(46);
    pub const POST: OptionId = OptionId(47);
    pub const FOLLOWLOCATION: OptionId = OptionId(52);
    pub const AUTOREFERER: OptionId = OptionId(58);
    pub const PROXYPORT: OptionId = OptionId(59);
    pub const HTTPPROXYTUNNEL: OptionId = OptionId(61);
    pub const SSL_VERIFYPEER: OptionId = OptionId(64);
    pub const MAXREDIRS: OptionId = OptionId(68);
    pub const CONNECTTIMEOUT: OptionId = OptionId(78);
    pub const SSL_VERIFYHOST: OptionId = OptionId(81);
    pub const HTTP_VERSION: OptionId = OptionId(84);
    pub const HTTPAUTH: OptionId = OptionId(107);
    pub const PROXYAUTH: OptionId = OptionId(111);
    pub const TIMEOUT_MS: OptionId = OptionId(155);
    pub const CONNECTTIMEOUT_MS: OptionId = OptionId(156);
    pub const URL: OptionId = OptionId(10002);
    pub const PROXY: OptionId = OptionId(10004);
    pub const USERPWD: OptionId = OptionId(10005);
    pub const PROXYUSERPWD: OptionId = OptionId(10006);
    pub const RANGE: OptionId = OptionId(10007);
    pub const POSTFIELDS: OptionId = OptionId(10015);
    pub const REFERER: OptionId = OptionId(10016);
    pub const USERAGENT: OptionId = OptionId(10018);
    pub const COOKIE: OptionId = OptionId(10022);
    pub const HTTPHEADER: OptionId = OptionId(10023);
    pub const SSLCERT: OptionId = OptionId(10025);
    pub const COOKIEFILE: OptionId = OptionId(10031);
    pub const CUSTOMREQUEST: OptionId = OptionId(10036);
    pub const CAINFO: OptionId = OptionId(10065);
    pub const COOKIEJAR: OptionId = OptionId(10082);
    pub const SSLKEY: OptionId = OptionId(10087);
    pub const CAPATH: OptionId = OptionId(10097);
    pub const ACCEPT_ENCODING: OptionId = OptionId(10102);
    pub const XOAUTH2_BEARER: OptionId = OptionId(10220);
    /// Return the body to the caller instead of writing it to stdout.
    pub const RETURNTRANSFER: OptionId = OptionId(19913);
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match OPT_NAMES.iter().find(|(_, id)| id == self) {
            Some((name, _)) => write!(f, "{name}"),
            None => write!(f, "{}", self.0),
        }
    }
}

const OPT_NAMES: &[(&str, OptionId)] = &[
    ("PORT", OptionId::PORT),
    ("TIMEOUT", OptionId::TIMEOUT),
    ("VERBOSE", OptionId::VERBOSE),
    ("HEADER", OptionId::HEADER),
    ("NOPROGRESS", OptionId::NOPROGRESS),
    ("NOBODY", OptionId::NOBODY),
    ("FAILONERROR", OptionId::FAILONERROR),
    ("UPLOAD", OptionId::UPLOAD),
    ("POST", OptionId::POST),
    ("FOLLOWLOCATION", OptionId::FOLLOWLOCATION),
    ("AUTOREFERER", OptionId::AUTOREFERER),
    ("PROXYPORT", OptionId::PROXYPORT),
    ("HTTPPROXYTUNNEL", OptionId::HTTPPROXYTUNNEL),
    ("SSL_VERIFYPEER", OptionId::SSL_VERIFYPEER),
    ("MAXREDIRS", OptionId::MAXREDIRS),
    ("CONNECTTIMEOUT", OptionId::CONNECTTIMEOUT),
    ("SSL_VERIFYHOST", OptionId::SSL_VERIFYHOST),
    ("HTTP_VERSION", OptionId::HTTP_VERSION),
    ("HTTPAUTH", OptionId::HTTPAUTH),
    ("PROXYAUTH", OptionId::PROXYAUTH),
    ("TIMEOUT_MS", OptionId::TIMEOUT_MS),
    ("CONNECTTIMEOUT_MS", OptionId::CONNECTTIMEOUT_MS),
    ("URL", OptionId::URL),
    ("PROXY", OptionId::PROXY),
    ("USERPWD", OptionId::USERPWD),
    ("PROXYUSERPWD", OptionId::PROXYUSERPWD),
    ("RANGE", OptionId::RANGE),
    ("POSTFIELDS", OptionId::POSTFIELDS),
    ("REFERER", OptionId::REFERER),
    ("USERAGENT", OptionId::USERAGENT),
    ("COOKIE", OptionId::COOKIE),
    ("HTTPHEADER", OptionId::HTTPHEADER),
    ("SSLCERT", OptionId::SSLCERT),
    ("COOKIEFILE", OptionId::COOKIEFILE),
    ("CUSTOMREQUEST", OptionId::CUSTOMREQUEST),
    ("CAINFO", OptionId::CAINFO),
    ("COOKIEJAR", OptionId::COOKIEJAR),
    ("SSLKEY", OptionId::SSLKEY),
    ("CAPATH", OptionId::CAPATH),
    ("ENCODING", OptionId::ACCEPT_ENCODING),
    ("ACCEPT_ENCODING", OptionId::ACCEPT_ENCODING),
    ("XOAUTH2_BEARER", OptionId::XOAUTH2_BEARER),
    ("RETURNTRANSFER", OptionId::RETURNTRANSFER),
];

/// Auth-scheme bitmasks, as stored in the `HTTPAUTH` option.
pub mod auth {
    pub const NONE: i64 = 0;
    pub const BASIC: i64 = 1;
    pub const DIGEST: i64 = 1 << 1;
    pub const NEGOTIATE: i64 = 1 << 2;
    pub const NTLM: i64 = 1 << 3;
    pub const DIGEST_IE: i64 = 1 << 4;
    pub const NTLM_WB: i64 = 1 << 5;
    pub const BEARER: i64 = 1 << 6;
    pub const AWS_SIGV4: i64 = 1 << 7;
    pub const ONLY: i64 = 1 << 31;
    pub const ANY: i64 = !DIGEST_IE;
    pub const ANYSAFE: i64 = !(BASIC | DIGEST_IE);
}

const AUTH_NAMES: &[(&str, i64)] = &[
    ("NONE", auth::NONE),
    ("BASIC", auth::BASIC),
    ("DIGEST", auth::DIGEST),
    ("NEGOTIATE", auth::NEGOTIATE),
    ("GSSNEGOTIATE", auth::NEGOTIATE),
    ("NTLM", auth::NTLM),
    ("DIGEST_IE", auth::DIGEST_IE),
    ("NTLM_WB", auth::NTLM_WB),
    ("BEARER", auth::BEARER),
    ("AWS_SIGV4", auth::AWS_SIGV4),
    ("ONLY", auth::ONLY),
    ("ANY", auth::ANY),
    ("ANYSAFE", auth::ANYSAFE),
];

/// Which family of constants a symbolic name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptionNamespace {
    #[default]
    Opt,
    Auth,
}

impl OptionNamespace {
    fn prefix(self) -> &'static str {
        match self {
            OptionNamespace::Opt => "CURLOPT_",
            OptionNamespace::Auth => "CURLAUTH_",
        }
    }

    /// Resolve a symbolic name such as `ssl_verifypeer` or
    /// `CURLOPT_SSL_VERIFYPEER`. Case-insensitive.
    pub fn resolve(self, name: &str) -> Option<OptionId> {
        let upper = name.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix(self.prefix()).unwrap_or(&upper);
        match self {
            OptionNamespace::Opt => OPT_NAMES
                .iter()
                .find(|(n, _)| *n == bare)
                .map(|(_, id)| *id),
            OptionNamespace::Auth => resolve_auth_scheme(bare).map(OptionId),
        }
    }
}

impl FromStr for OptionNamespace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opt" => Ok(OptionNamespace::Opt),
            "auth" => Ok(OptionNamespace::Auth),
            other => Err(Error::invalid(format!("unknown option namespace `{other}`"))),
        }
    }
}

/// Look up an auth-scheme bitmask by name (`any`, `basic`, `digest`, ...).
pub fn resolve_auth_scheme(name: &str) -> Option<i64> {
    let upper = name.trim().to_ascii_uppercase();
    let bare = upper.strip_prefix("CURLAUTH_").unwrap_or(&upper);
    AUTH_NAMES
        .iter()
        .find(|(n, _)| *n == bare)
        .map(|(_, mask)| *mask)
}

/// An option key as supplied by the caller: already numeric, or a name still
/// to be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionKey {
    Id(OptionId),
    Name(String),
}

impl OptionKey {
    /// Numeric strings are treated as raw identifiers.
    pub fn resolve(&self, namespace: OptionNamespace) -> Result<OptionId> {
        match self {
            OptionKey::Id(id) => Ok(*id),
            OptionKey::Name(name) => {
                if let Ok(raw) = name.trim().parse::<i64>() {
                    return Ok(OptionId(raw));
                }
                namespace.resolve(name).ok_or_else(|| {
                    Error::invalid(format!("unknown transport option `{name}`"))
                })
            }
        }
    }
}

impl From<OptionId> for OptionKey {
    fn from(id: OptionId) -> Self {
        OptionKey::Id(id)
    }
}

impl From<i64> for OptionKey {
    fn from(raw: i64) -> Self {
        OptionKey::Id(OptionId(raw))
    }
}

impl From<&str> for OptionKey {
    fn from(name: &str) -> Self {
        OptionKey::Name(name.to_string())
    }
}

impl From<String> for OptionKey {
    fn from(name: String) -> Self {
        OptionKey::Name(name)
    }
}

/// A transport option value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<String>),
}

impl OptionValue {
    /// Integers are truthy when non-zero, text when non-empty.
    pub fn as_bool(&self) -> bool {
        match self {
            OptionValue::Bool(b) => *b,
            OptionValue::Int(n) => *n != 0,
            OptionValue::Text(s) => !s.is_empty(),
            OptionValue::List(items) => !items.is_empty(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Bool(b) => Some(i64::from(*b)),
            OptionValue::Int(n) => Some(*n),
            OptionValue::Text(s) => s.trim().parse().ok(),
            OptionValue::List(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            OptionValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            OptionValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        OptionValue::Bool(b)
    }
}

impl From<i64> for OptionValue {
    fn from(n: i64) -> Self {
        OptionValue::Int(n)
    }
}

impl From<i32> for OptionValue {
    fn from(n: i32) -> Self {
        OptionValue::Int(i64::from(n))
    }
}

impl From<u32> for OptionValue {
    fn from(n: u32) -> Self {
        OptionValue::Int(i64::from(n))
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Text(s.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        OptionValue::Text(s)
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(items: Vec<String>) -> Self {
        OptionValue::List(items)
    }
}

/// The option bag handed to the transport. Later writes to a key replace
/// earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransportOptions {
    entries: BTreeMap<OptionId, OptionValue>,
}

impl TransportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: OptionId, value: impl Into<OptionValue>) {
        self.entries.insert(id, value.into());
    }

    /// Set `id` only if the caller has not already set it.
    pub fn set_default(&mut self, id: OptionId, value: impl Into<OptionValue>) {
        self.entries.entry(id).or_insert_with(|| value.into());
    }

    pub fn get(&self, id: OptionId) -> Option<&OptionValue> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: OptionId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn text(&self, id: OptionId) -> Option<&str> {
        self.get(id).and_then(OptionValue::as_text)
    }

    pub fn int(&self, id: OptionId) -> Option<i64> {
        self.get(id).and_then(OptionValue::as_int)
    }

    /// Unset flags read as `false`.
    pub fn flag(&self, id: OptionId) -> bool {
        self.get(id).is_some_and(OptionValue::as_bool)
    }

    pub fn list(&self, id: OptionId) -> Option<&[String]> {
        self.get(id).and_then(OptionValue::as_list)
    }

    pub fn remove(&mut self, id: OptionId) -> Option<OptionValue> {
        self.entries.remove(&id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (OptionId, &OptionValue)> {
        self.entries.iter().map(|(id, value)| (*id, value))
    }
}
