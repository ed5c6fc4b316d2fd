//! HTTP method and request payload types.
//!
//! # Design
//! `RequestData` keeps the caller's payload as given: either key/value pairs
//! or an already-encoded string. Encoding happens once, at execution time,
//! with `application/x-www-form-urlencoded` rules (space becomes `+`).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};

/// Header sent with PUT/PATCH to name the intended verb.
pub const METHOD_OVERRIDE_HEADER: &str = "X-HTTP-Method-Override";

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Verbs sent POST-shaped that announce themselves with
    /// `X-HTTP-Method-Override`.
    pub fn override_header(self) -> Option<String> {
        match self {
            HttpMethod::Put | HttpMethod::Patch => {
                Some(format!("{METHOD_OVERRIDE_HEADER}: {}", self.as_str()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(Error::invalid(format!("unsupported HTTP method `{s}`"))),
        }
    }
}

/// Request payload: form pairs or a pre-encoded string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestData {
    Form(Vec<(String, String)>),
    Raw(String),
}

impl RequestData {
    pub fn is_empty(&self) -> bool {
        match self {
            RequestData::Form(pairs) => pairs.is_empty(),
            RequestData::Raw(s) => s.is_empty(),
        }
    }

    /// Form pairs are url-encoded and joined with `&`; raw strings pass
    /// through untouched.
    pub fn encode(&self) -> String {
        match self {
            RequestData::Form(pairs) => form_encode(pairs),
            RequestData::Raw(s) => s.clone(),
        }
    }
}

/// Encode pairs as `k=v&k2=v2` using form-urlencoding.
pub fn form_encode<K, V>(pairs: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
        .finish()
}

impl From<&str> for RequestData {
    fn from(s: &str) -> Self {
        RequestData::Raw(s.to_string())
    }
}

impl From<String> for RequestData {
    fn from(s: String) -> Self {
        RequestData::Raw(s)
    }
}

impl<K: Into<String>, V: Into<String>> From<Vec<(K, V)>> for RequestData {
    fn from(pairs: Vec<(K, V)>) -> Self {
        RequestData::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for RequestData {
    fn from(pairs: [(K, V); N]) -> Self {
        RequestData::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> From<BTreeMap<K, V>> for RequestData {
    fn from(map: BTreeMap<K, V>) -> Self {
        RequestData::Form(map.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>> From<HashMap<K, V>> for RequestData {
    fn from(map: HashMap<K, V>) -> Self {
        RequestData::Form(map.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
