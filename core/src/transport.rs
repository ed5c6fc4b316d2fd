//! The transport capability the builder drives.
//!
//! # Design
//! The builder never touches the network itself. A `Transport` hands out an
//! opaque handle, accepts the option bag in one batch, performs the blocking
//! exchange, and reports an error code, a message, and diagnostics. The shape
//! mirrors a libcurl easy handle so option identifiers carry over unchanged.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::options::TransportOptions;

/// Well-known diagnostic keys.
pub mod info {
    pub const EFFECTIVE_URL: &str = "url";
    pub const HTTP_CODE: &str = "http_code";
    pub const CONTENT_TYPE: &str = "content_type";
    pub const TOTAL_TIME: &str = "total_time";
    pub const SIZE_DOWNLOAD: &str = "size_download";
}

/// Numeric failure code plus message, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransportFailure {
    pub code: i64,
    pub message: String,
}

impl TransportFailure {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Transport-reported metadata about the last exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(BTreeMap<String, Value>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn http_code(&self) -> Option<u16> {
        self.get(info::HTTP_CODE)
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
    }

    pub fn effective_url(&self) -> Option<&str> {
        self.get(info::EFFECTIVE_URL).and_then(Value::as_str)
    }

    pub fn total_time(&self) -> Option<f64> {
        self.get(info::TOTAL_TIME).and_then(Value::as_f64)
    }
}

/// A blocking HTTP transport driven through an opaque handle.
///
/// `last_error_code`/`last_error_message` are only meaningful after
/// `perform` returned `None`.
pub trait Transport {
    type Handle;

    /// Fails with `Error::CapabilityUnavailable` when no handle can be made.
    fn create_handle(&self) -> Result<Self::Handle>;

    fn apply_options(&self, handle: &mut Self::Handle, options: &TransportOptions);

    /// Run the exchange. `None` means failure.
    fn perform(&self, handle: &mut Self::Handle) -> Option<Vec<u8>>;

    fn last_error_code(&self, handle: &Self::Handle) -> i64;

    fn last_error_message(&self, handle: &Self::Handle) -> String;

    fn diagnostics(&self, handle: &Self::Handle) -> Diagnostics;

    fn close_handle(&self, handle: Self::Handle);

    /// Whether the host forbids following redirects.
    fn restricted_mode(&self) -> bool {
        false
    }
}

/// In-memory transport for unit tests. Records every handle it sees.
#[cfg(test)]
pub(crate) mod scripted {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;
    use crate::error::Error;

    #[derive(Debug)]
    pub(crate) struct ScriptedHandle {
        pub(crate) id: usize,
        options: TransportOptions,
        outcome: Option<std::result::Result<Vec<u8>, TransportFailure>>,
    }

    #[derive(Debug, Default)]
    pub(crate) struct Log {
        pub(crate) created: usize,
        pub(crate) closed: Vec<usize>,
        pub(crate) applied: Vec<TransportOptions>,
    }

    #[derive(Debug, Clone, Default)]
    pub(crate) struct ScriptedTransport {
        pub(crate) log: Rc<RefCell<Log>>,
        pub(crate) outcomes: Rc<RefCell<VecDeque<std::result::Result<Vec<u8>, TransportFailure>>>>,
        pub(crate) unavailable: Rc<RefCell<bool>>,
        pub(crate) restricted: bool,
    }

    impl ScriptedTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn respond(&self, body: &str) -> &Self {
            self.outcomes
                .borrow_mut()
                .push_back(Ok(body.as_bytes().to_vec()));
            self
        }

        pub(crate) fn fail(&self, code: i64, message: &str) -> &Self {
            self.outcomes
                .borrow_mut()
                .push_back(Err(TransportFailure::new(code, message)));
            self
        }

        pub(crate) fn last_applied(&self) -> TransportOptions {
            self.log
                .borrow()
                .applied
                .last()
                .cloned()
                .expect("no options applied yet")
        }
    }

    impl Transport for ScriptedTransport {
        type Handle = ScriptedHandle;

        fn create_handle(&self) -> Result<ScriptedHandle> {
            if *self.unavailable.borrow() {
                return Err(Error::CapabilityUnavailable("scripted transport disabled".into()));
            }
            let mut log = self.log.borrow_mut();
            log.created += 1;
            Ok(ScriptedHandle {
                id: log.created,
                options: TransportOptions::new(),
                outcome: None,
            })
        }

        fn apply_options(&self, handle: &mut ScriptedHandle, options: &TransportOptions) {
            for (id, value) in options.iter() {
                handle.options.set(id, value.clone());
            }
            self.log.borrow_mut().applied.push(handle.options.clone());
        }

        fn perform(&self, handle: &mut ScriptedHandle) -> Option<Vec<u8>> {
            let outcome = self
                .outcomes
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()));
            handle.outcome = Some(outcome.clone());
            outcome.ok()
        }

        fn last_error_code(&self, handle: &ScriptedHandle) -> i64 {
            match &handle.outcome {
                Some(Err(failure)) => failure.code,
                _ => 0,
            }
        }

        fn last_error_message(&self, handle: &ScriptedHandle) -> String {
            match &handle.outcome {
                Some(Err(failure)) => failure.message.clone(),
                _ => String::new(),
            }
        }

        fn diagnostics(&self, handle: &ScriptedHandle) -> Diagnostics {
            let mut diagnostics = Diagnostics::new();
            if let Some(url) = handle.options.text(crate::options::OptionId::URL) {
                diagnostics.insert(info::EFFECTIVE_URL, url);
            }
            let code = match &handle.outcome {
                Some(Ok(_)) => 200,
                Some(Err(failure)) if failure.code == 22 => 404,
                _ => 0,
            };
            diagnostics.insert(info::HTTP_CODE, code);
            diagnostics
        }

        fn close_handle(&self, handle: ScriptedHandle) {
            self.log.borrow_mut().closed.push(handle.id);
        }

        fn restricted_mode(&self) -> bool {
            self.restricted
        }
    }
}
