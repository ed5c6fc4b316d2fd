//! Fluent, curl-style HTTP request builder over a pluggable transport.
//!
//! # Overview
//! `RequestBuilder` accumulates one request (URL, method, payload, headers,
//! cookies, auth, proxy, TLS policy, timeout, raw transport options), runs it
//! once through a [`Transport`], and keeps the response, error and
//! diagnostics of that run for inspection.
//!
//! # Design
//! - The transport is a trait shaped like a libcurl easy handle; option
//!   identifiers follow curl's numbering.
//! - Setters validate eagerly and return `Result`; rejected input never
//!   changes builder state.
//! - Execution is blocking and single-shot. Configuration is cleared after
//!   each run, the handle is closed, and the next run acquires a new one.
//! - `UreqTransport` (feature `ureq-transport`, on by default) is the
//!   production transport.
//!
//! ```no_run
//! use curlkit_core::{RequestBuilder, UreqTransport};
//!
//! # fn main() -> curlkit_core::Result<()> {
//! let mut request = RequestBuilder::new(UreqTransport::new())?;
//! request
//!     .set_url("https://example.com/api")?
//!     .set_method("post")?
//!     .set_data([("title", "Buy milk")])?
//!     .add_header("Accept", "application/json");
//! let body = request.execute()?;
//! println!("{}", String::from_utf8_lossy(&body));
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod debug;
pub mod error;
pub mod http;
pub mod options;
pub mod transport;
#[cfg(feature = "ureq-transport")]
pub mod ureq_transport;

pub use builder::{RequestBuilder, TlsSettings};
pub use error::{Error, Result};
pub use http::{HttpMethod, RequestData};
pub use options::{OptionId, OptionKey, OptionNamespace, OptionValue, TransportOptions};
pub use transport::{Diagnostics, Transport, TransportFailure};
#[cfg(feature = "ureq-transport")]
pub use ureq_transport::UreqTransport;
