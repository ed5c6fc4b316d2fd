//! Plain-text report of the last execution.

use std::fmt;

use crate::transport::{Diagnostics, TransportFailure};

const RULE: &str = "=============================================";

/// Render the last response body, error (if any) and diagnostics.
///
/// Pure: no I/O, the caller decides where the text goes.
pub fn render(body: &[u8], error: Option<&TransportFailure>, diagnostics: &Diagnostics) -> String {
    Report {
        body,
        error,
        diagnostics,
    }
    .to_string()
}

/// Borrowed view over the outcome of one execution.
pub struct Report<'a> {
    pub body: &'a [u8],
    pub error: Option<&'a TransportFailure>,
    pub diagnostics: &'a Diagnostics,
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(f, "Response")?;
        writeln!(f, "{}", String::from_utf8_lossy(self.body))?;
        if let Some(error) = self.error {
            writeln!(f, "{RULE}")?;
            writeln!(f, "Errors")?;
            writeln!(f, "Code: {}", error.code)?;
            writeln!(f, "Message: {}", error.message)?;
        }
        writeln!(f, "{RULE}")?;
        writeln!(f, "Info")?;
        let info = serde_json::to_string_pretty(self.diagnostics).map_err(|_| fmt::Error)?;
        writeln!(f, "{info}")
    }
}
