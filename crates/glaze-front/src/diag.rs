//! Diagnostic sink: prefixed, located messages with error and warning
//! counters.

use std::fmt::Write;

use glaze_hir::Loc;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    fn prefix(self) -> &'static str {
        match self {
            Self::Error => "ERROR: ",
            Self::Warning => "WARNING: ",
        }
    }
}

/// Accumulates the info log for one compilation.
///
/// Messages render as `ERROR: 0:5 'token' : reason extra`, one per
/// line, in emission (source) order.
#[derive(Clone, Debug, Default)]
pub struct InfoSink {
    buffer: String,
    errors: u32,
    warnings: u32,
    suppress_warnings: bool,
}

impl InfoSink {
    pub fn new(suppress_warnings: bool) -> Self {
        Self {
            suppress_warnings,
            ..Self::default()
        }
    }

    pub fn message(&mut self, severity: Severity, loc: Loc, token: &str, reason: &str, extra: &str) {
        match severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => {
                if self.suppress_warnings {
                    return;
                }
                self.warnings += 1;
            }
        }
        self.buffer.push_str(severity.prefix());
        let _ = write!(self.buffer, "{loc} '{token}' : {reason}");
        if !extra.is_empty() {
            self.buffer.push(' ');
            self.buffer.push_str(extra);
        }
        self.buffer.push('\n');
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn error_count(&self) -> u32 {
        self.errors
    }

    pub fn warning_count(&self) -> u32 {
        self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_format() {
        let mut sink = InfoSink::new(false);
        sink.message(
            Severity::Error,
            Loc::new(0, 5),
            "[",
            "",
            "array index out of range '3'",
        );
        assert_eq!(sink.text(), "ERROR: 0:5 '[' :  array index out of range '3'\n");
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn warnings_can_be_suppressed() {
        let mut sink = InfoSink::new(true);
        sink.message(Severity::Warning, Loc::default(), "", "unused", "");
        assert_eq!(sink.warning_count(), 0);
        assert!(sink.text().is_empty());

        let mut sink = InfoSink::new(false);
        sink.message(Severity::Warning, Loc::default(), "", "unused", "");
        assert_eq!(sink.warning_count(), 1);
        assert!(sink.text().starts_with("WARNING: "));
    }
}
