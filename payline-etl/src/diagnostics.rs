//! Row-level diagnostics
//!
//! Every problem found while normalizing, validating or writing a row is
//! recorded as a [`RowIssue`] attached to the row's source line. Issues never
//! abort a run; the severity decides whether the row is rejected.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Row is rejected
    Error,
    /// Row is accepted, issue is reported
    Warning,
}

/// Issue taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Reference token did not resolve to a member, channel, category or project
    MappingError,
    /// Value could not be parsed (dates)
    FormatError,
    /// Required field missing or empty
    RequiredField,
    /// Enum value outside the kind's whitelist
    EnumValue,
    /// Designer allocation rule violated (sum, duplicate, bonus range)
    Allocation,
    /// Amount outside the advisory range
    RangeWarning,
    /// Store rejected the record
    PersistenceError,
}

impl IssueKind {
    pub fn severity(&self) -> Severity {
        match self {
            IssueKind::RangeWarning => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IssueKind::MappingError => "MappingError",
            IssueKind::FormatError => "FormatError",
            IssueKind::RequiredField => "RequiredField",
            IssueKind::EnumValue => "EnumValue",
            IssueKind::Allocation => "Allocation",
            IssueKind::RangeWarning => "RangeWarning",
            IssueKind::PersistenceError => "PersistenceError",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One problem found on one source row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowIssue {
    /// 1-based line in the source file (header is line 1)
    pub line: usize,
    pub field: String,
    pub kind: IssueKind,
    /// Offending source token, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub message: String,
}

impl RowIssue {
    pub fn new(line: usize, field: &str, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            line,
            field: field.to_string(),
            kind,
            token: None,
            message: message.into(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} [{}] {}: {}", self.line, self.kind, self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_range_warnings_are_non_blocking() {
        assert_eq!(IssueKind::RangeWarning.severity(), Severity::Warning);
        assert_eq!(IssueKind::MappingError.severity(), Severity::Error);
        assert_eq!(IssueKind::Allocation.severity(), Severity::Error);
    }

    #[test]
    fn test_display_names_line_and_field() {
        let issue = RowIssue::new(3, "channel", IssueKind::MappingError, "unknown channel '숨고비교'")
            .with_token("숨고비교");
        assert_eq!(
            issue.to_string(),
            "line 3 [MappingError] channel: unknown channel '숨고비교'"
        );
        assert_eq!(issue.token.as_deref(), Some("숨고비교"));
    }
}
