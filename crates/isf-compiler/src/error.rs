use thiserror::Error;

/// Fatal compilation failures. Anything recoverable is reported as a
/// [`Warning`](crate::Warning) on the output instead.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("ISF header is not valid JSON: {0}")]
    Header(#[source] serde_json::Error),

    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl CompileError {
    pub(crate) fn syntax(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            column,
            message: message.into(),
        }
    }
}
