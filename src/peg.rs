use std::fmt;

use crate::error::Error;

pub(crate) type PegError = ::peg::error::ParseError<::peg::str::LineCol>;

/// Grammar failure carrying the rejected input for caret-style rendering.
#[derive(Debug, Clone)]
pub struct ParseError {
    context: String,
    input: String,
    error: PegError,
}

impl ParseError {
    /// Return the input that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Return the byte offset where parsing failed.
    pub fn offset(&self) -> usize {
        self.error.location.offset
    }

    /// Return the tokens the grammar would have accepted at the failure point.
    pub fn expected(&self) -> String {
        self.error.expected.to_string()
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.input.is_empty() {
            return write!(f, "{}: empty string", self.context);
        }

        let loc = &self.error.location;
        let rendered = chic::Error::new(format!("parsing failure: {}", self.context))
            .error(
                loc.line,
                loc.offset,
                loc.offset + 1,
                &self.input,
                format!("Expected: {}", self.error.expected),
            )
            .to_string();
        let rendered = rendered.strip_prefix("error: ").unwrap_or(&rendered);
        write!(f, "{rendered}")
    }
}

/// Wrap a grammar failure with a description of what was being parsed.
pub(crate) fn peg_error<S1, S2>(context: S1, input: S2, error: PegError) -> Error
where
    S1: Into<String>,
    S2: Into<String>,
{
    Error::PegParse(ParseError {
        context: context.into(),
        input: input.into(),
        error,
    })
}
