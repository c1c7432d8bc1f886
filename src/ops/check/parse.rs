//! Parsing of compiler diagnostic lines.
//!
//! Recognized shapes:
//!
//! ```text
//! src/owner/owner.entity.ts(12,5): error TS2322: Type 'string' is not assignable to type 'number'.
//! src/owner/owner.entity.ts:12:5 - error TS2322: Type 'string' is not assignable to type 'number'.
//! error TS5058: The specified path does not exist: 'tsconfig.json'.
//! ```
//!
//! The second form is what `tsc --pretty` prints.

use std::sync::LazyLock;

use regex::Regex;

use crate::ops::validate::{ErrorCode, Stage, ValidationError};

static LOCATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<file>.+?)\((?P<loc>[^)]*)\):\s*error\s+(?P<rest>.*)$").expect("valid regex")
});

static PRETTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<file>.+?):(?P<line>\d+):(?P<col>\d+)\s+-\s+error\s+(?P<rest>.*)$")
        .expect("valid regex")
});

static GLOBAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^error\s+(?P<rest>TS\d+:.*)$").expect("valid regex"));

/// Parse one line of compiler output.
///
/// Returns `None` for lines that aren't diagnostics. A diagnostic whose
/// position can't be parsed becomes a `PARSE_ERROR` carrying the raw line.
pub fn parse_diagnostic_line(line: &str) -> Option<ValidationError> {
    let line = line.trim_end();
    if !line.contains("error TS") {
        return None;
    }

    if let Some(caps) = LOCATED.captures(line) {
        let file = caps["file"].trim();
        let (code, message) = split_code(&caps["rest"]);

        let error = match parse_location(&caps["loc"]) {
            Some((line_no, column)) => {
                ValidationError::new(Stage::Compile, code, message).with_location(file, line_no, column)
            }
            None => raw_line(line),
        };
        return Some(error);
    }

    if let Some(caps) = PRETTY.captures(line) {
        let (code, message) = split_code(&caps["rest"]);
        let location = caps["line"]
            .parse::<u32>()
            .ok()
            .zip(caps["col"].parse::<u32>().ok());
        let error = match location {
            Some((line_no, column)) => ValidationError::new(Stage::Compile, code, message)
                .with_location(caps["file"].trim(), line_no, column),
            None => raw_line(line),
        };
        return Some(error);
    }

    if let Some(caps) = GLOBAL.captures(line.trim_start()) {
        let (code, message) = split_code(&caps["rest"]);
        return Some(ValidationError::new(Stage::Compile, code, message));
    }

    None
}

/// `"12,5"` -> `(12, 5)`; an empty location means "no position".
fn parse_location(loc: &str) -> Option<(u32, u32)> {
    let loc = loc.trim();
    if loc.is_empty() {
        return Some((0, 0));
    }
    let (line, column) = loc.split_once(',')?;
    Some((line.trim().parse().ok()?, column.trim().parse().ok()?))
}

/// `"TS2322: message"` -> (`TS2322`, `message`).
fn split_code(rest: &str) -> (ErrorCode, String) {
    match rest.split_once(':') {
        Some((code, message)) if code.starts_with("TS") => (
            ErrorCode::Compiler(code.trim().to_string()),
            message.trim().to_string(),
        ),
        _ => (ErrorCode::Error, rest.trim().to_string()),
    }
}

fn raw_line(line: &str) -> ValidationError {
    ValidationError::new(Stage::Compile, ErrorCode::ParseError, line)
}
