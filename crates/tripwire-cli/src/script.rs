//! Outcome scripts for `tripwire simulate`.
//!
//! A script is a whitespace or comma separated list of tokens:
//!
//! | token    | meaning                                       |
//! |----------|-----------------------------------------------|
//! | `s`      | one successful call (`3s` for three)          |
//! | `f`      | one failed call (`4f` for four)               |
//! | `+<dur>` | advance the clock, e.g. `+500ms`, `+1m30s`    |
//! | `r`      | restart: export, persist and reimport state   |

use anyhow::{bail, Context, Result};
use std::fmt;
use std::time::Duration;

/// One parsed script token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Succeed(u32),
    Fail(u32),
    Advance(Duration),
    Restart,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Succeed(1) => write!(f, "s"),
            Step::Succeed(n) => write!(f, "{n}s"),
            Step::Fail(1) => write!(f, "f"),
            Step::Fail(n) => write!(f, "{n}f"),
            Step::Advance(by) => write!(f, "+{}", humantime::format_duration(*by)),
            Step::Restart => write!(f, "r"),
        }
    }
}

/// Parse a script into steps.
pub fn parse(script: &str) -> Result<Vec<Step>> {
    script
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(parse_token)
        .collect()
}

fn parse_token(token: &str) -> Result<Step> {
    if let Some(duration) = token.strip_prefix('+') {
        let by = humantime::parse_duration(duration)
            .with_context(|| format!("invalid duration in `{token}`"))?;
        return Ok(Step::Advance(by));
    }

    if token.eq_ignore_ascii_case("r") {
        return Ok(Step::Restart);
    }

    let split = token.char_indices().last().map_or(0, |(i, _)| i);
    let (count, kind) = token.split_at(split);
    let count = if count.is_empty() {
        1
    } else {
        count
            .parse::<u32>()
            .with_context(|| format!("invalid repeat count in `{token}`"))?
    };
    if count == 0 {
        bail!("repeat count must be at least 1 in `{token}`");
    }

    match kind {
        "s" | "S" => Ok(Step::Succeed(count)),
        "f" | "F" => Ok(Step::Fail(count)),
        _ => bail!("unknown script token `{token}` (expected s, f, r or +<duration>)"),
    }
}
