//! `_count` / `_offset` handling shared by search and history.

use crate::{config::FhirConfig, Error, Result};

pub const COUNT: &str = "_count";
pub const OFFSET: &str = "_offset";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub count: usize,
    pub offset: usize,
}

impl Paging {
    /// Read paging from request parameters. The last occurrence wins;
    /// `_count` above the configured maximum is clamped to it.
    pub fn from_params(params: &[(String, String)], config: &FhirConfig) -> Result<Self> {
        let mut count = config.default_count;
        let mut offset = 0;

        for (name, value) in params {
            match name.as_str() {
                COUNT => count = parse_non_negative(COUNT, value)?,
                OFFSET => offset = parse_non_negative(OFFSET, value)?,
                _ => {}
            }
        }

        Ok(Self {
            count: count.min(config.max_count),
            offset,
        })
    }
}

/// Parameters other than paging controls.
pub fn without_paging(params: &[(String, String)]) -> Vec<(String, String)> {
    params
        .iter()
        .filter(|(name, _)| name != COUNT && name != OFFSET)
        .cloned()
        .collect()
}

fn parse_non_negative(name: &str, value: &str) -> Result<usize> {
    value.trim().parse::<usize>().map_err(|_| {
        Error::Validation(format!(
            "{} must be a non-negative integer, got '{}'",
            name, value
        ))
    })
}

/// Decode an `application/x-www-form-urlencoded` string into ordered pairs.
pub fn parse_form_urlencoded(s: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(s.as_bytes())
        .into_owned()
        .collect()
}
