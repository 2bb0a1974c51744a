use once_cell::sync::Lazy;
use regex::Regex;

pub const ID_PREFIX: &str = "#REQ-";
/// Allocation never goes below `ID_FLOOR + 1`.
pub const ID_FLOOR: u64 = 8904;
/// Suffixes above this are treated as garbage and ignored.
pub const ID_CEILING: u64 = 999_999;

static FIRST_INT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("first int regex"));

pub fn extract_first_int(text: &str) -> Option<u64> {
    FIRST_INT_RE
        .find(text)
        .and_then(|m| m.as_str().parse::<u64>().ok())
}

pub fn is_reasonable_id(value: u64) -> bool {
    (1..=ID_CEILING).contains(&value)
}

/// Next request id given the ids already allocated and an optional caller hint.
pub fn next_id<'a, I>(existing: I, hint: Option<&str>) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    next_id_above(existing, hint, ID_FLOOR)
}

/// Like [`next_id`], but never at or below `high_water`.
pub fn next_id_above<'a, I>(existing: I, hint: Option<&str>, high_water: u64) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let max_existing = existing
        .into_iter()
        .filter_map(extract_first_int)
        .filter(|v| is_reasonable_id(*v))
        .fold(high_water.max(ID_FLOOR), u64::max);
    let max_seen = hint
        .and_then(extract_first_int)
        .filter(|v| is_reasonable_id(*v))
        .map_or(max_existing, |v| v.max(max_existing));
    format!("{ID_PREFIX}{}", max_seen + 1)
}
