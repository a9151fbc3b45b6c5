//! Stand-alone validation predicates over string values.

use regex::Regex;
use std::sync::LazyLock;

/// Minimum length for passwords checked by applications.
pub const MIN_PASS_LENGTH: usize = 6;
pub const MAX_PASS_LENGTH: usize = 15;
pub const MIN_USER_LENGTH: usize = 6;
pub const MAX_USER_LENGTH: usize = 15;

const IP: &str = r"(?:(?:25[0-5]|2[0-4][0-9]|(?:(?:1[0-9])?|[1-9]?)[0-9])\.){3}(?:25[0-5]|2[0-4][0-9]|(?:(?:1[0-9])?|[1-9]?)[0-9])";
const HOSTNAME: &str = r"(?:[a-z0-9][-a-z0-9]*\.)*(?:[a-z0-9][-a-z0-9]{0,62})\.(?:(?:[a-z]{2}\.)?[a-z]{2,4}|museum|travel)";
const URL_CHARS: &str = r#"(?:[!"$&'()*+,\-.@_:;=/0-9a-z]|%[0-9a-f]{2})"#;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in validation pattern")
}

static YEAR: LazyLock<Regex> = LazyLock::new(|| compile(r"^[12][0-9]{3}$"));
static NUMBER: LazyLock<Regex> = LazyLock::new(|| compile(r"^[-+]?\b[0-9]*\.?[0-9]+\b$"));
static DIGITS: LazyLock<Regex> = LazyLock::new(|| compile(r"^[0-9]+$"));
static ALPHA_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^[\p{Ll}\p{Lm}\p{Lo}\p{Lt}\p{Lu}\p{Nd}]+$"));
static USERNAME: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)^[a-z][a-z0-9\-.]+[a-z0-9]$"));
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)^[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+(?:[a-z]{2,4}|museum|travel)$",
    )
});
static IP_ONLY: LazyLock<Regex> = LazyLock::new(|| compile(&format!("^{IP}$")));
static HOSTNAME_ONLY: LazyLock<Regex> = LazyLock::new(|| compile(&format!("(?i)^{HOSTNAME}$")));
static URL_STRICT: LazyLock<Regex> = LazyLock::new(|| compile(&url_pattern(true)));
static URL_LOOSE: LazyLock<Regex> = LazyLock::new(|| compile(&url_pattern(false)));
static DATE_SHAPE: LazyLock<Regex> = LazyLock::new(|| compile(r"^([0-9]{1,4})-([0-9]{1,2})-([0-9]{1,2})$"));

fn url_pattern(strict: bool) -> String {
    format!(
        r"(?i)^(?:(?:https?|ftps?|file|news|gopher)://){scheme}(?:{IP}|{HOSTNAME})(?::[1-9][0-9]{{0,3}})?(?:/?|/{URL_CHARS}*)?(?:\?{URL_CHARS}*)?(?:#{URL_CHARS}*)?$",
        scheme = if strict { "" } else { "?" },
    )
}

pub fn equal(a: &str, b: &str) -> bool {
    a == b
}

/// Case-insensitive equality.
pub fn iequal(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Lengths count characters, not bytes.
pub fn min_length(value: &str, min: usize) -> bool {
    value.chars().count() >= min
}

pub fn max_length(value: &str, max: usize) -> bool {
    value.chars().count() <= max
}

pub fn length(value: &str, len: usize) -> bool {
    value.chars().count() == len
}

pub fn year(value: &str) -> bool {
    YEAR.is_match(value)
}

/// Starts with a letter, ends with a letter or digit, dots and dashes between.
pub fn username(value: &str) -> bool {
    USERNAME.is_match(value)
}

pub fn number(value: &str) -> bool {
    NUMBER.is_match(value)
}

pub fn digits(value: &str) -> bool {
    DIGITS.is_match(value)
}

/// Unicode letters and decimal digits only.
pub fn alpha_numeric(value: &str) -> bool {
    ALPHA_NUMERIC.is_match(value)
}

pub fn email(value: &str) -> bool {
    EMAIL.is_match(value)
}

/// With `strict` the scheme is mandatory.
pub fn url(value: &str, strict: bool) -> bool {
    if strict {
        URL_STRICT.is_match(value)
    } else {
        URL_LOOSE.is_match(value)
    }
}

/// Dotted-quad IPv4 address.
pub fn ip(value: &str) -> bool {
    IP_ONLY.is_match(value)
}

pub fn hostname(value: &str) -> bool {
    HOSTNAME_ONLY.is_match(value)
}

pub fn in_list<S: AsRef<str>>(value: &str, list: &[S]) -> bool {
    list.iter().any(|item| item.as_ref() == value)
}

/// `Y-M-D` naming a real calendar day (years 1 to 9999).
pub fn date(value: &str) -> bool {
    let Some(caps) = DATE_SHAPE.captures(value) else {
        return false;
    };
    let parse = |i: usize| caps[i].parse::<u32>().unwrap_or(0);
    let (y, m, d) = (parse(1), parse(2), parse(3));
    if y == 0 || !(1..=12).contains(&m) || d == 0 {
        return false;
    }
    d <= days_in_month(y, m)
}

fn days_in_month(year: u32, month: u32) -> u32 {
    match month {
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Empty strings and `"0"` count as empty.
pub fn not_empty(value: &str) -> bool {
    !value.is_empty() && value != "0"
}
