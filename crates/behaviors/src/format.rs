use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;

/// Display formatting applied to audit values of date, date-time and
/// currency attributes. Values that do not parse are returned unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueFormatter {
    pub date_format: String,
    pub datetime_format: String,
    pub currency_symbol: String,
    pub decimals: usize,
    pub thousands_separator: String,
    pub decimal_separator: String,
}

impl Default for ValueFormatter {
    fn default() -> Self {
        Self {
            date_format: "%b %-d, %Y".into(),
            datetime_format: "%b %-d, %Y, %-I:%M:%S %p".into(),
            currency_symbol: "$".into(),
            decimals: 2,
            thousands_separator: ",".into(),
            decimal_separator: ".".into(),
        }
    }
}

impl ValueFormatter {
    pub fn format_date(&self, raw: &str) -> String {
        match parse_date(raw) {
            Some(date) => date.format(&self.date_format).to_string(),
            None => raw.to_string(),
        }
    }

    pub fn format_datetime(&self, raw: &str) -> String {
        match parse_datetime(raw) {
            Some(datetime) => datetime.format(&self.datetime_format).to_string(),
            None => raw.to_string(),
        }
    }

    pub fn format_currency(&self, raw: &str) -> String {
        let Ok(amount) = raw.trim().parse::<f64>() else {
            return raw.to_string();
        };
        if !amount.is_finite() {
            return raw.to_string();
        }

        let fixed = format!("{:.*}", self.decimals, amount.abs());
        let (int_part, frac_part) = match fixed.split_once('.') {
            Some((int_part, frac_part)) => (int_part, Some(frac_part)),
            None => (fixed.as_str(), None),
        };

        let digits: Vec<char> = int_part.chars().collect();
        let mut grouped = String::with_capacity(fixed.len() + digits.len() / 3);
        for (i, digit) in digits.iter().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push_str(&self.thousands_separator);
            }
            grouped.push(*digit);
        }
        if let Some(frac_part) = frac_part {
            grouped.push_str(&self.decimal_separator);
            grouped.push_str(frac_part);
        }

        let sign = if amount < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0') {
            "-"
        } else {
            ""
        };
        format!("{sign}{}{grouped}", self.currency_symbol)
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_datetime(raw).map(|datetime| datetime.date()))
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Some(datetime.naive_local());
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn block_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<\s*/?\s*(br|p|div|li|tr|td|h[1-6])\b[^>]*>").expect("valid regex")
    })
}

fn any_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Reduces rich text to comparable plain text: tags removed (block tags
/// become spaces), common entities decoded, whitespace collapsed.
pub fn strip_html(raw: &str) -> String {
    let text = block_tag_re().replace_all(raw, " ");
    let text = any_tag_re().replace_all(&text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    whitespace_re().replace_all(&text, " ").trim().to_string()
}

#[cfg(test)]
#[path = "tests/format_tests.rs"]
mod tests;
