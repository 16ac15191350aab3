//! Defensive parsing of model output.

use super::prompts::CALCULATION_DELIMITER;

/// `true` only for a clean YES (case-insensitive, surrounding whitespace and
/// trailing punctuation ignored). Anything else counts as NO.
pub fn parse_yes_no(raw: &str) -> bool {
    let cleaned = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '!' || c == '*')
        .trim();
    cleaned.eq_ignore_ascii_case("yes")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculationOutput {
    pub result: String,
    pub reasoning: Option<String>,
}

/// Split calculator output at the first `Reasoning:` (case-insensitive).
///
/// Without the delimiter the whole trimmed text becomes the result and there is
/// no reasoning.
pub fn split_calculation(raw: &str) -> CalculationOutput {
    let lower = raw.to_ascii_lowercase();
    let needle = CALCULATION_DELIMITER.to_ascii_lowercase();
    match lower.find(&needle) {
        Some(pos) => {
            let result = clean_result(&raw[..pos]);
            let reasoning = raw[pos + needle.len()..].trim().to_string();
            CalculationOutput {
                result: if result.is_empty() { raw.trim().to_string() } else { result },
                reasoning: Some(reasoning).filter(|r| !r.is_empty()),
            }
        }
        None => CalculationOutput {
            result: raw.trim().to_string(),
            reasoning: None,
        },
    }
}

fn clean_result(s: &str) -> String {
    let t = s.trim();
    let lower = t.to_ascii_lowercase();
    let t = ["result:", "answer:"]
        .iter()
        .find(|p| lower.starts_with(*p))
        .map(|p| t[p.len()..].trim())
        .unwrap_or(t);
    t.to_string()
}

/// Strip quotes, trailing punctuation and any leading "term:" label from an
/// extracted term; only the first line is used.
pub fn clean_term(raw: &str) -> String {
    let first = raw.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    let lower = first.to_ascii_lowercase();
    let unlabeled = if lower.starts_with("term:") { &first[5..] } else { first };
    unlabeled
        .trim()
        .trim_matches(|c: char| {
            matches!(c, '"' | '\'' | '`' | '*' | '.' | ',' | ':' | ';' | '?' | '!')
        })
        .trim()
        .to_string()
}

/// Keyword guard for the definition branch.
pub fn is_definition_query(query: &str) -> bool {
    let q = query.to_lowercase();
    q.contains("define") || q.contains("definition")
}
