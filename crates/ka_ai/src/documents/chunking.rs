use ka_core::config::StructuredSourceRule;
use ka_core::domain::Chunk;
use ka_core::error::AppError;
use ka_core::normalize::normalize_text;

/// One chunk per blank-line-delimited paragraph; whitespace-only segments are dropped.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    normalize_text(text)
        .split("\n\n")
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect()
}

/// One chunk per record, where every record begins with `marker`.
///
/// The marker stays at the start of its chunk. Text before the first marker is
/// discarded, so input without any marker yields no chunks at all.
pub fn split_records(text: &str, marker: &str) -> Vec<String> {
    if marker.is_empty() {
        return Vec::new();
    }
    let normalized = normalize_text(text);
    let starts: Vec<usize> = normalized.match_indices(marker).map(|(i, _)| i).collect();

    let mut out = Vec::with_capacity(starts.len());
    for (n, &start) in starts.iter().enumerate() {
        let end = starts.get(n + 1).copied().unwrap_or(normalized.len());
        let record = normalized[start..end].trim_end();
        out.push(record.to_string());
    }
    out
}

/// Fixed-size overlapping character windows for ad hoc uploaded text.
///
/// Windows are measured in chars, not bytes, and consecutive windows share
/// `overlap` chars. Whitespace-only windows are skipped.
pub fn split_windows(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, AppError> {
    if chunk_size == 0 || overlap >= chunk_size {
        return Err(AppError::new(
            "CONFIG_INVALID",
            "Window overlap must be smaller than a non-zero chunk size",
        )
        .with_details(format!("chunk_size={chunk_size}; overlap={overlap}")));
    }
    let chars: Vec<char> = normalize_text(text).chars().collect();
    let step = chunk_size - overlap;

    let mut out = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        if !window.trim().is_empty() {
            out.push(window);
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    Ok(out)
}

/// Split one file's text according to the rule matching its `source` label.
pub fn chunk_source_text(source: &str, text: &str, rules: &[StructuredSourceRule]) -> Vec<Chunk> {
    let pieces = match rules.iter().find(|r| r.label == source) {
        Some(rule) => {
            let records = split_records(text, &rule.marker);
            if records.is_empty() && !text.trim().is_empty() {
                // Whole file is dropped; most likely the marker is wrong for this file.
                tracing::warn!(
                    source,
                    marker = %rule.marker,
                    "structured source has no record markers; no chunks produced"
                );
            }
            records
        }
        None => split_paragraphs(text),
    };
    pieces
        .into_iter()
        .map(|content| Chunk {
            source: source.to_string(),
            content,
        })
        .collect()
}
