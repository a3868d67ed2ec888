//! Text canonicalization shared by every comparison step.

/// Lowercase, collapse every whitespace run (newlines included) to one space, and trim.
///
/// Pure and idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    for word in lowered.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Split raw text into normalized paragraphs.
///
/// Paragraph boundaries are one or more blank (whitespace-only) lines in the raw text, so
/// this must run on text that has not been normalized yet. Empty paragraphs are dropped.
pub fn paragraphs(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            flush_paragraph(&mut current, &mut out);
        } else {
            current.push(line);
        }
    }
    flush_paragraph(&mut current, &mut out);
    out
}

fn flush_paragraph(lines: &mut Vec<&str>, out: &mut Vec<String>) {
    if lines.is_empty() {
        return;
    }
    let paragraph = normalize(&lines.join("\n"));
    lines.clear();
    if !paragraph.is_empty() {
        out.push(paragraph);
    }
}
