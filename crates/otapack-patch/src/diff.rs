use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("malformed patch at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("patch does not apply at original line {line}: expected {expected:?}, found {found:?}")]
    ContextMismatch {
        line: usize,
        expected: String,
        found: Option<String>,
    },
    #[error("hunk extends past the end of the original text (original line {line})")]
    OutOfBounds { line: usize },
}

#[derive(Debug)]
enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

#[derive(Debug)]
struct Hunk {
    old_start: usize,
    old_count: usize,
    lines: Vec<HunkLine>,
    /// True when a `\ No newline at end of file` marker followed a line
    /// that survives into the output.
    strips_final_newline: bool,
}

/// Applies unified-diff `patch` to `original`, strictly: every context and
/// deletion line is verified against the original, and any mismatch fails
/// the whole application. No fuzz, no best effort.
pub fn apply_unified_diff(original: &str, patch: &str) -> Result<String, PatchError> {
    let hunks = parse_hunks(patch)?;
    if hunks.is_empty() {
        return Ok(original.to_string());
    }

    let original_has_trailing_newline = original.is_empty() || original.ends_with('\n');
    let old_lines = split_lines(original);

    let mut out: Vec<String> = Vec::new();
    let mut cursor = 0_usize;
    let mut strips_final_newline = false;

    for hunk in &hunks {
        // Pure-insertion hunks address the line they insert after; all
        // others are 1-based on their first affected line.
        let start = if hunk.old_count == 0 {
            hunk.old_start
        } else {
            hunk.old_start - 1
        };

        if start < cursor {
            return Err(PatchError::Malformed {
                line: hunk.old_start,
                reason: "hunks overlap or are out of order".to_string(),
            });
        }
        if start > old_lines.len() {
            return Err(PatchError::OutOfBounds { line: hunk.old_start });
        }

        out.extend(old_lines[cursor..start].iter().map(|line| line.to_string()));
        cursor = start;

        for line in &hunk.lines {
            match line {
                HunkLine::Context(expected) | HunkLine::Remove(expected) => {
                    let found = old_lines.get(cursor);
                    if found.map(|text| text.as_str()) != Some(expected.as_str()) {
                        if cursor >= old_lines.len() {
                            return Err(PatchError::OutOfBounds { line: cursor + 1 });
                        }
                        return Err(PatchError::ContextMismatch {
                            line: cursor + 1,
                            expected: expected.clone(),
                            found: found.cloned(),
                        });
                    }
                    if matches!(line, HunkLine::Context(_)) {
                        out.push(expected.clone());
                    }
                    cursor += 1;
                }
                HunkLine::Add(text) => out.push(text.clone()),
            }
        }

        strips_final_newline = hunk.strips_final_newline;
    }

    let touched_original_end = cursor >= old_lines.len();
    out.extend(old_lines[cursor.min(old_lines.len())..].iter().map(|line| line.to_string()));

    if out.is_empty() {
        return Ok(String::new());
    }

    let trailing_newline = if touched_original_end {
        !strips_final_newline
    } else {
        original_has_trailing_newline
    };

    let mut result = out.join("\n");
    if trailing_newline {
        result.push('\n');
    }
    Ok(result)
}

fn split_lines(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    if text.ends_with('\n') {
        lines.pop();
    }
    lines
}

fn parse_hunks(patch: &str) -> Result<Vec<Hunk>, PatchError> {
    let mut hunks: Vec<Hunk> = Vec::new();
    let mut current: Option<Hunk> = None;

    for (index, raw_line) in patch.lines().enumerate() {
        let line_number = index + 1;

        if raw_line.starts_with("@@") {
            if let Some(done) = current.take() {
                hunks.push(done);
            }
            current = Some(parse_hunk_header(raw_line, line_number)?);
            continue;
        }

        let Some(hunk) = current.as_mut() else {
            // Preamble: ---/+++ file headers and anything a diff tool emits
            // before the first hunk.
            continue;
        };

        if let Some(marker) = raw_line.strip_prefix('\\') {
            // "\ No newline at end of file". Only relevant when it follows
            // a line that ends up in the output.
            let _ = marker;
            if matches!(
                hunk.lines.last(),
                Some(HunkLine::Add(_)) | Some(HunkLine::Context(_))
            ) {
                hunk.strips_final_newline = true;
            }
            continue;
        }

        match raw_line.chars().next() {
            Some(' ') => hunk.lines.push(HunkLine::Context(raw_line[1..].to_string())),
            Some('-') => hunk.lines.push(HunkLine::Remove(raw_line[1..].to_string())),
            Some('+') => hunk.lines.push(HunkLine::Add(raw_line[1..].to_string())),
            // Some tools emit fully empty lines for empty context.
            None => hunk.lines.push(HunkLine::Context(String::new())),
            Some(_) => {
                return Err(PatchError::Malformed {
                    line: line_number,
                    reason: format!("unexpected hunk line: {raw_line}"),
                });
            }
        }
    }

    if let Some(done) = current.take() {
        hunks.push(done);
    }

    for hunk in &hunks {
        let old_seen = hunk
            .lines
            .iter()
            .filter(|line| matches!(line, HunkLine::Context(_) | HunkLine::Remove(_)))
            .count();
        if old_seen != hunk.old_count {
            return Err(PatchError::Malformed {
                line: hunk.old_start,
                reason: format!(
                    "hunk declares {} original lines but contains {}",
                    hunk.old_count, old_seen
                ),
            });
        }
    }

    Ok(hunks)
}

fn parse_hunk_header(header: &str, line_number: usize) -> Result<Hunk, PatchError> {
    let malformed = |reason: &str| PatchError::Malformed {
        line: line_number,
        reason: reason.to_string(),
    };

    // "@@ -old_start[,old_count] +new_start[,new_count] @@ ..."
    let body = header
        .strip_prefix("@@")
        .ok_or_else(|| malformed("missing hunk prefix"))?;
    let body = body
        .split("@@")
        .next()
        .ok_or_else(|| malformed("missing hunk suffix"))?
        .trim();

    let mut parts = body.split_whitespace();
    let old_range = parts
        .next()
        .and_then(|part| part.strip_prefix('-'))
        .ok_or_else(|| malformed("missing original range"))?;
    let new_range = parts
        .next()
        .and_then(|part| part.strip_prefix('+'))
        .ok_or_else(|| malformed("missing new range"))?;
    let _ = parse_range(new_range).map_err(|reason| malformed(&reason))?;
    let (old_start, old_count) = parse_range(old_range).map_err(|reason| malformed(&reason))?;

    if old_count > 0 && old_start == 0 {
        return Err(malformed("original range starts at line 0"));
    }

    Ok(Hunk {
        old_start,
        old_count,
        lines: Vec::new(),
        strips_final_newline: false,
    })
}

fn parse_range(range: &str) -> Result<(usize, usize), String> {
    let (start_text, count_text) = match range.split_once(',') {
        Some((start, count)) => (start, Some(count)),
        None => (range, None),
    };
    let start = start_text
        .parse::<usize>()
        .map_err(|_| format!("invalid range start: {range}"))?;
    let count = match count_text {
        Some(text) => text
            .parse::<usize>()
            .map_err(|_| format!("invalid range count: {range}"))?,
        None => 1,
    };
    Ok((start, count))
}
