use std::path::PathBuf;

/// Levenshtein distance, iterative with two rows.
///
/// Byte-based: good enough for matching provider titles against filenames.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a = a.as_bytes();
    let b = b.as_bytes();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;

        for (j, &cb) in b.iter().enumerate() {
            let deletion_cost = previous[j + 1] + 1;
            let insertion_cost = current[j] + 1;
            let substitution_cost = if ca == cb { previous[j] } else { previous[j] + 1 };

            current[j + 1] = deletion_cost.min(insertion_cost).min(substitution_cost);
        }

        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Carriage-return overwrite prefix for the single-line status display.
pub fn clear_term_line() -> String {
    format!("\r{}\r", " ".repeat(80))
}

/// Expands a leading `~` to `$HOME`.
pub fn expand_user(p: &str) -> PathBuf {
    if let Some(rest) = p.strip_prefix('~')
        && let Ok(home) = std::env::var("HOME")
    {
        return PathBuf::from(format!("{home}{rest}"));
    }
    PathBuf::from(p)
}

/// Absolute form of a path that may not exist yet (unlike `canonicalize`).
pub fn absolutize(p: &str) -> std::io::Result<PathBuf> {
    let p = expand_user(p);
    if p.is_absolute() {
        Ok(p)
    } else {
        Ok(std::env::current_dir()?.join(p))
    }
}
