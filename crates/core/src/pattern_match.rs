//! SQL LIKE pattern matching.
//!
//! `%` matches zero or more characters and `_` matches exactly one.
//! Matching is case-sensitive and operates on Unicode scalar values.

/// SQL LIKE pattern matching.
///
/// ```
/// use quarry_core::pattern_match::like;
/// assert!(like("hello", "h%o"));
/// assert!(like("hello", "_ello"));
/// assert!(!like("hello", "world"));
/// ```
pub fn like(value: &str, pattern: &str) -> bool {
    let v: Vec<char> = value.chars().collect();
    let p: Vec<char> = pattern.chars().collect();

    let (mut vi, mut pi) = (0usize, 0usize);
    // Position of the last `%` seen and the value index it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while vi < v.len() {
        match p.get(pi) {
            Some('%') => {
                backtrack = Some((pi, vi));
                pi += 1;
            }
            Some('_') => {
                vi += 1;
                pi += 1;
            }
            Some(&ch) if ch == v[vi] => {
                vi += 1;
                pi += 1;
            }
            _ => match backtrack {
                Some((star_pi, star_vi)) => {
                    pi = star_pi + 1;
                    vi = star_vi + 1;
                    backtrack = Some((star_pi, star_vi + 1));
                }
                None => return false,
            },
        }
    }

    p[pi..].iter().all(|&c| c == '%')
}

/// Returns true when `needle` occurs anywhere in `value`.
#[inline]
pub fn contains(value: &str, needle: &str) -> bool {
    value.contains(needle)
}
