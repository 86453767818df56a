//! Edit-distance suggestions for "did you mean" hints.

/// Computes the Levenshtein edit distance between two byte slices.
fn levenshtein(a: &[u8], b: &[u8]) -> usize {
    let n = b.len();
    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0; n + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Maximum edit distance accepted for a suggestion of `input`.
fn max_distance(input: &str) -> usize {
    (input.len() / 2).clamp(1, 3)
}

/// Returns the closest candidate to `input`.
///
/// Comparison is case-insensitive so a candidate differing only by case is
/// always suggested. Exact matches are not suggestions and are skipped.
pub fn closest_match<'a, I>(input: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let input_lower = input.to_ascii_lowercase();
    let limit = max_distance(input);
    let mut best: Option<(&'a str, usize)> = None;

    for candidate in candidates {
        if candidate == input {
            continue;
        }
        let dist = levenshtein(input_lower.as_bytes(), candidate.to_ascii_lowercase().as_bytes());
        if dist <= limit && best.map_or(true, |(_, d)| dist < d) {
            best = Some((candidate, dist));
        }
    }

    best.map(|(s, _)| s)
}

/// Formats a "did you mean" hint for the closest candidate, if any.
pub fn did_you_mean<'a, I>(input: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    closest_match(input, candidates).map(|s| format!("did you mean '{}'?", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein(b"kitten", b"sitting"), 3);
        assert_eq!(levenshtein(b"", b"abc"), 3);
        assert_eq!(levenshtein(b"same", b"same"), 0);
    }

    #[test]
    fn test_closest_match_prefers_smallest_distance() {
        let candidates = ["Population", "Name", "Country"];
        assert_eq!(closest_match("Populaton", candidates), Some("Population"));
        assert_eq!(closest_match("name", candidates), Some("Name"));
        assert_eq!(closest_match("Zzzzzz", candidates), None);
    }

    #[test]
    fn test_did_you_mean() {
        let hint = did_you_mean("Nmae", ["Name", "City"]).unwrap();
        assert_eq!(hint, "did you mean 'Name'?");
    }
}
