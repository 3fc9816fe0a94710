//! Closest-match suggestions for misspelled vocabulary values.

/// Closest candidate by edit distance, compared case-insensitively with
/// `-`/`_`/space treated alike. `None` when nothing is within half the
/// longer string's length.
pub(crate) fn suggest<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let needle = normalize(input);
    if needle.is_empty() {
        return None;
    }
    let (best, dist) = candidates
        .iter()
        .map(|&c| (c, levenshtein(&needle, &normalize(c))))
        .min_by_key(|&(_, d)| d)?;
    let max_len = needle.len().max(best.len());
    (dist <= max_len / 2).then_some(best)
}

fn normalize(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

/// Levenshtein edit distance between two strings.
pub(crate) fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
