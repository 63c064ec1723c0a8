//! Fuzzy string scoring on a 0..=100 scale.
//!
//! Similarity is Levenshtein over characters (not bytes), so Cyrillic text
//! scores the same way Latin text does. Window scans work on `&[char]`
//! slices and skip windows whose character overlap already rules them out.

use std::collections::HashMap;

use strsim::{generic_levenshtein, normalized_levenshtein};

/// Full-string similarity, 0..=100.
pub fn ratio(a: &str, b: &str) -> u8 {
    if a.is_empty() && b.is_empty() {
        return 100;
    }
    to_score(normalized_levenshtein(a, b))
}

/// Best similarity of the shorter string against every equally long window
/// of the longer one, 0..=100.
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    best_window_score(short, long, 0)
}

/// Score of `needle` occurring (approximately) inside `haystack`.
///
/// Unlike `partial_ratio`, a haystack shorter than the needle scores 0, so a
/// two-letter message never "contains" a ten-letter keyword.
pub fn containment_score(needle: &str, haystack: &str) -> u8 {
    let needle: Vec<char> = needle.chars().collect();
    let haystack: Vec<char> = haystack.chars().collect();
    best_window_score(&needle, &haystack, 0)
}

/// Best score of `needle` against the windows of `haystack`.
///
/// Scores at or above `min_score` are exact. Anything lower may be reported
/// as a smaller value, since hopeless windows are never edit-scored.
pub fn best_window_score(needle: &[char], haystack: &[char], min_score: u8) -> u8 {
    scan_windows(needle, haystack, min_score).0
}

/// Returns the best score and how many windows needed a Levenshtein pass.
fn scan_windows(needle: &[char], haystack: &[char], min_score: u8) -> (u8, usize) {
    let n = needle.len();
    if n == 0 || haystack.len() < n {
        return (0, 0);
    }

    let mut overlap = Overlap::new(needle);
    for &c in &haystack[..n] {
        overlap.push(c);
    }

    let mut best = 0u8;
    let mut evaluated = 0usize;
    for start in 0..=haystack.len() - n {
        if start > 0 {
            overlap.pop(haystack[start - 1]);
            overlap.push(haystack[start + n - 1]);
        }

        // Equal lengths: distance >= n - overlap.
        let bound = to_score(overlap.common as f64 / n as f64);
        if bound < min_score || bound <= best {
            continue;
        }

        evaluated += 1;
        let window = &haystack[start..start + n];
        let distance = generic_levenshtein(&Chars(needle), &Chars(window));
        let score = to_score(1.0 - distance as f64 / n as f64);
        if score > best {
            best = score;
            if best == 100 {
                break;
            }
        }
    }
    (best, evaluated)
}

/// Multiset intersection between the needle and a sliding window.
struct Overlap {
    wanted: HashMap<char, usize>,
    seen: HashMap<char, usize>,
    common: usize,
}

impl Overlap {
    fn new(needle: &[char]) -> Self {
        let mut wanted = HashMap::new();
        for &c in needle {
            *wanted.entry(c).or_insert(0) += 1;
        }
        Self {
            seen: HashMap::with_capacity(wanted.len()),
            wanted,
            common: 0,
        }
    }

    fn push(&mut self, c: char) {
        let Some(&wanted) = self.wanted.get(&c) else {
            return;
        };
        let seen = self.seen.entry(c).or_insert(0);
        if *seen < wanted {
            self.common += 1;
        }
        *seen += 1;
    }

    fn pop(&mut self, c: char) {
        let Some(&wanted) = self.wanted.get(&c) else {
            return;
        };
        if let Some(seen) = self.seen.get_mut(&c) {
            *seen -= 1;
            if *seen < wanted {
                self.common -= 1;
            }
        }
    }
}

struct Chars<'a>(&'a [char]);

impl<'a, 'b> IntoIterator for &'b Chars<'a> {
    type Item = &'a char;
    type IntoIter = std::slice::Iter<'a, char>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn to_score(similarity: f64) -> u8 {
    (similarity.clamp(0.0, 1.0) * 100.0).round() as u8
}
