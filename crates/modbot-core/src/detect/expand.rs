//! Expansion of regex alternation groups into literal variants.
//!
//! `зараб(отай|атывать)` -> `["заработай", "зарабатывать"]`. Nested groups and
//! non-capturing `(?:...)` groups are supported; a top-level `a|b` expands to
//! both sides. Anchors are dropped, escapes yield the escaped character, every
//! other character is copied literally.

/// Upper bound on variants produced for one pattern.
pub const MAX_VARIANTS: usize = 1024;

/// Cartesian product of all alternation groups in `pattern`, in declaration
/// order. A pattern without groups expands to itself.
pub fn expand_pattern(pattern: &str) -> Vec<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut pos = 0usize;
    let mut out = parse_alternation(&chars, &mut pos);

    // Stray `)` at top level: keep it literal and continue.
    while pos < chars.len() {
        pos += 1;
        let rest = parse_alternation(&chars, &mut pos);
        out = product(&out, &[")".to_string()]);
        out = product(&out, &rest);
    }

    if out.len() > MAX_VARIANTS {
        tracing::warn!(
            pattern,
            variants = out.len(),
            "pattern expansion truncated to {MAX_VARIANTS} variants"
        );
        out.truncate(MAX_VARIANTS);
    }
    out
}

/// Parse `alt ('|' alt)*` until an unmatched `)` or end of input.
fn parse_alternation(chars: &[char], pos: &mut usize) -> Vec<String> {
    let mut alternatives = parse_sequence(chars, pos);
    while *pos < chars.len() && chars[*pos] == '|' {
        *pos += 1;
        let next = parse_sequence(chars, pos);
        alternatives.extend(next);
        if alternatives.len() > MAX_VARIANTS {
            alternatives.truncate(MAX_VARIANTS + 1);
        }
    }
    alternatives
}

fn parse_sequence(chars: &[char], pos: &mut usize) -> Vec<String> {
    let mut acc = vec![String::new()];
    let mut literal = String::new();

    while *pos < chars.len() {
        match chars[*pos] {
            '|' | ')' => break,
            '(' => {
                *pos += 1;
                if chars.get(*pos) == Some(&'?') && chars.get(*pos + 1) == Some(&':') {
                    *pos += 2;
                }
                let group = parse_alternation(chars, pos);
                if chars.get(*pos) == Some(&')') {
                    *pos += 1;
                }
                acc = product(&acc, &[std::mem::take(&mut literal)]);
                acc = product(&acc, &group);
            }
            '\\' => {
                *pos += 1;
                if let Some(&c) = chars.get(*pos) {
                    literal.push(c);
                    *pos += 1;
                }
            }
            '^' | '$' => {
                *pos += 1;
            }
            c => {
                literal.push(c);
                *pos += 1;
            }
        }
    }

    product(&acc, &[literal])
}

fn product(left: &[String], right: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(left.len().saturating_mul(right.len()).min(MAX_VARIANTS + 1));
    'outer: for l in left {
        for r in right {
            out.push(format!("{l}{r}"));
            if out.len() > MAX_VARIANTS {
                break 'outer;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_single_group() {
        assert_eq!(
            expand_pattern("зараб(отай|атывать)"),
            vec!["заработай".to_string(), "зарабатывать".to_string()]
        );
    }

    #[test]
    fn count_is_product_of_alternatives() {
        let variants = expand_pattern("(a|b)x(c|d|e)");
        assert_eq!(variants.len(), 2 * 3);
        assert_eq!(variants[0], "axc");
        assert_eq!(variants[5], "bxe");
    }

    #[test]
    fn plain_pattern_expands_to_itself() {
        assert_eq!(expand_pattern("спам"), vec!["спам".to_string()]);
    }

    #[test]
    fn nested_and_non_capturing_groups() {
        let variants = expand_pattern("(?:ту(пой|пица)|дурак)");
        assert_eq!(variants, vec!["тупой", "тупица", "дурак"]);
    }

    #[test]
    fn escapes_and_anchors_are_simplified() {
        assert_eq!(expand_pattern(r"^t\.me$"), vec!["t.me".to_string()]);
    }

    #[test]
    fn expansion_is_capped() {
        let pattern = "(a|b)".repeat(12);
        assert_eq!(expand_pattern(&pattern).len(), MAX_VARIANTS);
    }
}
