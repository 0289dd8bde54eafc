//! Glob matching for index patterns and key scans.
//!
//! Patterns support `*` (any run of characters, including none) and `?`
//! (exactly one character). Characters are UTF-8 scalar values; a byte that
//! is not part of valid UTF-8 counts as one character.

/// Returns true if `key` matches `pattern`.
#[must_use]
pub fn matches(key: &[u8], pattern: &[u8]) -> bool {
    if pattern == b"*" {
        return true;
    }

    let (mut k, mut p) = (0usize, 0usize);
    // Resume point for the most recent `*`: (pattern index after it, key index).
    let mut star: Option<(usize, usize)> = None;

    while k < key.len() {
        if p < pattern.len() {
            match pattern[p] {
                b'*' => {
                    p += 1;
                    star = Some((p, k));
                    continue;
                }
                b'?' => {
                    k += char_len(&key[k..]);
                    p += 1;
                    continue;
                }
                c if c == key[k] => {
                    k += 1;
                    p += 1;
                    continue;
                }
                _ => {}
            }
        }

        match star {
            Some((sp, sk)) => {
                let next = sk + char_len(&key[sk..]);
                star = Some((sp, next));
                p = sp;
                k = next;
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Returns true if `key` matches `pattern` after ASCII-lowercasing `key`.
///
/// `pattern` is expected to be lowercased already.
#[must_use]
pub fn matches_case_insensitive(key: &[u8], pattern: &[u8]) -> bool {
    if key.iter().any(u8::is_ascii_uppercase) {
        matches(&key.to_ascii_lowercase(), pattern)
    } else {
        matches(key, pattern)
    }
}

/// Returns true if `pattern` contains no wildcard.
#[must_use]
pub fn is_literal(pattern: &[u8]) -> bool {
    !pattern.iter().any(|&c| c == b'*' || c == b'?')
}

/// Derives the byte range every match of `pattern` falls in.
///
/// Returns `(min, max)` such that any matching key `k` satisfies
/// `min <= k` and, when `max` is `Some`, `k <= max`. Returns an empty
/// minimum and no maximum for patterns that start with `*`.
#[must_use]
pub fn bounds(pattern: &[u8]) -> (Vec<u8>, Option<Vec<u8>>) {
    if pattern.first().map_or(true, |&c| c == b'*') {
        return (Vec::new(), None);
    }

    let mut min = Vec::with_capacity(pattern.len());
    let mut max = Vec::with_capacity(pattern.len());
    let mut wild = false;
    for &c in pattern {
        match c {
            b'*' => {
                wild = true;
                break;
            }
            // 0xFF never occurs in UTF-8, so it bounds any character.
            b'?' => {
                min.push(0);
                max.push(0xFF);
            }
            _ => {
                min.push(c);
                max.push(c);
            }
        }
    }

    if !wild {
        return (min, Some(max));
    }

    // A trailing `*` allows any suffix: bump the last byte so every
    // extension of the prefix sorts below the bound.
    match max.last_mut() {
        Some(last) if *last < 0xFF => {
            *last += 1;
            (min, Some(max))
        }
        _ => (min, None),
    }
}

/// Length in bytes of the first character of `s` (at least one byte).
fn char_len(s: &[u8]) -> usize {
    let width = match s.first() {
        Some(b) if *b < 0x80 => 1,
        Some(b) if *b >> 5 == 0b110 => 2,
        Some(b) if *b >> 4 == 0b1110 => 3,
        Some(b) if *b >> 3 == 0b11110 => 4,
        _ => 1,
    };
    if width > 1 && std::str::from_utf8(s.get(..width).unwrap_or(s)).is_err() {
        return 1;
    }
    width.min(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn literal_patterns() {
        assert!(matches(b"user:1", b"user:1"));
        assert!(!matches(b"user:1", b"user:2"));
        assert!(!matches(b"user:1", b"user:"));
        assert!(matches(b"", b""));
    }

    #[test]
    fn star_matches_any_run() {
        assert!(matches(b"anything", b"*"));
        assert!(matches(b"", b"*"));
        assert!(matches(b"user:42:name", b"user:*"));
        assert!(matches(b"user:42:name", b"user:*:name"));
        assert!(!matches(b"user:42:age", b"user:*:name"));
        assert!(matches(b"aXbXc", b"*X*X*"));
        assert!(matches(b"abcabd", b"*abd"));
    }

    #[test]
    fn question_mark_matches_one_character() {
        assert!(matches(b"cat", b"c?t"));
        assert!(!matches(b"ct", b"c?t"));
        assert!(!matches(b"coat", b"c?t"));
        assert!(matches("c\u{e9}t".as_bytes(), b"c?t"));
        assert!(matches("\u{1f600}".as_bytes(), b"?"));
    }

    #[test]
    fn case_insensitive() {
        assert!(matches_case_insensitive(b"User:1", b"user:*"));
        assert!(!matches(b"User:1", b"user:*"));
    }

    #[test]
    fn bounds_for_prefix() {
        assert_eq!(bounds(b"user:*"), (b"user:".to_vec(), Some(b"user;".to_vec())));
        assert_eq!(bounds(b"abc"), (b"abc".to_vec(), Some(b"abc".to_vec())));
        assert_eq!(bounds(b"a?c"), (b"a\x00c".to_vec(), Some(b"a\xffc".to_vec())));
        assert_eq!(bounds(b"*suffix"), (Vec::new(), None));
        assert_eq!(bounds(b"a?*"), (b"a\x00".to_vec(), None));
        assert!(is_literal(b"abc"));
        assert!(!is_literal(b"a*"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn bounds_contain_every_match(
            key in "[a-c]{0,6}",
            pattern in "[a-c?*]{1,5}",
        ) {
            let key = key.as_bytes();
            let pattern = pattern.as_bytes();
            if matches(key, pattern) {
                let (min, max) = bounds(pattern);
                prop_assert!(key >= &min[..]);
                if let Some(max) = max {
                    prop_assert!(key <= &max[..]);
                }
            }
        }
    }
}
