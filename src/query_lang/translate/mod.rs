//! §4.3.3's translators: Lucene/Bleve query-string dialects into the platform's
//! native LogsQL and into `TraceFilters`. Each translator is self-contained so a
//! caller that already knows the dialect can skip detection.

pub mod bleve;
pub mod lucene;
pub mod trace_filters;

/// Cheap structural heuristics used when the caller hasn't declared a dialect
/// up front (e.g. a free-form search box). Order matters: Bleve's `+`/`-`
/// prefix syntax is checked first since a bare `+required` term would also
/// satisfy a naive Lucene check.
pub fn is_likely_bleve(input: &str) -> bool {
    input
        .split_whitespace()
        .any(|tok| tok.starts_with('+') || (tok.starts_with('-') && tok.len() > 1 && !tok[1..].contains(':')))
}

pub fn is_likely_lucene(input: &str) -> bool {
    let upper = input.to_ascii_uppercase();
    input.contains(':')
        || upper.contains(" AND ")
        || upper.contains(" OR ")
        || upper.contains(" NOT ")
        || input.contains('~')
        || (input.contains('[') && input.contains(" TO "))
}

/// Structural well-formedness check for a rendered LogsQL string: balanced
/// parens/brackets/quotes and no empty `field:` clause. Doesn't re-parse the
/// dialect it came from — just guards against a translator emitting garbage.
pub fn logsql_is_well_formed(query: &str) -> bool {
    if query.trim().is_empty() {
        return false;
    }
    let mut parens = 0i32;
    let mut brackets = 0i32;
    let mut in_quotes = false;
    for c in query.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => parens += 1,
            ')' if !in_quotes => {
                parens -= 1;
                if parens < 0 {
                    return false;
                }
            }
            '[' if !in_quotes => brackets += 1,
            ']' if !in_quotes => {
                brackets -= 1;
                if brackets < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    if in_quotes || parens != 0 || brackets != 0 {
        return false;
    }
    !query.contains(":\"\"") && !query.ends_with(':')
}

/// Escapes regex metacharacters other than `*`/`?`, which the wildcard rule
/// (§4.3.3) converts separately into `.*`/`.`.
pub(crate) fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_translation_escapes_and_substitutes() {
        assert_eq!(wildcard_to_regex("timeout*"), "timeout.*");
        assert_eq!(wildcard_to_regex("conn?ct"), "conn.ct");
        assert_eq!(wildcard_to_regex("a.b*"), "a\\.b.*");
    }

    #[test]
    fn dialect_heuristics() {
        assert!(is_likely_lucene("level:error AND service:checkout"));
        assert!(is_likely_bleve("+service:checkout -level:debug"));
        assert!(!is_likely_bleve("level:error AND service:checkout"));
    }

    #[test]
    fn well_formed_logsql_round_trips() {
        assert!(logsql_is_well_formed(r#"level:"error" AND service:"checkout""#));
        assert!(logsql_is_well_formed("duration:[100,500]"));
    }

    #[test]
    fn malformed_logsql_is_rejected() {
        assert!(!logsql_is_well_formed("level:(error AND service:checkout"));
        assert!(!logsql_is_well_formed("duration:[100,500"));
        assert!(!logsql_is_well_formed("level:"));
        assert!(!logsql_is_well_formed(""));
    }
}
