//! Bleve query-string syntax → LogsQL (§4.3.3). Bleve's dialect marks clauses
//! with `+`/`-` prefixes (must/must-not) instead of Lucene's `AND`/`OR`/`NOT`
//! keywords; everything else — fields, phrases, wildcards, ranges — parses the
//! same way, so this module reuses `lucene::Clause` and only re-derives the
//! boolean-shape classification and clause splitting.

use super::{lucene, lucene::Clause, trace_filters};
use crate::backend::TraceFilters;
use crate::error::CoreError;
use crate::query_lang::tokenizer::tokenize;

#[derive(Debug, Clone, PartialEq)]
pub enum BleveQuery {
    Single(Clause),
    /// All clauses required (`+field:value +other:value`, or an all-`-`
    /// must-not query), Bleve's "must" shape.
    AllRequired(Vec<Clause>),
    /// All clauses optional (bare tokens), Bleve's "should" shape — at least one
    /// must match.
    AllOptional(Vec<Clause>),
}

fn strip_prefix(token: &str) -> (Option<char>, &str) {
    if let Some(rest) = token.strip_prefix('+') {
        (Some('+'), rest)
    } else if let Some(rest) = token.strip_prefix('-') {
        (Some('-'), rest)
    } else {
        (None, token)
    }
}

pub fn parse(input: &str) -> Result<BleveQuery, CoreError> {
    let tokens = tokenize(input);
    if tokens.is_empty() {
        return Err(CoreError::parse("empty bleve query", 0));
    }

    let mut required = Vec::new();
    let mut optional = Vec::new();
    let mut saw_plain = false;
    let mut saw_plus = false;
    let mut saw_minus = false;

    for token in &tokens {
        let (prefix, body) = strip_prefix(token);
        let clause = lucene::parse(body).and_then(|q| match q {
            lucene::LuceneQuery::Single(c) => Ok(c),
            _ => Err(CoreError::parse(format!("malformed bleve clause `{token}`"), 0)),
        })?;
        match prefix {
            Some('+') => {
                saw_plus = true;
                required.push(clause);
            }
            Some('-') => {
                // `-` always negates; it never counts toward the plain/plus
                // tally and only ever belongs in the must list.
                saw_minus = true;
                required.push(Clause::Not(Box::new(clause)));
            }
            None => {
                saw_plain = true;
                optional.push(clause);
            }
            _ => unreachable!("strip_prefix only ever returns Some('+'), Some('-'), or None"),
        }
    }

    if saw_plain && saw_plus {
        return Err(CoreError::UnsupportedBoolean(
            "mixing required (+) and optional clauses in one Bleve query is not supported".to_string(),
        ));
    }

    // `+` clauses, or a query made entirely of `-` clauses, are a must
    // composition (AND). A bare query (optionally with `-` clauses mixed in)
    // is a should composition (OR) over its plain terms.
    if saw_plus || (saw_minus && !saw_plain) {
        return Ok(single_or_many(required, BleveQuery::AllRequired));
    }
    Ok(single_or_many(optional, BleveQuery::AllOptional))
}

fn single_or_many(mut clauses: Vec<Clause>, wrap: impl Fn(Vec<Clause>) -> BleveQuery) -> BleveQuery {
    if clauses.len() == 1 {
        BleveQuery::Single(clauses.remove(0))
    } else {
        wrap(clauses)
    }
}

fn render_clause(clause: &Clause) -> Result<String, CoreError> {
    // Delegates to the same rendering rules as Lucene — the wire format is
    // identical once a clause is parsed, only the surface syntax differs.
    lucene::to_logs_ql(&lucene::LuceneQuery::Single(clause.clone()))
}

/// §4.3.3's `toLogsQL` for the Bleve dialect.
pub fn to_logs_ql(query: &BleveQuery) -> Result<String, CoreError> {
    match query {
        BleveQuery::Single(c) => render_clause(c),
        BleveQuery::AllRequired(cs) => cs
            .iter()
            .map(render_clause)
            .collect::<Result<Vec<_>, _>>()
            .map(|parts| parts.join(" AND ")),
        BleveQuery::AllOptional(cs) => cs
            .iter()
            .map(render_clause)
            .collect::<Result<Vec<_>, _>>()
            .map(|parts| parts.join(" OR ")),
    }
}

/// §4.3.3's `toTraceFilters` for the Bleve dialect.
pub fn to_trace_filters(query: &BleveQuery) -> Result<TraceFilters, CoreError> {
    match query {
        BleveQuery::Single(c) => trace_filters::to_trace_filters(c),
        BleveQuery::AllRequired(cs) | BleveQuery::AllOptional(cs) => trace_filters::to_trace_filters_all(cs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_plain_term() {
        let q = parse("level:error").unwrap();
        assert_eq!(to_logs_ql(&q).unwrap(), "level:\"error\"");
    }

    #[test]
    fn all_required_renders_as_and() {
        let q = parse("+level:error +service:checkout").unwrap();
        assert_eq!(to_logs_ql(&q).unwrap(), "level:\"error\" AND service:\"checkout\"");
    }

    #[test]
    fn all_optional_renders_as_or() {
        let q = parse("level:error service:checkout").unwrap();
        assert_eq!(to_logs_ql(&q).unwrap(), "level:\"error\" OR service:\"checkout\"");
    }

    #[test]
    fn mixing_required_and_optional_is_unsupported_boolean() {
        let err = parse("+level:error service:checkout").unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedBoolean(_)));
    }

    #[test]
    fn negated_clause_renders_not() {
        let q = parse("-level:debug").unwrap();
        assert_eq!(to_logs_ql(&q).unwrap(), "NOT (level:\"debug\")");
    }

    #[test]
    fn multiple_negated_clauses_compose_as_and() {
        let q = parse("-level:debug -service:billing").unwrap();
        assert!(matches!(q, BleveQuery::AllRequired(_)));
        assert_eq!(
            to_logs_ql(&q).unwrap(),
            "NOT (level:\"debug\") AND NOT (service:\"billing\")"
        );
    }
}
