//! Lucene query-string syntax → LogsQL (§4.3.3). A hand-rolled recursive-descent
//! parser over the same whitespace/quote tokenizer the rest of `query_lang` uses,
//! producing a small `Clause` AST before rendering LogsQL text.

use super::{trace_filters, wildcard_to_regex};
use crate::backend::TraceFilters;
use crate::error::CoreError;
use crate::query_lang::tokenizer::{tokenize, unquote};

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Term { field: Option<String>, value: String },
    Phrase { field: Option<String>, value: String },
    Wildcard { field: Option<String>, pattern: String },
    Fuzzy { field: Option<String>, value: String },
    Range { field: String, min: String, max: String },
    Not(Box<Clause>),
}

/// The exactly-3 boolean shapes the translator accepts; anything else (mixed
/// AND/OR, or other compositions) is `UnsupportedBoolean`.
#[derive(Debug, Clone, PartialEq)]
pub enum LuceneQuery {
    Single(Clause),
    AllAnd(Vec<Clause>),
    AllOr(Vec<Clause>),
}

const DEFAULT_FIELD: &str = "_msg";

fn split_field(token: &str) -> (Option<String>, &str) {
    if let Some(idx) = token.find(':') {
        // Guard against range tokens like `[1 TO 5]` that have no field.
        if idx > 0 && !token[..idx].contains(['[', '{']) {
            return (Some(token[..idx].to_string()), &token[idx + 1..]);
        }
    }
    (None, token)
}

fn parse_clause(raw: &str) -> Result<Clause, CoreError> {
    let negate = raw.starts_with('-') || raw.to_ascii_uppercase().starts_with("NOT ");
    let body = if raw.starts_with('-') {
        &raw[1..]
    } else if raw.to_ascii_uppercase().starts_with("NOT ") {
        raw[4..].trim()
    } else {
        raw
    };

    let (field, value_part) = split_field(body);

    let clause = if value_part.starts_with('[') || value_part.starts_with('{') {
        let inner = value_part.trim_start_matches(['[', '{']).trim_end_matches([']', '}']);
        let (min, max) = inner
            .split_once(" TO ")
            .ok_or_else(|| CoreError::parse(format!("malformed range `{value_part}`"), 0))?;
        Clause::Range {
            field: field.unwrap_or_else(|| DEFAULT_FIELD.to_string()),
            min: min.trim().to_string(),
            max: max.trim().to_string(),
        }
    } else if let Some(fuzzy_value) = value_part.strip_suffix(|c: char| c == '~') {
        Clause::Fuzzy {
            field,
            value: fuzzy_value.to_string(),
        }
    } else if value_part.contains('~') {
        let (val, _edit_distance) = value_part.split_once('~').unwrap();
        Clause::Fuzzy {
            field,
            value: val.to_string(),
        }
    } else if value_part.starts_with('"') {
        Clause::Phrase {
            field,
            value: unquote(value_part),
        }
    } else if value_part.contains('*') || value_part.contains('?') {
        Clause::Wildcard {
            field,
            pattern: value_part.to_string(),
        }
    } else {
        Clause::Term {
            field,
            value: value_part.to_string(),
        }
    };

    Ok(if negate { Clause::Not(Box::new(clause)) } else { clause })
}

pub fn parse(input: &str) -> Result<LuceneQuery, CoreError> {
    let tokens = tokenize(input);
    if tokens.is_empty() {
        return Err(CoreError::parse("empty lucene query", 0));
    }

    let mut clauses = Vec::new();
    let mut saw_and = false;
    let mut saw_or = false;
    let mut i = 0;
    while i < tokens.len() {
        let upper = tokens[i].to_uppercase();
        if upper == "AND" {
            saw_and = true;
            i += 1;
            continue;
        }
        if upper == "OR" {
            saw_or = true;
            i += 1;
            continue;
        }
        // `NOT term` spans two tokens; fold them into one clause string.
        if upper == "NOT" && i + 1 < tokens.len() {
            clauses.push(parse_clause(&format!("NOT {}", tokens[i + 1]))?);
            i += 2;
            continue;
        }
        clauses.push(parse_clause(&tokens[i])?);
        i += 1;
    }

    if saw_and && saw_or {
        return Err(CoreError::UnsupportedBoolean(
            "mixing AND and OR in one Lucene query is not supported".to_string(),
        ));
    }
    if clauses.len() == 1 {
        return Ok(LuceneQuery::Single(clauses.remove(0)));
    }
    if saw_or {
        return Ok(LuceneQuery::AllOr(clauses));
    }
    // Implicit juxtaposition (no explicit operator between clauses) is treated
    // as AND, same default Lucene itself uses.
    Ok(LuceneQuery::AllAnd(clauses))
}

fn render_clause(clause: &Clause) -> Result<String, CoreError> {
    match clause {
        Clause::Term { field, value } => {
            let field = field.as_deref().unwrap_or(DEFAULT_FIELD);
            Ok(format!("{field}:\"{value}\""))
        }
        Clause::Phrase { field, value } => {
            let field = field.as_deref().unwrap_or(DEFAULT_FIELD);
            Ok(format!("{field}:\"{value}\""))
        }
        Clause::Wildcard { field, pattern } => {
            let field = field.as_deref().unwrap_or(DEFAULT_FIELD);
            Ok(format!("{field}~\"{}\"", wildcard_to_regex(pattern)))
        }
        Clause::Fuzzy { .. } => Err(CoreError::UnsupportedOperator(
            "fuzzy search has no LogsQL equivalent".to_string(),
        )),
        Clause::Range { field, min, max } => Ok(format!("{field}:[{min},{max}]")),
        Clause::Not(inner) => Ok(format!("NOT ({})", render_clause(inner)?)),
    }
}

/// §4.3.3's `toLogsQL`.
pub fn to_logs_ql(query: &LuceneQuery) -> Result<String, CoreError> {
    match query {
        LuceneQuery::Single(c) => render_clause(c),
        LuceneQuery::AllAnd(cs) => cs
            .iter()
            .map(render_clause)
            .collect::<Result<Vec<_>, _>>()
            .map(|parts| parts.join(" AND ")),
        LuceneQuery::AllOr(cs) => cs
            .iter()
            .map(render_clause)
            .collect::<Result<Vec<_>, _>>()
            .map(|parts| parts.join(" OR ")),
    }
}

/// §4.3.3's `toTraceFilters` for the Lucene dialect.
pub fn to_trace_filters(query: &LuceneQuery) -> Result<TraceFilters, CoreError> {
    match query {
        LuceneQuery::Single(c) => trace_filters::to_trace_filters(c),
        LuceneQuery::AllAnd(cs) | LuceneQuery::AllOr(cs) => trace_filters::to_trace_filters_all(cs),
    }
}
