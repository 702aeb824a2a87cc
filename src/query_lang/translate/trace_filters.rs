//! §4.3.3's `toTraceFilters`: maps a parsed Lucene/Bleve clause onto the traces
//! backend's native filter shape. Field-key mapping is name-based: `service`
//! and `operation` go straight to their namesake fields, a `duration` range
//! becomes a min/max bound, `_time`/`time` becomes the window bound, and
//! `tag.X`/`span_attr.X` strip their prefix into the tag map. A clause with no
//! field (a bare term) or a negated clause has no trace-filter equivalent.

use std::time::Duration;

use super::lucene::Clause;
use crate::backend::TraceFilters;
use crate::error::CoreError;

fn apply_field_value(filters: &mut TraceFilters, field: Option<&str>, value: &str) -> Result<(), CoreError> {
    let field = field.ok_or_else(|| {
        CoreError::UnsupportedOperator("trace filter clause needs a field, got a bare term".to_string())
    })?;
    match field {
        "service" => filters.service = Some(value.to_string()),
        "operation" => filters.operation = Some(value.to_string()),
        f if f.starts_with("tag.") => {
            filters.tags.insert(f["tag.".len()..].to_string(), value.to_string());
        }
        f if f.starts_with("span_attr.") => {
            filters.tags.insert(f["span_attr.".len()..].to_string(), value.to_string());
        }
        other => {
            return Err(CoreError::UnsupportedOperator(format!(
                "field `{other}` has no trace filter mapping"
            )));
        }
    }
    Ok(())
}

fn apply_range(filters: &mut TraceFilters, field: &str, min: &str, max: &str) -> Result<(), CoreError> {
    match field {
        "duration" => {
            if let Ok(ms) = min.parse::<u64>() {
                filters.min_duration = Some(Duration::from_millis(ms));
            }
            if let Ok(ms) = max.parse::<u64>() {
                filters.max_duration = Some(Duration::from_millis(ms));
            }
            Ok(())
        }
        "_time" | "time" => {
            if let Ok(secs) = min.parse::<i64>() {
                filters.start = chrono::DateTime::from_timestamp(secs, 0);
            }
            if let Ok(secs) = max.parse::<i64>() {
                filters.end = chrono::DateTime::from_timestamp(secs, 0);
            }
            Ok(())
        }
        other => Err(CoreError::UnsupportedOperator(format!(
            "field `{other}` has no trace filter range mapping"
        ))),
    }
}

fn apply(filters: &mut TraceFilters, clause: &Clause) -> Result<(), CoreError> {
    match clause {
        Clause::Term { field, value } | Clause::Phrase { field, value } | Clause::Fuzzy { field, value } => {
            apply_field_value(filters, field.as_deref(), value)
        }
        Clause::Wildcard { field, pattern } => apply_field_value(filters, field.as_deref(), pattern),
        Clause::Range { field, min, max } => apply_range(filters, field, min, max),
        Clause::Not(_) => Err(CoreError::UnsupportedOperator(
            "negated clauses have no trace filter equivalent".to_string(),
        )),
    }
}

/// Lowers a single parsed clause into `TraceFilters`.
pub fn to_trace_filters(clause: &Clause) -> Result<TraceFilters, CoreError> {
    let mut filters = TraceFilters::default();
    apply(&mut filters, clause)?;
    Ok(filters)
}

/// Folds a clause list (the `AllAnd`/`AllOr`/`AllRequired`/`AllOptional` shapes)
/// into one `TraceFilters` — each clause sets whichever field it names, last
/// write wins on conflict, same as `lucene::to_logs_ql` folds them into one
/// LogsQL string regardless of the boolean operator joining them.
pub fn to_trace_filters_all(clauses: &[Clause]) -> Result<TraceFilters, CoreError> {
    let mut filters = TraceFilters::default();
    for clause in clauses {
        apply(&mut filters, clause)?;
    }
    Ok(filters)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(field: &str, value: &str) -> Clause {
        Clause::Term {
            field: Some(field.to_string()),
            value: value.to_string(),
        }
    }

    #[test]
    fn maps_service_and_operation() {
        let filters = to_trace_filters_all(&[term("service", "checkout"), term("operation", "charge")]).unwrap();
        assert_eq!(filters.service.as_deref(), Some("checkout"));
        assert_eq!(filters.operation.as_deref(), Some("charge"));
    }

    #[test]
    fn maps_duration_range_bounds() {
        let clause = Clause::Range {
            field: "duration".into(),
            min: "100".into(),
            max: "500".into(),
        };
        let filters = to_trace_filters(&clause).unwrap();
        assert_eq!(filters.min_duration, Some(Duration::from_millis(100)));
        assert_eq!(filters.max_duration, Some(Duration::from_millis(500)));
    }

    #[test]
    fn maps_tag_and_span_attr_prefixes() {
        let filters =
            to_trace_filters_all(&[term("tag.region", "us-east"), term("span_attr.http.status_code", "500")]).unwrap();
        assert_eq!(filters.tags.get("region").map(String::as_str), Some("us-east"));
        assert_eq!(filters.tags.get("http.status_code").map(String::as_str), Some("500"));
    }

    #[test]
    fn unmapped_field_is_unsupported_operator() {
        let err = to_trace_filters(&term("nonsense_field", "x")).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedOperator(_)));
    }

    #[test]
    fn negated_clause_has_no_trace_filter_mapping() {
        let err = to_trace_filters(&Clause::Not(Box::new(term("service", "checkout")))).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedOperator(_)));
    }

    #[test]
    fn bare_term_with_no_field_is_rejected() {
        let clause = Clause::Term { field: None, value: "timeout".into() };
        let err = to_trace_filters(&clause).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedOperator(_)));
    }

    #[test]
    fn lucene_and_bleve_queries_yield_non_empty_filters() {
        use crate::query_lang::translate::{bleve, lucene};

        let q = lucene::parse("service:checkout AND operation:charge").unwrap();
        let filters = lucene::to_trace_filters(&q).unwrap();
        assert_eq!(filters.service.as_deref(), Some("checkout"));
        assert_eq!(filters.operation.as_deref(), Some("charge"));

        let q = bleve::parse("+service:checkout +operation:charge").unwrap();
        let filters = bleve::to_trace_filters(&q).unwrap();
        assert_eq!(filters.service.as_deref(), Some("checkout"));
        assert_eq!(filters.operation.as_deref(), Some("charge"));
    }
}
