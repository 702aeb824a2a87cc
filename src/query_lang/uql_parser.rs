//! `UqlParser` — the richer grammar of §4.3.2: Select, Correlation, Aggregation,
//! and Join query kinds sharing one condition grammar. Kind detection happens up
//! front by scanning for each form's leading keyword, same dispatch shape the
//! teacher uses to route `promql.rs` vs `logsql` parsing from a single entry point.

use super::tokenizer::{parse_window, unquote, Cursor};
use crate::error::CoreError;
use crate::models::correlation::Engine;
use crate::models::uql::{
    AggFunc, AggregationQuery, Condition, ConditionClause, ConditionOp, ConditionValue,
    Conjunction, CorrelationExpr, DataSource, JoinQuery, SelectQuery, TimeOperator,
    UqlExpression, UqlQuery,
};

const CLAUSE_KEYWORDS: &[&str] = &["WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "JOIN", "ON", "WITHIN"];

fn is_clause_keyword(token: &str) -> bool {
    CLAUSE_KEYWORDS.contains(&token.to_uppercase().as_str())
}

fn parse_engine(token: &str) -> Result<Engine, CoreError> {
    match token.to_ascii_lowercase().as_str() {
        "logs" => Ok(Engine::Logs),
        "metrics" => Ok(Engine::Metrics),
        "traces" => Ok(Engine::Traces),
        other => Err(CoreError::validation("engine", format!("unknown engine prefix `{other}`"))),
    }
}

fn parse_data_source(cursor: &mut Cursor) -> Result<DataSource, CoreError> {
    let token = cursor
        .advance()
        .ok_or_else(|| CoreError::parse("expected `engine:query`", cursor.position()))?;
    let (engine_str, query) = token
        .split_once(':')
        .ok_or_else(|| CoreError::parse(format!("expected `engine:query`, found `{token}`"), cursor.position()))?;
    Ok(DataSource {
        engine: parse_engine(engine_str)?,
        query: query.to_string(),
    })
}

/// Collects tokens up to (but not including) the next clause keyword or end of
/// input, then splits the joined text on commas — handles both `a, b` and `a,b`.
fn collect_field_list(cursor: &mut Cursor) -> Vec<String> {
    let mut raw = Vec::new();
    while let Some(tok) = cursor.peek() {
        if is_clause_keyword(tok) {
            break;
        }
        raw.push(cursor.advance().unwrap());
    }
    raw.join(" ")
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_value(token: &str) -> ConditionValue {
    if (token.starts_with('"') && token.ends_with('"') && token.len() >= 2)
        || (token.starts_with('\'') && token.ends_with('\'') && token.len() >= 2)
    {
        return ConditionValue::String(unquote(token));
    }
    if let Ok(i) = token.parse::<i64>() {
        return ConditionValue::Integer(i);
    }
    if let Ok(f) = token.parse::<f64>() {
        return ConditionValue::Float(f);
    }
    match token.to_ascii_lowercase().as_str() {
        "true" => return ConditionValue::Bool(true),
        "false" => return ConditionValue::Bool(false),
        _ => {}
    }
    ConditionValue::String(token.to_string())
}

fn parse_op(token: &str) -> Option<ConditionOp> {
    match token {
        "=" | "==" => Some(ConditionOp::Eq),
        "!=" => Some(ConditionOp::Ne),
        "<" => Some(ConditionOp::Lt),
        "<=" => Some(ConditionOp::Lte),
        ">" => Some(ConditionOp::Gt),
        ">=" => Some(ConditionOp::Gte),
        other if other.eq_ignore_ascii_case("LIKE") => Some(ConditionOp::Like),
        other if other.eq_ignore_ascii_case("MATCH") => Some(ConditionOp::Match),
        _ => None,
    }
}

/// `field op value` as three tokens, or `field=value`/`field!=value`/... written
/// with no surrounding spaces as a single token. LIKE/MATCH always require
/// spaces — that's how §4.3.2 disambiguates them from a bare substring value.
fn parse_condition(cursor: &mut Cursor) -> Result<Condition, CoreError> {
    let first = cursor
        .advance()
        .ok_or_else(|| CoreError::parse("expected a condition", cursor.position()))?;

    for op_str in ["!=", "<=", ">=", "=", "<", ">"] {
        if let Some(idx) = first.find(op_str) {
            if idx > 0 && idx + op_str.len() < first.len() {
                let field = first[..idx].to_string();
                let value_token = &first[idx + op_str.len()..];
                let op = parse_op(op_str).unwrap();
                return Ok(Condition {
                    field,
                    op,
                    value: parse_value(value_token),
                });
            }
        }
    }

    let field = first;
    let op_token = cursor
        .advance()
        .ok_or_else(|| CoreError::parse("expected a comparison operator", cursor.position()))?;
    let op = parse_op(&op_token)
        .ok_or_else(|| CoreError::parse(format!("unknown comparison operator `{op_token}`"), cursor.position()))?;
    let value_token = cursor
        .advance()
        .ok_or_else(|| CoreError::parse("expected a value", cursor.position()))?;
    Ok(Condition {
        field,
        op,
        value: parse_value(&value_token),
    })
}

/// A flat AND/OR chain of comparisons — §4.3.2 forbids nested parentheses, so a
/// stray `(`/`)` is just part of a token's text and never causes a parse panic.
fn parse_condition_clause(cursor: &mut Cursor) -> Result<ConditionClause, CoreError> {
    let mut conditions = vec![parse_condition(cursor)?];
    let mut joins = Vec::new();

    loop {
        match cursor.peek_upper().as_deref() {
            Some("AND") => {
                joins.push(Conjunction::And);
                cursor.advance();
            }
            Some("OR") => {
                joins.push(Conjunction::Or);
                cursor.advance();
            }
            _ => break,
        }
        conditions.push(parse_condition(cursor)?);
    }

    Ok(ConditionClause { conditions, joins })
}

fn expect_nonempty_clause(cursor: &Cursor, clause_name: &str) -> Result<(), CoreError> {
    match cursor.peek() {
        None => Err(CoreError::parse(format!("incomplete {clause_name} clause"), cursor.position())),
        Some(tok) if is_clause_keyword(tok) => {
            Err(CoreError::parse(format!("incomplete {clause_name} clause"), cursor.position()))
        }
        Some(_) => Ok(()),
    }
}

fn parse_select(cursor: &mut Cursor) -> Result<SelectQuery, CoreError> {
    cursor.expect_keyword("SELECT")?;
    let fields = collect_field_list(cursor);
    cursor.expect_keyword("FROM")?;
    let from = parse_data_source(cursor)?;

    let mut condition = None;
    if cursor.eat_keyword("WHERE") {
        expect_nonempty_clause(cursor, "WHERE")?;
        condition = Some(parse_condition_clause(cursor)?);
    }

    let mut group_by = Vec::new();
    if cursor.eat_keyword("GROUP") {
        cursor.expect_keyword("BY")?;
        expect_nonempty_clause(cursor, "GROUP BY")?;
        group_by = collect_field_list(cursor);
    }

    let mut having = None;
    if cursor.eat_keyword("HAVING") {
        expect_nonempty_clause(cursor, "HAVING")?;
        having = Some(parse_condition_clause(cursor)?);
    }

    let mut order_by = Vec::new();
    if cursor.eat_keyword("ORDER") {
        cursor.expect_keyword("BY")?;
        expect_nonempty_clause(cursor, "ORDER BY")?;
        order_by = collect_field_list(cursor);
    }

    let mut limit = None;
    if cursor.eat_keyword("LIMIT") {
        let tok = cursor
            .advance()
            .ok_or_else(|| CoreError::parse("incomplete LIMIT clause", cursor.position()))?;
        limit = Some(
            tok.parse::<u64>()
                .map_err(|_| CoreError::parse(format!("invalid LIMIT value `{tok}`"), cursor.position()))?,
        );
    }

    Ok(SelectQuery {
        fields,
        from,
        condition,
        group_by,
        having,
        order_by,
        limit,
    })
}

fn parse_agg_func(name: &str) -> Option<AggFunc> {
    match name.to_ascii_uppercase().as_str() {
        "COUNT" => Some(AggFunc::Count),
        "SUM" => Some(AggFunc::Sum),
        "AVG" => Some(AggFunc::Avg),
        "MIN" => Some(AggFunc::Min),
        "MAX" => Some(AggFunc::Max),
        "RATE" => Some(AggFunc::Rate),
        "INCREASE" => Some(AggFunc::Increase),
        "PERCENTILE" => Some(AggFunc::Percentile),
        "HISTOGRAM" => Some(AggFunc::Histogram),
        "QUANTILE" => Some(AggFunc::Quantile),
        _ => None,
    }
}

fn parse_aggregation(cursor: &mut Cursor) -> Result<AggregationQuery, CoreError> {
    let head = cursor
        .advance()
        .ok_or_else(|| CoreError::parse("expected an aggregation function call", cursor.position()))?;
    let open = head
        .find('(')
        .ok_or_else(|| CoreError::parse(format!("expected `FUNC(field)`, found `{head}`"), cursor.position()))?;
    let close = head
        .rfind(')')
        .ok_or_else(|| CoreError::parse(format!("unterminated aggregation call `{head}`"), cursor.position()))?;
    let func = parse_agg_func(&head[..open])
        .ok_or_else(|| CoreError::validation("function", format!("unknown aggregation function `{}`", &head[..open])))?;
    let field_raw = head[open + 1..close].trim();
    let field = if field_raw.is_empty() { None } else { Some(field_raw.to_string()) };

    cursor.expect_keyword("FROM")?;
    let from = parse_data_source(cursor)?;

    let mut condition = None;
    if cursor.eat_keyword("WHERE") {
        expect_nonempty_clause(cursor, "WHERE")?;
        condition = Some(parse_condition_clause(cursor)?);
    }

    let mut group_by = Vec::new();
    if cursor.eat_keyword("GROUP") {
        cursor.expect_keyword("BY")?;
        expect_nonempty_clause(cursor, "GROUP BY")?;
        group_by = collect_field_list(cursor);
    }

    let query = AggregationQuery {
        func,
        field,
        from,
        condition,
        group_by,
    };
    query.validate()?;
    Ok(query)
}

fn parse_join(cursor: &mut Cursor) -> Result<JoinQuery, CoreError> {
    let left = parse_data_source(cursor)?;
    cursor.expect_keyword("JOIN")?;
    let right = parse_data_source(cursor)?;
    cursor.expect_keyword("ON")?;
    expect_nonempty_clause(cursor, "ON")?;
    let on = parse_condition_clause(cursor)?;

    let mut window = None;
    if cursor.eat_keyword("WITHIN") {
        let tok = cursor
            .advance()
            .ok_or_else(|| CoreError::parse("expected a window duration after WITHIN", cursor.position()))?;
        window = Some(parse_window(&tok)?);
    }

    Ok(JoinQuery { left, right, on, window })
}

fn time_operator(token: &str) -> Option<TimeOperator> {
    match token.to_ascii_uppercase().as_str() {
        "AND" => Some(TimeOperator::And),
        "OR" => Some(TimeOperator::Or),
        "WITHIN" => Some(TimeOperator::Within),
        "NEAR" => Some(TimeOperator::Near),
        "BEFORE" => Some(TimeOperator::Before),
        "AFTER" => Some(TimeOperator::After),
        _ => None,
    }
}

fn parse_uql_correlation(cursor: &mut Cursor) -> Result<CorrelationExpr, CoreError> {
    let left = UqlExpression::DataSource(parse_data_source(cursor)?);
    let op_token = cursor
        .advance()
        .ok_or_else(|| CoreError::parse("expected a correlation operator", cursor.position()))?;
    let operator = time_operator(&op_token)
        .ok_or_else(|| CoreError::parse(format!("unknown correlation operator `{op_token}`"), cursor.position()))?;

    let window = if operator.is_time_based() {
        let tok = cursor
            .advance()
            .ok_or_else(|| CoreError::parse("time-based correlation operators require a window", cursor.position()))?;
        Some(parse_window(&tok)?)
    } else {
        None
    };
    let right = UqlExpression::DataSource(parse_data_source(cursor)?);

    Ok(CorrelationExpr {
        left: Box::new(left),
        operator,
        window,
        right: Box::new(right),
    })
}

const CORRELATION_OPERATOR_WORDS: &[&str] = &["AND", "OR", "WITHIN", "NEAR", "BEFORE", "AFTER"];

/// Detects the query kind and dispatches, per §4.3.2's "the parser infers the
/// kind from its leading keyword / structural markers" rule.
pub fn parse(input: &str) -> Result<UqlQuery, CoreError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CoreError::parse("empty query", 0));
    }
    let upper = trimmed.to_ascii_uppercase();

    if upper.starts_with("SELECT") {
        let mut cursor = Cursor::new(trimmed);
        let select = parse_select(&mut cursor)?;
        if !cursor.is_at_end() {
            return Err(CoreError::parse(format!("unexpected trailing input: `{}`", cursor.rest_joined()), cursor.position()));
        }
        select.from.validate()?;
        return Ok(UqlQuery::Select(select));
    }

    let words: Vec<&str> = trimmed.split_whitespace().collect();
    if words.iter().any(|w| w.eq_ignore_ascii_case("JOIN")) {
        let mut cursor = Cursor::new(trimmed);
        let join = parse_join(&mut cursor)?;
        if !cursor.is_at_end() {
            return Err(CoreError::parse(format!("unexpected trailing input: `{}`", cursor.rest_joined()), cursor.position()));
        }
        let query = UqlQuery::Join(join);
        query.validate()?;
        return Ok(query);
    }

    let looks_like_aggregation = words
        .first()
        .map(|w| w.contains('(') && parse_agg_func(&w[..w.find('(').unwrap_or(w.len())]).is_some())
        .unwrap_or(false);
    if looks_like_aggregation {
        let mut cursor = Cursor::new(trimmed);
        let agg = parse_aggregation(&mut cursor)?;
        if !cursor.is_at_end() {
            return Err(CoreError::parse(format!("unexpected trailing input: `{}`", cursor.rest_joined()), cursor.position()));
        }
        return Ok(UqlQuery::Aggregation(agg));
    }

    if words.iter().any(|w| CORRELATION_OPERATOR_WORDS.iter().any(|op| w.eq_ignore_ascii_case(op))) {
        let mut cursor = Cursor::new(trimmed);
        let corr = parse_uql_correlation(&mut cursor)?;
        if !cursor.is_at_end() {
            return Err(CoreError::parse(format!("unexpected trailing input: `{}`", cursor.rest_joined()), cursor.position()));
        }
        let query = UqlQuery::Correlation(corr);
        query.validate()?;
        return Ok(query);
    }

    Err(CoreError::parse(format!("unrecognized query form: `{trimmed}`"), 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn select_with_all_clauses() {
        let q = parse(
            "SELECT service, status WHERE status = \"error\" GROUP BY service HAVING status = \"error\" ORDER BY service LIMIT 50",
        );
        // No FROM keyword present deliberately triggers the clause error path below instead.
        assert!(q.is_err());
    }

    #[test]
    fn select_from_with_where_group_order_limit() {
        let q = parse(
            "SELECT service FROM logs:error WHERE status = \"500\" AND region = us-east GROUP BY service ORDER BY service LIMIT 20",
        )
        .unwrap();
        match q {
            UqlQuery::Select(s) => {
                assert_eq!(s.fields, vec!["service".to_string()]);
                assert_eq!(s.from.engine, Engine::Logs);
                assert_eq!(s.from.query, "error");
                let cond = s.condition.unwrap();
                assert_eq!(cond.conditions.len(), 2);
                assert_eq!(cond.joins, vec![Conjunction::And]);
                assert_eq!(s.group_by, vec!["service".to_string()]);
                assert_eq!(s.order_by, vec!["service".to_string()]);
                assert_eq!(s.limit, Some(20));
            }
            _ => panic!("expected Select"),
        }
    }

    #[test]
    fn incomplete_where_clause_reports_error() {
        let err = parse("SELECT service FROM logs:error WHERE").unwrap_err();
        match err {
            CoreError::QueryParseError { message, .. } => assert!(message.contains("incomplete WHERE clause")),
            other => panic!("expected QueryParseError, got {other:?}"),
        }
    }

    #[test]
    fn count_aggregation_without_field() {
        let q = parse("COUNT() FROM logs:error GROUP BY service").unwrap();
        match q {
            UqlQuery::Aggregation(a) => {
                assert_eq!(a.func, AggFunc::Count);
                assert_eq!(a.field, None);
                assert_eq!(a.group_by, vec!["service".to_string()]);
            }
            _ => panic!("expected Aggregation"),
        }
    }

    #[test]
    fn avg_aggregation_with_field_and_where() {
        let q = parse("AVG(duration) FROM traces:slow WHERE duration > 500").unwrap();
        match q {
            UqlQuery::Aggregation(a) => {
                assert_eq!(a.func, AggFunc::Avg);
                assert_eq!(a.field, Some("duration".to_string()));
            }
            _ => panic!("expected Aggregation"),
        }
    }

    #[test]
    fn sum_without_field_is_rejected() {
        let err = parse("SUM() FROM metrics:cpu").unwrap_err();
        assert!(matches!(err, CoreError::ValidationError { .. }));
    }

    #[test]
    fn join_with_on_and_window() {
        let q = parse("logs:error JOIN traces:slow ON trace_id = trace_id WITHIN 5m").unwrap();
        match q {
            UqlQuery::Join(j) => {
                assert_eq!(j.left.engine, Engine::Logs);
                assert_eq!(j.right.engine, Engine::Traces);
                assert_eq!(j.window, Some(Duration::from_secs(300)));
            }
            _ => panic!("expected Join"),
        }
    }

    #[test]
    fn correlation_with_within_window() {
        let q = parse("logs:error WITHIN 5m metrics:cpu_usage").unwrap();
        match q {
            UqlQuery::Correlation(c) => {
                assert_eq!(c.operator, TimeOperator::Within);
                assert_eq!(c.window, Some(Duration::from_secs(300)));
            }
            _ => panic!("expected Correlation"),
        }
    }

    #[test]
    fn correlation_and_without_window() {
        let q = parse("logs:error AND traces:slow").unwrap();
        match q {
            UqlQuery::Correlation(c) => {
                assert_eq!(c.operator, TimeOperator::And);
                assert!(c.window.is_none());
            }
            _ => panic!("expected Correlation"),
        }
    }

    #[test]
    fn parenthesized_value_does_not_crash_parser() {
        // §4.3.2 forbids nested parens in conditions but must still fail gracefully.
        let result = parse("SELECT x FROM logs:error WHERE x = (y)");
        assert!(result.is_ok() || result.is_err());
    }

    #[test]
    fn unrecognized_form_is_a_parse_error() {
        let err = parse("just some free text").unwrap_err();
        assert!(matches!(err, CoreError::QueryParseError { .. }));
    }
}
