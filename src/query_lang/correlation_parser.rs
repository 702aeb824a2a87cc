//! `CorrelationParser` — the `AND/OR/WITHIN/OF` grammar of §4.3.1:
//!
//! ```text
//! corr      := expr (WITHIN window OF expr)?
//! expr      := singleExpr ((AND|OR) singleExpr)*      // AND and OR do not mix
//! singleExpr:= engine ":" queryText (cmpOp value)?
//! engine    := logs | metrics | traces
//! window    := integer (s|m|h|d)
//! cmpOp     := > | < | == | !=
//! ```

use std::time::Duration;

use super::tokenizer::{parse_window, Cursor};
use crate::error::CoreError;
use crate::models::correlation::{CorrelationExpression, CorrelationQuery, Engine, LogicalOperator};

const CMP_OPS: &[&str] = &[">", "<", "==", "!="];

fn parse_engine(token: &str) -> Result<Engine, CoreError> {
    match token.to_ascii_lowercase().as_str() {
        "logs" => Ok(Engine::Logs),
        "metrics" => Ok(Engine::Metrics),
        "traces" => Ok(Engine::Traces),
        other => Err(CoreError::validation("engine", format!("unknown engine prefix `{other}`"))),
    }
}

fn parse_single_expr(cursor: &mut Cursor) -> Result<CorrelationExpression, CoreError> {
    let token = cursor
        .advance()
        .ok_or_else(|| CoreError::parse("expected an expression", cursor.position()))?;
    let (engine_str, query) = token
        .split_once(':')
        .ok_or_else(|| CoreError::parse(format!("expected `engine:query`, found `{token}`"), cursor.position()))?;
    let engine = parse_engine(engine_str)?;

    // A comparison operator + value attach to the same expression, e.g. `> 80`.
    let mut condition = String::new();
    if let Some(op_token) = cursor.peek() {
        if CMP_OPS.contains(&op_token) {
            let op = cursor.advance().unwrap();
            let value = cursor
                .advance()
                .ok_or_else(|| CoreError::parse("expected a value after comparison operator", cursor.position()))?;
            condition = format!(" {op} {value}");
        }
    }

    Ok(CorrelationExpression {
        engine,
        query: query.to_string(),
        condition,
        label_key: None,
        label_value: None,
    })
}

fn parse_expr_list(cursor: &mut Cursor) -> Result<(Vec<CorrelationExpression>, LogicalOperator), CoreError> {
    let mut expressions = vec![parse_single_expr(cursor)?];
    let mut operator: Option<LogicalOperator> = None;

    loop {
        let next = cursor.peek_upper();
        let candidate = match next.as_deref() {
            Some("AND") => LogicalOperator::And,
            Some("OR") => LogicalOperator::Or,
            _ => break,
        };
        if let Some(existing) = operator {
            if existing != candidate {
                return Err(CoreError::validation(
                    "operator",
                    "AND and OR must not be mixed within a single correlation expression",
                ));
            }
        }
        operator = Some(candidate);
        cursor.advance();
        expressions.push(parse_single_expr(cursor)?);
    }

    Ok((expressions, operator.unwrap_or(LogicalOperator::And)))
}

pub fn parse(input: &str) -> Result<CorrelationQuery, CoreError> {
    let mut cursor = Cursor::new(input);
    let (mut expressions, mut operator) = parse_expr_list(&mut cursor)?;
    let mut time_window: Option<Duration> = None;

    if cursor.eat_keyword("WITHIN") {
        if expressions.len() != 1 {
            return Err(CoreError::validation(
                "expressions",
                "time-window correlation requires a single expression on the left of WITHIN",
            ));
        }
        let window_token = cursor
            .advance()
            .ok_or_else(|| CoreError::parse("expected a window duration after WITHIN", cursor.position()))?;
        time_window = Some(parse_window(&window_token)?);
        cursor.expect_keyword("OF")?;
        let right = parse_single_expr(&mut cursor)?;
        expressions.push(right);
        operator = LogicalOperator::And;
    }

    if !cursor.is_at_end() {
        return Err(CoreError::parse(
            format!("unexpected trailing input: `{}`", cursor.rest_joined()),
            cursor.position(),
        ));
    }

    let query = CorrelationQuery {
        expressions,
        operator,
        time_window,
    };
    query.validate()?;
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_window_scenario_from_spec() {
        // §8 scenario 1.
        let q = parse("logs:error WITHIN 5m OF metrics:cpu_usage > 80").unwrap();
        assert_eq!(q.expressions.len(), 2);
        assert_eq!(q.expressions[0].engine, Engine::Logs);
        assert_eq!(q.expressions[0].query, "error");
        assert_eq!(q.expressions[0].condition, "");
        assert_eq!(q.expressions[1].engine, Engine::Metrics);
        assert_eq!(q.expressions[1].query, "cpu_usage");
        assert_eq!(q.expressions[1].condition, " > 80");
        assert_eq!(q.operator, LogicalOperator::And);
        assert_eq!(q.time_window, Some(Duration::from_secs(300)));
    }

    #[test]
    fn plain_and_form() {
        let q = parse("logs:error AND traces:slow_span").unwrap();
        assert_eq!(q.expressions.len(), 2);
        assert_eq!(q.operator, LogicalOperator::And);
        assert!(q.time_window.is_none());
    }

    #[test]
    fn plain_or_form() {
        let q = parse("logs:error OR metrics:cpu_usage").unwrap();
        assert_eq!(q.operator, LogicalOperator::Or);
    }

    #[test]
    fn mixed_and_or_at_top_level_rejected() {
        let err = parse("logs:error AND metrics:cpu OR traces:slow").unwrap_err();
        assert!(matches!(err, CoreError::ValidationError { .. }));
    }

    #[test]
    fn unknown_engine_prefix_rejected() {
        let err = parse("weather:rain").unwrap_err();
        assert!(matches!(err, CoreError::ValidationError { .. }));
    }

    #[test]
    fn time_window_with_wrong_expression_count_rejected() {
        let err = parse("logs:error AND logs:warn WITHIN 5m OF metrics:cpu").unwrap_err();
        assert!(matches!(err, CoreError::ValidationError { .. }));
    }

    #[test]
    fn missing_of_keyword_rejected() {
        let err = parse("logs:error WITHIN 5m metrics:cpu").unwrap_err();
        assert!(matches!(err, CoreError::QueryParseError { .. }));
    }
}
