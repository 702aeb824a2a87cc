//! UQL's closed sum types (§3, §4.3.2, §9's "polymorphism via tagged variants"
//! design note). Modeled as Rust enums rather than an inheritance hierarchy: each
//! variant carries exactly the fields its shape needs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::correlation::Engine;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    Match,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conjunction {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConditionValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: ConditionOp,
    pub value: ConditionValue,
}

/// A condition clause: a flat list of comparisons joined by AND/OR (no nested
/// parentheses — §4.3.2 explicitly forbids them in conditions).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionClause {
    pub conditions: Vec<Condition>,
    pub joins: Vec<Conjunction>,
}

/// A reference to one engine's raw query text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub engine: Engine,
    pub query: String,
}

impl DataSource {
    pub fn validate(&self) -> Result<(), CoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subquery {
    pub source: DataSource,
    pub alias: String,
}

/// The operators §4.3.2 says can appear in a UQL correlation expression. `And`/
/// `Or` are set-theoretic like the correlation DSL's; the rest are time-based and
/// each requires a following `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeOperator {
    And,
    Or,
    Within,
    Near,
    Before,
    After,
}

impl TimeOperator {
    pub fn is_time_based(&self) -> bool {
        matches!(
            self,
            TimeOperator::Within | TimeOperator::Near | TimeOperator::Before | TimeOperator::After
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationExpr {
    pub left: Box<UqlExpression>,
    pub operator: TimeOperator,
    pub window: Option<Duration>,
    pub right: Box<UqlExpression>,
}

/// `UQLExpression` — a closed sum type over DataSource | Subquery | Correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UqlExpression {
    DataSource(DataSource),
    Subquery(Subquery),
    Correlation(CorrelationExpr),
}

impl UqlExpression {
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            UqlExpression::DataSource(d) => d.validate(),
            UqlExpression::Subquery(s) => s.source.validate(),
            UqlExpression::Correlation(c) => {
                c.left.validate()?;
                c.right.validate()?;
                if matches!(
                    c.operator,
                    TimeOperator::Within | TimeOperator::Near | TimeOperator::Before | TimeOperator::After
                ) && c.window.is_none()
                {
                    return Err(CoreError::validation(
                        "window",
                        "time-based correlation operators require a window",
                    ));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    pub fields: Vec<String>,
    pub from: DataSource,
    pub condition: Option<ConditionClause>,
    #[serde(default)]
    pub group_by: Vec<String>,
    pub having: Option<ConditionClause>,
    #[serde(default)]
    pub order_by: Vec<String>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Rate,
    Increase,
    Percentile,
    Histogram,
    Quantile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationQuery {
    pub func: AggFunc,
    pub field: Option<String>,
    pub from: DataSource,
    pub condition: Option<ConditionClause>,
    #[serde(default)]
    pub group_by: Vec<String>,
}

impl AggregationQuery {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.func != AggFunc::Count {
            match &self.field {
                Some(f) if !f.trim().is_empty() => {}
                _ => {
                    return Err(CoreError::validation(
                        "field",
                        "non-COUNT aggregation functions require a non-empty field",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinQuery {
    pub left: DataSource,
    pub right: DataSource,
    pub on: ConditionClause,
    pub window: Option<Duration>,
}

/// `UQLQuery` — a closed sum type over Select | Correlation | Aggregation | Join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UqlQuery {
    Select(SelectQuery),
    Correlation(CorrelationExpr),
    Aggregation(AggregationQuery),
    Join(JoinQuery),
}

impl UqlQuery {
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            UqlQuery::Select(s) => s.from.validate(),
            UqlQuery::Correlation(c) => UqlExpression::Correlation(c.clone()).validate(),
            UqlQuery::Aggregation(a) => {
                a.from.validate()?;
                a.validate()
            }
            UqlQuery::Join(j) => {
                j.left.validate()?;
                j.right.validate()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(engine: Engine, query: &str) -> DataSource {
        DataSource {
            engine,
            query: query.into(),
        }
    }

    #[test]
    fn non_count_aggregation_without_field_rejected() {
        let agg = AggregationQuery {
            func: AggFunc::Sum,
            field: None,
            from: source(Engine::Metrics, "http_requests_total"),
            condition: None,
            group_by: vec![],
        };
        assert!(agg.validate().is_err());
    }

    #[test]
    fn count_aggregation_without_field_is_fine() {
        let agg = AggregationQuery {
            func: AggFunc::Count,
            field: None,
            from: source(Engine::Logs, "error"),
            condition: None,
            group_by: vec![],
        };
        assert!(agg.validate().is_ok());
    }

    #[test]
    fn time_operator_without_window_rejected() {
        let expr = CorrelationExpr {
            left: Box::new(UqlExpression::DataSource(source(Engine::Logs, "error"))),
            operator: TimeOperator::Within,
            window: None,
            right: Box::new(UqlExpression::DataSource(source(Engine::Metrics, "cpu"))),
        };
        assert!(UqlExpression::Correlation(expr).validate().is_err());
    }
}
