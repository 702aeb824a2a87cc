//! The correlation DSL's parsed shape (§3, §4.3.1).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Logs,
    Metrics,
    Traces,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationExpression {
    pub engine: Engine,
    pub query: String,
    /// Verbatim comparison suffix, e.g. `" > 80"`. Empty when absent.
    pub condition: String,
    #[serde(default)]
    pub label_key: Option<String>,
    #[serde(default)]
    pub label_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationQuery {
    pub expressions: Vec<CorrelationExpression>,
    pub operator: LogicalOperator,
    #[serde(with = "duration_opt", default)]
    pub time_window: Option<Duration>,
}

impl CorrelationQuery {
    /// §8: `timeWindow != ∅ ⟹ len(expressions) = 2 ∧ operator = AND`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.time_window.is_some() {
            if self.expressions.len() != 2 {
                return Err(CoreError::validation(
                    "expressions",
                    "time-window correlation requires exactly 2 expressions",
                ));
            }
            if self.operator != LogicalOperator::And {
                return Err(CoreError::validation(
                    "operator",
                    "time-window correlation forces operator AND",
                ));
            }
        }
        if self.expressions.is_empty() {
            return Err(CoreError::validation(
                "expressions",
                "correlation query must have at least one expression",
            ));
        }
        Ok(())
    }
}

mod duration_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(v: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(d) => s.serialize_u64(d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<u64> = Option::deserialize(d)?;
        Ok(secs.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(engine: Engine, query: &str, condition: &str) -> CorrelationExpression {
        CorrelationExpression {
            engine,
            query: query.into(),
            condition: condition.into(),
            label_key: None,
            label_value: None,
        }
    }

    #[test]
    fn time_window_requires_exactly_two_and_and() {
        let q = CorrelationQuery {
            expressions: vec![
                expr(Engine::Logs, "error", ""),
                expr(Engine::Metrics, "cpu_usage", " > 80"),
            ],
            operator: LogicalOperator::And,
            time_window: Some(Duration::from_secs(300)),
        };
        assert!(q.validate().is_ok());

        let mut bad = q.clone();
        bad.operator = LogicalOperator::Or;
        assert!(bad.validate().is_err());

        let mut bad2 = q.clone();
        bad2.expressions.push(expr(Engine::Traces, "slow", ""));
        assert!(bad2.validate().is_err());
    }

    #[test]
    fn plain_form_allows_any_nonzero_expression_count() {
        let q = CorrelationQuery {
            expressions: vec![
                expr(Engine::Logs, "error", ""),
                expr(Engine::Metrics, "cpu", ""),
                expr(Engine::Traces, "slow", ""),
            ],
            operator: LogicalOperator::Or,
            time_window: None,
        };
        assert!(q.validate().is_ok());
    }
}
