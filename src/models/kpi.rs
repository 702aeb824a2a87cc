//! KPI definitions — §3's richest entity, with the threshold-ordering and
//! formula-balance invariants §8 fuzzes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KpiKind {
    Business,
    Tech,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Team,
    Org,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdOperator {
    Gt,
    Lt,
    Eq,
    Gte,
    Lte,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub level: String,
    pub operator: ThresholdOperator,
    pub value: f64,
    pub color: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiQuery {
    pub metric: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub aggregation: Option<String>,
    pub formula: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiDefinition {
    pub id: String,
    pub kind: KpiKind,
    pub name: String,
    pub unit: String,
    pub format: String,
    pub query: KpiQuery,
    pub thresholds: Vec<Threshold>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub sentiment: Sentiment,
    #[serde(default)]
    pub sparkline: bool,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KpiDefinition {
    /// Validates everything §3's KPI row calls out: non-empty id, a query that
    /// names either a metric or a syntactically balanced, non-dividing-by-zero
    /// formula, and thresholds ordered per sentiment.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.trim().is_empty() {
            return Err(CoreError::validation("id", "KPI id must be non-empty"));
        }
        self.validate_query()?;
        self.validate_thresholds()?;
        Ok(())
    }

    fn validate_query(&self) -> Result<(), CoreError> {
        match (&self.query.metric, &self.query.formula) {
            (Some(m), _) if !m.trim().is_empty() => Ok(()),
            (_, Some(formula)) if !formula.trim().is_empty() => {
                if !is_balanced(formula) {
                    return Err(CoreError::validation(
                        "query.formula",
                        "formula has unbalanced parentheses",
                    ));
                }
                if formula.contains("/0") {
                    return Err(CoreError::validation(
                        "query.formula",
                        "formula divides by a literal zero",
                    ));
                }
                Ok(())
            }
            _ => Err(CoreError::validation(
                "query",
                "KPI query must reference a metric or a formula",
            )),
        }
    }

    fn validate_thresholds(&self) -> Result<(), CoreError> {
        let values: Vec<f64> = self.thresholds.iter().map(|t| t.value).collect();
        let ordered = match self.sentiment {
            Sentiment::Negative => values.windows(2).all(|w| w[0] <= w[1]),
            Sentiment::Positive => values.windows(2).all(|w| w[0] >= w[1]),
            Sentiment::Neutral => true,
        };
        if !ordered {
            return Err(CoreError::validation(
                "thresholds",
                "thresholds must be ordered ascending by value for NEGATIVE sentiment \
                 and descending for POSITIVE sentiment",
            ));
        }
        Ok(())
    }
}

fn is_balanced(formula: &str) -> bool {
    let mut depth = 0i32;
    for c in formula.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}
