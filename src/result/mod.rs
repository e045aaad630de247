//! Result model - the outcome of evaluating one design point.
//!
//! Results are created once by whoever ran the evaluation and are never
//! mutated after they are committed to the store. The only field written
//! later is `path`, and only on the copy handed to the output report.

mod codec;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use codec::{decode, encode, CodecError};

/// A single parameter value of a design point.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ParamValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(value) => write!(f, "{}", value),
            ParamValue::Text(value) => write!(f, "{}", value),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

/// One concrete configuration drawn from the design space.
///
/// Parameters are kept sorted by name so that the identity key is stable
/// regardless of the order in which a search worker assigned them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DesignPoint {
    params: BTreeMap<String, ParamValue>,
}

impl DesignPoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style parameter assignment.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.params.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Canonical identity of this point, used as the result store key.
    pub fn key(&self) -> String {
        self.params
            .iter()
            .map(|(name, value)| format!("{}-{}", name, value))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl FromIterator<(String, ParamValue)> for DesignPoint {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        DesignPoint {
            params: iter.into_iter().collect(),
        }
    }
}

/// Outcome classification of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RetCode {
    Pass,
    Timeout,
    EvaluatorError,
    InvalidPoint,
    /// Generated code identical to an already evaluated point; not evaluated again.
    Duplicate,
    Unavailable,
}

impl RetCode {
    pub const ALL: [RetCode; 6] = [
        RetCode::Pass,
        RetCode::Timeout,
        RetCode::EvaluatorError,
        RetCode::InvalidPoint,
        RetCode::Duplicate,
        RetCode::Unavailable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RetCode::Pass => "pass",
            RetCode::Timeout => "timeout",
            RetCode::EvaluatorError => "evaluator-error",
            RetCode::InvalidPoint => "invalid-point",
            RetCode::Duplicate => "duplicate",
            RetCode::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for RetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which evaluation stage produced a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvalStage {
    /// Lower-level estimation stage: quality, validity and return code only.
    Estimate,
    /// Toolchain stage; carries the content hash of the generated intermediate artifact.
    Toolchain { code_hash: Option<String> },
}

/// The outcome of evaluating one design point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub point: Option<DesignPoint>,
    pub quality: Option<f64>,
    pub valid: bool,
    pub ret_code: RetCode,
    pub path: Option<String>,
    pub stage: EvalStage,
}

impl EvalResult {
    /// A successful estimation-stage result.
    pub fn estimate(point: DesignPoint, quality: f64) -> Self {
        EvalResult {
            point: Some(point),
            quality: Some(quality),
            valid: true,
            ret_code: RetCode::Pass,
            path: None,
            stage: EvalStage::Estimate,
        }
    }

    /// A successful toolchain-stage result with its generated-code hash.
    pub fn toolchain(point: DesignPoint, quality: f64, code_hash: Option<String>) -> Self {
        EvalResult {
            point: Some(point),
            quality: Some(quality),
            valid: true,
            ret_code: RetCode::Pass,
            path: None,
            stage: EvalStage::Toolchain { code_hash },
        }
    }

    /// A failed evaluation. Carries no quality and is never ranked.
    pub fn failed(point: Option<DesignPoint>, ret_code: RetCode, stage: EvalStage) -> Self {
        EvalResult {
            point,
            quality: None,
            valid: false,
            ret_code,
            path: None,
            stage,
        }
    }

    /// True when this result may be ranked in the best-cache.
    pub fn has_quality(&self) -> bool {
        self.valid && matches!(self.quality, Some(q) if !q.is_nan())
    }

    pub fn code_hash(&self) -> Option<&str> {
        match &self.stage {
            EvalStage::Toolchain { code_hash } => code_hash.as_deref(),
            EvalStage::Estimate => None,
        }
    }

    pub fn is_toolchain(&self) -> bool {
        matches!(self.stage, EvalStage::Toolchain { .. })
    }
}
