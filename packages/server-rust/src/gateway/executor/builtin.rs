//! In-process scoring functions.
//!
//! Builtins are pure functions from a JSON input to a JSON output. They run
//! on the blocking pool so a CPU-heavy function cannot stall the runtime;
//! being in-process, they cannot be forcibly stopped once started, so only
//! trusted code belongs here.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context as _};
use async_trait::async_trait;
use scoring_core::ExecutionTarget;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::Executor;
use crate::error::{ScoringError, ScoringResult};
use crate::gateway::invocation::Invocation;
use crate::gateway::output::RawOutput;

/// A deterministic in-process scoring function.
pub trait ScoringFunction: Send + Sync + 'static {
    /// Name referenced by `ExecutionTarget::Builtin { function }`.
    fn name(&self) -> &'static str;

    /// Computes a score. Errors are reported to the caller as engine failures.
    ///
    /// # Errors
    ///
    /// Returns an error if the input does not have the expected shape.
    fn score(&self, input: &Value) -> anyhow::Result<Value>;
}

/// Lookup table of builtin functions by name.
#[derive(Clone, Default)]
pub struct BuiltinTable {
    functions: HashMap<&'static str, Arc<dyn ScoringFunction>>,
}

impl BuiltinTable {
    /// Table with the functions shipped with the server.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut table = Self::default();
        table.insert(WeightedUtilization);
        table.insert(WorkloadBalance);
        table
    }

    pub fn insert(&mut self, function: impl ScoringFunction) {
        self.functions.insert(function.name(), Arc::new(function));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ScoringFunction>> {
        self.functions.get(name).map(Arc::clone)
    }

    /// Registered function names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Runs builtin engines.
pub struct BuiltinExecutor {
    table: BuiltinTable,
}

impl BuiltinExecutor {
    #[must_use]
    pub fn new(table: BuiltinTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl Executor for BuiltinExecutor {
    async fn execute(&self, inv: &Invocation) -> ScoringResult<RawOutput> {
        let engine = inv.engine_name().to_string();
        let ExecutionTarget::Builtin { function } = &inv.engine.target else {
            return Err(ScoringError::Internal(anyhow!(
                "builtin executor received a {} engine",
                inv.engine.target.kind()
            )));
        };
        let Some(func) = self.table.get(function) else {
            return Err(ScoringError::ExecutionError {
                engine,
                message: format!("unknown builtin function: {function}"),
            });
        };

        let input = Arc::clone(&inv.input);
        let result = tokio::task::spawn_blocking(move || func.score(&input))
            .await
            .map_err(|e| ScoringError::ExecutionError {
                engine: engine.clone(),
                message: if e.is_panic() {
                    "engine panicked".to_string()
                } else {
                    e.to_string()
                },
            })?;

        result
            .map(RawOutput::Value)
            .map_err(|e| ScoringError::ExecutionError {
                engine,
                message: format!("{e:#}"),
            })
    }
}

// ---------------------------------------------------------------------------
// weighted_utilization
// ---------------------------------------------------------------------------

/// Weighted mean of the numeric fields of the input object.
///
/// Input: `{"cpu": 0.8, "mem": 0.5, "weights": {"cpu": 2}}`. Fields missing
/// from `weights` (or all fields, when `weights` is absent) weigh 1.
/// Output: `{"score": <mean>, "fields": <count>}`.
pub struct WeightedUtilization;

impl ScoringFunction for WeightedUtilization {
    fn name(&self) -> &'static str {
        "weighted_utilization"
    }

    fn score(&self, input: &Value) -> anyhow::Result<Value> {
        let obj = input
            .as_object()
            .context("input must be an object of numeric fields")?;
        let empty = Map::new();
        let weights = match obj.get("weights") {
            None => &empty,
            Some(Value::Object(w)) => w,
            Some(_) => bail!("weights must be an object"),
        };

        let mut total = 0.0;
        let mut weight_sum = 0.0;
        let mut fields = 0_u64;
        for (key, value) in obj.iter().filter(|(k, _)| k.as_str() != "weights") {
            let x = value
                .as_f64()
                .with_context(|| format!("field {key} is not a number"))?;
            let w = match weights.get(key) {
                None => 1.0,
                Some(w) => w
                    .as_f64()
                    .filter(|w| *w >= 0.0)
                    .with_context(|| format!("weight for {key} must be a non-negative number"))?,
            };
            total += x * w;
            weight_sum += w;
            fields += 1;
        }
        if weight_sum <= 0.0 {
            bail!("input has no weighted numeric fields");
        }
        let score = total / weight_sum;
        if !score.is_finite() {
            bail!("weighted score is not finite");
        }
        Ok(json!({ "score": score, "fields": fields }))
    }
}

// ---------------------------------------------------------------------------
// workload_balance
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BalanceInput {
    hosts: Vec<HostLoad>,
    /// Utilization percentage at or above which a host is overloaded.
    #[serde(default = "default_threshold")]
    threshold: f64,
}

#[derive(Debug, Deserialize)]
struct HostLoad {
    name: String,
    workload: f64,
    capacity: f64,
}

fn default_threshold() -> f64 {
    25.0
}

/// Scores how evenly workload is spread across hosts.
///
/// Output: mean and standard deviation of per-host utilization (0..1), the
/// hosts at or above `threshold` percent, and `score = 1 - stddev` (1 is
/// perfectly balanced).
pub struct WorkloadBalance;

impl ScoringFunction for WorkloadBalance {
    fn name(&self) -> &'static str {
        "workload_balance"
    }

    fn score(&self, input: &Value) -> anyhow::Result<Value> {
        let input = BalanceInput::deserialize(input).context("invalid workload_balance input")?;
        if input.hosts.is_empty() {
            bail!("hosts must not be empty");
        }

        let mut utilizations = Vec::with_capacity(input.hosts.len());
        let mut overloaded = Vec::new();
        for host in &input.hosts {
            if host.capacity <= 0.0 {
                bail!("host {} has non-positive capacity", host.name);
            }
            let util = host.workload / host.capacity;
            if util * 100.0 >= input.threshold {
                overloaded.push(host.name.clone());
            }
            utilizations.push(util);
        }

        #[allow(clippy::cast_precision_loss)]
        let n = utilizations.len() as f64;
        let mean = utilizations.iter().sum::<f64>() / n;
        let variance = utilizations.iter().map(|u| (u - mean).powi(2)).sum::<f64>() / n;
        let stddev = variance.sqrt();
        if !mean.is_finite() || !stddev.is_finite() {
            bail!("host utilization is not finite");
        }

        Ok(json!({
            "score": 1.0 - stddev,
            "mean_utilization": mean,
            "stddev": stddev,
            "overloaded": overloaded,
        }))
    }
}
