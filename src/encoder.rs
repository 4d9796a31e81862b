//! Trial records to numeric training data.
//!
//! The [`Encoder`] turns the ledger into the `(X, y)` arrays a
//! [`SurrogateModel`](crate::surrogate::SurrogateModel) is fitted on. The
//! column layout is fixed by the space's
//! [`parameter_order`](crate::space::ConfigurationSpace::parameter_order):
//!
//! | Kind | Columns | Value |
//! |------|---------|-------|
//! | `Numeric` | 1 | internal value (log for log scale), `[0, 1]` when normalized |
//! | `Categorical` | 1 or `n_choices` | choice index, or one-hot |
//! | `Ordinal` | 1 | level index, `[0, 1]` when normalized |
//! | `Constant` | 1 | always `0.0` |
//!
//! With [`instance_context`](EncoderBuilder::instance_context) enabled a
//! final column carries the index of the trial's instance, and the distinct
//! context values are returned with the data for marginalized prediction.
//!
//! ```
//! use std::sync::Arc;
//!
//! use intensify::encoder::Encoder;
//! use intensify::space::SearchSpace;
//! use intensify::storage::TrialStore;
//! use intensify::{Configuration, ParamValue, TrialKey, TrialRecord};
//!
//! let space = SearchSpace::builder().float("x", 0.0, 10.0).build().unwrap();
//! let encoder = Encoder::builder(Arc::new(space)).build();
//!
//! let store = TrialStore::new();
//! let id = store.register(Configuration::new().with("x", ParamValue::Float(2.5)));
//! store.add(TrialKey::new(id).seed(0), TrialRecord::success(1.0)).unwrap();
//!
//! let data = encoder.transform(&store.snapshot(), None).unwrap();
//! assert_eq!(data.x, vec![vec![0.25]]);
//! assert_eq!(data.y, vec![1.0]);
//! ```

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::param::{Configuration, ParamValue};
use crate::space::{ConfigurationSpace, ParameterDescriptor, ParameterKind};
use crate::storage::TrialHistory;
use crate::types::Budget;

/// How categorical parameters are laid out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CategoricalEncoding {
    /// One column holding the choice index.
    #[default]
    Integer,
    /// One column per choice, `1.0` for the selected one.
    OneHot,
}

/// A monotonic, invertible transform applied to costs before fitting.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum ResponseTransform {
    /// Costs are used as observed.
    #[default]
    Identity,
    /// `ln(max(cost, floor))`, for costs spanning orders of magnitude.
    Log {
        /// Smallest cost before taking the logarithm; must be positive.
        floor: f64,
    },
}

impl ResponseTransform {
    fn forward(self, y: f64) -> f64 {
        match self {
            Self::Identity => y,
            Self::Log { floor } => y.max(floor.max(f64::MIN_POSITIVE)).ln(),
        }
    }

    fn inverse(self, y: f64) -> f64 {
        match self {
            Self::Identity => y,
            Self::Log { .. } => y.exp(),
        }
    }
}

/// Encoded training data.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EncodedData {
    /// Feature rows in ledger order.
    pub x: Vec<Vec<f64>>,
    /// Transformed costs, one per row.
    pub y: Vec<f64>,
    /// Distinct context rows (one per instance) when instance context is
    /// enabled; empty otherwise.
    pub contexts: Vec<Vec<f64>>,
}

impl EncodedData {
    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.y.len()
    }

    /// Returns `true` if there are no rows; callers skip fitting then.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// Converts ledger entries into feature and target arrays.
#[derive(Clone)]
pub struct Encoder {
    space: Arc<dyn ConfigurationSpace>,
    categorical: CategoricalEncoding,
    normalize: bool,
    response: ResponseTransform,
    failure_cost: Option<f64>,
    instance_context: bool,
}

impl core::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Encoder")
            .field("n_parameters", &self.space.parameter_order().len())
            .field("categorical", &self.categorical)
            .field("normalize", &self.normalize)
            .field("response", &self.response)
            .field("failure_cost", &self.failure_cost)
            .field("instance_context", &self.instance_context)
            .finish()
    }
}

impl Encoder {
    /// Creates an encoder with the default layout: integer categoricals,
    /// normalized numerics, identity response, failures skipped.
    #[must_use]
    pub fn new(space: Arc<dyn ConfigurationSpace>) -> Self {
        Self::builder(space).build()
    }

    /// Returns a builder for an encoder over `space`.
    #[must_use]
    pub fn builder(space: Arc<dyn ConfigurationSpace>) -> EncoderBuilder {
        EncoderBuilder {
            space,
            categorical: CategoricalEncoding::Integer,
            normalize: true,
            response: ResponseTransform::Identity,
            failure_cost: None,
            instance_context: false,
        }
    }

    /// The space the layout is derived from.
    #[must_use]
    pub fn space(&self) -> &Arc<dyn ConfigurationSpace> {
        &self.space
    }

    /// Whether rows carry a trailing instance context column.
    #[must_use]
    pub fn has_instance_context(&self) -> bool {
        self.instance_context
    }

    /// Number of columns produced by [`encode`](Self::encode).
    #[must_use]
    pub fn n_parameter_columns(&self) -> usize {
        self.space
            .parameter_order()
            .iter()
            .map(|p| self.width(&p.kind))
            .sum()
    }

    /// Number of columns of a training row, context column included.
    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.n_parameter_columns() + usize::from(self.instance_context)
    }

    fn width(&self, kind: &ParameterKind) -> usize {
        match (kind, self.categorical) {
            (ParameterKind::Categorical { n_choices }, CategoricalEncoding::OneHot) => *n_choices,
            _ => 1,
        }
    }

    /// Encodes the ledger's trials into training data.
    ///
    /// With `budget_subset` only trials whose budget is listed are used.
    /// Failed trials are skipped unless a failure cost is configured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingParameter`] if a registered configuration
    /// lacks a declared parameter. An empty ledger is not an error: the
    /// result is simply empty.
    #[allow(clippy::cast_precision_loss)]
    pub fn transform(
        &self,
        history: &TrialHistory,
        budget_subset: Option<&[Budget]>,
    ) -> Result<EncodedData> {
        let mut data = EncodedData::default();
        let mut instances: Vec<Option<&str>> = Vec::new();

        for (key, record) in history.trials() {
            if let Some(subset) = budget_subset {
                if !key.budget.is_some_and(|b| subset.contains(&b)) {
                    continue;
                }
            }
            let Some(cost) = record.successful_cost().or(self.failure_cost) else {
                continue;
            };
            let mut row = self.encode(history.config(key.config_id)?)?;
            if self.instance_context {
                let instance = key.instance.as_deref();
                let index = instances
                    .iter()
                    .position(|&i| i == instance)
                    .unwrap_or_else(|| {
                        instances.push(instance);
                        instances.len() - 1
                    });
                row.push(index as f64);
            }
            data.x.push(row);
            data.y.push(self.response.forward(cost));
        }

        if self.instance_context {
            data.contexts = (0..instances.len()).map(|i| vec![i as f64]).collect();
        }
        trace_debug!(rows = data.len(), columns = self.n_columns(), "encoded trials");
        Ok(data)
    }

    /// Encodes one configuration into its parameter columns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingParameter`] if `config` lacks a declared
    /// parameter.
    pub fn encode(&self, config: &Configuration) -> Result<Vec<f64>> {
        let mut row = Vec::with_capacity(self.n_parameter_columns());
        for p in self.space.parameter_order() {
            let value = config
                .get(&p.name)
                .ok_or_else(|| Error::MissingParameter(p.name.clone()))?;
            self.encode_value(p, value, &mut row);
        }
        Ok(row)
    }

    #[allow(clippy::cast_precision_loss)]
    fn encode_value(&self, p: &ParameterDescriptor, value: &ParamValue, row: &mut Vec<f64>) {
        match &p.kind {
            ParameterKind::Numeric(d) => {
                let internal = d.to_internal(value);
                if self.normalize {
                    let (lo, hi) = d.internal_bounds();
                    row.push(to_normalized(internal, lo, hi));
                } else {
                    row.push(internal);
                }
            }
            ParameterKind::Categorical { n_choices } => {
                let index = choice_index(value, *n_choices);
                match self.categorical {
                    CategoricalEncoding::Integer => row.push(index as f64),
                    CategoricalEncoding::OneHot => {
                        row.extend((0..*n_choices).map(|i| if i == index { 1.0 } else { 0.0 }));
                    }
                }
            }
            ParameterKind::Ordinal { n_levels } => {
                let index = choice_index(value, *n_levels) as f64;
                if self.normalize {
                    row.push(to_normalized(index, 0.0, (*n_levels - 1) as f64));
                } else {
                    row.push(index);
                }
            }
            ParameterKind::Constant { .. } => row.push(0.0),
        }
    }

    /// Decodes parameter columns back into a configuration.
    ///
    /// Numeric values are clamped to their bounds (and rounded for integer
    /// parameters); categorical columns decode to the nearest valid index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `row` does not have
    /// [`n_parameter_columns`](Self::n_parameter_columns) entries.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn decode(&self, row: &[f64]) -> Result<Configuration> {
        let expected = self.n_parameter_columns();
        if row.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                got: row.len(),
            });
        }

        let mut config = Configuration::new();
        let mut col = 0;
        for p in self.space.parameter_order() {
            let value = match &p.kind {
                ParameterKind::Numeric(d) => {
                    let internal = if self.normalize {
                        let (lo, hi) = d.internal_bounds();
                        from_normalized(row[col], lo, hi)
                    } else {
                        row[col]
                    };
                    d.from_internal(internal)
                }
                ParameterKind::Categorical { n_choices } => match self.categorical {
                    CategoricalEncoding::Integer => {
                        ParamValue::Categorical(nearest_index(row[col], *n_choices))
                    }
                    CategoricalEncoding::OneHot => {
                        let slice = &row[col..col + n_choices];
                        let index = slice
                            .iter()
                            .enumerate()
                            .max_by(|a, b| a.1.total_cmp(b.1))
                            .map_or(0, |(i, _)| i);
                        ParamValue::Categorical(index)
                    }
                },
                ParameterKind::Ordinal { n_levels } => {
                    let index = if self.normalize {
                        row[col] * (*n_levels - 1) as f64
                    } else {
                        row[col]
                    };
                    ParamValue::Categorical(nearest_index(index, *n_levels))
                }
                ParameterKind::Constant { value } => value.clone(),
            };
            col += self.width(&p.kind);
            config.insert(p.name.clone(), value);
        }
        Ok(config)
    }

    /// Applies the response transform to raw costs.
    #[must_use]
    pub fn transform_response_values(&self, y: &[f64]) -> Vec<f64> {
        y.iter().map(|&v| self.response.forward(v)).collect()
    }

    /// Maps model-space values back to cost units.
    #[must_use]
    pub fn inverse_response_values(&self, y: &[f64]) -> Vec<f64> {
        y.iter().map(|&v| self.response.inverse(v)).collect()
    }

    pub(crate) fn inverse_response_value(&self, y: f64) -> f64 {
        self.response.inverse(y)
    }
}

/// Builder for an [`Encoder`].
///
/// Defaults: integer categoricals, normalization on, identity response,
/// failures skipped, no instance context.
#[derive(Clone)]
#[must_use]
pub struct EncoderBuilder {
    space: Arc<dyn ConfigurationSpace>,
    categorical: CategoricalEncoding,
    normalize: bool,
    response: ResponseTransform,
    failure_cost: Option<f64>,
    instance_context: bool,
}

impl EncoderBuilder {
    /// Sets the categorical layout.
    pub fn categorical_encoding(mut self, encoding: CategoricalEncoding) -> Self {
        self.categorical = encoding;
        self
    }

    /// Enables or disables normalization of numeric and ordinal columns to `[0, 1]`.
    pub fn normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Sets the response transform.
    ///
    /// # Panics
    ///
    /// Panics if a log transform is given a non-positive floor.
    pub fn response_transform(mut self, response: ResponseTransform) -> Self {
        if let ResponseTransform::Log { floor } = response {
            assert!(floor > 0.0, "log response floor must be positive, got {floor}");
        }
        self.response = response;
        self
    }

    /// Imputes failed trials with `cost` instead of skipping them.
    pub fn failure_cost(mut self, cost: f64) -> Self {
        self.failure_cost = Some(cost);
        self
    }

    /// Appends the instance index as a final context column.
    pub fn instance_context(mut self, enabled: bool) -> Self {
        self.instance_context = enabled;
        self
    }

    /// Builds the encoder.
    pub fn build(self) -> Encoder {
        Encoder {
            space: self.space,
            categorical: self.categorical,
            normalize: self.normalize,
            response: self.response,
            failure_cost: self.failure_cost,
            instance_context: self.instance_context,
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn choice_index(value: &ParamValue, n: usize) -> usize {
    match value {
        ParamValue::Categorical(i) => (*i).min(n.saturating_sub(1)),
        ParamValue::Int(i) => (*i).clamp(0, n.saturating_sub(1) as i64) as usize,
        ParamValue::Float(v) => nearest_index(*v, n),
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn nearest_index(v: f64, n: usize) -> usize {
    v.round().clamp(0.0, n.saturating_sub(1) as f64) as usize
}

fn to_normalized(value: f64, lo: f64, hi: f64) -> f64 {
    if (hi - lo).abs() < 1e-15 {
        0.5
    } else {
        (value - lo) / (hi - lo)
    }
}

fn from_normalized(value: f64, lo: f64, hi: f64) -> f64 {
    lo + value * (hi - lo)
}
