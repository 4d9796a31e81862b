//! Configuration spaces: the ordered parameter declarations the encoder
//! builds its column layout from.
//!
//! The racing core does not propose configurations itself, but the
//! [`ConfigurationSpace`] capability is still needed in two places: the
//! [`Encoder`](crate::encoder::Encoder) reads [`parameter_order`] to lay out
//! feature columns, and the stopping engine samples random configurations to
//! estimate an optimistic lower bound over the whole space.
//!
//! [`SearchSpace`] is a ready-made implementation with a validating builder:
//!
//! ```
//! use intensify::space::{ConfigurationSpace, SearchSpace};
//!
//! let space = SearchSpace::builder()
//!     .float("lr", 1e-5, 1e-1)
//!     .log_scale()
//!     .int("layers", 1, 8)
//!     .categorical("optimizer", 3)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(space.parameter_order().len(), 3);
//! let mut rng = fastrand::Rng::with_seed(7);
//! let config = space.sample(&mut rng);
//! assert_eq!(config.len(), 3);
//! ```
//!
//! [`parameter_order`]: ConfigurationSpace::parameter_order

use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::param::{Configuration, ParamValue};

/// The domain of a numeric parameter.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NumericDomain {
    /// Lower bound (inclusive).
    pub low: f64,
    /// Upper bound (inclusive).
    pub high: f64,
    /// Whether values live on a log scale.
    pub log_scale: bool,
    /// Whether values are integers.
    pub integer: bool,
}

impl NumericDomain {
    /// Bounds in internal space (log-transformed when `log_scale`).
    pub(crate) fn internal_bounds(&self) -> (f64, f64) {
        if self.log_scale {
            (self.low.ln(), self.high.ln())
        } else {
            (self.low, self.high)
        }
    }

    /// Maps a parameter value into internal space.
    pub(crate) fn to_internal(&self, value: &ParamValue) -> f64 {
        let v = value.as_f64();
        if self.log_scale { v.ln() } else { v }
    }

    /// Maps an internal-space value back to a parameter value.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn from_internal(&self, internal: f64) -> ParamValue {
        let v = if self.log_scale {
            internal.exp()
        } else {
            internal
        };
        let v = v.clamp(self.low, self.high);
        if self.integer {
            ParamValue::Int(v.round() as i64)
        } else {
            ParamValue::Float(v)
        }
    }
}

/// What kind of values a parameter takes.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParameterKind {
    /// A float or integer range.
    Numeric(NumericDomain),
    /// An unordered choice among `n_choices` options.
    Categorical {
        /// Number of choices.
        n_choices: usize,
    },
    /// An ordered choice among `n_levels` levels.
    Ordinal {
        /// Number of levels.
        n_levels: usize,
    },
    /// A fixed value.
    Constant {
        /// The value every configuration carries.
        value: ParamValue,
    },
}

/// One declared parameter: a name and its kind.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterDescriptor {
    /// The parameter name, used as the key in a [`Configuration`].
    pub name: String,
    /// The kind of values the parameter takes.
    pub kind: ParameterKind,
    /// The value used by [`ConfigurationSpace::default_configuration`].
    pub default: ParamValue,
}

/// A space of configurations with a fixed, ordered parameter set.
pub trait ConfigurationSpace: Send + Sync {
    /// The declared parameters in layout order.
    fn parameter_order(&self) -> &[ParameterDescriptor];

    /// Draw a configuration uniformly at random (log-uniform for log-scale
    /// numerics).
    fn sample(&self, rng: &mut fastrand::Rng) -> Configuration {
        self.parameter_order()
            .iter()
            .map(|p| (p.name.clone(), sample_value(rng, &p.kind)))
            .collect()
    }

    /// The configuration assembled from every parameter's default.
    fn default_configuration(&self) -> Configuration {
        self.parameter_order()
            .iter()
            .map(|p| (p.name.clone(), p.default.clone()))
            .collect()
    }
}

fn sample_value(rng: &mut fastrand::Rng, kind: &ParameterKind) -> ParamValue {
    match kind {
        ParameterKind::Numeric(d) => {
            let (lo, hi) = d.internal_bounds();
            d.from_internal(lo + rng.f64() * (hi - lo))
        }
        ParameterKind::Categorical { n_choices } => ParamValue::Categorical(rng.usize(0..*n_choices)),
        ParameterKind::Ordinal { n_levels } => ParamValue::Categorical(rng.usize(0..*n_levels)),
        ParameterKind::Constant { value } => value.clone(),
    }
}

/// A concrete [`ConfigurationSpace`] built from explicit declarations.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SearchSpace {
    parameters: Vec<ParameterDescriptor>,
}

impl SearchSpace {
    /// Returns a builder for declaring parameters in layout order.
    #[must_use]
    pub fn builder() -> SearchSpaceBuilder {
        SearchSpaceBuilder::default()
    }

    /// Returns `true` when every parameter is numeric.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        self.parameters
            .iter()
            .all(|p| matches!(p.kind, ParameterKind::Numeric(_)))
    }
}

impl ConfigurationSpace for SearchSpace {
    fn parameter_order(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }
}

/// Builder for a [`SearchSpace`].
///
/// Declarations are validated in [`build`](SearchSpaceBuilder::build):
/// bounds must be ordered, log-scale bounds positive, choice lists
/// non-empty and names unique.
#[derive(Clone, Debug, Default)]
pub struct SearchSpaceBuilder {
    parameters: Vec<ParameterDescriptor>,
}

impl SearchSpaceBuilder {
    /// Declares a float parameter in `[low, high]` defaulting to the midpoint.
    #[must_use]
    pub fn float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDescriptor {
            name: name.into(),
            kind: ParameterKind::Numeric(NumericDomain {
                low,
                high,
                log_scale: false,
                integer: false,
            }),
            default: ParamValue::Float(f64::midpoint(low, high)),
        });
        self
    }

    /// Declares an integer parameter in `[low, high]` defaulting to the lower bound.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.parameters.push(ParameterDescriptor {
            name: name.into(),
            kind: ParameterKind::Numeric(NumericDomain {
                low: low as f64,
                high: high as f64,
                log_scale: false,
                integer: true,
            }),
            default: ParamValue::Int(low),
        });
        self
    }

    /// Declares a categorical parameter with `n_choices` options (default: the first).
    #[must_use]
    pub fn categorical(mut self, name: impl Into<String>, n_choices: usize) -> Self {
        self.parameters.push(ParameterDescriptor {
            name: name.into(),
            kind: ParameterKind::Categorical { n_choices },
            default: ParamValue::Categorical(0),
        });
        self
    }

    /// Declares an ordinal parameter with `n_levels` levels (default: the first).
    #[must_use]
    pub fn ordinal(mut self, name: impl Into<String>, n_levels: usize) -> Self {
        self.parameters.push(ParameterDescriptor {
            name: name.into(),
            kind: ParameterKind::Ordinal { n_levels },
            default: ParamValue::Categorical(0),
        });
        self
    }

    /// Declares a constant parameter.
    #[must_use]
    pub fn constant(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.parameters.push(ParameterDescriptor {
            name: name.into(),
            kind: ParameterKind::Constant {
                value: value.clone(),
            },
            default: value,
        });
        self
    }

    /// Switches the most recently declared numeric parameter to log scale.
    ///
    /// The default moves to the geometric midpoint.
    ///
    /// # Panics
    ///
    /// Panics if the last declared parameter is not numeric.
    #[must_use]
    pub fn log_scale(mut self) -> Self {
        let last = self
            .parameters
            .last_mut()
            .expect("log_scale() must follow a numeric declaration");
        let ParameterKind::Numeric(domain) = &mut last.kind else {
            panic!("log_scale() must follow a numeric declaration");
        };
        domain.log_scale = true;
        if domain.low > 0.0 && domain.high > 0.0 {
            last.default = domain.from_internal(f64::midpoint(domain.low.ln(), domain.high.ln()));
        }
        self
    }

    /// Overrides the default of the most recently declared parameter.
    ///
    /// # Panics
    ///
    /// Panics if no parameter has been declared yet.
    #[must_use]
    pub fn default_value(mut self, value: ParamValue) -> Self {
        let last = self
            .parameters
            .last_mut()
            .expect("default_value() must follow a declaration");
        last.default = value;
        self
    }

    /// Validates the declarations and builds the space.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`], [`Error::InvalidLogBounds`],
    /// [`Error::EmptyChoices`] or [`Error::DuplicateParameter`].
    pub fn build(self) -> Result<SearchSpace> {
        let mut seen = HashSet::new();
        for p in &self.parameters {
            if !seen.insert(p.name.as_str()) {
                return Err(Error::DuplicateParameter(p.name.clone()));
            }
            match &p.kind {
                ParameterKind::Numeric(d) => {
                    if d.low > d.high {
                        return Err(Error::InvalidBounds {
                            low: d.low,
                            high: d.high,
                        });
                    }
                    if d.log_scale && d.low <= 0.0 {
                        return Err(Error::InvalidLogBounds);
                    }
                }
                ParameterKind::Categorical { n_choices: 0 } | ParameterKind::Ordinal { n_levels: 0 } => {
                    return Err(Error::EmptyChoices(p.name.clone()));
                }
                _ => {}
            }
        }
        Ok(SearchSpace {
            parameters: self.parameters,
        })
    }
}
