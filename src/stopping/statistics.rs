//! Statistical error estimates from per-trial annotations.

use crate::error::{Error, Result};
use crate::stage::Stage;
use crate::storage::{ConfigId, TrialHistory};
use crate::trial::TrialRecord;

use super::StoppingConfig;

/// Sample-size correction for a cross-validated cost estimate:
/// `1/folds + n_test/n_train` with `n_test = data_points / folds` and
/// `n_train = data_points - n_test`.
///
/// Returns `None` when the counts do not describe a valid split.
#[must_use]
pub fn correction_factor(folds: f64, data_points: f64) -> Option<f64> {
    if folds < 1.0 || data_points <= 0.0 {
        return None;
    }
    let n_test = data_points / folds;
    let n_train = data_points - n_test;
    if n_train <= 0.0 {
        return None;
    }
    Some(1.0 / folds + n_test / n_train)
}

/// Noise annotation of one record, or the fallback threshold.
fn record_error(
    config: &StoppingConfig,
    id: ConfigId,
    record: &TrialRecord,
) -> Result<f64> {
    let annotated = config
        .statistic_name
        .as_deref()
        .and_then(|name| record.statistic(name));
    annotated
        .or(config.fallback_threshold)
        .ok_or_else(|| Error::MissingStatistic {
            config: id,
            name: config.statistic_name.clone().unwrap_or_default(),
        })
}

/// Mean noise annotation over the best configurations of `stage`.
///
/// Every alive configuration with successful trials at the stage budget is
/// scored by its mean cost and mean annotated error; the errors of the best
/// `selected_amount` are averaged. Returns `None` if no configuration has a
/// successful trial at the budget.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub(crate) fn stage_error(
    history: &TrialHistory,
    stage: &Stage,
    config: &StoppingConfig,
) -> Result<Option<f64>> {
    let budget = Some(stage.budget());
    let mut stats: Vec<(f64, f64)> = Vec::new();
    for &id in stage.configs() {
        let mut costs = Vec::new();
        let mut errors = Vec::new();
        for record in history.successful_records(id, budget) {
            if let Some(cost) = record.cost {
                costs.push(cost);
                errors.push(record_error(config, id, record)?);
            }
        }
        if costs.is_empty() {
            continue;
        }
        stats.push((mean(&costs), mean(&errors)));
    }
    if stats.is_empty() {
        return Ok(None);
    }
    stats.sort_by(|a, b| a.0.total_cmp(&b.0));

    let selected = if config.only_incumbent {
        1
    } else {
        ((stage.amount_configs_to_yield() as f64 * config.config_estimation_percentage).round()
            as usize)
            .max(1)
    }
    .min(stats.len());

    let errors: Vec<f64> = stats[..selected].iter().map(|s| s.1).collect();
    Ok(Some(mean(&errors)))
}

/// `factor · std²` of the incumbent, averaged over its successful records
/// at their highest budget per run.
pub(crate) fn incumbent_error(
    history: &TrialHistory,
    incumbent: ConfigId,
    config: &StoppingConfig,
) -> Result<f64> {
    let missing = |name: &str| {
        config.fallback_threshold.ok_or_else(|| Error::MissingStatistic {
            config: incumbent,
            name: name.to_owned(),
        })
    };

    let mut errors = Vec::new();
    for record in history.successful_records(incumbent, None) {
        let Some(std) = record.statistic(&config.std_field) else {
            errors.push(missing(&config.std_field)?);
            continue;
        };
        let folds = record.statistic(&config.folds_field);
        let points = record.statistic(&config.data_points_field);
        let factor = match (folds, points) {
            (Some(f), Some(p)) => correction_factor(f, p),
            _ => None,
        };
        match factor {
            Some(factor) => errors.push(factor * std * std),
            None if folds.is_none() => errors.push(missing(&config.folds_field)?),
            None => errors.push(missing(&config.data_points_field)?),
        }
    }
    if errors.is_empty() {
        return missing(&config.std_field);
    }
    Ok(mean(&errors))
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
