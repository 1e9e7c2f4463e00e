use crate::config::RefinementConfig;
use crate::data::{DatasetState, BIAS_INDEX};
use crate::engines::evaluation::Template;
use crate::engines::generation::postprocess::same_column;
use crate::engines::refinement::refine;
use crate::error::{FormulabError, Result};
use crate::types::Descriptor;
use ndarray::Array1;

/// Which unresolved placeholders a resolution pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// `log` placeholder terms, resolved right after generation.
    LogFamily,
    /// Every unresolved placeholder left in the working set.
    All,
}

/// What to do with descriptors whose constant could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    Drop,
    Abort,
}

impl OnFailure {
    pub fn from_flag(drop_unresolvable: bool) -> Self {
        if drop_unresolvable {
            OnFailure::Drop
        } else {
            OnFailure::Abort
        }
    }
}

/// Resolve pending placeholders in `scope`.
///
/// Bare top-level shifted terms are set to 0, since the intercept absorbs
/// any additive constant they carry. The rest are refined jointly with the
/// bias column and rematerialized in place.
pub fn resolve_pending(
    state: DatasetState,
    scope: Scope,
    settings: &RefinementConfig,
    on_failure: OnFailure,
) -> Result<DatasetState> {
    let pending: Vec<usize> = state
        .descriptors()
        .iter()
        .enumerate()
        .filter(|(_, d)| match scope {
            Scope::LogFamily => {
                d.is_unresolved() && Template::classify(d).is_some_and(|t| t.kind.is_log_family())
            }
            Scope::All => d.is_unresolved(),
        })
        .map(|(j, _)| j)
        .collect();
    if pending.is_empty() {
        return Ok(state);
    }

    let mut replacements: Vec<(usize, Descriptor, Array1<f64>)> = Vec::new();
    let mut targets: Vec<usize> = Vec::new();
    let mut bare: Vec<usize> = Vec::new();
    let mut redundant: Vec<usize> = Vec::new();
    for &j in &pending {
        let descriptor = &state.descriptors()[j];
        if descriptor.needs_refinement() {
            targets.push(j);
            continue;
        }
        let resolved = descriptor.with_constant(0.0);
        match resolved.evaluate(state.primitives(), None) {
            Ok(values) => {
                bare.push(j);
                replacements.push((j, resolved, values));
            }
            Err(e) if !e.is_fatal() => {
                log::warn!("Dropping '{}': {}", descriptor, e);
                redundant.push(j);
            }
            Err(e) => return Err(e),
        }
    }

    let mut failed: Vec<usize> = Vec::new();
    if !targets.is_empty() {
        let mut descriptors = vec![state.descriptors()[BIAS_INDEX].clone()];
        descriptors.extend(targets.iter().map(|&j| state.descriptors()[j].clone()));
        log::info!("Refining {} placeholder descriptor(s)", targets.len());
        let result = refine(&descriptors, state.primitives(), state.response(), settings)?;

        for (k, &j) in targets.iter().enumerate() {
            if result.is_failed(k + 1) {
                failed.push(j);
            } else {
                replacements.push((
                    j,
                    result.descriptors[k + 1].clone(),
                    result.columns.column(k + 1).to_owned(),
                ));
            }
        }
    }

    let state = state.with_replaced(replacements)?;

    // A bare shift at 0 is its child; drop it where that column already exists.
    for &j in &bare {
        let column = state.columns().column(j);
        let duplicated = (0..state.width()).any(|k| {
            k != j
                && !redundant.contains(&k)
                && !failed.contains(&k)
                && same_column(state.columns().column(k), column)
        });
        if duplicated {
            log::debug!("Dropping '{}': identical to an existing column", state.names()[j]);
            redundant.push(j);
        }
    }
    if redundant.is_empty() {
        return drop_failed(state, &failed, on_failure);
    }

    let failed: Vec<usize> = failed
        .iter()
        .map(|&j| j - redundant.iter().filter(|&&r| r < j).count())
        .collect();
    drop_failed(state.drop_columns(&redundant), &failed, on_failure)
}

/// Apply the failure policy to working-set indices whose refinement failed.
pub fn drop_failed(state: DatasetState, failed: &[usize], on_failure: OnFailure) -> Result<DatasetState> {
    if failed.is_empty() {
        return Ok(state);
    }
    match on_failure {
        OnFailure::Drop => {
            for &j in failed {
                log::warn!("Dropping unresolvable descriptor '{}'", state.names()[j]);
            }
            Ok(state.drop_columns(failed))
        }
        OnFailure::Abort => Err(FormulabError::Optimization {
            descriptor: state.names()[failed[0]].clone(),
            message: "no finite objective inside the constant bracket".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Candidate, Dataset};
    use crate::engines::evaluation::parse_descriptor;

    fn state_with(extra: &[&str]) -> DatasetState {
        let x: Vec<f64> = (0..40).map(|i| 0.1 + i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * (v + 0.8).ln() - 1.0).collect();
        let data = Dataset::from_columns(vec![("x".into(), x)], y).unwrap();
        let state = DatasetState::initial(data, None, None).unwrap();
        let candidates = extra
            .iter()
            .map(|s| {
                let descriptor = parse_descriptor(s).unwrap();
                let values = descriptor.evaluate(state.primitives(), Some(1.0)).unwrap();
                Candidate {
                    descriptor,
                    values,
                    unit: None,
                }
            })
            .collect();
        state.append(candidates).unwrap()
    }

    #[test]
    fn test_log_family_scope_leaves_other_placeholders() {
        let state = state_with(&["(x+$C)", "log((x+$C))", "sqrt((x+$C))"]);
        let out = resolve_pending(state, Scope::LogFamily, &RefinementConfig::default(), OnFailure::Drop)
            .unwrap();
        assert!(out.descriptors()[2].is_unresolved());
        let log = &out.descriptors()[3];
        assert!((log.resolved_constant().unwrap() - 0.8).abs() < 1e-4);
        assert!(out.descriptors()[4].is_unresolved());
        assert!(out.check_invariants().is_ok());
    }

    #[test]
    fn test_bare_shift_duplicating_its_feature_is_dropped() {
        let state = state_with(&["(x+$C)", "(-x+$C)"]);
        let out = resolve_pending(state, Scope::All, &RefinementConfig::default(), OnFailure::Drop).unwrap();
        assert_eq!(out.names(), &["1", "x", "(-x+0)"]);
        assert!(out.check_invariants().is_ok());
    }

    #[test]
    fn test_bare_shift_resolves_to_zero() {
        let state = state_with(&["(x+$C)"]).drop_columns(&[1]);
        let out = resolve_pending(state, Scope::All, &RefinementConfig::default(), OnFailure::Drop).unwrap();
        assert_eq!(out.names(), &["1", "(x+0)"]);
        assert_eq!(out.columns()[[0, 1]], 0.1);
    }

    #[test]
    fn test_failed_index_survives_duplicate_drop() {
        let state = state_with(&["(x+$C)", "log(((-x*100)+$C))", "log((x+$C))"]);
        let out = resolve_pending(state, Scope::All, &RefinementConfig::default(), OnFailure::Drop).unwrap();
        assert_eq!(out.width(), 3);
        assert!(out.names()[2].starts_with("log((x+"));
    }

    #[test]
    fn test_failure_policy() {
        let state = state_with(&["log(((-x*100)+$C))"]);
        let err = resolve_pending(
            state.clone(),
            Scope::All,
            &RefinementConfig::default(),
            OnFailure::Abort,
        );
        assert!(matches!(err, Err(FormulabError::Optimization { .. })));

        let dropped = resolve_pending(state, Scope::All, &RefinementConfig::default(), OnFailure::Drop).unwrap();
        assert_eq!(dropped.width(), 2);
    }
}
