use super::pipeline::{drop_failed, resolve_pending, OnFailure, Scope};
use super::progress::{ConsoleProgressCallback, ProgressCallback};
use crate::config::{AppConfig, Criterion};
use crate::data::{Dataset, DatasetState, BIAS_INDEX};
use crate::engines::evaluation::{rematerialize_lenient, Template};
use crate::engines::generation::{DimensionFilter, Generator};
use crate::engines::refinement::refine;
use crate::engines::selection::{
    correlation_screen, rank_by_correlation, ExhaustiveSelector, ForestScreener, LassoScreener,
    Screener, SparseScreener, SubsetSelector, Validation,
};
use crate::error::{FormulabError, Result};
use crate::report::{ModelSummary, RunReport};
use crate::types::Descriptor;
use crate::utils::stats;
use ndarray::{Array2, Axis};
use std::time::Instant;

/// The selected formula before it is written into a report.
struct FinalModel {
    descriptors: Vec<Descriptor>,
    columns: Array2<f64>,
    intercept: f64,
    weights: Vec<f64>,
    rmse: f64,
    models: Vec<ModelSummary>,
    criterion: Option<Criterion>,
}

/// Runs the generate / screen / refine / select loop over one dataset.
pub struct SearchEngine {
    config: AppConfig,
    generator: Generator,
    screener: Box<dyn Screener>,
    sparse_screener: Box<dyn SparseScreener>,
    subset_selector: Box<dyn SubsetSelector>,
}

impl SearchEngine {
    /// Build an engine with the default collaborators. The configuration is
    /// validated here, before any data is touched.
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            generator: Generator::new(config.refinement.surrogate),
            screener: Box::new(ForestScreener::from_config(&config.screening)),
            sparse_screener: Box::new(LassoScreener::from_config(&config.selection)),
            subset_selector: Box::new(ExhaustiveSelector::from_config(&config.selection)),
            config,
        })
    }

    pub fn with_screener(mut self, screener: Box<dyn Screener>) -> Self {
        self.screener = screener;
        self
    }

    pub fn with_sparse_screener(mut self, screener: Box<dyn SparseScreener>) -> Self {
        self.sparse_screener = screener;
        self
    }

    pub fn with_subset_selector(mut self, selector: Box<dyn SubsetSelector>) -> Self {
        self.subset_selector = selector;
        self
    }

    pub fn with_dimension_filter(mut self, filter: Box<dyn DimensionFilter>) -> Self {
        self.generator = self.generator.with_dimension_filter(filter);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn run(&self, data: &Dataset) -> Result<RunReport> {
        self.run_with_progress(data, ConsoleProgressCallback)
    }

    pub fn run_with_progress<C: ProgressCallback>(
        &self,
        data: &Dataset,
        mut callback: C,
    ) -> Result<RunReport> {
        let started = Instant::now();
        let search = &self.config.search;
        let on_failure = OnFailure::from_flag(search.drop_unresolvable);
        data.validate_shape()?;

        let (train, holdout) = match search.test_fraction {
            Some(fraction) => {
                let (train, test) = data.split(fraction, search.seed)?;
                log::info!(
                    "Split {} rows into {} train / {} holdout",
                    data.n_rows(),
                    train.n_rows(),
                    test.n_rows()
                );
                (train, Some(test))
            }
            None => (data.clone(), None),
        };
        let (train, holdout) = if search.correlation_screen {
            Self::screen_primitives(train, holdout)?
        } else {
            (train, holdout)
        };

        let mut state = DatasetState::initial(train, holdout, search.unit_table())?;
        let flags = search.stage_flags();

        for (i, &stage) in search.operator_stages.iter().enumerate() {
            let iteration = i + 1;
            let held = search.is_held(iteration);
            callback.on_iteration_start(iteration, stage, held);

            state = if held {
                state.record_selection(None)
            } else {
                let seed = search.seed.wrapping_add(iteration as u64);
                self.screen(state, search.screen_sizes[i], seed)?
            };
            state = self.generator.apply(state, stage, flags)?;
            state = resolve_pending(state, Scope::LogFamily, &self.config.refinement, on_failure)?;

            let generated = state.generation_sizes().last().copied().unwrap_or(0);
            let selected = state.selection_sizes().last().copied().flatten();
            callback.on_iteration_complete(iteration, generated, selected);
        }

        let (state, model) = if search.exact_recovery {
            let model = self.exact_recovery(&state, on_failure)?;
            (state, model)
        } else {
            self.select_final(state, on_failure)?
        };

        let mut report = RunReport {
            names: model.descriptors.iter().map(|d| d.to_string()).collect(),
            terms: model.descriptors.clone(),
            columns: model.columns.axis_iter(Axis(1)).map(|c| c.to_vec()).collect(),
            coefficients: std::iter::once(model.intercept).chain(model.weights).collect(),
            constants: model.descriptors.iter().map(Descriptor::resolved_constant).collect(),
            generation_sizes: state.generation_sizes().to_vec(),
            selection_sizes: state.selection_sizes().to_vec(),
            train_rmse: model.rmse,
            test_rmse: None,
            runtime_seconds: 0.0,
            models: model.models,
            criterion: model.criterion,
            exact_recovery: search.exact_recovery,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        if let Some(holdout) = state.holdout() {
            let predicted = report.predict(&holdout.primitives)?;
            report.test_rmse = Some(stats::rmse(predicted.view(), holdout.response.view()));
        }
        report.runtime_seconds = started.elapsed().as_secs_f64();

        callback.on_selection_complete(&report.names, report.train_rmse);
        Ok(report)
    }

    /// Drop primitives whose correlation with the response is undefined.
    fn screen_primitives(train: Dataset, holdout: Option<Dataset>) -> Result<(Dataset, Option<Dataset>)> {
        let keep = correlation_screen(train.primitives.values().view(), train.response.view());
        if keep.is_empty() {
            return Err(FormulabError::SelectionExhausted(
                "correlation screening".to_string(),
            ));
        }
        if keep.len() == train.primitives.n_features() {
            return Ok((train, holdout));
        }

        let names: Vec<String> = keep
            .iter()
            .map(|&j| train.primitives.names()[j].clone())
            .collect();
        for name in train.primitives.names().iter().filter(|n| !names.contains(n)) {
            log::info!("Dropping feature '{}': correlation with the response is undefined", name);
        }
        let holdout = holdout.map(|h| h.retain_features(&names)).transpose()?;
        Ok((train.retain_features(&names)?, holdout))
    }

    /// Tree screen over the finite candidate columns.
    fn screen(&self, state: DatasetState, keep: usize, seed: u64) -> Result<DatasetState> {
        let non_finite: Vec<usize> = (BIAS_INDEX + 1..state.width())
            .filter(|&j| !stats::is_finite_column(state.columns().column(j)))
            .collect();
        let state = if non_finite.is_empty() {
            state
        } else {
            log::debug!("Dropping {} non-finite columns before screening", non_finite.len());
            state.drop_columns(&non_finite)
        };
        if state.candidate_count() == 0 {
            return Err(FormulabError::SelectionExhausted("tree screening".to_string()));
        }

        let kept = self
            .screener
            .screen(state.candidate_columns(), state.response(), keep, seed)?;
        if kept.is_empty() {
            return Err(FormulabError::SelectionExhausted("tree screening".to_string()));
        }
        let before = state.candidate_count();
        let state = state.retain_candidates(&kept)?;
        log::info!("Tree screen kept {} of {} candidates", state.candidate_count(), before);
        let count = state.candidate_count();
        Ok(state.record_selection(Some(count)))
    }

    /// Keep the `max_terms` log-family terms most correlated with the
    /// response and solve for them jointly with the bias, sweeping until the
    /// constants settle.
    fn exact_recovery(&self, state: &DatasetState, on_failure: OnFailure) -> Result<FinalModel> {
        let log_terms: Vec<usize> = (BIAS_INDEX + 1..state.width())
            .filter(|&j| {
                Template::classify(&state.descriptors()[j]).is_some_and(|t| t.kind.is_log_family())
            })
            .collect();
        let columns = state.columns().select(Axis(1), &log_terms);
        let mut top: Vec<usize> = rank_by_correlation(columns.view(), state.response())
            .into_iter()
            .take(self.config.selection.max_terms)
            .map(|k| log_terms[k])
            .collect();
        if top.is_empty() {
            return Err(FormulabError::SelectionExhausted(
                "exact-recovery ranking".to_string(),
            ));
        }
        top.sort_unstable();

        let mut descriptors = vec![state.descriptors()[BIAS_INDEX].clone()];
        descriptors.extend(top.iter().map(|&j| state.descriptors()[j].clone()));
        log::info!(
            "Exact recovery over [{}]",
            top.iter()
                .map(|&j| state.names()[j].as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let settings = self.config.refinement.exact();
        let result = refine(&descriptors, state.primitives(), state.response(), &settings)?;
        let keep: Vec<usize> = (1..descriptors.len()).filter(|&k| !result.is_failed(k)).collect();
        if keep.len() + 1 < descriptors.len() {
            if on_failure == OnFailure::Abort {
                return Err(FormulabError::Optimization {
                    descriptor: result.failed.join(", "),
                    message: "no finite objective inside the constant bracket".to_string(),
                });
            }
            for name in &result.failed {
                log::warn!("Dropping unresolvable descriptor '{}'", name);
            }
        }
        if keep.is_empty() {
            return Err(FormulabError::SelectionExhausted(
                "exact-recovery refinement".to_string(),
            ));
        }

        Ok(FinalModel {
            descriptors: keep.iter().map(|&k| result.descriptors[k].clone()).collect(),
            columns: result.columns.select(Axis(1), &keep),
            intercept: result.weights[BIAS_INDEX],
            weights: keep.iter().map(|&k| result.weights[k]).collect(),
            rmse: result.rmse,
            models: Vec::new(),
            criterion: None,
        })
    }

    /// Resolve leftovers, run the L1 screen, refine the survivors and pick
    /// the best subset.
    fn select_final(&self, state: DatasetState, on_failure: OnFailure) -> Result<(DatasetState, FinalModel)> {
        let settings = &self.config.refinement;
        let selection = &self.config.selection;

        let state = resolve_pending(state, Scope::All, settings, on_failure)?;
        let non_finite: Vec<usize> = (BIAS_INDEX + 1..state.width())
            .filter(|&j| !stats::is_finite_column(state.columns().column(j)))
            .collect();
        let state = state.drop_columns(&non_finite);
        if state.candidate_count() == 0 {
            return Err(FormulabError::SelectionExhausted("L1 screening".to_string()));
        }

        let holdout_design = self.holdout_design(&state);
        let validation = match (&holdout_design, state.holdout()) {
            (Some(x), Some(holdout)) => Some(Validation {
                x: x.view(),
                y: holdout.response.view(),
            }),
            _ => None,
        };
        let fit = self.sparse_screener.fit(
            state.candidate_columns(),
            state.response(),
            validation,
            selection.l1_max_features,
        )?;
        if fit.support.is_empty() {
            return Err(FormulabError::SelectionExhausted("L1 screening".to_string()));
        }
        log::info!(
            "L1 screen kept {} of {} candidates",
            fit.support.len(),
            state.candidate_count()
        );
        let state = state.retain_candidates(&fit.support)?;

        let state = if state.descriptors().iter().any(Descriptor::has_placeholder) {
            let result = refine(state.descriptors(), state.primitives(), state.response(), settings)?;
            let failed: Vec<usize> = (0..state.width()).filter(|&j| result.is_failed(j)).collect();
            let state = state.with_rebuilt(result.descriptors, result.columns)?;
            drop_failed(state, &failed, on_failure)?
        } else {
            state
        };
        if state.candidate_count() == 0 {
            return Err(FormulabError::SelectionExhausted("final refinement".to_string()));
        }

        let subsets = self.subset_selector.select(
            state.candidate_columns(),
            state.response(),
            selection.max_terms,
            selection.criterion,
            selection.parallel,
        )?;
        let n = state.response().len() as f64;
        let models: Vec<ModelSummary> = subsets
            .per_size
            .iter()
            .map(|m| ModelSummary {
                terms: m.indices.iter().map(|&k| state.names()[k + 1].clone()).collect(),
                coefficients: std::iter::once(m.intercept)
                    .chain(m.coefficients.iter().copied())
                    .collect(),
                rmse: (m.rss / n).sqrt(),
                score: m.score,
            })
            .collect();

        let winner = subsets.winner();
        let indices: Vec<usize> = winner.indices.iter().map(|&k| k + 1).collect();
        let model = FinalModel {
            descriptors: indices.iter().map(|&j| state.descriptors()[j].clone()).collect(),
            columns: state.columns().select(Axis(1), &indices),
            intercept: winner.intercept,
            weights: winner.coefficients.clone(),
            rmse: (winner.rss / n).sqrt(),
            models,
            criterion: Some(selection.criterion),
        };
        Ok((state, model))
    }

    /// Candidate columns evaluated on the holdout rows, or `None` when
    /// there is no holdout or it cannot be evaluated cleanly.
    fn holdout_design(&self, state: &DatasetState) -> Option<Array2<f64>> {
        let holdout = state.holdout()?;
        let descriptors = state.descriptors()[BIAS_INDEX + 1..].to_vec();
        let expected = descriptors.len();
        let (kept, design) =
            rematerialize_lenient(descriptors, &holdout.primitives, self.config.refinement.surrogate);
        if kept.len() == expected && design.iter().all(|v| v.is_finite()) {
            Some(design)
        } else {
            log::warn!("Holdout columns could not be evaluated cleanly; L1 path chosen in-sample");
            None
        }
    }
}
