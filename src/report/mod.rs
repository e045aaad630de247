//! Status reporting and the final textual reports.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{info, warn};

use crate::config::Config;
use crate::result::{EvalResult, RetCode};
use crate::store::ResultStore;

/// Reporting hooks the orchestrator calls at fixed points of a run.
pub trait Reporter: Send + Sync {
    fn log_config(&self);

    /// Log the current best result if it changed since the last call.
    fn log_best(&self);

    fn print_status(&self, elapsed_minutes: f64);

    fn report_summary(&self) -> String;

    /// Report on the materialized outputs. Empty when there is nothing to report.
    fn report_output(&self, outputs: &[EvalResult]) -> String;
}

/// Plain-text reporter backed by the result store.
pub struct TextReporter {
    store: Arc<ResultStore>,
    config: Config,
    started: Instant,
    last_best: Mutex<Option<f64>>,
}

impl TextReporter {
    pub fn new(store: Arc<ResultStore>, config: Config) -> Self {
        TextReporter {
            store,
            config,
            started: Instant::now(),
            last_best: Mutex::new(None),
        }
    }
}

impl Reporter for TextReporter {
    fn log_config(&self) {
        info!(
            project = %self.config.project.name,
            algorithm = %self.config.search.algorithm,
            max_parts = self.config.design_space.max_part_num,
            workers_per_part = self.config.evaluate.worker_per_part,
            outputs = self.config.project.output_num,
            exploration_minutes = self.config.timeout.exploration,
            backend = ?self.config.database.backend,
            "exploration config"
        );
    }

    fn log_best(&self) {
        let best = match self.store.peek_best() {
            Ok(best) => best,
            Err(err) => {
                warn!(error = %err, "failed to read best result");
                return;
            }
        };
        let Some(best) = best else {
            return;
        };
        let Ok(mut last) = self.last_best.lock() else {
            return;
        };
        if *last != Some(best.quality) {
            *last = Some(best.quality);
            let key = best.result.point.as_ref().map(|p| p.key()).unwrap_or_default();
            info!(quality = best.quality, point = %key, "new best result");
        }
    }

    fn print_status(&self, elapsed_minutes: f64) {
        match self.store.count() {
            Ok(explored) => info!(
                elapsed_minutes = %format!("{:.1}", elapsed_minutes),
                explored, "exploration status"
            ),
            Err(err) => warn!(error = %err, "failed to count explored points"),
        }
    }

    fn report_summary(&self) -> String {
        let mut rpt = String::new();
        let _ = writeln!(rpt, "project          : {}", self.config.project.name);
        let _ = writeln!(rpt, "search algorithm : {}", self.config.search.algorithm);
        let _ = writeln!(
            rpt,
            "elapsed minutes  : {:.1}",
            self.started.elapsed().as_secs_f64() / 60.0
        );

        match self.store.count() {
            Ok(total) => {
                let _ = writeln!(rpt, "explored points  : {}", total);
            }
            Err(err) => {
                let _ = writeln!(rpt, "explored points  : unavailable ({})", err);
            }
        }
        for ret_code in RetCode::ALL {
            if let Ok(count) = self.store.count_by_outcome(ret_code) {
                let _ = writeln!(rpt, "  {:<15}: {}", ret_code.as_str(), count);
            }
        }
        if let Ok(Some(best)) = self.store.peek_best() {
            let _ = writeln!(rpt, "best quality     : {}", best.quality);
        }
        rpt
    }

    fn report_output(&self, outputs: &[EvalResult]) -> String {
        if outputs.is_empty() {
            return String::new();
        }
        let mut rpt = String::new();
        let _ = writeln!(rpt, "{:<6} {:<14} point", "output", "quality");
        for result in outputs {
            let _ = writeln!(
                rpt,
                "{:<6} {:<14} {}",
                result.path.as_deref().unwrap_or("-"),
                result
                    .quality
                    .map(|q| q.to_string())
                    .unwrap_or_else(|| "-".into()),
                result.point.as_ref().map(|p| p.key()).unwrap_or_default()
            );
        }
        rpt
    }
}
