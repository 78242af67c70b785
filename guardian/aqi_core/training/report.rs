use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Evaluation summary of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Id of the artifact pair produced by the run.
    pub artifact_id: Uuid,
    /// Label column actually used.
    pub target_column: String,
    /// Rows used to fit the persisted forest.
    pub train_rows: usize,
    /// Held-out rows.
    pub test_rows: usize,
    /// Held-out root mean squared error.
    pub rmse: f64,
    /// Held-out mean absolute error.
    pub mae: f64,
    /// Held-out coefficient of determination.
    pub r2: f64,
    /// Mean RMSE across cross-validation folds.
    pub cv_rmse: f64,
    /// Standard deviation of the fold RMSEs.
    pub cv_std: f64,
    /// Feature importances in schema order.
    pub importance: IndexMap<String, f64>,
}

impl TrainingReport {
    /// The `n` most important features, most important first.
    #[must_use]
    pub fn top_features(&self, n: usize) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .importance
            .iter()
            .map(|(name, value)| (name.as_str(), *value))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(n);
        ranked
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let top: Vec<String> = self
            .top_features(3)
            .into_iter()
            .map(|(name, value)| format!("{name}={value:.3}"))
            .collect();
        format!(
            "artifact {} on '{}': rmse {:.2}, mae {:.2}, r2 {:.3}, cv rmse {:.2} ± {:.2} ({} train / {} test); top: {}",
            self.artifact_id,
            self.target_column,
            self.rmse,
            self.mae,
            self.r2,
            self.cv_rmse,
            self.cv_std,
            self.train_rows,
            self.test_rows,
            top.join(", ")
        )
    }
}
