//! Trajectory anomaly engine
//!
//! Validates the trajectory, extracts segment features, hands them to the
//! model lifecycle, and turns per-segment scores into a single verdict.

use crate::config::ModelConfig;
use crate::error::{EngineError, Result};
use crate::feature_extractor::FeatureExtractor;
use crate::models::{
    BatchOutcome, IsolationForest, Label, LifecyclePhase, ModelLifecycleManager, OutlierModel,
};
use crate::observer::EngineObserver;
use crate::types::position::{Position, Trajectory};
use crate::types::verdict::Verdict;
use std::sync::Arc;
use tracing::debug;

const ANONYMOUS_SUBJECT: &str = "anonymous";

/// Orchestrates feature extraction, the model lifecycle, and the decision policy
pub struct AnomalyEngine<M: OutlierModel = IsolationForest> {
    extractor: FeatureExtractor,
    lifecycle: ModelLifecycleManager<M>,
    observers: Vec<Arc<dyn EngineObserver>>,
}

impl AnomalyEngine<IsolationForest> {
    /// Create an engine backed by an unfitted isolation forest
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        Ok(Self::with_model(IsolationForest::new(config)?))
    }
}

impl<M: OutlierModel> AnomalyEngine<M> {
    /// Create an engine around any outlier model
    pub fn with_model(model: M) -> Self {
        Self {
            extractor: FeatureExtractor::new(),
            lifecycle: ModelLifecycleManager::new(model),
            observers: Vec::new(),
        }
    }

    /// Register an observer for engine events
    pub fn with_observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Analyze a trajectory without a subject identifier
    pub fn analyze(&self, positions: &[Position]) -> Result<Verdict> {
        self.analyze_subject(ANONYMOUS_SUBJECT, positions)
    }

    /// Analyze one subject's trajectory.
    ///
    /// The first successful call trains the shared model and returns a
    /// training verdict; every later call is scored against that model.
    /// Trajectories shorter than two positions are rejected before any
    /// model state is touched.
    pub fn analyze_subject(&self, subject_id: &str, positions: &[Position]) -> Result<Verdict> {
        let trajectory = Trajectory::new(positions.to_vec())?;

        let batch = self.extractor.extract(trajectory.positions());
        for observer in &self.observers {
            observer.on_features(subject_id, &batch);
        }

        match self.lifecycle.process_batch(&batch)? {
            BatchOutcome::TrainingCompleted { corpus_size } => {
                for observer in &self.observers {
                    observer.on_phase_transition(
                        LifecyclePhase::Untrained,
                        LifecyclePhase::Trained,
                        corpus_size,
                    );
                }
                Ok(Verdict::training_completed())
            }
            BatchOutcome::Scored { labels, scores } => {
                for observer in &self.observers {
                    observer.on_scored(subject_id, &scores, &labels);
                }
                let verdict = decide(&scores, &labels)?;
                debug!(
                    subject_id = %subject_id,
                    segments = trajectory.segment_count(),
                    anomaly = verdict.anomaly,
                    risk_score = verdict.risk_score,
                    "Trajectory verdict"
                );
                Ok(verdict)
            }
        }
    }

    /// Current lifecycle phase of the shared model
    pub fn phase(&self) -> Result<LifecyclePhase> {
        self.lifecycle.phase()
    }

    /// Name of the underlying outlier model
    pub fn model_name(&self) -> Result<String> {
        self.lifecycle.model_name()
    }

    /// Number of features per segment
    pub fn feature_count(&self) -> usize {
        self.extractor.feature_count()
    }

    /// Feature names in vector order
    pub fn feature_names(&self) -> Vec<&'static str> {
        self.extractor.feature_names()
    }
}

/// The most anomalous segment decides the trajectory: one outlier flags the
/// whole window, and the risk score is the minimum segment score.
fn decide(scores: &[f64], labels: &[Label]) -> Result<Verdict> {
    if scores.is_empty() {
        return Err(EngineError::DegenerateFeatureBatch);
    }
    if scores.len() != labels.len() {
        return Err(EngineError::InconsistentModelOutput(format!(
            "{} scores for {} labels",
            scores.len(),
            labels.len()
        )));
    }

    let risk_score = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let outlier_segments: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|(_, label)| label.is_outlier())
        .map(|(idx, _)| idx)
        .collect();

    Ok(Verdict::scored(risk_score, outlier_segments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extractor::FeatureVector;
    use crate::types::verdict::VerdictPhase;
    use std::sync::Mutex;

    /// Exactly representable latitude step (~27 m) so smooth segments are bit-identical
    const STEP: f64 = 1.0 / 4096.0;

    fn smooth(start: f64) -> Vec<Position> {
        (0..5)
            .map(|i| Position::new(28.5 + STEP * i as f64, 77.0, start + 60.0 * i as f64))
            .collect()
    }

    /// Same path as `smooth`, with a ~15 km excursion inserted after the second fix
    fn with_jump(start: f64) -> Vec<Position> {
        let base = smooth(start);
        let mut positions = vec![base[0], base[1]];
        positions.push(Position::new(
            base[1].latitude + 0.1,
            base[1].longitude + 0.1,
            base[1].timestamp + 60.0,
        ));
        for p in &base[2..] {
            positions.push(Position::new(p.latitude, p.longitude, p.timestamp + 60.0));
        }
        positions
    }

    fn engine() -> AnomalyEngine {
        let config = ModelConfig {
            random_state: Some(42),
            ..ModelConfig::default()
        };
        AnomalyEngine::from_config(&config).unwrap()
    }

    #[test]
    fn test_first_call_trains() {
        let engine = engine();
        let verdict = engine.analyze_subject("tourist123", &smooth(1694683400.0)).unwrap();

        assert_eq!(verdict.phase, VerdictPhase::TrainingCompleted);
        assert!(!verdict.anomaly);
        assert_eq!(verdict.risk_score, 0.0);
        assert_eq!(verdict.explanation, "training complete");
        assert_eq!(engine.phase().unwrap(), LifecyclePhase::Trained);
        assert_eq!(engine.feature_count(), engine.feature_names().len());
    }

    #[test]
    fn test_jump_is_flagged_and_scores_lower() {
        let engine = engine();
        engine.analyze_subject("tourist123", &smooth(1694683400.0)).unwrap();

        let anomalous = engine.analyze_subject("tourist123", &with_jump(1694683700.0)).unwrap();
        assert_eq!(anomalous.phase, VerdictPhase::Scored);
        assert!(anomalous.anomaly);
        assert_eq!(anomalous.explanation, "anomaly detected");
        assert_eq!(anomalous.outlier_segments, vec![1, 2]);

        let normal = engine.analyze_subject("tourist123", &smooth(1694684000.0)).unwrap();
        assert_eq!(normal.phase, VerdictPhase::Scored);
        assert!(!normal.anomaly);
        assert_eq!(normal.explanation, "no anomaly");

        assert!(
            anomalous.risk_score < normal.risk_score,
            "anomalous {} should be below normal {}",
            anomalous.risk_score,
            normal.risk_score
        );
    }

    /// Walk in 0.0003 degree latitude steps, 60 s apart; steps differ in their last bits
    fn walk(lat0: f64, start: f64, fixes: usize) -> Vec<Position> {
        (0..fixes)
            .map(|i| Position::new(lat0 + 0.0003 * i as f64, 77.2, start + 60.0 * i as f64))
            .collect()
    }

    /// Walk with a ~11 km excursion within 60 s after the second fix
    fn walk_with_jump(lat0: f64, start: f64) -> Vec<Position> {
        let mut positions = walk(lat0, start, 5);
        let anchor = positions[1];
        positions.insert(
            2,
            Position::new(anchor.latitude + 0.1, anchor.longitude, anchor.timestamp + 30.0),
        );
        positions
    }

    fn assert_walk_scenario(engine: &AnomalyEngine) {
        assert!(engine
            .analyze_subject("tourist123", &walk(28.6139, 1694683400.0, 5))
            .unwrap()
            .is_training());

        let jump = engine
            .analyze_subject("tourist123", &walk_with_jump(28.6139, 1694683700.0))
            .unwrap();
        let replay = engine
            .analyze_subject("tourist123", &walk(28.6139, 1694684000.0, 5))
            .unwrap();
        let shifted = engine
            .analyze_subject("tourist456", &walk(28.6251, 1694684300.0, 5))
            .unwrap();

        assert!(jump.anomaly);
        assert!(!replay.anomaly, "replay flagged: {:?}", replay);
        assert!(!shifted.anomaly, "shifted walk flagged: {:?}", shifted);
        assert!(
            jump.risk_score < replay.risk_score,
            "jump {} should be below smooth {}",
            jump.risk_score,
            replay.risk_score
        );
    }

    #[test]
    fn test_jump_flagged_with_inexact_steps() {
        for seed in 0..50 {
            let config = ModelConfig {
                random_state: Some(seed),
                ..ModelConfig::default()
            };
            assert_walk_scenario(&AnomalyEngine::from_config(&config).unwrap());
        }
    }

    #[test]
    fn test_jump_flagged_unseeded() {
        assert_walk_scenario(&AnomalyEngine::from_config(&ModelConfig::default()).unwrap());
    }

    #[test]
    fn test_short_trajectory_leaves_model_untrained() {
        let engine = engine();
        let err = engine
            .analyze(&[Position::new(28.5, 77.0, 1694683400.0)])
            .unwrap_err();

        assert_eq!(err, EngineError::InsufficientData { needed: 2, got: 1 });
        assert!(err.is_client_error());
        assert_eq!(engine.phase().unwrap(), LifecyclePhase::Untrained);

        let verdict = engine.analyze(&smooth(0.0)).unwrap();
        assert!(verdict.is_training());
    }

    #[test]
    fn test_out_of_range_coordinates_are_client_errors() {
        let engine = engine();
        let err = engine
            .analyze(&[
                Position::new(0.0, 0.0, 0.0),
                Position::new(1e200, 0.0, 60.0),
            ])
            .unwrap_err();

        assert!(matches!(err, EngineError::InvalidPosition { index: 1, .. }));
        assert!(err.is_client_error());
        assert_eq!(engine.phase().unwrap(), LifecyclePhase::Untrained);
    }

    #[test]
    fn test_identical_timestamps_are_tolerated() {
        let engine = engine();
        let positions = [
            Position::new(28.5, 77.0, 1694683400.0),
            Position::new(28.5, 77.25, 1694683400.0),
        ];

        assert!(engine.analyze(&positions).unwrap().is_training());
        let verdict = engine.analyze(&positions).unwrap();
        assert_eq!(verdict.phase, VerdictPhase::Scored);
        assert!(!verdict.anomaly);
    }

    #[test]
    fn test_concurrent_first_calls_train_once() {
        let engine = Arc::new(engine());

        let verdicts: Vec<Verdict> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let engine = engine.clone();
                    scope.spawn(move || {
                        engine
                            .analyze_subject(&format!("subject-{}", i), &smooth(1694683400.0))
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let trained = verdicts.iter().filter(|v| v.is_training()).count();
        assert_eq!(trained, 1);
        assert!(verdicts
            .iter()
            .filter(|v| !v.is_training())
            .all(|v| !v.anomaly));
    }

    /// Scores by negated displacement; flags segments longer than 1.0
    struct ThresholdModel {
        fail_scoring: bool,
        fitted: bool,
    }

    impl OutlierModel for ThresholdModel {
        fn fit(&mut self, _corpus: &[FeatureVector]) -> Result<()> {
            self.fitted = true;
            Ok(())
        }

        fn score(&self, batch: &[FeatureVector]) -> Result<Vec<f64>> {
            if self.fail_scoring {
                return Err(EngineError::ModelNotFitted);
            }
            Ok(batch.iter().map(|v| -v.displacement).collect())
        }

        fn predict_label(&self, batch: &[FeatureVector]) -> Result<Vec<Label>> {
            Ok(batch
                .iter()
                .map(|v| if v.displacement > 1.0 { Label::Outlier } else { Label::Normal })
                .collect())
        }

        fn name(&self) -> &str {
            "Threshold"
        }

        fn is_fitted(&self) -> bool {
            self.fitted
        }
    }

    #[test]
    fn test_risk_score_is_minimum_segment_score() {
        let engine = AnomalyEngine::with_model(ThresholdModel {
            fail_scoring: false,
            fitted: false,
        });
        engine.analyze(&smooth(0.0)).unwrap();

        let positions = [
            Position::new(0.0, 0.0, 0.0),
            Position::new(0.0, 0.5, 60.0),
            Position::new(0.0, 3.5, 120.0),
            Position::new(0.0, 4.0, 180.0),
        ];
        let verdict = engine.analyze(&positions).unwrap();

        assert_eq!(verdict.risk_score, -3.0);
        assert!(verdict.anomaly);
        assert_eq!(verdict.outlier_segments, vec![1]);
        assert_eq!(engine.model_name().unwrap(), "Threshold");
    }

    #[test]
    fn test_scoring_failure_is_not_a_safe_verdict() {
        let engine = AnomalyEngine::with_model(ThresholdModel {
            fail_scoring: true,
            fitted: false,
        });
        engine.analyze(&smooth(0.0)).unwrap();

        let result = engine.analyze(&smooth(600.0));
        assert_eq!(result, Err(EngineError::ModelNotFitted));
    }

    #[test]
    fn test_decide_rejects_inconsistent_output() {
        let err = decide(&[-0.4, -0.6], &[Label::Normal]).unwrap_err();
        assert!(matches!(err, EngineError::InconsistentModelOutput(_)));
        assert_eq!(decide(&[], &[]), Err(EngineError::DegenerateFeatureBatch));
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl EngineObserver for RecordingObserver {
        fn on_features(&self, subject_id: &str, features: &[FeatureVector]) {
            self.events
                .lock()
                .unwrap()
                .push(format!("features:{}:{}", subject_id, features.len()));
        }

        fn on_phase_transition(&self, _from: LifecyclePhase, to: LifecyclePhase, corpus_size: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("transition:{:?}:{}", to, corpus_size));
        }

        fn on_scored(&self, subject_id: &str, scores: &[f64], _labels: &[Label]) {
            self.events
                .lock()
                .unwrap()
                .push(format!("scored:{}:{}", subject_id, scores.len()));
        }
    }

    #[test]
    fn test_observers_receive_events() {
        let recorder = Arc::new(RecordingObserver::default());
        let engine = engine().with_observer(recorder.clone());

        engine.analyze_subject("a", &smooth(0.0)).unwrap();
        engine.analyze_subject("b", &with_jump(600.0)).unwrap();

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "features:a:4".to_string(),
                "transition:Trained:4".to_string(),
                "features:b:5".to_string(),
                "scored:b:5".to_string(),
            ]
        );
    }
}
