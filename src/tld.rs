// tld.rs -- Tracking-Learning-Detection: the per-frame orchestrator.
//
// Frame loop:
//   1. Grayscale + 3x3 box blur, integral image
//   2. While the last answer was trusted, follow it with median flow and
//      seed the detector with the tracked rectangle; otherwise let the
//      detector search on its own
//   3. Fuse: the best detection replaces the tracked patch when it is
//      confident enough and the track is weak, or simply when it scores
//      higher
//   4. Learn online: a confident winner becomes a positive example,
//      low-scoring detections away from it become negatives
//
// The orchestrator is the single owner of the classifier. The detector
// and the median-flow tracker borrow it per call.

use std::sync::Arc;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::classifier::{Classifier, ClassifierConfig};
use crate::detector::{Detector, DetectorConfig};
use crate::error::{Result, TldError};
use crate::fern::MAX_FEATURES_PER_FERN;
use crate::frame::{Frame, FrameView};
use crate::parallel::WorkerPool;
use crate::rect::{Patch, Rect};
use crate::tracker::{MedianFlowConfig, MedianFlowTracker};

/// Construction-time configuration of the whole tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct TldConfig {
    pub classifier: ClassifierConfig,
    pub detector: DetectorConfig,
    pub median_flow: MedianFlowConfig,
    /// The last answer is followed with median flow only above this.
    pub tracking_confidence: f64,
    /// A detection at or above this may replace a track scoring below it.
    pub reinit_confidence: f64,
    /// Winners at or above this are learned as positives.
    pub learning_confidence: f64,
    /// Detections below this are learned as negatives.
    pub negative_confidence: f64,
    /// Detections below this are never picked as the best detection.
    pub detection_confidence: f64,
    /// Worker threads; `None` uses the available parallelism.
    pub worker_threads: Option<usize>,
    /// Seed for feature sampling; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for TldConfig {
    fn default() -> Self {
        TldConfig {
            classifier: ClassifierConfig::default(),
            detector: DetectorConfig::default(),
            median_flow: MedianFlowConfig::default(),
            tracking_confidence: 0.75,
            reinit_confidence: 0.85,
            learning_confidence: 0.9,
            negative_confidence: 0.7,
            detection_confidence: 0.9,
            worker_threads: None,
            seed: None,
        }
    }
}

fn check(ok: bool, msg: impl FnOnce() -> String) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(TldError::config(msg()))
    }
}

fn unit_interval(name: &str, value: f64) -> Result<()> {
    check((0.0..=1.0).contains(&value), || format!("{name} must be in [0, 1], got {value}"))
}

impl TldConfig {
    /// Reject values the components cannot work with.
    pub fn validate(&self) -> Result<()> {
        let c = &self.classifier;
        check(c.fern_count > 0, || "fern_count must be positive".into())?;
        check((1..=MAX_FEATURES_PER_FERN).contains(&c.features_per_fern), || {
            format!(
                "features_per_fern must be in 1..={MAX_FEATURES_PER_FERN}, got {}",
                c.features_per_fern
            )
        })?;
        check(
            c.min_feature_scale > 0.0 && c.min_feature_scale <= c.max_feature_scale && c.max_feature_scale <= 1.0,
            || {
                format!(
                    "feature scales must satisfy 0 < min <= max <= 1, got {} and {}",
                    c.min_feature_scale, c.max_feature_scale
                )
            },
        )?;
        unit_interval("minimum_overlap", c.minimum_overlap)?;

        let d = &self.detector;
        check(d.min_side_size >= 1 && d.min_side_size <= d.max_side_size, || {
            format!(
                "side sizes must satisfy 1 <= min <= max, got {} and {}",
                d.min_side_size, d.max_side_size
            )
        })?;
        unit_interval("minimum_confidence", d.minimum_confidence)?;

        let m = &self.median_flow;
        check(m.grid_size >= 2, || format!("grid_size must be at least 2, got {}", m.grid_size))?;
        check(m.window_size >= 1, || "window_size must be positive".into())?;
        check(m.pyramid_levels >= 1, || "pyramid_levels must be positive".into())?;
        check(m.max_iterations >= 1, || "max_iterations must be positive".into())?;
        check(m.epsilon > 0.0, || format!("epsilon must be positive, got {}", m.epsilon))?;
        check(m.max_flow_error > 0.0, || {
            format!("max_flow_error must be positive, got {}", m.max_flow_error)
        })?;

        unit_interval("tracking_confidence", self.tracking_confidence)?;
        unit_interval("reinit_confidence", self.reinit_confidence)?;
        unit_interval("learning_confidence", self.learning_confidence)?;
        unit_interval("negative_confidence", self.negative_confidence)?;
        unit_interval("detection_confidence", self.detection_confidence)?;
        check(self.worker_threads != Some(0), || "worker_threads must be positive".into())
    }
}

/// Coarse state of the tracker as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TldState {
    /// No target yet, or reset since the last one.
    Uninitialized,
    /// The last answer is trusted and will be followed with median flow.
    Tracking,
    /// The detector alone looks for the target.
    Searching,
}

#[derive(Debug)]
pub struct TldTracker {
    config: TldConfig,
    classifier: Classifier,
    detector: Detector,
    tracker: MedianFlowTracker,
    confidence: f64,
    initialized: bool,
}

impl TldTracker {
    pub fn new(config: TldConfig) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(WorkerPool::new(config.worker_threads)?);
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let classifier = Classifier::new(config.classifier.clone(), Arc::clone(&pool), &mut rng);
        let detector = Detector::new(config.detector.clone(), pool);
        let tracker = MedianFlowTracker::new(config.median_flow.clone());

        Ok(TldTracker {
            config,
            classifier,
            detector,
            tracker,
            confidence: 0.0,
            initialized: false,
        })
    }

    /// Process one frame.
    ///
    /// `rect` is the previous answer, or the user's selection on the first
    /// frame after construction or `reset_tracker`. Returns the target
    /// rectangle in this frame; the zero rectangle means "not found".
    pub fn get_target_rect(&mut self, view: &FrameView<'_>, rect: Rect) -> Rect {
        let frame = Frame::preprocess(view);
        if !self.initialized {
            return self.initialize(&frame, rect);
        }

        // Whatever the caller passes back, only the part inside the frame
        // is worth following.
        let rect = rect.intersection(&frame.bounds());
        let trusted = self.confidence > self.config.tracking_confidence && rect.area() > 0;
        let (tracked, detected) = if trusted {
            let tracked = self.tracker.track(&self.classifier, &frame, rect);
            let detected = self.detector.detect(&self.classifier, &frame, tracked.rect);
            (tracked, detected)
        } else {
            self.tracker.advance(&frame);
            (Patch::lost(), self.detector.detect(&self.classifier, &frame, Rect::zero()))
        };

        let winner = self.fuse(tracked, &detected);

        if rect.area() > 0 {
            self.learn(&frame, &winner, &detected);
        }

        self.confidence = winner.confidence;
        winner.rect
    }

    fn initialize(&mut self, frame: &Frame, rect: Rect) -> Rect {
        let target = rect.intersection(&frame.bounds());
        if target.is_empty() {
            warn!("initialization rectangle {rect} has nothing inside the frame, ignoring");
            return Rect::zero();
        }

        self.classifier.init(frame, target);
        self.detector.init(frame, target);
        self.tracker.init(frame);
        self.confidence = 1.0;
        self.initialized = true;
        info!(
            "tracker initialized on {target} (variance threshold {:.1})",
            self.detector.variance_threshold()
        );
        target
    }

    /// Highest-confidence detection at or above `detection_confidence`;
    /// the first one wins ties.
    fn best_detection(&self, detected: &[Patch]) -> Option<Patch> {
        let floor = self.config.detection_confidence;
        let mut best: Option<Patch> = None;
        for p in detected.iter().filter(|p| p.confidence >= floor) {
            if best.map_or(true, |b| p.confidence > b.confidence) {
                best = Some(*p);
            }
        }
        best
    }

    fn fuse(&self, tracked: Patch, detected: &[Patch]) -> Patch {
        let Some(best) = self.best_detection(detected) else {
            debug!("fusion: no confident detection, keeping track {} ({:.3})", tracked.rect, tracked.confidence);
            return tracked;
        };

        let reinit = self.config.reinit_confidence;
        let take_detection = (tracked.confidence < reinit && best.confidence >= reinit)
            || tracked.confidence < best.confidence;
        debug!(
            "fusion: track {} ({:.3}) vs detection {} ({:.3}), {}",
            tracked.rect,
            tracked.confidence,
            best.rect,
            best.confidence,
            if take_detection { "taking detection" } else { "keeping track" }
        );
        if take_detection {
            best
        } else {
            tracked
        }
    }

    fn learn(&self, frame: &Frame, winner: &Patch, detected: &[Patch]) {
        let mut positives = 0;
        if winner.confidence >= self.config.learning_confidence && !winner.rect.is_empty() {
            positives = self.classifier.train_positive(frame.gray(), winner.rect);
        }

        let minimum_overlap = self.classifier.config().minimum_overlap;
        let negatives: Vec<Rect> = detected
            .iter()
            .filter(|p| {
                p.confidence < self.config.negative_confidence && winner.rect.overlap(&p.rect) <= minimum_overlap
            })
            .map(|p| p.rect)
            .collect();
        self.classifier.train_batch(frame.integral(), &negatives, false);

        debug!(
            "learning: {positives} positive samples around {}, {} negatives",
            winner.rect,
            negatives.len()
        );
    }

    /// Drop the target. The next `get_target_rect` call starts over from
    /// the rectangle it is given, with all learned posteriors cleared.
    pub fn reset_tracker(&mut self) {
        self.initialized = false;
        self.confidence = 0.0;
    }

    /// Confidence of the last answer.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn state(&self) -> TldState {
        if !self.initialized {
            TldState::Uninitialized
        } else if self.confidence > self.config.tracking_confidence {
            TldState::Tracking
        } else {
            TldState::Searching
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    pub fn config(&self) -> &TldConfig {
        &self.config
    }
}
