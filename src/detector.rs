//! Erasure tracking for the scratch cover.
//!
//! The detector owns no timers of its own. Callers feed it strokes, report
//! stroke ends with the current [`Instant`], and call [`ScratchDetector::poll`]
//! at or after [`ScratchDetector::next_deadline`]. That keeps the settle and
//! debounce windows deterministic under a paused tokio clock.

use std::time::Duration;
use tokio::time::Instant;

pub const INLINE_THRESHOLD_PERCENT: f32 = 40.0;
pub const FULLSCREEN_THRESHOLD_PERCENT: f32 = 50.0;
pub const MAX_PIXEL_RATIO: f32 = 2.0;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectorConfig {
    pub threshold_percent: f32,
    /// Brush radius in logical pixels.
    pub brush_radius: f32,
    pub settle_delay: Duration,
    pub debounce_window: Duration,
    pub pixel_ratio: f32,
}

impl DetectorConfig {
    /// Card scratched in place inside a list or feed.
    pub fn inline() -> Self {
        Self {
            threshold_percent: INLINE_THRESHOLD_PERCENT,
            brush_radius: 20.0,
            settle_delay: Duration::from_millis(300),
            debounce_window: Duration::from_millis(100),
            pixel_ratio: 1.0,
        }
    }

    /// Card opened in its own full-screen view.
    pub fn fullscreen() -> Self {
        Self {
            threshold_percent: FULLSCREEN_THRESHOLD_PERCENT,
            ..Self::inline()
        }
    }

    pub fn with_pixel_ratio(mut self, ratio: f32) -> Self {
        self.pixel_ratio = ratio;
        self
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::inline()
    }
}

/// Alpha channel of the cover at backing resolution. `255` is fully covered,
/// `0` is cleared.
#[derive(Clone, Debug)]
pub struct CoverRaster {
    width: usize,
    height: usize,
    scale: f32,
    alpha: Vec<u8>,
}

impl CoverRaster {
    pub fn new(logical_width: u32, logical_height: u32, pixel_ratio: f32) -> Self {
        let scale = if pixel_ratio.is_finite() {
            pixel_ratio.clamp(1.0, MAX_PIXEL_RATIO)
        } else {
            1.0
        };
        let width = (logical_width as f32 * scale).round() as usize;
        let height = (logical_height as f32 * scale).round() as usize;
        Self {
            width,
            height,
            scale,
            alpha: vec![u8::MAX; width * height],
        }
    }

    pub fn backing_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn reset(&mut self) {
        self.alpha.fill(u8::MAX);
    }

    /// Clears every backing pixel whose centre lies within `radius` (logical)
    /// of the segment `from..to`, i.e. a capsule. `from == to` erases a disc.
    pub fn erase_capsule(&mut self, from: Point, to: Point, radius: f32) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let (ax, ay) = (from.x * self.scale, from.y * self.scale);
        let (bx, by) = (to.x * self.scale, to.y * self.scale);
        let r = radius * self.scale;
        let r2 = r * r;

        let min_x = (ax.min(bx) - r).floor().max(0.0) as usize;
        let min_y = (ay.min(by) - r).floor().max(0.0) as usize;
        let max_x = (ax.max(bx) + r).ceil().max(0.0) as usize;
        let max_y = (ay.max(by) + r).ceil().max(0.0) as usize;
        let max_x = max_x.min(self.width - 1);
        let max_y = max_y.min(self.height - 1);
        if min_x > max_x || min_y > max_y {
            return;
        }

        let (dx, dy) = (bx - ax, by - ay);
        let len2 = dx * dx + dy * dy;
        for py in min_y..=max_y {
            let cy = py as f32 + 0.5;
            for px in min_x..=max_x {
                let cx = px as f32 + 0.5;
                let t = if len2 == 0.0 {
                    0.0
                } else {
                    (((cx - ax) * dx + (cy - ay) * dy) / len2).clamp(0.0, 1.0)
                };
                let (nx, ny) = (ax + t * dx - cx, ay + t * dy - cy);
                if nx * nx + ny * ny <= r2 {
                    self.alpha[py * self.width + px] = 0;
                }
            }
        }
    }

    pub fn transparent_pixels(&self) -> usize {
        self.alpha.iter().filter(|a| **a == 0).count()
    }

    pub fn percent_cleared(&self) -> f32 {
        let total = self.alpha.len();
        if total == 0 {
            return 0.0;
        }
        (self.transparent_pixels() as f64 * 100.0 / total as f64) as f32
    }

    /// Whether the backing pixel under a logical point is still covered.
    pub fn is_covered_at(&self, p: Point) -> bool {
        let x = (p.x * self.scale).floor();
        let y = (p.y * self.scale).floor();
        if x < 0.0 || y < 0.0 {
            return false;
        }
        let (x, y) = (x as usize, y as usize);
        if x >= self.width || y >= self.height {
            return false;
        }
        self.alpha[y * self.width + x] != 0
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ThresholdCrossed {
    pub percent_cleared: f32,
    pub generation: u64,
}

#[derive(Debug)]
pub struct ScratchDetector {
    config: DetectorConfig,
    raster: CoverRaster,
    last_point: Option<Point>,
    settle_at: Option<Instant>,
    debounce_at: Option<Instant>,
    card_scratched: bool,
    fired: bool,
    processing: bool,
    detached: bool,
    generation: u64,
}

impl ScratchDetector {
    pub fn new(config: DetectorConfig, logical_width: u32, logical_height: u32) -> Self {
        let raster = CoverRaster::new(logical_width, logical_height, config.pixel_ratio);
        Self {
            config,
            raster,
            last_point: None,
            settle_at: None,
            debounce_at: None,
            card_scratched: false,
            fired: false,
            processing: false,
            detached: true,
            generation: 0,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn raster(&self) -> &CoverRaster {
        &self.raster
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Binds the detector to a fresh cover for a card. A card that is already
    /// scratched never fires.
    pub fn attach(&mut self, card_scratched: bool) {
        self.generation += 1;
        self.raster.reset();
        self.last_point = None;
        self.settle_at = None;
        self.debounce_at = None;
        self.card_scratched = card_scratched;
        self.fired = false;
        self.processing = false;
        self.detached = false;
        tracing::debug!(generation = self.generation, card_scratched, "detector attached");
    }

    /// Drops every pending timer. Nothing fires for the current generation
    /// after this returns.
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.settle_at = None;
        self.debounce_at = None;
        self.last_point = None;
        self.detached = true;
        tracing::debug!(generation = self.generation, "detector cancelled");
    }

    pub fn is_accepting_input(&self) -> bool {
        !self.detached && !self.card_scratched && !self.fired
    }

    pub fn is_current(&self, event: &ThresholdCrossed) -> bool {
        !self.detached && event.generation == self.generation
    }

    pub fn begin_stroke(&mut self, p: Point) {
        if !self.is_accepting_input() {
            return;
        }
        self.raster.erase_capsule(p, p, self.config.brush_radius);
        self.last_point = Some(p);
    }

    pub fn move_to(&mut self, p: Point) {
        if !self.is_accepting_input() {
            return;
        }
        let from = self.last_point.unwrap_or(p);
        self.raster.erase_capsule(from, p, self.config.brush_radius);
        self.last_point = Some(p);
    }

    /// Pointer or touch released. Restarts the settle window so a burst of taps
    /// is measured once.
    pub fn end_stroke(&mut self, now: Instant) {
        self.last_point = None;
        if !self.is_accepting_input() {
            return;
        }
        self.settle_at = Some(now + self.config.settle_delay);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.settle_at, self.debounce_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn percent_cleared(&self) -> f32 {
        self.raster.percent_cleared()
    }

    fn may_fire(&self) -> bool {
        !self.detached && !self.card_scratched && !self.fired && !self.processing
    }

    /// Advances the settle and debounce timers to `now`, returning the single
    /// threshold event once it is due.
    pub fn poll(&mut self, now: Instant) -> Option<ThresholdCrossed> {
        if self.detached {
            return None;
        }
        if let Some(at) = self.settle_at {
            if now >= at {
                self.settle_at = None;
                let percent = self.raster.percent_cleared();
                tracing::debug!(percent, threshold = self.config.threshold_percent, "sampled cover");
                if percent >= self.config.threshold_percent
                    && self.may_fire()
                    && self.debounce_at.is_none()
                {
                    self.debounce_at = Some(at + self.config.debounce_window);
                }
            }
        }
        let due = self.debounce_at.is_some_and(|at| now >= at);
        if !due {
            return None;
        }
        self.debounce_at = None;
        if !self.may_fire() {
            tracing::debug!("threshold trigger dropped while a reveal is in flight");
            return None;
        }
        self.fired = true;
        self.processing = true;
        let event = ThresholdCrossed {
            percent_cleared: self.raster.percent_cleared(),
            generation: self.generation,
        };
        tracing::info!(percent = event.percent_cleared, "scratch threshold crossed");
        Some(event)
    }

    pub fn begin_processing(&mut self) {
        self.processing = true;
    }

    pub fn finish_processing(&mut self) {
        self.processing = false;
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }
}

/// Sleeps until `deadline`, or forever when there is none. Meant for a
/// `tokio::select!` arm driving [`ScratchDetector::poll`].
pub async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    const SIDE: u32 = 100;

    fn thin_brush(threshold: f32) -> DetectorConfig {
        DetectorConfig {
            threshold_percent: threshold,
            brush_radius: 0.5,
            ..DetectorConfig::inline()
        }
    }

    fn attached(config: DetectorConfig) -> ScratchDetector {
        let mut detector = ScratchDetector::new(config, SIDE, SIDE);
        detector.attach(false);
        detector
    }

    /// One stroke per row clears exactly that row of a 100x100 surface, so each
    /// row is one percent.
    fn scratch_rows(detector: &mut ScratchDetector, rows: std::ops::Range<u32>, now: Instant) {
        for row in rows {
            let y = row as f32 + 0.5;
            detector.begin_stroke(Point::new(-1.0, y));
            detector.move_to(Point::new(SIDE as f32 + 1.0, y));
            detector.end_stroke(now);
        }
    }

    fn settle_and_poll(detector: &mut ScratchDetector, now: Instant) -> Vec<ThresholdCrossed> {
        let mut events = Vec::new();
        for step in [300u64, 400, 500, 1_000] {
            events.extend(detector.poll(now + Duration::from_millis(step)));
        }
        events
    }

    #[test]
    fn percent_cleared__row_strokes__one_percent_per_row() {
        // given
        let mut detector = attached(thin_brush(40.0));

        // when
        scratch_rows(&mut detector, 0..39, Instant::now());

        // then
        assert_eq!(detector.raster().transparent_pixels(), 39 * SIDE as usize);
    }

    #[test]
    fn poll__39_percent_cleared__never_fires() {
        // given
        let mut detector = attached(thin_brush(40.0));
        let now = Instant::now();

        // when
        scratch_rows(&mut detector, 0..39, now);
        let events = settle_and_poll(&mut detector, now);

        // then
        assert!(events.is_empty());
    }

    #[test]
    fn poll__41_percent_sampled_three_times__fires_exactly_once() {
        // given
        let mut detector = attached(thin_brush(40.0));
        let start = Instant::now();
        scratch_rows(&mut detector, 0..41, start);

        // when
        let mut events = Vec::new();
        for round in 0..3u64 {
            let now = start + Duration::from_secs(round);
            detector.end_stroke(now);
            events.extend(settle_and_poll(&mut detector, now));
        }

        // then
        assert_eq!(events.len(), 1);
        assert!(events[0].percent_cleared >= 41.0);
    }

    #[test]
    fn poll__before_settle_delay__does_not_sample() {
        // given
        let mut detector = attached(thin_brush(40.0));
        let now = Instant::now();
        scratch_rows(&mut detector, 0..50, now);

        // when
        let early = detector.poll(now + Duration::from_millis(299));
        let after_settle = detector.poll(now + Duration::from_millis(300));
        let after_debounce = detector.poll(now + Duration::from_millis(400));

        // then
        assert_eq!(early, None);
        assert_eq!(after_settle, None);
        assert!(after_debounce.is_some());
    }

    #[test]
    fn cancel__before_settle_elapses__event_never_fires() {
        // given
        let mut detector = attached(thin_brush(40.0));
        let now = Instant::now();
        scratch_rows(&mut detector, 0..60, now);

        // when
        detector.cancel();
        let events = settle_and_poll(&mut detector, now);

        // then
        assert!(events.is_empty());
        assert_eq!(detector.next_deadline(), None);
    }

    #[test]
    fn cancel__during_debounce__event_never_fires() {
        // given
        let mut detector = attached(thin_brush(40.0));
        let now = Instant::now();
        scratch_rows(&mut detector, 0..60, now);
        assert_eq!(detector.poll(now + Duration::from_millis(300)), None);

        // when
        detector.cancel();
        let late = detector.poll(now + Duration::from_secs(5));

        // then
        assert_eq!(late, None);
    }

    #[test]
    fn poll__reveal_processing__drops_trigger() {
        // given
        let mut detector = attached(thin_brush(40.0));
        let now = Instant::now();
        scratch_rows(&mut detector, 0..60, now);

        // when
        detector.begin_processing();
        let events = settle_and_poll(&mut detector, now);

        // then
        assert!(events.is_empty());
    }

    #[test]
    fn poll__card_already_scratched__never_fires() {
        // given
        let mut detector = ScratchDetector::new(thin_brush(40.0), SIDE, SIDE);
        detector.attach(true);
        let now = Instant::now();

        // when
        scratch_rows(&mut detector, 0..100, now);
        let events = settle_and_poll(&mut detector, now);

        // then
        assert!(events.is_empty());
        assert_eq!(detector.percent_cleared(), 0.0);
    }

    #[test]
    fn attach__new_card__stale_event_is_not_current() {
        // given
        let mut detector = attached(thin_brush(40.0));
        let now = Instant::now();
        scratch_rows(&mut detector, 0..60, now);
        let event = settle_and_poll(&mut detector, now).pop().unwrap();

        // when
        detector.attach(false);

        // then
        assert!(!detector.is_current(&event));
        assert_eq!(detector.percent_cleared(), 0.0);
    }

    #[test]
    fn percent_cleared__double_pixel_ratio__uses_backing_pixels() {
        // given
        let config = thin_brush(40.0).with_pixel_ratio(2.0);
        let mut detector = attached(config);

        // when
        scratch_rows(&mut detector, 0..25, Instant::now());

        // then
        assert_eq!(detector.raster().backing_size(), (200, 200));
        assert_eq!(detector.raster().transparent_pixels(), 25 * 2 * 200);
        assert!((detector.percent_cleared() - 25.0).abs() < 0.001);
    }

    #[test]
    fn cover_raster__pixel_ratio_above_two__is_clamped() {
        // when
        let raster = CoverRaster::new(10, 10, 3.0);

        // then
        assert_eq!(raster.backing_size(), (20, 20));
    }

    #[test]
    fn erase_capsule__single_tap__clears_a_disc() {
        // given
        let mut raster = CoverRaster::new(20, 20, 1.0);

        // when
        raster.erase_capsule(Point::new(10.0, 10.0), Point::new(10.0, 10.0), 3.0);

        // then
        assert!(!raster.is_covered_at(Point::new(10.0, 10.0)));
        assert!(!raster.is_covered_at(Point::new(12.0, 10.0)));
        assert!(raster.is_covered_at(Point::new(14.0, 10.0)));
        assert!(raster.is_covered_at(Point::new(12.5, 12.5)));
    }

    #[tokio::test]
    async fn sleep_until_deadline__paused_clock__wakes_at_deadline() {
        // given
        tokio::time::pause();
        let mut detector = attached(thin_brush(40.0));
        let start = Instant::now();
        scratch_rows(&mut detector, 0..50, start);

        // when
        let mut fired = None;
        while fired.is_none() {
            sleep_until_deadline(detector.next_deadline()).await;
            fired = detector.poll(Instant::now());
        }

        // then
        assert!(Instant::now() - start >= Duration::from_millis(400));
    }
}
