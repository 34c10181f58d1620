//! Humanized interaction pacing.
//!
//! Every UI action of the item workflow is preceded by
//! [`Pacer::before_action`]; the browser adapter also asks the pacer for
//! keystroke cadence and pointer paths. [`HumanPacer`] samples all of these
//! from the configured ranges, [`InstantPacer`] returns zero everywhere.

use crate::config::{DelayRange, HumanizeConfig};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

const DELAY_HISTORY: usize = 10;
const BURST_LENGTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Click,
    Type,
    Navigate,
    ClosePopup,
    BetweenItems,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerPoint {
    pub x: f64,
    pub y: f64,
}

impl PointerPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance(self, other: PointerPoint) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}

#[async_trait]
pub trait Pacer: Send + Sync {
    /// Suspend for a sampled delay appropriate to `kind`.
    async fn before_action(&self, kind: ActionKind);

    /// Pause before typing `ch`.
    fn keystroke_delay(&self, ch: char) -> Duration;

    /// Intermediate pointer positions from `start` to (roughly) `end`. The last
    /// point is where the click lands.
    fn motion_path(&self, start: PointerPoint, end: PointerPoint) -> Vec<PointerPoint>;

    /// Total time one pointer movement should take.
    fn motion_duration(&self) -> Duration {
        Duration::ZERO
    }

    /// Upper bound on the time this pacer adds while clicking into a field and
    /// typing `text` into it. Callers extend their own bounds by this much.
    fn typing_allowance(&self, _text: &str) -> Duration {
        Duration::ZERO
    }
}

/// Zero-delay pacer for tests and constrained environments.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantPacer;

#[async_trait]
impl Pacer for InstantPacer {
    async fn before_action(&self, _kind: ActionKind) {}

    fn keystroke_delay(&self, _ch: char) -> Duration {
        Duration::ZERO
    }

    fn motion_path(&self, _start: PointerPoint, end: PointerPoint) -> Vec<PointerPoint> {
        vec![end]
    }
}

/// Pacer that imitates a person at the keyboard.
pub struct HumanPacer {
    config: HumanizeConfig,
    history: Mutex<VecDeque<f64>>,
    burst_remaining: AtomicUsize,
}

impl HumanPacer {
    pub fn new(config: HumanizeConfig) -> Self {
        Self {
            config,
            history: Mutex::new(VecDeque::with_capacity(DELAY_HISTORY)),
            burst_remaining: AtomicUsize::new(0),
        }
    }

    pub fn range_for(&self, kind: ActionKind) -> DelayRange {
        let h = &self.config;
        match kind {
            ActionKind::Click => h.after_click,
            ActionKind::Type => h.after_typing,
            ActionKind::Navigate => h.between_actions,
            ActionKind::ClosePopup => h.after_close_popup,
            ActionKind::BetweenItems => h.between_items,
        }
    }

    /// Sample a delay from `range`.
    ///
    /// The base value is the mean of three uniform draws, so samples cluster
    /// around the centre of the range. A ±5 % micro-variation follows; when the
    /// last three delays were all within 100 ms of the new one, extra jitter
    /// breaks the streak.
    pub fn sample_delay(&self, range: DelayRange) -> Duration {
        use rand::prelude::*;
        let range = range.normalized();
        let (min, max) = (range.min_ms as f64, range.max_ms as f64);

        let mut ms = {
            let mut rng = rand::rng();
            let base = if max > min {
                (0..3).map(|_| rng.random_range(min..=max)).sum::<f64>() / 3.0
            } else {
                min
            };
            let variation = base * 0.05;
            if variation > 0.0 {
                base + rng.random_range(-variation..=variation)
            } else {
                base
            }
        };

        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        if history.len() >= 3 && history.iter().rev().take(3).all(|d| (d - ms).abs() < 100.0) {
            let mut rng = rand::rng();
            ms += rng.random_range(-200.0..=300.0);
        }
        let ms = ms.max(0.0);
        history.push_back(ms);
        if history.len() > DELAY_HISTORY {
            history.pop_front();
        }

        Duration::from_millis(ms.round() as u64)
    }

    #[cfg(test)]
    fn history_len(&self) -> usize {
        self.history.lock().map(|h| h.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Pacer for HumanPacer {
    async fn before_action(&self, kind: ActionKind) {
        let delay = self.sample_delay(self.range_for(kind));
        debug!("humanize: {:?} delay {}ms", kind, delay.as_millis());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn keystroke_delay(&self, ch: char) -> Duration {
        use rand::prelude::*;
        let mut rng = rand::rng();
        let (lo, hi) = (
            self.config.typing_chars_per_second_min.max(0.1),
            self.config.typing_chars_per_second_max.max(0.1),
        );
        let cps = if hi > lo { rng.random_range(lo..=hi) } else { lo };
        let base = 1000.0 / cps;

        let in_burst = self
            .burst_remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if in_burst {
            return Duration::from_millis((base * 0.4).round() as u64);
        }
        if rng.random_bool(self.config.burst_typing_chance.clamp(0.0, 1.0)) {
            self.burst_remaining.store(BURST_LENGTH - 1, Ordering::Relaxed);
            return Duration::from_millis((base * 0.4).round() as u64);
        }

        let factor = if ch.is_whitespace() {
            1.5
        } else if ch.is_ascii_punctuation() {
            1.8
        } else if ch.is_uppercase() {
            1.1
        } else {
            1.0
        };
        let delay = base * factor;
        let variation = delay * 0.2;
        let delay = delay + rng.random_range(-variation..=variation);
        Duration::from_millis(delay.max(0.0).round() as u64)
    }

    fn motion_path(&self, start: PointerPoint, end: PointerPoint) -> Vec<PointerPoint> {
        use rand::prelude::*;
        let mut rng = rand::rng();
        let offset = self.config.mouse_offset_px.max(0.0);
        let target = if offset > 0.0 {
            PointerPoint::new(
                end.x + rng.random_range(-offset..=offset),
                end.y + rng.random_range(-offset..=offset),
            )
        } else {
            end
        };
        let steps = self.config.mouse_path_steps.max(2);

        if rng.random_bool(self.config.mouse_overshoot_chance.clamp(0.0, 1.0)) {
            let factor = rng.random_range(0.05..=0.15);
            let overshoot = PointerPoint::new(
                target.x + (target.x - start.x) * factor,
                target.y + (target.y - start.y) * factor,
            );
            let mut path = bezier_path(start, overshoot, (steps * 3 / 5).max(2));
            path.extend(bezier_path(overshoot, target, (steps * 2 / 5).max(2)).into_iter().skip(1));
            return path;
        }
        bezier_path(start, target, steps)
    }

    fn motion_duration(&self) -> Duration {
        self.sample_delay(self.config.mouse_move)
    }

    /// Slowest cadence times the punctuation factor and +20 % variation per
    /// character, plus one maximal pointer movement.
    fn typing_allowance(&self, text: &str) -> Duration {
        let slowest = 1000.0 / self.config.typing_chars_per_second_min.max(0.1);
        let per_char = slowest * 1.8 * 1.2;
        let motion = self.config.mouse_move.normalized().max_ms as f64 * 1.05 + 300.0;
        let total = text.chars().count() as f64 * per_char + motion;
        Duration::from_millis(total.ceil() as u64)
    }
}

/// Cubic Bézier from `start` to `end` with control points at one and two
/// thirds of the way, pushed sideways by up to 30 % of the distance.
fn bezier_path(start: PointerPoint, end: PointerPoint, steps: usize) -> Vec<PointerPoint> {
    use rand::prelude::*;
    let mut rng = rand::rng();
    let (dx, dy) = (end.x - start.x, end.y - start.y);
    if start.distance(end) < f64::EPSILON {
        return vec![end];
    }
    let bend = rng.random_range(-0.3..=0.3);
    let (ox, oy) = (dy * bend, -dx * bend);
    let c1 = PointerPoint::new(start.x + dx * 0.33 + ox, start.y + dy * 0.33 + oy);
    let c2 = PointerPoint::new(start.x + dx * 0.66 - ox, start.y + dy * 0.66 - oy);

    (0..=steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            let u = 1.0 - t;
            let (a, b, c, d) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
            PointerPoint::new(
                a * start.x + b * c1.x + c * c2.x + d * end.x,
                a * start.y + b * c1.y + c * c2.y + d * end.y,
            )
        })
        .collect()
}

/// Pick the pacer for a run: humanized unless disabled in config.
pub fn pacer_from_config(config: &HumanizeConfig) -> Arc<dyn Pacer> {
    if config.enabled {
        Arc::new(HumanPacer::new(config.clone()))
    } else {
        Arc::new(InstantPacer)
    }
}
