//! Crossfade transitions between the primary and staging pipelines.
//!
//! A transition only ramps volumes and starts/stops the two engines. Moving
//! the queue forward and swapping identities afterwards is the local
//! backend's job.

use bridge_traits::RenderPipeline;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransitionMode {
    /// Hard cut; the sequential advance handles the boundary.
    #[default]
    None,
    /// Fade the current track out, then the next one in.
    FadeInOut,
    /// Both tracks play while their volumes cross.
    Overlap,
    /// Same ramp as `Overlap`.
    Smooth,
}

/// Volume envelope shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FadeCurve {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
}

impl FadeCurve {
    /// Map progress in `[0, 1]` to a gain in `[0, 1]`.
    ///
    /// Input outside the range is clamped; `0` always maps to `0` and `1`
    /// to `1`.
    pub fn envelope(self, progress: f32) -> f32 {
        let t = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        let value = match self {
            FadeCurve::Linear => t,
            FadeCurve::EaseIn => t * t,
            FadeCurve::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            FadeCurve::EaseInOut => (1.0 - (std::f32::consts::PI * t).cos()) / 2.0,
        };
        value.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSettings {
    pub mode: TransitionMode,
    pub duration_ms: u64,
    /// Envelope of the incoming track.
    pub curve_in: FadeCurve,
    /// Envelope of the outgoing track.
    pub curve_out: FadeCurve,
}

impl Default for TransitionSettings {
    fn default() -> Self {
        Self {
            mode: TransitionMode::None,
            duration_ms: 6_000,
            curve_in: FadeCurve::EaseOut,
            curve_out: FadeCurve::EaseIn,
        }
    }
}

impl TransitionSettings {
    pub fn new(mode: TransitionMode, duration_ms: u64) -> Self {
        Self {
            mode,
            duration_ms,
            ..Self::default()
        }
    }

    pub fn with_curves(mut self, curve_in: FadeCurve, curve_out: FadeCurve) -> Self {
        self.curve_in = curve_in;
        self.curve_out = curve_out;
        self
    }

    /// Whether these settings would do anything at all.
    pub fn is_active(&self) -> bool {
        self.mode != TransitionMode::None && self.duration_ms > 0
    }
}

/// How a ramp ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampOutcome {
    /// Volumes reached their end values; the backend should swap identities.
    Completed,
    /// Nothing to do: no staged item, zero duration, or mode `None`.
    Skipped,
    Cancelled,
}

/// Ticket for one running transition.
#[derive(Debug, Clone)]
pub struct TransitionTicket {
    id: u64,
    token: CancellationToken,
}

impl TransitionTicket {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Single-flight guard: starting a transition cancels the previous one.
#[derive(Debug, Default)]
pub struct TransitionRunner {
    current: Mutex<Option<TransitionTicket>>,
    next_id: Mutex<u64>,
}

impl TransitionRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new transition, cancelling whatever was running.
    pub fn begin(&self) -> TransitionTicket {
        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            *next
        };
        let ticket = TransitionTicket {
            id,
            token: CancellationToken::new(),
        };
        let previous = self.current.lock().replace(ticket.clone());
        if let Some(previous) = previous {
            previous.token.cancel();
        }
        ticket
    }

    /// Cancel the running transition, if any.
    pub fn cancel(&self) {
        if let Some(ticket) = self.current.lock().take() {
            ticket.token.cancel();
        }
    }

    /// Mark `ticket` finished. A newer transition is left untouched.
    pub fn finish(&self, ticket: &TransitionTicket) {
        let mut current = self.current.lock();
        if current.as_ref().map(|running| running.id) == Some(ticket.id) {
            *current = None;
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.lock().is_some()
    }
}

/// Sleep one tick unless cancelled first. Returns `false` on cancellation.
async fn tick(token: &CancellationToken, step: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(step) => true,
    }
}

/// Ramp `primary` out and `staging` in according to `settings`.
///
/// Volumes are updated once per `step`. On completion the primary engine is
/// silent and stopped and the staging engine plays at full volume.
pub async fn ramp(
    primary: &Arc<dyn RenderPipeline>,
    staging: &Arc<dyn RenderPipeline>,
    settings: &TransitionSettings,
    step: Duration,
    token: &CancellationToken,
) -> RampOutcome {
    if !staging.has_item() || step.is_zero() {
        return RampOutcome::Skipped;
    }
    match settings.mode {
        TransitionMode::None => RampOutcome::Skipped,
        TransitionMode::FadeInOut => {
            let half = Duration::from_millis(settings.duration_ms / 2);
            if half.is_zero() {
                return RampOutcome::Skipped;
            }

            let mut elapsed = Duration::ZERO;
            while elapsed < half {
                let progress = elapsed.as_secs_f32() / half.as_secs_f32();
                primary.set_volume(1.0 - settings.curve_out.envelope(progress));
                if !tick(token, step).await {
                    return RampOutcome::Cancelled;
                }
                elapsed += step;
            }
            primary.set_volume(0.0);
            primary.stop();

            staging.set_volume(0.0);
            staging.play();
            let mut elapsed = Duration::ZERO;
            while elapsed < half {
                let progress = elapsed.as_secs_f32() / half.as_secs_f32();
                staging.set_volume(settings.curve_in.envelope(progress));
                if !tick(token, step).await {
                    return RampOutcome::Cancelled;
                }
                elapsed += step;
            }
            staging.set_volume(1.0);
            RampOutcome::Completed
        }
        TransitionMode::Overlap | TransitionMode::Smooth => {
            let duration = Duration::from_millis(settings.duration_ms);
            if duration.is_zero() {
                return RampOutcome::Skipped;
            }

            staging.set_volume(0.0);
            staging.play();
            let mut elapsed = Duration::ZERO;
            while elapsed < duration {
                let progress = elapsed.as_secs_f32() / duration.as_secs_f32();
                primary.set_volume(1.0 - settings.curve_out.envelope(progress));
                staging.set_volume(settings.curve_in.envelope(progress));
                if !tick(token, step).await {
                    return RampOutcome::Cancelled;
                }
                elapsed += step;
            }
            primary.set_volume(0.0);
            staging.set_volume(1.0);
            primary.stop();
            RampOutcome::Completed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CURVES: [FadeCurve; 4] = [
        FadeCurve::Linear,
        FadeCurve::EaseIn,
        FadeCurve::EaseOut,
        FadeCurve::EaseInOut,
    ];

    #[test]
    fn envelope_hits_both_ends() {
        for curve in CURVES {
            assert_eq!(curve.envelope(0.0), 0.0, "{curve:?}");
            assert!((curve.envelope(1.0) - 1.0).abs() < f32::EPSILON, "{curve:?}");
        }
    }

    #[test]
    fn envelope_clamps_and_stays_monotonic() {
        for curve in CURVES {
            assert_eq!(curve.envelope(-3.0), 0.0);
            assert!((curve.envelope(7.0) - 1.0).abs() < f32::EPSILON);
            assert_eq!(curve.envelope(f32::NAN), 0.0);

            let mut previous = 0.0;
            for step in 0..=20 {
                let value = curve.envelope(step as f32 / 20.0);
                assert!((0.0..=1.0).contains(&value));
                assert!(value + 1e-6 >= previous, "{curve:?} decreased at {step}");
                previous = value;
            }
        }
    }

    #[test]
    fn ease_curves_bend_the_right_way() {
        assert!(FadeCurve::EaseIn.envelope(0.5) < 0.5);
        assert!(FadeCurve::EaseOut.envelope(0.5) > 0.5);
        assert!((FadeCurve::EaseInOut.envelope(0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn runner_is_single_flight() {
        let runner = TransitionRunner::new();
        let first = runner.begin();
        let second = runner.begin();

        assert!(first.token().is_cancelled());
        assert!(!second.token().is_cancelled());

        // A stale ticket does not clear the newer one.
        runner.finish(&first);
        assert!(runner.is_active());

        runner.finish(&second);
        assert!(!runner.is_active());
    }

    #[test]
    fn inactive_settings() {
        assert!(!TransitionSettings::default().is_active());
        assert!(!TransitionSettings::new(TransitionMode::Overlap, 0).is_active());
        assert!(TransitionSettings::new(TransitionMode::FadeInOut, 2000).is_active());
    }
}
