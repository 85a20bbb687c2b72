//! Outward capabilities of the simulation core.
//!
//! The core never talks to a renderer or a sound engine directly. It pushes
//! per-instance transforms/visibility through [`PresentationSink`] and fires
//! one-shot cues through [`AudioSink`]; both are injected at construction.

use rapier3d::na;

/// One-shot sound cues emitted by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCue {
    Shot,
    TankImpact,
    WallImpact,
    BulletDestroyed,
}

/// Receives mesh-instance updates after every tick. Push only, never polled.
pub trait PresentationSink {
    fn set_transform(&self, instance: u32, transform: &na::Isometry3<f32>);
    fn set_visible(&self, instance: u32, visible: bool);
}

/// Fire-and-forget sound trigger. No acknowledgment, no ordering.
pub trait AudioSink {
    fn play(&self, cue: SoundCue);
}

/// Discards everything. Used by tests and benchmarks.
pub struct NullSink;
impl PresentationSink for NullSink {
    fn set_transform(&self, _instance: u32, _transform: &na::Isometry3<f32>) {}
    fn set_visible(&self, _instance: u32, _visible: bool) {}
}
impl AudioSink for NullSink {
    fn play(&self, _cue: SoundCue) {}
}

/// Logs cues and visibility flips. Presentation transforms are too chatty
/// to log, so only the headless binary's cue stream goes through here.
pub struct LogSink;
impl PresentationSink for LogSink {
    fn set_transform(&self, _instance: u32, _transform: &na::Isometry3<f32>) {}

    fn set_visible(&self, instance: u32, visible: bool) {
        log::debug!("instance {} visible: {}", instance, visible);
    }
}
impl AudioSink for LogSink {
    fn play(&self, cue: SoundCue) {
        log::debug!("sound cue: {:?}", cue);
    }
}
