//! Animation-side collaborators of the owning client.
//!
//! The simulation never waits on an animation to finish. The timeline only
//! exists to deliver the hit window at the authored instant of the swing.

use log::debug;

/// Sink for animation parameters driven by the simulation
pub trait AnimationDriver {
    fn set_trigger(&mut self, name: &str);
    fn set_horizontal_speed(&mut self, speed: f32);
}

/// Receives the hit-window event of an attack clip
pub trait HitWindowHandler {
    fn resolve_hit_window(&mut self, activation: u32);
}

/// Writes animation parameters to the log; used by the headless client
#[derive(Debug, Default)]
pub struct LogAnimator {
    speed: f32,
}

impl AnimationDriver for LogAnimator {
    fn set_trigger(&mut self, name: &str) {
        debug!("Animation trigger: {}", name);
    }

    fn set_horizontal_speed(&mut self, speed: f32) {
        if (speed - self.speed).abs() > 0.1 {
            debug!("Animation speed: {:.2}", speed);
        }
        self.speed = speed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AttackClip {
    activation: u32,
    elapsed: f32,
    hit_frame: f32,
    length: f32,
    hit_fired: bool,
}

/// Plays at most one attack clip and fires its hit window exactly once
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationTimeline {
    clip: Option<AttackClip>,
}

impl AnimationTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a clip, replacing any clip still playing
    pub fn play_attack(&mut self, activation: u32, hit_frame_secs: f32, length_secs: f32) {
        self.clip = Some(AttackClip {
            activation,
            elapsed: 0.0,
            hit_frame: hit_frame_secs.max(0.0),
            length: length_secs.max(hit_frame_secs),
            hit_fired: false,
        });
    }

    /// Stops the clip; a hit window that has not fired yet never will
    pub fn cancel(&mut self) {
        self.clip = None;
    }

    pub fn is_playing(&self) -> bool {
        self.clip.is_some()
    }

    pub fn activation(&self) -> Option<u32> {
        self.clip.map(|c| c.activation)
    }

    pub fn advance<H: HitWindowHandler>(&mut self, dt: f32, handler: &mut H) {
        let Some(clip) = self.clip.as_mut() else {
            return;
        };

        clip.elapsed += if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        if !clip.hit_fired && clip.elapsed >= clip.hit_frame {
            clip.hit_fired = true;
            let activation = clip.activation;
            handler.resolve_hit_window(activation);
        }

        if self.clip.is_some_and(|c| c.hit_fired && c.elapsed >= c.length) {
            self.clip = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        windows: Vec<u32>,
    }

    impl HitWindowHandler for Recorder {
        fn resolve_hit_window(&mut self, activation: u32) {
            self.windows.push(activation);
        }
    }

    #[test]
    fn test_hit_window_fires_once_at_hit_frame() {
        let mut timeline = AnimationTimeline::new();
        let mut recorder = Recorder::default();
        timeline.play_attack(4, 0.35, 0.8);

        for _ in 0..20 {
            timeline.advance(1.0 / 60.0, &mut recorder);
        }
        assert_eq!(recorder.windows, vec![4]);

        for _ in 0..60 {
            timeline.advance(1.0 / 60.0, &mut recorder);
        }
        assert_eq!(recorder.windows, vec![4]);
        assert!(!timeline.is_playing());
    }

    #[test]
    fn test_hit_window_not_before_hit_frame() {
        let mut timeline = AnimationTimeline::new();
        let mut recorder = Recorder::default();
        timeline.play_attack(1, 0.35, 0.8);

        timeline.advance(0.34, &mut recorder);
        assert!(recorder.windows.is_empty());

        timeline.advance(0.02, &mut recorder);
        assert_eq!(recorder.windows, vec![1]);
    }

    #[test]
    fn test_cancel_suppresses_hit_window() {
        let mut timeline = AnimationTimeline::new();
        let mut recorder = Recorder::default();
        timeline.play_attack(1, 0.35, 0.8);

        timeline.advance(0.1, &mut recorder);
        timeline.cancel();
        timeline.advance(1.0, &mut recorder);

        assert!(recorder.windows.is_empty());
        assert_eq!(timeline.activation(), None);
    }

    #[test]
    fn test_idle_timeline_does_nothing() {
        let mut timeline = AnimationTimeline::new();
        let mut recorder = Recorder::default();
        timeline.advance(10.0, &mut recorder);
        assert!(recorder.windows.is_empty());
    }
}
