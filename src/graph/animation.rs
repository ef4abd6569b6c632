//! Time-based interpolation of node graphics between layouts.
//!
//! The animator never looks at a clock: the controller passes `now` (time
//! since the view was opened) and whether each entity is visible.

use crate::models::{Color, Vector2};
use crate::state::AnimationSettings;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;
use std::time::Duration;

/// The animated attribute bundle of a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodeGraphic {
    pub position: Vector2,
    pub radius: f64,
    pub color: Color,
}

impl NodeGraphic {
    pub fn new(position: Vector2, radius: f64, color: Color) -> Self {
        Self {
            position,
            radius,
            color,
        }
    }

    pub fn lerp(self, to: Self, t: f64) -> Self {
        Self {
            position: self.position.lerp(to.position, t),
            radius: self.radius + (to.radius - self.radius) * t,
            color: self.color.lerp(to.color, t),
        }
    }
}

/// Elastic ease-out: overshoots the target and settles. Exact at 0 and 1.
pub fn elastic_out(t: f64, period: f64) -> f64 {
    if t <= 0.0 {
        return 0.0;
    }
    if t >= 1.0 {
        return 1.0;
    }
    2f64.powf(-10.0 * t) * ((t - period / 4.0) * (2.0 * PI) / period).sin() + 1.0
}

#[derive(Debug, Clone, PartialEq)]
struct Tween {
    from: NodeGraphic,
    to: NodeGraphic,
    started: Duration,
    duration: Duration,
    period: f64,
}

impl Tween {
    fn progress(&self, now: Duration) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_sub(self.started);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    fn value(&self, now: Duration) -> NodeGraphic {
        let t = self.progress(now);
        if t >= 1.0 {
            return self.to;
        }
        self.from.lerp(self.to, elastic_out(t, self.period))
    }
}

/// Animation state of one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Animateable {
    target: Option<NodeGraphic>,
    displayed: Option<NodeGraphic>,
    mounted: bool,
    tween: Option<Tween>,
}

impl Animateable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last computed target
    pub fn target(&self) -> Option<NodeGraphic> {
        self.target
    }

    /// Last displayed graphic
    pub fn displayed(&self) -> Option<NodeGraphic> {
        self.displayed
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn is_animating(&self) -> bool {
        self.tween.is_some()
    }

    /// Feed a freshly computed target. Returns whether a tween was started.
    ///
    /// A new tween always starts from the previous target, never from the
    /// value currently on screen, and replaces any tween in flight.
    pub fn sync(
        &mut self,
        target: NodeGraphic,
        mounted: bool,
        force_redraw: bool,
        now: Duration,
        settings: &AnimationSettings,
    ) -> bool {
        let newly_mounted = mounted && !self.mounted;
        self.mounted = mounted;
        let previous = self.target.replace(target);

        if !mounted {
            self.tween = None;
            self.displayed = Some(target);
            return false;
        }

        if self.displayed == Some(target) {
            self.tween = None;
            return false;
        }

        let from = match previous {
            Some(previous) if previous != target => Some(previous),
            _ if newly_mounted && force_redraw => self.displayed,
            _ => None,
        };

        match from {
            Some(from) => {
                self.tween = Some(Tween {
                    from,
                    to: target,
                    started: now,
                    duration: settings.duration(),
                    period: settings.elastic_period,
                });
                true
            }
            None => {
                if self.displayed.is_none() {
                    self.displayed = Some(target);
                }
                false
            }
        }
    }

    /// Advance to `now` and return the graphic to draw.
    pub fn sample(&mut self, now: Duration) -> Option<NodeGraphic> {
        if let Some(tween) = &self.tween {
            let value = tween.value(now);
            if tween.progress(now) >= 1.0 {
                self.tween = None;
            }
            self.displayed = Some(value);
        }
        self.displayed
    }
}

/// Board of per-entity animations, keyed by entity id.
#[derive(Debug, Clone, Default)]
pub struct Animator {
    settings: AnimationSettings,
    entries: HashMap<String, Animateable>,
}

impl Animator {
    pub fn new(settings: AnimationSettings) -> Self {
        Self {
            settings,
            entries: HashMap::new(),
        }
    }

    pub fn sync(
        &mut self,
        id: &str,
        target: NodeGraphic,
        mounted: bool,
        force_redraw: bool,
        now: Duration,
    ) -> bool {
        let started = self
            .entries
            .entry(id.to_string())
            .or_default()
            .sync(target, mounted, force_redraw, now, &self.settings);
        if started {
            tracing::trace!("Tween started for {}", id);
        }
        started
    }

    pub fn sample(&mut self, id: &str, now: Duration) -> Option<NodeGraphic> {
        self.entries.get_mut(id).and_then(|entry| entry.sample(now))
    }

    pub fn get(&self, id: &str) -> Option<&Animateable> {
        self.entries.get(id)
    }

    /// Drop entities that left the graph.
    pub fn retain(&mut self, live: &HashSet<String>) {
        self.entries.retain(|id, _| live.contains(id));
    }

    pub fn is_animating(&self) -> bool {
        self.entries.values().any(Animateable::is_animating)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn graphic(x: f64, y: f64) -> NodeGraphic {
        NodeGraphic::new(Vector2::new(x, y), 15.0, Color::UNOWNED)
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_elastic_out_endpoints() {
        assert_eq!(elastic_out(0.0, 0.3), 0.0);
        assert_eq!(elastic_out(1.0, 0.3), 1.0);
        assert!(elastic_out(0.2, 0.3) > 1.0, "elastic curve overshoots");
        assert!((elastic_out(0.99, 0.3) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_unmounted_stores_directly() {
        let settings = AnimationSettings::default();
        let mut anim = Animateable::new();
        assert!(!anim.sync(graphic(0.0, 0.0), false, true, ms(0), &settings));
        assert!(!anim.sync(graphic(10.0, 0.0), false, true, ms(10), &settings));
        assert!(!anim.is_animating());
        assert_eq!(anim.sample(ms(20)), Some(graphic(10.0, 0.0)));
    }

    #[test]
    fn test_same_target_is_noop() {
        let settings = AnimationSettings::default();
        let mut anim = Animateable::new();
        anim.sync(graphic(0.0, 0.0), true, true, ms(0), &settings);
        assert!(!anim.sync(graphic(0.0, 0.0), true, true, ms(100), &settings));
        assert!(!anim.is_animating());
    }

    #[test]
    fn test_tween_reaches_exact_target() {
        let settings = AnimationSettings::default();
        let mut anim = Animateable::new();
        anim.sync(graphic(0.0, 0.0), true, false, ms(0), &settings);
        assert!(anim.sync(graphic(60.0, 120.0), true, false, ms(100), &settings));

        let mid = anim.sample(ms(200)).unwrap();
        assert_ne!(mid, graphic(60.0, 120.0));
        assert_eq!(anim.sample(ms(850)), Some(graphic(60.0, 120.0)));
        assert!(!anim.is_animating());
    }

    #[test]
    fn test_new_tween_starts_from_last_target() {
        let settings = AnimationSettings::default();
        let mut anim = Animateable::new();
        anim.sync(graphic(0.0, 0.0), true, false, ms(0), &settings);
        anim.sync(graphic(100.0, 0.0), true, false, ms(0), &settings);
        anim.sample(ms(100));

        // Supersede mid-flight: the replacement starts at the old target
        assert!(anim.sync(graphic(100.0, 200.0), true, false, ms(100), &settings));
        assert_eq!(anim.sample(ms(100)), Some(graphic(100.0, 0.0)));
        assert_eq!(anim.sample(ms(1000)), Some(graphic(100.0, 200.0)));
    }

    #[test]
    fn test_remount_with_force_redraw() {
        let settings = AnimationSettings::default();
        let mut anim = Animateable::new();
        anim.sync(graphic(0.0, 0.0), true, false, ms(0), &settings);
        anim.sync(graphic(50.0, 0.0), true, false, ms(0), &settings);
        anim.sample(ms(100));

        // Hidden before the tween settled, then shown again with a forced redraw
        anim.sync(graphic(50.0, 0.0), false, false, ms(100), &settings);
        assert!(!anim.sync(graphic(50.0, 0.0), true, true, ms(200), &settings));
        assert_eq!(anim.sample(ms(200)), Some(graphic(50.0, 0.0)));
    }

    #[test]
    fn test_animator_board() {
        let mut animator = Animator::new(AnimationSettings::default());
        animator.sync("a", graphic(0.0, 0.0), true, true, ms(0));
        animator.sync("b", graphic(0.0, 60.0), true, true, ms(0));
        assert!(animator.sync("a", graphic(60.0, 0.0), true, false, ms(10)));
        assert!(animator.is_animating());

        animator.retain(&HashSet::from(["b".to_string()]));
        assert_eq!(animator.len(), 1);
        assert!(!animator.is_animating());
        assert_eq!(animator.sample("b", ms(20)), Some(graphic(0.0, 60.0)));
        assert_eq!(animator.sample("a", ms(20)), None);
    }
}
