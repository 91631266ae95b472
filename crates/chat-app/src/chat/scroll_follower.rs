/// Distance from the bottom under which the viewport keeps following new content.
pub const DEFAULT_FOLLOW_THRESHOLD: f32 = 120.0;

/// Scroll geometry reported by the shell whenever the viewport moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scroll_top: f32,
    pub scroll_height: f32,
    pub client_height: f32,
}

impl Viewport {
    /// Creates viewport geometry from the shell's scroll metrics.
    pub const fn new(scroll_top: f32, scroll_height: f32, client_height: f32) -> Self {
        Self {
            scroll_top,
            scroll_height,
            client_height,
        }
    }

    pub fn distance_to_bottom(&self) -> f32 {
        self.scroll_height - self.scroll_top - self.client_height
    }
}

/// Decides whether growing content should pull the viewport along.
///
/// The preference is recomputed only when the viewport reports a scroll change; content
/// growth reads it but never updates it.
#[derive(Debug, Clone)]
pub struct ScrollFollower {
    threshold: f32,
    follow_bottom: bool,
}

impl ScrollFollower {
    /// Creates a follower that starts pinned to the bottom.
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            follow_bottom: true,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn should_follow(&self) -> bool {
        self.follow_bottom
    }

    /// Recomputes the follow preference from a scroll change and returns it.
    pub fn observe(&mut self, viewport: Viewport) -> bool {
        self.follow_bottom = viewport.distance_to_bottom() < self.threshold;
        self.follow_bottom
    }

    /// Returns true when the viewport should animate to the new bottom.
    pub fn notify_content_grew(&self) -> bool {
        self.follow_bottom
    }
}

impl Default for ScrollFollower {
    fn default() -> Self {
        Self::new(DEFAULT_FOLLOW_THRESHOLD)
    }
}
