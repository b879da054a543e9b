//! Image Element Events
//!
//! Load and pointer events delivered to a WebP image element.

use crate::selector::PLACEHOLDER_SRC;
use std::sync::Arc;

/// Event types forwarded to caller handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEventType {
    Load,
    MouseMove,
    MouseLeave,
}

/// Event fired against an image element
#[derive(Debug, Clone, PartialEq)]
pub struct ImageEvent {
    pub event_type: ImageEventType,
    /// `src` of the element at the time the event fired
    pub target_src: String,
    pub client_x: f64,
    pub client_y: f64,
    pub timestamp: f64,
}

impl ImageEvent {
    /// Create load event
    pub fn load(target_src: &str) -> Self {
        Self {
            event_type: ImageEventType::Load,
            target_src: target_src.to_string(),
            client_x: 0.0,
            client_y: 0.0,
            timestamp: 0.0,
        }
    }

    /// Create mouse move event
    pub fn mouse_move(target_src: &str, x: f64, y: f64) -> Self {
        Self {
            event_type: ImageEventType::MouseMove,
            target_src: target_src.to_string(),
            client_x: x,
            client_y: y,
            timestamp: 0.0,
        }
    }

    /// Create mouse leave event
    pub fn mouse_leave(target_src: &str) -> Self {
        Self {
            event_type: ImageEventType::MouseLeave,
            target_src: target_src.to_string(),
            client_x: 0.0,
            client_y: 0.0,
            timestamp: 0.0,
        }
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Fired while the element showed the placeholder
    pub fn targets_placeholder(&self) -> bool {
        self.target_src == PLACEHOLDER_SRC
    }
}

/// Caller-supplied event callback
pub type EventHandler = Arc<dyn Fn(&ImageEvent) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mouse_move_event() {
        let event = ImageEvent::mouse_move("a.webp", 3.0, 4.5).with_timestamp(12.0);

        assert_eq!(event.event_type, ImageEventType::MouseMove);
        assert_eq!(event.client_y, 4.5);
        assert_eq!(event.timestamp, 12.0);
        assert!(!event.targets_placeholder());
    }

    #[test]
    fn test_placeholder_target() {
        assert!(ImageEvent::load(PLACEHOLDER_SRC).targets_placeholder());
        assert!(ImageEvent::mouse_leave(PLACEHOLDER_SRC).targets_placeholder());
    }
}
