use rdev::{listen, EventType};

use crate::tracker::hub::SignalHub;

/// Input events that count as user activity: pointer press/move, key press, scroll.
pub fn is_activity_event(event_type: &EventType) -> bool {
    matches!(
        event_type,
        EventType::KeyPress(_) | EventType::ButtonPress(_) | EventType::MouseMove { .. } | EventType::Wheel { .. }
    )
}

/// Starts the global rdev input hook on its own thread, forwarding activity to `hub`.
///
/// rdev offers no way to stop `listen`, so the thread lives for the whole
/// process; callbacks are detached through the hub instead.
pub fn start_input_hook(hub: SignalHub) {
    std::thread::spawn(move || {
        let callback = move |event: rdev::Event| {
            if is_activity_event(&event.event_type) {
                hub.emit();
            }
        };
        if let Err(error) = listen(callback) {
            log::error!("Error listening for input events: {:?}", error);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdev::{Button, Key};

    #[test]
    fn test_activity_events() {
        assert!(is_activity_event(&EventType::KeyPress(Key::KeyA)));
        assert!(is_activity_event(&EventType::ButtonPress(Button::Left)));
        assert!(is_activity_event(&EventType::MouseMove { x: 1.0, y: 2.0 }));
        assert!(is_activity_event(&EventType::Wheel { delta_x: 0, delta_y: -1 }));
    }

    #[test]
    fn test_release_events_are_ignored() {
        assert!(!is_activity_event(&EventType::KeyRelease(Key::KeyA)));
        assert!(!is_activity_event(&EventType::ButtonRelease(Button::Left)));
    }
}
