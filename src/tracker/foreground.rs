use active_win_pos_rs::get_active_window;

/// Decides whether the focused application counts as "the view is visible".
#[derive(Debug, Clone, Default)]
pub struct ForegroundFilter {
    tracked_apps: Vec<String>,
}

impl ForegroundFilter {
    pub fn new(tracked_apps: &[String]) -> Self {
        Self {
            tracked_apps: tracked_apps
                .iter()
                .map(|app| app.trim().to_lowercase())
                .filter(|app| !app.is_empty())
                .collect(),
        }
    }

    /// With no tracked apps configured every window counts.
    pub fn is_unrestricted(&self) -> bool {
        self.tracked_apps.is_empty()
    }

    pub fn matches(&self, app_name: &str) -> bool {
        if self.is_unrestricted() {
            return true;
        }
        let app_lower = app_name.to_lowercase();
        self.tracked_apps.iter().any(|tracked| app_lower.contains(tracked.as_str()))
    }

    /// Queries the focused window. When it cannot be determined the view is
    /// assumed visible.
    pub fn probe(&self) -> bool {
        match get_active_window() {
            Ok(window) => self.matches(&window.app_name),
            Err(()) => {
                log::debug!("Active window detection failed, assuming foreground");
                true
            }
        }
    }
}
