pub mod desktop;
pub mod foreground;
pub mod hub;
pub mod input;
pub mod wayland;
