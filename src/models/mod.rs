pub mod profile;
pub mod snapshot;
