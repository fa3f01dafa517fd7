pub mod fetch;
pub mod show;
pub mod sources;
