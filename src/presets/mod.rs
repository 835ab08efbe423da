pub mod embedded;
pub mod loader;
