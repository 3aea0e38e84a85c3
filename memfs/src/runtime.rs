pub mod fd;
pub mod path;
pub mod types;
pub mod walk;
