pub mod context;

pub use context::ContextFormatter;
