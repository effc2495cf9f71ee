pub mod badge;
pub mod registry;
pub mod scanner;
pub mod token;

pub use registry::AdRegistry;
pub use scanner::scan;
