pub mod logging;
pub mod string;

pub use logging::init_logging;
pub use string::shorten_middle;
