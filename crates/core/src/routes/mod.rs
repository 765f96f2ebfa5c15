mod debug;
mod health;
mod proxy;

pub use debug::*;
pub use health::*;
pub use proxy::*;
