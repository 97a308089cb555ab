pub mod loopback;

pub use loopback::{Launcher, LoopbackBrowser};
