mod manual;

pub use manual::*;
