pub mod axis;
pub mod bench;
pub mod cohort;
pub mod config;
pub mod placement;
pub mod result;
pub mod space;
pub mod util;
