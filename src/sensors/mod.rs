pub mod motion;
pub mod ppg;
