pub mod analysis;
pub mod panels;
pub mod plot;
