pub mod cache;
pub mod company;
