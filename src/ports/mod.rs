pub mod carrier;
pub mod spotify;
