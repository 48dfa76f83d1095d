pub mod amenities;
pub mod cascade;
pub mod normalize;
pub mod snapshot;
