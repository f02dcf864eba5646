pub mod error;
pub mod limiters;
pub mod point_id;
pub mod similarity;
pub mod token_estimator;
