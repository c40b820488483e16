pub mod backward;
pub mod forward;
pub mod least_squares;
pub mod lof;
