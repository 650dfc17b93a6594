pub mod reservation;
pub mod settlement;
pub mod transaction;
