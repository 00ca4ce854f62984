pub mod reservation;
pub mod restaurant;
