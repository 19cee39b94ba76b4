pub mod advertise;
pub mod listener;
