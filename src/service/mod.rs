pub mod session;
pub mod session_controller;
pub mod sweeper;
