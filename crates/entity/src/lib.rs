pub mod app_user;
pub mod department;
pub mod employee;
pub mod job_position;
