pub mod analyze;
pub mod detect;
pub mod doctor;
pub mod import;
pub mod init;
pub mod sample;
