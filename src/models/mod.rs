pub mod job;
pub mod object;
pub mod request;
