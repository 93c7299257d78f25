pub mod addr;
pub mod config;
pub mod policy;
pub mod set;
pub mod sim;
pub mod stat;
pub mod trace;
pub mod victim;
