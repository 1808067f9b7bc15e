// Jobs module - Scheduled background work

pub mod expiry_audit;
