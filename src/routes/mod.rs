pub mod access_matrix;
pub mod audit_logs;
pub mod auth;
pub mod blotters;
pub mod certificates;
pub mod delegation;
pub mod health;
pub mod residents;
pub mod role_permissions;
