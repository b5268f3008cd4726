// Business team management: roles, invitations and membership changes.

pub mod handlers;
pub mod roles;
pub mod service;
