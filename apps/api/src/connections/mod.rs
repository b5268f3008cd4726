// Professional connections between users: request, accept or reject, remove.

pub mod handlers;
pub mod service;
