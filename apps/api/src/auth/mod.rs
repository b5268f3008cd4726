// Authentication: password hashing, JWT issuing/validation, the `AuthUser`
// extractor and the register/login endpoints.

pub mod extractor;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod service;

pub use extractor::{AuthUser, MaybeAuthUser};
