pub mod domain;
pub mod error;
pub mod nutrition;
pub mod protocol;
pub mod validation;
