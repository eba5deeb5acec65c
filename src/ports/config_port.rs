//! Configuration access port trait.
//!
//! Values come back raw; typing and defaults live in
//! [`crate::domain::config_validation`].

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
}
