//! Settings lookup by `[section] key`.
//!
//! Typed getters fall back to `default` when the key is unset or its value
//! does not parse; `config_validation` is where bad values get reported.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    fn is_set(&self, section: &str, key: &str) -> bool {
        self.get_string(section, key).is_some()
    }
}
