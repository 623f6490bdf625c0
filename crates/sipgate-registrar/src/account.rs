//! Read-only account table: username -> password. Seeded once at startup
//! from configuration; no live reload.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Accounts(HashMap<String, String>);

impl Accounts {
    pub fn new(accounts: HashMap<String, String>) -> Self {
        Accounts(accounts)
    }

    pub fn password_for(&self, username: &str) -> Option<&str> {
        self.0.get(username).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_known_account() {
        let accounts = Accounts::new(HashMap::from([("alice".to_string(), "secret".to_string())]));
        assert_eq!(accounts.password_for("alice"), Some("secret"));
        assert_eq!(accounts.password_for("bob"), None);
    }
}
