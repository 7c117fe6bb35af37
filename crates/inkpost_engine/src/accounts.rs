use crate::Account;

/// Configured accounts plus the default choice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountBook {
    accounts: Vec<Account>,
    default: Option<String>,
}

impl AccountBook {
    pub fn new(accounts: Vec<Account>, default: Option<String>) -> Self {
        Self { accounts, default }
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// Picks the account for a note: front matter `appid`, then the
    /// requested account, then the default. Each may be a name or an app id.
    pub fn select(&self, requested: Option<&str>, front_matter: Option<&str>) -> Option<Account> {
        let wanted = front_matter
            .or(requested)
            .or(self.default.as_deref())
            .map(str::trim)
            .filter(|key| !key.is_empty())?;
        self.accounts
            .iter()
            .find(|account| account.app_id == wanted || account.name == wanted)
            .cloned()
    }
}
