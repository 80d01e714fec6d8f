use std::collections::BTreeSet;

pub const ADMIN_ROLE: &str = "admin";

/// Authenticated caller as resolved from a bearer token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub idir: String,
    pub roles: BTreeSet<String>,
}

impl Caller {
    pub fn new<I, R>(idir: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self { idir: idir.into(), roles: roles.into_iter().map(Into::into).collect() }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(ADMIN_ROLE)
    }
}

/// A caller may read or mutate a request they own, or any request when they hold the
/// admin role. An empty identity code never matches.
pub fn can_mutate(caller: &Caller, owner_idir: &str) -> bool {
    caller.is_admin() || (!caller.idir.is_empty() && caller.idir == owner_idir)
}
