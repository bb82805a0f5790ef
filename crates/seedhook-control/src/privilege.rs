//! Caller privilege checks.

/// Answers whether the caller may issue control requests.
pub trait CallerPrivilege {
    fn is_admin(&self) -> bool;
}

/// Privilege of the current process: effective uid 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessPrivilege;

#[allow(unsafe_code)]
fn effective_uid() -> libc::uid_t {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() }
}

impl CallerPrivilege for ProcessPrivilege {
    fn is_admin(&self) -> bool {
        effective_uid() == 0
    }
}

/// Fixed answer, for tests and in-process tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticPrivilege(pub bool);

impl StaticPrivilege {
    pub const ADMIN: Self = Self(true);
    pub const USER: Self = Self(false);
}

impl CallerPrivilege for StaticPrivilege {
    fn is_admin(&self) -> bool {
        self.0
    }
}
