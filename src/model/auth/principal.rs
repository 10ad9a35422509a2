use crate::model::user::Role;

/// A kind of caller with a fixed role, used to type route guards.
pub trait Principal {
    /// The role a token must carry to act as this principal.
    const ROLE: Role;
}

/// A student voter.
#[derive(Debug, Copy, Clone)]
pub struct Student;

impl Principal for Student {
    const ROLE: Role = Role::Student;
}

/// An election administrator.
#[derive(Debug, Copy, Clone)]
pub struct Admin;

impl Principal for Admin {
    const ROLE: Role = Role::Admin;
}
