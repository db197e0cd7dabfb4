use strum_macros::{AsRefStr, Display};

/// Authorization level carried in access tokens as a numeric id.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, AsRefStr)]
pub enum Role {
    Admin = 1,
    Manager = 2,
    Employee = 3,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Manager),
            3 => Some(Role::Employee),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Admin flag wins; managing any team makes a manager.
    pub fn for_identity(is_admin: bool, manages_team: bool) -> Self {
        match (is_admin, manages_team) {
            (true, _) => Role::Admin,
            (false, true) => Role::Manager,
            (false, false) => Role::Employee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_survive_the_token_round_trip() {
        for role in [Role::Admin, Role::Manager, Role::Employee] {
            assert_eq!(Role::from_id(role.id()), Some(role));
        }
        assert_eq!(Role::from_id(0), None);
        assert_eq!(Role::from_id(4), None);
    }

    #[test]
    fn admin_flag_outranks_team_management() {
        assert_eq!(Role::for_identity(true, false), Role::Admin);
        assert_eq!(Role::for_identity(true, true), Role::Admin);
        assert_eq!(Role::for_identity(false, true), Role::Manager);
        assert_eq!(Role::for_identity(false, false).to_string(), "Employee");
    }
}
