use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::auth::AuthUser;

/// Role
///
/// The one role type shared by the server-side middleware and the client guard
/// endpoint. Stored in `profiles.role` as its ordinal (1-5); serialized to JSON
/// by variant name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS,
    ToSchema, sqlx::Type, Default,
)]
#[ts(export)]
#[repr(i32)]
pub enum Role {
    #[default]
    Citizen = 1,
    Officer = 2,
    DepartmentHead = 3,
    Admin = 4,
    SuperAdmin = 5,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Citizen,
        Role::Officer,
        Role::DepartmentHead,
        Role::Admin,
        Role::SuperAdmin,
    ];

    pub fn ordinal(self) -> i32 {
        self as i32
    }

    pub fn from_ordinal(value: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.ordinal() == value)
    }

    /// Human label shown by the client. Never used for access comparisons.
    pub fn display_name(self) -> &'static str {
        match self {
            Role::Citizen => "Citizen",
            Role::Officer => "Officer",
            Role::DepartmentHead => "Department Head",
            Role::Admin => "Admin",
            Role::SuperAdmin => "Super Admin",
        }
    }

    /// Every non-citizen role works a triage queue.
    pub fn is_staff(self) -> bool {
        self != Role::Citizen
    }
}

/// Resource
///
/// Named areas of the portal. Each carries the fixed set of roles admitted to
/// it; this table is the only place access rules are written down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
#[serde(rename_all = "kebab-case")]
pub enum Resource {
    CitizenDashboard,
    SubmitConcern,
    AdminDashboard,
    ConcernTriage,
    Analytics,
    DepartmentAdmin,
    UserAdmin,
}

const CITIZENS: &[Role] = &[Role::Citizen];
const STAFF: &[Role] = &[
    Role::Officer,
    Role::DepartmentHead,
    Role::Admin,
    Role::SuperAdmin,
];
const MANAGERS: &[Role] = &[Role::DepartmentHead, Role::Admin, Role::SuperAdmin];
const ADMINS: &[Role] = &[Role::Admin, Role::SuperAdmin];
const SUPER_ADMINS: &[Role] = &[Role::SuperAdmin];

impl Resource {
    pub const ALL: [Resource; 7] = [
        Resource::CitizenDashboard,
        Resource::SubmitConcern,
        Resource::AdminDashboard,
        Resource::ConcernTriage,
        Resource::Analytics,
        Resource::DepartmentAdmin,
        Resource::UserAdmin,
    ];

    pub fn allowed_roles(self) -> &'static [Role] {
        match self {
            Resource::CitizenDashboard | Resource::SubmitConcern => CITIZENS,
            Resource::AdminDashboard | Resource::ConcernTriage => STAFF,
            Resource::Analytics => MANAGERS,
            Resource::DepartmentAdmin => ADMINS,
            Resource::UserAdmin => SUPER_ADMINS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum Decision {
    Permit,
    Deny,
}

impl Decision {
    pub fn is_permit(self) -> bool {
        self == Decision::Permit
    }
}

/// decide
///
/// Permits iff `role` is one of `allowed`. Anything not listed, including a
/// lower-privileged staff role asking for an admin-only area, is denied.
pub fn decide(role: Role, allowed: &[Role]) -> Decision {
    if allowed.contains(&role) {
        Decision::Permit
    } else {
        Decision::Deny
    }
}

pub fn authorize(role: Role, resource: Resource) -> Decision {
    decide(role, resource.allowed_roles())
}

/// Landing
///
/// Where the client sends a user after login or after a guard denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum Landing {
    CitizenHome,
    AdminHome,
    Login,
}

impl Landing {
    pub fn path(self) -> &'static str {
        match self {
            Landing::CitizenHome => "/citizen/home",
            Landing::AdminHome => "/admin/home",
            Landing::Login => "/login",
        }
    }
}

/// Officers share the admin landing page with the other staff roles.
pub fn landing_for(role: Option<Role>) -> Landing {
    match role {
        Some(Role::Citizen) => Landing::CitizenHome,
        Some(Role::Officer | Role::DepartmentHead | Role::Admin | Role::SuperAdmin) => {
            Landing::AdminHome
        }
        None => Landing::Login,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
#[serde(tag = "outcome", content = "landing")]
pub enum GuardOutcome {
    Admit,
    Redirect(Landing),
}

/// guard
///
/// The route-guard decision for the client. Advisory only: the server
/// re-evaluates the same table in `auth::require_access` on every request.
pub fn guard(session: Option<&AuthUser>, resource: Resource) -> GuardOutcome {
    let role = session.map(|user| user.role);
    match role {
        Some(role) if authorize(role, resource).is_permit() => GuardOutcome::Admit,
        _ => GuardOutcome::Redirect(landing_for(role)),
    }
}
