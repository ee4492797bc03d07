/*!
 * # Role-Based Access Control (RBAC) Module
 *
 * Roles held by tracker users and the operations each role may perform.
 */

use lazy_static::lazy_static;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use sea_orm::Iterable;
use strum::{AsRefStr, Display, EnumString};

/// Role held by a user, supplied by the identity provider
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    Display,
    EnumString,
    AsRefStr,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Role {
    #[sea_orm(string_value = "admin")]
    Admin,
    #[sea_orm(string_value = "system-admin")]
    SystemAdmin,
    #[sea_orm(string_value = "unit-leader")]
    UnitLeader,
    #[sea_orm(string_value = "logistics-officer")]
    LogisticsOfficer,
}

/// Operations gated by role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Permission {
    RequestItems,
    RequestRepairs,
    ApproveRequests,
    IssueItems,
    ManageRepairs,
    CompleteRepairs,
    ManageStock,
    ViewReports,
    ViewLogs,
}

lazy_static! {
    pub static ref ROLE_PERMISSIONS: HashMap<Role, HashSet<Permission>> = {
        use Permission::*;

        let mut roles = HashMap::new();
        roles.insert(
            Role::UnitLeader,
            [RequestItems, RequestRepairs].into_iter().collect(),
        );
        roles.insert(
            Role::Admin,
            [RequestItems, RequestRepairs, ApproveRequests, IssueItems, ViewReports]
                .into_iter()
                .collect(),
        );
        // Repairs can only be closed out as repaired by logistics.
        roles.insert(
            Role::LogisticsOfficer,
            [IssueItems, ManageRepairs, CompleteRepairs, ManageStock, ViewReports]
                .into_iter()
                .collect(),
        );
        roles.insert(
            Role::SystemAdmin,
            [ApproveRequests, IssueItems, ManageRepairs, ManageStock, ViewReports, ViewLogs]
                .into_iter()
                .collect(),
        );
        roles
    };
}

impl Role {
    pub fn has_permission(&self, permission: Permission) -> bool {
        ROLE_PERMISSIONS
            .get(self)
            .map(|perms| perms.contains(&permission))
            .unwrap_or(false)
    }

    /// Roles that hold the given permission
    pub fn holders_of(permission: Permission) -> Vec<Role> {
        Role::iter().filter(|r| r.has_permission(permission)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case(Role::UnitLeader, Permission::RequestItems, true)]
    #[case(Role::UnitLeader, Permission::ApproveRequests, false)]
    #[case(Role::Admin, Permission::ApproveRequests, true)]
    #[case(Role::Admin, Permission::IssueItems, true)]
    #[case(Role::Admin, Permission::ManageStock, false)]
    #[case(Role::SystemAdmin, Permission::ApproveRequests, true)]
    #[case(Role::SystemAdmin, Permission::IssueItems, true)]
    #[case(Role::SystemAdmin, Permission::CompleteRepairs, false)]
    #[case(Role::LogisticsOfficer, Permission::CompleteRepairs, true)]
    #[case(Role::LogisticsOfficer, Permission::ViewLogs, false)]
    fn permission_matrix(#[case] role: Role, #[case] perm: Permission, #[case] expected: bool) {
        assert_eq!(role.has_permission(perm), expected);
    }

    #[test]
    fn only_logistics_completes_repairs() {
        assert_eq!(
            Role::holders_of(Permission::CompleteRepairs),
            vec![Role::LogisticsOfficer]
        );
    }

    #[test]
    fn roles_use_kebab_case_names() {
        assert_eq!(Role::SystemAdmin.to_string(), "system-admin");
        assert_eq!(
            Role::from_str("logistics-officer").ok(),
            Some(Role::LogisticsOfficer)
        );
        assert_eq!(
            serde_json::to_string(&Role::UnitLeader).ok().as_deref(),
            Some("\"unit-leader\"")
        );
    }
}
