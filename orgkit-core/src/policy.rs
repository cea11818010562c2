use crate::models::common::Role;
use crate::models::organizations::Membership;

/// Actions a member can attempt against an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgAction {
    InviteUser,
    ChangeRole,
    ViewDashboard,
}

/// Pure permission check over the acting user's membership in the target
/// org. `None` means no membership at all. There is no platform-superuser
/// bypass here; anything of that sort lives outside this core.
///
/// Note: `ChangeRole` passes for admins at this layer, but the role-update
/// operation itself is owner-gated on top of this check.
pub fn can_perform(membership: Option<&Membership>, action: OrgAction) -> bool {
    let m = match membership {
        Some(m) if m.is_active => m,
        _ => return false,
    };
    match action {
        OrgAction::InviteUser | OrgAction::ChangeRole => {
            matches!(m.role, Role::Owner | Role::Admin)
        }
        OrgAction::ViewDashboard => true,
    }
}
