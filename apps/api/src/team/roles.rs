//! Team roles and the permission rules for managing members and invitations.
//! Pure functions; the service layer feeds them the current rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    Owner,
    Admin,
    Member,
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Owner => "owner",
            TeamRole::Admin => "admin",
            TeamRole::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(TeamRole::Owner),
            "admin" => Some(TeamRole::Admin),
            "member" => Some(TeamRole::Member),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            TeamRole::Owner => 3,
            TeamRole::Admin => 2,
            TeamRole::Member => 1,
        }
    }

    pub fn at_least(&self, min: TeamRole) -> bool {
        self.rank() >= min.rank()
    }

    /// Owners and admins manage the team, its jobs and its catalog.
    pub fn can_manage(&self) -> bool {
        self.at_least(TeamRole::Admin)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Revoked,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Revoked => "revoked",
        }
    }
}

pub fn check_can_invite(actor: TeamRole, invited: TeamRole) -> Result<(), AppError> {
    if !actor.can_manage() {
        return Err(AppError::Forbidden(
            "Only owners and admins can invite team members".to_string(),
        ));
    }
    if invited == TeamRole::Owner && actor != TeamRole::Owner {
        return Err(AppError::Forbidden(
            "Only owners can invite other owners".to_string(),
        ));
    }
    Ok(())
}

/// A member as seen by the permission checks.
#[derive(Debug, Clone, Copy)]
pub struct Seat {
    pub user_id: Uuid,
    pub role: TeamRole,
}

pub fn find_seat(roster: &[Seat], user_id: Uuid) -> Option<Seat> {
    roster.iter().copied().find(|s| s.user_id == user_id)
}

pub fn owner_count(roster: &[Seat]) -> usize {
    roster.iter().filter(|s| s.role == TeamRole::Owner).count()
}

pub fn check_role_change(
    actor: Seat,
    target: Seat,
    new_role: TeamRole,
    owner_count: usize,
) -> Result<(), AppError> {
    if !actor.role.can_manage() {
        return Err(AppError::Forbidden(
            "Only owners and admins can change roles".to_string(),
        ));
    }
    let touches_owner = target.role == TeamRole::Owner || new_role == TeamRole::Owner;
    if touches_owner && actor.role != TeamRole::Owner {
        return Err(AppError::Forbidden(
            "Only owners can grant or revoke the owner role".to_string(),
        ));
    }
    if target.role == TeamRole::Owner && new_role != TeamRole::Owner && owner_count <= 1 {
        return Err(AppError::Conflict(
            "A business must keep at least one owner".to_string(),
        ));
    }
    Ok(())
}

pub fn check_removal(actor: Seat, target: Seat, owner_count: usize) -> Result<(), AppError> {
    let leaving = actor.user_id == target.user_id;
    if !leaving {
        if !actor.role.can_manage() {
            return Err(AppError::Forbidden(
                "Only owners and admins can remove team members".to_string(),
            ));
        }
        if !actor.role.at_least(target.role) || (target.role == TeamRole::Admin && actor.role != TeamRole::Owner) {
            return Err(AppError::Forbidden(format!(
                "An {} cannot remove an {}",
                actor.role.as_str(),
                target.role.as_str()
            )));
        }
    }
    if target.role == TeamRole::Owner && owner_count <= 1 {
        return Err(AppError::Conflict(
            "The last owner cannot leave or be removed".to_string(),
        ));
    }
    Ok(())
}

/// Checks an invitation can be accepted by a caller with `caller_email` at `now`.
pub fn check_acceptable(
    status: &str,
    invited_email: &str,
    expires_at: DateTime<Utc>,
    caller_email: &str,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if status != InvitationStatus::Pending.as_str() {
        return Err(AppError::Validation(format!("Invitation is {status}")));
    }
    if expires_at <= now {
        return Err(AppError::Validation("Invitation has expired".to_string()));
    }
    if !invited_email.eq_ignore_ascii_case(caller_email) {
        return Err(AppError::Forbidden(
            "Invitation was issued to a different email address".to_string(),
        ));
    }
    Ok(())
}

pub fn generate_invitation_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn seat(role: TeamRole) -> Seat {
        Seat {
            user_id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn test_role_ordering() {
        assert!(TeamRole::Owner.at_least(TeamRole::Admin));
        assert!(TeamRole::Admin.at_least(TeamRole::Admin));
        assert!(!TeamRole::Member.at_least(TeamRole::Admin));
        assert_eq!(TeamRole::parse("admin"), Some(TeamRole::Admin));
        assert_eq!(TeamRole::parse("root"), None);
    }

    #[test]
    fn test_invite_permissions() {
        assert!(check_can_invite(TeamRole::Owner, TeamRole::Owner).is_ok());
        assert!(check_can_invite(TeamRole::Admin, TeamRole::Member).is_ok());
        assert!(check_can_invite(TeamRole::Admin, TeamRole::Owner).is_err());
        assert!(check_can_invite(TeamRole::Member, TeamRole::Member).is_err());
    }

    #[test]
    fn test_last_owner_cannot_be_demoted() {
        let owner = seat(TeamRole::Owner);
        let r = check_role_change(owner, owner, TeamRole::Admin, 1);
        assert!(matches!(r, Err(AppError::Conflict(_))));
        assert!(check_role_change(owner, owner, TeamRole::Admin, 2).is_ok());
    }

    #[test]
    fn test_admin_cannot_touch_owner_role() {
        let admin = seat(TeamRole::Admin);
        assert!(check_role_change(admin, seat(TeamRole::Member), TeamRole::Owner, 1).is_err());
        assert!(check_role_change(admin, seat(TeamRole::Owner), TeamRole::Member, 2).is_err());
        assert!(check_role_change(admin, seat(TeamRole::Member), TeamRole::Admin, 1).is_ok());
    }

    #[test]
    fn test_member_can_leave_but_not_remove_others() {
        let member = seat(TeamRole::Member);
        assert!(check_removal(member, member, 1).is_ok());
        assert!(check_removal(member, seat(TeamRole::Member), 1).is_err());
    }

    #[test]
    fn test_admin_removal_rules() {
        let admin = seat(TeamRole::Admin);
        assert!(check_removal(admin, seat(TeamRole::Member), 1).is_ok());
        assert!(check_removal(admin, seat(TeamRole::Admin), 1).is_err());
        assert!(check_removal(admin, seat(TeamRole::Owner), 2).is_err());
    }

    #[test]
    fn test_last_owner_cannot_leave() {
        let owner = seat(TeamRole::Owner);
        assert!(matches!(check_removal(owner, owner, 1), Err(AppError::Conflict(_))));
        assert!(check_removal(owner, owner, 2).is_ok());
        assert!(check_removal(owner, seat(TeamRole::Owner), 2).is_ok());
    }

    #[test]
    fn test_second_owner_departure_sees_the_first() {
        let a = seat(TeamRole::Owner);
        let b = seat(TeamRole::Owner);
        let mut roster = vec![a, b, seat(TeamRole::Member)];
        assert_eq!(owner_count(&roster), 2);
        assert!(check_removal(a, a, owner_count(&roster)).is_ok());

        roster.retain(|s| s.user_id != a.user_id);
        let b_now = find_seat(&roster, b.user_id).unwrap();
        assert!(matches!(
            check_removal(b_now, b_now, owner_count(&roster)),
            Err(AppError::Conflict(_))
        ));
        assert!(find_seat(&roster, a.user_id).is_none());
    }

    #[test]
    fn test_acceptance_rules() {
        let now = Utc::now();
        let later = now + Duration::hours(1);
        assert!(check_acceptable("pending", "a@b.io", later, "A@B.io", now).is_ok());
        assert!(check_acceptable("revoked", "a@b.io", later, "a@b.io", now).is_err());
        assert!(check_acceptable("pending", "a@b.io", now - Duration::seconds(1), "a@b.io", now).is_err());
        assert!(matches!(
            check_acceptable("pending", "a@b.io", later, "c@d.io", now),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_tokens_are_random_hex() {
        let a = generate_invitation_token();
        let b = generate_invitation_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
