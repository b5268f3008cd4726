use chrono::{Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::business::{InvitationRow, MemberRow};
use crate::team::roles::{
    check_acceptable, check_can_invite, check_removal, check_role_change, find_seat,
    generate_invitation_token, owner_count, InvitationStatus, Seat, TeamRole,
};
use crate::validation::{check_email, normalize_email};

/// The caller's role in a live (not soft-deleted) business, if any.
pub async fn find_role(
    pool: &PgPool,
    business_id: Uuid,
    user_id: Uuid,
) -> Result<Option<TeamRole>, AppError> {
    let role: Option<String> = sqlx::query_scalar(
        r#"
        SELECT m.role
        FROM business_members m
        JOIN businesses b ON b.id = m.business_id
        WHERE m.business_id = $1 AND m.user_id = $2 AND b.deleted_at IS NULL
        "#,
    )
    .bind(business_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(role.as_deref().and_then(TeamRole::parse))
}

/// Requires the caller to hold at least `min` in the business.
pub async fn require_role(
    pool: &PgPool,
    business_id: Uuid,
    user_id: Uuid,
    min: TeamRole,
) -> Result<TeamRole, AppError> {
    match find_role(pool, business_id, user_id).await? {
        Some(role) if role.at_least(min) => Ok(role),
        Some(_) => Err(AppError::Forbidden(format!(
            "This action requires the {} role",
            min.as_str()
        ))),
        None => Err(AppError::Forbidden(
            "You are not a member of this business".to_string(),
        )),
    }
}

pub async fn add_member(
    tx: &mut Transaction<'_, Postgres>,
    business_id: Uuid,
    user_id: Uuid,
    role: TeamRole,
) -> Result<(), AppError> {
    sqlx::query("INSERT INTO business_members (business_id, user_id, role) VALUES ($1, $2, $3)")
        .bind(business_id)
        .bind(user_id)
        .bind(role.as_str())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn list_members(pool: &PgPool, business_id: Uuid) -> Result<Vec<MemberRow>, AppError> {
    Ok(sqlx::query_as::<_, MemberRow>(
        r#"
        SELECT m.business_id, m.user_id, m.role, m.joined_at, u.full_name, u.email
        FROM business_members m
        JOIN users u ON u.id = m.user_id
        WHERE m.business_id = $1
        ORDER BY m.joined_at ASC
        "#,
    )
    .bind(business_id)
    .fetch_all(pool)
    .await?)
}

/// Locks a live business row for the rest of `tx` and returns its members.
/// Every change that can lower the owner count must hold this lock.
async fn lock_roster(
    tx: &mut Transaction<'_, Postgres>,
    business_id: Uuid,
) -> Result<Vec<Seat>, AppError> {
    lock_live_business(tx, business_id).await?;
    let rows: Vec<(Uuid, String)> =
        sqlx::query_as("SELECT user_id, role FROM business_members WHERE business_id = $1")
            .bind(business_id)
            .fetch_all(&mut **tx)
            .await?;
    Ok(rows
        .into_iter()
        .filter_map(|(user_id, role)| TeamRole::parse(&role).map(|role| Seat { user_id, role }))
        .collect())
}

async fn lock_live_business(
    tx: &mut Transaction<'_, Postgres>,
    business_id: Uuid,
) -> Result<(), AppError> {
    let live: Option<Uuid> = sqlx::query_scalar(
        "SELECT id FROM businesses WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
    )
    .bind(business_id)
    .fetch_optional(&mut **tx)
    .await?;
    live.map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("Business {business_id} not found")))
}

fn seats(roster: &[Seat], actor_id: Uuid, target_id: Uuid) -> Result<(Seat, Seat), AppError> {
    let actor = find_seat(roster, actor_id).ok_or_else(|| {
        AppError::Forbidden("You are not a member of this business".to_string())
    })?;
    let target = find_seat(roster, target_id)
        .ok_or_else(|| AppError::NotFound(format!("User {target_id} is not a member")))?;
    Ok((actor, target))
}

pub struct NewInvitation {
    pub email: String,
    pub role: TeamRole,
}

pub async fn create_invitation(
    pool: &PgPool,
    business_id: Uuid,
    inviter_id: Uuid,
    invitation: NewInvitation,
    ttl_hours: i64,
) -> Result<InvitationRow, AppError> {
    let actor = require_role(pool, business_id, inviter_id, TeamRole::Admin).await?;
    check_can_invite(actor, invitation.role)?;
    check_email("email", &invitation.email)?;
    let email = normalize_email(&invitation.email);

    let already_member: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM business_members m JOIN users u ON u.id = m.user_id
            WHERE m.business_id = $1 AND u.email = $2
        )
        "#,
    )
    .bind(business_id)
    .bind(&email)
    .fetch_one(pool)
    .await?;
    if already_member {
        return Err(AppError::Conflict(format!("{email} is already a team member")));
    }

    let pending: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM team_invitations
            WHERE business_id = $1 AND email = $2 AND status = 'pending' AND expires_at > now()
        )
        "#,
    )
    .bind(business_id)
    .bind(&email)
    .fetch_one(pool)
    .await?;
    if pending {
        return Err(AppError::Conflict(format!(
            "{email} already has a pending invitation"
        )));
    }

    // An expired pending invitation would block the partial unique index.
    sqlx::query(
        r#"
        UPDATE team_invitations SET status = 'revoked'
        WHERE business_id = $1 AND email = $2 AND status = 'pending'
        "#,
    )
    .bind(business_id)
    .bind(&email)
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, InvitationRow>(
        r#"
        INSERT INTO team_invitations
            (id, business_id, email, role, token, invited_by, status, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(business_id)
    .bind(&email)
    .bind(invitation.role.as_str())
    .bind(generate_invitation_token())
    .bind(inviter_id)
    .bind(Utc::now() + Duration::hours(ttl_hours))
    .fetch_one(pool)
    .await?;

    info!("Invited {email} to business {business_id} as {}", invitation.role.as_str());
    Ok(row)
}

pub async fn list_pending_invitations(
    pool: &PgPool,
    business_id: Uuid,
    caller_id: Uuid,
) -> Result<Vec<InvitationRow>, AppError> {
    require_role(pool, business_id, caller_id, TeamRole::Admin).await?;
    Ok(sqlx::query_as::<_, InvitationRow>(
        r#"
        SELECT * FROM team_invitations
        WHERE business_id = $1 AND status = 'pending' AND expires_at > now()
        ORDER BY created_at DESC
        "#,
    )
    .bind(business_id)
    .fetch_all(pool)
    .await?)
}

pub async fn revoke_invitation(
    pool: &PgPool,
    business_id: Uuid,
    invitation_id: Uuid,
    caller_id: Uuid,
) -> Result<(), AppError> {
    require_role(pool, business_id, caller_id, TeamRole::Admin).await?;
    let result = sqlx::query(
        r#"
        UPDATE team_invitations SET status = $1
        WHERE id = $2 AND business_id = $3 AND status = 'pending'
        "#,
    )
    .bind(InvitationStatus::Revoked.as_str())
    .bind(invitation_id)
    .bind(business_id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Pending invitation {invitation_id} not found"
        )));
    }
    Ok(())
}

pub async fn accept_invitation(
    pool: &PgPool,
    token: &str,
    user_id: Uuid,
    user_email: &str,
) -> Result<MemberRow, AppError> {
    let mut tx = pool.begin().await?;

    let invitation = sqlx::query_as::<_, InvitationRow>(
        "SELECT * FROM team_invitations WHERE token = $1 FOR UPDATE",
    )
    .bind(token)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Invitation not found".to_string()))?;

    lock_live_business(&mut tx, invitation.business_id).await?;
    check_acceptable(
        &invitation.status,
        &invitation.email,
        invitation.expires_at,
        user_email,
        Utc::now(),
    )?;

    let role = TeamRole::parse(&invitation.role)
        .ok_or_else(|| anyhow::anyhow!("Invitation {} has unknown role", invitation.id))?;

    let existing: Option<String> = sqlx::query_scalar(
        "SELECT role FROM business_members WHERE business_id = $1 AND user_id = $2",
    )
    .bind(invitation.business_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(
            "You are already a member of this business".to_string(),
        ));
    }

    add_member(&mut tx, invitation.business_id, user_id, role).await?;
    sqlx::query("UPDATE team_invitations SET status = $1 WHERE id = $2")
        .bind(InvitationStatus::Accepted.as_str())
        .bind(invitation.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!("User {user_id} joined business {} as {}", invitation.business_id, role.as_str());

    list_members(pool, invitation.business_id)
        .await?
        .into_iter()
        .find(|m| m.user_id == user_id)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Membership vanished after insert")))
}

pub async fn change_role(
    pool: &PgPool,
    business_id: Uuid,
    actor_id: Uuid,
    target_id: Uuid,
    new_role: TeamRole,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    let roster = lock_roster(&mut tx, business_id).await?;
    let (actor, target) = seats(&roster, actor_id, target_id)?;
    check_role_change(actor, target, new_role, owner_count(&roster))?;

    sqlx::query("UPDATE business_members SET role = $1 WHERE business_id = $2 AND user_id = $3")
        .bind(new_role.as_str())
        .bind(business_id)
        .bind(target_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    info!(
        "User {target_id} in business {business_id} is now {}",
        new_role.as_str()
    );
    Ok(())
}

pub async fn remove_member(
    pool: &PgPool,
    business_id: Uuid,
    actor_id: Uuid,
    target_id: Uuid,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    let roster = lock_roster(&mut tx, business_id).await?;
    let (actor, target) = seats(&roster, actor_id, target_id)?;
    check_removal(actor, target, owner_count(&roster))?;

    sqlx::query("DELETE FROM business_members WHERE business_id = $1 AND user_id = $2")
        .bind(business_id)
        .bind(target_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    info!("User {target_id} removed from business {business_id}");
    Ok(())
}
