use crate::db::items::reserve_item_in_tx;
use crate::db::DbPool;
use crate::errors::{Error, Result};
use crate::models::{ClaimStatus, DonationClaim};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::{info, instrument, warn};

pub(crate) const CLAIM_COLUMNS: &str = "id, item_id, donor_id, donor_name, receiver_id, receiver_name, \
     donor_confirmed, receiver_confirmed, donor_confirmed_at, receiver_confirmed_at, \
     status, created_at, completed_at";

pub(crate) fn map_claim_row(row: &Row<'_>) -> rusqlite::Result<DonationClaim> {
    let status: String = row.get(10)?;
    Ok(DonationClaim {
        id: row.get(0)?,
        item_id: row.get(1)?,
        donor_id: row.get(2)?,
        donor_name: row.get(3)?,
        receiver_id: row.get(4)?,
        receiver_name: row.get(5)?,
        donor_confirmed: row.get(6)?,
        receiver_confirmed: row.get(7)?,
        donor_confirmed_at: row.get(8)?,
        receiver_confirmed_at: row.get(9)?,
        status: ClaimStatus::parse(&status).unwrap_or(ClaimStatus::Pending),
        created_at: row.get(11)?,
        completed_at: row.get(12)?,
    })
}

/// Opens a claim on a donation listing, reserving the listing in the same
/// transaction. The listing owner is the donor.
#[instrument(skip(pool))]
pub async fn create_claim(
    pool: &DbPool,
    item_id: i64,
    receiver_id: &str,
    receiver_name: &str,
) -> Result<i64> {
    let mut conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let tx = conn
        .transaction()
        .map_err(|e| Error::Database(format!("Failed to start transaction for claim: {}", e)))?;

    let owner: Option<(String, String)> = tx
        .prepare_cached(
            "SELECT i.owner_id, u.name FROM items i JOIN users u ON u.id = i.owner_id
             WHERE i.id = ?1 AND i.kind = 'donation' AND i.is_deleted = FALSE",
        )?
        .query_row(params![item_id], |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()?;
    let (donor_id, donor_name) = owner.ok_or_else(|| Error::NotFound {
        entity: "item",
        id: item_id.to_string(),
    })?;

    if donor_id == receiver_id {
        warn!(
            "User {} attempted to claim their own donation {}. Denied.",
            receiver_id, item_id
        );
        return Err(Error::Unauthorized {
            user_id: receiver_id.to_string(),
        });
    }

    if !reserve_item_in_tx(&tx, item_id)? {
        return Err(Error::Database(format!(
            "Donation {} is no longer available",
            item_id
        )));
    }

    let created_at = Utc::now();
    let claim_id = tx
        .prepare_cached(
            "INSERT INTO donation_claims (item_id, donor_id, donor_name, receiver_id, receiver_name, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
        )?
        .insert(params![
            item_id,
            donor_id,
            donor_name,
            receiver_id,
            receiver_name,
            created_at
        ])?;

    tx.commit()
        .map_err(|e| Error::Database(format!("Failed to commit claim creation: {}", e)))?;
    info!(
        "Created donation claim {} for listing {}: donor={}, receiver={}",
        claim_id, item_id, donor_id, receiver_id
    );
    Ok(claim_id)
}

#[instrument(skip(pool))]
pub async fn get_claim(pool: &DbPool, claim_id: i64) -> Result<Option<DonationClaim>> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {CLAIM_COLUMNS} FROM donation_claims WHERE id = ?1"
    ))?;
    let claim = stmt.query_row(params![claim_id], map_claim_row).optional()?;
    Ok(claim)
}

/// Donation claims where the counterparty has confirmed and this user has
/// not yet. Feeds the pending-confirmation notification bucket.
#[instrument(skip(pool))]
pub async fn claims_awaiting_user(pool: &DbPool, user_id: &str) -> Result<Vec<DonationClaim>> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {CLAIM_COLUMNS} FROM donation_claims
         WHERE status != 'completed'
           AND ((receiver_id = ?1 AND donor_confirmed = TRUE AND receiver_confirmed = FALSE)
             OR (donor_id = ?1 AND receiver_confirmed = TRUE AND donor_confirmed = FALSE))
         ORDER BY created_at DESC"
    ))?;
    let claims = stmt
        .query_map(params![user_id], map_claim_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(claims)
}

/// Completed donation claims this user took part in, newest first.
#[instrument(skip(pool))]
pub async fn completed_claims_for_user(pool: &DbPool, user_id: &str) -> Result<Vec<DonationClaim>> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {CLAIM_COLUMNS} FROM donation_claims
         WHERE status = 'completed' AND (donor_id = ?1 OR receiver_id = ?1)
         ORDER BY completed_at DESC"
    ))?;
    let claims = stmt
        .query_map(params![user_id], map_claim_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(claims)
}

/// Claims the donor marked handed over before `cutoff` that the receiver
/// never confirmed.
#[instrument(skip(pool))]
pub async fn stale_handover_claims(
    pool: &DbPool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<DonationClaim>> {
    let conn = pool
        .lock()
        .map_err(|_| Error::Database("Failed to acquire DB lock".to_string()))?;
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {CLAIM_COLUMNS} FROM donation_claims
         WHERE donor_confirmed = TRUE AND receiver_confirmed = FALSE
           AND status = 'pending'
           AND donor_confirmed_at < ?1
         ORDER BY donor_confirmed_at ASC"
    ))?;
    let claims = stmt
        .query_map(params![cutoff], map_claim_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::items::{create_item, get_item};
    use crate::db::test_utils::{init_test_tracing, setup_test_db};
    use crate::db::users::create_user;
    use crate::models::{ItemKind, ItemStatus};

    async fn setup_donation(db_pool: &DbPool) -> Result<i64> {
        create_user(db_pool, "donor", "Dina").await?;
        create_user(db_pool, "receiver", "Ravi").await?;
        create_item(db_pool, "Winter coat", "donor", ItemKind::Donation, None).await
    }

    #[tokio::test]
    async fn test_create_claim_reserves_listing() -> Result<()> {
        init_test_tracing();
        let db_pool = setup_test_db().await?;
        let item_id = setup_donation(&db_pool).await?;

        let claim_id = create_claim(&db_pool, item_id, "receiver", "Ravi").await?;
        let claim = get_claim(&db_pool, claim_id).await?.expect("claim missing");
        assert_eq!(claim.status, ClaimStatus::Pending);
        assert_eq!(claim.donor_id, "donor");
        assert_eq!(claim.donor_name, "Dina");

        let item = get_item(&db_pool, item_id).await?.unwrap();
        assert_eq!(item.status, ItemStatus::Reserved);
        Ok(())
    }

    #[tokio::test]
    async fn test_cannot_claim_own_donation() -> Result<()> {
        init_test_tracing();
        let db_pool = setup_test_db().await?;
        let item_id = setup_donation(&db_pool).await?;

        let result = create_claim(&db_pool, item_id, "donor", "Dina").await;
        assert!(matches!(result, Err(Error::Unauthorized { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_sale_listing_cannot_be_claimed_as_donation() -> Result<()> {
        init_test_tracing();
        let db_pool = setup_test_db().await?;
        create_user(&db_pool, "donor", "Dina").await?;
        create_user(&db_pool, "receiver", "Ravi").await?;
        let sale_id = create_item(&db_pool, "Bike", "donor", ItemKind::Sale, Some(50.0)).await?;

        let result = create_claim(&db_pool, sale_id, "receiver", "Ravi").await;
        assert!(matches!(
            result,
            Err(Error::NotFound { entity: "item", .. })
        ));
        Ok(())
    }
}
