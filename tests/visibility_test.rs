//! Location-based visibility tests against live data: anonymous users see
//! nothing, admins see everything, district officers see direct and
//! group-transitive matches only.

mod helpers;

use anyhow::Result;
use serde_json::json;

use helpers::*;
use individual_registry::database::IndividualRepository;
use individual_registry::services::{UserContext, VisibilityFilter};

#[tokio::test]
async fn test_anonymous_sees_zero_rows() -> Result<()> {
    let Some(db) = TestDb::connect().await? else {
        return Ok(());
    };
    let chain = create_location_chain(&db, "anon").await?;
    create_individual(&db, "Visible", json!({}), Some(chain.village_id)).await?;

    let filter = VisibilityFilter::new(true);
    let repository = IndividualRepository::new(db.pool.clone());

    let predicate = filter.individual_predicate(&UserContext::anonymous(), "i", 1);
    let rows = repository.list_where(&predicate.sql, &predicate.binds).await?;
    assert!(rows.is_empty(), "anonymous users receive zero rows");

    db.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn test_admin_sees_full_set() -> Result<()> {
    let Some(db) = TestDb::connect().await? else {
        return Ok(());
    };
    let chain = create_location_chain(&db, "admin").await?;
    let in_district = create_individual(&db, "InDistrict", json!({}), Some(chain.village_id)).await?;
    let nowhere = create_individual(&db, "NoVillage", json!({}), None).await?;

    let filter = VisibilityFilter::new(true);
    let repository = IndividualRepository::new(db.pool.clone());

    let predicate = filter.individual_predicate(&UserContext::admin("admin"), "i", 1);
    let rows = repository.list_where(&predicate.sql, &predicate.binds).await?;
    let ids: Vec<_> = rows.iter().map(|i| i.id).collect();
    assert!(ids.contains(&in_district.id));
    assert!(ids.contains(&nowhere.id), "admins are not location-scoped");

    db.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn test_district_officer_scope() -> Result<()> {
    let Some(db) = TestDb::connect().await? else {
        return Ok(());
    };
    let home = create_location_chain(&db, "home").await?;
    let elsewhere = create_location_chain(&db, "elsewhere").await?;

    // Direct match through the individual's own village.
    let direct = create_individual(&db, "Direct", json!({}), Some(home.village_id)).await?;
    // Transitive match through group membership only.
    let via_group = create_individual(&db, "ViaGroup", json!({}), None).await?;
    let group_id = create_group(&db, "VIS", Some(home.village_id)).await?;
    sqlx::query(
        r#"INSERT INTO registry.group_individuals (group_id, individual_id, user_created, user_updated)
           VALUES ($1, $2, 'test', 'test')"#,
    )
    .bind(group_id)
    .bind(via_group.id)
    .execute(&db.pool)
    .await?;
    // Out of jurisdiction.
    let foreign = create_individual(&db, "Foreign", json!({}), Some(elsewhere.village_id)).await?;
    let unlocated = create_individual(&db, "Unlocated", json!({}), None).await?;

    let filter = VisibilityFilter::new(true);
    let repository = IndividualRepository::new(db.pool.clone());
    let officer = UserContext::district_officer("officer", vec![home.district_id]);

    let predicate = filter.individual_predicate(&officer, "i", 1);
    let rows = repository.list_where(&predicate.sql, &predicate.binds).await?;
    let ids: Vec<_> = rows.iter().map(|i| i.id).collect();

    assert!(ids.contains(&direct.id), "direct village match");
    assert!(ids.contains(&via_group.id), "transitive group match");
    assert!(!ids.contains(&foreign.id), "other districts are hidden");
    assert!(!ids.contains(&unlocated.id), "unlocated rows are hidden");

    db.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn test_row_security_disabled_shows_all() -> Result<()> {
    let Some(db) = TestDb::connect().await? else {
        return Ok(());
    };
    let individual = create_individual(&db, "Open", json!({}), None).await?;

    let filter = VisibilityFilter::new(false);
    let repository = IndividualRepository::new(db.pool.clone());

    let predicate = filter.individual_predicate(&UserContext::anonymous(), "i", 1);
    let rows = repository.list_where(&predicate.sql, &predicate.binds).await?;
    assert!(rows.iter().any(|i| i.id == individual.id));

    db.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn test_group_visibility_by_own_village() -> Result<()> {
    let Some(db) = TestDb::connect().await? else {
        return Ok(());
    };
    let home = create_location_chain(&db, "ghome").await?;
    let elsewhere = create_location_chain(&db, "gelse").await?;

    let visible_group = create_group(&db, "GVIS", Some(home.village_id)).await?;
    let hidden_group = create_group(&db, "GHID", Some(elsewhere.village_id)).await?;

    let filter = VisibilityFilter::new(true);
    let repository = individual_registry::database::GroupRepository::new(db.pool.clone());
    let officer = UserContext::district_officer("officer", vec![home.district_id]);

    let predicate = filter.group_predicate(&officer, "g", 1);
    let rows = repository.list_where(&predicate.sql, &predicate.binds).await?;
    let ids: Vec<_> = rows.iter().map(|g| g.id).collect();
    assert!(ids.contains(&visible_group));
    assert!(!ids.contains(&hidden_group));

    db.cleanup().await?;
    Ok(())
}
