mod common;

use assert_matches::assert_matches;
use chrono::Utc;
use common::TestApp;
use equipment_tracker::{
    auth::Role,
    entities::{issued_item, request::RequestStatus},
    errors::ServiceError,
    services::{requests::SubmitRequestInput, SerialNumberAllocator},
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use std::collections::HashSet;
use uuid::Uuid;

async fn issue_request(app: &TestApp, requester: &equipment_tracker::auth::CurrentUser, item_id: Uuid, quantity: i32) -> Uuid {
    let requests = &app.state.services.requests;
    let created = requests
        .submit(
            SubmitRequestInput {
                item_id,
                quantity,
                request_type: Default::default(),
                priority: Default::default(),
                purpose: None,
            },
            requester,
        )
        .await
        .expect("submit");
    requests
        .update_status(created.id, RequestStatus::Approved, &app.admin())
        .await
        .expect("approve");
    requests
        .update_status(created.id, RequestStatus::Issued, &app.officer())
        .await
        .expect("issue");
    created.id
}

async fn serials_for(app: &TestApp, request_id: Uuid) -> Vec<String> {
    issued_item::Entity::find()
        .filter(issued_item::Column::RequestId.eq(request_id))
        .order_by_asc(issued_item::Column::SerialNumber)
        .all(&*app.state.db)
        .await
        .expect("issued items")
        .into_iter()
        .map(|unit| unit.serial_number)
        .collect()
}

#[tokio::test]
async fn first_serial_for_a_prefix_is_001() {
    let app = TestApp::new().await;
    let serial = SerialNumberAllocator::default()
        .generate_serial(&*app.state.db, Some("Alpha"), "Medical Supplies", "First Aid Kit")
        .await
        .expect("serial");
    assert_eq!(serial, "NPC/ALPHA/MS/FAK/001");
}

#[tokio::test]
async fn sequences_continue_across_requests() {
    let app = TestApp::new().await;

    let first = issue_request(&app, &app.leader(), app.item.id, 1).await;
    assert_eq!(serials_for(&app, first).await, vec!["NPC/ALPHA/MS/FAK/001"]);

    let second = issue_request(&app, &app.leader(), app.item.id, 1).await;
    assert_eq!(serials_for(&app, second).await, vec!["NPC/ALPHA/MS/FAK/002"]);
}

#[tokio::test]
async fn multi_unit_issuance_yields_distinct_serials() {
    let app = TestApp::new().await;

    let request_id = issue_request(&app, &app.leader(), app.item.id, 3).await;
    let serials = serials_for(&app, request_id).await;
    assert_eq!(
        serials,
        vec![
            "NPC/ALPHA/MS/FAK/001",
            "NPC/ALPHA/MS/FAK/002",
            "NPC/ALPHA/MS/FAK/003"
        ]
    );

    let stored = app
        .state
        .services
        .requests
        .get(request_id, &app.admin())
        .await
        .unwrap();
    let linked = app
        .state
        .services
        .issuance
        .get(stored.issued_item_id.expect("linked unit"))
        .await
        .unwrap();
    assert!(serials.contains(&linked.serial_number));
}

#[tokio::test]
async fn prefixes_are_independent() {
    let app = TestApp::new().await;
    let radio = app.add_item("Radio Set", "Signal Equipment", 5).await;
    let bravo = app.add_user("bravo", Role::UnitLeader, Some("Bravo")).await;
    let nomad = app.add_user("nomad", Role::UnitLeader, None).await;

    issue_request(&app, &app.leader(), app.item.id, 2).await;
    let radio_request = issue_request(&app, &app.leader(), radio.id, 1).await;
    let bravo_request = issue_request(&app, &app.actor(&bravo), app.item.id, 1).await;
    let nomad_request = issue_request(&app, &app.actor(&nomad), app.item.id, 1).await;

    assert_eq!(serials_for(&app, radio_request).await, vec!["NPC/ALPHA/SE/RS/001"]);
    assert_eq!(serials_for(&app, bravo_request).await, vec!["NPC/BRAVO/MS/FAK/001"]);
    assert_eq!(serials_for(&app, nomad_request).await, vec!["NPC/UNK/MS/FAK/001"]);
}

#[tokio::test]
async fn serial_numbers_are_globally_unique() {
    let app = TestApp::new().await;
    for quantity in [2, 1, 4] {
        issue_request(&app, &app.leader(), app.item.id, quantity).await;
    }

    let all = issued_item::Entity::find()
        .all(&*app.state.db)
        .await
        .unwrap();
    let distinct: HashSet<_> = all.iter().map(|unit| unit.serial_number.clone()).collect();
    assert_eq!(all.len(), 7);
    assert_eq!(distinct.len(), 7);
    assert!(distinct.contains("NPC/ALPHA/MS/FAK/007"));
}

async fn seed_serial(app: &TestApp, serial: &str) {
    issued_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        item_id: Set(app.item.id),
        request_id: Set(None),
        assigned_to: Set(Some(app.users.unit_leader.id)),
        assigned_at: Set(Utc::now()),
        serial_number: Set(serial.to_string()),
        expiration_date: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(&*app.state.db)
    .await
    .expect("seed issued item");
}

#[tokio::test]
async fn allocation_continues_past_the_highest_stored_sequence() {
    let app = TestApp::new().await;
    seed_serial(&app, "NPC/ALPHA/MS/FAK/002").await;
    seed_serial(&app, "NPC/ALPHA/MS/FAK/0x1").await;
    seed_serial(&app, "NPC/ALPHA/MS/FAKE/009").await;

    let allocator = SerialNumberAllocator::default();
    let next = allocator
        .generate_serial(&*app.state.db, Some("Alpha"), "Medical Supplies", "First Aid Kit")
        .await
        .expect("serial");
    assert_eq!(next, "NPC/ALPHA/MS/FAK/003");

    let minted = app
        .state
        .services
        .issuance
        .issue(app.item.id, app.users.unit_leader.id, 2, &app.officer())
        .await
        .expect("issue");
    let serials: Vec<_> = minted.into_iter().map(|unit| unit.serial_number).collect();
    assert_eq!(serials, vec!["NPC/ALPHA/MS/FAK/003", "NPC/ALPHA/MS/FAK/004"]);
}

#[tokio::test]
async fn direct_issuance_mints_serials_for_the_holder() {
    let app = TestApp::new().await;
    let issuance = &app.state.services.issuance;
    let bravo = app.add_user("bravo", Role::UnitLeader, Some("Bravo")).await;

    let minted = issuance
        .issue(app.item.id, bravo.id, 2, &app.sysadmin())
        .await
        .expect("system admins issue directly");
    assert_eq!(minted.len(), 2);
    assert_eq!(minted[0].serial_number, "NPC/BRAVO/MS/FAK/001");
    assert_eq!(minted[1].serial_number, "NPC/BRAVO/MS/FAK/002");
    assert!(minted
        .iter()
        .all(|unit| unit.assigned_to == Some(bravo.id) && unit.request_id.is_none()));

    let stock = app.state.services.items.get_item(app.item.id).await.unwrap();
    assert_eq!(stock.quantity, 10);
}

#[tokio::test]
async fn direct_issuance_checks_role_and_references() {
    let app = TestApp::new().await;
    let issuance = &app.state.services.issuance;

    let by_leader = issuance
        .issue(app.item.id, app.users.unit_leader.id, 1, &app.leader())
        .await;
    assert_matches!(by_leader, Err(ServiceError::PermissionDenied(_)));

    let no_item = issuance
        .issue(Uuid::new_v4(), app.users.unit_leader.id, 1, &app.officer())
        .await;
    assert_matches!(no_item, Err(ServiceError::NotFound(_)));

    let no_user = issuance
        .issue(app.item.id, Uuid::new_v4(), 1, &app.officer())
        .await;
    assert_matches!(no_user, Err(ServiceError::NotFound(_)));

    let zero = issuance
        .issue(app.item.id, app.users.unit_leader.id, 0, &app.officer())
        .await;
    assert_matches!(zero, Err(ServiceError::ValidationError(_)));

    let minted = issued_item::Entity::find().all(&*app.state.db).await.unwrap();
    assert!(minted.is_empty());
}

#[tokio::test]
async fn concurrent_issuance_on_one_prefix_never_repeats_a_serial() {
    let app = TestApp::new().await;
    let issuance = &app.state.services.issuance;
    let officer = app.officer();
    let holder = app.users.unit_leader.id;

    let (a, b) = tokio::join!(
        issuance.issue(app.item.id, holder, 2, &officer),
        issuance.issue(app.item.id, holder, 2, &officer),
    );
    let mut serials: Vec<String> = a
        .expect("first batch")
        .into_iter()
        .chain(b.expect("second batch"))
        .map(|unit| unit.serial_number)
        .collect();
    serials.sort();
    assert_eq!(
        serials,
        vec![
            "NPC/ALPHA/MS/FAK/001",
            "NPC/ALPHA/MS/FAK/002",
            "NPC/ALPHA/MS/FAK/003",
            "NPC/ALPHA/MS/FAK/004"
        ]
    );
}
