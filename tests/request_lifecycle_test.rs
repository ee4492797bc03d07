//! Request lifecycle through the service layer:
//! submission, approval, denial, issuance and the optional completion step.

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use equipment_tracker::{
    entities::{
        issued_item,
        request::{Priority, RequestStatus, RequestType},
    },
    errors::ServiceError,
    services::requests::SubmitRequestInput,
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use uuid::Uuid;

fn input(item_id: Uuid, quantity: i32) -> SubmitRequestInput {
    SubmitRequestInput {
        item_id,
        quantity,
        request_type: RequestType::New,
        priority: Priority::Normal,
        purpose: Some("field exercise".to_string()),
    }
}

async fn issued_count(app: &TestApp, request_id: Uuid) -> u64 {
    issued_item::Entity::find()
        .filter(issued_item::Column::RequestId.eq(request_id))
        .count(&*app.state.db)
        .await
        .expect("count issued items")
}

#[tokio::test]
async fn submission_starts_pending_and_notifies_approvers() {
    let app = TestApp::new().await;
    let requests = &app.state.services.requests;

    let created = requests
        .submit(input(app.item.id, 2), &app.leader())
        .await
        .expect("submit request");
    assert_eq!(created.status, RequestStatus::Pending);
    assert_eq!(created.requester_id, app.users.unit_leader.id);
    assert!(created.issued_item_id.is_none());

    let notifications = &app.state.services.notifications;
    let admin_inbox = notifications.list_unread(app.users.admin.id).await.unwrap();
    assert_eq!(admin_inbox.len(), 1);
    assert_eq!(admin_inbox[0].notification_type, "request_submitted");
    assert_eq!(admin_inbox[0].request_id, Some(created.id));
    assert!(admin_inbox[0].message.contains("First Aid Kit"));

    let sysadmin_inbox = notifications
        .list_unread(app.users.system_admin.id)
        .await
        .unwrap();
    assert_eq!(sysadmin_inbox.len(), 1);

    let requester_inbox = notifications
        .list_unread(app.users.unit_leader.id)
        .await
        .unwrap();
    assert!(requester_inbox.is_empty());
}

#[tokio::test]
async fn submit_fanout_can_skip_system_admins() {
    let app = TestApp::with_config(|cfg| cfg.lifecycle.notify_system_admins_on_submit = false).await;

    app.state
        .services
        .requests
        .submit(input(app.item.id, 1), &app.leader())
        .await
        .unwrap();

    let notifications = &app.state.services.notifications;
    assert_eq!(notifications.unread_count(app.users.admin.id).await.unwrap(), 1);
    assert_eq!(
        notifications
            .unread_count(app.users.system_admin.id)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn submission_rejects_bad_input() {
    let app = TestApp::new().await;
    let requests = &app.state.services.requests;

    let zero = requests.submit(input(app.item.id, 0), &app.leader()).await;
    assert_matches!(zero, Err(ServiceError::ValidationError(_)));

    let missing_item = requests.submit(input(Uuid::new_v4(), 1), &app.leader()).await;
    assert_matches!(missing_item, Err(ServiceError::ValidationError(_)));

    app.state
        .services
        .items
        .delete_item(app.item.id, &app.admin())
        .await
        .expect_err("admins cannot manage stock");
    app.state
        .services
        .items
        .delete_item(app.item.id, &app.sysadmin())
        .await
        .expect("delete item");
    let deleted_item = requests.submit(input(app.item.id, 1), &app.leader()).await;
    assert_matches!(deleted_item, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn full_lifecycle_issues_serialized_units() {
    let app = TestApp::new().await;
    let requests = &app.state.services.requests;
    let notifications = &app.state.services.notifications;

    let created = requests
        .submit(input(app.item.id, 3), &app.leader())
        .await
        .unwrap();

    let approved = requests
        .update_status(created.id, RequestStatus::Approved, &app.admin())
        .await
        .expect("approve");
    assert_eq!(approved.status, RequestStatus::Approved);

    let officer_inbox = notifications
        .list_unread(app.users.logistics_officer.id)
        .await
        .unwrap();
    assert_eq!(officer_inbox.len(), 1);
    assert_eq!(officer_inbox[0].notification_type, "request_approved");

    let issued = requests
        .update_status(created.id, RequestStatus::Issued, &app.officer())
        .await
        .expect("issue");
    assert_eq!(issued.status, RequestStatus::Issued);
    assert_eq!(issued_count(&app, created.id).await, 3);

    let first = issued.issued_item_id.expect("first unit linked");
    let unit = app.state.services.issuance.get(first).await.unwrap();
    assert_eq!(unit.request_id, Some(created.id));
    assert_eq!(unit.assigned_to, Some(app.users.unit_leader.id));

    let requester_inbox = notifications
        .list_unread(app.users.unit_leader.id)
        .await
        .unwrap();
    let types: Vec<&str> = requester_inbox
        .iter()
        .map(|n| n.notification_type.as_str())
        .collect();
    assert!(types.contains(&"request_approved"));
    assert!(types.contains(&"item_issued"));
    let issued_notice = requester_inbox
        .iter()
        .find(|n| n.notification_type == "item_issued")
        .unwrap();
    assert!(issued_notice.message.contains(&unit.serial_number));

    // Issuing leaves total stock alone.
    let stock = app.state.services.items.get_item(app.item.id).await.unwrap();
    assert_eq!(stock.quantity, 10);
}

#[tokio::test]
async fn reissuing_is_a_noop() {
    let app = TestApp::new().await;
    let requests = &app.state.services.requests;

    let created = requests
        .submit(input(app.item.id, 2), &app.leader())
        .await
        .unwrap();
    requests
        .update_status(created.id, RequestStatus::Approved, &app.admin())
        .await
        .unwrap();
    let first = requests
        .update_status(created.id, RequestStatus::Issued, &app.officer())
        .await
        .unwrap();
    let unread_before = app
        .state
        .services
        .notifications
        .unread_count(app.users.unit_leader.id)
        .await
        .unwrap();

    let again = requests
        .update_status(created.id, RequestStatus::Issued, &app.officer())
        .await
        .expect("replay succeeds");

    assert_eq!(again.issued_item_id, first.issued_item_id);
    assert_eq!(issued_count(&app, created.id).await, 2);
    assert_eq!(
        app.state
            .services
            .notifications
            .unread_count(app.users.unit_leader.id)
            .await
            .unwrap(),
        unread_before
    );
}

#[tokio::test]
async fn illegal_transitions_leave_status_unchanged() {
    let app = TestApp::new().await;
    let requests = &app.state.services.requests;

    let created = requests
        .submit(input(app.item.id, 1), &app.leader())
        .await
        .unwrap();

    let skip_approval = requests
        .update_status(created.id, RequestStatus::Issued, &app.officer())
        .await;
    assert_matches!(skip_approval, Err(ServiceError::InvalidTransition(_)));
    assert_eq!(issued_count(&app, created.id).await, 0);

    requests
        .update_status(created.id, RequestStatus::Denied, &app.admin())
        .await
        .expect("deny");

    let revive = requests
        .update_status(created.id, RequestStatus::Approved, &app.admin())
        .await;
    assert_matches!(revive, Err(ServiceError::InvalidTransition(_)));

    let stored = requests.get(created.id, &app.admin()).await.unwrap();
    assert_eq!(stored.status, RequestStatus::Denied);

    let denial = app
        .state
        .services
        .notifications
        .list_unread(app.users.unit_leader.id)
        .await
        .unwrap();
    assert_eq!(denial.len(), 1);
    assert_eq!(denial[0].notification_type, "request_denied");
}

#[tokio::test]
async fn roles_gate_transitions() {
    let app = TestApp::new().await;
    let requests = &app.state.services.requests;

    let created = requests
        .submit(input(app.item.id, 1), &app.leader())
        .await
        .unwrap();

    let self_approval = requests
        .update_status(created.id, RequestStatus::Approved, &app.leader())
        .await;
    assert_matches!(self_approval, Err(ServiceError::PermissionDenied(_)));

    let officer_approval = requests
        .update_status(created.id, RequestStatus::Approved, &app.officer())
        .await;
    assert_matches!(officer_approval, Err(ServiceError::PermissionDenied(_)));

    let missing = requests
        .update_status(Uuid::new_v4(), RequestStatus::Approved, &app.admin())
        .await;
    assert_matches!(missing, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn completion_is_opt_in() {
    let app = TestApp::new().await;
    let requests = &app.state.services.requests;
    let created = requests
        .submit(input(app.item.id, 1), &app.leader())
        .await
        .unwrap();
    requests
        .update_status(created.id, RequestStatus::Approved, &app.admin())
        .await
        .unwrap();
    requests
        .update_status(created.id, RequestStatus::Issued, &app.officer())
        .await
        .unwrap();
    let completed = requests
        .update_status(created.id, RequestStatus::Completed, &app.admin())
        .await;
    assert_matches!(completed, Err(ServiceError::InvalidTransition(_)));

    let app = TestApp::with_config(|cfg| cfg.lifecycle.allow_request_completion = true).await;
    let requests = &app.state.services.requests;
    let created = requests
        .submit(input(app.item.id, 1), &app.leader())
        .await
        .unwrap();
    requests
        .update_status(created.id, RequestStatus::Approved, &app.admin())
        .await
        .unwrap();
    requests
        .update_status(created.id, RequestStatus::Issued, &app.officer())
        .await
        .unwrap();
    let completed = requests
        .update_status(created.id, RequestStatus::Completed, &app.admin())
        .await
        .expect("completion enabled");
    assert_eq!(completed.status, RequestStatus::Completed);
}

#[tokio::test]
async fn requesters_only_see_their_own_requests() {
    let app = TestApp::new().await;
    let requests = &app.state.services.requests;
    let other = app
        .add_user("bravo-leader", equipment_tracker::auth::Role::UnitLeader, Some("Bravo"))
        .await;

    let mine = requests
        .submit(input(app.item.id, 1), &app.leader())
        .await
        .unwrap();
    requests
        .submit(input(app.item.id, 1), &app.actor(&other))
        .await
        .unwrap();

    let listed = requests.list(&app.leader(), None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, mine.id);

    let everything = requests.list(&app.admin(), None).await.unwrap();
    assert_eq!(everything.len(), 2);

    let hidden = requests.get(mine.id, &app.actor(&other)).await;
    assert_matches!(hidden, Err(ServiceError::PermissionDenied(_)));

    let pending = requests
        .list(&app.admin(), Some(RequestStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);
}

#[tokio::test]
async fn concurrent_issuance_mints_one_batch() {
    let app = TestApp::new().await;
    let requests = &app.state.services.requests;
    let officer = app.officer();

    let created = requests.submit(input(app.item.id, 3), &app.leader()).await.unwrap();
    requests
        .update_status(created.id, RequestStatus::Approved, &app.admin())
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        requests.update_status(created.id, RequestStatus::Issued, &officer),
        requests.update_status(created.id, RequestStatus::Issued, &officer),
    );
    let a = a.expect("first issuance");
    let b = b.expect("replayed issuance");

    assert_eq!(a.status, RequestStatus::Issued);
    assert_eq!(b.status, RequestStatus::Issued);
    assert_eq!(a.issued_item_id, b.issued_item_id);
    assert_eq!(issued_count(&app, created.id).await, 3);

    let issued_notices = app
        .state
        .services
        .notifications
        .list_unread(app.users.unit_leader.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.notification_type == "item_issued")
        .count();
    assert_eq!(issued_notices, 1);
}

#[tokio::test]
async fn concurrent_approve_and_deny_have_one_winner() {
    let app = TestApp::new().await;
    let requests = &app.state.services.requests;
    let admin = app.admin();

    let created = requests.submit(input(app.item.id, 1), &app.leader()).await.unwrap();

    let (approve, deny) = tokio::join!(
        requests.update_status(created.id, RequestStatus::Approved, &admin),
        requests.update_status(created.id, RequestStatus::Denied, &admin),
    );
    let outcomes = [approve.is_ok(), deny.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    assert!(
        matches!(approve, Err(ServiceError::InvalidTransition(_)))
            || matches!(deny, Err(ServiceError::InvalidTransition(_)))
    );

    let requester_notices = app
        .state
        .services
        .notifications
        .unread_count(app.users.unit_leader.id)
        .await
        .unwrap();
    assert_eq!(requester_notices, 1);
}

#[tokio::test]
async fn oversized_quantities_are_rejected_before_issuance() {
    let app = TestApp::new().await;
    let requests = &app.state.services.requests;

    let huge = requests.submit(input(app.item.id, i32::MAX), &app.leader()).await;
    assert_matches!(huge, Err(ServiceError::ValidationError(_)));

    let just_over = requests.submit(input(app.item.id, 1001), &app.leader()).await;
    assert_matches!(just_over, Err(ServiceError::ValidationError(_)));

    let direct = app
        .state
        .services
        .issuance
        .issue(app.item.id, app.users.unit_leader.id, i32::MAX, &app.officer())
        .await;
    assert_matches!(direct, Err(ServiceError::ValidationError(_)));

    let minted = issued_item::Entity::find()
        .count(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(minted, 0);
}

#[tokio::test]
async fn submitters_are_not_notified_of_their_own_request() {
    let app = TestApp::new().await;
    let second_admin = app
        .add_user("admin-two", equipment_tracker::auth::Role::Admin, Some(common::UNIT))
        .await;

    let created = app
        .state
        .services
        .requests
        .submit(input(app.item.id, 1), &app.admin())
        .await
        .expect("admins may request items");

    let notifications = &app.state.services.notifications;
    assert_eq!(notifications.unread_count(app.users.admin.id).await.unwrap(), 0);

    let other_admin = notifications.list_unread(second_admin.id).await.unwrap();
    assert_eq!(other_admin.len(), 1);
    assert_eq!(other_admin[0].request_id, Some(created.id));
    assert_eq!(
        notifications
            .unread_count(app.users.system_admin.id)
            .await
            .unwrap(),
        1
    );
}
