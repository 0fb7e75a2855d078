//! Work-order lifecycle integration tests.

mod common;

use accounting_service::models::{
    BillingStage, BillingState, LaborEntry, MaterialEntry, WorkOrderDetails,
};
use common::{create_employee, create_material, date, seed, spawn_app};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use service_core::error::AppError;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

#[tokio::test]
async fn recorded_orders_snapshot_current_rates_and_prices() {
    let fx = seed(spawn_app(), "Verdi").await;
    let soil = create_material(&fx.app, "Terriccio 50l", dec!(8.90)).await;

    let order = fx
        .app
        .lifecycle()
        .record_work_order(
            fx.project.project_id,
            WorkOrderDetails {
                date: date(2025, 4, 2),
                note: Some("  Potatura siepe  ".to_string()),
                labor: vec![LaborEntry {
                    employee_id: fx.employee.employee_id,
                    hours: dec!(3.5),
                    hourly_rate: None,
                }],
                materials: vec![MaterialEntry {
                    item_id: soil.item_id,
                    quantity: dec!(4),
                    applied_price: None,
                }],
            },
        )
        .await
        .unwrap();

    assert_eq!(order.stage(), BillingStage::Unbilled);
    assert_eq!(order.document_id(), None);
    assert_eq!(order.note.as_deref(), Some("Potatura siepe"));
    assert_eq!(order.labor[0].hourly_rate(), dec!(25));
    assert_eq!(order.materials[0].applied_price(), dec!(8.90));

    let total = fx.app.reports().work_order_total(order.work_order_id).await.unwrap();
    assert_eq!(total.labor_total, dec!(87.5));
    assert_eq!(total.material_total, dec!(35.60));
    assert_eq!(total.total, dec!(123.10));
}

#[tokio::test]
async fn explicit_price_overrides_catalog_price() {
    let fx = seed(spawn_app(), "Verdi").await;
    let stones = create_material(&fx.app, "Ciottoli", dec!(12)).await;

    let order = fx
        .app
        .lifecycle()
        .record_work_order(
            fx.project.project_id,
            WorkOrderDetails {
                date: date(2025, 4, 3),
                note: None,
                labor: vec![],
                materials: vec![MaterialEntry {
                    item_id: stones.item_id,
                    quantity: dec!(2),
                    applied_price: Some(dec!(10.50)),
                }],
            },
        )
        .await
        .unwrap();

    assert_eq!(order.materials[0].applied_price(), dec!(10.50));
}

#[tokio::test]
async fn rate_changes_never_touch_recorded_work() {
    let fx = seed(spawn_app(), "Verdi").await;
    let order = fx
        .app
        .lifecycle()
        .record_work_order(
            fx.project.project_id,
            WorkOrderDetails {
                date: date(2025, 4, 4),
                note: None,
                labor: vec![LaborEntry {
                    employee_id: fx.employee.employee_id,
                    hours: dec!(4),
                    hourly_rate: None,
                }],
                materials: vec![],
            },
        )
        .await
        .unwrap();

    fx.app
        .master_data()
        .update_employee_rate(fx.employee.employee_id, dec!(40))
        .await
        .unwrap();

    let total = fx.app.reports().work_order_total(order.work_order_id).await.unwrap();
    assert_eq!(total.total, dec!(100));
}

#[tokio::test]
async fn sub_cent_rates_are_snapshotted_unrounded() {
    let fx = seed(spawn_app(), "Verdi").await;
    let apprentice = create_employee(&fx.app, "Neri", dec!(18.125)).await;
    let seed_mix = create_material(&fx.app, "Miscuglio prato", dec!(3.3333)).await;

    let order = fx
        .app
        .lifecycle()
        .record_work_order(
            fx.project.project_id,
            WorkOrderDetails {
                date: date(2025, 4, 4),
                note: None,
                labor: vec![LaborEntry {
                    employee_id: apprentice.employee_id,
                    hours: dec!(2),
                    hourly_rate: None,
                }],
                materials: vec![MaterialEntry {
                    item_id: seed_mix.item_id,
                    quantity: dec!(3),
                    applied_price: None,
                }],
            },
        )
        .await
        .unwrap();

    assert_eq!(order.labor[0].hourly_rate(), dec!(18.125));
    assert_eq!(order.materials[0].applied_price(), dec!(3.3333));
    let total = fx.app.reports().work_order_total(order.work_order_id).await.unwrap();
    assert_eq!(total.labor_total, dec!(36.25));
    assert_eq!(total.material_total, dec!(9.9999));
}

#[tokio::test]
async fn explicit_rate_still_requires_a_known_employee() {
    let fx = seed(spawn_app(), "Verdi").await;
    let err = fx
        .app
        .lifecycle()
        .record_work_order(
            fx.project.project_id,
            WorkOrderDetails {
                date: date(2025, 4, 4),
                note: None,
                labor: vec![LaborEntry {
                    employee_id: Uuid::new_v4(),
                    hours: dec!(2),
                    hourly_rate: Some(dec!(20)),
                }],
                materials: vec![],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn explicit_price_still_requires_a_known_catalog_item() {
    let fx = seed(spawn_app(), "Verdi").await;
    let err = fx
        .app
        .lifecycle()
        .record_work_order(
            fx.project.project_id,
            WorkOrderDetails {
                date: date(2025, 4, 4),
                note: None,
                labor: vec![],
                materials: vec![MaterialEntry {
                    item_id: Uuid::new_v4(),
                    quantity: dec!(3),
                    applied_price: Some(dec!(5)),
                }],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let orders = fx
        .app
        .lifecycle()
        .list_billing_candidates(fx.client.client_id)
        .await
        .unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn state_writes_cannot_set_a_document_link() {
    let fx = seed(spawn_app(), "Verdi").await;
    let order = fx.record(fx.project.project_id, date(2025, 4, 6), dec!(50)).await;
    let store = fx.app.store();

    let err = store
        .update_work_order_state(
            order.work_order_id,
            BillingState::Unbilled,
            BillingState::Paid {
                document_id: Uuid::new_v4(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    let stored = fx
        .app
        .lifecycle()
        .get_work_order(order.work_order_id)
        .await
        .unwrap();
    assert_eq!(stored.billing_state(), BillingState::Unbilled);
    assert_eq!(stored.document_id(), None);
}

#[tokio::test]
async fn state_writes_from_a_stale_state_conflict() {
    let fx = seed(spawn_app(), "Verdi").await;
    let order = fx.record(fx.project.project_id, date(2025, 4, 7), dec!(50)).await;
    let store = fx.app.store();

    let err = store
        .update_work_order_state(
            order.work_order_id,
            BillingState::WorkCompleted,
            BillingState::Unbilled,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    assert_ok!(
        store
            .update_work_order_state(
                order.work_order_id,
                BillingState::Unbilled,
                BillingState::WorkCompleted,
            )
            .await
    );
    let stored = fx
        .app
        .lifecycle()
        .get_work_order(order.work_order_id)
        .await
        .unwrap();
    assert_eq!(stored.stage(), BillingStage::WorkCompleted);
}

#[tokio::test]
async fn negative_hours_are_rejected() {
    let fx = seed(spawn_app(), "Verdi").await;
    let err = fx
        .app
        .lifecycle()
        .record_work_order(
            fx.project.project_id,
            WorkOrderDetails {
                date: date(2025, 4, 5),
                note: None,
                labor: vec![LaborEntry {
                    employee_id: fx.employee.employee_id,
                    hours: dec!(-1),
                    hourly_rate: None,
                }],
                materials: vec![],
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ValidationError(_)));
}

#[tokio::test]
async fn recording_on_unknown_project_is_not_found() {
    let fx = seed(spawn_app(), "Verdi").await;
    let err = fx
        .app
        .lifecycle()
        .record_work_order(
            Uuid::new_v4(),
            WorkOrderDetails {
                date: date(2025, 4, 5),
                note: None,
                labor: vec![],
                materials: vec![],
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn advance_walks_the_lifecycle() {
    let fx = seed(spawn_app(), "Verdi").await;
    let lifecycle = fx.app.lifecycle();
    let order = fx.record(fx.project.project_id, date(2025, 5, 1), dec!(200)).await;

    let order = lifecycle.advance(order.work_order_id).await.unwrap();
    assert_eq!(order.stage(), BillingStage::WorkCompleted);
    assert!(order.is_eligible_for_billing());

    let err = lifecycle.advance(order.work_order_id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));
    let stored = lifecycle.get_work_order(order.work_order_id).await.unwrap();
    assert_eq!(stored.stage(), BillingStage::WorkCompleted);

    let document = fx.bill(vec![order.work_order_id], Decimal::ZERO).await;
    let order = lifecycle.get_work_order(order.work_order_id).await.unwrap();
    assert_eq!(order.stage(), BillingStage::Invoiced);
    assert_eq!(order.document_id(), Some(document.document_id));
    assert!(!order.is_eligible_for_billing());

    let paid = lifecycle.advance(order.work_order_id).await.unwrap();
    assert_eq!(paid.stage(), BillingStage::Paid);
    assert_eq!(paid.document_id(), Some(document.document_id));

    let again = lifecycle.advance(order.work_order_id).await.unwrap();
    assert_eq!(again.billing_state(), paid.billing_state());
}

#[tokio::test]
async fn advance_unknown_order_is_not_found() {
    let app = spawn_app();
    let err = app.lifecycle().advance(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn corrections_need_a_reason_and_stay_unlinked() {
    let fx = seed(spawn_app(), "Verdi").await;
    let lifecycle = fx.app.lifecycle();
    let order = fx.completed(date(2025, 5, 2), dec!(80)).await;

    let err = lifecycle
        .correct_state(order.work_order_id, BillingStage::Unbilled, "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let err = lifecycle
        .correct_state(order.work_order_id, BillingStage::Paid, "client paid cash")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    let corrected = lifecycle
        .correct_state(order.work_order_id, BillingStage::Unbilled, "marked done too early")
        .await
        .unwrap();
    assert_eq!(corrected.stage(), BillingStage::Unbilled);
    let stored = lifecycle.get_work_order(order.work_order_id).await.unwrap();
    assert_eq!(stored.stage(), BillingStage::Unbilled);
}

#[tokio::test]
async fn corrections_keep_the_document_link() {
    let fx = seed(spawn_app(), "Verdi").await;
    let lifecycle = fx.app.lifecycle();
    let order = fx.completed(date(2025, 5, 3), dec!(80)).await;
    let document = fx.bill(vec![order.work_order_id], Decimal::ZERO).await;
    lifecycle.advance(order.work_order_id).await.unwrap();

    let corrected = lifecycle
        .correct_state(order.work_order_id, BillingStage::Invoiced, "payment bounced")
        .await
        .unwrap();
    assert_eq!(corrected.stage(), BillingStage::Invoiced);
    assert_eq!(corrected.document_id(), Some(document.document_id));

    let err = lifecycle
        .correct_state(order.work_order_id, BillingStage::WorkCompleted, "rebill")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));
}

#[tokio::test]
async fn linked_orders_are_frozen() {
    let fx = seed(spawn_app(), "Verdi").await;
    let lifecycle = fx.app.lifecycle();
    let order = fx.completed(date(2025, 5, 4), dec!(150)).await;
    fx.bill(vec![order.work_order_id], Decimal::ZERO).await;

    let err = lifecycle
        .update_work_order_details(
            order.work_order_id,
            WorkOrderDetails {
                date: date(2025, 5, 5),
                note: None,
                labor: vec![],
                materials: vec![],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let err = lifecycle.delete_work_order(order.work_order_id).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let total = fx.app.reports().work_order_total(order.work_order_id).await.unwrap();
    assert_eq!(total.total, dec!(150));
}

#[tokio::test]
async fn unlinked_orders_can_be_edited_and_deleted() {
    let fx = seed(spawn_app(), "Verdi").await;
    let lifecycle = fx.app.lifecycle();
    let order = fx.completed(date(2025, 5, 6), dec!(150)).await;

    let edited = assert_ok!(
        lifecycle
            .update_work_order_details(
                order.work_order_id,
                WorkOrderDetails {
                    date: date(2025, 5, 7),
                    note: Some("Taglio prato".to_string()),
                    labor: vec![LaborEntry {
                        employee_id: fx.employee.employee_id,
                        hours: dec!(2),
                        hourly_rate: None,
                    }],
                    materials: vec![],
                },
            )
            .await
    );
    assert_eq!(edited.date, date(2025, 5, 7));
    assert_eq!(edited.stage(), BillingStage::WorkCompleted);

    let total = fx.app.reports().work_order_total(order.work_order_id).await.unwrap();
    assert_eq!(total.total, dec!(50));

    assert_ok!(lifecycle.delete_work_order(order.work_order_id).await);
    let err = assert_err!(lifecycle.get_work_order(order.work_order_id).await);
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn billing_candidates_are_completed_unlinked_and_oldest_first() {
    let fx = seed(spawn_app(), "Verdi").await;
    let later = fx.completed(date(2025, 6, 10), dec!(100)).await;
    let earlier = fx.completed(date(2025, 6, 1), dec!(100)).await;
    let _unbilled = fx.record(fx.project.project_id, date(2025, 6, 2), dec!(100)).await;
    let billed = fx.completed(date(2025, 5, 20), dec!(100)).await;
    fx.bill(vec![billed.work_order_id], Decimal::ZERO).await;

    let other = seed(fx.app.clone(), "Neri").await;
    other.completed(date(2025, 6, 3), dec!(100)).await;

    let candidates = fx
        .app
        .lifecycle()
        .list_billing_candidates(fx.client.client_id)
        .await
        .unwrap();
    let ids: Vec<Uuid> = candidates.iter().map(|o| o.work_order_id).collect();
    assert_eq!(ids, vec![earlier.work_order_id, later.work_order_id]);
}
