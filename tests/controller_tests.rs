mod common;

use common::{GTIN, OMS_ID, dead_base_url, spawn_fake_oms, test_env};
use serde_json::{Value, json};
use znak_oms::OmsError;
use znak_oms::db::{
    MarkingCodeChanges, NewConnection, NewNomenclature, NewOrder, ReferenceKind, status,
};
use znak_oms::service::OrdersView;
use znak_oms::service::report::{AggregationOptions, UtilisationOptions};
use znak_oms::types::OrderInfo;

fn draft(connection_id: i64, quantity: i64) -> NewOrder {
    NewOrder {
        connection_id,
        extension_code: "pharma".into(),
        gtin: GTIN.into(),
        quantity,
        serial_number_type: "OPERATOR".into(),
        template_id: Some(5),
        cis_type: "UNIT".into(),
        comment: Some("first batch".into()),
    }
}

#[tokio::test]
async fn order_lifecycle_against_server() {
    let env = test_env().await;
    let fake = spawn_fake_oms().await;
    let conn_id = env.connect_to(&fake.base_url).await;
    let ctl = env.controller();

    let order = ctl.add_order(draft(conn_id, 3)).await.unwrap();
    let submitted = ctl.submit_order(order.id).await.unwrap();
    assert_eq!(submitted.order_id.as_deref(), Some("order-1"));
    assert_eq!(submitted.status, status::ORDER_CREATED);

    let err = ctl.submit_order(order.id).await.unwrap_err();
    assert!(matches!(err, OmsError::Validation(_)));
    let err = ctl.edit_order(order.id, draft(conn_id, 4)).await.unwrap_err();
    assert!(matches!(err, OmsError::Validation(_)));

    let view = ctl.refresh_orders(conn_id, None).await.unwrap();
    match &view {
        OrdersView::Fresh { summary, orders } => {
            assert_eq!(summary.inserted, 1);
            assert_eq!(orders[0].order_id, "order-1");
            assert_eq!(orders[0].extension_code, "pharma");
        }
        other => panic!("expected fresh view, got {other:?}"),
    }

    let buffer = ctl
        .buffer_status(conn_id, None, "order-1", GTIN)
        .await
        .unwrap();
    assert_eq!(buffer.available_codes, Some(3));

    fake.set_codes(vec![
        format!("01{GTIN}21aaa\u{1d}91EE05\u{1d}92abc"),
        format!("01{GTIN}21aab\u{1d}91EE05\u{1d}92abc"),
        format!("01{GTIN}21aac\u{1d}91EE05\u{1d}92abc"),
    ]);
    let fetched = ctl
        .fetch_codes(conn_id, None, "order-1", GTIN, 2)
        .await
        .unwrap();
    assert_eq!(fetched.received, 2);
    assert_eq!(fetched.stored, 2);
    assert_eq!(fetched.block_id.as_deref(), Some("block-1"));

    let pending = ctl.unreported_codes("order-1").await.unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|c| c.contains("<GS>91EE05")));

    let report = ctl
        .send_utilisation(
            conn_id,
            None,
            &pending,
            "VERIFIED",
            &UtilisationOptions::default(),
        )
        .await
        .unwrap();
    let sent: Value = serde_json::from_str(
        &fake
            .requests()
            .iter()
            .rev()
            .find(|r| r.resource == "utilisation")
            .unwrap()
            .body,
    )
    .unwrap();
    assert_eq!(sent["usageType"], "VERIFIED");
    assert_eq!(sent["sntins"], json!([format!("01{GTIN}21aaa"), format!("01{GTIN}21aab")]));

    assert!(ctl.unreported_codes("order-1").await.unwrap().is_empty());
    let codes = ctl.list_codes(Some("order-1")).await.unwrap();
    assert!(codes.iter().all(|c| c.status == status::CODE_REPORTED
        && c.report_id.as_deref() == Some(report.report_id.as_str())));

    let info = ctl
        .report_status(conn_id, None, &report.report_id)
        .await
        .unwrap();
    assert_eq!(info.report_status, "SUCCESS");

    ctl.close_buffer(conn_id, None, "order-1", GTIN).await.unwrap();
    assert!(ctl.api_logs(100).await.unwrap().len() >= 7);
}

#[tokio::test]
async fn server_dropping_an_order_marks_it_obsolete() {
    let env = test_env().await;
    let fake = spawn_fake_oms().await;
    let conn_id = env.connect_to(&fake.base_url).await;
    let ctl = env.controller();

    fake.set_orders(vec![
        json!({"orderId": "x-1", "orderStatus": "READY", "buffers": []}),
        json!({"orderId": "x-2", "orderStatus": "READY", "buffers": []}),
    ]);
    ctl.refresh_orders(conn_id, None).await.unwrap();

    fake.set_orders(vec![json!({"orderId": "x-1", "orderStatus": "CLOSED", "buffers": []})]);
    let view = ctl.refresh_orders(conn_id, None).await.unwrap();
    let OrdersView::Fresh { summary, orders } = view else {
        panic!("expected fresh view");
    };
    assert_eq!((summary.updated, summary.obsoleted), (1, 1));
    assert_eq!(orders.len(), 2);
    let by_id = |id: &str| orders.iter().find(|o| o.order_id == id).unwrap().status.clone();
    assert_eq!(by_id("x-1"), "CLOSED");
    assert_eq!(by_id("x-2"), status::ORDER_OBSOLETE);
}

#[tokio::test]
async fn offline_refresh_shows_cache() {
    let env = test_env().await;
    let conn_id = env.connect_to(&dead_base_url().await).await;
    let cached: OrderInfo = serde_json::from_value(json!({
        "orderId": "cached-1", "orderStatus": "READY"
    }))
    .unwrap();
    env.storage
        .sync_api_orders(conn_id, "pharma", &[cached])
        .await
        .unwrap();

    let view = env.controller().refresh_orders(conn_id, None).await.unwrap();
    match view {
        OrdersView::Cached { reason, orders } => {
            assert!(!reason.is_empty());
            assert_eq!(orders.len(), 1);
            assert_eq!(orders[0].order_id, "cached-1");
            assert_eq!(orders[0].status, "READY");
        }
        other => panic!("expected cached view, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_credential_is_reported() {
    let env = test_env().await;
    let ctl = env.controller();
    let conn = ctl
        .add_connection(NewConnection {
            name: "no-token".into(),
            base_url: "https://suz.example.ru".into(),
            oms_id: OMS_ID.into(),
            extension_code: Some("pharma".into()),
            participant_id: None,
        })
        .await
        .unwrap();
    let err = ctl.ping(conn.id, None).await.unwrap_err();
    assert!(matches!(err, OmsError::MissingCredential(name) if name == "no-token"));
}

#[tokio::test]
async fn input_is_validated_before_storage() {
    let env = test_env().await;
    let ctl = env.controller();
    let conn_id = env.connect_to("https://suz.example.ru").await;

    let err = ctl
        .add_connection(NewConnection {
            name: "ftp".into(),
            base_url: "ftp://suz.example.ru".into(),
            oms_id: OMS_ID.into(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OmsError::Validation(_)));

    let err = ctl
        .add_connection(NewConnection {
            name: "bad-ext".into(),
            base_url: "https://suz.example.ru".into(),
            oms_id: OMS_ID.into(),
            extension_code: Some("nonexistent".into()),
            participant_id: None,
        })
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let item = NewNomenclature {
        gtin: GTIN.into(),
        name: "Aspirin 100mg".into(),
        extension_code: Some("pharma".into()),
        template_id: Some(5),
        country_code: Some("RU".into()),
    };
    ctl.add_nomenclature(item.clone()).await.unwrap();
    let err = ctl.add_nomenclature(item.clone()).await.unwrap_err();
    assert!(matches!(err, OmsError::Duplicate { .. }));
    let err = ctl
        .add_nomenclature(NewNomenclature {
            gtin: "04604060005905".into(),
            ..item
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OmsError::Validation(_)));

    let err = ctl.add_order(draft(conn_id, 0)).await.unwrap_err();
    assert!(matches!(err, OmsError::Validation(_)));

    let err = ctl.add_codes(&["not a code"], "pharma").await.unwrap_err();
    assert!(matches!(err, OmsError::Validation(_)));
    let added = ctl
        .add_codes(&[format!("01{GTIN}21zzz\\u001d91EE05")], "pharma")
        .await
        .unwrap();
    assert_eq!(added, 1);

    let err = ctl
        .add_reference(znak_oms::db::ReferenceKind::Extension, " pharma ", "Dup")
        .await
        .unwrap_err();
    assert!(matches!(err, OmsError::Duplicate { .. }));
}

#[tokio::test]
async fn aggregation_file_is_reported_once() {
    let env = test_env().await;
    let fake = spawn_fake_oms().await;
    let conn_id = env.connect_to(&fake.base_url).await;
    let ctl = env.controller();

    let item = |serial: &str| json!({"Barcode": format!("01{GTIN}21{serial}\u{1d}91EE05"), "level": 0});
    let document = json!({
        "packing": {
            "pallet": {
                "Barcode": "146000000000000017",
                "level": 2,
                "capacity": 5,
                "boxes": [
                    {"Barcode": "046000000000001", "level": 1, "capacity": 2,
                     "items": [item("a1"), item("a2")]},
                    {"Barcode": "046000000000002", "level": "1", "Quantity": 2,
                     "items": [item("b1"), item("b2")]}
                ]
            }
        }
    });
    let path = env.dir.path().join("vendor-export.json");
    std::fs::write(&path, serde_json::to_string_pretty(&document).unwrap()).unwrap();

    let file = ctl.import_aggregation_file(&path).await.unwrap();
    assert_eq!(file.file_name, "vendor-export.json");
    assert_eq!(file.status, status::FILE_NEW);
    let (_, buckets) = ctl.show_aggregation_file(file.id).await.unwrap();
    assert_eq!(buckets.level0.len(), 4);
    assert_eq!(buckets.level1.len(), 2);
    assert_eq!(buckets.level2, vec!["146000000000000017".to_string()]);

    let submission = ctl
        .send_aggregation_report(file.id, conn_id, None, AggregationOptions::default())
        .await
        .unwrap();
    assert_eq!(submission.units, 3);
    assert_eq!(submission.corrections.len(), 1);
    assert_eq!(submission.corrections[0].unit, "146000000000000017");
    assert_eq!(submission.corrections[0].declared, Some(5));
    assert_eq!(submission.corrections[0].actual, 2);

    let sent: Value = serde_json::from_str(
        &fake
            .requests()
            .iter()
            .find(|r| r.resource == "aggregation")
            .unwrap()
            .body,
    )
    .unwrap();
    assert_eq!(sent["participantId"], "7700000000");
    let units = sent["aggregationUnits"].as_array().unwrap();
    assert_eq!(units[0]["unitSerialNumber"], "146000000000000017");
    assert_eq!(units[0]["aggregationUnitCapacity"], 2);
    assert_eq!(
        units[1]["sntins"],
        json!([format!("01{GTIN}21a1"), format!("01{GTIN}21a2")])
    );

    let stored = ctl.storage().get_aggregation_file(file.id).await.unwrap();
    assert_eq!(stored.status, status::FILE_SENT);
    assert_eq!(stored.report_id.as_deref(), Some(submission.report_id.as_str()));

    let err = ctl
        .send_aggregation_report(file.id, conn_id, None, AggregationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OmsError::Validation(_)));

    // reopening the file allows another report
    let err = ctl
        .edit_aggregation_file(file.id, "  ", status::FILE_NEW)
        .await
        .unwrap_err();
    assert!(matches!(err, OmsError::Validation(_)));
    let err = ctl
        .edit_aggregation_file(file.id, "line-3.json", "ARCHIVED")
        .await
        .unwrap_err();
    assert!(matches!(err, OmsError::Validation(_)));
    let reopened = ctl
        .edit_aggregation_file(file.id, " line-3.json ", status::FILE_NEW)
        .await
        .unwrap();
    assert_eq!(reopened.file_name, "line-3.json");
    assert_eq!(reopened.report_id, None);
    ctl.send_aggregation_report(file.id, conn_id, None, AggregationOptions::default())
        .await
        .unwrap();
    let reports = fake
        .requests()
        .iter()
        .filter(|r| r.resource == "aggregation")
        .count();
    assert_eq!(reports, 2);
}

#[tokio::test]
async fn codes_are_edited_with_validation() {
    let env = test_env().await;
    let ctl = env.controller();
    ctl.add_codes(&[format!("01{GTIN}21qqq\\u001d91EE05")], "pharma")
        .await
        .unwrap();
    let code = ctl.list_codes(None).await.unwrap().remove(0);

    let err = ctl
        .edit_code(
            code.id,
            MarkingCodeChanges {
                status: "LOST".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OmsError::Validation(_)));
    let err = ctl
        .edit_code(
            code.id,
            MarkingCodeChanges {
                gtin: Some("04604060005905".into()),
                status: status::CODE_EMITTED.into(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OmsError::Validation(_)));

    let edited = ctl
        .edit_code(
            code.id,
            MarkingCodeChanges {
                gtin: Some(GTIN.into()),
                order_id: Some("order-3".into()),
                block_id: None,
                status: status::CODE_EMITTED.into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.code, code.code);
    assert_eq!(ctl.unreported_codes("order-3").await.unwrap(), vec![code.code]);

    let err = ctl
        .edit_code(
            code.id + 100,
            MarkingCodeChanges {
                status: status::CODE_EMITTED.into(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn edits_cannot_take_an_existing_key() {
    let env = test_env().await;
    let ctl = env.controller();

    let item = ctl
        .add_reference(ReferenceKind::Country, "UZ", "Uzbekistan")
        .await
        .unwrap();
    let err = ctl
        .edit_reference(ReferenceKind::Country, item.id, "RU", "Taken")
        .await
        .unwrap_err();
    assert!(matches!(err, OmsError::Duplicate { .. }), "got {err:?}");
    let same = ctl
        .edit_reference(ReferenceKind::Country, item.id, " UZ ", "Uzbekistan Republic")
        .await
        .unwrap();
    assert_eq!(same.code, "UZ");
    assert_eq!(same.name, "Uzbekistan Republic");

    let aspirin = NewNomenclature {
        gtin: GTIN.into(),
        name: "Aspirin".into(),
        extension_code: Some("pharma".into()),
        template_id: Some(5),
        country_code: Some("UZ".into()),
    };
    let first = ctl.add_nomenclature(aspirin.clone()).await.unwrap();
    let second = ctl
        .add_nomenclature(NewNomenclature {
            gtin: "04607004650017".into(),
            name: "Ibuprofen".into(),
            ..aspirin.clone()
        })
        .await
        .unwrap();
    let err = ctl
        .edit_nomenclature(second.id, aspirin.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, OmsError::Duplicate { .. }), "got {err:?}");
    let renamed = ctl
        .edit_nomenclature(
            first.id,
            NewNomenclature {
                name: "Aspirin 500mg".into(),
                ..aspirin
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "Aspirin 500mg");
    assert_eq!(renamed.country_code.as_deref(), Some("UZ"));
}

#[tokio::test]
async fn db_status_lists_every_table() {
    let env = test_env().await;
    let status = env.controller().db_status().await.unwrap();
    assert!(status.missing_columns.is_empty());
    let names: Vec<&str> = status.tables.iter().map(|(t, _)| *t).collect();
    for table in ["connections", "api_orders", "marking_codes", "api_logs"] {
        assert!(names.contains(&table), "{table} missing");
    }
    let extensions = status
        .tables
        .iter()
        .find(|(t, _)| *t == "extensions")
        .map(|(_, n)| *n)
        .unwrap();
    assert!(extensions >= 9);
}
