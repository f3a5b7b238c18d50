//! Integration tests for settlement generation and locking

mod helpers;

use helpers::{seeded_ledger, TestLedger};
use payline_common::db::models::{RecordKind, SettlementItem, SettlementStatus, SourceType};
use payline_common::store::from_rows;
use payline_common::Filter;
use payline_etl::commands::{run_generate_settlement, run_import, run_lock_settlement};
use payline_etl::settlement::GenerateOutcome;
use payline_etl::EtlError;
use rust_decimal_macros::dec;

async fn import(ledger: &TestLedger, name: &str, kind: RecordKind, content: &str) {
    let file = ledger.sheet(name, content);
    let report = run_import(&ledger.ctx, &file, kind, false).await.unwrap();
    assert!(report.errors.is_empty(), "{}", report);
    assert_eq!(report.failed(), 0, "{}", report);
}

/// One marketplace project for 김민수 in May 2024, plus a contact for 이서연
async fn may_ledger() -> TestLedger {
    let ledger = seeded_ledger().await;
    import(
        &ledger,
        "projects.csv",
        RecordKind::Project,
        "id,프로젝트명,채널,상태,계약일,총액,김민수%\n\
         p1,역삼동 아파트,네이버,완료,2024-05-10,1100000,100\n",
    )
    .await;
    import(
        &ledger,
        "contacts.csv",
        RecordKind::Contact,
        "id,디자이너,일자,구분,금액\nc1,이서연,2024-05-20,실측,50000\n",
    )
    .await;
    ledger
}

// ============================================================================
// Generation
// ============================================================================

#[tokio::test]
async fn test_worked_example_payout() {
    let ledger = may_ledger().await;

    let summary = run_generate_settlement(&ledger.ctx, "2024-05", false).await.unwrap();
    let report = &summary.report;
    assert_eq!(report.outcome, GenerateOutcome::Created);
    assert_eq!(report.settlement.status, SettlementStatus::Draft);
    assert_eq!(report.items.len(), 2);

    let project = report
        .items
        .iter()
        .find(|i| i.source_type == SourceType::Project)
        .unwrap();
    assert_eq!(project.member_id, "m-kim");
    assert_eq!(project.gross, dec!(1100000));
    assert_eq!(project.net, dec!(1000000));
    assert_eq!(project.before_withholding, dec!(660000));
    assert_eq!(project.withholding_tax, dec!(21780));
    assert_eq!(project.after_withholding, dec!(638220));

    let contact = report
        .items
        .iter()
        .find(|i| i.source_type == SourceType::Contact)
        .unwrap();
    assert_eq!(contact.member_id, "m-lee");
    assert_eq!(contact.before_withholding, dec!(50000));
    assert_eq!(contact.withholding_tax, dec!(1650));
    assert_eq!(contact.after_withholding, dec!(48350));

    assert_eq!(summary.member_names.get("m-kim").map(String::as_str), Some("김민수"));
    assert_eq!(ledger.count("settlement_items").await, 2);
}

#[tokio::test]
async fn test_bonus_is_a_percent_of_each_designer_share() {
    let ledger = seeded_ledger().await;
    import(
        &ledger,
        "projects.csv",
        RecordKind::Project,
        "id,프로젝트명,채널,상태,계약일,총액,김민수 지분,김민수 보너스,이서연%\n\
         p1,역삼동 아파트,네이버,완료,2024-05-10,1100000,60,10,40\n",
    )
    .await;

    let summary = run_generate_settlement(&ledger.ctx, "2024-05", false).await.unwrap();
    let items = &summary.report.items;
    assert_eq!(items.len(), 2);

    // pool 660,000: base 396,000 + bonus 39,600
    let kim = items.iter().find(|i| i.member_id == "m-kim").unwrap();
    assert_eq!(kim.before_withholding, dec!(435600));
    assert_eq!(kim.withholding_tax, dec!(14375));
    assert_eq!(kim.after_withholding, dec!(421225));

    let lee = items.iter().find(|i| i.member_id == "m-lee").unwrap();
    assert_eq!(lee.before_withholding, dec!(264000));
    assert_eq!(lee.withholding_tax, dec!(8712));
    assert_eq!(lee.after_withholding, dec!(255288));
}

#[tokio::test]
async fn test_stored_items_match_reported_items() {
    let ledger = seeded_ledger().await;
    // 1,000,000 / 1.1 has no finite decimal expansion
    import(
        &ledger,
        "projects.csv",
        RecordKind::Project,
        "id,프로젝트명,채널,상태,계약일,총액,김민수%\n\
         p1,한남동 주택,직접영업,완료,2024-05-10,1000000,100\n",
    )
    .await;
    import(
        &ledger,
        "contacts.csv",
        RecordKind::Contact,
        "id,디자이너,일자,구분,금액,지급여부\n\
         c1,이서연,2024-05-20,실측,50000,Y\n\
         c2,이서연,2024-05-21,실측,30000,N\n",
    )
    .await;

    let summary = run_generate_settlement(&ledger.ctx, "2024-05", false).await.unwrap();
    let mut reported = summary.report.items.clone();
    reported.sort_by(|a, b| a.id.cmp(&b.id));

    let project = reported.iter().find(|i| i.source_type == SourceType::Project).unwrap();
    assert_eq!(project.net, dec!(909091));
    assert_eq!(project.before_withholding, dec!(909091));
    assert_eq!(project.withholding_tax, dec!(30000));
    assert!(!project.paid);

    let paid: Vec<_> = reported
        .iter()
        .filter(|i| i.source_type == SourceType::Contact)
        .map(|i| (i.source_id.as_str(), i.paid))
        .collect();
    assert_eq!(paid, vec![("c1", true), ("c2", false)]);

    let rows = ledger.ctx.store().select("settlement_items", &Filter::All).await.unwrap();
    let mut stored: Vec<SettlementItem> = from_rows(rows).unwrap();
    stored.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(stored, reported);
}

#[tokio::test]
async fn test_sources_outside_period_are_excluded() {
    let ledger = may_ledger().await;
    import(
        &ledger,
        "tasks.csv",
        RecordKind::TeamTask,
        "디자이너,일자,업무명,상태,금액\n\
         김민수,2024-04-30,자재 발주,완료,30000\n\
         김민수,2024-05-03,현장 점검,진행,20000\n\
         김민수,2024-05-31,도면 정리,완료,10000\n",
    )
    .await;

    let summary = run_generate_settlement(&ledger.ctx, "2024-05", false).await.unwrap();
    let tasks: Vec<_> = summary
        .report
        .items
        .iter()
        .filter(|i| i.source_type == SourceType::TeamTask)
        .collect();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].before_withholding, dec!(10000));

    let april = run_generate_settlement(&ledger.ctx, "2024-04", false).await.unwrap();
    assert_eq!(april.report.items.len(), 1);
    assert_eq!(april.report.items[0].source_type, SourceType::TeamTask);
}

#[tokio::test]
async fn test_second_generate_without_force_is_no_op() {
    let ledger = may_ledger().await;
    let first = run_generate_settlement(&ledger.ctx, "2024-05", false).await.unwrap();

    let second = run_generate_settlement(&ledger.ctx, "2024-05", false).await.unwrap();
    assert_eq!(second.report.outcome, GenerateOutcome::AlreadyGenerated);
    assert_eq!(second.report.settlement.id, first.report.settlement.id);
    assert_eq!(second.report.items.len(), first.report.items.len());
}

#[tokio::test]
async fn test_forced_recompute_is_idempotent() {
    let ledger = may_ledger().await;
    let first = run_generate_settlement(&ledger.ctx, "2024-05", false).await.unwrap();

    let forced = run_generate_settlement(&ledger.ctx, "2024-05", true).await.unwrap();
    assert_eq!(forced.report.outcome, GenerateOutcome::Recomputed);

    let mut before = first.report.items.clone();
    let mut after = forced.report.items.clone();
    before.sort_by(|a, b| a.id.cmp(&b.id));
    after.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(before, after);
    assert_eq!(ledger.count("settlement_items").await, 2);
    assert_eq!(ledger.count("settlements").await, 1);
}

#[tokio::test]
async fn test_invalid_period_is_configuration_error() {
    let ledger = seeded_ledger().await;
    let result = run_generate_settlement(&ledger.ctx, "2024-13", false).await;
    assert!(matches!(result, Err(EtlError::Configuration(_))));
}

// ============================================================================
// Locking
// ============================================================================

#[tokio::test]
async fn test_locked_settlement_rejects_recompute() {
    let ledger = may_ledger().await;
    run_generate_settlement(&ledger.ctx, "2024-05", false).await.unwrap();

    let locked = run_lock_settlement(&ledger.ctx, "2024-05").await.unwrap();
    assert_eq!(locked.status, SettlementStatus::Locked);
    assert!(locked.locked_at.is_some());

    let result = run_generate_settlement(&ledger.ctx, "2024-05", true).await;
    assert!(matches!(result, Err(EtlError::SettlementLocked(ref p)) if p == "2024-05"));
    assert_eq!(ledger.count("settlement_items").await, 2);

    let again = run_lock_settlement(&ledger.ctx, "2024-05").await;
    assert!(matches!(again, Err(EtlError::SettlementLocked(_))));
}

#[tokio::test]
async fn test_lock_without_settlement_fails() {
    let ledger = seeded_ledger().await;
    let result = run_lock_settlement(&ledger.ctx, "2024-05").await;
    assert!(matches!(result, Err(EtlError::Configuration(_))));
}
