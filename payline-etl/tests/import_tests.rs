//! Integration tests for single-sheet import
//!
//! Sheet -> normalization -> validation -> batch persistence, against an
//! in-memory ledger.

mod helpers;

use helpers::{seeded_ledger, seeded_ledger_with};
use payline_common::config::TomlConfig;
use payline_common::db::models::{Contact, Project, ProjectStatus, RecordKind};
use payline_common::store::from_rows;
use payline_common::Filter;
use payline_etl::commands::run_import;
use payline_etl::diagnostics::IssueKind;
use payline_etl::resolver::ReferenceKind;
use payline_etl::EtlError;
use rust_decimal_macros::dec;

// ============================================================================
// Projects
// ============================================================================

#[tokio::test]
async fn test_project_sheet_with_designer_shares() {
    let ledger = seeded_ledger().await;
    let file = ledger.sheet(
        "projects.csv",
        "id,프로젝트명,채널,분류,상태,계약일,총액,김민수%,이서연%,이서연 보너스%\n\
         p1,역삼동 아파트,네이버,주거,완료,2024.05.10,\"1,100,000\",60,40,5\n",
    );

    let report = run_import(&ledger.ctx, &file, RecordKind::Project, false).await.unwrap();
    assert_eq!(report.summary.success, 1);
    assert_eq!(report.inserted(), 1);
    assert!(report.errors.is_empty(), "{:?}", report.errors);

    let rows = ledger.ctx.store().select("projects", &Filter::All).await.unwrap();
    let projects: Vec<Project> = from_rows(rows).unwrap();
    let p = &projects[0];
    assert_eq!(p.id, "p1");
    assert_eq!(p.channel_id.as_deref(), Some("ch-naver"));
    assert_eq!(p.category_id.as_deref(), Some("cat-home"));
    assert_eq!(p.status, ProjectStatus::Completed);
    assert_eq!(p.contract_date.as_deref(), Some("2024-05-10"));
    assert_eq!(p.gross_amount, dec!(1100000));

    let lee = p.designers.iter().find(|d| d.member_id == "m-lee").unwrap();
    assert_eq!(lee.percent, dec!(40));
    assert_eq!(lee.bonus_pct, dec!(5));
}

#[tokio::test]
async fn test_unknown_channel_is_mapping_error() {
    let ledger = seeded_ledger().await;
    let file = ledger.sheet(
        "projects.csv",
        "프로젝트명,채널,계약일,총액,디자이너\n\
         A,숨고비교,2024-05-01,500000,김민수\n\
         B,네이버,2024-05-02,700000,김민수\n",
    );

    let report = run_import(&ledger.ctx, &file, RecordKind::Project, false).await.unwrap();

    assert_eq!(report.summary.error, 1);
    assert_eq!(report.inserted(), 1);
    let issue = &report.errors[0];
    assert_eq!(issue.kind, IssueKind::MappingError);
    assert_eq!(issue.field, "channel_id");
    assert_eq!(issue.token.as_deref(), Some("숨고비교"));
    assert!(report.created_references.is_empty());
}

#[tokio::test]
async fn test_create_missing_references_resolves_unknown_channel() {
    let config = TomlConfig {
        create_missing_references: true,
        ..Default::default()
    };
    let ledger = seeded_ledger_with(config).await;
    let file = ledger.sheet(
        "projects.csv",
        "프로젝트명,채널,계약일,총액,디자이너\nA,숨고비교,2024-05-01,500000,이서연\n",
    );

    let report = run_import(&ledger.ctx, &file, RecordKind::Project, false).await.unwrap();

    assert_eq!(
        report.created_references,
        vec![(ReferenceKind::Channel, "숨고비교".to_string())]
    );
    assert_eq!(report.inserted(), 1);
    assert_eq!(ledger.count("channels").await, 3);

    let resolver = ledger.ctx.resolver().await.unwrap();
    let channel_id = resolver.resolve(ReferenceKind::Channel, "숨고비교").unwrap().to_string();
    let projects: Vec<Project> =
        from_rows(ledger.ctx.store().select("projects", &Filter::All).await.unwrap()).unwrap();
    assert_eq!(projects[0].channel_id.as_deref(), Some(channel_id.as_str()));
}

#[tokio::test]
async fn test_invalid_calendar_date_rejects_only_that_row() {
    let ledger = seeded_ledger().await;
    let file = ledger.sheet(
        "projects.tsv",
        "프로젝트명\t계약일\t총액\t디자이너\n\
         A\t2024-02-30\t100000\tD01\n\
         B\t24/2/29\t100000\tD01\n\
         C\t3/15/2024\t100000\tD02\n",
    );

    let report = run_import(&ledger.ctx, &file, RecordKind::Project, false).await.unwrap();

    assert_eq!(report.summary.error, 1);
    assert_eq!(report.errors[0].kind, IssueKind::FormatError);
    assert_eq!(report.errors[0].line, 2);
    assert_eq!(report.inserted(), 2);

    let projects: Vec<Project> =
        from_rows(ledger.ctx.store().select("projects", &Filter::All).await.unwrap()).unwrap();
    let mut dates: Vec<_> = projects.iter().filter_map(|p| p.contract_date.clone()).collect();
    dates.sort();
    assert_eq!(dates, vec!["2024-02-29".to_string(), "2024-03-15".to_string()]);
}

#[tokio::test]
async fn test_allocation_not_summing_to_100_is_rejected() {
    let ledger = seeded_ledger().await;
    let file = ledger.sheet(
        "projects.csv",
        "프로젝트명,계약일,총액,김민수%,이서연%\nA,2024-05-01,100000,50,30\n",
    );

    let report = run_import(&ledger.ctx, &file, RecordKind::Project, false).await.unwrap();

    assert_eq!(report.inserted(), 0);
    assert_eq!(report.errors[0].kind, IssueKind::Allocation);
    assert_eq!(ledger.count("projects").await, 0);
}

// ============================================================================
// Flat records
// ============================================================================

#[tokio::test]
async fn test_duplicate_id_fails_alone() {
    let ledger = seeded_ledger().await;
    let file = ledger.sheet(
        "contacts.csv",
        "id,디자이너,일자,구분,금액\n\
         c1,김민수,2024-05-02,상담,10000\n\
         c1,이서연,2024-05-03,방문,20000\n\
         c2,D02,2024-05-04,계약,30000\n",
    );

    let report = run_import(&ledger.ctx, &file, RecordKind::Contact, false).await.unwrap();

    assert_eq!(report.summary.success, 3);
    let batch = report.batch.as_ref().unwrap();
    assert!(!batch.success);
    assert_eq!(batch.inserted_count, 2);
    assert_eq!(batch.errors.len(), 1);
    assert_eq!(batch.errors[0].index, 1);
    assert_eq!(ledger.count("contacts").await, 2);

    let contacts: Vec<Contact> =
        from_rows(ledger.ctx.store().select("contacts", &Filter::eq("id", "c2")).await.unwrap()).unwrap();
    assert_eq!(contacts[0].member_id.as_deref(), Some("m-lee"));
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let ledger = seeded_ledger().await;
    let file = ledger.sheet(
        "contacts.csv",
        "디자이너,일자,금액\n김민수,2024-05-02,10000\n",
    );

    let report = run_import(&ledger.ctx, &file, RecordKind::Contact, true).await.unwrap();

    assert!(report.dry_run);
    assert!(report.batch.is_none());
    assert_eq!(report.summary.success, 1);
    assert_eq!(ledger.count("contacts").await, 0);
}

#[tokio::test]
async fn test_unknown_headers_are_reported_as_ignored() {
    let ledger = seeded_ledger().await;
    let file = ledger.sheet(
        "feeds.csv",
        "디자이너,게시일,금액,조회수\n김민수,2024-05-02,5000,120\n",
    );

    let report = run_import(&ledger.ctx, &file, RecordKind::Feed, false).await.unwrap();

    assert_eq!(report.ignored_columns, vec!["조회수".to_string()]);
    assert_eq!(report.inserted(), 1);
}

#[tokio::test]
async fn test_missing_file_is_configuration_error() {
    let ledger = seeded_ledger().await;
    let missing = ledger.dir.path().join("nope.csv");

    let result = run_import(&ledger.ctx, &missing, RecordKind::Contact, false).await;
    assert!(matches!(result, Err(EtlError::Configuration(_))));
}
