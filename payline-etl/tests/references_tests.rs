//! Integration tests for seeding, missing references, clear and test

mod helpers;

use helpers::{ledger, seeded_ledger, write_file, SEED};
use payline_common::db::models::{Channel, Member, RecordKind};
use payline_common::store::from_rows;
use payline_common::Filter;
use payline_etl::commands::{create_missing_references, run_clear, run_import, run_seed, run_test};
use payline_etl::resolver::ReferenceKind;
use payline_etl::EtlError;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;

// ============================================================================
// Seed
// ============================================================================

#[tokio::test]
async fn test_seed_from_default_location() {
    let ledger = ledger().await;
    write_file(ledger.dir.path(), "seed.toml", SEED);

    let report = run_seed(&ledger.ctx, None).await.unwrap();
    assert_eq!((report.members, report.channels, report.categories), (2, 2, 1));

    let channels: Vec<Channel> =
        from_rows(ledger.ctx.store().select("channels", &Filter::eq("id", "ch-naver")).await.unwrap()).unwrap();
    assert_eq!(channels[0].market_fee_rate, dec!(0.21));
}

#[tokio::test]
async fn test_reseed_keeps_generated_ids() {
    let ledger = ledger().await;
    let seed = write_file(
        ledger.dir.path(),
        "staff.toml",
        "[[members]]\ncode = \"D07\"\nname = \"박지훈\"\n\n[[channels]]\nname = \"오늘의집\"\n",
    );

    run_seed(&ledger.ctx, Some(&seed)).await.unwrap();
    let first: Vec<Member> = from_rows(ledger.ctx.store().select("members", &Filter::All).await.unwrap()).unwrap();

    run_seed(&ledger.ctx, Some(&seed)).await.unwrap();
    let second: Vec<Member> = from_rows(ledger.ctx.store().select("members", &Filter::All).await.unwrap()).unwrap();

    assert_eq!(second.len(), 1);
    assert_eq!(first[0].id, second[0].id);

    // Rates omitted in the seed fall back to the configured defaults
    let channels: Vec<Channel> =
        from_rows(ledger.ctx.store().select("channels", &Filter::All).await.unwrap()).unwrap();
    assert_eq!(channels[0].ad_rate, dec!(0.10));
    assert_eq!(channels[0].program_rate, dec!(0.03));
}

#[tokio::test]
async fn test_missing_seed_file_is_configuration_error() {
    let ledger = ledger().await;
    let result = run_seed(&ledger.ctx, None).await;
    assert!(matches!(result, Err(EtlError::Configuration(_))));
}

#[tokio::test]
async fn test_malformed_seed_is_configuration_error() {
    let ledger = ledger().await;
    let seed = write_file(ledger.dir.path(), "bad.toml", "[[members]]\nname = 3\n");
    let result = run_seed(&ledger.ctx, Some(&seed)).await;
    assert!(matches!(result, Err(EtlError::Configuration(_))));
}

// ============================================================================
// Missing references
// ============================================================================

#[tokio::test]
async fn test_create_missing_references_skips_projects() {
    let ledger = seeded_ledger().await;
    let missing = BTreeSet::from([
        (ReferenceKind::Member, "최유진".to_string()),
        (ReferenceKind::Category, "상업".to_string()),
        (ReferenceKind::Project, "없는 현장".to_string()),
    ]);

    let created = create_missing_references(&ledger.ctx, &missing).await.unwrap();

    assert_eq!(created.len(), 2);
    assert!(!created.iter().any(|(kind, _)| *kind == ReferenceKind::Project));
    assert_eq!(ledger.count("members").await, 3);
    assert_eq!(ledger.count("categories").await, 2);

    let resolver = ledger.ctx.resolver().await.unwrap();
    assert!(resolver.resolve(ReferenceKind::Member, "최유진").is_ok());
}

// ============================================================================
// Clear and connectivity
// ============================================================================

#[tokio::test]
async fn test_clear_requires_confirm_and_keeps_references() {
    let ledger = seeded_ledger().await;
    let file = ledger.sheet("contacts.csv", "디자이너,일자,금액\n김민수,2024-05-02,10000\n");
    run_import(&ledger.ctx, &file, RecordKind::Contact, false).await.unwrap();

    let refused = run_clear(&ledger.ctx, false).await;
    assert!(matches!(refused, Err(EtlError::Configuration(_))));
    assert_eq!(ledger.count("contacts").await, 1);

    let report = run_clear(&ledger.ctx, true).await.unwrap();
    assert!(report.tables.contains(&("contacts".to_string(), 1)));
    assert_eq!(ledger.count("contacts").await, 0);
    assert_eq!(ledger.count("members").await, 2);
}

#[tokio::test]
async fn test_connection_report_lists_every_table() {
    let ledger = seeded_ledger().await;
    let report = run_test(&ledger.ctx).await.unwrap();

    let members = report.tables.iter().find(|(t, _)| t == "members").unwrap();
    assert_eq!(members.1, 2);
    assert!(report.tables.iter().any(|(t, _)| t == "settlement_items"));
    assert!(report.to_string().starts_with("Connection OK"));
}
