//! Integration tests for the PostgreSQL backend
//!
//! These tests require a PostgreSQL server and are skipped when it is not
//! reachable. Each test works in its own throwaway tenant schema.

use crate::common::live_cluster;
use medaudit::auditor::Auditor;
use medaudit::db::catalog::list_schemas;
use medaudit::db::postgres::PostgresConnector;
use medaudit::db::{CellValue, Connector, PoolManager};
use medaudit::detect::{DetectionQuery, QueryRegistry};
use std::time::Duration;

fn connector() -> PostgresConnector {
    PostgresConnector::new(Duration::from_secs(5))
}

/// Connect a pool manager, or `None` if the database is unavailable
async fn live_pools() -> Option<PoolManager> {
    let config = live_cluster();
    if let Err(e) = connector().connect(&config).await {
        eprintln!(
            "Skipping test: Database not available at {} - {}",
            config.route(),
            e
        );
        return None;
    }
    let mut pools = PoolManager::new(Box::new(connector()));
    pools.initialize(&[config]).await;
    Some(pools)
}

/// Run setup statements one by one through the pool
async fn exec(pools: &PoolManager, route: &str, statements: &[&str]) {
    for sql in statements {
        pools
            .execute_query(route, sql, &[])
            .await
            .unwrap_or_else(|e| panic!("setup failed on {:?}: {}", sql, e));
    }
}

#[tokio::test]
async fn test_select_decodes_cells() {
    let Some(mut pools) = live_pools().await else {
        return;
    };
    let route = live_cluster().route();

    let rows = pools
        .execute_query(
            &route,
            "SELECT 1::int4 AS num, $1::text AS msg, NULL::text AS missing, 2.5::numeric AS amount",
            &["hello"],
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.get("num"), Some(&CellValue::Integer(1)));
    assert_eq!(row.get("msg"), Some(&CellValue::from("hello")));
    assert_eq!(row.get("missing"), Some(&CellValue::Null));
    match row.get("amount") {
        Some(CellValue::Float(f)) => assert!((f - 2.5).abs() < f64::EPSILON),
        Some(CellValue::Text(s)) => assert_eq!(s, "2.5"),
        other => panic!("Expected numeric, got {:?}", other),
    }
    pools.close_all().await;
}

#[tokio::test]
async fn test_failed_query_is_an_error() {
    let Some(mut pools) = live_pools().await else {
        return;
    };
    let route = live_cluster().route();

    let result = pools
        .execute_query(&route, "SELECT * FROM no_such_table_medaudit", &[])
        .await;
    assert!(result.is_err());

    // The pool stays usable afterwards
    let rows = pools.execute_query(&route, "SELECT 1 AS one", &[]).await.unwrap();
    assert_eq!(rows.len(), 1);
    pools.close_all().await;
}

#[tokio::test]
async fn test_discovers_tenant_schema() {
    let Some(mut pools) = live_pools().await else {
        return;
    };
    let route = live_cluster().route();
    exec(
        &pools,
        &route,
        &[
            "DROP SCHEMA IF EXISTS c90001 CASCADE",
            "DROP SCHEMA IF EXISTS x90001 CASCADE",
            "CREATE SCHEMA c90001",
            "CREATE SCHEMA x90001",
        ],
    )
    .await;

    let schemas = list_schemas(&pools, &route).await.unwrap();
    assert!(schemas.contains(&"c90001".to_string()));
    assert!(!schemas.contains(&"x90001".to_string()));
    assert!(!schemas.contains(&"public".to_string()));

    exec(
        &pools,
        &route,
        &[
            "DROP SCHEMA IF EXISTS c90001 CASCADE",
            "DROP SCHEMA IF EXISTS x90001 CASCADE",
        ],
    )
    .await;
    pools.close_all().await;
}

#[tokio::test]
async fn test_audit_run_against_live_schema() {
    let Some(mut pools) = live_pools().await else {
        return;
    };
    let route = live_cluster().route();
    exec(
        &pools,
        &route,
        &[
            "DROP SCHEMA IF EXISTS c90002 CASCADE",
            "CREATE SCHEMA c90002",
            "CREATE TABLE c90002.TSCHEDULE (SCHID int, PATID int, SCHDATE varchar(8), \
             SCHTYPE int, ORGSCHID int, VISITTYPE int)",
            "INSERT INTO c90002.TSCHEDULE VALUES \
             (1, 10, '20250502', 2, 0, 9), \
             (2, 11, '20250503', 2, 0, 1), \
             (3, 12, '20240101', 2, 0, 9)",
        ],
    )
    .await;
    pools.close_all().await;

    let registry = QueryRegistry::new(vec![
        DetectionQuery::new(
            "oddVisitType",
            "Visit type outside the allowed set",
            "SELECT S.SCHID, S.PATID FROM {schema}.TSCHEDULE S \
             WHERE S.VISITTYPE NOT IN (0, 1, 2, 3) AND S.SCHDATE >= $1",
        ),
        DetectionQuery::new(
            "missingTable",
            "Reads a table this tenant lacks",
            "SELECT 1 FROM {schema}.TNOTHERE WHERE $1 = $1",
        ),
    ]);
    let mut auditor = Auditor::new(Box::new(connector()), vec![live_cluster()], "20250501")
        .with_registry(registry);

    let report = auditor.run().await.unwrap();
    let ours: Vec<_> = report
        .results
        .iter()
        .filter(|r| r.schema == "c90002")
        .collect();

    assert_eq!(ours.len(), 2);
    assert_eq!(ours[0].query_name, "oddVisitType");
    // The 2024 row is before the cutoff
    assert_eq!(ours[0].count(), 1);
    assert_eq!(ours[0].rows()[0].get("schid"), Some(&CellValue::Integer(1)));
    assert_eq!(ours[1].query_name, "missingTable");
    assert!(ours[1].is_empty());

    let Some(mut cleanup) = live_pools().await else {
        return;
    };
    exec(&cleanup, &route, &["DROP SCHEMA IF EXISTS c90002 CASCADE"]).await;
    cleanup.close_all().await;
}

#[tokio::test]
async fn test_builtin_queries_against_live_schema() {
    let Some(mut pools) = live_pools().await else {
        return;
    };
    let route = live_cluster().route();
    exec(
        &pools,
        &route,
        &[
            "DROP SCHEMA IF EXISTS c90003 CASCADE",
            "CREATE SCHEMA c90003",
            "CREATE TABLE c90003.TPATIENT (PATID int, PATNAME varchar(40), CHARTNO varchar(20))",
            "CREATE TABLE c90003.TEMPLOYEE (EMPLID int, EMPLNAME varchar(40))",
            "CREATE TABLE c90003.TSCHEDULE (SCHID int, PATID int, SCHDATE varchar(8), \
             SCHTYPE int, ORGSCHID int, VISITTYPE int, DRID int)",
            "CREATE TABLE c90003.TMEDICALRECORD (MRID int, SCHID int, DRID int, \
             CONSULTTIME varchar(14))",
            "INSERT INTO c90003.TPATIENT VALUES (10, '환자A', 'C-10'), (11, '환자B', 'C-11')",
            "INSERT INTO c90003.TEMPLOYEE VALUES (100, '의사A')",
            // 1-3: identical inpatient schedules; 4-5: identical but before the cutoff
            // 6: bad visit type; 7: bad visit type before the cutoff
            // 8: consult on another day; 9: consult on the same day
            "INSERT INTO c90003.TSCHEDULE VALUES \
             (1, 10, '20250502', 2, 0, 1, 100), \
             (2, 10, '20250502', 2, 0, 1, 100), \
             (3, 10, '20250502', 2, 0, 1, 100), \
             (4, 10, '20240101', 2, 0, 1, 100), \
             (5, 10, '20240101', 2, 0, 1, 100), \
             (6, 11, '20250502', 2, 0, 9, 100), \
             (7, 11, '20240102', 2, 0, 9, 100), \
             (8, 11, '20250503', 1, 0, 1, 100), \
             (9, 11, '20250505', 1, 0, 1, 100)",
            "INSERT INTO c90003.TMEDICALRECORD VALUES \
             (1000, 6, 100, '20250502093000'), \
             (1001, 7, 100, '20240102093000'), \
             (1002, 8, 100, '20250504100000'), \
             (1003, 9, 100, '20250505110000')",
        ],
    )
    .await;
    pools.close_all().await;

    let mut registry = QueryRegistry::builtin();
    let wanted = ["invalidVisitType", "dateMismatch", "duplicateSchedule"];
    for query in registry.list() {
        registry.set_enabled(&query.name, wanted.contains(&query.name.as_str()));
    }
    let mut auditor = Auditor::new(Box::new(connector()), vec![live_cluster()], "20250501")
        .with_registry(registry);

    let report = auditor.run().await.unwrap();
    let ours: Vec<_> = report
        .results
        .iter()
        .filter(|r| r.schema == "c90003")
        .collect();
    let names: Vec<&str> = ours.iter().map(|r| r.query_name.as_str()).collect();
    assert_eq!(names, wanted);

    let invalid = ours[0];
    assert_eq!(invalid.count(), 1);
    assert_eq!(invalid.rows()[0].get("schid"), Some(&CellValue::Integer(6)));

    let date = ours[1];
    assert_eq!(date.count(), 1);
    assert_eq!(date.rows()[0].get("schid"), Some(&CellValue::Integer(8)));

    // Three identical schedules make three ordered pairs
    let mut pairs: Vec<(CellValue, CellValue)> = ours[2]
        .rows()
        .iter()
        .map(|row| {
            (
                row.get("schid").cloned().unwrap_or(CellValue::Null),
                row.get("dupschid").cloned().unwrap_or(CellValue::Null),
            )
        })
        .collect();
    pairs.sort_by_key(|(a, b)| (a.display_string(), b.display_string()));
    assert_eq!(
        pairs,
        vec![
            (CellValue::Integer(1), CellValue::Integer(2)),
            (CellValue::Integer(1), CellValue::Integer(3)),
            (CellValue::Integer(2), CellValue::Integer(3)),
        ]
    );

    let Some(mut cleanup) = live_pools().await else {
        return;
    };
    exec(&cleanup, &route, &["DROP SCHEMA IF EXISTS c90003 CASCADE"]).await;
    cleanup.close_all().await;
}
