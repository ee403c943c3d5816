//! medaudit - clinic database data-quality auditor
//!
//! Entry point: parse arguments, load configuration, then either run one
//! audit or follow the schedule until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use medaudit::auditor::Auditor;
use medaudit::config::AuditConfig;
use medaudit::config::settings::parse_cutoff_date;
use medaudit::logging;
use medaudit::schedule::{Schedule, Stop, run_until};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "medaudit", version, about = "Clinic database data-quality auditor")]
struct Cli {
    /// Configuration file (defaults to ./medaudit.toml or ~/.medaudit/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run one audit and exit
    #[arg(long)]
    once: bool,

    /// Run only this detection query (implies --once)
    #[arg(short, long, value_name = "NAME")]
    query: Option<String>,

    /// Disable a detection query; may be repeated
    #[arg(long, value_name = "NAME")]
    disable: Vec<String>,

    /// Override the cutoff date (YYYYMMDD)
    #[arg(long, value_name = "YYYYMMDD")]
    cutoff: Option<String>,

    /// List detection queries and exit
    #[arg(long)]
    list_queries: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AuditConfig::load_with_env(cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(cutoff) = cli.cutoff {
        parse_cutoff_date(&cutoff)?;
        config.cutoff_date = cutoff;
    }
    for name in cli.disable {
        config.queries.insert(name, false);
    }
    if cli.once {
        config.run_once = true;
    }

    if cli.list_queries {
        return list_queries(&config);
    }

    logging::init(&config.logging)?;
    tracing::info!(
        clusters = config.clusters.len(),
        cutoff = %config.cutoff_date,
        "medaudit {}",
        env!("CARGO_PKG_VERSION")
    );

    if let Some(name) = cli.query {
        let mut auditor = Auditor::from_config(&config)?;
        auditor.run_specific(&name).await?;
        return Ok(());
    }

    if config.run_once {
        check_notifier(&config).await;
        run_detection(&config).await;
        return Ok(());
    }

    let schedule = Schedule::from_settings(&config.schedule)?;
    check_notifier(&config).await;
    tracing::info!("스케줄러가 시작되었습니다. 종료하려면 Ctrl+C를 누르세요.");

    let next_wait = || {
        let (next, wait) = schedule.wait_from_now()?;
        tracing::info!(next = %next.with_timezone(&schedule.offset()), "다음 감지 예정");
        Some(wait)
    };
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C 신호를 등록할 수 없습니다");
            std::future::pending::<()>().await;
        }
    };

    match run_until(next_wait, shutdown, || run_detection(&config)).await {
        Stop::Interrupted => {
            tracing::info!("스케줄러를 종료합니다...");
            Ok(())
        }
        Stop::Exhausted => anyhow::bail!("schedule has no upcoming run"),
    }
}

/// Verify the chat notifier's credentials once at startup
async fn check_notifier(config: &AuditConfig) {
    match Auditor::from_config(config) {
        Ok(auditor) => {
            auditor.check_notifier().await;
        }
        Err(e) => tracing::error!(error = %e, "감지기 초기화 실패"),
    }
}

/// One scheduled run on a fresh auditor. Failures are logged; the
/// scheduler keeps going.
async fn run_detection(config: &AuditConfig) {
    let mut auditor = match Auditor::from_config(config) {
        Ok(auditor) => auditor,
        Err(e) => {
            tracing::error!(error = %e, "감지기 초기화 실패");
            return;
        }
    };
    match auditor.run().await {
        Ok(report) => tracing::info!(total = report.total(), "스케줄 감지 완료"),
        Err(e) => tracing::error!(error = %e, "스케줄 감지 실패"),
    }
}

fn list_queries(config: &AuditConfig) -> Result<()> {
    let auditor = Auditor::from_config(config)?;
    for query in auditor.available_queries() {
        let state = if query.enabled { "on " } else { "off" };
        println!(
            "[{}] {:<20} {}",
            state,
            query.name,
            auditor.labels().description(&query.name)
        );
    }
    Ok(())
}
