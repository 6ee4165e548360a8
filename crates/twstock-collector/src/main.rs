//! Standalone data collector CLI.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use twstock_collector::modules::{self, watermark, Clock, Paced, SyncContext, SyncOptions};
use twstock_collector::{CollectorConfig, CollectorError};
use twstock_data::{Database, DatasetKind, DatasetStore, FinMindClient, PgStore};

#[derive(Parser)]
#[command(name = "twstock-collector")]
#[command(about = "FinMind → PostgreSQL Taiwan market data collector", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 설정 파일 경로 (기본: config.toml, 없으면 환경변수만 사용)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// 테이블 생성 (이미 있으면 건너뜀)
    InitSchema,

    /// 종목 목록 전체 교체
    SyncCatalog,

    /// 한 데이터셋만 동기화
    SyncDataset {
        /// 데이터셋 이름 (예: stock_prices, margin_short, per, cash_flow)
        #[arg(long)]
        dataset: DatasetKind,

        /// 특정 종목만 처리 (쉼표로 구분, 예: "2330,2317")
        #[arg(long, value_delimiter = ',')]
        stocks: Option<Vec<String>>,
    },

    /// 시장 지수 동기화 (설정의 index_ids)
    SyncIndices,

    /// 저장된 최신 날짜와 다음 조회 구간 확인 (프로바이더 호출 없음)
    Watermark {
        #[arg(long)]
        dataset: DatasetKind,

        #[arg(long)]
        stock: String,
    },

    /// 전체 워크플로우 실행 (종목 목록 → 종목별 데이터셋 → 시장 지수)
    RunAll {
        /// 특정 종목만 처리 (쉼표로 구분)
        #[arg(long, value_delimiter = ',')]
        stocks: Option<Vec<String>>,
    },

    /// 데몬 모드: 주기적으로 전체 워크플로우 실행
    Daemon,
}

impl Commands {
    /// 프로바이더 호출이 필요한 명령인지
    fn needs_provider(&self) -> bool {
        !matches!(self, Commands::InitSchema | Commands::Watermark { .. })
    }
}

/// Ctrl+C 수신 시 토큰 취소
fn spawn_interrupt_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("종료 신호 수신, 진행 중인 청크 완료 후 중단합니다");
            shutdown.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 로깅 초기화 (twstock_collector, twstock_data 모두 포함)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "twstock_collector={},twstock_data={}",
                    cli.log_level, cli.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("TW Stock Data Collector 시작");

    // 설정 로드
    let config = CollectorConfig::load(cli.config.as_deref())?;
    let db_config = config.database.pool_config();
    tracing::debug!(database = %db_config.masked(), "설정 로드 완료");

    // DB 연결 + 스키마 확인
    let db = Database::connect(&db_config)
        .await
        .map_err(|e| CollectorError::Config(format!("데이터베이스 연결 실패: {}", e)))?;
    let store = PgStore::new(db.pool().clone());
    store.ensure_schema().await?;

    let shutdown = CancellationToken::new();
    spawn_interrupt_handler(shutdown.clone());

    let clock = Clock::System(config.sync.timezone()?);
    let options = SyncOptions::from(&config.sync);

    if !cli.command.needs_provider() {
        match cli.command {
            Commands::Watermark { dataset, stock } => {
                let last = store.max_date(dataset.schema(), &stock).await?;
                let window = watermark::resolve(last, clock.today(), options.floor_date);
                println!("\n📅 {} / {}", dataset, stock);
                println!(
                    "  저장된 최신 날짜: {}",
                    last.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
                );
                match window {
                    modules::SyncWindow::Fetch { start } => {
                        println!("  다음 조회: {} 부터", start)
                    }
                    modules::SyncWindow::Current { .. } => println!("  다음 조회: 없음 (최신)"),
                }
            }
            _ => tracing::info!("스키마 초기화 완료"),
        }
        return Ok(());
    }

    // FinMind 클라이언트 (토큰 확인 후 호출 간격 게이트 적용)
    let client_config = config.provider.client_config();
    let verify_token = config.provider.verify_token;
    let client = FinMindClient::new(config.provider.token, client_config)?;
    if verify_token {
        client.verify_token().await?;
    }
    let source = Paced::new(client, config.sync.request_interval(), shutdown.clone());

    let ctx = SyncContext {
        store: &store,
        source: &source,
        clock,
        options,
        shutdown: shutdown.clone(),
    };

    // 명령 실행
    match cli.command {
        Commands::SyncCatalog => match modules::refresh_catalog(&ctx).await? {
            modules::CatalogOutcome::Replaced { rows } => {
                tracing::info!(rows, "종목 목록 동기화 완료")
            }
            modules::CatalogOutcome::Empty => tracing::warn!("종목 목록 응답이 비어 있음"),
        },
        Commands::SyncDataset { dataset, stocks } => {
            if !dataset.is_incremental() {
                return Err(CollectorError::Config(format!(
                    "{}는 sync-catalog 명령을 사용하세요",
                    dataset
                ))
                .into());
            }
            let stock_ids = if dataset == DatasetKind::MarketIndex {
                stocks.unwrap_or_else(|| config.sync.index_ids.clone())
            } else {
                modules::target_stocks(&ctx, stocks.as_deref()).await?
            };
            let summary = modules::run_datasets(&ctx, &[dataset], &stock_ids).await;
            summary.log_summary("데이터셋 동기화");
        }
        Commands::SyncIndices => {
            let summary =
                modules::run_datasets(&ctx, &[DatasetKind::MarketIndex], &config.sync.index_ids)
                    .await;
            summary.log_summary("지수 동기화");
        }
        Commands::RunAll { stocks } => {
            let summary =
                modules::run_all(&ctx, stocks.as_deref(), &config.sync.index_ids).await?;
            summary.log_summary("전체 워크플로우");
        }
        Commands::Daemon => {
            tracing::info!(
                interval_minutes = config.daemon.interval_minutes,
                "=== 데몬 모드 시작 ==="
            );

            let mut interval = tokio::time::interval(config.daemon.interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.cancelled() => break,
                }

                match modules::run_all(&ctx, None, &config.sync.index_ids).await {
                    Ok(summary) => summary.log_summary("전체 워크플로우"),
                    Err(e) => tracing::error!("워크플로우 실패: {}", e),
                }

                if shutdown.is_cancelled() {
                    break;
                }
            }
            tracing::info!("=== 데몬 모드 종료 ===");
        }
        Commands::InitSchema | Commands::Watermark { .. } => {}
    }

    Ok(())
}
