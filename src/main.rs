use std::process::ExitCode;
use std::sync::Arc;

use invoice_canonical::db::run_migrations;
use invoice_canonical::models::BackfillProgress;
use invoice_canonical::{create_pool, AppConfig, BackfillError, BackfillService, PgCanonicalStore};
use tracing::{error, info};
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> ExitCode {
    // 初始化日志 - 使用本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("回填失败: {}", e);
            if let BackfillError::BatchFailed { failures, partial } = &e {
                for failure in failures {
                    error!("  {} {}: {}", failure.source, failure.legacy_id, failure.message);
                }
                print_result(partial);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), BackfillError> {
    // 加载配置
    let config = AppConfig::load()?;
    let request = config.backfill.to_request()?;
    info!(
        "Starting backfill for {}/{} (source {}, limit {})",
        request.scope.organisation_id, request.scope.location_id, request.source, request.limit
    );

    // 创建数据库连接池
    let pool = create_pool(&config.database.url, config.database.max_connections).await?;
    info!("Database pool created");
    if config.database.run_migrations {
        run_migrations(&pool).await?;
    }

    let service = BackfillService::new(Arc::new(PgCanonicalStore::new(pool)));
    let result = service
        .run(&request, |event| match event {
            BackfillProgress::ScanStarted { sources, limit } => {
                info!("扫描开始: {:?}, limit {}", sources, limit)
            }
            BackfillProgress::SourceScanned { source, new, repair, rebuild } => {
                info!("{} 候选: NEW {}, REPAIR {}, REBUILD {}", source, new, repair, rebuild)
            }
            BackfillProgress::SourceCompleted { source, invoices_processed, skipped, failed } => {
                info!("{} 完成: 处理 {}, 跳过 {}, 失败 {}", source, invoices_processed, skipped, failed)
            }
            BackfillProgress::Completed(result) => info!("全部完成: {:?}", result),
        })
        .await?;

    print_result(&result);
    Ok(())
}

fn print_result(result: &invoice_canonical::models::BackfillResult) {
    match serde_json::to_string_pretty(result) {
        Ok(json) => println!("{json}"),
        Err(e) => error!("结果序列化失败: {}", e),
    }
}
