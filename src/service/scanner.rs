use indexmap::IndexMap;

use crate::db::CanonicalStore;
use crate::models::{Candidate, CandidateKind, LegacySourceKind, ScanScope};

/// 已有规范发票头的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderState {
    pub deleted: bool,
    pub line_count: usize,
    /// 至少一行由旧版本规则产生，且为 WARN、原因包含 UNKNOWN_UNIT_CATEGORY
    ///
    /// 当前版本产生的未知单位行重建结果不变，不计入。
    pub has_stale_unknown_unit_warn: bool,
}

/// 候选分类；`None` 表示已规范化完成，无需处理
///
/// 与 Postgres 扫描 SQL 中的 CASE 保持一致。没有任何行来源的旧发票
/// 在分类之前就被排除 (见 [`crate::service::mapping::ocr_has_line_sources`])。
pub fn classify_candidate(header: Option<&HeaderState>) -> Option<CandidateKind> {
    let Some(header) = header else {
        return Some(CandidateKind::New);
    };
    if !header.deleted && header.line_count == 0 {
        Some(CandidateKind::Repair)
    } else if header.has_stale_unknown_unit_warn {
        Some(CandidateKind::Rebuild)
    } else {
        None
    }
}

/// 按类别统计 (new, repair, rebuild)
pub fn count_by_kind(candidates: &[Candidate]) -> (usize, usize, usize) {
    candidates.iter().fold((0, 0, 0), |(new, repair, rebuild), c| match c.kind {
        CandidateKind::New => (new + 1, repair, rebuild),
        CandidateKind::Repair => (new, repair + 1, rebuild),
        CandidateKind::Rebuild => (new, repair, rebuild + 1),
    })
}

/// 对账扫描
///
/// 每个来源独立扫描 (旧指针列不同)，结果按旧发票创建时间升序，
/// 有界的重复运行会沿积压单调推进。
pub struct ReconciliationScanner<'a, S: CanonicalStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: CanonicalStore + ?Sized> ReconciliationScanner<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn scan_source(
        &self,
        scope: &ScanScope,
        source: LegacySourceKind,
        limit: u32,
    ) -> Result<Vec<Candidate>, sqlx::Error> {
        let rows = self.store.scan_candidates(scope, source, limit).await?;

        // 同一旧发票只保留一次 (保序去重)
        let mut unique: IndexMap<String, Candidate> = IndexMap::with_capacity(rows.len());
        for candidate in rows {
            if candidate.source != source {
                tracing::warn!(
                    "Store returned {} candidate {} while scanning {}, ignoring",
                    candidate.source, candidate.legacy_id, source
                );
                continue;
            }
            unique.entry(candidate.legacy_id.clone()).or_insert(candidate);
        }

        let mut candidates: Vec<Candidate> = unique.into_values().collect();
        candidates.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.legacy_id.cmp(&b.legacy_id))
        });
        candidates.truncate(limit as usize);

        let (new, repair, rebuild) = count_by_kind(&candidates);
        tracing::info!(
            "扫描 {} 来源 {}/{}: NEW {}, REPAIR {}, REBUILD {}",
            source, scope.organisation_id, scope.location_id, new, repair, rebuild
        );
        Ok(candidates)
    }
}
