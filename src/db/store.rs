use futures::future::BoxFuture;

use crate::models::{
    CanonicalInvoiceHeader, CanonicalInvoiceLineItem, Candidate, HeaderDraft, LegacyInvoice,
    LegacySourceKind, LineDraft, ScanScope,
};

/// 回填所需的存储能力
///
/// Postgres 实现见 [`crate::db::PgCanonicalStore`]，测试与试运行使用
/// [`crate::db::InMemoryStore`]。
pub trait CanonicalStore: Send + Sync {
    /// 某来源下按旧发票创建时间升序的候选 (最多 `limit` 条)
    fn scan_candidates<'a>(
        &'a self,
        scope: &'a ScanScope,
        source: LegacySourceKind,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<Candidate>, sqlx::Error>>;

    /// 读取旧发票及其行；不存在时返回 `None`
    fn load_legacy_invoice<'a>(
        &'a self,
        source: LegacySourceKind,
        legacy_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<LegacyInvoice>, sqlx::Error>>;

    /// 单事务：按旧指针 upsert 发票头，删除其全部行后重建
    fn replace_canonical_invoice<'a>(
        &'a self,
        header: &'a HeaderDraft,
        lines: &'a [LineDraft],
    ) -> BoxFuture<'a, Result<CanonicalInvoiceHeader, sqlx::Error>>;

    /// 某门店的全部规范行 (按发票引用、行号排序)
    fn list_canonical_lines<'a>(
        &'a self,
        scope: &'a ScanScope,
    ) -> BoxFuture<'a, Result<Vec<CanonicalInvoiceLineItem>, sqlx::Error>>;
}
