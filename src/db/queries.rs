use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::db::store::CanonicalStore;
use crate::models::{
    CanonicalInvoiceHeader, CanonicalInvoiceLineItem, CanonicalSource, Candidate, CandidateKind, HeaderDraft,
    LegacyInvoice, LegacyLink, LegacyOcrInvoice, LegacySourceKind, LegacyXeroInvoice, LineDraft,
    ManualLineItem, ScanScope, XeroLineItem, NORMALIZATION_VERSION,
};
use crate::service::guard::resolve_legacy_link;

/// 单条 INSERT 的行数上限
const INSERT_CHUNK: usize = 1000;

/// OCR 发票候选：无头 / 未删除且无行 / 含旧规则版本的未知单位告警行
///
/// 没有任何行来源 (无人工行，提取文档无行) 的旧发票不参与扫描；
/// 非对象或行字段不是数组的文档仍参与，由执行阶段报错。
const SCAN_OCR_CANDIDATES: &str = r#"
    SELECT i.id AS legacy_id,
           i.created_at,
           CASE
               WHEN h.id IS NULL THEN 'NEW'
               WHEN h.deleted_at IS NULL AND NOT EXISTS (
                   SELECT 1 FROM canonical_invoice_line_items l WHERE l.canonical_invoice_id = h.id
               ) THEN 'REPAIR'
               ELSE 'REBUILD'
           END AS kind
    FROM invoices i
    LEFT JOIN canonical_invoices h ON h.legacy_invoice_id = i.id
    WHERE i.organisation_id = $1
      AND i.location_id = $2
      AND (
            EXISTS (SELECT 1 FROM invoice_line_items m WHERE m.invoice_id = i.id)
         OR CASE
                WHEN i.ocr_result IS NULL THEN FALSE
                WHEN jsonb_typeof(i.ocr_result) <> 'object' THEN TRUE
                ELSE COALESCE(
                    COALESCE(i.ocr_result->'lineItems', i.ocr_result->'line_items', i.ocr_result->'items')
                        NOT IN ('null'::jsonb, '[]'::jsonb),
                    FALSE
                )
            END
      )
      AND (
            h.id IS NULL
         OR (h.deleted_at IS NULL AND NOT EXISTS (
                SELECT 1 FROM canonical_invoice_line_items l WHERE l.canonical_invoice_id = h.id
            ))
         OR EXISTS (
                SELECT 1 FROM canonical_invoice_line_items l
                WHERE l.canonical_invoice_id = h.id
                  AND l.normalization_version <> $4
                  AND l.quality_status = 'WARN'
                  AND 'UNKNOWN_UNIT_CATEGORY' = ANY (l.quality_warn_reasons)
            )
      )
    ORDER BY i.created_at ASC, i.id ASC
    LIMIT $3
"#;

/// 会计系统发票候选 (同上，走 legacy_xero_invoice_id，至少有一行)
const SCAN_XERO_CANDIDATES: &str = r#"
    SELECT x.id AS legacy_id,
           x.created_at,
           CASE
               WHEN h.id IS NULL THEN 'NEW'
               WHEN h.deleted_at IS NULL AND NOT EXISTS (
                   SELECT 1 FROM canonical_invoice_line_items l WHERE l.canonical_invoice_id = h.id
               ) THEN 'REPAIR'
               ELSE 'REBUILD'
           END AS kind
    FROM xero_invoices x
    LEFT JOIN canonical_invoices h ON h.legacy_xero_invoice_id = x.id
    WHERE x.organisation_id = $1
      AND x.location_id = $2
      AND EXISTS (SELECT 1 FROM xero_invoice_line_items xl WHERE xl.xero_invoice_id = x.id)
      AND (
            h.id IS NULL
         OR (h.deleted_at IS NULL AND NOT EXISTS (
                SELECT 1 FROM canonical_invoice_line_items l WHERE l.canonical_invoice_id = h.id
            ))
         OR EXISTS (
                SELECT 1 FROM canonical_invoice_line_items l
                WHERE l.canonical_invoice_id = h.id
                  AND l.normalization_version <> $4
                  AND l.quality_status = 'WARN'
                  AND 'UNKNOWN_UNIT_CATEGORY' = ANY (l.quality_warn_reasons)
            )
      )
    ORDER BY x.created_at ASC, x.id ASC
    LIMIT $3
"#;

const HEADER_COLUMNS: &str = "id, organisation_id, location_id, supplier_id, source, \
    legacy_invoice_id, legacy_xero_invoice_id, source_invoice_ref, invoice_date, currency_code, deleted_at";

#[derive(Debug, FromRow)]
struct CandidateRow {
    legacy_id: String,
    created_at: DateTime<Utc>,
    kind: String,
}

#[derive(Debug, FromRow)]
struct OcrInvoiceRow {
    id: String,
    organisation_id: String,
    location_id: Option<String>,
    supplier_id: Option<String>,
    invoice_date: Option<NaiveDate>,
    currency_code: Option<String>,
    is_verified: bool,
    ocr_result: Option<serde_json::Value>,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct XeroInvoiceRow {
    id: String,
    organisation_id: String,
    location_id: Option<String>,
    supplier_id: Option<String>,
    invoice_date: Option<NaiveDate>,
    currency_code: Option<String>,
    is_credit_note: bool,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct HeaderRow {
    id: Uuid,
    organisation_id: String,
    location_id: String,
    supplier_id: Option<String>,
    source: String,
    legacy_invoice_id: Option<String>,
    legacy_xero_invoice_id: Option<String>,
    source_invoice_ref: String,
    invoice_date: Option<NaiveDate>,
    currency_code: Option<String>,
    deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct LineRow {
    id: Uuid,
    canonical_invoice_id: Uuid,
    organisation_id: String,
    location_id: String,
    supplier_id: Option<String>,
    normalization_version: String,
    line_number: i32,
    source: String,
    source_line_ref: String,
    raw_description: String,
    raw_quantity: Option<String>,
    raw_unit_label: Option<String>,
    raw_unit_price: Option<String>,
    raw_line_total: Option<String>,
    raw_product_code: Option<String>,
    quantity: Option<BigDecimal>,
    unit_price: Option<BigDecimal>,
    line_total: Option<BigDecimal>,
    tax_amount: Option<BigDecimal>,
    normalized_description: String,
    unit_label: Option<String>,
    unit_category: String,
    currency_code: Option<String>,
    adjustment_status: String,
    quality_status: String,
    quality_warn_reasons: Vec<String>,
    confidence_score: Option<f64>,
}

fn decode_err<E>(err: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(err))
}

impl TryFrom<HeaderRow> for CanonicalInvoiceHeader {
    type Error = sqlx::Error;

    fn try_from(row: HeaderRow) -> Result<Self, Self::Error> {
        let source: CanonicalSource = row.source.parse().map_err(decode_err)?;
        let legacy_link = resolve_legacy_link(
            source,
            row.legacy_invoice_id.as_deref(),
            row.legacy_xero_invoice_id.as_deref(),
        )
        .map_err(decode_err)?;
        Ok(CanonicalInvoiceHeader {
            id: row.id,
            organisation_id: row.organisation_id,
            location_id: row.location_id,
            supplier_id: row.supplier_id,
            source,
            legacy_link,
            source_invoice_ref: row.source_invoice_ref,
            date: row.invoice_date,
            currency_code: row.currency_code,
            deleted_at: row.deleted_at,
        })
    }
}

impl TryFrom<LineRow> for CanonicalInvoiceLineItem {
    type Error = sqlx::Error;

    fn try_from(row: LineRow) -> Result<Self, Self::Error> {
        Ok(CanonicalInvoiceLineItem {
            id: row.id,
            canonical_invoice_id: row.canonical_invoice_id,
            organisation_id: row.organisation_id,
            location_id: row.location_id,
            supplier_id: row.supplier_id,
            normalization_version: row.normalization_version,
            line: LineDraft {
                line_number: row.line_number,
                source: row.source.parse().map_err(decode_err)?,
                source_line_ref: row.source_line_ref,
                raw_description: row.raw_description,
                raw_quantity: row.raw_quantity,
                raw_unit_label: row.raw_unit_label,
                raw_unit_price: row.raw_unit_price,
                raw_line_total: row.raw_line_total,
                raw_product_code: row.raw_product_code,
                quantity: row.quantity,
                unit_price: row.unit_price,
                line_total: row.line_total,
                tax_amount: row.tax_amount,
                normalized_description: row.normalized_description,
                unit_label: row.unit_label,
                unit_category: row.unit_category.parse().map_err(decode_err)?,
                currency_code: row.currency_code,
                adjustment_status: row.adjustment_status.parse().map_err(decode_err)?,
                quality_status: row.quality_status.parse().map_err(decode_err)?,
                warn_reasons: row.quality_warn_reasons,
                confidence_score: row.confidence_score,
            },
        })
    }
}

fn parse_candidate_kind(kind: &str) -> Result<CandidateKind, sqlx::Error> {
    match kind {
        "NEW" => Ok(CandidateKind::New),
        "REPAIR" => Ok(CandidateKind::Repair),
        "REBUILD" => Ok(CandidateKind::Rebuild),
        other => Err(sqlx::Error::Protocol(format!("unexpected candidate kind '{other}'"))),
    }
}

/// 查询某来源的候选旧发票
pub async fn scan_candidates(
    pool: &PgPool,
    scope: &ScanScope,
    source: LegacySourceKind,
    limit: u32,
) -> Result<Vec<Candidate>, sqlx::Error> {
    let sql = match source {
        LegacySourceKind::Ocr => SCAN_OCR_CANDIDATES,
        LegacySourceKind::Xero => SCAN_XERO_CANDIDATES,
    };
    let rows = sqlx::query_as::<_, CandidateRow>(sql)
        .bind(&scope.organisation_id)
        .bind(&scope.location_id)
        .bind(i64::from(limit))
        .bind(NORMALIZATION_VERSION)
        .fetch_all(pool)
        .await?;

    rows.into_iter()
        .map(|row| {
            Ok(Candidate {
                source,
                kind: parse_candidate_kind(&row.kind)?,
                legacy_id: row.legacy_id,
                created_at: row.created_at,
            })
        })
        .collect()
}

/// 查询 OCR 发票及其人工行
pub async fn get_ocr_invoice(
    pool: &PgPool,
    invoice_id: &str,
) -> Result<Option<LegacyOcrInvoice>, sqlx::Error> {
    let row = sqlx::query_as::<_, OcrInvoiceRow>(
        r#"
        SELECT id, organisation_id, location_id, supplier_id, invoice_date,
               currency_code, is_verified, ocr_result, deleted_at, created_at
        FROM invoices
        WHERE id = $1
        "#,
    )
    .bind(invoice_id)
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let manual_lines = sqlx::query_as::<_, ManualLineItem>(
        r#"
        SELECT id, line_number, description, quantity, unit, unit_price,
               line_total, product_code, currency_code, adjustment_status
        FROM invoice_line_items
        WHERE invoice_id = $1
        ORDER BY line_number ASC, id ASC
        "#,
    )
    .bind(invoice_id)
    .fetch_all(pool)
    .await?;

    Ok(Some(LegacyOcrInvoice {
        id: row.id,
        organisation_id: row.organisation_id,
        location_id: row.location_id,
        supplier_id: row.supplier_id,
        invoice_date: row.invoice_date,
        currency_code: row.currency_code,
        is_verified: row.is_verified,
        ocr_result: row.ocr_result,
        manual_lines,
        deleted_at: row.deleted_at,
        created_at: row.created_at,
    }))
}

/// 查询会计系统发票及其行
pub async fn get_xero_invoice(
    pool: &PgPool,
    invoice_id: &str,
) -> Result<Option<LegacyXeroInvoice>, sqlx::Error> {
    let row = sqlx::query_as::<_, XeroInvoiceRow>(
        r#"
        SELECT id, organisation_id, location_id, supplier_id, invoice_date, currency_code,
               (invoice_type = 'ACCPAYCREDIT') AS is_credit_note,
               deleted_at, created_at
        FROM xero_invoices
        WHERE id = $1
        "#,
    )
    .bind(invoice_id)
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let line_items = sqlx::query_as::<_, XeroLineItem>(
        r#"
        SELECT id, line_number, description, quantity, unit_amount,
               line_amount, tax_amount, item_code
        FROM xero_invoice_line_items
        WHERE xero_invoice_id = $1
        ORDER BY line_number ASC, id ASC
        "#,
    )
    .bind(invoice_id)
    .fetch_all(pool)
    .await?;

    Ok(Some(LegacyXeroInvoice {
        id: row.id,
        organisation_id: row.organisation_id,
        location_id: row.location_id,
        supplier_id: row.supplier_id,
        invoice_date: row.invoice_date,
        currency_code: row.currency_code,
        is_credit_note: row.is_credit_note,
        line_items,
        deleted_at: row.deleted_at,
        created_at: row.created_at,
    }))
}

/// 按旧指针 upsert 发票头；冲突时只刷新可漂移字段
async fn upsert_header(
    tx: &mut Transaction<'_, Postgres>,
    draft: &HeaderDraft,
) -> Result<CanonicalInvoiceHeader, sqlx::Error> {
    let conflict_column = match draft.legacy_link {
        LegacyLink::Ocr(_) => "legacy_invoice_id",
        LegacyLink::Xero(_) => "legacy_xero_invoice_id",
    };
    let sql = format!(
        r#"
        INSERT INTO canonical_invoices (
            id, organisation_id, location_id, supplier_id, source,
            legacy_invoice_id, legacy_xero_invoice_id, source_invoice_ref,
            invoice_date, currency_code, deleted_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT ({conflict_column}) DO UPDATE SET
            supplier_id = EXCLUDED.supplier_id,
            source = EXCLUDED.source,
            invoice_date = EXCLUDED.invoice_date,
            deleted_at = EXCLUDED.deleted_at,
            updated_at = now()
        RETURNING {HEADER_COLUMNS}
        "#
    );

    let row = sqlx::query_as::<_, HeaderRow>(&sql)
        .bind(draft.legacy_link.header_id())
        .bind(&draft.organisation_id)
        .bind(&draft.location_id)
        .bind(&draft.supplier_id)
        .bind(draft.source.as_str())
        .bind(draft.legacy_link.legacy_invoice_id())
        .bind(draft.legacy_link.legacy_xero_invoice_id())
        .bind(draft.legacy_link.source_ref())
        .bind(draft.date)
        .bind(&draft.currency_code)
        .bind(draft.deleted_at)
        .fetch_one(&mut **tx)
        .await?;

    CanonicalInvoiceHeader::try_from(row)
}

/// 批量插入规范行 (每 1000 条分块)
async fn insert_lines(
    tx: &mut Transaction<'_, Postgres>,
    lines: &[CanonicalInvoiceLineItem],
) -> Result<u64, sqlx::Error> {
    let mut inserted = 0;
    for chunk in lines.chunks(INSERT_CHUNK) {
        let mut query_builder = sqlx::QueryBuilder::<Postgres>::new(
            "INSERT INTO canonical_invoice_line_items (
                id, canonical_invoice_id, organisation_id, location_id, supplier_id,
                normalization_version, line_number, source, source_line_ref,
                raw_description, raw_quantity, raw_unit_label, raw_unit_price,
                raw_line_total, raw_product_code,
                quantity, unit_price, line_total, tax_amount,
                normalized_description, unit_label, unit_category, currency_code,
                adjustment_status, quality_status, quality_warn_reasons, confidence_score
            ) ",
        );

        query_builder.push_values(chunk, |mut b, item| {
            let line = &item.line;
            b.push_bind(item.id)
                .push_bind(item.canonical_invoice_id)
                .push_bind(&item.organisation_id)
                .push_bind(&item.location_id)
                .push_bind(&item.supplier_id)
                .push_bind(&item.normalization_version)
                .push_bind(line.line_number)
                .push_bind(line.source.as_str())
                .push_bind(&line.source_line_ref)
                .push_bind(&line.raw_description)
                .push_bind(&line.raw_quantity)
                .push_bind(&line.raw_unit_label)
                .push_bind(&line.raw_unit_price)
                .push_bind(&line.raw_line_total)
                .push_bind(&line.raw_product_code)
                .push_bind(line.quantity.clone())
                .push_bind(line.unit_price.clone())
                .push_bind(line.line_total.clone())
                .push_bind(line.tax_amount.clone())
                .push_bind(&line.normalized_description)
                .push_bind(&line.unit_label)
                .push_bind(line.unit_category.as_str())
                .push_bind(&line.currency_code)
                .push_bind(line.adjustment_status.as_str())
                .push_bind(line.quality_status.as_str())
                .push_bind(&line.warn_reasons)
                .push_bind(line.confidence_score);
        });

        let result = query_builder.build().execute(&mut **tx).await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

/// 单事务替换规范发票：upsert 头 → 删除全部行 → 重建
pub async fn replace_canonical_invoice(
    pool: &PgPool,
    draft: &HeaderDraft,
    lines: &[LineDraft],
) -> Result<CanonicalInvoiceHeader, sqlx::Error> {
    let start_time = std::time::Instant::now();
    let mut tx = pool.begin().await?;

    let header = upsert_header(&mut tx, draft).await?;

    let deleted = sqlx::query("DELETE FROM canonical_invoice_line_items WHERE canonical_invoice_id = $1")
        .bind(header.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let items: Vec<CanonicalInvoiceLineItem> = lines
        .iter()
        .cloned()
        .map(|line| CanonicalInvoiceLineItem::from_draft(&header, line))
        .collect();
    let inserted = insert_lines(&mut tx, &items).await?;

    tx.commit().await?;
    tracing::debug!(
        "Replaced canonical invoice {} ({}): -{} +{} lines, 耗时: {:?}",
        header.source_invoice_ref, header.id, deleted, inserted, start_time.elapsed()
    );
    Ok(header)
}

/// 查询某门店的规范行
pub async fn list_canonical_lines(
    pool: &PgPool,
    scope: &ScanScope,
) -> Result<Vec<CanonicalInvoiceLineItem>, sqlx::Error> {
    let rows = sqlx::query_as::<_, LineRow>(
        r#"
        SELECT l.id, l.canonical_invoice_id, l.organisation_id, l.location_id, l.supplier_id,
               l.normalization_version, l.line_number, l.source, l.source_line_ref,
               l.raw_description, l.raw_quantity, l.raw_unit_label, l.raw_unit_price,
               l.raw_line_total, l.raw_product_code,
               l.quantity, l.unit_price, l.line_total, l.tax_amount,
               l.normalized_description, l.unit_label, l.unit_category, l.currency_code,
               l.adjustment_status, l.quality_status, l.quality_warn_reasons, l.confidence_score
        FROM canonical_invoice_line_items l
        INNER JOIN canonical_invoices h ON h.id = l.canonical_invoice_id
        WHERE h.organisation_id = $1
          AND h.location_id = $2
        ORDER BY h.source_invoice_ref ASC, l.line_number ASC
        "#,
    )
    .bind(&scope.organisation_id)
    .bind(&scope.location_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(CanonicalInvoiceLineItem::try_from).collect()
}

/// Postgres 存储
#[derive(Debug, Clone)]
pub struct PgCanonicalStore {
    pool: PgPool,
}

impl PgCanonicalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CanonicalStore for PgCanonicalStore {
    fn scan_candidates<'a>(
        &'a self,
        scope: &'a ScanScope,
        source: LegacySourceKind,
        limit: u32,
    ) -> BoxFuture<'a, Result<Vec<Candidate>, sqlx::Error>> {
        scan_candidates(&self.pool, scope, source, limit).boxed()
    }

    fn load_legacy_invoice<'a>(
        &'a self,
        source: LegacySourceKind,
        legacy_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<LegacyInvoice>, sqlx::Error>> {
        async move {
            Ok(match source {
                LegacySourceKind::Ocr => get_ocr_invoice(&self.pool, legacy_id).await?.map(LegacyInvoice::Ocr),
                LegacySourceKind::Xero => get_xero_invoice(&self.pool, legacy_id).await?.map(LegacyInvoice::Xero),
            })
        }
        .boxed()
    }

    fn replace_canonical_invoice<'a>(
        &'a self,
        header: &'a HeaderDraft,
        lines: &'a [LineDraft],
    ) -> BoxFuture<'a, Result<CanonicalInvoiceHeader, sqlx::Error>> {
        replace_canonical_invoice(&self.pool, header, lines).boxed()
    }

    fn list_canonical_lines<'a>(
        &'a self,
        scope: &'a ScanScope,
    ) -> BoxFuture<'a, Result<Vec<CanonicalInvoiceLineItem>, sqlx::Error>> {
        list_canonical_lines(&self.pool, scope).boxed()
    }
}
