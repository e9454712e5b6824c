use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::legacy::LegacySourceKind;
use crate::error::RequestError;

pub const DEFAULT_LIMIT: u32 = 200;
pub const MAX_LIMIT: u32 = 2000;

/// 回填范围 (组织 + 门店)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanScope {
    pub organisation_id: String,
    pub location_id: String,
}

impl ScanScope {
    pub fn new(organisation_id: impl Into<String>, location_id: impl Into<String>) -> Self {
        Self {
            organisation_id: organisation_id.into(),
            location_id: location_id.into(),
        }
    }
}

/// 回填来源选择
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceSelector {
    Ocr,
    Xero,
    #[default]
    All,
}

impl SourceSelector {
    pub fn sources(&self) -> &'static [LegacySourceKind] {
        match self {
            SourceSelector::Ocr => &[LegacySourceKind::Ocr],
            SourceSelector::Xero => &[LegacySourceKind::Xero],
            SourceSelector::All => &[LegacySourceKind::Ocr, LegacySourceKind::Xero],
        }
    }
}

impl std::fmt::Display for SourceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SourceSelector::Ocr => "OCR",
            SourceSelector::Xero => "XERO",
            SourceSelector::All => "ALL",
        })
    }
}

impl FromStr for SourceSelector {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OCR" => Ok(SourceSelector::Ocr),
            "XERO" => Ok(SourceSelector::Xero),
            "ALL" => Ok(SourceSelector::All),
            _ => Err(RequestError::UnknownSource(s.to_string())),
        }
    }
}

/// 回填请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillRequest {
    pub scope: ScanScope,
    pub source: SourceSelector,
    pub limit: u32,
}

impl BackfillRequest {
    /// `limit` 为空时取默认值 200，超出 [1, 2000] 视为非法请求
    pub fn new(scope: ScanScope, source: SourceSelector, limit: Option<u32>) -> Result<Self, RequestError> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(RequestError::LimitOutOfRange { limit, max: MAX_LIMIT });
        }
        if scope.organisation_id.trim().is_empty() || scope.location_id.trim().is_empty() {
            return Err(RequestError::MissingScope);
        }
        Ok(Self { scope, source, limit })
    }
}

/// 候选类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CandidateKind {
    /// 尚无规范发票头
    New,
    /// 未删除的发票头没有任何行 (上次写入中断)
    Repair,
    /// 存在 UNKNOWN_UNIT_CATEGORY 告警行，单位规则改进后可重建
    Rebuild,
}

/// 扫描得到的待处理旧发票
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub source: LegacySourceKind,
    pub legacy_id: String,
    pub kind: CandidateKind,
    pub created_at: DateTime<Utc>,
}

/// 跳过原因 (计数，不算失败)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    /// 扫描之后旧发票已不存在
    LegacyInvoiceMissing,
    /// 旧发票没有解析出门店
    MissingLocation,
    /// 旧发票没有任何行 (不写出无行的发票头)
    NoLineItems,
}

/// 单张发票处理失败 (不影响其他发票)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceFailure {
    pub source: LegacySourceKind,
    pub legacy_id: String,
    pub message: String,
}

/// 回填结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillResult {
    pub invoices_processed: u64,
    pub lines_processed: u64,
    pub skipped: u64,
    pub ok_lines: u64,
    pub warn_lines: u64,
    pub warn_rate: f64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
}

/// 进度检查点
#[derive(Debug, Clone, PartialEq)]
pub enum BackfillProgress {
    ScanStarted {
        sources: Vec<LegacySourceKind>,
        limit: u32,
    },
    SourceScanned {
        source: LegacySourceKind,
        new: usize,
        repair: usize,
        rebuild: usize,
    },
    SourceCompleted {
        source: LegacySourceKind,
        invoices_processed: u64,
        skipped: u64,
        failed: usize,
    },
    Completed(BackfillResult),
}
