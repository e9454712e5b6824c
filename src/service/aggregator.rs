use crate::models::{BackfillResult, LineDraft, QualityStatus};

/// 回填运行计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillStats {
    pub invoices_processed: u64,
    pub lines_processed: u64,
    pub skipped: u64,
    pub ok_lines: u64,
    pub warn_lines: u64,
}

impl BackfillStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一张已成功写入的发票
    pub fn record_invoice(&mut self, lines: &[LineDraft]) {
        self.invoices_processed += 1;
        for line in lines {
            self.lines_processed += 1;
            match line.quality_status {
                QualityStatus::Ok => self.ok_lines += 1,
                QualityStatus::Warn => self.warn_lines += 1,
            }
        }
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    /// WARN / (OK + WARN)；没有评分行时为 0
    pub fn warn_rate(&self) -> f64 {
        let scored = self.ok_lines + self.warn_lines;
        if scored == 0 {
            0.0
        } else {
            self.warn_lines as f64 / scored as f64
        }
    }

    pub fn to_result(&self, cancelled: bool) -> BackfillResult {
        BackfillResult {
            invoices_processed: self.invoices_processed,
            lines_processed: self.lines_processed,
            skipped: self.skipped,
            ok_lines: self.ok_lines,
            warn_lines: self.warn_lines,
            warn_rate: self.warn_rate(),
            cancelled,
        }
    }
}
