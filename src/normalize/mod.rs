pub mod currency;
pub mod description;
pub mod line;
pub mod quality;
pub mod unit;

pub use currency::{is_valid_currency_code, normalize_currency_code};
pub use description::normalize_description;
pub use line::{canonicalize_line, CompiledLine, LineInput};
pub use quality::{assess_quality, NumericParse, QualityInput, QualityVerdict};
pub use unit::{canonicalize_unit, ResolvedUnit};
