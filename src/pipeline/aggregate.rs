//! Result aggregation: order entries for display and sum their shares.

use crate::model::{Breakdown, ClassificationResult};

/// Sort entries by percentage, largest first, and total the percentages.
///
/// The sort is stable: equal percentages keep the order the model returned
/// them in. The total is a plain sum and is not renormalised to 100.
pub fn aggregate(result: &ClassificationResult) -> Breakdown {
    let mut entries = result.entries.clone();
    entries.sort_by(|a, b| b.percentage.total_cmp(&a.percentage));

    let total_percentage = entries.iter().map(|e| e.percentage).sum();

    Breakdown {
        entries,
        total_percentage,
    }
}
