//! Additional-service line items
//!
//! Add-ons are best-effort: a catalog failure degrades to an empty result and
//! never blocks checkout.

use crate::api::ServiceCatalog;
use crate::booking::ComboId;
use crate::notes::ServiceSelection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One priced add-on; recomputed on every load, never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalServiceLine {
    /// Catalog service id
    pub service_id: i64,
    /// Display name
    pub name: String,
    /// Catalog unit price
    pub unit_price: Decimal,
    /// Quantity from the notes marker
    pub quantity: u32,
}

impl AdditionalServiceLine {
    /// `unit_price × quantity`, `None` on overflow
    #[must_use]
    pub fn line_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Priced add-ons and their sum
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AddOnSummary {
    /// Matched lines, in marker order
    pub lines: Vec<AdditionalServiceLine>,
    /// Sum of all line totals
    pub total: Decimal,
}

impl AddOnSummary {
    /// Build a summary, computing the total
    ///
    /// A total that overflows degrades to an empty summary.
    #[must_use]
    pub fn from_lines(lines: Vec<AdditionalServiceLine>) -> Self {
        let total = lines.iter().try_fold(Decimal::ZERO, |sum, line| {
            line.line_total().and_then(|amount| sum.checked_add(amount))
        });
        match total {
            Some(total) => Self { lines, total },
            None => {
                warn!(lines = lines.len(), "Add-on total overflows, continuing without add-ons");
                Self::default()
            },
        }
    }
}

/// Price the add-on selections of a booking against its combo catalog
///
/// Selections referencing services missing from the catalog are dropped.
/// With no selections no request is made.
#[tracing::instrument(skip(selections, catalog), fields(selections = selections.len()))]
pub async fn aggregate_add_ons(
    selections: &[ServiceSelection],
    combo_id: Option<ComboId>,
    catalog: &dyn ServiceCatalog,
) -> AddOnSummary {
    if selections.is_empty() {
        return AddOnSummary::default();
    }
    let Some(combo_id) = combo_id else {
        debug!("Booking has add-on selections but no combo, ignoring them");
        return AddOnSummary::default();
    };

    let services = match catalog.combo_services(combo_id).await {
        Ok(services) => services,
        Err(error) => {
            warn!(%combo_id, %error, "Failed to load add-on catalog, continuing without add-ons");
            return AddOnSummary::default();
        },
    };

    let lines = selections
        .iter()
        .filter_map(|selection| {
            let Some(service) = services.iter().find(|s| s.id == selection.service_id) else {
                debug!(service_id = selection.service_id, "Selected add-on not in catalog");
                return None;
            };
            Some(AdditionalServiceLine {
                service_id: service.id,
                name: service.name.clone(),
                unit_price: service.unit_price,
                quantity: selection.quantity,
            })
        })
        .collect();

    AddOnSummary::from_lines(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn summary_total_is_sum_of_line_totals() {
        let summary = AddOnSummary::from_lines(vec![
            AdditionalServiceLine {
                service_id: 5,
                name: "Pickup".into(),
                unit_price: dec!(100000),
                quantity: 2,
            },
            AdditionalServiceLine {
                service_id: 9,
                name: "Lunch".into(),
                unit_price: dec!(50000),
                quantity: 1,
            },
        ]);
        assert_eq!(summary.total, dec!(250000));
    }

    #[test]
    fn overflowing_lines_degrade_to_no_add_ons() {
        let summary = AddOnSummary::from_lines(vec![AdditionalServiceLine {
            service_id: 5,
            name: "Pickup".into(),
            unit_price: Decimal::MAX,
            quantity: 3,
        }]);
        assert_eq!(summary, AddOnSummary::default());
    }

    #[test]
    fn empty_summary_is_zero() {
        assert_eq!(AddOnSummary::from_lines(Vec::new()).total, Decimal::ZERO);
    }
}
