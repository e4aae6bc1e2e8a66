//! Monthly dataset catalog.
//!
//! One solar radiation tileset exists per calendar month. The slider position
//! is the catalog index, so the catalog order is the month order.

use ion_tiles::AssetId;

/// Number of months, and therefore catalog entries.
pub const MONTH_COUNT: usize = 12;

/// Tileset containing the buildings themselves, shown independently of the month.
pub const BUILDINGS_ASSET: AssetId = AssetId(2_442_486);

/// English month names, indexed like the catalog.
pub const MONTH_NAMES: [&str; MONTH_COUNT] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const DEFAULT_MONTHLY_ASSETS: [AssetId; MONTH_COUNT] = [
    AssetId(2_437_470),
    AssetId(2_437_890),
    AssetId(2_437_891),
    AssetId(2_437_892),
    AssetId(2_437_893),
    AssetId(2_437_894),
    AssetId(2_437_895),
    AssetId(2_437_896),
    AssetId(2_437_897),
    AssetId(2_437_898),
    AssetId(2_437_899),
    AssetId(2_437_901),
];

/// Fixed, ordered list of monthly solar radiation assets.
///
/// The array type enforces exactly one entry per month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetCatalog {
    assets: [AssetId; MONTH_COUNT],
}

impl Default for DatasetCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_MONTHLY_ASSETS)
    }
}

impl DatasetCatalog {
    /// Create a catalog from January through December.
    #[must_use]
    pub fn new(assets: [AssetId; MONTH_COUNT]) -> Self {
        Self { assets }
    }

    /// The asset for a month index, or `None` outside `0..12`.
    #[must_use]
    pub fn asset_at(&self, index: usize) -> Option<AssetId> {
        self.assets.get(index).copied()
    }

    /// The catalog position of an asset.
    #[must_use]
    pub fn index_of(&self, asset_id: AssetId) -> Option<usize> {
        self.assets.iter().position(|&id| id == asset_id)
    }

    /// The month name for an asset, or `None` if the asset is not in the catalog.
    #[must_use]
    pub fn month_name(&self, asset_id: AssetId) -> Option<&'static str> {
        self.index_of(asset_id).map(|index| MONTH_NAMES[index])
    }

    /// The first (January) asset.
    #[must_use]
    pub fn first(&self) -> AssetId {
        self.assets[0]
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_default_catalog_bounds() {
        let catalog = DatasetCatalog::default();
        assert_eq!(catalog.first(), AssetId(2_437_470));
        assert_eq!(catalog.asset_at(11), Some(AssetId(2_437_901)));
        assert_eq!(catalog.asset_at(12), None);
    }

    #[test]
    fn test_unknown_asset_has_no_month() {
        let catalog = DatasetCatalog::default();
        assert_eq!(catalog.month_name(BUILDINGS_ASSET), None);
    }

    #[test]
    fn test_june_is_index_five() {
        let catalog = DatasetCatalog::default();
        let june = catalog.asset_at(5).unwrap();
        assert_eq!(june, AssetId(2_437_894));
        assert_eq!(catalog.month_name(june), Some("June"));
    }

    proptest! {
        #[test]
        fn prop_index_and_month_agree(index in 0usize..MONTH_COUNT) {
            let catalog = DatasetCatalog::default();
            let asset = catalog.asset_at(index).unwrap();
            prop_assert_eq!(catalog.index_of(asset), Some(index));
            prop_assert_eq!(catalog.month_name(asset), Some(MONTH_NAMES[index]));
        }
    }
}
