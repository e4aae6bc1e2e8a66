//! Viewer shell state: the selected month and the layer toggles.
//!
//! The shell is plain data mutated by the control panel. Fetching happens in
//! `loader.rs` and mounting in `layers.rs`; both only read the shell and feed
//! results back through [`ViewerShell::accept`].

use std::sync::Arc;

use bevy::prelude::*;
use ion_tiles::{AssetId, LoadedTileset};

use crate::catalog::{BUILDINGS_ASSET, DatasetCatalog, MONTH_COUNT};
use crate::launch_params::LaunchParams;

/// Identifies one fetch, so that late results of superseded selections can be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken(u64);

/// A fetch the loader should start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub token: RequestToken,
    pub asset_id: AssetId,
}

/// The resource handle of one layer.
#[derive(Debug, Clone, Default)]
pub enum ResourceSlot {
    /// Nothing requested.
    #[default]
    Empty,
    /// A fetch is in flight.
    Pending(RequestToken),
    /// The tileset has been fetched.
    Ready(Arc<LoadedTileset>),
    /// The fetch failed; the message is shown in the panel.
    Failed(String),
}

impl ResourceSlot {
    /// Whether a handle exists, in flight or resolved.
    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, ResourceSlot::Pending(_) | ResourceSlot::Ready(_))
    }

    /// The fetched tileset, if resolved.
    #[must_use]
    pub fn loaded(&self) -> Option<&Arc<LoadedTileset>> {
        match self {
            ResourceSlot::Ready(loaded) => Some(loaded),
            _ => None,
        }
    }

    fn is_pending_for(&self, token: RequestToken) -> bool {
        matches!(self, ResourceSlot::Pending(t) if *t == token)
    }
}

/// The selected monthly dataset.
#[derive(Debug, Clone)]
pub struct SelectionState {
    /// The selected asset.
    pub asset_id: AssetId,
    /// Handle for the selected asset; replaced on every selection.
    pub resource: ResourceSlot,
}

/// Layer visibility toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleState {
    pub building: bool,
    pub solar_radiation: bool,
}

impl Default for ToggleState {
    fn default() -> Self {
        Self {
            building: true,
            solar_radiation: false,
        }
    }
}

/// A toggleable layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Building,
    SolarRadiation,
}

impl ToggleState {
    /// Current value of one toggle.
    #[must_use]
    pub fn get(&self, toggle: Toggle) -> bool {
        match toggle {
            Toggle::Building => self.building,
            Toggle::SolarRadiation => self.solar_radiation,
        }
    }

    /// Copy of the state with one field replaced.
    #[must_use]
    pub fn merged(self, toggle: Toggle, value: bool) -> Self {
        match toggle {
            Toggle::Building => Self {
                building: value,
                ..self
            },
            Toggle::SolarRadiation => Self {
                solar_radiation: value,
                ..self
            },
        }
    }
}

/// A layer that can be mounted in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKey {
    /// The building geometry tileset.
    Buildings,
    /// The solar radiation tileset of one month, keyed by its asset.
    SolarRadiation(AssetId),
}

/// Error returned when a month index is outside the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthOutOfRange(pub usize);

impl std::fmt::Display for MonthOutOfRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "month index {} is outside 0..{MONTH_COUNT}", self.0)
    }
}

impl std::error::Error for MonthOutOfRange {}

/// UI state of the viewer.
#[derive(Resource, Debug)]
pub struct ViewerShell {
    catalog: DatasetCatalog,
    /// The selected monthly dataset.
    pub selection: SelectionState,
    /// Layer toggles.
    pub toggles: ToggleState,
    /// Handle for the building tileset, fetched once at startup.
    pub buildings: ResourceSlot,
    next_token: u64,
    outbox: Vec<FetchRequest>,
}

impl FromWorld for ViewerShell {
    fn from_world(world: &mut World) -> Self {
        let month = world
            .get_resource::<LaunchParams>()
            .map_or(0, |params| params.month);
        Self::starting_at(DatasetCatalog::default(), month).unwrap_or_else(|e| {
            tracing::warn!("Ignoring initial month: {e}");
            Self::new(DatasetCatalog::default())
        })
    }
}

impl ViewerShell {
    /// Create the shell with the first month selected, building visible and
    /// solar radiation hidden. Fetches for both tilesets are queued.
    #[must_use]
    pub fn new(catalog: DatasetCatalog) -> Self {
        let first = catalog.first();
        Self::with_selection(catalog, first)
    }

    /// Like [`ViewerShell::new`], but with the month at `index` selected.
    ///
    /// Only that month's fetch is queued next to the buildings fetch.
    pub fn starting_at(catalog: DatasetCatalog, index: usize) -> Result<Self, MonthOutOfRange> {
        let asset_id = catalog.asset_at(index).ok_or(MonthOutOfRange(index))?;
        Ok(Self::with_selection(catalog, asset_id))
    }

    fn with_selection(catalog: DatasetCatalog, asset_id: AssetId) -> Self {
        let mut shell = Self {
            catalog,
            selection: SelectionState {
                asset_id,
                resource: ResourceSlot::Empty,
            },
            toggles: ToggleState::default(),
            buildings: ResourceSlot::Empty,
            next_token: 0,
            outbox: Vec::new(),
        };

        let token = shell.queue_fetch(BUILDINGS_ASSET);
        shell.buildings = ResourceSlot::Pending(token);
        let token = shell.queue_fetch(asset_id);
        shell.selection.resource = ResourceSlot::Pending(token);
        shell
    }

    /// The dataset catalog.
    #[must_use]
    pub fn catalog(&self) -> &DatasetCatalog {
        &self.catalog
    }

    /// Catalog index of the current selection.
    #[must_use]
    pub fn month_index(&self) -> usize {
        self.catalog
            .index_of(self.selection.asset_id)
            .unwrap_or_default()
    }

    /// Name of the selected month.
    #[must_use]
    pub fn month_name(&self) -> Option<&'static str> {
        self.catalog.month_name(self.selection.asset_id)
    }

    /// Select the dataset for a month and request its tileset.
    ///
    /// The previous handle is replaced. Its fetch is not cancelled, but its
    /// result will no longer be accepted.
    pub fn select_month(&mut self, index: usize) -> Result<AssetId, MonthOutOfRange> {
        let asset_id = self.catalog.asset_at(index).ok_or(MonthOutOfRange(index))?;
        let token = self.queue_fetch(asset_id);
        self.selection = SelectionState {
            asset_id,
            resource: ResourceSlot::Pending(token),
        };
        tracing::debug!(%asset_id, index, "selected month");
        Ok(asset_id)
    }

    /// Set one toggle, leaving the other untouched.
    pub fn set_toggle(&mut self, toggle: Toggle, value: bool) {
        self.toggles = self.toggles.merged(toggle, value);
    }

    /// Drain fetches queued since the last call.
    pub fn take_requests(&mut self) -> Vec<FetchRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// Store a fetch result if its token is still current.
    ///
    /// Returns `false` for stale results, which are dropped.
    pub fn accept(
        &mut self,
        token: RequestToken,
        result: Result<LoadedTileset, ion_tiles::Error>,
    ) -> bool {
        let slot = if self.buildings.is_pending_for(token) {
            &mut self.buildings
        } else if self.selection.resource.is_pending_for(token) {
            &mut self.selection.resource
        } else {
            return false;
        };

        *slot = match result {
            Ok(loaded) => ResourceSlot::Ready(Arc::new(loaded)),
            Err(e) => ResourceSlot::Failed(e.to_string()),
        };
        true
    }

    /// Layers that should currently be mounted.
    ///
    /// Buildings follow their toggle alone. The monthly layer needs the solar
    /// toggle and a handle, and is keyed by the selected asset so that a new
    /// selection replaces the old mount.
    #[must_use]
    pub fn desired_layers(&self) -> Vec<LayerKey> {
        let mut layers = Vec::with_capacity(2);
        if self.toggles.building {
            layers.push(LayerKey::Buildings);
        }
        if self.toggles.solar_radiation && self.selection.resource.is_present() {
            layers.push(LayerKey::SolarRadiation(self.selection.asset_id));
        }
        layers
    }

    /// The fetched tileset backing a layer, once available.
    #[must_use]
    pub fn content_for(&self, key: LayerKey) -> Option<&Arc<LoadedTileset>> {
        match key {
            LayerKey::Buildings => self.buildings.loaded(),
            LayerKey::SolarRadiation(asset_id) if asset_id == self.selection.asset_id => {
                self.selection.resource.loaded()
            }
            LayerKey::SolarRadiation(_) => None,
        }
    }

    fn queue_fetch(&mut self, asset_id: AssetId) -> RequestToken {
        self.next_token += 1;
        let token = RequestToken(self.next_token);
        self.outbox.push(FetchRequest { token, asset_id });
        token
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use ion_tiles::{AssetResource, Tileset};
    use proptest::prelude::*;

    use super::*;
    use crate::catalog::MONTH_NAMES;

    pub(crate) fn loaded(asset_id: AssetId) -> LoadedTileset {
        let tileset: Tileset = serde_json::from_str(
            r#"{"asset": {"version": "1.0"}, "root": {"boundingVolume": {"sphere": [4000000, 500000, 4900000, 100]}}}"#,
        )
        .unwrap();
        let mut resource = AssetResource::from_url(format!("https://assets.example.com/{asset_id}/tileset.json"));
        resource.asset_id = Some(asset_id);
        LoadedTileset { resource, tileset }
    }

    fn token_for(shell: &ViewerShell, asset_id: AssetId) -> RequestToken {
        shell
            .outbox
            .iter()
            .rev()
            .find(|r| r.asset_id == asset_id)
            .map(|r| r.token)
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let mut shell = ViewerShell::new(DatasetCatalog::default());
        assert_eq!(shell.selection.asset_id, AssetId(2_437_470));
        assert_eq!(shell.month_name(), Some("January"));
        assert!(shell.toggles.building);
        assert!(!shell.toggles.solar_radiation);

        let requested: Vec<AssetId> = shell.take_requests().iter().map(|r| r.asset_id).collect();
        assert_eq!(requested, vec![BUILDINGS_ASSET, AssetId(2_437_470)]);
        assert!(shell.take_requests().is_empty());
    }

    #[test]
    fn test_slider_at_five_selects_june() {
        let mut shell = ViewerShell::new(DatasetCatalog::default());
        let asset = shell.select_month(5).unwrap();
        assert_eq!(asset, shell.catalog().asset_at(5).unwrap());
        assert_eq!(shell.selection.asset_id, asset);
        assert_eq!(shell.month_name(), Some("June"));
        assert_eq!(shell.month_index(), 5);
    }

    #[test]
    fn test_out_of_range_month_is_rejected() {
        let mut shell = ViewerShell::new(DatasetCatalog::default());
        shell.take_requests();
        assert_eq!(shell.select_month(12), Err(MonthOutOfRange(12)));
        assert_eq!(shell.month_name(), Some("January"));
        assert!(shell.take_requests().is_empty());
    }

    #[test]
    fn test_initial_month_queues_only_that_month() {
        let catalog = DatasetCatalog::default();
        let june = catalog.asset_at(5).unwrap();
        let mut shell = ViewerShell::starting_at(catalog, 5).unwrap();
        assert_eq!(shell.month_name(), Some("June"));

        let requested: Vec<AssetId> = shell.take_requests().iter().map(|r| r.asset_id).collect();
        assert_eq!(requested, vec![BUILDINGS_ASSET, june]);

        assert_eq!(
            ViewerShell::starting_at(DatasetCatalog::default(), 12).err(),
            Some(MonthOutOfRange(12))
        );
    }

    #[test]
    fn test_shell_from_launch_month() {
        let mut world = World::new();
        world.insert_resource(LaunchParams {
            month: 5,
            ..LaunchParams::default()
        });
        let mut shell = ViewerShell::from_world(&mut world);

        let requested: Vec<AssetId> = shell.take_requests().iter().map(|r| r.asset_id).collect();
        assert_eq!(requested.len(), 2);
        assert!(!requested.contains(&AssetId(2_437_470)));
        assert_eq!(shell.month_index(), 5);
    }

    #[test]
    fn test_building_layer_follows_toggle_only() {
        let mut shell = ViewerShell::new(DatasetCatalog::default());
        assert_eq!(shell.desired_layers(), vec![LayerKey::Buildings]);

        shell.set_toggle(Toggle::SolarRadiation, true);
        assert!(shell.desired_layers().contains(&LayerKey::Buildings));

        shell.set_toggle(Toggle::Building, false);
        assert!(!shell.desired_layers().contains(&LayerKey::Buildings));

        shell.select_month(3).unwrap();
        assert!(!shell.desired_layers().contains(&LayerKey::Buildings));
    }

    #[test]
    fn test_solar_layer_needs_toggle_and_resource() {
        let mut shell = ViewerShell::new(DatasetCatalog::default());
        let january = shell.selection.asset_id;

        shell.set_toggle(Toggle::SolarRadiation, true);
        assert_eq!(
            shell.desired_layers(),
            vec![LayerKey::Buildings, LayerKey::SolarRadiation(january)]
        );

        // A failed fetch leaves no handle to mount.
        let token = token_for(&shell, january);
        assert!(shell.accept(
            token,
            Err(ion_tiles::Error::HttpStatus {
                url: "https://assets.example.com".to_string(),
                status: 404
            })
        ));
        assert_eq!(shell.desired_layers(), vec![LayerKey::Buildings]);
    }

    #[test]
    fn test_new_selection_replaces_solar_layer() {
        let mut shell = ViewerShell::new(DatasetCatalog::default());
        shell.set_toggle(Toggle::SolarRadiation, true);
        shell.set_toggle(Toggle::Building, false);

        let march = shell.select_month(2).unwrap();
        assert_eq!(shell.desired_layers(), vec![LayerKey::SolarRadiation(march)]);

        let april = shell.select_month(3).unwrap();
        assert_eq!(shell.desired_layers(), vec![LayerKey::SolarRadiation(april)]);
    }

    #[test]
    fn test_stale_result_is_discarded() {
        let mut shell = ViewerShell::new(DatasetCatalog::default());
        let january = shell.selection.asset_id;
        let stale = token_for(&shell, january);

        let june = shell.select_month(5).unwrap();
        let current = token_for(&shell, june);

        assert!(!shell.accept(stale, Ok(loaded(january))));
        assert!(shell.selection.resource.loaded().is_none());

        assert!(shell.accept(current, Ok(loaded(june))));
        assert!(shell.content_for(LayerKey::SolarRadiation(june)).is_some());
        assert!(shell.content_for(LayerKey::SolarRadiation(january)).is_none());

        // A duplicate delivery for a settled slot is also ignored.
        assert!(!shell.accept(current, Ok(loaded(june))));
    }

    #[test]
    fn test_buildings_result_fills_buildings_slot() {
        let mut shell = ViewerShell::new(DatasetCatalog::default());
        let token = token_for(&shell, BUILDINGS_ASSET);
        assert!(shell.accept(token, Ok(loaded(BUILDINGS_ASSET))));
        assert!(shell.content_for(LayerKey::Buildings).is_some());
        assert!(shell.selection.resource.loaded().is_none());
    }

    proptest! {
        #[test]
        fn prop_select_month_matches_catalog(index in 0usize..MONTH_COUNT) {
            let mut shell = ViewerShell::new(DatasetCatalog::default());
            let asset = shell.select_month(index).unwrap();
            prop_assert_eq!(Some(asset), shell.catalog().asset_at(index));
            prop_assert_eq!(shell.month_name(), Some(MONTH_NAMES[index]));
        }

        #[test]
        fn prop_toggle_merge_leaves_other_field(
            building in any::<bool>(),
            solar in any::<bool>(),
            value in any::<bool>(),
            target_building in any::<bool>(),
        ) {
            let before = ToggleState { building, solar_radiation: solar };
            let (target, other) = if target_building {
                (Toggle::Building, Toggle::SolarRadiation)
            } else {
                (Toggle::SolarRadiation, Toggle::Building)
            };
            let after = before.merged(target, value);
            prop_assert_eq!(after.get(target), value);
            prop_assert_eq!(after.get(other), before.get(other));
        }
    }
}
