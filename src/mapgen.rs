//! Map generation from theme-declared anchors and zone-weighted terrain.
//!
//! Grounded on the turn resolver's own pure-function discipline: generation
//! takes a theme and a PRNG and returns a brand new map plus starting
//! civilization states, with no hidden state of its own.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::hex::{neighbor_offsets, HexCoord};
use crate::prng::Prng;
use crate::state::{CivilizationState, GameState, Hex, Settlement, SettlementType, Terrain, Unit};
use crate::theme::{MapZoneShape, ThemePackage};

#[derive(Debug, thiserror::Error)]
pub enum MapGenError {
    #[error("no free cell available to place anchor {0}")]
    NoFreeCellForAnchor(String),
}

struct ZoneLookup {
    /// `zone_index[row][col]` — index into `theme.map.zones`, if covered.
    grid: Vec<Vec<Option<usize>>>,
}

fn build_zone_lookup(theme: &ThemePackage) -> ZoneLookup {
    let cols = theme.map.cols as usize;
    let rows = theme.map.rows as usize;
    let mut grid = vec![vec![None; cols]; rows];
    for (zi, zone) in theme.map.zones.iter().enumerate() {
        match &zone.shape {
            MapZoneShape::RectangularBounds { min, max } => {
                for row in min.row.max(0)..=max.row.min(theme.map.rows - 1) {
                    for col in min.col.max(0)..=max.col.min(theme.map.cols - 1) {
                        grid[row as usize][col as usize] = Some(zi);
                    }
                }
            }
            MapZoneShape::ExplicitHexes { hexes } => {
                for coord in hexes {
                    if coord.row >= 0 && (coord.row as usize) < rows && coord.col >= 0 && (coord.col as usize) < cols
                    {
                        grid[coord.row as usize][coord.col as usize] = Some(zi);
                    }
                }
            }
        }
    }
    ZoneLookup { grid }
}

impl ZoneLookup {
    fn zone_at(&self, coord: HexCoord) -> Option<usize> {
        self.grid
            .get(coord.row as usize)
            .and_then(|row| row.get(coord.col as usize))
            .copied()
            .flatten()
    }
}

fn find_free_cell(
    occupied: &FxHashMap<HexCoord, ()>,
    start: HexCoord,
    cols: i32,
    rows: i32,
) -> Option<HexCoord> {
    if !occupied.contains_key(&start) {
        return Some(start);
    }
    let mut visited = std::collections::HashSet::new();
    visited.insert(start);
    let mut queue = VecDeque::new();
    queue.push_back(start);
    while let Some(current) = queue.pop_front() {
        for (dc, dr) in neighbor_offsets(current.row) {
            let n = HexCoord::new(current.col + dc, current.row + dr);
            if n.col < 0 || n.col >= cols || n.row < 0 || n.row >= rows || visited.contains(&n) {
                continue;
            }
            visited.insert(n);
            if !occupied.contains_key(&n) {
                return Some(n);
            }
            queue.push_back(n);
        }
    }
    None
}

/// Generate a brand new map and starting civilization roster from `theme`.
pub fn generate_map(
    theme: &ThemePackage,
    prng: &mut Prng,
) -> Result<(Vec<Vec<Hex>>, Vec<CivilizationState>), MapGenError> {
    let cols = theme.map.cols;
    let rows = theme.map.rows;
    let zones = build_zone_lookup(theme);

    // Step 2: resolve anchor placements.
    let mut occupied: FxHashMap<HexCoord, String> = FxHashMap::default();
    let mut placements: Vec<(HexCoord, &crate::theme::SettlementAnchor)> = Vec::new();
    for anchor in &theme.map.anchors {
        let snapped = HexCoord::new(
            anchor.approx_coord.col.clamp(0, cols - 1),
            anchor.approx_coord.row.clamp(0, rows - 1),
        );
        let occupied_lookup: FxHashMap<HexCoord, ()> = occupied.keys().map(|c| (*c, ())).collect();
        let coord = find_free_cell(&occupied_lookup, snapped, cols, rows)
            .ok_or_else(|| MapGenError::NoFreeCellForAnchor(anchor.id.clone()))?;
        occupied.insert(coord, anchor.id.clone());
        placements.push((coord, anchor));
    }

    // Step 3 + 4: terrain per hex.
    let mut map: Vec<Vec<Hex>> = Vec::with_capacity(rows as usize);
    for row in 0..rows {
        let mut hex_row = Vec::with_capacity(cols as usize);
        for col in 0..cols {
            let coord = HexCoord::new(col, row);
            let is_anchor = occupied.contains_key(&coord);
            let is_edge = theme.map.sea_edge
                && (row == 0 || row == rows - 1 || col == 0 || col == cols - 1);

            let terrain = if is_edge {
                Terrain::Sea
            } else {
                let mut weights: FxHashMap<String, f64> =
                    theme.map.default_terrain_weights.iter().map(|(k, v)| (k.clone(), *v)).collect();
                if let Some(zi) = zones.zone_at(coord) {
                    for (k, v) in &theme.map.zones[zi].terrain_weights {
                        weights.insert(k.clone(), *v);
                    }
                }
                if is_anchor {
                    weights.remove("sea");
                    weights.remove("mountains");
                }
                let items: Vec<(&str, f64)> = weights.iter().map(|(k, v)| (k.as_str(), *v)).collect();
                let choice = if items.is_empty() {
                    "plains"
                } else {
                    prng.weighted_choice(&items).map(|s| *s).unwrap_or("plains")
                };
                terrain_from_str(choice)
            };

            hex_row.push(Hex::new(coord, terrain));
        }
        map.push(hex_row);
    }

    // Step 5: settlements + control from anchors, then zone initial control.
    for (coord, anchor) in &placements {
        let hex = &mut map[coord.row as usize][coord.col as usize];
        hex.settlement = Some(Settlement {
            id: anchor.id.clone(),
            name: anchor.name.clone(),
            settlement_type: if anchor.is_capital {
                SettlementType::Capital
            } else {
                SettlementType::City
            },
            population: 1000,
            stability: 100,
            buildings: Vec::new(),
            is_capital: anchor.is_capital,
        });
        hex.controlled_by = Some(anchor.owner_civ_id.clone());
    }

    for zone in &theme.map.zones {
        if let Some(controller) = &zone.initial_controlled_by {
            let zi = theme.map.zones.iter().position(|z| z.id == zone.id).unwrap();
            for row in 0..rows {
                for col in 0..cols {
                    let coord = HexCoord::new(col, row);
                    if zones.zone_at(coord) != Some(zi) {
                        continue;
                    }
                    let hex = &mut map[row as usize][col as usize];
                    if hex.settlement.is_none() {
                        hex.controlled_by = Some(controller.clone());
                    }
                }
            }
        }
    }

    // Step 6: two garrisoned units of the cheapest eligible unit def at each capital.
    let mut next_unit_id: u64 = 1;
    for civ in &theme.civilizations {
        let Some(capital_coord) = placements
            .iter()
            .find(|(_, a)| a.owner_civ_id == civ.id && a.is_capital)
            .map(|(c, _)| *c)
        else {
            continue;
        };
        let cheapest = theme
            .units
            .iter()
            .filter(|u| match &u.prereq_tech {
                Some(tech) => civ.starting_techs.iter().any(|t| t == tech),
                None => true,
            })
            .min_by_key(|u| u.cost);
        if let Some(unit_def) = cheapest {
            let hex = &mut map[capital_coord.row as usize][capital_coord.col as usize];
            for _ in 0..2 {
                hex.units.push(Unit {
                    id: next_unit_id,
                    definition_id: unit_def.id.clone(),
                    civilization_id: civ.id.clone(),
                    strength: unit_def.strength,
                    morale: unit_def.morale,
                    moves_remaining: unit_def.moves,
                    is_garrisoned: true,
                });
                next_unit_id += 1;
            }
        }
    }

    // Step 7: seed fog-of-war at capital and neighbors.
    for civ in &theme.civilizations {
        let Some(capital_coord) = placements
            .iter()
            .find(|(_, a)| a.owner_civ_id == civ.id && a.is_capital)
            .map(|(c, _)| *c)
        else {
            continue;
        };
        map[capital_coord.row as usize][capital_coord.col as usize]
            .explored_by
            .insert(civ.id.clone());
        for (dc, dr) in neighbor_offsets(capital_coord.row) {
            let n = HexCoord::new(capital_coord.col + dc, capital_coord.row + dr);
            if n.col >= 0 && n.col < cols && n.row >= 0 && n.row < rows {
                map[n.row as usize][n.col as usize].explored_by.insert(civ.id.clone());
            }
        }
    }

    // Starting civilization states.
    let mut civ_states = Vec::with_capacity(theme.civilizations.len());
    for civ in &theme.civilizations {
        let mut state = CivilizationState::new(civ.id.clone());
        for (resource, amount) in &civ.starting_resources {
            state.resources.insert(resource.clone(), *amount);
        }
        state.completed_techs = civ.starting_techs.clone();
        civ_states.push(state);
    }

    Ok((map, civ_states))
}

fn terrain_from_str(s: &str) -> Terrain {
    match s {
        "mountains" => Terrain::Mountains,
        "forest" => Terrain::Forest,
        "desert" => Terrain::Desert,
        "coast" => Terrain::Coast,
        "sea" => Terrain::Sea,
        "river" => Terrain::River,
        _ => Terrain::Plains,
    }
}

/// Construct a fresh `GameState` for a new game, per the lifecycle: hash the
/// game id for the seed, generate the map, place starting units/buildings,
/// seed fog-of-war.
pub fn initialize_game_state(
    game_id: &str,
    theme_id: &str,
    theme: &ThemePackage,
    seed: u32,
    created_at: i64,
) -> Result<GameState, MapGenError> {
    let mut prng = Prng::new(seed);
    let (map, civ_states) = generate_map(theme, &mut prng)?;
    let mut civilizations = crate::collections::OrderedMap::new();
    for civ in civ_states {
        civilizations.insert(civ.id.clone(), civ);
    }
    Ok(GameState {
        game_id: game_id.to_string(),
        theme_id: theme_id.to_string(),
        turn: 0,
        phase: crate::state::GamePhase::Active,
        map,
        civilizations,
        active_events: Vec::new(),
        turn_history: Vec::new(),
        rng_seed: seed,
        rng_state: prng.state(),
        config: crate::config::SimConfig::default(),
        created_at,
        last_resolved_at: None,
        muwardi_invasion: None,
    })
}
