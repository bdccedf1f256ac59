//! Base-game content as data: cards, decks, the standard galaxy skeleton,
//! and starting forces.
//!
//! Card ids are assigned statically: 1-49 action cards, 50-79 agendas,
//! 100-149 objectives, 150-199 technologies, 200-215 promissory notes (one
//! per seat), 230-239 relics, 240-299 exploration cards. The same content
//! set always rebuilds the same registry, so snapshots only carry ids.

use crate::ability::{AbilityCost, AbilityDef, Condition, RerollGrant, WindowKind};
use crate::card::{
    AgendaDef, AgendaKind, CardDefinition, CardKind, Elect, ExplorationDef, ExplorationOutcome,
    LawModifier, ObjectiveCondition, ObjectiveDef, ObjectiveKind, ObjectiveTiming, PromissoryDef,
    RelicDef, TechDef,
};
use crate::effect::{Effect, PlayerSel, SystemSel};
use crate::galaxy::{HexCoord, SystemTile};
use crate::ids::{CardId, PlanetId, SystemId};
use crate::planet::Planet;
use crate::player::CommandPool;
use crate::registry::CardRegistry;
use crate::state::GameState;
use crate::types::{PlanetTrait, TechColor, TileBack, UnitType};

pub const MECATOL_SYSTEM: SystemId = SystemId(18);
pub const MECATOL_REX: PlanetId = PlanetId(18);

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

pub fn registry() -> CardRegistry {
    let mut reg = CardRegistry::new();
    for def in action_cards() {
        reg.register(def);
    }
    for def in agendas() {
        reg.register(def);
    }
    for def in objectives() {
        reg.register(def);
    }
    for def in technologies() {
        reg.register(def);
    }
    for seat in 0..8u16 {
        reg.register(CardDefinition {
            id: CardId::from_raw(200 + seat),
            name: "Trade Agreement",
            kind: CardKind::Promissory(PromissoryDef {
                ability: AbilityDef::new(
                    WindowKind::StartOfTurn,
                    vec![Effect::ReplenishCommodities {
                        who: PlayerSel::Owner,
                    }],
                ),
            }),
        });
    }
    for def in relics() {
        reg.register(def);
    }
    for def in exploration_cards() {
        reg.register(def);
    }
    reg
}

fn card(id: u16, name: &'static str, kind: CardKind) -> CardDefinition {
    CardDefinition {
        id: CardId::from_raw(id),
        name,
        kind,
    }
}

fn action_cards() -> Vec<CardDefinition> {
    vec![
        card(
            1,
            "Sabotage",
            CardKind::Action(AbilityDef::new(WindowKind::WhenActionCardPlayed, Vec::new()).canceller()),
        ),
        card(
            2,
            "Morale Boost",
            CardKind::Action(
                AbilityDef::new(
                    WindowKind::StartOfCombat,
                    vec![Effect::CombatBonusThisRound {
                        who: PlayerSel::Owner,
                        n: 1,
                    }],
                )
                .when(Condition::OwnerInCombat)
                .cancellable(),
            ),
        ),
        card(
            3,
            "Fire Team",
            CardKind::Action(
                AbilityDef::new(WindowKind::AfterDiceRoll, Vec::new())
                    .when(Condition::OwnerInCombat)
                    .rerolls(RerollGrant {
                        dice: 1,
                        own_dice: true,
                    }),
            ),
        ),
        card(
            4,
            "Scramble Frequency",
            CardKind::Action(
                AbilityDef::new(WindowKind::AfterDiceRoll, Vec::new())
                    .when(Condition::OwnerInCombat)
                    .rerolls(RerollGrant {
                        dice: 1,
                        own_dice: true,
                    }),
            ),
        ),
        card(
            5,
            "Summit",
            CardKind::Action(
                AbilityDef::new(
                    WindowKind::ComponentAction,
                    vec![Effect::GainCommandTokens {
                        who: PlayerSel::Owner,
                        pool: CommandPool::Tactic,
                        n: 2,
                    }],
                )
                .cancellable(),
            ),
        ),
        card(
            6,
            "Focused Research",
            CardKind::Action(
                AbilityDef::new(
                    WindowKind::ComponentAction,
                    vec![Effect::ResearchChosenTech {
                        who: PlayerSel::Owner,
                    }],
                )
                .costing(AbilityCost::SpendTradeGoods(4))
                .cancellable(),
            ),
        ),
        card(
            7,
            "Insubordination",
            CardKind::Action(
                AbilityDef::new(
                    WindowKind::ComponentAction,
                    vec![Effect::RemoveCommandTokenFromPool {
                        who: PlayerSel::Chosen,
                        pool: CommandPool::Tactic,
                    }],
                )
                .cancellable(),
            ),
        ),
        card(
            8,
            "War Effort",
            CardKind::Action(
                AbilityDef::new(
                    WindowKind::ComponentAction,
                    vec![Effect::PlaceUnitInSpace {
                        who: PlayerSel::Owner,
                        unit_type: UnitType::Cruiser,
                        system: SystemSel::Chosen,
                    }],
                )
                .cancellable(),
            ),
        ),
    ]
}

/// Copies per action card in the deck.
fn action_deck_counts() -> &'static [(u16, u8)] {
    &[
        (1, 4), // Sabotage
        (2, 4), // Morale Boost
        (3, 4), // Fire Team
        (4, 4), // Scramble Frequency
        (5, 2), // Summit
        (6, 2), // Focused Research
        (7, 2), // Insubordination
        (8, 2), // War Effort
    ]
}

fn agendas() -> Vec<CardDefinition> {
    vec![
        card(
            50,
            "Political Censure",
            CardKind::Agenda(AgendaDef {
                kind: AgendaKind::Law,
                elect: Elect::Player,
                modifier: LawModifier::ElectedGainsVictoryPoint,
                on_resolve: Vec::new(),
            }),
        ),
        card(
            51,
            "Prophecy of Ixth",
            CardKind::Agenda(AgendaDef {
                kind: AgendaKind::Law,
                elect: Elect::Player,
                modifier: LawModifier::CombatBonus {
                    unit_type: UnitType::Fighter,
                    bonus: 1,
                },
                on_resolve: Vec::new(),
            }),
        ),
        card(
            52,
            "Conventions of War",
            CardKind::Agenda(AgendaDef {
                kind: AgendaKind::Law,
                elect: Elect::ForAgainst,
                modifier: LawModifier::None,
                on_resolve: Vec::new(),
            }),
        ),
        card(
            53,
            "Incentive Program",
            CardKind::Agenda(AgendaDef {
                kind: AgendaKind::Directive,
                elect: Elect::ForAgainst,
                modifier: LawModifier::None,
                on_resolve: vec![Effect::RevealPublicObjective],
            }),
        ),
        card(
            54,
            "Economic Equality",
            CardKind::Agenda(AgendaDef {
                kind: AgendaKind::Directive,
                elect: Elect::ForAgainst,
                modifier: LawModifier::None,
                on_resolve: vec![Effect::GainTradeGoods {
                    who: PlayerSel::Each,
                    n: 5,
                }],
            }),
        ),
    ]
}

fn objective(
    id: u16,
    name: &'static str,
    kind: ObjectiveKind,
    condition: ObjectiveCondition,
) -> CardDefinition {
    let points = match kind {
        ObjectiveKind::StageII => 2,
        _ => 1,
    };
    card(
        id,
        name,
        CardKind::Objective(ObjectiveDef {
            kind,
            condition,
            timing: ObjectiveTiming::StatusPhase,
            points,
        }),
    )
}

fn objectives() -> Vec<CardDefinition> {
    use ObjectiveCondition as Oc;
    use ObjectiveKind::{Secret, StageI, StageII};
    vec![
        objective(100, "Expand Borders", StageI, Oc::ControlPlanetsOutsideHome(6)),
        objective(101, "Corner the Market", StageI, Oc::ControlPlanetsSameTrait(4)),
        objective(102, "Develop Weaponry", StageI, Oc::OwnUnitUpgrades(2)),
        objective(103, "Raise a Fleet", StageI, Oc::FleetOfShips(5)),
        objective(104, "Negotiate Trade Routes", StageI, Oc::HoldTradeGoods(5)),
        objective(110, "Command an Armada", StageII, Oc::FleetOfShips(8)),
        objective(111, "Subdue the Galaxy", StageII, Oc::ControlPlanetsOutsideHome(11)),
        objective(112, "Revolutionize Warfare", StageII, Oc::OwnTechnologies(8)),
        objective(113, "Hold Vast Reserves", StageII, Oc::HoldTradeGoods(10)),
        objective(114, "Galvanize the People", StageII, Oc::ControlPlanets(12)),
        objective(120, "Destroy Their Greatest Ship", Secret, Oc::DestroyedEnemyUnit),
        objective(121, "Occupy the Seat of the Empire", Secret, Oc::ControlMecatolRex),
        objective(122, "Master the Laws of Physics", Secret, Oc::OwnTechnologies(4)),
        objective(123, "Strengthen Bonds", Secret, Oc::HoldTradeGoods(4)),
        objective(124, "Adapt New Strategies", Secret, Oc::OwnTechnologies(2)),
    ]
}

fn tech(
    id: u16,
    name: &'static str,
    color: Option<TechColor>,
    prerequisites: &[TechColor],
    unit_upgrade: Option<UnitType>,
) -> CardDefinition {
    card(
        id,
        name,
        CardKind::Technology(TechDef {
            color,
            prerequisites: prerequisites.to_vec(),
            unit_upgrade,
        }),
    )
}

fn technologies() -> Vec<CardDefinition> {
    use TechColor::{Biotic, Cybernetic, Propulsion, Warfare};
    vec![
        tech(150, "Neural Motivator", Some(Biotic), &[], None),
        tech(151, "Hyper Metabolism", Some(Biotic), &[Biotic, Biotic], None),
        tech(152, "Antimass Deflectors", Some(Propulsion), &[], None),
        tech(153, "Gravity Drive", Some(Propulsion), &[Propulsion], None),
        tech(
            154,
            "Fleet Logistics",
            Some(Propulsion),
            &[Propulsion, Propulsion],
            None,
        ),
        tech(155, "Sarween Tools", Some(Cybernetic), &[], None),
        tech(
            156,
            "Graviton Laser System",
            Some(Cybernetic),
            &[Cybernetic],
            None,
        ),
        tech(157, "Plasma Scoring", Some(Warfare), &[], None),
        tech(158, "Magen Defense Grid", Some(Warfare), &[Warfare], None),
        tech(159, "Duranium Armor", Some(Warfare), &[Warfare, Warfare], None),
        tech(
            170,
            "Fighter II",
            None,
            &[Biotic, Propulsion],
            Some(UnitType::Fighter),
        ),
        tech(171, "Infantry II", None, &[Biotic, Biotic], Some(UnitType::Infantry)),
        tech(
            172,
            "Cruiser II",
            None,
            &[Biotic, Cybernetic, Warfare],
            Some(UnitType::Cruiser),
        ),
        tech(
            173,
            "Carrier II",
            None,
            &[Propulsion, Propulsion],
            Some(UnitType::Carrier),
        ),
        tech(
            174,
            "Dreadnought II",
            None,
            &[Propulsion, Propulsion, Cybernetic],
            Some(UnitType::Dreadnought),
        ),
        tech(
            175,
            "Destroyer II",
            None,
            &[Warfare, Warfare],
            Some(UnitType::Destroyer),
        ),
        tech(
            176,
            "PDS II",
            None,
            &[Cybernetic, Warfare],
            Some(UnitType::Pds),
        ),
        tech(
            177,
            "Space Dock II",
            None,
            &[Cybernetic, Cybernetic],
            Some(UnitType::SpaceDock),
        ),
    ]
}

fn relics() -> Vec<CardDefinition> {
    vec![
        card(
            230,
            "The Crown of Emphidia",
            CardKind::Relic(RelicDef {
                ability: AbilityDef::new(
                    WindowKind::ComponentAction,
                    vec![Effect::GainVictoryPoints {
                        who: PlayerSel::Owner,
                        n: 1,
                    }],
                ),
                purge_after_use: true,
            }),
        ),
        card(
            231,
            "Maw of Worlds",
            CardKind::Relic(RelicDef {
                ability: AbilityDef::new(
                    WindowKind::ComponentAction,
                    vec![Effect::ResearchChosenTech {
                        who: PlayerSel::Owner,
                    }],
                )
                .costing(AbilityCost::PurgeSelf),
                purge_after_use: true,
            }),
        ),
    ]
}

fn fragment(id: u16, name: &'static str, deck: Option<PlanetTrait>) -> CardDefinition {
    card(
        id,
        name,
        CardKind::Exploration(ExplorationDef {
            deck,
            outcome: ExplorationOutcome::RelicFragment(deck),
        }),
    )
}

fn exploration_cards() -> Vec<CardDefinition> {
    use PlanetTrait::{Cultural, Hazardous, Industrial};
    vec![
        fragment(240, "Cultural Relic Fragment", Some(Cultural)),
        card(
            241,
            "Tomb of Emphidia",
            CardKind::Exploration(ExplorationDef {
                deck: Some(Cultural),
                outcome: ExplorationOutcome::Attach {
                    resources: 0,
                    influence: 1,
                },
            }),
        ),
        card(
            242,
            "Paradise World",
            CardKind::Exploration(ExplorationDef {
                deck: Some(Cultural),
                outcome: ExplorationOutcome::Attach {
                    resources: 0,
                    influence: 2,
                },
            }),
        ),
        fragment(243, "Hazardous Relic Fragment", Some(Hazardous)),
        card(
            244,
            "Rich World",
            CardKind::Exploration(ExplorationDef {
                deck: Some(Hazardous),
                outcome: ExplorationOutcome::Attach {
                    resources: 1,
                    influence: 0,
                },
            }),
        ),
        card(
            245,
            "Volatile Fuel Source",
            CardKind::Exploration(ExplorationDef {
                deck: Some(Hazardous),
                outcome: ExplorationOutcome::Resolve(vec![Effect::GainTradeGoods {
                    who: PlayerSel::Owner,
                    n: 1,
                }]),
            }),
        ),
        fragment(246, "Industrial Relic Fragment", Some(Industrial)),
        card(
            247,
            "Functioning Base",
            CardKind::Exploration(ExplorationDef {
                deck: Some(Industrial),
                outcome: ExplorationOutcome::Resolve(vec![Effect::DrawActionCards {
                    who: PlayerSel::Owner,
                    n: 1,
                }]),
            }),
        ),
        card(
            248,
            "Local Fabricators",
            CardKind::Exploration(ExplorationDef {
                deck: Some(Industrial),
                outcome: ExplorationOutcome::Resolve(vec![Effect::GainCommodities {
                    who: PlayerSel::Owner,
                    n: 1,
                }]),
            }),
        ),
        fragment(249, "Unknown Relic Fragment", None),
        card(
            250,
            "Lost Crew",
            CardKind::Exploration(ExplorationDef {
                deck: None,
                outcome: ExplorationOutcome::Resolve(vec![Effect::DrawActionCards {
                    who: PlayerSel::Owner,
                    n: 1,
                }]),
            }),
        ),
        card(
            251,
            "Enigmatic Device",
            CardKind::Exploration(ExplorationDef {
                deck: None,
                outcome: ExplorationOutcome::Resolve(vec![Effect::GainTradeGoods {
                    who: PlayerSel::Owner,
                    n: 1,
                }]),
            }),
        ),
    ]
}

// ----------------------------------------------------------------------------
// Deck composition
// ----------------------------------------------------------------------------

pub fn action_deck_ids() -> Vec<CardId> {
    let mut out = Vec::new();
    for &(id, copies) in action_deck_counts() {
        for _ in 0..copies {
            out.push(CardId::from_raw(id));
        }
    }
    out
}

pub fn agenda_deck_ids() -> Vec<CardId> {
    agendas().into_iter().map(|d| d.id).collect()
}

pub fn exploration_deck_ids(deck: Option<PlanetTrait>) -> Vec<CardId> {
    let copies = |id: u16| -> u8 {
        // Three fragments per trait deck, two unknowns, singles otherwise.
        match id {
            240 | 243 | 246 => 3,
            249 => 2,
            _ => 1,
        }
    };
    let mut out = Vec::new();
    for def in exploration_cards() {
        let CardKind::Exploration(e) = &def.kind else {
            continue;
        };
        if e.deck == deck {
            for _ in 0..copies(def.id.0) {
                out.push(def.id);
            }
        }
    }
    out
}

// ----------------------------------------------------------------------------
// Galaxy and starting forces
// ----------------------------------------------------------------------------

/// Build the standard skeleton: Mecatol Rex in the center, one middle system
/// per seat at radius one, one home system per seat at radius two. Returns
/// the home system of each seat.
pub fn standard_galaxy(state: &mut GameState, seats: u8) -> Vec<SystemId> {
    const RING1: [(i16, i16); 6] = [(1, 0), (0, 1), (-1, 1), (-1, 0), (0, -1), (1, -1)];
    const RING2: [(i16, i16); 6] = [(2, 0), (0, 2), (-2, 2), (-2, 0), (0, -2), (2, -2)];

    let mecatol = SystemTile::new(MECATOL_SYSTEM, TileBack::Blue).with_planets(vec![MECATOL_REX]);
    state.galaxy.place(mecatol, HexCoord::new(0, 0));
    state.planets.insert(
        MECATOL_REX,
        Planet::new(MECATOL_REX, "Mecatol Rex", MECATOL_SYSTEM)
            .with_values(1, 6)
            .mecatol_rex(),
    );

    let traits = [
        PlanetTrait::Cultural,
        PlanetTrait::Hazardous,
        PlanetTrait::Industrial,
    ];
    let mut homes = Vec::new();
    for seat in 0..seats.min(6) {
        let i = seat as usize;
        // Middle system with one traited planet.
        let mid_system = SystemId::from_raw(30 + u16::from(seat));
        let mid_planet = PlanetId::from_raw(30 + u16::from(seat));
        let (q, r) = RING1[i];
        state.galaxy.place(
            SystemTile::new(mid_system, TileBack::Blue).with_planets(vec![mid_planet]),
            HexCoord::new(q, r),
        );
        state.planets.insert(
            mid_planet,
            Planet::new(mid_planet, format!("waypoint-{seat}"), mid_system)
                .with_values(2, 1)
                .with_trait(traits[i % 3]),
        );

        // Home system with one planet.
        let home_system = SystemId::from_raw(1 + u16::from(seat));
        let home_planet = PlanetId::from_raw(1 + u16::from(seat));
        let (q, r) = RING2[i];
        state.galaxy.place(
            SystemTile::new(home_system, TileBack::Green).with_planets(vec![home_planet]),
            HexCoord::new(q, r),
        );
        state.planets.insert(
            home_planet,
            Planet::new(home_planet, format!("homeworld-{seat}"), home_system).with_values(4, 2),
        );
        homes.push(home_system);
    }
    homes
}

/// Generic starting forces placed at setup. Faction sheets vary these in the
/// physical game; the engine starts every faction from the same baseline.
pub fn starting_space_units() -> &'static [UnitType] {
    &[
        UnitType::Carrier,
        UnitType::Cruiser,
        UnitType::Fighter,
        UnitType::Fighter,
        UnitType::Infantry,
    ]
}

pub fn starting_ground_units() -> &'static [UnitType] {
    &[
        UnitType::Infantry,
        UnitType::Infantry,
        UnitType::SpaceDock,
        UnitType::Pds,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_builds_without_collisions() {
        let reg = registry();
        assert!(reg.get(CardId::from_raw(1)).is_some());
        assert_eq!(reg.name_of(CardId::from_raw(50)), "Political Censure");
        assert_eq!(reg.objective_ids(ObjectiveKind::StageI).len(), 5);
        assert_eq!(reg.objective_ids(ObjectiveKind::StageII).len(), 5);
    }

    #[test]
    fn test_action_deck_has_copies() {
        let deck = action_deck_ids();
        let sabotage = deck
            .iter()
            .filter(|&&c| c == CardId::from_raw(1))
            .count();
        assert_eq!(sabotage, 4);
    }

    #[test]
    fn test_standard_galaxy_centers_mecatol() {
        let mut state = GameState::bare(5, 10);
        let homes = standard_galaxy(&mut state, 3);
        assert_eq!(homes.len(), 3);
        assert!(state.planets[&MECATOL_REX].is_mecatol_rex);
        // Every home reaches Mecatol through its waypoint.
        for (seat, home) in homes.iter().enumerate() {
            let mid = SystemId::from_raw(30 + seat as u16);
            assert!(state.galaxy.are_adjacent(*home, mid));
            assert!(state.galaxy.are_adjacent(mid, MECATOL_SYSTEM));
        }
    }

    #[test]
    fn test_trait_decks_carry_three_fragments() {
        let cultural = exploration_deck_ids(Some(PlanetTrait::Cultural));
        let fragments = cultural
            .iter()
            .filter(|&&c| c == CardId::from_raw(240))
            .count();
        assert_eq!(fragments, 3);
    }
}
