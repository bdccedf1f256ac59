//! Game creation.
//!
//! The setup protocol: seat the players, build the standard galaxy, place
//! the custodians token on Mecatol Rex, hand out starting forces, tokens,
//! commodities, promissory notes, and one secret objective each, shuffle
//! every deck, seed the objective rows, pick a random speaker, and open the
//! first strategy phase.

use crate::card::ObjectiveKind;
use crate::content;
use crate::event::{Event, EventKind};
use crate::ids::{CardId, PlayerId};
use crate::intent::Rejection;
use crate::phases;
use crate::player::Player;
use crate::registry::CardRegistry;
use crate::state::GameState;
use crate::types::{Faction, PlayerColor};
use crate::unit::UnitLocation;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PlayerSetup {
    pub faction: Faction,
    pub color: PlayerColor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct GameOptions {
    pub players: Vec<PlayerSetup>,
    /// 10 for a standard game, 14 for the long variant.
    pub target_vp: u8,
}

impl GameOptions {
    pub fn standard(players: Vec<PlayerSetup>) -> Self {
        Self {
            players,
            target_vp: 10,
        }
    }
}

/// Create a game. Returns the opening state (first strategy-phase pick
/// pending) plus the setup event log.
pub fn new_game(
    options: &GameOptions,
    seed: u64,
) -> Result<(GameState, CardRegistry, Vec<Event>), Rejection> {
    let seats = options.players.len();
    if !(2..=6).contains(&seats) {
        return Err(Rejection::invalid(
            "bad_player_count",
            "the engine seats 2 to 6 players",
        ));
    }
    if !matches!(options.target_vp, 10 | 14) {
        return Err(Rejection::invalid(
            "bad_target",
            "the victory target is 10 or 14",
        ));
    }
    {
        let mut colors: Vec<PlayerColor> = options.players.iter().map(|p| p.color).collect();
        colors.sort_unstable();
        colors.dedup();
        if colors.len() != seats {
            return Err(Rejection::invalid("color_clash", "player colors must differ"));
        }
        let mut factions: Vec<Faction> = options.players.iter().map(|p| p.faction).collect();
        factions.sort_unstable();
        factions.dedup();
        if factions.len() != seats {
            return Err(Rejection::invalid(
                "faction_clash",
                "each faction is played once",
            ));
        }
    }

    let registry = content::registry();
    let mut state = GameState::bare(seed, options.target_vp);
    let mut events = Vec::new();

    let homes = content::standard_galaxy(&mut state, seats as u8);

    for (i, setup) in options.players.iter().enumerate() {
        let id = PlayerId::from_index(i as u8);
        let home = homes[i];
        let mut player = Player::new(id, setup.faction, setup.color, home);
        // One promissory note per seat, owned by its color.
        let note = CardId::from_raw(200 + i as u16);
        player.promissory_hand.push(note);
        state.promissory_owner.insert(note, id);
        state.players.insert(id, player);

        // Home planet, starting forces.
        let home_planet = state
            .galaxy
            .system(home)
            .and_then(|t| t.planets.first().copied());
        if let Some(planet_id) = home_planet {
            if let Some(p) = state.planets.get_mut(&planet_id) {
                p.controller = Some(id);
                p.ready();
            }
            for &unit_type in content::starting_ground_units() {
                state.spawn_unit(id, unit_type, UnitLocation::OnPlanet(planet_id))?;
            }
        }
        for &unit_type in content::starting_space_units() {
            state.spawn_unit(id, unit_type, UnitLocation::Space(home))?;
        }
    }

    // Decks.
    state.decks.action = crate::deck::Deck::shuffled(content::action_deck_ids(), &mut state.rng);
    state.decks.agenda = crate::deck::Deck::shuffled(content::agenda_deck_ids(), &mut state.rng);
    state.decks.secret = crate::deck::Deck::shuffled(
        registry.objective_ids(ObjectiveKind::Secret),
        &mut state.rng,
    );
    state.decks.relic = crate::deck::Deck::shuffled(registry.relic_ids(), &mut state.rng);
    use crate::types::PlanetTrait;
    state.decks.cultural = crate::deck::Deck::shuffled(
        content::exploration_deck_ids(Some(PlanetTrait::Cultural)),
        &mut state.rng,
    );
    state.decks.hazardous = crate::deck::Deck::shuffled(
        content::exploration_deck_ids(Some(PlanetTrait::Hazardous)),
        &mut state.rng,
    );
    state.decks.industrial = crate::deck::Deck::shuffled(
        content::exploration_deck_ids(Some(PlanetTrait::Industrial)),
        &mut state.rng,
    );
    state.decks.frontier =
        crate::deck::Deck::shuffled(content::exploration_deck_ids(None), &mut state.rng);

    // Objective rows: 5 stage I, 5 stage II, facedown in a random order.
    let mut stage1 = registry.objective_ids(ObjectiveKind::StageI);
    state.rng.shuffle(&mut stage1);
    stage1.truncate(5);
    let mut stage2 = registry.objective_ids(ObjectiveKind::StageII);
    state.rng.shuffle(&mut stage2);
    stage2.truncate(5);
    state.decks.stage1 = stage1;
    state.decks.stage2 = stage2;

    // One secret objective each.
    for i in 0..seats {
        let id = PlayerId::from_index(i as u8);
        if let Some(card) = state.decks.secret.draw(&mut state.rng) {
            if let Ok(p) = state.player_mut(id) {
                p.secret_hand.push(card);
            }
            events.push(Event::private(id, EventKind::CardDrawn { player: id, card }));
        }
    }

    // Random speaker, then the first round opens.
    let seat = state.rng.pick(seats).unwrap_or(0);
    state.speaker = PlayerId::from_index(seat as u8);
    events.push(Event::public(EventKind::SpeakerChanged {
        player: state.speaker,
    }));
    phases::begin_round(&mut state, &mut events);
    Ok((state, registry, events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::GamePhase;

    pub fn three_players() -> GameOptions {
        GameOptions::standard(vec![
            PlayerSetup {
                faction: Faction::FederationOfSol,
                color: PlayerColor::Blue,
            },
            PlayerSetup {
                faction: Faction::BaronyOfLetnev,
                color: PlayerColor::Red,
            },
            PlayerSetup {
                faction: Faction::EmiratesOfHacan,
                color: PlayerColor::Yellow,
            },
        ])
    }

    #[test]
    fn test_setup_opens_strategy_phase() {
        let (state, _registry, _events) = new_game(&three_players(), 42).unwrap();
        assert!(matches!(state.phase, GamePhase::Strategy(_)));
        assert_eq!(state.round, 1);
        assert!(state.custodians_on_mecatol);
        assert_eq!(
            state.pending.as_ref().map(|p| p.player),
            Some(state.speaker)
        );
    }

    #[test]
    fn test_setup_is_deterministic() {
        let (a, _, _) = new_game(&three_players(), 77).unwrap();
        let (b, _, _) = new_game(&three_players(), 77).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_colors_rejected() {
        let mut options = three_players();
        options.players[1].color = PlayerColor::Blue;
        assert!(new_game(&options, 1).is_err());
    }

    #[test]
    fn test_players_start_with_forces_and_a_secret() {
        let (state, registry, _) = new_game(&three_players(), 9).unwrap();
        let p0 = PlayerId::from_index(0);
        let home = state.players[&p0].home;
        assert!(!state.ships_of(p0, home).is_empty());
        assert_eq!(state.players[&p0].secret_hand.len(), 1);
        assert_eq!(state.capacity_excess(&registry, p0, home), 0);
        state.audit(&registry).unwrap();
    }
}
