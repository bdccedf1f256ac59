//! Exploration and relics (Prophecy of Kings).
//!
//! Gaining first-time control of a planet with a trait draws from the
//! matching exploration deck. Relic fragments accumulate in the play area;
//! three of a matching trait (unknown fragments are wild) purge to draw a
//! relic.

use crate::card::{CardKind, ExplorationOutcome};
use crate::event::{Event, EventKind};
use crate::executor::{ExecutionContext, run_script};
use crate::ids::{CardId, PlanetId, PlayerId, SystemId};
use crate::intent::{ChosenTargets, Rejection};
use crate::registry::CardRegistry;
use crate::state::GameState;
use crate::types::PlanetTrait;

/// Explore a planet on first control. A planet without a trait, or one
/// already explored, draws nothing.
pub fn explore_on_first_control(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    planet_id: PlanetId,
    events: &mut Vec<Event>,
) {
    let Some(planet) = state.planets.get(&planet_id) else {
        return;
    };
    if planet.explored || !planet.explorable() {
        return;
    }
    // Multi-trait planets explore their first trait in printed order.
    let Some(&planet_trait) = planet.traits.iter().next() else {
        return;
    };
    if let Some(p) = state.planets.get_mut(&planet_id) {
        p.explored = true;
    }
    let deck = match planet_trait {
        PlanetTrait::Cultural => &mut state.decks.cultural,
        PlanetTrait::Hazardous => &mut state.decks.hazardous,
        PlanetTrait::Industrial => &mut state.decks.industrial,
    };
    let Some(card) = deck.draw(&mut state.rng) else {
        return;
    };
    events.push(Event::public(EventKind::ExplorationResolved {
        player,
        planet: Some(planet_id),
        card,
    }));
    resolve_exploration_card(state, registry, player, Some(planet_id), card, events);
}

/// Explore a frontier token in a system; the token is removed.
pub fn explore_frontier(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    system: SystemId,
    events: &mut Vec<Event>,
) {
    let has_token = state
        .galaxy
        .system(system)
        .is_some_and(|t| t.frontier_token);
    if !has_token {
        return;
    }
    if let Some(tile) = state.galaxy.system_mut(system) {
        tile.frontier_token = false;
    }
    let Some(card) = state.decks.frontier.draw(&mut state.rng) else {
        return;
    };
    events.push(Event::public(EventKind::ExplorationResolved {
        player,
        planet: None,
        card,
    }));
    resolve_exploration_card(state, registry, player, None, card, events);
}

fn resolve_exploration_card(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    planet: Option<PlanetId>,
    card: CardId,
    events: &mut Vec<Event>,
) {
    let Some(CardKind::Exploration(def)) = registry.get(card).map(|d| d.kind.clone()) else {
        return;
    };
    match def.outcome {
        ExplorationOutcome::Attach {
            resources,
            influence,
        } => {
            if let Some(planet_id) = planet {
                if let Ok(p) = state.planet_mut(planet_id) {
                    p.attach(card, resources, influence);
                }
                events.push(Event::public(EventKind::PlanetAttached {
                    planet: planet_id,
                    card,
                }));
            }
        }
        ExplorationOutcome::RelicFragment(_) => {
            if let Ok(p) = state.player_mut(player) {
                p.relic_fragments.push(card);
            }
        }
        ExplorationOutcome::Resolve(script) => {
            let targets = ChosenTargets {
                planet,
                ..ChosenTargets::default()
            };
            let ctx = ExecutionContext::new(player, targets);
            run_script(state, registry, &ctx, &script, events);
        }
    }
}

/// Purge three matching fragments (unknowns wild) and draw a relic.
pub fn trade_fragments(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    fragments: &[CardId],
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    if fragments.len() != 3 {
        return Err(Rejection::invalid(
            "need_three_fragments",
            "exactly three fragments trade for a relic",
        ));
    }
    let held = state.player(player)?.relic_fragments.clone();
    let mut traits: Vec<Option<PlanetTrait>> = Vec::new();
    for &card in fragments {
        if !held.contains(&card) {
            return Err(Rejection::invalid(
                "fragment_not_held",
                format!("{card} is not in your play area"),
            ));
        }
        let Some(CardKind::Exploration(def)) = registry.get(card).map(|d| &d.kind) else {
            return Err(Rejection::invalid("not_a_fragment", format!("{card} is not a fragment")));
        };
        let ExplorationOutcome::RelicFragment(t) = def.outcome else {
            return Err(Rejection::invalid("not_a_fragment", format!("{card} is not a fragment")));
        };
        traits.push(t);
    }
    let named: Vec<PlanetTrait> = traits.iter().filter_map(|t| *t).collect();
    if !named.windows(2).all(|w| w[0] == w[1]) {
        return Err(Rejection::rules(
            "mismatched_fragments",
            "fragments must share a trait (unknowns are wild)",
        ));
    }
    for &card in fragments {
        if let Ok(p) = state.player_mut(player) {
            p.relic_fragments.retain(|&c| c != card);
        }
        state.purge(card, events);
    }
    match state.decks.relic.draw(&mut state.rng) {
        Some(relic) => {
            if let Ok(p) = state.player_mut(player) {
                p.relics.push(relic);
            }
            events.push(Event::public(EventKind::RelicDrawn {
                player,
                card: relic,
            }));
            Ok(())
        }
        None => Err(Rejection::unresolvable(
            "relic_deck_empty",
            "the relic deck is exhausted",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{CardDefinition, ExplorationDef};
    use crate::deck::Deck;
    use crate::types::{Faction, PlayerColor};

    fn fragment_def(id: u16, t: Option<PlanetTrait>) -> CardDefinition {
        CardDefinition {
            id: CardId::from_raw(id),
            name: "Relic Fragment",
            kind: CardKind::Exploration(ExplorationDef {
                deck: t,
                outcome: ExplorationOutcome::RelicFragment(t),
            }),
        }
    }

    fn fixture() -> (GameState, CardRegistry, PlayerId) {
        let mut state = GameState::bare(51, 10);
        let p = PlayerId::from_index(0);
        state.players.insert(
            p,
            crate::player::Player::new(
                p,
                Faction::NaaluCollective,
                PlayerColor::Green,
                SystemId::from_raw(1),
            ),
        );
        let mut reg = CardRegistry::new();
        reg.register(fragment_def(1, Some(PlanetTrait::Cultural)));
        reg.register(fragment_def(2, Some(PlanetTrait::Cultural)));
        reg.register(fragment_def(3, None));
        reg.register(fragment_def(4, Some(PlanetTrait::Hazardous)));
        reg.register(CardDefinition {
            id: CardId::from_raw(9),
            name: "The Prophet's Tears",
            kind: CardKind::Relic(crate::card::RelicDef {
                ability: crate::ability::AbilityDef::new(
                    crate::ability::WindowKind::ComponentAction,
                    Vec::new(),
                ),
                purge_after_use: true,
            }),
        });
        state.decks.relic = Deck::new(vec![CardId::from_raw(9)]);
        (state, reg, p)
    }

    #[test]
    fn test_matching_fragments_trade_for_a_relic() {
        let (mut state, reg, p) = fixture();
        state.players.get_mut(&p).unwrap().relic_fragments =
            vec![CardId::from_raw(1), CardId::from_raw(2), CardId::from_raw(3)];
        let mut events = Vec::new();
        trade_fragments(
            &mut state,
            &reg,
            p,
            &[CardId::from_raw(1), CardId::from_raw(2), CardId::from_raw(3)],
            &mut events,
        )
        .unwrap();
        assert_eq!(state.players[&p].relics, vec![CardId::from_raw(9)]);
        assert!(state.players[&p].relic_fragments.is_empty());
        // Purged fragments never come back.
        assert!(state.is_purged(CardId::from_raw(1)));
    }

    #[test]
    fn test_mismatched_fragments_are_rejected() {
        let (mut state, reg, p) = fixture();
        state.players.get_mut(&p).unwrap().relic_fragments =
            vec![CardId::from_raw(1), CardId::from_raw(2), CardId::from_raw(4)];
        let mut events = Vec::new();
        let err = trade_fragments(
            &mut state,
            &reg,
            p,
            &[CardId::from_raw(1), CardId::from_raw(2), CardId::from_raw(4)],
            &mut events,
        )
        .unwrap_err();
        assert_eq!(err.code(), "mismatched_fragments");
    }
}
