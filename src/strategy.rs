//! Strategic actions: the eight strategy cards, primary and secondary.
//!
//! Performing the primary exhausts the card and then offers the secondary to
//! every other player in clockwise order from the active player; each
//! secondary costs a strategy-pool token (Leadership's costs influence
//! instead). When the offers are done, the turn ends.

use crate::card::StrategyCard;
use crate::event::{Event, EventKind};
use crate::executor::{draw_action_cards, draw_secret_objective, research_tech};
use crate::ids::{PlanetId, PlayerId, SystemId};
use crate::intent::{DecisionKind, PendingDecision, PrimaryParams, Rejection, SecondaryParams};
use crate::player::CommandPool;
use crate::registry::CardRegistry;
use crate::state::{GamePhase, GameState, SecondaryState};
use crate::tactical::{produce_in_system, spend_influence, spend_resources};
use crate::types::UnitType;
use crate::unit::UnitLocation;

fn pending(state: &mut GameState, player: PlayerId, kind: DecisionKind) {
    state.pending = Some(PendingDecision { player, kind });
}

pub fn handle_strategic_action(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    card: StrategyCard,
    params: &PrimaryParams,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    {
        let p = state.player(player)?;
        let Some(holding) = p.strategy_cards.iter().find(|h| h.card == card) else {
            return Err(Rejection::invalid(
                "card_not_held",
                format!("you do not hold {}", card.name()),
            ));
        };
        if holding.exhausted {
            return Err(Rejection::rules(
                "card_exhausted",
                format!("{} was already used this round", card.name()),
            ));
        }
    }
    resolve_primary(state, registry, player, card, params, events)?;
    if let Ok(p) = state.player_mut(player) {
        if let Some(h) = p.strategy_cards.iter_mut().find(|h| h.card == card) {
            h.exhausted = true;
        }
    }

    let queue: Vec<PlayerId> = state
        .clockwise_from(player)
        .into_iter()
        .filter(|&p| p != player)
        .collect();
    if queue.is_empty() {
        crate::phases::end_of_action_turn(state, registry, events);
        return Ok(());
    }
    let first = queue[0];
    if let GamePhase::Action(a) = &mut state.phase {
        a.secondary = Some(SecondaryState {
            card,
            queue,
            cursor: 0,
        });
    }
    pending(state, first, DecisionKind::OfferSecondary { card });
    Ok(())
}

fn resolve_primary(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    card: StrategyCard,
    params: &PrimaryParams,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    match (card, params) {
        (StrategyCard::Leadership, PrimaryParams::Leadership { spend, tokens }) => {
            let (t, f, s) = *tokens;
            let total = t + f + s;
            // Three free tokens, fewer only when reinforcements run short.
            let free = 3.min(state.player(player)?.token_reinforcements);
            if total < free {
                return Err(Rejection::invalid(
                    "too_few_tokens",
                    "Leadership grants three tokens",
                ));
            }
            let bought = total.saturating_sub(3);
            spend_influence(state, player, spend, bought * 3, events)?;
            gain_tokens(state, player, (t, f, s), events)?;
            Ok(())
        }
        (StrategyCard::Diplomacy, PrimaryParams::Diplomacy { system }) => {
            let owns_planet_there = state
                .galaxy
                .system(*system)
                .is_some_and(|tile| {
                    tile.planets
                        .iter()
                        .any(|p| state.planets.get(p).is_some_and(|pl| pl.controlled_by(player)))
                });
            if !owns_planet_there {
                return Err(Rejection::rules(
                    "no_planet_there",
                    "Diplomacy needs a system with a planet you control",
                ));
            }
            // Each other player marks the system used from reinforcements.
            for other in state.clockwise_from(player) {
                if other == player {
                    continue;
                }
                let already = state
                    .command_tokens_on_board
                    .get(system)
                    .is_some_and(|s| s.contains(&other));
                if already {
                    continue;
                }
                let placed = state
                    .player_mut(other)
                    .ok()
                    .filter(|p| p.token_reinforcements > 0)
                    .map(|p| p.token_reinforcements -= 1)
                    .is_some();
                if placed {
                    state
                        .command_tokens_on_board
                        .entry(*system)
                        .or_default()
                        .insert(other);
                    events.push(Event::public(EventKind::CommandTokenPlaced {
                        player: other,
                        system: *system,
                    }));
                }
            }
            ready_planets_in_system(state, player, *system, 2, events);
            Ok(())
        }
        (StrategyCard::Politics, PrimaryParams::Politics { speaker }) => {
            state.player(*speaker)?;
            state.speaker = *speaker;
            events.push(Event::public(EventKind::SpeakerChanged { player: *speaker }));
            draw_action_cards(state, player, 2, events);
            Ok(())
        }
        (StrategyCard::Construction, PrimaryParams::Construction { unit_type, planet }) => {
            match planet {
                Some(planet) => place_structure(state, player, *unit_type, *planet, events),
                None => {
                    if construction_target(state, player).is_some() {
                        return Err(Rejection::invalid(
                            "placement_available",
                            "choose a planet for the structure",
                        ));
                    }
                    Ok(())
                }
            }
        }
        (StrategyCard::Trade, PrimaryParams::Trade { replenish }) => {
            if let Ok(p) = state.player_mut(player) {
                p.trade_goods += 3;
                let total = p.trade_goods;
                events.push(Event::public(EventKind::TradeGoodsGained {
                    player,
                    count: 3,
                    total,
                }));
                p.replenish_commodities();
                let commodities = p.commodities;
                events.push(Event::public(EventKind::CommoditiesReplenished {
                    player,
                    total: commodities,
                }));
            }
            for &other in replenish {
                if other == player {
                    continue;
                }
                if let Ok(p) = state.player_mut(other) {
                    p.replenish_commodities();
                    let total = p.commodities;
                    events.push(Event::public(EventKind::CommoditiesReplenished {
                        player: other,
                        total,
                    }));
                }
            }
            Ok(())
        }
        (StrategyCard::Warfare, PrimaryParams::Warfare { system }) => {
            let Some(system) = system else {
                let any_on_board = state
                    .command_tokens_on_board
                    .values()
                    .any(|s| s.contains(&player));
                if any_on_board {
                    return Err(Rejection::invalid(
                        "token_on_board",
                        "choose which command token to remove",
                    ));
                }
                return Ok(());
            };
            let had = state
                .command_tokens_on_board
                .get_mut(system)
                .is_some_and(|s| s.remove(&player));
            if !had {
                return Err(Rejection::invalid(
                    "no_token_there",
                    format!("you have no command token in {system}"),
                ));
            }
            if let Ok(p) = state.player_mut(player) {
                p.token_reinforcements += 1;
            }
            events.push(Event::public(EventKind::CommandTokenReturned {
                player,
                system: *system,
            }));
            Ok(())
        }
        (StrategyCard::Technology, PrimaryParams::Technology { tech, second }) => {
            research_tech(state, registry, player, *tech, events)?;
            if let Some((second_tech, spend)) = second {
                spend_resources(state, player, spend, 6, events)?;
                research_tech(state, registry, player, *second_tech, events)?;
            }
            Ok(())
        }
        (StrategyCard::Imperial, PrimaryParams::Imperial { objective }) => {
            if let Some(objective) = objective {
                crate::phases::score_public(state, registry, player, *objective, events)?;
            }
            let holds_mecatol = state
                .planets
                .values()
                .any(|p| p.is_mecatol_rex && p.controlled_by(player));
            if holds_mecatol {
                state.award_vp(player, 1, events);
            } else {
                draw_secret_objective(state, player, events);
            }
            Ok(())
        }
        _ => Err(Rejection::invalid(
            "params_mismatch",
            format!("parameters do not fit {}", card.name()),
        )),
    }
}

pub fn handle_secondary(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    card: StrategyCard,
    params: Option<&SecondaryParams>,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let secondary = match &state.phase {
        GamePhase::Action(a) => a.secondary.clone(),
        _ => None,
    };
    let Some(sec) = secondary else {
        return Err(Rejection::invalid("no_secondary", "no secondary is being offered"));
    };
    if sec.card != card {
        return Err(Rejection::invalid(
            "wrong_card",
            format!("the offer is for {}", sec.card.name()),
        ));
    }
    if sec.queue.get(sec.cursor) != Some(&player) {
        return Err(Rejection::invalid("not_your_offer", "not your secondary offer"));
    }

    if let Some(params) = params {
        // All secondaries but Leadership spend a strategy token.
        if card != StrategyCard::Leadership {
            let p = state.player_mut(player)?;
            if !p.command.take(CommandPool::Strategy) {
                return Err(Rejection::rules(
                    "no_strategy_token",
                    "the strategy pool is empty",
                ));
            }
            events.push(Event::public(EventKind::CommandTokenSpent {
                player,
                pool: CommandPool::Strategy,
            }));
        }
        resolve_secondary(state, registry, player, card, params, events)?;
        events.push(Event::public(EventKind::SecondaryResolved { player, card }));
    }

    let cursor = sec.cursor + 1;
    if cursor < sec.queue.len() {
        let next = sec.queue[cursor];
        if let GamePhase::Action(a) = &mut state.phase {
            a.secondary = Some(SecondaryState {
                card,
                queue: sec.queue,
                cursor,
            });
        }
        pending(state, next, DecisionKind::OfferSecondary { card });
        return Ok(());
    }
    if let GamePhase::Action(a) = &mut state.phase {
        a.secondary = None;
    }
    crate::phases::end_of_action_turn(state, registry, events);
    Ok(())
}

fn resolve_secondary(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    card: StrategyCard,
    params: &SecondaryParams,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    match (card, params) {
        (StrategyCard::Leadership, SecondaryParams::Leadership { spend, tokens }) => {
            let (t, f, s) = *tokens;
            let bought = t + f + s;
            spend_influence(state, player, spend, bought * 3, events)?;
            gain_tokens(state, player, (t, f, s), events)?;
            Ok(())
        }
        (StrategyCard::Diplomacy, SecondaryParams::Diplomacy { planets }) => {
            if planets.len() > 2 {
                return Err(Rejection::rules(
                    "too_many_planets",
                    "ready up to two planets",
                ));
            }
            for &planet in planets {
                let mine = state.planet(planet)?.controlled_by(player);
                if !mine {
                    return Err(Rejection::rules(
                        "not_your_planet",
                        format!("{planet} is not yours"),
                    ));
                }
                if let Ok(p) = state.planet_mut(planet) {
                    if p.exhausted {
                        p.ready();
                        events.push(Event::public(EventKind::PlanetReadied { planet }));
                    }
                }
            }
            Ok(())
        }
        (StrategyCard::Politics, SecondaryParams::Politics) => {
            draw_action_cards(state, player, 2, events);
            Ok(())
        }
        (StrategyCard::Construction, SecondaryParams::Construction { unit_type, planet }) => {
            place_structure(state, player, *unit_type, *planet, events)
        }
        (StrategyCard::Trade, SecondaryParams::Trade) => {
            if let Ok(p) = state.player_mut(player) {
                p.replenish_commodities();
                let total = p.commodities;
                events.push(Event::public(EventKind::CommoditiesReplenished {
                    player,
                    total,
                }));
            }
            Ok(())
        }
        (StrategyCard::Warfare, SecondaryParams::Warfare { orders, spend }) => {
            let home = state.player(player)?.home;
            produce_in_system(state, registry, player, home, orders, spend, events)
        }
        (StrategyCard::Technology, SecondaryParams::Technology { tech, spend }) => {
            spend_resources(state, player, spend, 4, events)?;
            research_tech(state, registry, player, *tech, events)
        }
        (StrategyCard::Imperial, SecondaryParams::Imperial) => {
            draw_secret_objective(state, player, events);
            Ok(())
        }
        _ => Err(Rejection::invalid(
            "params_mismatch",
            format!("parameters do not fit {}", card.name()),
        )),
    }
}

fn gain_tokens(
    state: &mut GameState,
    player: PlayerId,
    (tactic, fleet, strategy): (u8, u8, u8),
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let total = tactic + fleet + strategy;
    let p = state.player_mut(player)?;
    if p.token_reinforcements < total {
        return Err(Rejection::rules(
            "reinforcements_short",
            format!("only {} command tokens remain", p.token_reinforcements),
        ));
    }
    p.token_reinforcements -= total;
    p.command.tactic += tactic;
    p.command.fleet += fleet;
    p.command.strategy += strategy;
    for (pool, n) in [
        (CommandPool::Tactic, tactic),
        (CommandPool::Fleet, fleet),
        (CommandPool::Strategy, strategy),
    ] {
        if n > 0 {
            events.push(Event::public(EventKind::CommandTokensGained {
                player,
                pool,
                count: n,
            }));
        }
    }
    Ok(())
}

/// A planet of the player's that can still take a structure.
fn construction_target(state: &GameState, player: PlayerId) -> Option<PlanetId> {
    state
        .planets
        .values()
        .filter(|p| p.controlled_by(player))
        .find(|p| {
            let pds = state
                .units_on_planet(p.id)
                .filter(|u| u.owner == player && u.unit_type == UnitType::Pds)
                .count();
            let docks = state
                .units_on_planet(p.id)
                .filter(|u| u.owner == player && u.unit_type == UnitType::SpaceDock)
                .count();
            pds < 2 || docks < 1
        })
        .map(|p| p.id)
}

fn place_structure(
    state: &mut GameState,
    player: PlayerId,
    unit_type: UnitType,
    planet: PlanetId,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    if !unit_type.is_structure() {
        return Err(Rejection::invalid(
            "not_a_structure",
            "Construction places a PDS or a space dock",
        ));
    }
    let mine = state.planet(planet)?.controlled_by(player);
    if !mine {
        return Err(Rejection::rules(
            "not_your_planet",
            format!("{planet} is not yours"),
        ));
    }
    let existing = state
        .units_on_planet(planet)
        .filter(|u| u.owner == player && u.unit_type == unit_type)
        .count();
    let limit = match unit_type {
        UnitType::SpaceDock => 1,
        _ => 2,
    };
    if existing >= limit {
        return Err(Rejection::rules(
            "structure_limit",
            format!("{planet} already holds the maximum {unit_type}s"),
        ));
    }
    let id = state.spawn_unit(player, unit_type, UnitLocation::OnPlanet(planet))?;
    events.push(Event::public(EventKind::UnitPlaced {
        unit: id,
        owner: player,
        unit_type,
    }));
    Ok(())
}

fn ready_planets_in_system(
    state: &mut GameState,
    player: PlayerId,
    system: SystemId,
    limit: usize,
    events: &mut Vec<Event>,
) {
    let planet_ids: Vec<PlanetId> = state
        .galaxy
        .system(system)
        .map(|t| t.planets.clone())
        .unwrap_or_default();
    let mut readied = 0;
    for id in planet_ids {
        if readied >= limit {
            break;
        }
        if let Some(p) = state.planets.get_mut(&id) {
            if p.controlled_by(player) && p.exhausted {
                p.ready();
                readied += 1;
                events.push(Event::public(EventKind::PlanetReadied { planet: id }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::StrategyHolding;
    use crate::state::ActionPhaseState;
    use crate::types::{Faction, PlayerColor};

    fn fixture() -> (GameState, CardRegistry, PlayerId, PlayerId) {
        let mut state = GameState::bare(81, 10);
        let registry = CardRegistry::new();
        for i in 0..2 {
            let id = PlayerId::from_index(i);
            state.players.insert(
                id,
                crate::player::Player::new(
                    id,
                    Faction::MentakCoalition,
                    PlayerColor::Orange,
                    SystemId::from_raw(1),
                ),
            );
        }
        state.phase = GamePhase::Action(ActionPhaseState::default());
        state.active_player = Some(PlayerId::from_index(0));
        state.turn_order = vec![PlayerId::from_index(0), PlayerId::from_index(1)];
        (state, registry, PlayerId::from_index(0), PlayerId::from_index(1))
    }

    #[test]
    fn test_trade_primary_gains_and_replenishes() {
        let (mut state, registry, p0, p1) = fixture();
        state.players.get_mut(&p0).unwrap().strategy_cards.push(StrategyHolding {
            card: StrategyCard::Trade,
            exhausted: false,
        });
        let mut events = Vec::new();
        handle_strategic_action(
            &mut state,
            &registry,
            p0,
            StrategyCard::Trade,
            &PrimaryParams::Trade { replenish: vec![] },
            &mut events,
        )
        .unwrap();
        assert_eq!(state.players[&p0].trade_goods, 3);
        assert_eq!(
            state.players[&p0].commodities,
            Faction::MentakCoalition.commodity_value()
        );
        // Secondary offered to the other player.
        assert_eq!(state.pending.as_ref().map(|p| p.player), Some(p1));
    }

    #[test]
    fn test_secondary_costs_a_strategy_token() {
        let (mut state, registry, p0, p1) = fixture();
        state.players.get_mut(&p0).unwrap().strategy_cards.push(StrategyHolding {
            card: StrategyCard::Trade,
            exhausted: false,
        });
        let mut events = Vec::new();
        handle_strategic_action(
            &mut state,
            &registry,
            p0,
            StrategyCard::Trade,
            &PrimaryParams::Trade { replenish: vec![] },
            &mut events,
        )
        .unwrap();
        let before = state.players[&p1].command.strategy;
        handle_secondary(
            &mut state,
            &registry,
            p1,
            StrategyCard::Trade,
            Some(&SecondaryParams::Trade),
            &mut events,
        )
        .unwrap();
        assert_eq!(state.players[&p1].command.strategy, before - 1);
        assert_eq!(
            state.players[&p1].commodities,
            Faction::MentakCoalition.commodity_value()
        );
    }

    #[test]
    fn test_exhausted_card_cannot_repeat() {
        let (mut state, registry, p0, _p1) = fixture();
        state.players.get_mut(&p0).unwrap().strategy_cards.push(StrategyHolding {
            card: StrategyCard::Politics,
            exhausted: true,
        });
        let mut events = Vec::new();
        let err = handle_strategic_action(
            &mut state,
            &registry,
            p0,
            StrategyCard::Politics,
            &PrimaryParams::Politics { speaker: p0 },
            &mut events,
        )
        .unwrap_err();
        assert_eq!(err.code(), "card_exhausted");
    }

    #[test]
    fn test_construction_respects_dock_limit() {
        let (mut state, _registry, p0, _) = fixture();
        let planet = PlanetId::from_raw(3);
        let mut pl = crate::planet::Planet::new(planet, "Moll Primus", SystemId::from_raw(1))
            .with_values(4, 1);
        pl.controller = Some(p0);
        state.planets.insert(planet, pl);
        let mut events = Vec::new();
        place_structure(&mut state, p0, UnitType::SpaceDock, planet, &mut events).unwrap();
        let err =
            place_structure(&mut state, p0, UnitType::SpaceDock, planet, &mut events).unwrap_err();
        assert_eq!(err.code(), "structure_limit");
    }
}
