//! The effect interpreter.
//!
//! Ability scripts resolve FIFO. Each atom either applies and emits events,
//! or finds its preconditions gone and no-ops with a `Warning` event — a
//! resolved ability never rejects mid-script, so atoms already completed
//! stand (the "completely resolved" requirement for component actions is
//! checked before the script starts).

use crate::card::{CardKind, TechDef};
use crate::effect::{Effect, PlanetSel, PlayerSel, SystemSel};
use crate::event::{Event, EventKind};
use crate::ids::{CardId, PlanetId, PlayerId, SystemId};
use crate::intent::{ChosenTargets, Rejection};
use crate::registry::CardRegistry;
use crate::state::GameState;
use crate::types::TechColor;
use crate::unit::{UnitLocation, UnitTier};

/// Binding context for selector resolution.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// The player resolving the ability.
    pub owner: PlayerId,
    pub targets: ChosenTargets,
}

impl ExecutionContext {
    pub fn new(owner: PlayerId, targets: ChosenTargets) -> Self {
        Self { owner, targets }
    }
}

/// Validate that every `Chosen` selector in the script has a binding.
/// Surfaced as `AmbiguousChoice` before any atom runs.
pub fn validate_targets(effects: &[Effect], ctx: &ExecutionContext) -> Result<(), Rejection> {
    for effect in effects {
        let (needs_player, needs_system, needs_planet) = chosen_slots(effect);
        if needs_player && ctx.targets.player.is_none() {
            return Err(Rejection::ambiguous("missing_player", "a target player is required"));
        }
        if needs_system && ctx.targets.system.is_none() {
            return Err(Rejection::ambiguous("missing_system", "a target system is required"));
        }
        if needs_planet && ctx.targets.planet.is_none() {
            return Err(Rejection::ambiguous("missing_planet", "a target planet is required"));
        }
    }
    Ok(())
}

fn chosen_slots(effect: &Effect) -> (bool, bool, bool) {
    let player_sel = |sel: &PlayerSel| matches!(sel, PlayerSel::Chosen);
    let system_sel = |sel: &SystemSel| matches!(sel, SystemSel::Chosen);
    let planet_sel = |sel: &PlanetSel| matches!(sel, PlanetSel::Chosen);
    match effect {
        Effect::GainTradeGoods { who, .. }
        | Effect::SpendTradeGoods { who, .. }
        | Effect::ReplenishCommodities { who }
        | Effect::GainCommodities { who, .. }
        | Effect::DrawActionCards { who, .. }
        | Effect::DiscardRandomActionCard { who }
        | Effect::DrawSecretObjective { who }
        | Effect::GainCommandTokens { who, .. }
        | Effect::RemoveCommandTokenFromPool { who, .. }
        | Effect::ReadyAllPlanets { who }
        | Effect::ResearchChosenTech { who }
        | Effect::GainVictoryPoints { who, .. }
        | Effect::DrawRelic { who }
        | Effect::ReadyAgent { who } => (player_sel(who), false, false),
        Effect::PlaceCommandTokenFrozen { who, system } => {
            (player_sel(who), system_sel(system), false)
        }
        Effect::RepairUnitsIn { system, who } => (player_sel(who), system_sel(system), false),
        Effect::PlaceUnitInSpace { who, system, .. } => {
            (player_sel(who), system_sel(system), false)
        }
        Effect::ReadyPlanet { planet } | Effect::ExhaustPlanet { planet } => {
            (false, false, planet_sel(planet))
        }
        Effect::PlaceUnitOnPlanet { who, planet, .. }
        | Effect::PlaceStructure { who, planet, .. } => (player_sel(who), false, planet_sel(planet)),
        Effect::AttachToPlanet { planet, .. } => (false, false, planet_sel(planet)),
        Effect::CombatBonusThisRound { who, .. } => (player_sel(who), false, false),
        Effect::DestroyUnit { .. }
        | Effect::PurgeCard { .. }
        | Effect::ActivateNexus
        | Effect::RevealPublicObjective => (false, false, false),
    }
}

fn resolve_players(state: &GameState, ctx: &ExecutionContext, sel: PlayerSel) -> Vec<PlayerId> {
    match sel {
        PlayerSel::Owner => vec![ctx.owner],
        PlayerSel::Active => state.active_player.into_iter().collect(),
        PlayerSel::Each => state.clockwise_from(ctx.owner),
        PlayerSel::EachOther => state
            .clockwise_from(ctx.owner)
            .into_iter()
            .filter(|&p| p != ctx.owner)
            .collect(),
        PlayerSel::Chosen => ctx.targets.player.into_iter().collect(),
        PlayerSel::Fixed(p) => vec![p],
    }
}

fn resolve_system(state: &GameState, ctx: &ExecutionContext, sel: SystemSel) -> Option<SystemId> {
    match sel {
        SystemSel::Active => state.active_system,
        SystemSel::Chosen => ctx.targets.system,
        SystemSel::Fixed(s) => Some(s),
    }
}

fn resolve_planet(ctx: &ExecutionContext, sel: PlanetSel) -> Option<PlanetId> {
    match sel {
        PlanetSel::Chosen => ctx.targets.planet,
        PlanetSel::Fixed(p) => Some(p),
    }
}

fn warn(events: &mut Vec<Event>, message: impl Into<String>) {
    events.push(Event::public(EventKind::Warning {
        message: message.into(),
    }));
}

/// Resolve a script FIFO. Infallible once started; individual atoms no-op
/// with warnings when their preconditions fail.
pub fn run_script(
    state: &mut GameState,
    registry: &CardRegistry,
    ctx: &ExecutionContext,
    effects: &[Effect],
    events: &mut Vec<Event>,
) {
    for effect in effects {
        run_atom(state, registry, ctx, effect, events);
    }
}

fn run_atom(
    state: &mut GameState,
    registry: &CardRegistry,
    ctx: &ExecutionContext,
    effect: &Effect,
    events: &mut Vec<Event>,
) {
    match effect {
        Effect::GainTradeGoods { who, n } => {
            for player in resolve_players(state, ctx, *who) {
                if let Ok(p) = state.player_mut(player) {
                    p.trade_goods += n;
                    let total = p.trade_goods;
                    events.push(Event::public(EventKind::TradeGoodsGained {
                        player,
                        count: *n,
                        total,
                    }));
                }
            }
        }
        Effect::SpendTradeGoods { who, n } => {
            for player in resolve_players(state, ctx, *who) {
                match state.player_mut(player) {
                    Ok(p) if p.trade_goods >= *n => {
                        p.trade_goods -= n;
                        events.push(Event::public(EventKind::TradeGoodsSpent {
                            player,
                            count: *n,
                        }));
                    }
                    _ => warn(events, format!("{player} cannot spend {n} trade goods")),
                }
            }
        }
        Effect::ReplenishCommodities { who } => {
            for player in resolve_players(state, ctx, *who) {
                if let Ok(p) = state.player_mut(player) {
                    p.replenish_commodities();
                    let total = p.commodities;
                    events.push(Event::public(EventKind::CommoditiesReplenished {
                        player,
                        total,
                    }));
                }
            }
        }
        Effect::GainCommodities { who, n } => {
            for player in resolve_players(state, ctx, *who) {
                if let Ok(p) = state.player_mut(player) {
                    p.commodities = (p.commodities + n).min(p.faction.commodity_value());
                    let total = p.commodities;
                    events.push(Event::public(EventKind::CommoditiesReplenished {
                        player,
                        total,
                    }));
                }
            }
        }
        Effect::DrawActionCards { who, n } => {
            for player in resolve_players(state, ctx, *who) {
                draw_action_cards(state, player, *n, events);
            }
        }
        Effect::DiscardRandomActionCard { who } => {
            for player in resolve_players(state, ctx, *who) {
                let hand_size = state
                    .players
                    .get(&player)
                    .map(|p| p.action_cards.len())
                    .unwrap_or(0);
                let Some(idx) = state.rng.pick(hand_size) else {
                    warn(events, format!("{player} has no action card to discard"));
                    continue;
                };
                let card = state
                    .player_mut(player)
                    .ok()
                    .map(|p| p.action_cards.remove(idx));
                if let Some(card) = card {
                    state.decks.action.discard(card);
                    events.push(Event::public(EventKind::CardDiscarded { player, card }));
                }
            }
        }
        Effect::DrawSecretObjective { who } => {
            for player in resolve_players(state, ctx, *who) {
                draw_secret_objective(state, player, events);
            }
        }
        Effect::GainCommandTokens { who, pool, n } => {
            for player in resolve_players(state, ctx, *who) {
                if let Ok(p) = state.player_mut(player) {
                    let gained = (*n).min(p.token_reinforcements);
                    if gained < *n {
                        warn(events, format!("{player} is out of command tokens"));
                    }
                    p.token_reinforcements -= gained;
                    p.command.add(*pool, gained);
                    events.push(Event::public(EventKind::CommandTokensGained {
                        player,
                        pool: *pool,
                        count: gained,
                    }));
                }
            }
        }
        Effect::RemoveCommandTokenFromPool { who, pool } => {
            for player in resolve_players(state, ctx, *who) {
                if let Ok(p) = state.player_mut(player) {
                    if p.command.take(*pool) {
                        p.token_reinforcements += 1;
                        events.push(Event::public(EventKind::CommandTokenSpent {
                            player,
                            pool: *pool,
                        }));
                    } else {
                        warn(events, format!("{player} has no token in that pool"));
                    }
                }
            }
        }
        Effect::PlaceCommandTokenFrozen { who, system } => {
            let Some(system) = resolve_system(state, ctx, *system) else {
                warn(events, "no system to place a token in");
                return;
            };
            for player in resolve_players(state, ctx, *who) {
                let already = state
                    .command_tokens_on_board
                    .get(&system)
                    .is_some_and(|s| s.contains(&player));
                if already {
                    continue;
                }
                let Ok(p) = state.player_mut(player) else { continue };
                if p.token_reinforcements == 0 {
                    warn(events, format!("{player} has no reinforcement token"));
                    continue;
                }
                p.token_reinforcements -= 1;
                state
                    .command_tokens_on_board
                    .entry(system)
                    .or_default()
                    .insert(player);
                events.push(Event::public(EventKind::CommandTokenPlaced {
                    player,
                    system,
                }));
            }
        }
        Effect::ReadyPlanet { planet } => {
            let Some(id) = resolve_planet(ctx, *planet) else {
                warn(events, "no planet to ready");
                return;
            };
            if let Ok(p) = state.planet_mut(id) {
                if p.exhausted {
                    p.ready();
                    events.push(Event::public(EventKind::PlanetReadied { planet: id }));
                }
            }
        }
        Effect::ExhaustPlanet { planet } => {
            let Some(id) = resolve_planet(ctx, *planet) else {
                warn(events, "no planet to exhaust");
                return;
            };
            if let Ok(p) = state.planet_mut(id) {
                if !p.exhausted {
                    p.exhaust();
                    events.push(Event::public(EventKind::PlanetExhausted { planet: id }));
                }
            }
        }
        Effect::ReadyAllPlanets { who } => {
            for player in resolve_players(state, ctx, *who) {
                let owned = state.planets_of(player);
                for id in owned {
                    if let Some(p) = state.planets.get_mut(&id) {
                        if p.exhausted {
                            p.ready();
                            events.push(Event::public(EventKind::PlanetReadied { planet: id }));
                        }
                    }
                }
            }
        }
        Effect::DestroyUnit { unit } => {
            state.destroy_unit(*unit, Some(ctx.owner), events);
        }
        Effect::RepairUnitsIn { system, who } => {
            let Some(system) = resolve_system(state, ctx, *system) else {
                warn(events, "no system to repair in");
                return;
            };
            for player in resolve_players(state, ctx, *who) {
                let ids: Vec<_> = state
                    .units_in_space(system)
                    .filter(|u| u.owner == player && u.damaged)
                    .map(|u| u.id)
                    .collect();
                for id in ids {
                    if let Some(u) = state.units.get_mut(&id) {
                        u.damaged = false;
                        events.push(Event::public(EventKind::UnitRepaired { unit: id }));
                    }
                }
            }
        }
        Effect::PlaceUnitInSpace {
            who,
            unit_type,
            system,
        } => {
            let Some(system) = resolve_system(state, ctx, *system) else {
                warn(events, "no system to place into");
                return;
            };
            for player in resolve_players(state, ctx, *who) {
                match state.spawn_unit(player, *unit_type, UnitLocation::Space(system)) {
                    Ok(id) => events.push(Event::public(EventKind::UnitPlaced {
                        unit: id,
                        owner: player,
                        unit_type: *unit_type,
                    })),
                    Err(_) => warn(events, format!("{player} has no {unit_type} available")),
                }
            }
        }
        Effect::PlaceUnitOnPlanet {
            who,
            unit_type,
            planet,
        }
        | Effect::PlaceStructure {
            who,
            unit_type,
            planet,
        } => {
            let Some(planet) = resolve_planet(ctx, *planet) else {
                warn(events, "no planet to place onto");
                return;
            };
            for player in resolve_players(state, ctx, *who) {
                match state.spawn_unit(player, *unit_type, UnitLocation::OnPlanet(planet)) {
                    Ok(id) => events.push(Event::public(EventKind::UnitPlaced {
                        unit: id,
                        owner: player,
                        unit_type: *unit_type,
                    })),
                    Err(_) => warn(events, format!("{player} has no {unit_type} available")),
                }
            }
        }
        Effect::ResearchChosenTech { who } => {
            let Some(card) = ctx.targets.card else {
                warn(events, "no technology chosen");
                return;
            };
            for player in resolve_players(state, ctx, *who) {
                if let Err(err) = research_tech(state, registry, player, card, events) {
                    warn(events, err.to_string());
                }
            }
        }
        Effect::GainVictoryPoints { who, n } => {
            for player in resolve_players(state, ctx, *who) {
                state.award_vp(player, *n, events);
            }
        }
        Effect::AttachToPlanet {
            planet,
            card,
            resources,
            influence,
        } => {
            let Some(id) = resolve_planet(ctx, *planet) else {
                warn(events, "no planet to attach to");
                return;
            };
            if let Ok(p) = state.planet_mut(id) {
                p.attach(*card, *resources, *influence);
                events.push(Event::public(EventKind::PlanetAttached {
                    planet: id,
                    card: *card,
                }));
            }
        }
        Effect::DrawRelic { who } => {
            for player in resolve_players(state, ctx, *who) {
                match state.decks.relic.draw(&mut state.rng) {
                    Some(card) => {
                        if let Ok(p) = state.player_mut(player) {
                            p.relics.push(card);
                        }
                        events.push(Event::public(EventKind::RelicDrawn { player, card }));
                    }
                    None => warn(events, "the relic deck is empty"),
                }
            }
        }
        Effect::PurgeCard { card } => {
            state.purge(*card, events);
        }
        Effect::ActivateNexus => {
            if !state.galaxy.nexus_is_active() {
                state.galaxy.activate_nexus();
                events.push(Event::public(EventKind::NexusActivated));
            }
        }
        Effect::RevealPublicObjective => {
            state.reveal_next_objective(events);
        }
        Effect::CombatBonusThisRound { who, n } => {
            for player in resolve_players(state, ctx, *who) {
                state.transients.push(crate::state::TransientMod {
                    player: Some(player),
                    unit_type: None,
                    combat_bonus: *n,
                    move_bonus: 0,
                    until: crate::state::ModUntil::EndOfCombatRound,
                });
            }
        }
        Effect::ReadyAgent { who } => {
            for player in resolve_players(state, ctx, *who) {
                if let Ok(p) = state.player_mut(player) {
                    if p.leaders.agent == crate::player::LeaderState::Exhausted {
                        p.leaders.agent = crate::player::LeaderState::Readied;
                    }
                }
            }
        }
    }
}

// ============================================================================
// Shared draws and research
// ============================================================================

/// Draw action cards; the card identity is private to the drawer, the count
/// is public.
pub fn draw_action_cards(
    state: &mut GameState,
    player: PlayerId,
    n: u8,
    events: &mut Vec<Event>,
) {
    let mut drawn = 0;
    for _ in 0..n {
        match state.decks.action.draw(&mut state.rng) {
            Some(card) => {
                if let Ok(p) = state.player_mut(player) {
                    p.action_cards.push(card);
                }
                events.push(Event::private(player, EventKind::CardDrawn { player, card }));
                drawn += 1;
            }
            None => {
                warn(events, "the action card deck is exhausted");
                break;
            }
        }
    }
    if drawn > 0 {
        events.push(Event::public(EventKind::CardsDrawn {
            player,
            count: drawn,
            deck: "action".to_string(),
        }));
    }
}

/// Draw a secret objective. If the hand would exceed three unscored secrets,
/// the drawer must return one (pending decision raised by the caller's flow).
pub fn draw_secret_objective(state: &mut GameState, player: PlayerId, events: &mut Vec<Event>) {
    match state.decks.secret.draw(&mut state.rng) {
        Some(card) => {
            if let Ok(p) = state.player_mut(player) {
                p.secret_hand.push(card);
            }
            events.push(Event::private(player, EventKind::CardDrawn { player, card }));
            events.push(Event::public(EventKind::CardsDrawn {
                player,
                count: 1,
                deck: "secret objective".to_string(),
            }));
        }
        None => warn(events, "the secret objective deck is exhausted"),
    }
}

/// Check prerequisites and add a technology to the player's sheet.
pub fn research_tech(
    state: &mut GameState,
    registry: &CardRegistry,
    player: PlayerId,
    card: CardId,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let def = registry
        .get(card)
        .ok_or_else(|| Rejection::invalid("unknown_card", format!("no such card {card}")))?;
    let CardKind::Technology(tech) = &def.kind else {
        return Err(Rejection::invalid("not_a_technology", format!("{} is not a technology", def.name)));
    };
    {
        let p = state.player(player)?;
        if p.has_tech(card) {
            return Err(Rejection::rules("already_owned", format!("{} already researched", def.name)));
        }
        check_prerequisites(registry, p, tech)?;
    }
    let upgrade = tech.unit_upgrade;
    let p = state.player_mut(player)?;
    p.technologies.push(card);
    if let Some(unit_type) = upgrade {
        p.unit_tiers.insert(unit_type, UnitTier::II);
    }
    events.push(Event::public(EventKind::TechResearched { player, card }));
    Ok(())
}

fn check_prerequisites(
    registry: &CardRegistry,
    player: &crate::player::Player,
    tech: &TechDef,
) -> Result<(), Rejection> {
    let mut owned: std::collections::BTreeMap<TechColor, u8> = std::collections::BTreeMap::new();
    for &id in &player.technologies {
        if let Some(CardKind::Technology(t)) = registry.get(id).map(|d| &d.kind) {
            if let Some(color) = t.color {
                *owned.entry(color).or_insert(0) += 1;
            }
        }
    }
    let mut required: std::collections::BTreeMap<TechColor, u8> = std::collections::BTreeMap::new();
    for &color in &tech.prerequisites {
        *required.entry(color).or_insert(0) += 1;
    }
    for (color, need) in required {
        if owned.get(&color).copied().unwrap_or(0) < need {
            return Err(Rejection::rules(
                "missing_prerequisite",
                format!("missing {need} {color:?} prerequisite(s)"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Effect;
    use crate::types::{Faction, PlayerColor};

    fn state_with_player() -> GameState {
        let mut state = GameState::bare(1, 10);
        let id = PlayerId::from_index(0);
        state.players.insert(
            id,
            crate::player::Player::new(
                id,
                Faction::EmiratesOfHacan,
                PlayerColor::Yellow,
                SystemId::from_raw(1),
            ),
        );
        state
    }

    #[test]
    fn test_gain_trade_goods() {
        let mut state = state_with_player();
        let registry = CardRegistry::new();
        let ctx = ExecutionContext::new(PlayerId::from_index(0), ChosenTargets::default());
        let mut events = Vec::new();
        run_script(
            &mut state,
            &registry,
            &ctx,
            &[Effect::GainTradeGoods {
                who: PlayerSel::Owner,
                n: 3,
            }],
            &mut events,
        );
        assert_eq!(state.players[&PlayerId::from_index(0)].trade_goods, 3);
    }

    #[test]
    fn test_unpayable_spend_warns_and_noops() {
        let mut state = state_with_player();
        let registry = CardRegistry::new();
        let ctx = ExecutionContext::new(PlayerId::from_index(0), ChosenTargets::default());
        let mut events = Vec::new();
        run_script(
            &mut state,
            &registry,
            &ctx,
            &[Effect::SpendTradeGoods {
                who: PlayerSel::Owner,
                n: 2,
            }],
            &mut events,
        );
        assert_eq!(state.players[&PlayerId::from_index(0)].trade_goods, 0);
        assert!(events
            .iter()
            .any(|e| matches!(e.kind, EventKind::Warning { .. })));
    }

    #[test]
    fn test_missing_chosen_target_is_ambiguous() {
        let ctx = ExecutionContext::new(PlayerId::from_index(0), ChosenTargets::default());
        let err = validate_targets(
            &[Effect::GainTradeGoods {
                who: PlayerSel::Chosen,
                n: 1,
            }],
            &ctx,
        )
        .unwrap_err();
        assert_eq!(err.code(), "missing_player");
    }

    #[test]
    fn test_commodities_cap_at_faction_value() {
        let mut state = state_with_player();
        let registry = CardRegistry::new();
        let ctx = ExecutionContext::new(PlayerId::from_index(0), ChosenTargets::default());
        let mut events = Vec::new();
        run_script(
            &mut state,
            &registry,
            &ctx,
            &[Effect::GainCommodities {
                who: PlayerSel::Owner,
                n: 20,
            }],
            &mut events,
        );
        assert_eq!(
            state.players[&PlayerId::from_index(0)].commodities,
            Faction::EmiratesOfHacan.commodity_value()
        );
    }
}
