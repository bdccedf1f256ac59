//! Binding transactions.
//!
//! A transaction is an atomic two-sided exchange of trade goods,
//! commodities, action cards, relic fragments, and at most one promissory
//! note. Outside the agenda phase the parties must be neighbors and the
//! proposer must be the active player on their turn; during the agenda phase
//! anyone may transact, once per other player per agenda. Commodities flip
//! to trade goods when they change hands, and the flip does not count as
//! "gaining trade goods" for ability triggers (LRR 21.5c).

use crate::event::{Event, EventKind};
use crate::ids::{PlayerId};
use crate::intent::{DecisionKind, PendingDecision, Rejection, TransactionOffer};
use crate::state::{GamePhase, GameState, TransactionProposal};

pub fn handle_propose(
    state: &mut GameState,
    from: PlayerId,
    to: PlayerId,
    give: TransactionOffer,
    receive: TransactionOffer,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    if from == to {
        return Err(Rejection::invalid("self_trade", "you cannot transact with yourself"));
    }
    state.player(to)?;
    if state.proposal.is_some() {
        return Err(Rejection::invalid(
            "proposal_open",
            "another transaction is awaiting confirmation",
        ));
    }
    if give.is_empty() && receive.is_empty() {
        return Err(Rejection::invalid("empty_trade", "the transaction exchanges nothing"));
    }
    if give.promissory.is_some() && receive.promissory.is_some() {
        return Err(Rejection::rules(
            "two_notes",
            "at most one promissory note per transaction",
        ));
    }

    let in_agenda = matches!(state.phase, GamePhase::Agenda(_));
    if in_agenda {
        let done = match &state.phase {
            GamePhase::Agenda(a) => a.transacted.contains(&pair(from, to)),
            _ => false,
        };
        if done {
            return Err(Rejection::rules(
                "already_transacted",
                "one transaction per other player per agenda",
            ));
        }
    } else {
        if state.active_player != Some(from) {
            return Err(Rejection::invalid(
                "not_your_turn",
                "transactions happen on your turn (or in the agenda phase)",
            ));
        }
        if !state.are_neighbors(from, to) {
            return Err(Rejection::rules(
                "not_neighbors",
                "you are not neighbors",
            ));
        }
        if state.transacted_this_turn.contains(&pair(from, to)) {
            return Err(Rejection::rules(
                "already_transacted",
                "one transaction per other player per turn",
            ));
        }
    }

    validate_offer(state, from, &give)?;
    validate_offer(state, to, &receive)?;

    state.proposal = Some(TransactionProposal {
        from,
        to,
        give,
        receive,
        resume_pending: state.pending.take(),
    });
    state.pending = Some(PendingDecision {
        player: to,
        kind: DecisionKind::ConfirmTransaction { from },
    });
    let _ = events;
    Ok(())
}

fn pair(a: PlayerId, b: PlayerId) -> (PlayerId, PlayerId) {
    if a <= b { (a, b) } else { (b, a) }
}

fn validate_offer(
    state: &GameState,
    owner: PlayerId,
    offer: &TransactionOffer,
) -> Result<(), Rejection> {
    let p = state.player(owner)?;
    if p.trade_goods < offer.trade_goods {
        return Err(Rejection::rules(
            "short_trade_goods",
            format!("{owner} lacks the offered trade goods"),
        ));
    }
    if p.commodities < offer.commodities {
        return Err(Rejection::rules(
            "short_commodities",
            format!("{owner} lacks the offered commodities"),
        ));
    }
    for &card in &offer.action_cards {
        if !p.action_cards.contains(&card) {
            return Err(Rejection::rules(
                "card_not_held",
                format!("{owner} does not hold {card}"),
            ));
        }
    }
    if let Some(note) = offer.promissory {
        if !p.promissory_hand.contains(&note) {
            return Err(Rejection::rules(
                "note_not_held",
                format!("{owner} does not hold {note}"),
            ));
        }
    }
    for &fragment in &offer.relic_fragments {
        if !p.relic_fragments.contains(&fragment) {
            return Err(Rejection::rules(
                "fragment_not_held",
                format!("{owner} does not hold {fragment}"),
            ));
        }
    }
    Ok(())
}

pub fn handle_confirm(
    state: &mut GameState,
    player: PlayerId,
    accept: bool,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    let Some(proposal) = state.proposal.clone() else {
        return Err(Rejection::invalid("no_proposal", "no transaction to confirm"));
    };
    if player != proposal.to {
        return Err(Rejection::invalid(
            "not_the_counterparty",
            format!("waiting on {}", proposal.to),
        ));
    }
    state.proposal = None;
    state.pending = proposal.resume_pending.clone();
    if !accept {
        return Ok(());
    }

    // Re-validate both sides; holdings may have changed since the proposal.
    validate_offer(state, proposal.from, &proposal.give)?;
    validate_offer(state, proposal.to, &proposal.receive)?;

    transfer(state, proposal.from, proposal.to, &proposal.give, events)?;
    transfer(state, proposal.to, proposal.from, &proposal.receive, events)?;

    match &mut state.phase {
        GamePhase::Agenda(a) => {
            a.transacted.insert(pair(proposal.from, proposal.to));
        }
        _ => {
            state
                .transacted_this_turn
                .insert(pair(proposal.from, proposal.to));
        }
    }
    events.push(Event::public(EventKind::TransactionCompleted {
        from: proposal.from,
        to: proposal.to,
    }));
    Ok(())
}

fn transfer(
    state: &mut GameState,
    from: PlayerId,
    to: PlayerId,
    offer: &TransactionOffer,
    events: &mut Vec<Event>,
) -> Result<(), Rejection> {
    if offer.trade_goods > 0 {
        state.player_mut(from)?.trade_goods -= offer.trade_goods;
        let p = state.player_mut(to)?;
        p.trade_goods += offer.trade_goods;
        let total = p.trade_goods;
        events.push(Event::public(EventKind::TradeGoodsGained {
            player: to,
            count: offer.trade_goods,
            total,
        }));
    }
    if offer.commodities > 0 {
        // Commodities flip to trade goods in the recipient's area; the
        // conversion is not a "gain trade goods" trigger (LRR 21.5c).
        state.player_mut(from)?.commodities -= offer.commodities;
        state.player_mut(to)?.trade_goods += offer.commodities;
        events.push(Event::public(EventKind::CommodityConverted {
            from,
            to,
            count: offer.commodities,
        }));
    }
    for &card in &offer.action_cards {
        state.player_mut(from)?.remove_action_card(card);
        state.player_mut(to)?.action_cards.push(card);
    }
    if let Some(note) = offer.promissory {
        if state.promissory_owner.get(&note) == Some(&to) {
            // A note returning to its owner goes back to their stock.
            state.player_mut(from)?.remove_promissory(note);
            state.player_mut(to)?.promissory_hand.push(note);
            events.push(Event::public(EventKind::PromissoryNoteReturned {
                owner: to,
                card: note,
            }));
        } else {
            state.player_mut(from)?.remove_promissory(note);
            state.player_mut(to)?.promissory_hand.push(note);
        }
    }
    for &fragment in &offer.relic_fragments {
        state
            .player_mut(from)?
            .relic_fragments
            .retain(|&f| f != fragment);
        state.player_mut(to)?.relic_fragments.push(fragment);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::galaxy::{HexCoord, SystemTile};
    use crate::ids::SystemId;
    use crate::state::ActionPhaseState;
    use crate::types::{Faction, PlayerColor, TileBack, UnitType};
    use crate::unit::UnitLocation;

    fn neighbors_fixture() -> (GameState, PlayerId, PlayerId) {
        let mut state = GameState::bare(41, 10);
        let (a, b) = (PlayerId::from_index(0), PlayerId::from_index(1));
        for id in [a, b] {
            state.players.insert(
                id,
                crate::player::Player::new(
                    id,
                    Faction::EmiratesOfHacan,
                    PlayerColor::Yellow,
                    SystemId::from_raw(1),
                ),
            );
        }
        state.galaxy.place(
            SystemTile::new(SystemId::from_raw(1), TileBack::Blue),
            HexCoord::new(0, 0),
        );
        state.galaxy.place(
            SystemTile::new(SystemId::from_raw(2), TileBack::Blue),
            HexCoord::new(1, 0),
        );
        state
            .spawn_unit(a, UnitType::Cruiser, UnitLocation::Space(SystemId::from_raw(1)))
            .unwrap();
        state
            .spawn_unit(b, UnitType::Cruiser, UnitLocation::Space(SystemId::from_raw(2)))
            .unwrap();
        state.phase = GamePhase::Action(ActionPhaseState::default());
        state.active_player = Some(a);
        (state, a, b)
    }

    #[test]
    fn test_commodities_flip_to_trade_goods() {
        let (mut state, a, b) = neighbors_fixture();
        state.players.get_mut(&a).unwrap().commodities = 3;
        let mut events = Vec::new();
        handle_propose(
            &mut state,
            a,
            b,
            TransactionOffer {
                commodities: 2,
                ..Default::default()
            },
            TransactionOffer::default(),
            &mut events,
        )
        .unwrap();
        handle_confirm(&mut state, b, true, &mut events).unwrap();
        assert_eq!(state.players[&a].commodities, 1);
        assert_eq!(state.players[&b].trade_goods, 2);
        assert!(events
            .iter()
            .any(|e| matches!(e.kind, EventKind::CommodityConverted { count: 2, .. })));
        // The conversion is not a trade-good gain event.
        assert!(!events
            .iter()
            .any(|e| matches!(e.kind, EventKind::TradeGoodsGained { .. })));
    }

    #[test]
    fn test_non_neighbors_cannot_trade_outside_agenda() {
        let (mut state, a, b) = neighbors_fixture();
        // Move B's cruiser far away.
        state.galaxy.place(
            SystemTile::new(SystemId::from_raw(9), TileBack::Red),
            HexCoord::new(8, 8),
        );
        let b_ship = state.ships_of(b, SystemId::from_raw(2))[0];
        state.units.get_mut(&b_ship).unwrap().location =
            UnitLocation::Space(SystemId::from_raw(9));
        state.players.get_mut(&a).unwrap().trade_goods = 1;
        let mut events = Vec::new();
        let err = handle_propose(
            &mut state,
            a,
            b,
            TransactionOffer {
                trade_goods: 1,
                ..Default::default()
            },
            TransactionOffer::default(),
            &mut events,
        )
        .unwrap_err();
        assert_eq!(err.code(), "not_neighbors");
    }

    #[test]
    fn test_one_transaction_per_player_per_turn() {
        let (mut state, a, b) = neighbors_fixture();
        state.players.get_mut(&a).unwrap().trade_goods = 2;
        let mut events = Vec::new();
        let give = TransactionOffer {
            trade_goods: 1,
            ..Default::default()
        };
        handle_propose(&mut state, a, b, give.clone(), TransactionOffer::default(), &mut events)
            .unwrap();
        handle_confirm(&mut state, b, true, &mut events).unwrap();
        let err = handle_propose(&mut state, a, b, give, TransactionOffer::default(), &mut events)
            .unwrap_err();
        assert_eq!(err.code(), "already_transacted");
    }

    #[test]
    fn test_declined_proposal_restores_pending(){
        let (mut state, a, b) = neighbors_fixture();
        state.players.get_mut(&a).unwrap().trade_goods = 1;
        state.pending = Some(PendingDecision {
            player: a,
            kind: DecisionKind::TakeTurn,
        });
        let mut events = Vec::new();
        handle_propose(
            &mut state,
            a,
            b,
            TransactionOffer {
                trade_goods: 1,
                ..Default::default()
            },
            TransactionOffer::default(),
            &mut events,
        )
        .unwrap();
        handle_confirm(&mut state, b, false, &mut events).unwrap();
        assert_eq!(state.players[&a].trade_goods, 1);
        assert_eq!(
            state.pending,
            Some(PendingDecision {
                player: a,
                kind: DecisionKind::TakeTurn,
            })
        );
    }
}
